//! AIAssessment Entity

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use uuid::Uuid;

use crate::db::Session;
use crate::orm::{
    ColumnDef, Entity, EntitySchema, OrderBy, PrimaryKey, RelationDef, RelationKind,
    RepositoryResult, RowReader, decode_joined, load_relation, unknown_relation,
};

use super::{Answer, Question, User};

pub static AI_ASSESSMENT_SCHEMA: EntitySchema = EntitySchema {
    table: "ai_assessment",
    verbose_name: "AIAssessment",
    primary_key: PrimaryKey::AutoIncrement,
    columns: &[
        ColumnDef::int_pk(),
        ColumnDef::created_at(),
        ColumnDef::updated_at(),
        ColumnDef::text("user_id").references("user(id) ON DELETE CASCADE"),
        ColumnDef::integer("question_id").references("question(id) ON DELETE CASCADE"),
        ColumnDef::integer("answer_id").references("answer(id) ON DELETE CASCADE"),
        ColumnDef::text("text"),
    ],
    relations: &[
        RelationDef {
            name: "user",
            target: User::schema,
            kind: RelationKind::ToOne {
                local_column: "user_id",
            },
        },
        RelationDef {
            name: "question",
            target: Question::schema,
            kind: RelationKind::ToOne {
                local_column: "question_id",
            },
        },
        RelationDef {
            name: "answer",
            target: Answer::schema,
            kind: RelationKind::ToOne {
                local_column: "answer_id",
            },
        },
    ],
    unique_together: &[],
    ordering: &[OrderBy::ascending("created_at")],
};

/// Model-generated feedback on an answer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AIAssessment {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub user_id: Uuid,
    pub question_id: i64,
    pub answer_id: i64,
    pub text: String,

    #[serde(skip)]
    pub user: Option<User>,
    #[serde(skip)]
    pub question: Option<Question>,
    #[serde(skip)]
    pub answer: Option<Answer>,
}

impl Entity for AIAssessment {
    fn schema() -> &'static EntitySchema {
        &AI_ASSESSMENT_SCHEMA
    }

    fn from_row(row: &SqliteRow, prefix: &str) -> RepositoryResult<Self> {
        let r = RowReader::new(row, AI_ASSESSMENT_SCHEMA.verbose_name, prefix);
        Ok(Self {
            id: r.get("id")?,
            created_at: r.timestamp("created_at")?,
            updated_at: r.timestamp("updated_at")?,
            user_id: r.uuid("user_id")?,
            question_id: r.get("question_id")?,
            answer_id: r.get("answer_id")?,
            text: r.get("text")?,
            user: None,
            question: None,
            answer: None,
        })
    }

    column_accessors!(id, created_at, updated_at, user_id, question_id, answer_id, text);

    fn attach_joined(&mut self, relation: &str, row: &SqliteRow) -> RepositoryResult<()> {
        match relation {
            "user" => self.user = decode_joined(row, relation)?,
            "question" => self.question = decode_joined(row, relation)?,
            "answer" => self.answer = decode_joined(row, relation)?,
            other => return Err(unknown_relation::<Self>(other)),
        }
        Ok(())
    }

    async fn load_batched(
        entities: &mut [Self],
        relation: &RelationDef,
        session: &Session,
    ) -> RepositoryResult<()> {
        match relation.name {
            "user" => {
                load_relation(entities, relation, session, |a: &mut Self, mut rows| {
                    a.user = rows.pop()
                })
                .await
            }
            "question" => {
                load_relation(entities, relation, session, |a: &mut Self, mut rows| {
                    a.question = rows.pop()
                })
                .await
            }
            "answer" => {
                load_relation(entities, relation, session, |a: &mut Self, mut rows| {
                    a.answer = rows.pop()
                })
                .await
            }
            other => Err(unknown_relation::<Self>(other)),
        }
    }
}
