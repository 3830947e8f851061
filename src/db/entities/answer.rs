//! Answer Entity

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use uuid::Uuid;

use crate::db::Session;
use crate::orm::{
    ColumnDef, Entity, EntitySchema, OrderBy, PrimaryKey, RelationDef, RelationKind,
    RepositoryResult, RowReader, decode_joined, load_relation, unknown_relation,
};

use super::{Question, User};

pub static ANSWER_SCHEMA: EntitySchema = EntitySchema {
    table: "answer",
    verbose_name: "Answer",
    primary_key: PrimaryKey::AutoIncrement,
    columns: &[
        ColumnDef::int_pk(),
        ColumnDef::created_at(),
        ColumnDef::updated_at(),
        ColumnDef::text("user_id").references("user(id) ON DELETE CASCADE"),
        ColumnDef::integer("question_id").references("question(id) ON DELETE CASCADE"),
        ColumnDef::text("text"),
        ColumnDef::real("score").nullable(),
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
    ],
    unique_together: &[],
    ordering: &[OrderBy::ascending("created_at")],
};

/// A user's free-text answer to a question, scored once assessed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub user_id: Uuid,
    pub question_id: i64,
    pub text: String,
    pub score: Option<f64>,

    #[serde(skip)]
    pub user: Option<User>,
    #[serde(skip)]
    pub question: Option<Question>,
}

impl Entity for Answer {
    fn schema() -> &'static EntitySchema {
        &ANSWER_SCHEMA
    }

    fn from_row(row: &SqliteRow, prefix: &str) -> RepositoryResult<Self> {
        let r = RowReader::new(row, ANSWER_SCHEMA.verbose_name, prefix);
        Ok(Self {
            id: r.get("id")?,
            created_at: r.timestamp("created_at")?,
            updated_at: r.timestamp("updated_at")?,
            user_id: r.uuid("user_id")?,
            question_id: r.get("question_id")?,
            text: r.get("text")?,
            score: r.get("score")?,
            user: None,
            question: None,
        })
    }

    column_accessors!(id, created_at, updated_at, user_id, question_id, text, score);

    fn attach_joined(&mut self, relation: &str, row: &SqliteRow) -> RepositoryResult<()> {
        match relation {
            "user" => self.user = decode_joined(row, relation)?,
            "question" => self.question = decode_joined(row, relation)?,
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
            other => Err(unknown_relation::<Self>(other)),
        }
    }
}
