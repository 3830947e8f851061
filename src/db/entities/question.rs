//! Question Entity

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;

use crate::db::Session;
use crate::orm::{
    ColumnDef, Entity, EntitySchema, OrderBy, PrimaryKey, RelationDef, RelationKind,
    RepositoryResult, RowReader, load_relation, unknown_relation,
};

use super::{Answer, QuestionTechnology, Technology};

pub static QUESTION_SCHEMA: EntitySchema = EntitySchema {
    table: "question",
    verbose_name: "Question",
    primary_key: PrimaryKey::AutoIncrement,
    columns: &[
        ColumnDef::int_pk(),
        ColumnDef::created_at(),
        ColumnDef::updated_at(),
        ColumnDef::text("text"),
        ColumnDef::text("answer").nullable(),
        ColumnDef::boolean("is_published").default("0"),
        ColumnDef::integer("difficulty").default("1"),
    ],
    relations: &[
        RelationDef {
            name: "question_technologies",
            target: QuestionTechnology::schema,
            kind: RelationKind::ToMany {
                remote_column: "question_id",
            },
        },
        RelationDef {
            name: "technologies",
            target: Technology::schema,
            kind: RelationKind::ManyToMany {
                link_table: "question_technology",
                local_column: "question_id",
                remote_column: "technology_id",
            },
        },
        RelationDef {
            name: "answers",
            target: Answer::schema,
            kind: RelationKind::ToMany {
                remote_column: "question_id",
            },
        },
    ],
    unique_together: &[],
    ordering: &[OrderBy::ascending("created_at")],
};

/// An interview question with an optional reference answer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub text: String,
    pub answer: Option<String>,
    pub is_published: bool,
    /// 1 (warm-up) and up
    pub difficulty: i64,

    #[serde(skip)]
    pub question_technologies: Option<Vec<QuestionTechnology>>,
    #[serde(skip)]
    pub technologies: Option<Vec<Technology>>,
    #[serde(skip)]
    pub answers: Option<Vec<Answer>>,
}

impl Entity for Question {
    fn schema() -> &'static EntitySchema {
        &QUESTION_SCHEMA
    }

    fn from_row(row: &SqliteRow, prefix: &str) -> RepositoryResult<Self> {
        let r = RowReader::new(row, QUESTION_SCHEMA.verbose_name, prefix);
        Ok(Self {
            id: r.get("id")?,
            created_at: r.timestamp("created_at")?,
            updated_at: r.timestamp("updated_at")?,
            text: r.get("text")?,
            answer: r.get("answer")?,
            is_published: r.get("is_published")?,
            difficulty: r.get("difficulty")?,
            question_technologies: None,
            technologies: None,
            answers: None,
        })
    }

    column_accessors!(id, created_at, updated_at, text, answer, is_published, difficulty);

    async fn load_batched(
        entities: &mut [Self],
        relation: &RelationDef,
        session: &Session,
    ) -> RepositoryResult<()> {
        match relation.name {
            "question_technologies" => {
                load_relation(entities, relation, session, |q: &mut Self, rows| {
                    q.question_technologies = Some(rows)
                })
                .await
            }
            "technologies" => {
                load_relation(entities, relation, session, |q: &mut Self, rows| {
                    q.technologies = Some(rows)
                })
                .await
            }
            "answers" => {
                load_relation(entities, relation, session, |q: &mut Self, rows| {
                    q.answers = Some(rows)
                })
                .await
            }
            other => Err(unknown_relation::<Self>(other)),
        }
    }
}
