//! Technology Entity

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;

use crate::db::Session;
use crate::orm::{
    ColumnDef, Entity, EntitySchema, OrderBy, PrimaryKey, RelationDef, RelationKind,
    RepositoryResult, RowReader, load_relation, unknown_relation,
};

use super::{Question, QuestionTechnology};

pub static TECHNOLOGY_SCHEMA: EntitySchema = EntitySchema {
    table: "technology",
    verbose_name: "Technology",
    primary_key: PrimaryKey::AutoIncrement,
    columns: &[
        ColumnDef::int_pk(),
        ColumnDef::created_at(),
        ColumnDef::updated_at(),
        ColumnDef::text("name"),
    ],
    relations: &[
        RelationDef {
            name: "question_technologies",
            target: QuestionTechnology::schema,
            kind: RelationKind::ToMany {
                remote_column: "technology_id",
            },
        },
        RelationDef {
            name: "questions",
            target: Question::schema,
            kind: RelationKind::ManyToMany {
                link_table: "question_technology",
                local_column: "technology_id",
                remote_column: "question_id",
            },
        },
    ],
    unique_together: &[&["name"]],
    ordering: &[OrderBy::ascending("created_at")],
};

/// A technology a question can be tagged with (e.g. "Rust", "PostgreSQL").
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Technology {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub name: String,

    #[serde(skip)]
    pub question_technologies: Option<Vec<QuestionTechnology>>,
    #[serde(skip)]
    pub questions: Option<Vec<Question>>,
}

impl Entity for Technology {
    fn schema() -> &'static EntitySchema {
        &TECHNOLOGY_SCHEMA
    }

    fn from_row(row: &SqliteRow, prefix: &str) -> RepositoryResult<Self> {
        let r = RowReader::new(row, TECHNOLOGY_SCHEMA.verbose_name, prefix);
        Ok(Self {
            id: r.get("id")?,
            created_at: r.timestamp("created_at")?,
            updated_at: r.timestamp("updated_at")?,
            name: r.get("name")?,
            question_technologies: None,
            questions: None,
        })
    }

    column_accessors!(id, created_at, updated_at, name);

    async fn load_batched(
        entities: &mut [Self],
        relation: &RelationDef,
        session: &Session,
    ) -> RepositoryResult<()> {
        match relation.name {
            "question_technologies" => {
                load_relation(entities, relation, session, |t: &mut Self, rows| {
                    t.question_technologies = Some(rows)
                })
                .await
            }
            "questions" => {
                load_relation(entities, relation, session, |t: &mut Self, rows| {
                    t.questions = Some(rows)
                })
                .await
            }
            other => Err(unknown_relation::<Self>(other)),
        }
    }
}

impl std::fmt::Display for Technology {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}
