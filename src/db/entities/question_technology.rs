//! QuestionTechnology Entity

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;

use crate::db::Session;
use crate::orm::{
    ColumnDef, Entity, EntitySchema, OrderBy, PrimaryKey, RelationDef, RelationKind,
    RepositoryResult, RowReader, decode_joined, load_relation, unknown_relation,
};

use super::{Question, Technology};

pub static QUESTION_TECHNOLOGY_SCHEMA: EntitySchema = EntitySchema {
    table: "question_technology",
    verbose_name: "QuestionTechnology",
    primary_key: PrimaryKey::AutoIncrement,
    columns: &[
        ColumnDef::int_pk(),
        ColumnDef::created_at(),
        ColumnDef::updated_at(),
        ColumnDef::integer("question_id").references("question(id) ON DELETE CASCADE"),
        ColumnDef::integer("technology_id").references("technology(id) ON DELETE CASCADE"),
    ],
    relations: &[
        RelationDef {
            name: "question",
            target: Question::schema,
            kind: RelationKind::ToOne {
                local_column: "question_id",
            },
        },
        RelationDef {
            name: "technology",
            target: Technology::schema,
            kind: RelationKind::ToOne {
                local_column: "technology_id",
            },
        },
    ],
    unique_together: &[&["question_id", "technology_id"]],
    ordering: &[OrderBy::ascending("created_at")],
};

/// Link between a question and one of its technologies. Each pair is unique.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuestionTechnology {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub question_id: i64,
    pub technology_id: i64,

    #[serde(skip)]
    pub question: Option<Question>,
    #[serde(skip)]
    pub technology: Option<Technology>,
}

impl Entity for QuestionTechnology {
    fn schema() -> &'static EntitySchema {
        &QUESTION_TECHNOLOGY_SCHEMA
    }

    fn from_row(row: &SqliteRow, prefix: &str) -> RepositoryResult<Self> {
        let r = RowReader::new(row, QUESTION_TECHNOLOGY_SCHEMA.verbose_name, prefix);
        Ok(Self {
            id: r.get("id")?,
            created_at: r.timestamp("created_at")?,
            updated_at: r.timestamp("updated_at")?,
            question_id: r.get("question_id")?,
            technology_id: r.get("technology_id")?,
            question: None,
            technology: None,
        })
    }

    column_accessors!(id, created_at, updated_at, question_id, technology_id);

    fn attach_joined(&mut self, relation: &str, row: &SqliteRow) -> RepositoryResult<()> {
        match relation {
            "question" => self.question = decode_joined(row, relation)?,
            "technology" => self.technology = decode_joined(row, relation)?,
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
            "question" => {
                load_relation(entities, relation, session, |qt: &mut Self, mut rows| {
                    qt.question = rows.pop()
                })
                .await
            }
            "technology" => {
                load_relation(entities, relation, session, |qt: &mut Self, mut rows| {
                    qt.technology = rows.pop()
                })
                .await
            }
            other => Err(unknown_relation::<Self>(other)),
        }
    }
}
