//! User Entity

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use uuid::Uuid;

use crate::db::Session;
use crate::orm::{
    ColumnDef, Entity, EntitySchema, OrderBy, PrimaryKey, RelationDef, RelationKind,
    RepositoryResult, RowReader, load_relation, unknown_relation,
};

use super::{Answer, Question};

pub static USER_SCHEMA: EntitySchema = EntitySchema {
    table: "user",
    verbose_name: "User",
    primary_key: PrimaryKey::Uuid,
    columns: &[
        ColumnDef::uuid_pk(),
        ColumnDef::created_at(),
        ColumnDef::updated_at(),
        ColumnDef::integer("tg_id").nullable(),
        ColumnDef::text("username").nullable(),
        ColumnDef::text("first_name").nullable(),
        ColumnDef::text("last_name").nullable(),
        ColumnDef::text("password_hash").nullable(),
        ColumnDef::integer("coin").default("0"),
        ColumnDef::boolean("is_admin").default("0"),
        ColumnDef::boolean("is_active").default("1"),
        ColumnDef::text("subscription").default("'free'"),
    ],
    relations: &[
        RelationDef {
            name: "answers",
            target: Answer::schema,
            kind: RelationKind::ToMany {
                remote_column: "user_id",
            },
        },
        RelationDef {
            name: "questions",
            target: Question::schema,
            kind: RelationKind::ManyToMany {
                link_table: "user_question",
                local_column: "user_id",
                remote_column: "question_id",
            },
        },
    ],
    unique_together: &[&["username"], &["tg_id"]],
    ordering: &[OrderBy::ascending("created_at")],
};

/// A platform user. `coin` is the in-app balance spent on assessments.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub tg_id: Option<i64>,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub coin: i64,
    pub is_admin: bool,
    pub is_active: bool,
    pub subscription: String,

    #[serde(skip)]
    pub answers: Option<Vec<Answer>>,
    #[serde(skip)]
    pub questions: Option<Vec<Question>>,
}

impl Entity for User {
    fn schema() -> &'static EntitySchema {
        &USER_SCHEMA
    }

    fn from_row(row: &SqliteRow, prefix: &str) -> RepositoryResult<Self> {
        let r = RowReader::new(row, USER_SCHEMA.verbose_name, prefix);
        Ok(Self {
            id: r.uuid("id")?,
            created_at: r.timestamp("created_at")?,
            updated_at: r.timestamp("updated_at")?,
            tg_id: r.get("tg_id")?,
            username: r.get("username")?,
            first_name: r.get("first_name")?,
            last_name: r.get("last_name")?,
            password_hash: r.get("password_hash")?,
            coin: r.get("coin")?,
            is_admin: r.get("is_admin")?,
            is_active: r.get("is_active")?,
            subscription: r.get("subscription")?,
            answers: None,
            questions: None,
        })
    }

    column_accessors!(
        id,
        created_at,
        updated_at,
        tg_id,
        username,
        first_name,
        last_name,
        password_hash,
        coin,
        is_admin,
        is_active,
        subscription,
    );

    async fn load_batched(
        entities: &mut [Self],
        relation: &RelationDef,
        session: &Session,
    ) -> RepositoryResult<()> {
        match relation.name {
            "answers" => {
                load_relation(entities, relation, session, |u: &mut Self, rows| {
                    u.answers = Some(rows)
                })
                .await
            }
            "questions" => {
                load_relation(entities, relation, session, |u: &mut Self, rows| {
                    u.questions = Some(rows)
                })
                .await
            }
            other => Err(unknown_relation::<Self>(other)),
        }
    }
}
