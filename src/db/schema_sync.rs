//! Bring the database in line with the entity declarations
//!
//! Missing tables are created and missing columns are added. Renames, type
//! changes and dropped columns are left alone. Each table is planned from
//! what `PRAGMA table_info` reports and the plan is then applied step by
//! step; a failing step is recorded and the rest still run.

use sqlx::{Row, SqlitePool};
use tracing::{debug, info, warn};

use crate::orm::{ColumnDef, EntitySchema};

use super::entities::ALL_SCHEMAS;

/// Outcome of synchronising one or more tables.
#[derive(Debug, Default)]
pub struct SchemaSyncResult {
    pub tables_created: Vec<String>,
    /// `(table, column)` pairs
    pub columns_added: Vec<(String, String)>,
    pub errors: Vec<String>,
}

impl SchemaSyncResult {
    fn merge(&mut self, other: SchemaSyncResult) {
        self.tables_created.extend(other.tables_created);
        self.columns_added.extend(other.columns_added);
        self.errors.extend(other.errors);
    }

    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// A single DDL statement needed to match a declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncStep {
    CreateTable {
        table: &'static str,
        sql: String,
    },
    AddColumn {
        table: &'static str,
        column: &'static str,
        sql: String,
    },
}

impl SyncStep {
    fn sql(&self) -> &str {
        match self {
            SyncStep::CreateTable { sql, .. } | SyncStep::AddColumn { sql, .. } => sql,
        }
    }
}

/// Steps that turn a table with `existing` columns into `schema`. `None`
/// means the table does not exist yet.
pub fn plan(schema: &'static EntitySchema, existing: Option<&[String]>) -> Vec<SyncStep> {
    let Some(existing) = existing else {
        return vec![SyncStep::CreateTable {
            table: schema.table,
            sql: schema.create_table_sql(),
        }];
    };

    schema
        .columns
        .iter()
        .filter(|column| !existing.iter().any(|name| name == column.name))
        .map(|column| SyncStep::AddColumn {
            table: schema.table,
            column: column.name,
            sql: add_column_sql(schema.table, column),
        })
        .collect()
}

/// `ALTER TABLE ... ADD COLUMN`. SQLite refuses a NOT NULL column without a
/// default, so one is supplied from the column type when none is declared.
/// Foreign key references are only declared at table creation.
fn add_column_sql(table: &str, column: &ColumnDef) -> String {
    let mut sql = format!("ALTER TABLE {} ADD COLUMN {} {}", table, column.name, column.sql_type);
    if column.nullable {
        if let Some(default) = column.default {
            sql.push_str(&format!(" DEFAULT {}", default));
        }
        return sql;
    }

    let default = column.default.unwrap_or(match column.sql_type {
        "INTEGER" => "0",
        "REAL" => "0.0",
        _ => "''",
    });
    sql.push_str(&format!(" NOT NULL DEFAULT {}", default));
    sql
}

/// Column names of `table`, or `None` when the table is missing.
async fn existing_columns(pool: &SqlitePool, table: &str) -> Result<Option<Vec<String>>, sqlx::Error> {
    let rows = sqlx::query(&format!("PRAGMA table_info({})", table))
        .fetch_all(pool)
        .await?;
    if rows.is_empty() {
        return Ok(None);
    }
    rows.iter()
        .map(|row| row.try_get::<String, _>("name"))
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

/// Synchronise one entity's table.
pub async fn sync_schema(
    pool: &SqlitePool,
    schema: &'static EntitySchema,
) -> Result<SchemaSyncResult, sqlx::Error> {
    let mut result = SchemaSyncResult::default();

    if let Err(e) = schema.validate() {
        let message = format!("Invalid declaration for {}: {}", schema.table, e);
        warn!("{}", message);
        result.errors.push(message);
        return Ok(result);
    }

    let existing = existing_columns(pool, schema.table).await?;
    for step in plan(schema, existing.as_deref()) {
        debug!(sql = step.sql(), "Applying schema step");
        match sqlx::query(step.sql()).execute(pool).await {
            Ok(_) => match step {
                SyncStep::CreateTable { table, .. } => {
                    info!(table, "Created table");
                    result.tables_created.push(table.to_string());
                }
                SyncStep::AddColumn { table, column, .. } => {
                    info!(table, column, "Added column");
                    result.columns_added.push((table.to_string(), column.to_string()));
                }
            },
            Err(e) => {
                let message = format!("Schema step failed ({}): {}", step.sql(), e);
                warn!("{}", message);
                result.errors.push(message);
            }
        }
    }

    Ok(result)
}

/// Synchronise every entity table, referenced tables first.
pub async fn sync_all_entity_schemas(pool: &SqlitePool) -> SchemaSyncResult {
    let mut total = SchemaSyncResult::default();
    for schema in ALL_SCHEMAS {
        match sync_schema(pool, schema).await {
            Ok(result) => total.merge(result),
            Err(e) => total
                .errors
                .push(format!("Could not inspect {}: {}", schema.table, e)),
        }
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::entities::QUESTION_SCHEMA;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_missing_table_is_created() {
        let steps = plan(&QUESTION_SCHEMA, None);
        assert_eq!(steps.len(), 1);
        assert!(matches!(&steps[0], SyncStep::CreateTable { table: "question", sql }
            if sql.starts_with("CREATE TABLE IF NOT EXISTS question")));
    }

    #[test]
    fn test_only_missing_columns_are_added() {
        let existing: Vec<String> = ["id", "created_at", "updated_at", "text", "answer", "is_published"]
            .into_iter()
            .map(String::from)
            .collect();
        let steps = plan(&QUESTION_SCHEMA, Some(&existing));
        assert_eq!(
            steps,
            vec![SyncStep::AddColumn {
                table: "question",
                column: "difficulty",
                sql: "ALTER TABLE question ADD COLUMN difficulty INTEGER NOT NULL DEFAULT 1".into(),
            }]
        );
    }

    #[test]
    fn test_add_column_defaults() {
        assert_eq!(
            add_column_sql("question", &ColumnDef::integer("rank")),
            "ALTER TABLE question ADD COLUMN rank INTEGER NOT NULL DEFAULT 0"
        );
        assert_eq!(
            add_column_sql("question", &ColumnDef::text("answer").nullable()),
            "ALTER TABLE question ADD COLUMN answer TEXT"
        );
        assert_eq!(
            add_column_sql("answer", &ColumnDef::real("score").nullable().default("0.5")),
            "ALTER TABLE answer ADD COLUMN score REAL DEFAULT 0.5"
        );
    }

    #[test]
    fn test_every_declaration_is_valid() {
        for schema in ALL_SCHEMAS {
            schema.validate().unwrap();
        }
    }

    #[tokio::test]
    async fn test_sync_is_idempotent() {
        let db = crate::db::Database::connect_in_memory().await.unwrap();
        let first = sync_all_entity_schemas(db.pool()).await;
        assert!(first.is_ok(), "{:?}", first.errors);
        assert_eq!(first.tables_created.len(), ALL_SCHEMAS.len());

        let second = sync_all_entity_schemas(db.pool()).await;
        assert!(second.is_ok());
        assert!(second.tables_created.is_empty());
        assert!(second.columns_added.is_empty());
    }
}
