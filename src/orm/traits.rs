//! Static entity declarations and the `Entity` trait
//!
//! Every table the repository layer can target is described once by an
//! [`EntitySchema`]: its columns, relations and natural ordering. Filter,
//! ordering and eager-load field names are resolved against this schema, so
//! a misspelt field is reported as [`RepositoryError::UnknownField`] instead
//! of silently producing broken SQL.

use std::borrow::Cow;

use sqlx::sqlite::SqliteRow;

use crate::db::Session;

use super::error::{RepositoryError, RepositoryResult};
use super::value::SqlValue;

/// Name of the surrogate key column shared by every entity.
pub const PRIMARY_KEY: &str = "id";

/// Column definition for schema generation.
#[derive(Debug, Clone, Copy)]
pub struct ColumnDef {
    /// Column name in the database
    pub name: &'static str,
    /// SQLite column type (TEXT, INTEGER, REAL, BLOB)
    pub sql_type: &'static str,
    /// Whether the column can be NULL
    pub nullable: bool,
    /// Whether this is the primary key
    pub is_primary_key: bool,
    /// Default value expression (e.g., "0")
    pub default: Option<&'static str>,
    /// Foreign key target as `table(column)`
    pub references: Option<&'static str>,
}

impl ColumnDef {
    pub const fn new(name: &'static str, sql_type: &'static str) -> Self {
        Self {
            name,
            sql_type,
            nullable: false,
            is_primary_key: false,
            default: None,
            references: None,
        }
    }

    pub const fn text(name: &'static str) -> Self {
        Self::new(name, "TEXT")
    }

    pub const fn integer(name: &'static str) -> Self {
        Self::new(name, "INTEGER")
    }

    pub const fn real(name: &'static str) -> Self {
        Self::new(name, "REAL")
    }

    pub const fn boolean(name: &'static str) -> Self {
        Self::new(name, "INTEGER")
    }

    pub const fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub const fn default(mut self, expr: &'static str) -> Self {
        self.default = Some(expr);
        self
    }

    pub const fn references(mut self, target: &'static str) -> Self {
        self.references = Some(target);
        self
    }

    /// Auto-incrementing integer surrogate key.
    pub const fn int_pk() -> Self {
        let mut column = Self::new(PRIMARY_KEY, "INTEGER");
        column.is_primary_key = true;
        column
    }

    /// UUID surrogate key, stored as text and generated by the repository.
    pub const fn uuid_pk() -> Self {
        let mut column = Self::new(PRIMARY_KEY, "TEXT");
        column.is_primary_key = true;
        column
    }

    pub const fn created_at() -> Self {
        Self::text("created_at")
    }

    pub const fn updated_at() -> Self {
        Self::text("updated_at")
    }

    /// Generate the column definition SQL
    pub fn to_sql(&self) -> String {
        let mut sql = format!("{} {}", self.name, self.sql_type);

        if self.is_primary_key {
            sql.push_str(" PRIMARY KEY");
            if self.sql_type == "INTEGER" {
                sql.push_str(" AUTOINCREMENT");
            }
        }

        if !self.nullable && !self.is_primary_key {
            sql.push_str(" NOT NULL");
        }

        if let Some(default) = self.default {
            sql.push_str(&format!(" DEFAULT {}", default));
        }

        if let Some(target) = self.references {
            sql.push_str(&format!(" REFERENCES {}", target));
        }

        sql
    }
}

/// How the surrogate key is assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimaryKey {
    /// The database assigns the next integer.
    AutoIncrement,
    /// The repository generates a v4 UUID before inserting.
    Uuid,
}

/// Shape of a relationship between two entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    /// This table holds `local_column` pointing at the target's key.
    ToOne { local_column: &'static str },
    /// The target table holds `remote_column` pointing at this key.
    ToMany { remote_column: &'static str },
    /// Rows are linked through `link_table`, whose `local_column` points at
    /// this key and `remote_column` at the target key.
    ManyToMany {
        link_table: &'static str,
        local_column: &'static str,
        remote_column: &'static str,
    },
}

/// A named relationship declared on an entity.
#[derive(Debug, Clone, Copy)]
pub struct RelationDef {
    pub name: &'static str,
    pub target: fn() -> &'static EntitySchema,
    pub kind: RelationKind,
}

impl RelationDef {
    pub fn target_schema(&self) -> &'static EntitySchema {
        (self.target)()
    }

    /// Whether the relation resolves to a collection of rows.
    pub fn is_collection(&self) -> bool {
        !matches!(self.kind, RelationKind::ToOne { .. })
    }
}

/// Sort direction for ORDER BY clauses.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum OrderDirection {
    /// Ascending order (A-Z, 1-9, oldest-newest)
    #[default]
    Asc,
    /// Descending order (Z-A, 9-1, newest-oldest)
    Desc,
}

impl OrderDirection {
    /// Convert to SQL order string
    pub fn to_sql(&self) -> &'static str {
        match self {
            OrderDirection::Asc => "ASC",
            OrderDirection::Desc => "DESC",
        }
    }
}

/// One `(field, direction)` entry of an ordering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub field: Cow<'static, str>,
    pub direction: OrderDirection,
}

impl OrderBy {
    /// Const constructor used by static schema declarations.
    pub const fn ascending(field: &'static str) -> Self {
        Self {
            field: Cow::Borrowed(field),
            direction: OrderDirection::Asc,
        }
    }

    pub fn asc(field: impl Into<Cow<'static, str>>) -> Self {
        Self {
            field: field.into(),
            direction: OrderDirection::Asc,
        }
    }

    pub fn desc(field: impl Into<Cow<'static, str>>) -> Self {
        Self {
            field: field.into(),
            direction: OrderDirection::Desc,
        }
    }

    /// Parse `"name"` (ascending) or `"-name"` (descending).
    pub fn parse(spec: &str) -> Self {
        match spec.strip_prefix('-') {
            Some(field) => Self::desc(field.to_string()),
            None => Self::asc(spec.to_string()),
        }
    }
}

/// Static description of an entity's table.
#[derive(Debug)]
pub struct EntitySchema {
    /// The SQL table name (e.g., "question")
    pub table: &'static str,
    /// Human readable name used in errors and logs
    pub verbose_name: &'static str,
    pub primary_key: PrimaryKey,
    pub columns: &'static [ColumnDef],
    pub relations: &'static [RelationDef],
    /// Column groups that must be unique together
    pub unique_together: &'static [&'static [&'static str]],
    /// Natural ordering used when the caller supplies none
    pub ordering: &'static [OrderBy],
}

impl EntitySchema {
    pub fn column(&self, name: &str) -> Option<&'static ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn relation(&self, name: &str) -> Option<&'static RelationDef> {
        self.relations.iter().find(|r| r.name == name)
    }

    /// Resolve a field name to a column or fail with `UnknownField`.
    pub fn require_column(&self, name: &str) -> RepositoryResult<&'static ColumnDef> {
        self.column(name)
            .ok_or_else(|| RepositoryError::unknown_field(self.verbose_name, name))
    }

    pub fn require_relation(&self, name: &str) -> RepositoryResult<&'static RelationDef> {
        self.relation(name)
            .ok_or_else(|| RepositoryError::UnknownRelation {
                entity: self.verbose_name,
                relation: name.to_string(),
            })
    }

    /// List of all column names in the table
    pub fn column_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.columns.iter().map(|c| c.name)
    }

    /// Generate CREATE TABLE IF NOT EXISTS SQL
    pub fn create_table_sql(&self) -> String {
        let mut defs: Vec<String> = self.columns.iter().map(|c| c.to_sql()).collect();
        for group in self.unique_together {
            defs.push(format!("UNIQUE ({})", group.join(", ")));
        }

        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n  {}\n)",
            self.table,
            defs.join(",\n  ")
        )
    }

    /// Check that every name the declaration refers to resolves to a real
    /// column. Run once at startup so mistakes surface before the first query.
    pub fn validate(&self) -> RepositoryResult<()> {
        for required in [PRIMARY_KEY, "created_at", "updated_at"] {
            self.require_column(required)?;
        }

        for order in self.ordering {
            self.require_column(&order.field)?;
        }

        for group in self.unique_together {
            for column in group.iter() {
                self.require_column(column)?;
            }
        }

        for relation in self.relations {
            let target = relation.target_schema();
            match relation.kind {
                RelationKind::ToOne { local_column } => {
                    self.require_column(local_column)?;
                }
                RelationKind::ToMany { remote_column } => {
                    target.require_column(remote_column)?;
                }
                RelationKind::ManyToMany { .. } => {}
            }
        }

        Ok(())
    }
}

/// A record type mapped onto an [`EntitySchema`].
///
/// `get_field`/`set_field` are the explicit name-to-accessor mapping that
/// filters and updates go through.
#[allow(async_fn_in_trait)]
pub trait Entity: Sized + Send + Sync {
    fn schema() -> &'static EntitySchema;

    /// Decode a row. Column names are looked up as `{prefix}{column}`.
    fn from_row(row: &SqliteRow, prefix: &str) -> RepositoryResult<Self>;

    /// Read a column value by name.
    fn get_field(&self, field: &str) -> Option<SqlValue>;

    /// Assign a column value by name.
    fn set_field(&mut self, field: &str, value: SqlValue) -> RepositoryResult<()>;

    /// Attach a to-one relation decoded from the same row.
    fn attach_joined(&mut self, relation: &str, _row: &SqliteRow) -> RepositoryResult<()> {
        Err(RepositoryError::UnknownRelation {
            entity: Self::schema().verbose_name,
            relation: relation.to_string(),
        })
    }

    /// Load a relation for all entities with one follow-up query.
    async fn load_batched(
        _entities: &mut [Self],
        relation: &RelationDef,
        _session: &Session,
    ) -> RepositoryResult<()> {
        Err(RepositoryError::UnknownRelation {
            entity: Self::schema().verbose_name,
            relation: relation.name.to_string(),
        })
    }

    fn id_value(&self) -> SqlValue {
        self.get_field(PRIMARY_KEY).unwrap_or(SqlValue::Null)
    }
}
