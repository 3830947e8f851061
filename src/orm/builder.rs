//! SQL statement builder for entity queries
//!
//! Turns a [`Query`] into a parameterised SQLite statement for one entity.
//! Building is pure: the same schema and query always produce the same SQL
//! and bind values, and nothing touches storage.

use super::error::{RepositoryError, RepositoryResult};
use super::filters::{Filters, LoadStrategy, Query};
use super::operators::{FieldTarget, Predicate, not_equal};
use super::traits::{Entity, EntitySchema, OrderBy, PRIMARY_KEY, RelationDef, RelationKind};
use super::value::{Fields, SqlValue};

/// Columns the repository assigns itself.
pub const MANAGED_COLUMNS: [&str; 3] = [PRIMARY_KEY, "created_at", "updated_at"];

/// What the SELECT projects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Projection {
    /// Entity rows, with ordering, pagination and joined relations.
    Rows,
    /// `COUNT(*)` of the filtered rows.
    Count,
    /// `EXISTS` check over the filtered rows.
    Exists,
}

/// A ready-to-run statement.
#[derive(Debug, Clone)]
pub struct Statement {
    pub sql: String,
    pub values: Vec<SqlValue>,
    /// To-one relations selected through LEFT JOIN, decoded from each row.
    pub joined: Vec<&'static RelationDef>,
    /// Relations to load with a follow-up query after the rows arrive.
    pub select_in: Vec<&'static RelationDef>,
}

impl Statement {
    fn plain(sql: String, values: Vec<SqlValue>) -> Self {
        Self {
            sql,
            values,
            joined: Vec::new(),
            select_in: Vec::new(),
        }
    }

    /// Whether running the statement changes rows.
    pub fn writes(&self) -> bool {
        ["INSERT", "UPDATE", "DELETE"]
            .iter()
            .any(|verb| self.sql.trim_start().starts_with(verb))
    }

    /// Bind all values onto a sqlx query in placeholder order.
    pub fn query(&self) -> sqlx::query::Query<'_, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'_>> {
        self.values
            .iter()
            .fold(sqlx::query(&self.sql), |query, value| value.bind_to_query(query))
    }
}

/// Column-name prefix of a relation selected through a join.
pub fn joined_prefix(relation: &RelationDef) -> String {
    format!("{}__", relation.name)
}

fn joined_alias(relation: &RelationDef) -> String {
    format!("j_{}", relation.name)
}

/// Builds statements against one entity schema.
#[derive(Debug, Clone, Copy)]
pub struct StatementBuilder {
    schema: &'static EntitySchema,
}

impl StatementBuilder {
    pub fn new(schema: &'static EntitySchema) -> Self {
        Self { schema }
    }

    pub fn for_entity<E: Entity>() -> Self {
        Self::new(E::schema())
    }

    pub fn schema(&self) -> &'static EntitySchema {
        self.schema
    }

    /// Build a SELECT for `query`.
    ///
    /// Count and exists projections ignore ordering, pagination and eager
    /// loads so that output shaping never changes how many rows match.
    pub fn build(&self, query: &Query, projection: Projection) -> RepositoryResult<Statement> {
        let table = self.schema.table;
        let condition = self.where_clause(&query.filters, &query.excludes)?;
        let (where_sql, values) = match condition {
            Some(predicate) => (format!(" WHERE {}", predicate.sql), predicate.values),
            None => (String::new(), Vec::new()),
        };

        match projection {
            Projection::Count => Ok(Statement::plain(
                format!("SELECT COUNT(*) FROM {}{}", table, where_sql),
                values,
            )),
            Projection::Exists => Ok(Statement::plain(
                format!("SELECT EXISTS (SELECT 1 FROM {}{})", table, where_sql),
                values,
            )),
            Projection::Rows => {
                let (joined, select_in) = self.resolve_eager_loads(query)?;

                let mut columns: Vec<String> = self
                    .schema
                    .column_names()
                    .map(|c| format!("{table}.{c} AS {c}"))
                    .collect();
                let mut joins = String::new();
                for relation in &joined {
                    let RelationKind::ToOne { local_column } = relation.kind else {
                        continue;
                    };
                    let target = relation.target_schema();
                    let alias = joined_alias(relation);
                    let prefix = joined_prefix(relation);
                    columns.extend(
                        target
                            .column_names()
                            .map(|c| format!("{alias}.{c} AS {prefix}{c}")),
                    );
                    joins.push_str(&format!(
                        " LEFT JOIN {} AS {alias} ON {alias}.{PRIMARY_KEY} = {table}.{local_column}",
                        target.table
                    ));
                }

                let mut sql = format!("SELECT {} FROM {}{}", columns.join(", "), table, joins);
                sql.push_str(&where_sql);
                if let Some(order) = self.order_clause(query.order_by.as_deref())? {
                    sql.push_str(" ORDER BY ");
                    sql.push_str(&order);
                }
                sql.push_str(&pagination_clause(query.limit, query.offset));

                Ok(Statement {
                    sql,
                    values,
                    joined,
                    select_in,
                })
            }
        }
    }

    /// AND of every filter condition and every exclusion, or `None` when
    /// there is nothing to filter on.
    pub fn where_clause(
        &self,
        filters: &Filters,
        excludes: &Fields,
    ) -> RepositoryResult<Option<Predicate>> {
        let mut parts = Vec::with_capacity(filters.len() + excludes.len());
        let mut values = Vec::new();

        for condition in filters.conditions() {
            let target = self.resolve_field(&condition.field)?;
            let predicate = condition.operator.apply(&target, &condition.operand)?;
            parts.push(predicate.sql);
            values.extend(predicate.values);
        }

        for (field, value) in excludes {
            let column = self.schema.require_column(field)?;
            let predicate = not_equal(&format!("{}.{}", self.schema.table, column.name), value);
            parts.push(predicate.sql);
            values.extend(predicate.values);
        }

        if parts.is_empty() {
            return Ok(None);
        }
        Ok(Some(Predicate::new(parts.join(" AND "), values)))
    }

    /// ORDER BY body. Caller ordering wins over the natural ordering; the
    /// primary key is appended as a tie-breaker so that pagination is stable.
    pub fn order_clause(&self, order_by: Option<&[OrderBy]>) -> RepositoryResult<Option<String>> {
        let order = order_by.unwrap_or(self.schema.ordering);
        if order.is_empty() {
            return Ok(None);
        }

        let table = self.schema.table;
        let mut parts = Vec::with_capacity(order.len() + 1);
        for entry in order {
            let column = self.schema.require_column(&entry.field)?;
            parts.push(format!("{}.{} {}", table, column.name, entry.direction.to_sql()));
        }
        if !order.iter().any(|entry| entry.field == PRIMARY_KEY) {
            parts.push(format!("{}.{} ASC", table, PRIMARY_KEY));
        }
        Ok(Some(parts.join(", ")))
    }

    /// `INSERT ... RETURNING` for a full row of already-validated fields.
    pub fn insert(&self, fields: &Fields) -> RepositoryResult<Statement> {
        let mut names = Vec::with_capacity(fields.len());
        for field in fields.keys() {
            names.push(self.schema.require_column(field)?.name);
        }

        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
            self.schema.table,
            names.join(", "),
            vec!["?"; names.len()].join(", "),
            self.schema.column_names().collect::<Vec<_>>().join(", ")
        );
        Ok(Statement::plain(sql, fields.values().cloned().collect()))
    }

    /// `UPDATE ... WHERE id = ?` assigning `fields`.
    pub fn update(&self, id: &SqlValue, fields: &Fields) -> RepositoryResult<Statement> {
        let mut assignments = Vec::with_capacity(fields.len());
        for field in fields.keys() {
            assignments.push(format!("{} = ?", self.schema.require_column(field)?.name));
        }

        let sql = format!(
            "UPDATE {} SET {} WHERE {} = ?",
            self.schema.table,
            assignments.join(", "),
            PRIMARY_KEY
        );
        let mut values: Vec<SqlValue> = fields.values().cloned().collect();
        values.push(id.clone());
        Ok(Statement::plain(sql, values))
    }

    pub fn delete(&self, id: &SqlValue) -> Statement {
        Statement::plain(
            format!("DELETE FROM {} WHERE {} = ?", self.schema.table, PRIMARY_KEY),
            vec![id.clone()],
        )
    }

    /// Reject assignments to the key and timestamp columns.
    pub fn check_assignable(&self, fields: &Fields) -> RepositoryResult<()> {
        for field in fields.keys() {
            if MANAGED_COLUMNS.contains(&field.as_str()) {
                return Err(RepositoryError::ManagedField {
                    entity: self.schema.verbose_name,
                    field: field.clone(),
                });
            }
            self.schema.require_column(field)?;
        }
        Ok(())
    }

    fn resolve_field<'a>(&self, field: &'a str) -> RepositoryResult<FieldTarget<'a>> {
        if let Some(column) = self.schema.column(field) {
            return Ok(FieldTarget::Column {
                table: self.schema.table,
                column: column.name,
            });
        }
        if let Some(relation) = self.schema.relation(field) {
            return Ok(FieldTarget::Relation {
                table: self.schema.table,
                relation,
            });
        }
        Err(RepositoryError::unknown_field(self.schema.verbose_name, field))
    }

    #[allow(clippy::type_complexity)]
    fn resolve_eager_loads(
        &self,
        query: &Query,
    ) -> RepositoryResult<(Vec<&'static RelationDef>, Vec<&'static RelationDef>)> {
        let mut joined: Vec<&'static RelationDef> = Vec::new();
        let mut select_in: Vec<&'static RelationDef> = Vec::new();

        for load in &query.eager_loads {
            let relation = self.schema.require_relation(&load.relation)?;
            let bucket = match load.strategy {
                LoadStrategy::Joined => {
                    if relation.is_collection() {
                        return Err(RepositoryError::UnsupportedEagerLoad {
                            entity: self.schema.verbose_name,
                            relation: relation.name,
                        });
                    }
                    &mut joined
                }
                LoadStrategy::SelectIn => &mut select_in,
            };
            if !bucket.iter().any(|r| r.name == relation.name) {
                bucket.push(relation);
            }
        }

        Ok((joined, select_in))
    }
}

fn pagination_clause(limit: Option<u64>, offset: Option<u64>) -> String {
    match (limit, offset) {
        (None, None) => String::new(),
        (Some(limit), None) => format!(" LIMIT {}", limit),
        (limit, Some(offset)) => {
            let limit = limit.map_or_else(|| "-1".to_string(), |l| l.to_string());
            format!(" LIMIT {} OFFSET {}", limit, offset)
        }
    }
}
