//! Relation loading helpers used by `Entity` implementations
//!
//! Joined relations are decoded from the primary row under the
//! `{relation}__` column prefix. Select-in relations run one extra query per
//! relation, keyed by every parent in the batch, and hand each parent its
//! slice of the result.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Decode, Row, Sqlite, Type, ValueRef};
use uuid::Uuid;

use crate::db::Session;
use crate::db::sqlite_helpers::{str_to_datetime, str_to_uuid};

use super::builder::{Projection, Statement, StatementBuilder};
use super::error::{RepositoryError, RepositoryResult};
use super::filters::{Filters, Query};
use super::traits::{Entity, PRIMARY_KEY, RelationDef, RelationKind};
use super::value::SqlValue;

const PARENT_KEY_COLUMN: &str = "__parent_key";

/// Typed column access for `Entity::from_row`.
pub struct RowReader<'r> {
    row: &'r SqliteRow,
    entity: &'static str,
    prefix: &'r str,
}

impl<'r> RowReader<'r> {
    pub fn new(row: &'r SqliteRow, entity: &'static str, prefix: &'r str) -> Self {
        Self { row, entity, prefix }
    }

    pub fn get<T>(&self, column: &str) -> RepositoryResult<T>
    where
        T: Decode<'r, Sqlite> + Type<Sqlite>,
    {
        let name = format!("{}{}", self.prefix, column);
        self.row
            .try_get::<T, _>(name.as_str())
            .map_err(|e| RepositoryError::decode(self.entity, name, e))
    }

    pub fn uuid(&self, column: &str) -> RepositoryResult<Uuid> {
        let raw: String = self.get(column)?;
        str_to_uuid(&raw).map_err(|e| RepositoryError::decode(self.entity, column, e))
    }

    pub fn timestamp(&self, column: &str) -> RepositoryResult<DateTime<Utc>> {
        let raw: String = self.get(column)?;
        str_to_datetime(&raw).map_err(|e| RepositoryError::decode(self.entity, column, e))
    }
}

/// Decode a relation selected through a LEFT JOIN. `None` when the join
/// matched nothing.
pub fn decode_joined<T: Entity>(row: &SqliteRow, relation: &str) -> RepositoryResult<Option<T>> {
    let prefix = format!("{relation}__");
    let key = format!("{prefix}{PRIMARY_KEY}");
    let raw = row
        .try_get_raw(key.as_str())
        .map_err(|e| RepositoryError::decode(T::schema().verbose_name, key.as_str(), e))?;
    if raw.is_null() {
        return Ok(None);
    }
    T::from_row(row, &prefix).map(Some)
}

/// Error for a relation name an entity does not know how to load.
pub fn unknown_relation<E: Entity>(relation: &str) -> RepositoryError {
    RepositoryError::UnknownRelation {
        entity: E::schema().verbose_name,
        relation: relation.to_string(),
    }
}

/// Load `relation` for every parent with a single query and pass each parent
/// the rows that belong to it. To-one relations receive zero or one row.
pub async fn load_relation<P, T, F>(
    parents: &mut [P],
    relation: &RelationDef,
    session: &Session,
    mut assign: F,
) -> RepositoryResult<()>
where
    P: Entity,
    T: Entity + Clone,
    F: FnMut(&mut P, Vec<T>),
{
    match relation.kind {
        RelationKind::ToOne { local_column } => {
            let keys = distinct_keys(parents.iter().filter_map(|p| p.get_field(local_column)));
            let targets = fetch_keyed::<T>(session, PRIMARY_KEY, keys).await?;
            let by_key: HashMap<String, T> = targets.into_iter().collect();
            for parent in parents.iter_mut() {
                let item = parent
                    .get_field(local_column)
                    .and_then(|key| by_key.get(&key.to_string()).cloned());
                assign(parent, item.into_iter().collect());
            }
        }
        RelationKind::ToMany { remote_column } => {
            let keys = distinct_keys(parents.iter().map(Entity::id_value));
            let children = fetch_keyed::<T>(session, remote_column, keys).await?;
            distribute(parents, group(children), assign);
        }
        RelationKind::ManyToMany {
            link_table,
            local_column,
            remote_column,
        } => {
            let keys = distinct_keys(parents.iter().map(Entity::id_value));
            let linked =
                fetch_linked::<T>(session, link_table, local_column, remote_column, keys).await?;
            distribute(parents, group(linked), assign);
        }
    }
    Ok(())
}

fn distinct_keys(values: impl Iterator<Item = SqlValue>) -> Vec<SqlValue> {
    let mut keys: Vec<SqlValue> = Vec::new();
    for value in values.filter(|v| !v.is_null()) {
        if !keys.contains(&value) {
            keys.push(value);
        }
    }
    keys
}

fn group<T>(rows: Vec<(String, T)>) -> HashMap<String, Vec<T>> {
    let mut grouped: HashMap<String, Vec<T>> = HashMap::new();
    for (key, row) in rows {
        grouped.entry(key).or_default().push(row);
    }
    grouped
}

fn distribute<P: Entity, T>(
    parents: &mut [P],
    mut grouped: HashMap<String, Vec<T>>,
    mut assign: impl FnMut(&mut P, Vec<T>),
) {
    for parent in parents.iter_mut() {
        let rows = grouped
            .remove(&parent.id_value().to_string())
            .unwrap_or_default();
        assign(parent, rows);
    }
}

/// Rows of `T` whose `column` is one of `keys`, paired with that key.
async fn fetch_keyed<T: Entity>(
    session: &Session,
    column: &str,
    keys: Vec<SqlValue>,
) -> RepositoryResult<Vec<(String, T)>> {
    if keys.is_empty() {
        return Ok(Vec::new());
    }

    let query = Query::from(Filters::new().is_in(column, keys));
    let statement = StatementBuilder::for_entity::<T>().build(&query, Projection::Rows)?;
    let rows = session.fetch_all(&statement).await?;

    let mut keyed = Vec::with_capacity(rows.len());
    for row in &rows {
        let entity = T::from_row(row, "")?;
        let key = entity
            .get_field(column)
            .unwrap_or(SqlValue::Null)
            .to_string();
        keyed.push((key, entity));
    }
    Ok(keyed)
}

/// Targets reachable through a link table, paired with the parent key they
/// were linked from.
async fn fetch_linked<T: Entity>(
    session: &Session,
    link_table: &str,
    local_column: &str,
    remote_column: &str,
    keys: Vec<SqlValue>,
) -> RepositoryResult<Vec<(String, T)>> {
    if keys.is_empty() {
        return Ok(Vec::new());
    }

    let builder = StatementBuilder::for_entity::<T>();
    let schema = builder.schema();
    let table = schema.table;

    let mut sql = format!(
        "SELECT {}, {link_table}.{local_column} AS {PARENT_KEY_COLUMN} FROM {table} \
         JOIN {link_table} ON {link_table}.{remote_column} = {table}.{PRIMARY_KEY} \
         WHERE {link_table}.{local_column} IN ({})",
        schema
            .column_names()
            .map(|c| format!("{table}.{c} AS {c}"))
            .collect::<Vec<_>>()
            .join(", "),
        vec!["?"; keys.len()].join(", "),
    );
    if let Some(order) = builder.order_clause(None)? {
        sql.push_str(" ORDER BY ");
        sql.push_str(&order);
    }

    let statement = Statement {
        sql,
        values: keys,
        joined: Vec::new(),
        select_in: Vec::new(),
    };
    let rows = session.fetch_all(&statement).await?;

    let mut linked = Vec::with_capacity(rows.len());
    for row in &rows {
        let key = read_key(row, PARENT_KEY_COLUMN, schema.verbose_name)?;
        linked.push((key, T::from_row(row, "")?));
    }
    Ok(linked)
}

/// Read a key column that may hold an integer or a text UUID, rendered the
/// same way `SqlValue` displays it.
fn read_key(row: &SqliteRow, column: &str, entity: &'static str) -> RepositoryResult<String> {
    if let Ok(key) = row.try_get::<i64, _>(column) {
        return Ok(key.to_string());
    }
    row.try_get::<String, _>(column)
        .map_err(|e| RepositoryError::decode(entity, column, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distinct_keys_skip_nulls_and_duplicates() {
        let keys = distinct_keys(
            vec![
                SqlValue::Int(1),
                SqlValue::Null,
                SqlValue::Int(2),
                SqlValue::Int(1),
            ]
            .into_iter(),
        );
        assert_eq!(keys, vec![SqlValue::Int(1), SqlValue::Int(2)]);
    }

    #[test]
    fn test_group_keeps_row_order() {
        let grouped = group(vec![
            ("1".to_string(), "a"),
            ("2".to_string(), "b"),
            ("1".to_string(), "c"),
        ]);
        assert_eq!(grouped["1"], vec!["a", "c"]);
        assert_eq!(grouped["2"], vec!["b"]);
    }
}
