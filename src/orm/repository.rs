//! Generic repository over one entity type
//!
//! A [`Repository`] is bound to a [`Session`] and never owns the transaction:
//! reads and writes run inside whatever unit of work the session has open,
//! and writes either commit it or only flush, as the caller asks.

use std::marker::PhantomData;

use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;
use tracing::debug;
use uuid::Uuid;

use crate::db::Session;
use crate::db::sqlite_helpers::str_to_datetime;

use super::builder::{Projection, Statement, StatementBuilder};
use super::error::{RepositoryError, RepositoryResult};
use super::filters::{EagerLoad, Filters, Query};
use super::traits::{Entity, OrderBy, PRIMARY_KEY, PrimaryKey};
use super::value::{Fields, SqlValue};

/// Query and persistence operations for entity `E`.
pub struct Repository<E: Entity> {
    session: Session,
    builder: StatementBuilder,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> Clone for Repository<E> {
    fn clone(&self) -> Self {
        Self {
            session: self.session.clone(),
            builder: self.builder,
            _entity: PhantomData,
        }
    }
}

impl<E: Entity> Repository<E> {
    pub fn new(session: Session) -> Self {
        Self {
            session,
            builder: StatementBuilder::for_entity::<E>(),
            _entity: PhantomData,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn builder(&self) -> &StatementBuilder {
        &self.builder
    }

    fn entity_name(&self) -> &'static str {
        self.builder.schema().verbose_name
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Every row, optionally with eager loads and an explicit ordering.
    pub async fn all(
        &self,
        eager_loads: &[EagerLoad],
        order_by: Option<Vec<OrderBy>>,
    ) -> RepositoryResult<Vec<E>> {
        let query = Query {
            eager_loads: eager_loads.to_vec(),
            order_by,
            ..Query::default()
        };
        self.filter(query).await
    }

    /// Rows matching the query, shaped by its ordering, pagination and eager
    /// loads.
    pub async fn filter(&self, query: impl Into<Query>) -> RepositoryResult<Vec<E>> {
        let query = query.into();
        let statement = self.builder.build(&query, Projection::Rows)?;
        let mut entities = self.fetch_rows(&statement).await?;
        self.load_select_in(&statement, &mut entities).await?;
        Ok(entities)
    }

    /// Number of matching rows. Ordering, pagination and eager loads are
    /// ignored.
    pub async fn count(&self, query: impl Into<Query>) -> RepositoryResult<u64> {
        let statement = self.builder.build(&query.into(), Projection::Count)?;
        let row = self.session.fetch_one(&statement).await?;
        let count: i64 = row.try_get(0)?;
        Ok(count.max(0) as u64)
    }

    /// Whether any row matches.
    pub async fn exists(&self, query: impl Into<Query>) -> RepositoryResult<bool> {
        let statement = self.builder.build(&query.into(), Projection::Exists)?;
        let row = self.session.fetch_one(&statement).await?;
        let found: i64 = row.try_get(0)?;
        Ok(found != 0)
    }

    /// Exactly one matching row.
    ///
    /// Fails with `NotFound` when nothing matches and `MultipleResults` when
    /// the filters are ambiguous. Pagination on the query is ignored.
    pub async fn get(&self, query: impl Into<Query>) -> RepositoryResult<E> {
        let mut query = query.into();
        query.limit = Some(2);
        query.offset = None;

        let statement = self.builder.build(&query, Projection::Rows)?;
        let mut entities = self.fetch_rows(&statement).await?;
        match entities.len() {
            0 => Err(RepositoryError::NotFound {
                entity: self.entity_name(),
            }),
            1 => {
                self.load_select_in(&statement, &mut entities).await?;
                entities.pop().ok_or(RepositoryError::NotFound {
                    entity: self.entity_name(),
                })
            }
            _ => Err(RepositoryError::MultipleResults {
                entity: self.entity_name(),
            }),
        }
    }

    /// Like [`get`](Self::get), but "no match" is `None`. Ambiguity is still
    /// an error.
    pub async fn get_or_none(&self, filters: Filters) -> RepositoryResult<Option<E>> {
        match self.get(filters).await {
            Ok(entity) => Ok(Some(entity)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// First row in query order, if any. Never ambiguous.
    pub async fn find(&self, query: impl Into<Query>) -> RepositoryResult<Option<E>> {
        let query = query.into().limit(1);
        Ok(self.filter(query).await?.into_iter().next())
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Insert a row from `data`. The key and both timestamps are assigned
    /// here; supplying them is an error.
    pub async fn create(&self, data: Fields, commit: bool) -> RepositoryResult<E> {
        self.builder.check_assignable(&data)?;

        let mut row = data;
        let now = Utc::now();
        if self.builder.schema().primary_key == PrimaryKey::Uuid {
            row.insert(PRIMARY_KEY.to_string(), Uuid::new_v4().into());
        }
        row.insert("created_at".to_string(), now.into());
        row.insert("updated_at".to_string(), now.into());

        let statement = self.builder.insert(&row)?;
        let inserted = self.session.fetch_one(&statement).await?;
        let entity = E::from_row(&inserted, "")?;
        self.finish(commit).await?;

        debug!(entity = self.entity_name(), id = %entity.id_value(), "Created row");
        Ok(entity)
    }

    /// Apply `data` to `entity` and persist the changed columns.
    ///
    /// `updated_at` is refreshed and never moves backwards. Fails with
    /// `NotFound` when the row no longer exists.
    pub async fn update(&self, mut entity: E, data: Fields, commit: bool) -> RepositoryResult<E> {
        self.builder.check_assignable(&data)?;

        let touched = touch(entity.get_field("updated_at"));
        let mut row = data;
        row.insert("updated_at".to_string(), touched.into());
        for (field, value) in &row {
            entity.set_field(field, value.clone())?;
        }

        let id = entity.id_value();
        let statement = self.builder.update(&id, &row)?;
        if self.session.execute(&statement).await? == 0 {
            return Err(RepositoryError::NotFound {
                entity: self.entity_name(),
            });
        }
        self.finish(commit).await?;

        debug!(entity = self.entity_name(), id = %id, fields = row.len(), "Updated row");
        Ok(entity)
    }

    /// Remove the entity's row.
    pub async fn delete(&self, entity: &E, commit: bool) -> RepositoryResult<()> {
        let id = entity.id_value();
        let statement = self.builder.delete(&id);
        if self.session.execute(&statement).await? == 0 {
            return Err(RepositoryError::NotFound {
                entity: self.entity_name(),
            });
        }
        self.finish(commit).await?;

        debug!(entity = self.entity_name(), id = %id, "Deleted row");
        Ok(())
    }

    /// Return the first row matching the selector, or create one from
    /// `data`. The flag is `true` when a row was created.
    ///
    /// The selector names the fields of `data` to look up by; a selector
    /// field absent from `data` matches NULL. An empty selector looks up by
    /// all of `data`.
    pub async fn get_or_create(
        &self,
        selector: &[&str],
        data: Fields,
        commit: bool,
    ) -> RepositoryResult<(E, bool)> {
        let lookup: Fields = if selector.is_empty() {
            data.clone()
        } else {
            selector
                .iter()
                .map(|field| {
                    let value = data.get(*field).cloned().unwrap_or(SqlValue::Null);
                    (field.to_string(), value)
                })
                .collect()
        };

        if let Some(existing) = self.find(Filters::from_fields(&lookup)).await? {
            return Ok((existing, false));
        }
        Ok((self.create(data, commit).await?, true))
    }

    /// Update the row matching `lookup` with `data`, or create one. The flag
    /// is `true` when a row was created.
    ///
    /// A created row carries both maps; where they name the same field the
    /// lookup value is stored, so the new row matches `lookup`.
    pub async fn update_or_create(
        &self,
        lookup: Fields,
        data: Fields,
        commit: bool,
    ) -> RepositoryResult<(E, bool)> {
        match self.get_or_none(Filters::from_fields(&lookup)).await? {
            Some(existing) => Ok((self.update(existing, data, commit).await?, false)),
            None => {
                let mut merged = data;
                merged.extend(lookup);
                Ok((self.create(merged, commit).await?, true))
            }
        }
    }

    // ========================================================================
    // Internals
    // ========================================================================

    async fn fetch_rows(&self, statement: &Statement) -> RepositoryResult<Vec<E>> {
        let rows = self.session.fetch_all(statement).await?;
        rows.iter().map(|row| self.decode(statement, row)).collect()
    }

    fn decode(&self, statement: &Statement, row: &SqliteRow) -> RepositoryResult<E> {
        let mut entity = E::from_row(row, "")?;
        for relation in &statement.joined {
            entity.attach_joined(relation.name, row)?;
        }
        Ok(entity)
    }

    async fn load_select_in(
        &self,
        statement: &Statement,
        entities: &mut [E],
    ) -> RepositoryResult<()> {
        if entities.is_empty() {
            return Ok(());
        }
        for relation in &statement.select_in {
            E::load_batched(entities, relation, &self.session).await?;
        }
        Ok(())
    }

    async fn finish(&self, commit: bool) -> RepositoryResult<()> {
        if commit {
            self.session.commit().await
        } else {
            self.session.flush().await
        }
    }
}

/// Next `updated_at`: now, unless the stored value is already later.
fn touch(previous: Option<SqlValue>) -> DateTime<Utc> {
    let now = Utc::now();
    previous
        .as_ref()
        .and_then(SqlValue::as_str)
        .and_then(|s| str_to_datetime(s).ok())
        .map_or(now, |previous| previous.max(now))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_touch_never_goes_backwards() {
        let future = Utc::now() + Duration::hours(1);
        let touched = touch(Some(SqlValue::from(future)));
        assert!(touched >= future - Duration::microseconds(1));

        let past = Utc::now() - Duration::hours(1);
        assert!(touch(Some(SqlValue::from(past))) > past);
        assert!(touch(None) <= Utc::now());
    }
}
