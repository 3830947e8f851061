//! Generic entity service
//!
//! Forwards every operation to the entity's repository. Entities whose
//! writes carry side effects (users) have a dedicated service instead.

use crate::db::Session;
use crate::orm::{EagerLoad, Entity, Fields, Filters, OrderBy, Query, Repository};

use super::error::ServiceResult;

pub struct EntityService<E: Entity> {
    repository: Repository<E>,
}

impl<E: Entity> Clone for EntityService<E> {
    fn clone(&self) -> Self {
        Self {
            repository: self.repository.clone(),
        }
    }
}

impl<E: Entity> EntityService<E> {
    pub fn new(session: &Session) -> Self {
        Self {
            repository: session.repository(),
        }
    }

    pub fn repository(&self) -> &Repository<E> {
        &self.repository
    }

    pub async fn all(
        &self,
        eager_loads: &[EagerLoad],
        order_by: Option<Vec<OrderBy>>,
    ) -> ServiceResult<Vec<E>> {
        Ok(self.repository.all(eager_loads, order_by).await?)
    }

    pub async fn filter(&self, query: impl Into<Query>) -> ServiceResult<Vec<E>> {
        Ok(self.repository.filter(query).await?)
    }

    pub async fn get(&self, query: impl Into<Query>) -> ServiceResult<E> {
        Ok(self.repository.get(query).await?)
    }

    pub async fn get_or_none(&self, filters: Filters) -> ServiceResult<Option<E>> {
        Ok(self.repository.get_or_none(filters).await?)
    }

    pub async fn find(&self, query: impl Into<Query>) -> ServiceResult<Option<E>> {
        Ok(self.repository.find(query).await?)
    }

    pub async fn count(&self, query: impl Into<Query>) -> ServiceResult<u64> {
        Ok(self.repository.count(query).await?)
    }

    pub async fn exists(&self, query: impl Into<Query>) -> ServiceResult<bool> {
        Ok(self.repository.exists(query).await?)
    }

    pub async fn create(&self, data: Fields, commit: bool) -> ServiceResult<E> {
        Ok(self.repository.create(data, commit).await?)
    }

    pub async fn update(&self, entity: E, data: Fields, commit: bool) -> ServiceResult<E> {
        Ok(self.repository.update(entity, data, commit).await?)
    }

    pub async fn delete(&self, entity: &E, commit: bool) -> ServiceResult<()> {
        Ok(self.repository.delete(entity, commit).await?)
    }

    pub async fn get_or_create(
        &self,
        selector: &[&str],
        data: Fields,
        commit: bool,
    ) -> ServiceResult<(E, bool)> {
        Ok(self.repository.get_or_create(selector, data, commit).await?)
    }

    pub async fn update_or_create(
        &self,
        lookup: Fields,
        data: Fields,
        commit: bool,
    ) -> ServiceResult<(E, bool)> {
        Ok(self.repository.update_or_create(lookup, data, commit).await?)
    }
}
