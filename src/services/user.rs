//! User service
//!
//! Wraps the user repository with password hashing, the `user:{id}` cache
//! read-model and the coin balance rules. The cache entry is refreshed after
//! a committed create/update, dropped after an uncommitted one and removed on
//! delete, so it only ever mirrors committed rows.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::db::{Session, User};
use crate::orm::{Fields, Filters, Query, Repository, SqlValue};

use super::cache::CacheHandle;
use super::error::{ServiceError, ServiceResult};
use super::password::PasswordHasher;

/// Input field holding a plaintext password.
pub const PASSWORD_FIELD: &str = "password";
/// Column the hash is stored in.
pub const PASSWORD_HASH_FIELD: &str = "password_hash";

/// Denormalized user read-model kept in the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserCacheEntry {
    pub id: Uuid,
    pub tg_id: Option<i64>,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub coin: i64,
    pub is_admin: bool,
    pub is_active: bool,
    pub subscription: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&User> for UserCacheEntry {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            tg_id: user.tg_id,
            username: user.username.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            coin: user.coin,
            is_admin: user.is_admin,
            is_active: user.is_active,
            subscription: user.subscription.clone(),
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

pub fn cache_key(user_id: Uuid) -> String {
    format!("user:{}", user_id)
}

#[derive(Clone)]
pub struct UserService {
    repository: Repository<User>,
    cache: CacheHandle,
    hasher: PasswordHasher,
    cache_ttl: Duration,
}

impl UserService {
    pub fn new(
        session: &Session,
        cache: CacheHandle,
        hasher: PasswordHasher,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            repository: session.users(),
            cache,
            hasher,
            cache_ttl,
        }
    }

    pub async fn filter(&self, query: impl Into<Query>) -> ServiceResult<Vec<User>> {
        Ok(self.repository.filter(query).await?)
    }

    pub async fn count(&self, query: impl Into<Query>) -> ServiceResult<u64> {
        Ok(self.repository.count(query).await?)
    }

    pub async fn exists(&self, query: impl Into<Query>) -> ServiceResult<bool> {
        Ok(self.repository.exists(query).await?)
    }

    pub async fn find(&self, filters: Filters) -> ServiceResult<Option<User>> {
        Ok(self.repository.find(filters).await?)
    }

    pub async fn get(&self, user_id: Uuid) -> ServiceResult<User> {
        Ok(self.repository.get(Filters::new().eq("id", user_id)).await?)
    }

    // ========================================================================
    // Writes
    // ========================================================================

    pub async fn create(&self, mut data: Fields, commit: bool) -> ServiceResult<User> {
        self.hash_password_field(&mut data)?;
        let user = self.repository.create(data, commit).await?;
        self.sync_cache(&user, commit).await;
        info!(user_id = %user.id, "Created user");
        Ok(user)
    }

    pub async fn update(&self, user: User, mut data: Fields, commit: bool) -> ServiceResult<User> {
        self.hash_password_field(&mut data)?;
        let user = self.repository.update(user, data, commit).await?;
        self.sync_cache(&user, commit).await;
        Ok(user)
    }

    pub async fn delete(&self, user: &User, commit: bool) -> ServiceResult<()> {
        self.repository.delete(user, commit).await?;
        self.cache.delete(&cache_key(user.id)).await;
        info!(user_id = %user.id, "Deleted user");
        Ok(())
    }

    /// Look the user up by the `selector` fields of `data`, creating it when
    /// absent. The plaintext password never takes part in the lookup and is
    /// only hashed when a row is created.
    pub async fn get_or_create(
        &self,
        selector: &[&str],
        mut data: Fields,
        commit: bool,
    ) -> ServiceResult<(User, bool)> {
        let password = data.remove(PASSWORD_FIELD);
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

        if let Some(existing) = self.repository.find(Filters::from_fields(&lookup)).await? {
            return Ok((existing, false));
        }

        if let Some(password) = password {
            data.insert(PASSWORD_FIELD.to_string(), password);
        }
        Ok((self.create(data, commit).await?, true))
    }

    pub async fn update_or_create(
        &self,
        lookup: Fields,
        mut data: Fields,
        commit: bool,
    ) -> ServiceResult<(User, bool)> {
        self.hash_password_field(&mut data)?;
        let (user, created) = self
            .repository
            .update_or_create(lookup, data, commit)
            .await?;
        self.sync_cache(&user, commit).await;
        Ok((user, created))
    }

    /// Take one coin from the user's balance and commit.
    ///
    /// `Ok(None)` when the user does not exist; `InsufficientBalance` when
    /// the balance is already below one.
    pub async fn debit_coin(&self, user_id: Uuid) -> ServiceResult<Option<User>> {
        let Some(user) = self
            .repository
            .get_or_none(Filters::new().eq("id", user_id))
            .await?
        else {
            return Ok(None);
        };

        if user.coin < 1 {
            return Err(ServiceError::InsufficientBalance { user_id });
        }

        let coin = user.coin - 1;
        let mut data = Fields::new();
        data.insert("coin".to_string(), SqlValue::Int(coin));
        let user = self.update(user, data, true).await?;
        debug!(user_id = %user_id, coin, "Debited coin");
        Ok(Some(user))
    }

    // ========================================================================
    // Reads through the cache
    // ========================================================================

    /// Cached read-model, loading it on a miss. The loaded entry is only
    /// cached when the session holds no uncommitted writes.
    pub async fn cached_user(&self, user_id: Uuid) -> ServiceResult<Option<UserCacheEntry>> {
        let key = cache_key(user_id);
        if let Some(entry) = self.cache.get_json::<UserCacheEntry>(&key).await {
            return Ok(Some(entry));
        }

        let Some(user) = self
            .repository
            .get_or_none(Filters::new().eq("id", user_id))
            .await?
        else {
            return Ok(None);
        };
        if self.repository.session().has_pending_writes().await {
            return Ok(Some(UserCacheEntry::from(&user)));
        }
        Ok(Some(self.store(&user).await))
    }

    /// Whether `token` (a user id) names an admin. Reads the row, never the
    /// cache. Malformed tokens and unknown users are not admins.
    pub async fn check_user_is_admin(&self, token: &str) -> ServiceResult<bool> {
        let Ok(user_id) = Uuid::parse_str(token) else {
            return Ok(false);
        };
        Ok(self
            .find(Filters::new().eq("id", user_id))
            .await?
            .is_some_and(|user| user.is_admin))
    }

    pub fn verify_password(&self, user: &User, plain: &str) -> ServiceResult<bool> {
        match &user.password_hash {
            Some(stored) => Ok(self.hasher.verify(plain, stored)?),
            None => Ok(false),
        }
    }

    // ========================================================================
    // Internals
    // ========================================================================

    /// Replace a plaintext `password` with its hash. An empty or null
    /// password leaves the stored hash untouched.
    fn hash_password_field(&self, data: &mut Fields) -> ServiceResult<()> {
        match data.remove(PASSWORD_FIELD) {
            None | Some(SqlValue::Null) => Ok(()),
            Some(SqlValue::Text(plain)) if plain.is_empty() => Ok(()),
            Some(SqlValue::Text(plain)) => {
                let hashed = self.hasher.hash(&plain)?;
                data.insert(PASSWORD_HASH_FIELD.to_string(), SqlValue::Text(hashed));
                Ok(())
            }
            Some(_) => Err(ServiceError::InvalidPassword),
        }
    }

    /// Refresh the entry after a committed write. An uncommitted write may
    /// still be rolled back, so the entry is dropped instead.
    async fn sync_cache(&self, user: &User, commit: bool) {
        if commit {
            self.store(user).await;
        } else {
            self.cache.delete(&cache_key(user.id)).await;
        }
    }

    async fn store(&self, user: &User) -> UserCacheEntry {
        let entry = UserCacheEntry::from(user);
        self.cache
            .set_json(&cache_key(user.id), &entry, self.cache_ttl)
            .await;
        entry
    }
}
