//! Integration tests for the service layer
//!
//! Covers the user service (password hashing, coin balance, cache
//! read-model) and the generic entity service.

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use pretty_assertions::assert_eq;
use uuid::Uuid;

use sobes_admin::db::{Database, Session, Technology, User};
use sobes_admin::fields;
use sobes_admin::orm::{Filters, Query, RepositoryError, SqlValue};
use sobes_admin::services::{
    Cache, CacheError, CacheHandle, EntityService, PasswordHasher, ServiceError, UserCacheEntry,
    UserService, cache_key,
};

const TTL: Duration = Duration::from_secs(60);

async fn setup() -> (Database, Session) {
    let db = Database::connect_in_memory().await.unwrap();
    assert!(db.sync_schemas().await.is_ok());
    let session = db.session();
    (db, session)
}

fn user_service(session: &Session, cache: CacheHandle) -> UserService {
    UserService::new(session, cache, PasswordHasher::new("test-secret", 4), TTL)
}

/// Backend that refuses every operation.
struct DownCache;

#[async_trait]
impl Cache for DownCache {
    async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
        Err(CacheError::Unavailable("down".into()))
    }

    async fn set(&self, _key: &str, _value: String, _ttl: Duration) -> Result<(), CacheError> {
        Err(CacheError::Unavailable("down".into()))
    }

    async fn delete(&self, _key: &str) -> Result<(), CacheError> {
        Err(CacheError::Unavailable("down".into()))
    }

    async fn clear(&self) -> Result<(), CacheError> {
        Err(CacheError::Unavailable("down".into()))
    }
}

// ============================================================================
// Passwords
// ============================================================================

mod passwords {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_create_stores_only_the_hash() {
        let (_db, session) = setup().await;
        let users = user_service(&session, CacheHandle::memory(TTL));

        let user = users
            .create(fields! { "username" => "alice", "password" => "hunter2" }, true)
            .await
            .unwrap();
        let hash = user.password_hash.clone().unwrap();
        assert_ne!(hash, "hunter2");
        assert!(users.verify_password(&user, "hunter2").unwrap());
        assert!(!users.verify_password(&user, "hunter3").unwrap());
    }

    #[tokio::test]
    async fn test_update_rehashes_and_empty_password_keeps_hash() {
        let (_db, session) = setup().await;
        let users = user_service(&session, CacheHandle::memory(TTL));
        let user = users
            .create(fields! { "username" => "alice", "password" => "first" }, true)
            .await
            .unwrap();
        let original = user.password_hash.clone();

        let user = users.update(user, fields! { "password" => "" }, true).await.unwrap();
        assert_eq!(user.password_hash, original);

        let user = users.update(user, fields! { "password" => "second" }, true).await.unwrap();
        assert_ne!(user.password_hash, original);
        assert!(users.verify_password(&user, "second").unwrap());
        assert!(!users.verify_password(&user, "first").unwrap());
    }

    #[tokio::test]
    async fn test_non_text_password_is_rejected() {
        let (_db, session) = setup().await;
        let users = user_service(&session, CacheHandle::memory(TTL));

        assert_matches!(
            users.create(fields! { "password" => 1234 }, true).await,
            Err(ServiceError::InvalidPassword)
        );
    }

    #[tokio::test]
    async fn test_user_without_password_never_verifies() {
        let (_db, session) = setup().await;
        let users = user_service(&session, CacheHandle::memory(TTL));
        let user = users.create(fields! { "username" => "bob" }, true).await.unwrap();

        assert!(user.password_hash.is_none());
        assert!(!users.verify_password(&user, "").unwrap());
    }
}

// ============================================================================
// Coin balance
// ============================================================================

mod coins {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_debit_stops_at_zero() {
        let (_db, session) = setup().await;
        let users = user_service(&session, CacheHandle::memory(TTL));
        let user = users.create(fields! { "coin" => 2 }, true).await.unwrap();

        let user = users.debit_coin(user.id).await.unwrap().unwrap();
        assert_eq!(user.coin, 1);
        let user = users.debit_coin(user.id).await.unwrap().unwrap();
        assert_eq!(user.coin, 0);

        assert_matches!(
            users.debit_coin(user.id).await,
            Err(ServiceError::InsufficientBalance { user_id }) if user_id == user.id
        );
        assert_eq!(users.get(user.id).await.unwrap().coin, 0);
    }

    #[tokio::test]
    async fn test_debit_unknown_user() {
        let (_db, session) = setup().await;
        let users = user_service(&session, CacheHandle::memory(TTL));

        assert!(users.debit_coin(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_debit_refreshes_cache() {
        let (_db, session) = setup().await;
        let cache = CacheHandle::memory(TTL);
        let users = user_service(&session, cache.clone());
        let user = users.create(fields! { "coin" => 3 }, true).await.unwrap();

        users.debit_coin(user.id).await.unwrap();
        let entry: UserCacheEntry = cache.get_json(&cache_key(user.id)).await.unwrap();
        assert_eq!(entry.coin, 2);
    }
}

// ============================================================================
// Cache read-model
// ============================================================================

mod caching {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_writes_keep_cache_in_step() {
        let (_db, session) = setup().await;
        let cache = CacheHandle::memory(TTL);
        let users = user_service(&session, cache.clone());

        let user = users.create(fields! { "username" => "alice" }, true).await.unwrap();
        let key = cache_key(user.id);
        let entry: UserCacheEntry = cache.get_json(&key).await.unwrap();
        assert_eq!(entry, UserCacheEntry::from(&user));

        let user = users.update(user, fields! { "username" => "bob" }, true).await.unwrap();
        let entry: UserCacheEntry = cache.get_json(&key).await.unwrap();
        assert_eq!(entry.username.as_deref(), Some("bob"));

        users.delete(&user, true).await.unwrap();
        assert!(!cache.contains(&key).await);
    }

    #[tokio::test]
    async fn test_cache_entry_has_no_password() {
        let (_db, session) = setup().await;
        let cache = CacheHandle::memory(TTL);
        let users = user_service(&session, cache.clone());
        let user = users
            .create(fields! { "username" => "alice", "password" => "hunter2" }, true)
            .await
            .unwrap();

        let raw = cache.get(&cache_key(user.id)).await.unwrap();
        assert!(!raw.contains("password"));
        assert!(!raw.contains(user.password_hash.as_deref().unwrap()));
    }

    #[tokio::test]
    async fn test_cached_user_reads_through() {
        let (_db, session) = setup().await;
        let cache = CacheHandle::memory(TTL);
        let users = user_service(&session, cache.clone());

        // Written through the bare repository, so nothing is cached yet
        let user = session.users().create(fields! { "username" => "carol" }, true).await.unwrap();
        let key = cache_key(user.id);
        assert!(!cache.contains(&key).await);

        let entry = users.cached_user(user.id).await.unwrap().unwrap();
        assert_eq!(entry.username.as_deref(), Some("carol"));
        assert!(cache.contains(&key).await);

        assert!(users.cached_user(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_or_create_caches_only_new_rows() {
        let (_db, session) = setup().await;
        let cache = CacheHandle::memory(TTL);
        let users = user_service(&session, cache.clone());

        let existing = session.users().create(fields! { "username" => "dave" }, true).await.unwrap();
        let (user, created) = users
            .get_or_create(&["username"], fields! { "username" => "dave" }, true)
            .await
            .unwrap();
        assert!(!created);
        assert_eq!(user.id, existing.id);
        assert!(!cache.contains(&cache_key(user.id)).await);

        let (user, created) = users
            .get_or_create(&["username"], fields! { "username" => "erin", "password" => "pw" }, true)
            .await
            .unwrap();
        assert!(created);
        assert!(cache.contains(&cache_key(user.id)).await);
        assert!(users.verify_password(&user, "pw").unwrap());
    }

    #[tokio::test]
    async fn test_get_or_create_with_password_finds_existing_row() {
        let (_db, session) = setup().await;
        let users = user_service(&session, CacheHandle::memory(TTL));

        let (first, created) = users
            .get_or_create(&[], fields! { "username" => "bob", "password" => "pw" }, true)
            .await
            .unwrap();
        assert!(created);

        let (second, created) = users
            .get_or_create(&[], fields! { "username" => "bob", "password" => "pw" }, true)
            .await
            .unwrap();
        assert!(!created);
        assert_eq!(second.id, first.id);
        assert_eq!(second.password_hash, first.password_hash);
        assert!(users.verify_password(&second, "pw").unwrap());
        assert_eq!(users.count(Filters::new().eq("username", "bob")).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_uncommitted_writes_are_not_cached() {
        let (_db, session) = setup().await;
        let cache = CacheHandle::memory(TTL);
        let users = user_service(&session, cache.clone());
        let user = users.create(fields! { "username" => "gail" }, true).await.unwrap();
        let key = cache_key(user.id);
        assert!(cache.contains(&key).await);

        let user = users.update(user, fields! { "coin" => 5 }, false).await.unwrap();
        assert!(!cache.contains(&key).await);

        // The staged row is visible to this session but stays out of the cache
        let entry = users.cached_user(user.id).await.unwrap().unwrap();
        assert_eq!(entry.coin, 5);
        assert!(!cache.contains(&key).await);

        session.rollback().await.unwrap();
        let entry = users.cached_user(user.id).await.unwrap().unwrap();
        assert_eq!(entry.coin, 0);
        assert!(cache.contains(&key).await);

        let (_, created) = users
            .get_or_create(&["username"], fields! { "username" => "hank" }, false)
            .await
            .unwrap();
        assert!(created);
        session.rollback().await.unwrap();
        assert!(users.find(Filters::new().eq("username", "hank")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rolled_back_admin_grant_is_not_trusted() {
        let (_db, session) = setup().await;
        let users = user_service(&session, CacheHandle::memory(TTL));
        let user = users.create(fields! { "username" => "ivan" }, true).await.unwrap();
        let token = user.id.to_string();

        let user = users.update(user, fields! { "is_admin" => true }, false).await.unwrap();
        assert!(users.check_user_is_admin(&token).await.unwrap());

        session.rollback().await.unwrap();
        assert!(!users.get(user.id).await.unwrap().is_admin);
        assert!(!users.check_user_is_admin(&token).await.unwrap());
        assert!(!users.cached_user(user.id).await.unwrap().unwrap().is_admin);
    }

    #[tokio::test]
    async fn test_update_or_create_refreshes_cache() {
        let (_db, session) = setup().await;
        let cache = CacheHandle::memory(TTL);
        let users = user_service(&session, cache.clone());

        let (user, created) = users
            .update_or_create(fields! { "tg_id" => 42 }, fields! { "first_name" => "Ann" }, true)
            .await
            .unwrap();
        assert!(created);
        assert_eq!(user.tg_id, Some(42));

        let (user, created) = users
            .update_or_create(fields! { "tg_id" => 42 }, fields! { "first_name" => "Anna" }, true)
            .await
            .unwrap();
        assert!(!created);
        let entry: UserCacheEntry = cache.get_json(&cache_key(user.id)).await.unwrap();
        assert_eq!(entry.first_name.as_deref(), Some("Anna"));
    }

    #[tokio::test]
    async fn test_check_user_is_admin() {
        let (_db, session) = setup().await;
        let users = user_service(&session, CacheHandle::memory(TTL));
        let admin = users.create(fields! { "is_admin" => true }, true).await.unwrap();
        let member = users.create(fields! {}, true).await.unwrap();

        assert!(users.check_user_is_admin(&admin.id.to_string()).await.unwrap());
        assert!(!users.check_user_is_admin(&member.id.to_string()).await.unwrap());
        assert!(!users.check_user_is_admin(&Uuid::new_v4().to_string()).await.unwrap());
        assert!(!users.check_user_is_admin("not-a-uuid").await.unwrap());
    }

    #[tokio::test]
    async fn test_read_forwards() {
        let (_db, session) = setup().await;
        let users = user_service(&session, CacheHandle::memory(TTL));
        users.create(fields! { "username" => "jo", "coin" => 2 }, true).await.unwrap();
        users.create(fields! { "username" => "kim" }, true).await.unwrap();

        assert_eq!(users.count(Query::new()).await.unwrap(), 2);
        assert!(users.exists(Filters::new().eq("username", "kim")).await.unwrap());
        let rich = users.filter(Filters::new().gt("coin", 0)).await.unwrap();
        assert_eq!(rich.len(), 1);
        assert_eq!(rich[0].username.as_deref(), Some("jo"));
    }

    #[tokio::test]
    async fn test_cache_outage_does_not_fail_writes() {
        let (_db, session) = setup().await;
        let users = user_service(&session, CacheHandle::new(Arc::new(DownCache), TTL));

        let user = users.create(fields! { "username" => "frank" }, true).await.unwrap();
        let user = users.update(user, fields! { "coin" => 1 }, true).await.unwrap();

        let entry = users.cached_user(user.id).await.unwrap().unwrap();
        assert_eq!(entry.coin, 1);
        users.delete(&user, true).await.unwrap();
        assert!(users.find(Filters::new().eq("username", "frank")).await.unwrap().is_none());
    }
}

// ============================================================================
// Entity service
// ============================================================================

mod entity_service {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_forwards_to_repository() {
        let (_db, session) = setup().await;
        let technologies: EntityService<Technology> = EntityService::new(&session);

        let rust = technologies.create(fields! { "name" => "Rust" }, true).await.unwrap();
        let (same, created) = technologies
            .get_or_create(&["name"], fields! { "name" => "Rust" }, true)
            .await
            .unwrap();
        assert!(!created);
        assert_eq!(same, rust);

        assert_eq!(technologies.count(Query::new()).await.unwrap(), 1);
        assert!(technologies.exists(Filters::new().eq("name", "Rust")).await.unwrap());

        let renamed = technologies.update(rust, fields! { "name" => "Rust 2024" }, true).await.unwrap();
        assert_eq!(
            technologies.get(Filters::new().eq("id", renamed.id)).await.unwrap().name,
            "Rust 2024"
        );

        technologies.delete(&renamed, true).await.unwrap();
        assert!(technologies.get_or_none(Filters::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_not_found_is_recognisable() {
        let (_db, session) = setup().await;
        let users: EntityService<User> = EntityService::new(&session);

        let err = users
            .get(Filters::new().eq("id", SqlValue::from(Uuid::new_v4())))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert_matches!(err, ServiceError::Repository(RepositoryError::NotFound { entity: "User" }));
    }
}
