//! Business services built on the repository layer

pub mod admin_auth;
pub mod base;
pub mod cache;
pub mod error;
pub mod password;
pub mod user;

pub use admin_auth::{AdminAuth, AdminSession};
pub use base::EntityService;
pub use cache::{Cache, CacheError, CacheHandle, MemoryCache};
pub use error::{ServiceError, ServiceResult};
pub use password::PasswordHasher;
pub use user::{UserCacheEntry, UserService, cache_key};
