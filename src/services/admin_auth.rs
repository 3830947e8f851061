//! Admin panel authentication
//!
//! Admins never log in through the panel itself. A token issued elsewhere is
//! placed in the cache; the panel accepts any request whose session, or
//! `token` query parameter, carries a token the cache still holds.

use tracing::debug;

use super::cache::CacheHandle;

/// Per-browser session state of the admin panel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdminSession {
    token: Option<String>,
}

impl AdminSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
        }
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }
}

#[derive(Clone)]
pub struct AdminAuth {
    cache: CacheHandle,
    secret_key: String,
}

impl AdminAuth {
    pub fn new(cache: CacheHandle, secret_key: impl Into<String>) -> Self {
        Self {
            cache,
            secret_key: secret_key.into(),
        }
    }

    /// Key used to sign panel session cookies.
    pub fn secret_key(&self) -> &str {
        &self.secret_key
    }

    /// Form logins are not accepted.
    pub async fn login(&self, _session: &mut AdminSession) -> bool {
        false
    }

    /// Forget the session's token. `false` when there was none.
    pub async fn logout(&self, session: &mut AdminSession) -> bool {
        session.token.take().is_some()
    }

    /// Accept the session token if the cache still holds it, otherwise a
    /// live query token, which is then remembered in the session.
    pub async fn authenticate(&self, session: &mut AdminSession, query_token: Option<&str>) -> bool {
        if let Some(token) = session.token() {
            if self.cache.contains(token).await {
                return true;
            }
        }

        if let Some(token) = query_token.filter(|t| !t.is_empty()) {
            if self.cache.contains(token).await {
                debug!("Admin session established from query token");
                session.token = Some(token.to_string());
                return true;
            }
        }

        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn auth() -> AdminAuth {
        AdminAuth::new(CacheHandle::memory(Duration::from_secs(60)), "secret")
    }

    #[tokio::test]
    async fn test_login_always_refuses() {
        assert!(!auth().login(&mut AdminSession::new()).await);
    }

    #[tokio::test]
    async fn test_session_token_must_be_cached() {
        let auth = auth();
        let mut session = AdminSession::with_token("abc");
        assert!(!auth.authenticate(&mut session, None).await);

        auth.cache.set("abc", "1".to_string()).await;
        assert!(auth.authenticate(&mut session, None).await);
    }

    #[tokio::test]
    async fn test_query_token_is_remembered() {
        let auth = auth();
        auth.cache.set("abc", "1".to_string()).await;

        let mut session = AdminSession::new();
        assert!(auth.authenticate(&mut session, Some("abc")).await);
        assert_eq!(session.token(), Some("abc"));

        let mut session = AdminSession::new();
        assert!(!auth.authenticate(&mut session, Some("nope")).await);
        assert_eq!(session.token(), None);
    }

    #[tokio::test]
    async fn test_logout_clears_session() {
        let auth = auth();
        let mut session = AdminSession::with_token("abc");
        assert!(auth.logout(&mut session).await);
        assert!(!auth.logout(&mut session).await);
    }
}
