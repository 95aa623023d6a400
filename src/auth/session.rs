//! Session - the user-visible handle over a token and a cached storage client
//!
//! A session owns exactly one current [`IdentityToken`] and at most one
//! storage client built from the most recent federated credentials. Both live
//! behind one async mutex, so concurrent callers of [`Session::storage_client`]
//! are serialized and a stale token is refreshed at most once.

use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use chrono::Utc;
use tokio::sync::Mutex;
use crate::Result;
use crate::storage::ObjectStore;
use super::service::AuthService;
use super::token::IdentityToken;

/// Observable refresh state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Token still valid
    Fresh,
    /// Token expired; the next storage access refreshes it
    Expired,
    /// A refresh or identity exchange is in flight
    Refreshing,
}

/// Marks network work in flight for [`Session::status`]; clears on drop,
/// including when the owning future is cancelled.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn start(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

struct SessionState {
    token: IdentityToken,
    client: Option<Arc<dyn ObjectStore>>,
}

/// A signed-in user.
///
/// Two sessions are equal, and hash equally, when their email claims match,
/// even if their token material differs. Sessions opened with different
/// credentials for the same email are therefore indistinguishable.
pub struct Session {
    email: String,
    identity_id: String,
    service: AuthService,
    state: Mutex<SessionState>,
    /// Expiry of the current token in epoch milliseconds, readable without the lock
    expires_at_ms: AtomicI64,
    in_flight: AtomicBool,
}

impl Session {
    /// A session without a storage client; the first access builds one.
    pub fn new(token: IdentityToken, service: AuthService) -> Self {
        Self::from_parts(token, service, None)
    }

    pub(crate) fn with_client(token: IdentityToken, service: AuthService, client: Arc<dyn ObjectStore>) -> Self {
        Self::from_parts(token, service, Some(client))
    }

    fn from_parts(token: IdentityToken, service: AuthService, client: Option<Arc<dyn ObjectStore>>) -> Self {
        Self {
            email: token.email().to_string(),
            identity_id: token.identity_id().to_string(),
            service,
            expires_at_ms: AtomicI64::new(token.expires_at().timestamp_millis()),
            in_flight: AtomicBool::new(false),
            state: Mutex::new(SessionState { token, client }),
        }
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    /// Federated identity id. Refreshes carry it over unchanged.
    pub fn identity_id(&self) -> &str {
        &self.identity_id
    }

    /// Key prefix under which this user's objects live
    pub fn home_prefix(&self) -> String {
        format!("home/{}/", self.identity_id)
    }

    /// Snapshot of the current token.
    pub async fn token(&self) -> IdentityToken {
        self.state.lock().await.token.clone()
    }

    /// `Refreshing` only while a refresh or exchange is running; readers of
    /// the token do not affect it.
    pub fn status(&self) -> SessionStatus {
        if self.in_flight.load(Ordering::SeqCst) {
            SessionStatus::Refreshing
        } else if Utc::now().timestamp_millis() >= self.expires_at_ms.load(Ordering::SeqCst) {
            SessionStatus::Expired
        } else {
            SessionStatus::Fresh
        }
    }

    /// A storage client valid for the current token.
    ///
    /// Returns the cached client without I/O while the token is valid.
    /// Otherwise makes exactly one refresh attempt, then one identity
    /// exchange, and caches the new client. A rejected refresh leaves the
    /// old token in place and is returned to the caller; retrying is the
    /// caller's decision. Cancelling during the refresh leaves the session
    /// expired.
    pub async fn storage_client(&self) -> Result<Arc<dyn ObjectStore>> {
        let mut state = self.state.lock().await;

        if !state.token.has_expired() {
            if let Some(client) = &state.client {
                return Ok(Arc::clone(client));
            }
        }

        let _in_flight = InFlight::start(&self.in_flight);
        if state.token.has_expired() {
            tracing::info!(email = %self.email, "Identity token expired, refreshing");
            let token = self.service.gateway().refresh(&state.token).await?;
            state.client = None;
            self.expires_at_ms.store(token.expires_at().timestamp_millis(), Ordering::SeqCst);
            state.token = token;
        }

        let client = self.service.connect(&state.token).await?;
        state.client = Some(Arc::clone(&client));
        Ok(client)
    }

    /// Drop the cached storage client.
    pub(crate) async fn disconnect(&self) {
        self.state.lock().await.client = None;
    }
}

impl PartialEq for Session {
    fn eq(&self, other: &Self) -> bool {
        self.email == other.email
    }
}

impl Eq for Session {}

impl Hash for Session {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.email.hash(state);
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("email", &self.email)
            .field("identity_id", &self.identity_id)
            .field("status", &self.status())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use crate::auth::token::testing::id_token;
    use crate::config::Config;
    use crate::storage::MemoryConnector;

    fn service() -> AuthService {
        let config = Config {
            region: "ap-northeast-1".into(),
            user_pool_id: "pool".into(),
            identity_pool_id: "identity".into(),
            bucket: "bucket".into(),
            app_client_id: "client".into(),
            // Nothing listens here; any network attempt fails the test.
            token_url: "http://127.0.0.1:9/oauth2/token".into(),
            signin_redirect_url: "amber-app://auth/callback/signin".into(),
            custom_scheme: "amber-app".into(),
            endpoints: crate::config::EndpointOverrides {
                identity_provider: Some("http://127.0.0.1:9/".into()),
                identity: Some("http://127.0.0.1:9/".into()),
                storage: None,
            },
            ..Config::default()
        };
        AuthService::with_connector(config, reqwest::Client::new(), Arc::new(MemoryConnector::default()))
            .unwrap()
    }

    fn token(email: &str, access: &str, exp: i64) -> IdentityToken {
        IdentityToken::new("ap-northeast-1:abc", access, id_token(email, exp), format!("refresh-{}", access))
            .unwrap()
    }

    #[test]
    fn test_equality_and_hash_by_email() {
        let service = service();
        let a = Session::new(token("a@b.com", "one", 4_000_000_000), service.clone());
        let b = Session::new(token("a@b.com", "two", 1_000_000_000), service.clone());
        let c = Session::new(token("c@d.com", "one", 4_000_000_000), service);

        assert_eq!(a, b);
        assert_ne!(a, c);

        let set: HashSet<_> = [a, b, c].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_status_and_prefix() {
        let service = service();
        let fresh = Session::new(token("a@b.com", "one", 4_000_000_000), service.clone());
        let expired = Session::new(token("a@b.com", "one", 1_000_000_000), service);

        assert_eq!(fresh.status(), SessionStatus::Fresh);
        assert_eq!(expired.status(), SessionStatus::Expired);
        assert_eq!(fresh.home_prefix(), "home/ap-northeast-1:abc/");
    }

    #[tokio::test]
    async fn test_status_ignores_plain_readers() {
        let service = service();
        let session = Session::new(token("a@b.com", "one", 4_000_000_000), service);

        let guard = session.state.lock().await;
        assert_eq!(session.status(), SessionStatus::Fresh);
        drop(guard);

        let flag = InFlight::start(&session.in_flight);
        assert_eq!(session.status(), SessionStatus::Refreshing);
        drop(flag);
        assert_eq!(session.status(), SessionStatus::Fresh);
    }

    #[tokio::test]
    async fn test_cached_client_returned_without_io() {
        let service = service();
        let client: Arc<dyn ObjectStore> = Arc::new(crate::storage::MemoryStore::new());
        let session = Session::with_client(token("a@b.com", "one", 4_000_000_000), service, client.clone());

        let first = session.storage_client().await.unwrap();
        let second = session.storage_client().await.unwrap();
        assert!(Arc::ptr_eq(&first, &client));
        assert!(Arc::ptr_eq(&second, &client));
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_old_token() {
        let service = service();
        let client: Arc<dyn ObjectStore> = Arc::new(crate::storage::MemoryStore::new());
        let session = Session::with_client(token("a@b.com", "old", 1_000_000_000), service, client);

        assert!(session.storage_client().await.is_err());
        assert_eq!(session.token().await.access_token(), "old");
        assert_eq!(session.status(), SessionStatus::Expired);
    }
}
