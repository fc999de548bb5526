//! Session management
//!
//! [`SessionManager`] is the only owner of the client's credentials. It
//! restores a session at startup, runs login/registration, clears everything
//! on logout, and keeps authorized requests working across access-token
//! expiry by refreshing once and retrying once.
//!
//! Every commit that starts or ends a session advances a generation counter.
//! An operation remembers the generation it started under and only writes
//! its result if that generation is still current, so a login that resolves
//! after a logout is discarded rather than resurrecting the session.

use chrono::{DateTime, Utc};
use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::api::endpoints;
use crate::api::{ApiRequest, ApiResponse, HttpTransport, Transport};
use crate::auth::access::{is_local_path, RoleRoutes};
use crate::auth::jwt;
use crate::auth::models::{
    AuthError, Credentials, LoginRequest, RefreshRequest, RefreshResponse, RegisterData,
    RegisterRequest, Role, TokenPairResponse, User,
};
use crate::auth::storage::{CredentialStore, FileCredentialStore};
use crate::config::Config;
use crate::error::{Error, Result};

/// Read-only view of the session handed to the rest of the application
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    /// True only until the startup bootstrap has resolved
    pub loading: bool,
    pub user: Option<User>,
    /// Last login/registration failure, cleared on the next attempt
    pub error: Option<AuthError>,
    pub access_expires_at: Option<DateTime<Utc>>,
}

impl SessionSnapshot {
    pub fn anonymous() -> Self {
        Self {
            loading: false,
            user: None,
            error: None,
            access_expires_at: None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    pub fn role(&self) -> Option<Role> {
        self.user.as_ref().map(|u| u.role)
    }

    pub fn has_role(&self, roles: &[Role]) -> bool {
        self.role().is_some_and(|role| roles.contains(&role))
    }

    pub fn is_admin(&self) -> bool {
        self.role() == Some(Role::Admin)
    }

    pub fn is_expert(&self) -> bool {
        self.role() == Some(Role::Expert)
    }

    pub fn is_client(&self) -> bool {
        self.role() == Some(Role::Client)
    }

    /// Admins may edit any task; everyone else only their own
    pub fn can_edit_task(&self, owner_id: &str) -> bool {
        match &self.user {
            Some(user) => user.role == Role::Admin || user.id == owner_id,
            None => false,
        }
    }

    pub fn can_manage_users(&self) -> bool {
        self.is_admin()
    }
}

/// Where the UI should go after a session operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Navigation {
    pub to: String,
}

impl Navigation {
    fn new(location: impl Into<String>) -> Self {
        Self {
            to: location.into(),
        }
    }
}

/// Tunables for a [`SessionManager`]
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    pub routes: RoleRoutes,
    pub adopt_rotated_refresh_token: bool,
}

impl From<&Config> for SessionOptions {
    fn from(config: &Config) -> Self {
        Self {
            routes: config.routes.clone(),
            adopt_rotated_refresh_token: config.session.adopt_rotated_refresh_token,
        }
    }
}

#[derive(Debug, Clone)]
struct SessionState {
    loading: bool,
    credentials: Option<Credentials>,
    user: Option<User>,
    error: Option<AuthError>,
    generation: u64,
}

impl SessionState {
    fn snapshot(&self) -> SessionSnapshot {
        // A user is only visible together with the token that backs it
        let (user, access_expires_at) = match (&self.user, &self.credentials) {
            (Some(user), Some(credentials)) => (
                Some(user.clone()),
                jwt::expires_at(&credentials.access_token),
            ),
            _ => (None, None),
        };

        SessionSnapshot {
            loading: self.loading,
            user,
            error: self.error.clone(),
            access_expires_at,
        }
    }
}

/// Why a refresh did not produce a new access token
#[derive(Debug, Clone, PartialEq, Eq)]
enum RefreshFailure {
    NoSession,
    NoRefreshToken,
    Rejected(u16),
    Transport(String),
    Superseded,
}

impl From<RefreshFailure> for Error {
    fn from(failure: RefreshFailure) -> Self {
        match failure {
            RefreshFailure::NoSession => Error::NotAuthenticated,
            RefreshFailure::NoRefreshToken | RefreshFailure::Rejected(_) => Error::SessionExpired,
            RefreshFailure::Transport(message) => Error::Transport(message),
            RefreshFailure::Superseded => Error::Superseded,
        }
    }
}

type RefreshFuture = Shared<BoxFuture<'static, std::result::Result<String, RefreshFailure>>>;

struct Flight {
    id: u64,
    /// Session the refresh belongs to
    generation: u64,
    future: RefreshFuture,
}

struct Inner {
    transport: Arc<dyn Transport>,
    store: Arc<dyn CredentialStore>,
    options: SessionOptions,
    state: Mutex<SessionState>,
    snapshots: watch::Sender<SessionSnapshot>,
    refresh: Mutex<Option<Flight>>,
    next_flight: AtomicU64,
}

/// Single source of truth for who is logged in
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl SessionManager {
    /// Create a manager in the loading state; call [`bootstrap`](Self::bootstrap) next
    pub fn new(
        transport: Arc<dyn Transport>,
        store: Arc<dyn CredentialStore>,
        options: SessionOptions,
    ) -> Self {
        let state = SessionState {
            loading: true,
            credentials: None,
            user: None,
            error: None,
            generation: 0,
        };
        let (snapshots, _) = watch::channel(state.snapshot());

        Self {
            inner: Arc::new(Inner {
                transport,
                store,
                options,
                state: Mutex::new(state),
                snapshots,
                refresh: Mutex::new(None),
                next_flight: AtomicU64::new(0),
            }),
        }
    }

    /// HTTP transport and on-disk credential store as configured
    pub fn from_config(config: &Config) -> Result<Self> {
        let transport = HttpTransport::from_config(&config.api)?;
        let store = FileCredentialStore::new(&config.storage.path);
        Ok(Self::new(
            Arc::new(transport),
            Arc::new(store),
            SessionOptions::from(config),
        ))
    }

    pub fn routes(&self) -> &RoleRoutes {
        &self.inner.options.routes
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.state.lock().snapshot()
    }

    /// Receive every committed change to the session
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.inner.snapshots.subscribe()
    }

    pub fn current_user(&self) -> Option<User> {
        self.snapshot().user
    }

    pub fn is_authenticated(&self) -> bool {
        self.snapshot().is_authenticated()
    }

    pub fn is_loading(&self) -> bool {
        self.inner.state.lock().loading
    }

    /// Restore the session from stored credentials.
    ///
    /// Never fails: a stored token that cannot produce a profile is wiped and
    /// the session stays anonymous. Runs once; later calls return the
    /// current snapshot.
    pub async fn bootstrap(&self) -> SessionSnapshot {
        let generation = {
            let state = self.inner.state.lock();
            if !state.loading {
                return state.snapshot();
            }
            state.generation
        };

        let stored = match self.inner.store.load() {
            Ok(stored) => stored,
            Err(e) => {
                warn!("Could not read stored credentials: {}", e);
                None
            }
        };

        let Some(credentials) = stored else {
            debug!("No stored session");
            self.update(|state| {
                if state.generation == generation {
                    self.clear(state);
                }
            });
            return self.snapshot();
        };

        let staged = self.update(|state| {
            if state.generation != generation {
                return false;
            }
            state.credentials = Some(credentials);
            true
        });
        if !staged {
            return self.snapshot();
        }

        match self.get_json::<User>(endpoints::CURRENT_USER).await {
            Ok(user) => {
                let restored = self.update(|state| {
                    if state.generation != generation || state.credentials.is_none() {
                        return false;
                    }
                    state.user = Some(user.clone());
                    state.loading = false;
                    true
                });
                if restored {
                    info!(user_id = %user.id, role = %user.role, "Restored session");
                }
            }
            Err(e) => {
                warn!("Stored session is no longer valid: {}", e);
                self.expire(generation);
            }
        }

        self.update(|state| state.loading = false);
        self.snapshot()
    }

    /// Log in and navigate to the role's landing area
    pub async fn login(&self, email: &str, password: &str) -> Result<Navigation> {
        self.login_with_return(email, password, None).await
    }

    /// Log in, then navigate to `return_to` when it is a local path, or to
    /// the role's landing area otherwise.
    ///
    /// On failure the session is left exactly as it was.
    pub async fn login_with_return(
        &self,
        email: &str,
        password: &str,
        return_to: Option<&str>,
    ) -> Result<Navigation> {
        let generation = self.begin_attempt();
        debug!(email, "Logging in");

        let attempt = async {
            let credentials = self.obtain_token_pair(email, password, "Login failed").await?;
            let user = self.fetch_profile(&credentials, "Login failed").await?;
            Ok::<_, AuthError>((credentials, user))
        };

        let (credentials, user) = match attempt.await {
            Ok(outcome) => outcome,
            Err(err) => return Err(self.fail_attempt(generation, err)),
        };

        let role = user.role;
        let user_id = user.id.clone();
        self.establish(generation, credentials, user)?;
        info!(user_id = %user_id, role = %role, "Logged in");

        let destination = return_to
            .filter(|path| is_local_path(path))
            .unwrap_or_else(|| self.routes().landing(role));
        Ok(Navigation::new(destination))
    }

    /// Register a client account and log straight into it
    pub async fn register(&self, data: &RegisterData) -> Result<Navigation> {
        let generation = self.begin_attempt();
        debug!(email = %data.email, "Registering client");

        let attempt = async {
            let request = ApiRequest::post(endpoints::REGISTER_CLIENT)
                .json(&RegisterRequest::client(data))
                .map_err(|_| AuthError::unexpected())?;
            let response = self.execute_anonymous(request).await?;
            if !response.is_success() {
                return Err(AuthError::from_body(&response.body, "Registration failed"));
            }

            let credentials = match serde_json::from_value::<TokenPairResponse>(response.body) {
                Ok(pair) => Credentials::new(pair.access, pair.refresh),
                Err(_) => {
                    debug!("Registration returned no tokens; exchanging credentials");
                    self.obtain_token_pair(&data.email, &data.password, "Registration failed")
                        .await?
                }
            };
            let user = self
                .fetch_profile(&credentials, "Registration failed")
                .await?;
            Ok::<_, AuthError>((credentials, user))
        };

        let (credentials, user) = match attempt.await {
            Ok(outcome) => outcome,
            Err(err) => return Err(self.fail_attempt(generation, err)),
        };

        let user_id = user.id.clone();
        self.establish(generation, credentials, user)?;
        info!(user_id = %user_id, "Registered and logged in");

        Ok(Navigation::new(self.routes().landing(Role::Client)))
    }

    /// Drop the session locally and navigate to login. Always succeeds.
    pub fn logout(&self) -> Navigation {
        self.update(|state| self.clear(state));
        info!("Logged out");
        Navigation::new(self.routes().login.clone())
    }

    /// Trade the refresh token for a new access token.
    ///
    /// Concurrent callers share one in-flight refresh. A rejected refresh
    /// token ends the session.
    pub async fn refresh(&self) -> Result<String> {
        let generation = self.inner.state.lock().generation;
        self.refresh_flight(generation).await.map_err(Error::from)
    }

    /// Send a request with the current access token.
    ///
    /// An unauthorized response triggers one refresh and one retry. If the
    /// retry is unauthorized too, the session is ended and `Unauthorized` is
    /// returned; there is never a second retry.
    ///
    /// A request is never retried under a session other than the one it was
    /// sent with. If the session ends or changes hands while it is in flight,
    /// the outcome of the retry path is `Superseded`.
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        let (generation, token) = self.current_token();
        let response = self
            .inner
            .transport
            .execute(request.clone().bearer(token.clone()))
            .await?;

        if !response.is_unauthorized() {
            return Ok(response);
        }
        let Some(used) = token else {
            return Err(Error::NotAuthenticated);
        };

        let retry_token = match self.current_token() {
            (current, _) if current != generation => {
                debug!(path = %request.path, "Session changed while request was in flight");
                return Err(Error::Superseded);
            }
            (_, Some(current)) if current != used => {
                debug!(path = %request.path, "Access token already replaced; retrying");
                current
            }
            _ => {
                debug!(path = %request.path, "Access token rejected; refreshing");
                self.refresh_flight(generation).await.map_err(Error::from)?
            }
        };

        if self.current_token().0 != generation {
            debug!(path = %request.path, "Session changed during refresh; not retrying");
            return Err(Error::Superseded);
        }
        let retried = self
            .inner
            .transport
            .execute(request.bearer(Some(retry_token)))
            .await?;

        if retried.is_unauthorized() {
            if !self.expire(generation) {
                return Err(Error::Superseded);
            }
            warn!("Request still unauthorized after refresh; session ended");
            return Err(Error::Unauthorized);
        }
        if self.current_token().0 != generation {
            return Err(Error::Superseded);
        }
        Ok(retried)
    }

    /// Authorized GET decoding a JSON body
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.send(ApiRequest::get(path)).await?.into_json()
    }

    /// Authorized POST of a JSON body, decoding a JSON response
    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send(ApiRequest::post(path).json(body)?)
            .await?
            .into_json()
    }

    fn update<R>(&self, f: impl FnOnce(&mut SessionState) -> R) -> R {
        let mut state = self.inner.state.lock();
        let result = f(&mut state);
        self.inner.snapshots.send_replace(state.snapshot());
        result
    }

    fn current_token(&self) -> (u64, Option<String>) {
        let state = self.inner.state.lock();
        let token = state
            .credentials
            .as_ref()
            .map(|credentials| credentials.access_token.clone());
        (state.generation, token)
    }

    fn clear(&self, state: &mut SessionState) {
        if let Err(e) = self.inner.store.clear() {
            error!("Failed to clear stored credentials: {}", e);
        }
        state.generation += 1;
        state.credentials = None;
        state.user = None;
        state.error = None;
        state.loading = false;
        self.inner.refresh.lock().take();
    }

    /// End the session if it is still the one that started at `generation`
    fn expire(&self, generation: u64) -> bool {
        let expired = self.update(|state| {
            if state.generation != generation {
                return false;
            }
            self.clear(state);
            true
        });
        if expired {
            info!("Session ended; login required");
        }
        expired
    }

    fn begin_attempt(&self) -> u64 {
        self.update(|state| {
            state.error = None;
            state.generation
        })
    }

    fn fail_attempt(&self, generation: u64, err: AuthError) -> Error {
        warn!(field = ?err.field, "Authentication failed: {}", err.message);
        self.update(|state| {
            if state.generation == generation {
                state.error = Some(err.clone());
            }
        });
        Error::Auth(err)
    }

    /// Commit a fresh session, unless the attempt has been overtaken
    fn establish(&self, generation: u64, credentials: Credentials, user: User) -> Result<()> {
        self.update(|state| {
            if state.generation != generation {
                debug!("Discarding stale session attempt");
                return Err(Error::Superseded);
            }
            self.inner.store.save(&credentials)?;

            state.generation += 1;
            state.credentials = Some(credentials);
            state.user = Some(user);
            state.error = None;
            state.loading = false;
            self.inner.refresh.lock().take();
            Ok(())
        })
    }

    async fn execute_anonymous(
        &self,
        request: ApiRequest,
    ) -> std::result::Result<ApiResponse, AuthError> {
        self.inner.transport.execute(request).await.map_err(|e| {
            warn!("Request to backend failed: {}", e);
            AuthError::unexpected()
        })
    }

    async fn obtain_token_pair(
        &self,
        email: &str,
        password: &str,
        fallback: &str,
    ) -> std::result::Result<Credentials, AuthError> {
        let request = ApiRequest::post(endpoints::TOKEN)
            .json(&LoginRequest { email, password })
            .map_err(|_| AuthError::unexpected())?;
        let response = self.execute_anonymous(request).await?;
        if !response.is_success() {
            return Err(AuthError::from_body(&response.body, fallback));
        }

        let pair: TokenPairResponse = serde_json::from_value(response.body).map_err(|e| {
            warn!("Malformed token response: {}", e);
            AuthError::unexpected()
        })?;
        Ok(Credentials::new(pair.access, pair.refresh))
    }

    async fn fetch_profile(
        &self,
        credentials: &Credentials,
        fallback: &str,
    ) -> std::result::Result<User, AuthError> {
        let request = ApiRequest::get(endpoints::CURRENT_USER)
            .bearer(Some(credentials.access_token.clone()));
        let response = self.execute_anonymous(request).await?;
        if !response.is_success() {
            return Err(AuthError::from_body(&response.body, fallback));
        }

        serde_json::from_value(response.body).map_err(|e| {
            warn!("Malformed profile response: {}", e);
            AuthError::unexpected()
        })
    }

    /// Join the refresh in flight for `generation`, or start one
    fn refresh_flight(&self, generation: u64) -> RefreshFuture {
        let mut slot = self.inner.refresh.lock();
        if let Some(flight) = slot.as_ref().filter(|f| f.generation == generation) {
            debug!(flight = flight.id, "Joining in-flight token refresh");
            return flight.future.clone();
        }

        let id = self.inner.next_flight.fetch_add(1, Ordering::Relaxed);
        let inner: Weak<Inner> = Arc::downgrade(&self.inner);
        let future = async move {
            let Some(inner) = inner.upgrade() else {
                return Err(RefreshFailure::Superseded);
            };
            let manager = SessionManager { inner };
            let outcome = manager.run_refresh(generation).await;
            manager.finish_flight(id);
            outcome
        }
        .boxed()
        .shared();

        *slot = Some(Flight {
            id,
            generation,
            future: future.clone(),
        });
        future
    }

    fn finish_flight(&self, id: u64) {
        let mut slot = self.inner.refresh.lock();
        if slot.as_ref().is_some_and(|flight| flight.id == id) {
            *slot = None;
        }
    }

    async fn run_refresh(&self, generation: u64) -> std::result::Result<String, RefreshFailure> {
        let refresh_token = {
            let state = self.inner.state.lock();
            if state.generation != generation {
                return Err(RefreshFailure::Superseded);
            }
            match &state.credentials {
                None => {
                    debug!("Refresh requested without a session");
                    return Err(RefreshFailure::NoSession);
                }
                Some(credentials) => credentials.refresh_token.clone(),
            }
        };

        if refresh_token.is_empty() {
            warn!("No refresh token available");
            self.expire(generation);
            return Err(RefreshFailure::NoRefreshToken);
        }

        info!("Refreshing access token");
        let request = ApiRequest::post(endpoints::TOKEN_REFRESH)
            .json(&RefreshRequest {
                refresh: &refresh_token,
            })
            .map_err(|e| RefreshFailure::Transport(e.to_string()))?;

        let response = match self.inner.transport.execute(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!("Token refresh request failed: {}", e);
                return Err(RefreshFailure::Transport(e.to_string()));
            }
        };

        if response.status >= 500 {
            warn!(status = response.status, "Token refresh failed on the backend");
            return Err(RefreshFailure::Transport(format!(
                "refresh endpoint returned {}",
                response.status
            )));
        }
        if !response.is_success() {
            warn!(status = response.status, "Refresh token rejected");
            self.expire(generation);
            return Err(RefreshFailure::Rejected(response.status));
        }

        let body: RefreshResponse = serde_json::from_value(response.body)
            .map_err(|e| RefreshFailure::Transport(format!("malformed refresh response: {}", e)))?;
        let adopt_rotated = self.inner.options.adopt_rotated_refresh_token;

        self.update(|state| {
            if state.generation != generation {
                return Err(RefreshFailure::Superseded);
            }
            let Some(current) = state
                .credentials
                .as_mut()
                .filter(|credentials| credentials.refresh_token == refresh_token)
            else {
                return Err(RefreshFailure::Superseded);
            };

            current.access_token = body.access.clone();
            if adopt_rotated {
                if let Some(rotated) = body.refresh {
                    current.refresh_token = rotated;
                }
            }
            if let Err(e) = self.inner.store.save(current) {
                error!("Failed to persist refreshed credentials: {}", e);
            }
            debug!("Access token refreshed");
            Ok(body.access)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::storage::MemoryCredentialStore;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::{HashMap, VecDeque};

    /// Replays canned responses per path, recording every request
    #[derive(Default)]
    struct Scripted {
        responses: Mutex<HashMap<String, VecDeque<ApiResponse>>>,
        seen: Mutex<Vec<ApiRequest>>,
    }

    impl Scripted {
        fn push(&self, path: &str, status: u16, body: serde_json::Value) {
            self.responses
                .lock()
                .entry(path.to_string())
                .or_default()
                .push_back(ApiResponse::new(status, body));
        }

        fn calls(&self, path: &str) -> usize {
            self.seen.lock().iter().filter(|r| r.path == path).count()
        }
    }

    #[async_trait]
    impl Transport for Scripted {
        async fn execute(&self, request: ApiRequest) -> Result<ApiResponse> {
            let path = request.path.clone();
            self.seen.lock().push(request);
            self.responses
                .lock()
                .get_mut(&path)
                .and_then(|queue| queue.pop_front())
                .ok_or_else(|| Error::Transport(format!("no scripted response for {}", path)))
        }
    }

    fn profile(role: &str) -> serde_json::Value {
        json!({"id": 9, "email": "sam@maiguru.test", "role": role,
               "first_name": "Sam", "last_name": "W"})
    }

    fn manager(
        transport: Arc<Scripted>,
        store: Arc<MemoryCredentialStore>,
    ) -> SessionManager {
        SessionManager::new(transport, store, SessionOptions::default())
    }

    #[tokio::test]
    async fn test_starts_loading_until_bootstrap() {
        let transport = Arc::new(Scripted::default());
        let manager = manager(transport.clone(), Arc::new(MemoryCredentialStore::new()));

        assert!(manager.is_loading());
        let snapshot = manager.bootstrap().await;
        assert!(!snapshot.loading);
        assert!(!snapshot.is_authenticated());
        assert_eq!(transport.calls(endpoints::CURRENT_USER), 0);
    }

    #[tokio::test]
    async fn test_login_stores_tokens_after_profile() {
        let transport = Arc::new(Scripted::default());
        let store = Arc::new(MemoryCredentialStore::new());
        transport.push(endpoints::TOKEN, 200, json!({"access": "a1", "refresh": "r1"}));
        transport.push(endpoints::CURRENT_USER, 200, profile("admin"));

        let manager = manager(transport.clone(), store.clone());
        manager.bootstrap().await;
        let nav = manager.login("sam@maiguru.test", "pw").await.unwrap();

        assert_eq!(nav.to, "/admin/dashboard");
        assert_eq!(store.load().unwrap(), Some(Credentials::new("a1", "r1")));
        assert!(manager.snapshot().is_admin());
    }

    #[tokio::test]
    async fn test_failed_profile_fetch_is_not_a_partial_login() {
        let transport = Arc::new(Scripted::default());
        let store = Arc::new(MemoryCredentialStore::new());
        transport.push(endpoints::TOKEN, 200, json!({"access": "a1", "refresh": "r1"}));
        transport.push(endpoints::CURRENT_USER, 500, json!({"detail": "boom"}));

        let manager = manager(transport, store.clone());
        manager.bootstrap().await;
        let err = manager.login("sam@maiguru.test", "pw").await.unwrap_err();

        assert!(matches!(err, Error::Auth(_)));
        assert!(store.load().unwrap().is_none());
        assert!(!manager.is_authenticated());
    }

    #[tokio::test]
    async fn test_login_discarded_after_logout() {
        let transport = Arc::new(Scripted::default());
        let store = Arc::new(MemoryCredentialStore::new());

        let manager = manager(transport, store.clone());
        manager.bootstrap().await;

        let generation = manager.begin_attempt();
        manager.logout();
        let user: User = serde_json::from_value(profile("client")).unwrap();
        let result = manager.establish(generation, Credentials::new("a", "r"), user);

        assert!(matches!(result, Err(Error::Superseded)));
        assert!(store.load().unwrap().is_none());
        assert!(!manager.is_authenticated());
    }

    #[tokio::test]
    async fn test_refresh_slot_is_released() {
        let transport = Arc::new(Scripted::default());
        let store = Arc::new(MemoryCredentialStore::with_credentials(Credentials::new(
            "a1", "r1",
        )));
        transport.push(endpoints::CURRENT_USER, 200, profile("expert"));
        transport.push(endpoints::TOKEN_REFRESH, 200, json!({"access": "a2"}));
        transport.push(endpoints::TOKEN_REFRESH, 200, json!({"access": "a3"}));

        let manager = manager(transport.clone(), store.clone());
        manager.bootstrap().await;

        assert_eq!(manager.refresh().await.unwrap(), "a2");
        assert!(manager.inner.refresh.lock().is_none());
        assert_eq!(manager.refresh().await.unwrap(), "a3");
        assert_eq!(transport.calls(endpoints::TOKEN_REFRESH), 2);
        assert_eq!(store.load().unwrap(), Some(Credentials::new("a3", "r1")));
    }

    #[tokio::test]
    async fn test_rotated_refresh_token_ignored_by_default() {
        let transport = Arc::new(Scripted::default());
        let store = Arc::new(MemoryCredentialStore::with_credentials(Credentials::new(
            "a1", "r1",
        )));
        transport.push(endpoints::CURRENT_USER, 200, profile("client"));
        transport.push(
            endpoints::TOKEN_REFRESH,
            200,
            json!({"access": "a2", "refresh": "r2"}),
        );

        let manager = manager(transport, store.clone());
        manager.bootstrap().await;
        manager.refresh().await.unwrap();

        assert_eq!(store.load().unwrap(), Some(Credentials::new("a2", "r1")));
    }

    #[tokio::test]
    async fn test_rotated_refresh_token_adopted_when_configured() {
        let transport = Arc::new(Scripted::default());
        let store = Arc::new(MemoryCredentialStore::with_credentials(Credentials::new(
            "a1", "r1",
        )));
        transport.push(endpoints::CURRENT_USER, 200, profile("client"));
        transport.push(
            endpoints::TOKEN_REFRESH,
            200,
            json!({"access": "a2", "refresh": "r2"}),
        );

        let options = SessionOptions {
            adopt_rotated_refresh_token: true,
            ..SessionOptions::default()
        };
        let manager = SessionManager::new(transport, store.clone(), options);
        manager.bootstrap().await;
        manager.refresh().await.unwrap();

        assert_eq!(store.load().unwrap(), Some(Credentials::new("a2", "r2")));
    }

    #[tokio::test]
    async fn test_refresh_server_error_keeps_session() {
        let transport = Arc::new(Scripted::default());
        let store = Arc::new(MemoryCredentialStore::with_credentials(Credentials::new(
            "a1", "r1",
        )));
        transport.push(endpoints::CURRENT_USER, 200, profile("client"));
        transport.push(endpoints::TOKEN_REFRESH, 503, json!(null));

        let manager = manager(transport, store.clone());
        manager.bootstrap().await;
        let err = manager.refresh().await.unwrap_err();

        assert!(matches!(err, Error::Transport(_)));
        assert!(manager.is_authenticated());
        assert!(store.load().unwrap().is_some());
    }

    #[tokio::test]
    async fn test_missing_refresh_token_ends_session() {
        let transport = Arc::new(Scripted::default());
        let store = Arc::new(MemoryCredentialStore::with_credentials(Credentials::new(
            "a1", "",
        )));
        transport.push(endpoints::CURRENT_USER, 200, profile("client"));

        let manager = manager(transport.clone(), store.clone());
        manager.bootstrap().await;
        assert!(manager.is_authenticated());

        let err = manager.refresh().await.unwrap_err();
        assert!(matches!(err, Error::SessionExpired));
        assert!(!manager.is_authenticated());
        assert!(store.load().unwrap().is_none());
        assert_eq!(transport.calls(endpoints::TOKEN_REFRESH), 0);
    }

    #[tokio::test]
    async fn test_anonymous_refresh_is_not_a_session_end() {
        let transport = Arc::new(Scripted::default());
        let manager = manager(transport.clone(), Arc::new(MemoryCredentialStore::new()));
        manager.bootstrap().await;
        let before = manager.current_token().0;

        let err = manager.refresh().await.unwrap_err();

        assert!(matches!(err, Error::NotAuthenticated));
        assert_eq!(manager.current_token().0, before);
        assert_eq!(transport.calls(endpoints::TOKEN_REFRESH), 0);
    }

    #[tokio::test]
    async fn test_flight_from_old_session_is_not_joined() {
        let transport = Arc::new(Scripted::default());
        let manager = manager(transport, Arc::new(MemoryCredentialStore::new()));
        manager.bootstrap().await;

        let stale = manager.refresh_flight(0);
        let current = manager.current_token().0;
        assert_ne!(current, 0);
        manager.refresh_flight(current);

        let slot = manager.inner.refresh.lock();
        assert_eq!(slot.as_ref().map(|f| f.generation), Some(current));
        drop(slot);
        assert_eq!(stale.await, Err(RefreshFailure::Superseded));
    }

    #[tokio::test]
    async fn test_subscribers_see_commits() {
        let transport = Arc::new(Scripted::default());
        transport.push(endpoints::TOKEN, 200, json!({"access": "a1", "refresh": "r1"}));
        transport.push(endpoints::CURRENT_USER, 200, profile("client"));

        let manager = manager(transport, Arc::new(MemoryCredentialStore::new()));
        let mut rx = manager.subscribe();
        assert!(rx.borrow().loading);

        manager.bootstrap().await;
        manager.login("sam@maiguru.test", "pw").await.unwrap();

        rx.changed().await.unwrap();
        assert!(rx.borrow_and_update().is_client());
    }

    #[test]
    fn test_snapshot_permissions() {
        let user: User = serde_json::from_value(profile("client")).unwrap();
        let snapshot = SessionSnapshot {
            user: Some(user),
            ..SessionSnapshot::anonymous()
        };

        assert!(snapshot.has_role(&[Role::Client, Role::Expert]));
        assert!(!snapshot.has_role(&[Role::Admin]));
        assert!(snapshot.can_edit_task("9"));
        assert!(!snapshot.can_edit_task("10"));
        assert!(!snapshot.can_manage_users());
        assert!(!SessionSnapshot::anonymous().can_edit_task("9"));
    }
}
