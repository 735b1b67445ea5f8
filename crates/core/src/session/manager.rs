use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::models::{Access, AccessDenied, Role, Session, SessionPhase, User};
use crate::{
    api::{find_access_token, ApiError, Credentials, ProfileUpdate, Registration, TourApi},
    store::PersistedStore,
};

/// Store key holding the bearer token.
pub const TOKEN_KEY: &str = "authToken";
/// Store key holding the serialized user.
pub const USER_KEY: &str = "user";
/// Store key holding the role name.
pub const ROLE_KEY: &str = "userRole";

const SESSION_KEYS: [&str; 3] = [TOKEN_KEY, USER_KEY, ROLE_KEY];

pub(crate) static EMAIL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("invalid email regex"));

/// Failure of a session operation. `Display` is the message shown to users.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SessionError {
    /// The API call failed; `message` is the server's text or the operation's fallback.
    #[error("{message}")]
    Api { message: String, source: ApiError },
    #[error("No access token received")]
    MissingToken,
    #[error("Access denied. Admin privileges required.")]
    AdminRequired,
    #[error("You must be logged in to do that.")]
    NotLoggedIn,
    #[error("{0}")]
    InvalidInput(String),
    /// A logout or newer login replaced the session while this call was in flight.
    #[error("The session changed before the request completed.")]
    Superseded,
}

impl SessionError {
    fn api(source: ApiError, fallback: &str) -> Self {
        Self::Api {
            message: source.user_message(fallback),
            source,
        }
    }
}

/// Result of a successful login.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub token: String,
    /// `None` when the profile fetch failed and the session is degraded.
    pub user: Option<User>,
    /// Authentication response with any envelope removed.
    pub payload: Value,
}

struct Inner {
    session: Session,
    phase: SessionPhase,
    /// Bumped on every login and logout. Work started under an older epoch
    /// must not write its results.
    epoch: u64,
}

/// Owns the authenticated identity of the client and its persisted copy.
pub struct SessionManager {
    api: Arc<dyn TourApi>,
    store: Arc<dyn PersistedStore>,
    inner: RwLock<Inner>,
}

impl SessionManager {
    pub fn new(api: Arc<dyn TourApi>, store: Arc<dyn PersistedStore>) -> Self {
        Self {
            api,
            store,
            inner: RwLock::new(Inner {
                session: Session::default(),
                phase: SessionPhase::Uninitialized,
                epoch: 0,
            }),
        }
    }

    /// Restore a previous session from the store. Makes no network calls.
    pub fn initialize(&self) {
        let mut inner = self.inner.write();
        if inner.phase != SessionPhase::Uninitialized {
            warn!(phase = ?inner.phase, "session already initialized");
            return;
        }
        inner.phase = SessionPhase::Initializing;

        match self.restore() {
            Some(session) => {
                info!(role = ?session.role, "restored saved session");
                inner.session = session;
                inner.phase = SessionPhase::Authenticated;
            }
            None => {
                inner.session = Session::default();
                inner.phase = SessionPhase::Anonymous;
            }
        }
    }

    fn restore(&self) -> Option<Session> {
        let stored: Result<Vec<Option<String>>, _> =
            SESSION_KEYS.iter().map(|key| self.store.get(key)).collect();
        let stored = match stored {
            Ok(values) => values,
            Err(err) => {
                warn!(%err, "could not read saved session");
                self.clear_store();
                return None;
            }
        };
        let [token, user, role] = [&stored[0], &stored[1], &stored[2]];

        let (token, raw_user) = match (token.as_deref(), user.as_deref()) {
            (Some(token), Some(user)) if !token.is_empty() => (token, user),
            _ => {
                if stored.iter().any(Option::is_some) {
                    debug!("clearing incomplete saved session");
                    self.clear_store();
                }
                return None;
            }
        };

        match serde_json::from_str::<User>(raw_user) {
            Ok(user) => {
                if role.as_deref().map(Role::parse) != Some(user.role) {
                    debug!(stored = ?role, actual = %user.role, "saved role disagrees with user");
                    if let Err(err) = self.store.set(ROLE_KEY, user.role.as_str()) {
                        warn!(%err, "could not rewrite saved role");
                    }
                }
                Some(Session::with_user(token.to_string(), user))
            }
            Err(err) => {
                warn!(%err, "discarding corrupt saved user");
                self.clear_store();
                None
            }
        }
    }

    /// Sign in as a customer.
    pub async fn login(&self, credentials: &Credentials) -> Result<LoginOutcome, SessionError> {
        self.login_as(credentials, Role::Customer).await
    }

    /// Sign in and fetch the profile. `intended` only labels the attempt;
    /// the role always comes from the server's profile.
    pub async fn login_as(
        &self,
        credentials: &Credentials,
        intended: Role,
    ) -> Result<LoginOutcome, SessionError> {
        info!(email = %credentials.email, %intended, "logging in");
        let payload = self.api.authenticate(credentials).await.map_err(|err| {
            warn!(%err, "login request failed");
            SessionError::api(err, "Login failed")
        })?;

        let Some(token) = find_access_token(&payload) else {
            warn!("login response carried no access token");
            return Err(SessionError::MissingToken);
        };

        let epoch = {
            let mut inner = self.inner.write();
            inner.epoch += 1;
            inner.session = Session::token_only(token.clone());
            inner.phase = SessionPhase::Authenticated;
            self.persist(&inner.session);
            inner.epoch
        };

        let user = match self.api.current_user(&token).await {
            Ok(user) => {
                let mut inner = self.inner.write();
                if inner.epoch != epoch {
                    debug!("session replaced while profile was loading");
                    return Err(SessionError::Superseded);
                }
                inner.session = Session::with_user(token.clone(), user.clone());
                self.persist(&inner.session);
                Some(user)
            }
            Err(err) => {
                if self.inner.read().epoch != epoch {
                    return Err(SessionError::Superseded);
                }
                warn!(%err, "profile fetch failed after login; continuing without profile");
                None
            }
        };

        info!(role = ?user.as_ref().map(|user| user.role), "logged in");
        Ok(LoginOutcome {
            token,
            user,
            payload,
        })
    }

    /// Sign in and require the resolved role to be admin.
    ///
    /// Any other outcome, including a missing profile, ends the session.
    pub async fn admin_login(
        &self,
        credentials: &Credentials,
    ) -> Result<LoginOutcome, SessionError> {
        let outcome = self.login_as(credentials, Role::Admin).await?;
        match &outcome.user {
            Some(user) if user.role == Role::Admin => Ok(outcome),
            other => {
                warn!(role = ?other.as_ref().map(|user| user.role), "admin login refused");
                self.logout();
                Err(SessionError::AdminRequired)
            }
        }
    }

    /// Forget the session in memory and in the store. Safe to call repeatedly.
    pub fn logout(&self) {
        let mut inner = self.inner.write();
        inner.epoch += 1;
        let had_session = inner.session.token.is_some();
        inner.session = Session::default();
        inner.phase = SessionPhase::Anonymous;
        self.clear_store();
        if had_session {
            info!("logged out");
        }
    }

    /// Create an account. The server's response is returned untouched.
    pub async fn register(&self, registration: &Registration) -> Result<Value, SessionError> {
        if !EMAIL_PATTERN.is_match(registration.email.trim()) {
            return Err(SessionError::InvalidInput(
                "Please enter a valid email address.".into(),
            ));
        }
        if registration.password.is_empty() {
            return Err(SessionError::InvalidInput("Please enter a password.".into()));
        }

        info!(email = %registration.email, "registering account");
        self.api.register(registration).await.map_err(|err| {
            warn!(%err, "registration failed");
            SessionError::api(err, "Registration failed")
        })
    }

    /// Send a partial profile update and adopt the returned user.
    ///
    /// An empty string clears a field; the email can be changed but not cleared.
    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<User, SessionError> {
        let (token, epoch) = self.token_and_epoch().ok_or(SessionError::NotLoggedIn)?;
        if let Some(email) = &update.email {
            if !EMAIL_PATTERN.is_match(email.trim()) {
                return Err(SessionError::InvalidInput(
                    "Please enter a valid email address.".into(),
                ));
            }
        }
        let user = self
            .api
            .update_profile(&token, update)
            .await
            .map_err(|err| {
                warn!(%err, "profile update failed");
                SessionError::api(err, "Update failed")
            })?;
        self.adopt_user(epoch, &token, user.clone())?;
        Ok(user)
    }

    /// Reload the profile for the held token.
    ///
    /// Returns whether a signed-in user remains. A rejected token ends the
    /// session; network failures leave it as it was.
    pub async fn refresh_current_user(&self) -> Result<bool, SessionError> {
        let Some((token, epoch)) = self.token_and_epoch() else {
            return Ok(false);
        };
        match self.api.current_user(&token).await {
            Ok(user) => {
                self.adopt_user(epoch, &token, user)?;
                Ok(true)
            }
            Err(err) if err.is_unauthorized() => {
                info!("saved token was rejected");
                if self.inner.read().epoch == epoch {
                    self.logout();
                }
                Ok(false)
            }
            Err(err) => {
                warn!(%err, "profile refresh failed");
                Err(SessionError::api(err, "Failed to load profile"))
            }
        }
    }

    fn token_and_epoch(&self) -> Option<(String, u64)> {
        let inner = self.inner.read();
        inner
            .session
            .token
            .clone()
            .map(|token| (token, inner.epoch))
    }

    fn adopt_user(&self, epoch: u64, token: &str, user: User) -> Result<(), SessionError> {
        let mut inner = self.inner.write();
        if inner.epoch != epoch {
            debug!("session replaced while profile request was in flight");
            return Err(SessionError::Superseded);
        }
        inner.session = Session::with_user(token.to_string(), user);
        self.persist(&inner.session);
        Ok(())
    }

    /// Check that the signed-in user may perform an action at `access` level.
    pub fn authorize(&self, access: Access) -> Result<User, AccessDenied> {
        let action = match access {
            Access::SignedIn => "complete this action",
            Access::Admin => "access the admin area",
        };
        let user = self.signed_in_user(action)?;
        match access {
            Access::Admin if user.role != Role::Admin => Err(AccessDenied::Forbidden {
                role: user.role,
                required: "Admin",
            }),
            _ => Ok(user),
        }
    }

    /// Require any signed-in user; the denial names `action`.
    pub fn require_login(&self, action: &str) -> Result<User, AccessDenied> {
        self.signed_in_user(action)
    }

    fn signed_in_user(&self, action: &str) -> Result<User, AccessDenied> {
        let inner = self.inner.read();
        match inner.session.user() {
            Some(user) if inner.session.is_authenticated() => Ok(user.clone()),
            _ => Err(AccessDenied::LoginRequired {
                action: action.to_string(),
            }),
        }
    }

    /// Consistent copy of the current session.
    pub fn snapshot(&self) -> Session {
        self.inner.read().session.clone()
    }

    pub fn phase(&self) -> SessionPhase {
        self.inner.read().phase
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.read().session.is_authenticated()
    }

    pub fn token(&self) -> Option<String> {
        self.inner.read().session.token.clone()
    }

    pub fn current_user(&self) -> Option<User> {
        self.inner.read().session.current_user.clone()
    }

    /// Write the whole triple. Called with the state lock held so the store
    /// never disagrees with memory.
    fn persist(&self, session: &Session) {
        let user = match session.current_user.as_ref().map(serde_json::to_string) {
            Some(Ok(json)) => Some(json),
            Some(Err(err)) => {
                warn!(%err, "could not serialize user");
                None
            }
            None => None,
        };
        let changes = [
            (TOKEN_KEY, session.token.as_deref()),
            (USER_KEY, user.as_deref()),
            (ROLE_KEY, session.role.map(|role| role.as_str())),
        ];
        if let Err(err) = self.store.apply(&changes) {
            warn!(%err, "could not save session");
        }
    }

    fn clear_store(&self) {
        if let Err(err) = self.store.clear(&SESSION_KEYS) {
            warn!(%err, "could not clear saved session");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::RecordId,
        store::MemoryStore,
        testing::{user, FakeApi},
    };
    use serde_json::json;
    use tokio::sync::Notify;

    fn manager(api: FakeApi) -> (Arc<SessionManager>, Arc<FakeApi>, Arc<MemoryStore>) {
        let api = Arc::new(api);
        let store = Arc::new(MemoryStore::new());
        let manager = Arc::new(SessionManager::new(api.clone(), store.clone()));
        manager.initialize();
        (manager, api, store)
    }

    fn credentials() -> Credentials {
        Credentials::new("user1@example.com", "secret")
    }

    fn rejected(status: u16, message: &str) -> ApiError {
        ApiError::Rejected {
            status,
            message: Some(message.to_string()),
        }
    }

    fn stored(store: &MemoryStore, key: &str) -> Option<String> {
        store.get(key).unwrap()
    }

    #[test]
    fn initialize_restores_a_saved_session() {
        let saved = user(3, Role::Admin);
        let saved_json = serde_json::to_string(&saved).unwrap();
        let store = Arc::new(MemoryStore::with_entries([
            (TOKEN_KEY, "tok-9"),
            (USER_KEY, saved_json.as_str()),
            (ROLE_KEY, "admin"),
        ]));
        let api = Arc::new(FakeApi::default());
        let manager = SessionManager::new(api.clone(), store);
        assert_eq!(manager.phase(), SessionPhase::Uninitialized);

        manager.initialize();

        assert_eq!(manager.phase(), SessionPhase::Authenticated);
        assert_eq!(manager.snapshot(), Session::with_user("tok-9".into(), saved));
        assert!(manager.authorize(Access::Admin).is_ok());
        assert!(api.calls().is_empty());
    }

    #[test]
    fn corrupt_saved_user_is_discarded() {
        let store = Arc::new(MemoryStore::with_entries([
            (TOKEN_KEY, "tok"),
            (USER_KEY, "{not json"),
            (ROLE_KEY, "customer"),
        ]));
        let manager = SessionManager::new(Arc::new(FakeApi::default()), store.clone());
        manager.initialize();

        assert_eq!(manager.phase(), SessionPhase::Anonymous);
        assert!(!manager.is_authenticated());
        assert!(store.is_empty());
    }

    #[test]
    fn partial_saved_session_is_cleared() {
        let store = Arc::new(MemoryStore::with_entries([(TOKEN_KEY, "tok")]));
        let manager = SessionManager::new(Arc::new(FakeApi::default()), store.clone());
        manager.initialize();

        assert_eq!(manager.phase(), SessionPhase::Anonymous);
        assert_eq!(manager.snapshot(), Session::default());
        assert!(store.is_empty());
    }

    #[test]
    fn second_initialize_is_ignored() {
        let (manager, _, store) = manager(FakeApi::default());
        store.set(TOKEN_KEY, "late").unwrap();
        store
            .set(USER_KEY, &serde_json::to_string(&user(1, Role::Customer)).unwrap())
            .unwrap();

        manager.initialize();
        assert_eq!(manager.phase(), SessionPhase::Anonymous);
        assert!(!manager.is_authenticated());
    }

    #[tokio::test]
    async fn login_persists_token_before_fetching_profile() {
        let (manager, api, store) = {
            let api = Arc::new(FakeApi::default());
            let store = Arc::new(MemoryStore::new());
            *api.watched_store.lock() = Some(store.clone());
            let manager = SessionManager::new(api.clone(), store.clone());
            manager.initialize();
            (manager, api, store)
        };

        let outcome = manager.login(&credentials()).await.unwrap();

        assert_eq!(outcome.token, "tok-1");
        assert_eq!(outcome.user, Some(user(1, Role::Customer)));
        assert_eq!(
            *api.token_seen_by_profile.lock(),
            Some(Some("tok-1".to_string()))
        );
        assert_eq!(api.calls(), vec!["authenticate", "current_user:tok-1"]);
        assert!(manager.is_authenticated());
        assert_eq!(stored(&store, TOKEN_KEY).as_deref(), Some("tok-1"));
        assert_eq!(stored(&store, ROLE_KEY).as_deref(), Some("customer"));
        let saved: User = serde_json::from_str(&stored(&store, USER_KEY).unwrap()).unwrap();
        assert_eq!(saved, user(1, Role::Customer));
    }

    #[tokio::test]
    async fn rejected_login_reports_server_message_and_keeps_state() {
        let api = FakeApi::default();
        *api.auth.lock() = Err(rejected(401, "Invalid credentials"));
        let (manager, _, store) = manager(api);

        let err = manager.login(&credentials()).await.unwrap_err();

        assert_eq!(err.to_string(), "Invalid credentials");
        assert_eq!(manager.snapshot(), Session::default());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn transport_failure_uses_generic_message() {
        let api = FakeApi::default();
        *api.auth.lock() = Err(ApiError::Transport("connection refused".into()));
        let (manager, _, _) = manager(api);

        let err = manager.login(&credentials()).await.unwrap_err();
        assert_eq!(err.to_string(), "Login failed");
    }

    #[tokio::test]
    async fn login_without_token_fails_untouched() {
        let api = FakeApi::default();
        *api.auth.lock() = Ok(json!({"message": "ok", "user": {"id": 1}}));
        let (manager, api, store) = manager(api);

        let err = manager.login(&credentials()).await.unwrap_err();

        assert_eq!(err, SessionError::MissingToken);
        assert_eq!(api.calls(), vec!["authenticate"]);
        assert!(!manager.is_authenticated());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn profile_failure_leaves_a_degraded_session() {
        let (manager, _, store) = manager(FakeApi::with_profile(Err(ApiError::Transport(
            "reset".into(),
        ))));

        let outcome = manager.login(&credentials()).await.unwrap();

        assert!(outcome.user.is_none());
        let session = manager.snapshot();
        assert!(session.is_degraded());
        assert!(!session.is_authenticated());
        assert_eq!(manager.phase(), SessionPhase::Authenticated);
        assert_eq!(stored(&store, TOKEN_KEY).as_deref(), Some("tok-1"));
        assert_eq!(stored(&store, USER_KEY), None);
        assert!(matches!(
            manager.authorize(Access::SignedIn),
            Err(AccessDenied::LoginRequired { .. })
        ));
    }

    #[tokio::test]
    async fn new_login_clears_previous_user_before_profile_arrives() {
        let (manager, api, _) = manager(FakeApi::default());
        manager.login(&credentials()).await.unwrap();

        let gate = Arc::new(Notify::new());
        *api.profile_gate.lock() = Some(gate.clone());
        *api.auth.lock() = Ok(json!({"access_token": "tok-2"}));
        *api.profile.lock() = Ok(user(2, Role::Customer));

        let task = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.login(&credentials()).await })
        };
        while manager.token().as_deref() != Some("tok-2") {
            tokio::task::yield_now().await;
        }
        let mid = manager.snapshot();
        assert_eq!(mid.current_user, None);
        assert_eq!(mid.role, None);

        gate.notify_one();
        let outcome = task.await.unwrap().unwrap();
        assert_eq!(outcome.user.map(|user| user.id), Some(RecordId::from(2)));
    }

    #[tokio::test]
    async fn logout_during_profile_fetch_wins() {
        let (manager, api, store) = manager(FakeApi::default());
        let gate = Arc::new(Notify::new());
        *api.profile_gate.lock() = Some(gate.clone());

        let task = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.login(&credentials()).await })
        };
        while manager.token().is_none() {
            tokio::task::yield_now().await;
        }
        manager.logout();
        gate.notify_one();

        assert_eq!(task.await.unwrap().unwrap_err(), SessionError::Superseded);
        assert_eq!(manager.snapshot(), Session::default());
        assert_eq!(manager.phase(), SessionPhase::Anonymous);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn admin_login_accepts_admins() {
        let (manager, _, store) = manager(FakeApi::with_profile(Ok(user(7, Role::Admin))));

        let outcome = manager.admin_login(&credentials()).await.unwrap();

        assert_eq!(outcome.user.map(|user| user.role), Some(Role::Admin));
        assert_eq!(stored(&store, ROLE_KEY).as_deref(), Some("admin"));
        assert_eq!(manager.authorize(Access::Admin).unwrap().id, RecordId::from(7));
    }

    #[tokio::test]
    async fn admin_login_rejects_customers_and_clears_everything() {
        let (manager, _, store) = manager(FakeApi::default());

        let err = manager.admin_login(&credentials()).await.unwrap_err();

        assert_eq!(err, SessionError::AdminRequired);
        assert_eq!(err.to_string(), "Access denied. Admin privileges required.");
        assert_eq!(manager.snapshot(), Session::default());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn admin_login_without_profile_is_refused() {
        let (manager, _, store) = manager(FakeApi::with_profile(Err(rejected(500, "boom"))));

        let err = manager.admin_login(&credentials()).await.unwrap_err();

        assert_eq!(err, SessionError::AdminRequired);
        assert!(!manager.is_authenticated());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn logout_is_idempotent() {
        let (manager, _, store) = manager(FakeApi::default());
        manager.login(&credentials()).await.unwrap();

        manager.logout();
        let once = manager.snapshot();
        manager.logout();

        assert_eq!(once, Session::default());
        assert_eq!(manager.snapshot(), once);
        assert_eq!(manager.phase(), SessionPhase::Anonymous);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn gate_distinguishes_anonymous_from_forbidden() {
        let (manager, _, _) = manager(FakeApi::default());

        let denied = manager.authorize(Access::Admin).unwrap_err();
        assert_eq!(
            denied.to_string(),
            "Please login or register to access the admin area."
        );
        assert_eq!(
            manager.require_login("book a tour").unwrap_err().to_string(),
            "Please login or register to book a tour."
        );

        manager.login(&credentials()).await.unwrap();
        let denied = manager.authorize(Access::Admin).unwrap_err();
        assert_eq!(
            denied,
            AccessDenied::Forbidden {
                role: Role::Customer,
                required: "Admin"
            }
        );
        assert_ne!(
            denied.to_string(),
            AccessDenied::LoginRequired {
                action: "access the admin area".into()
            }
            .to_string()
        );
        assert!(manager.authorize(Access::SignedIn).is_ok());
    }

    #[tokio::test]
    async fn register_checks_email_before_calling_api() {
        let (manager, api, _) = manager(FakeApi::default());
        let registration = Registration {
            email: "not-an-email".into(),
            password: "pw".into(),
            ..Registration::default()
        };

        let err = manager.register(&registration).await.unwrap_err();
        assert!(matches!(err, SessionError::InvalidInput(_)));
        assert!(api.calls().is_empty());

        *api.registered.lock() = Err(ApiError::Transport("down".into()));
        let registration = Registration {
            email: "new@example.com".into(),
            ..registration
        };
        let err = manager.register(&registration).await.unwrap_err();
        assert_eq!(err.to_string(), "Registration failed");
        assert!(!manager.is_authenticated());
    }

    #[tokio::test]
    async fn update_profile_requires_token_and_persists_result() {
        let (manager, api, store) = manager(FakeApi::default());
        let update = ProfileUpdate {
            phone: Some("555".into()),
            ..ProfileUpdate::default()
        };
        assert_eq!(
            manager.update_profile(&update).await.unwrap_err(),
            SessionError::NotLoggedIn
        );

        manager.login(&credentials()).await.unwrap();
        let mut changed = user(1, Role::Customer);
        changed.phone = Some("555".into());
        *api.updated.lock() = Ok(changed.clone());

        assert_eq!(manager.update_profile(&update).await.unwrap(), changed);
        assert_eq!(manager.current_user(), Some(changed.clone()));
        let saved: User = serde_json::from_str(&stored(&store, USER_KEY).unwrap()).unwrap();
        assert_eq!(saved, changed);

        *api.updated.lock() = Err(ApiError::Rejected {
            status: 400,
            message: None,
        });
        assert_eq!(
            manager.update_profile(&update).await.unwrap_err().to_string(),
            "Update failed"
        );
        assert_eq!(manager.current_user(), Some(changed));
    }

    #[tokio::test]
    async fn update_profile_can_clear_phone_but_not_email() {
        let (manager, api, _) = manager(FakeApi::default());
        manager.login(&credentials()).await.unwrap();

        let cleared_email = ProfileUpdate {
            email: Some(String::new()),
            ..ProfileUpdate::default()
        };
        assert!(matches!(
            manager.update_profile(&cleared_email).await,
            Err(SessionError::InvalidInput(_))
        ));
        assert!(!api.calls().iter().any(|call| call.starts_with("update_profile")));

        let cleared_phone = ProfileUpdate {
            phone: Some(String::new()),
            ..ProfileUpdate::default()
        };
        let mut without_phone = user(1, Role::Customer);
        without_phone.phone = None;
        *api.updated.lock() = Ok(without_phone.clone());
        assert_eq!(manager.update_profile(&cleared_phone).await.unwrap(), without_phone);
        assert_eq!(api.calls().last().map(String::as_str), Some("update_profile:tok-1"));
    }

    #[tokio::test]
    async fn refresh_handles_expired_and_unreachable() {
        let (manager, api, store) = manager(FakeApi::default());
        assert!(!manager.refresh_current_user().await.unwrap());

        manager.login(&credentials()).await.unwrap();
        *api.profile.lock() = Err(ApiError::Transport("offline".into()));
        assert!(manager.refresh_current_user().await.is_err());
        assert!(manager.is_authenticated());

        *api.profile.lock() = Err(rejected(401, "Token expired"));
        assert!(!manager.refresh_current_user().await.unwrap());
        assert!(!manager.is_authenticated());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn refresh_completes_a_degraded_session() {
        let (manager, api, store) = manager(FakeApi::with_profile(Err(ApiError::Transport(
            "reset".into(),
        ))));
        manager.login(&credentials()).await.unwrap();
        assert!(manager.snapshot().is_degraded());

        *api.profile.lock() = Ok(user(1, Role::Customer));
        assert!(manager.refresh_current_user().await.unwrap());
        assert!(manager.is_authenticated());
        assert!(stored(&store, USER_KEY).is_some());
    }
}
