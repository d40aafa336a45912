use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use {
    secrecy::{ExposeSecret, SecretString},
    tidings_common::{AuthFailure, ClientError, Session, SessionState, UserPayload},
    tidings_gateway::{ApiError, ApiGateway, AuthResponse, LoginRequest, RegisterRequest},
    tidings_routing::{Decision, Navigator, RoutePolicy, decide},
    tokio::sync::watch,
    tracing::{debug, info, warn},
};

use crate::storage::TokenStore;

/// Outcome of a profile retrieval that did not fail outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileFetch {
    /// Profile, roles and permissions were applied.
    Fetched,
    /// The token was rejected or the call failed; the session was logged out.
    Downgraded,
    /// A logout or new login happened while the request was in flight; the
    /// response was discarded.
    Superseded,
}

/// Owns the session record and is its only writer.
///
/// Readers observe transitions through [`SessionManager::subscribe`] or
/// [`SessionManager::snapshot`]; both see a transition as soon as the method
/// performing it returns.
pub struct SessionManager {
    gateway: Arc<dyn ApiGateway>,
    tokens: TokenStore,
    account: String,
    navigator: Arc<dyn Navigator>,
    policy: RoutePolicy,
    session: watch::Sender<Session>,
    /// Bumped by every login start and every logout. A network response is
    /// applied only if the epoch it started under is still current.
    epoch: AtomicU64,
}

impl SessionManager {
    /// Build the manager. If `tokens` holds a token for `account` the session
    /// starts in `Authenticating`; call [`SessionManager::rehydrate`] next.
    pub fn new(
        gateway: Arc<dyn ApiGateway>,
        tokens: TokenStore,
        account: impl Into<String>,
        navigator: Arc<dyn Navigator>,
        policy: RoutePolicy,
    ) -> Self {
        let account = account.into();
        let initial = match tokens.load(&account) {
            Some(token) => {
                debug!(account = %account, "found persisted token");
                Session::rehydrating(token)
            },
            None => Session::anonymous(),
        };
        let (session, _) = watch::channel(initial);
        Self {
            gateway,
            tokens,
            account,
            navigator,
            policy,
            session,
            epoch: AtomicU64::new(0),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.session.subscribe()
    }

    pub fn snapshot(&self) -> Session {
        self.session.borrow().clone()
    }

    pub fn state(&self) -> SessionState {
        self.session.borrow().state
    }

    pub fn policy(&self) -> &RoutePolicy {
        &self.policy
    }

    /// Permission check against the current session.
    pub fn can(&self, permission: &str) -> bool {
        self.session.borrow().can(permission)
    }

    /// Route guard evaluated against the current session.
    pub fn decide(&self, path: &str) -> Decision {
        decide(&self.session.borrow(), path, &self.policy)
    }

    /// Guard a navigation attempt and perform it (or its redirect).
    pub fn navigate(&self, path: &str) -> Decision {
        let decision = self.decide(path);
        let target = self.policy.destination(decision).unwrap_or(path);
        self.navigator.navigate(target);
        decision
    }

    /// Validate a persisted token by fetching the profile. Never fails: an
    /// invalid token silently downgrades the session to `Anonymous`.
    pub async fn rehydrate(&self) -> SessionState {
        let pending = {
            let s = self.session.borrow();
            s.state == SessionState::Authenticating && s.token.is_some()
        };
        if pending {
            match self.fetch_profile().await {
                Ok(outcome) => debug!(?outcome, "rehydration finished"),
                Err(e) => debug!(error = %e, "rehydration skipped"),
            }
        }
        self.state()
    }

    pub async fn login(&self, email: &str, password: SecretString) -> Result<(), ClientError> {
        if email.trim().is_empty() || password.expose_secret().is_empty() {
            return Err(ClientError::validation("email and password are required"));
        }

        let epoch = self.begin_authenticating();
        let req = LoginRequest {
            email: email.trim().to_string(),
            password,
        };
        let result = self.gateway.login(&req).await;
        self.complete_authentication(epoch, result.map_err(login_error))
            .await
    }

    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: SecretString,
        confirmation: SecretString,
    ) -> Result<(), ClientError> {
        validate_registration(name, email, &password, &confirmation)?;

        let epoch = self.begin_authenticating();
        let req = RegisterRequest {
            name: name.trim().to_string(),
            email: email.trim().to_string(),
            password,
            password_confirmation: confirmation,
        };
        let result = self.gateway.register(&req).await;
        self.complete_authentication(epoch, result.map_err(ClientError::from))
            .await
    }

    /// Retrieve identity, roles and permissions for the current token.
    ///
    /// Errors only when there is no token. Any backend failure is terminal
    /// for this attempt and logs the session out without surfacing an error.
    pub async fn fetch_profile(&self) -> Result<ProfileFetch, ClientError> {
        let token = self
            .session
            .borrow()
            .token
            .clone()
            .ok_or(AuthFailure::NotAuthenticated)?;
        let epoch = self.epoch.load(Ordering::SeqCst);

        let result = self.gateway.me(&token).await;
        if self.epoch.load(Ordering::SeqCst) != epoch {
            debug!("profile response superseded");
            return Ok(ProfileFetch::Superseded);
        }

        match result {
            Ok(profile) => {
                let roles = profile.role_set();
                let permissions = profile.permission_set();
                self.session.send_modify(|s| {
                    apply_user(s, &profile.user);
                    s.state = SessionState::Authenticated;
                    s.roles = roles;
                    s.permissions = permissions;
                    s.fetched = true;
                });
                debug!(
                    roles = profile.roles.len(),
                    permissions = profile.permissions.len(),
                    "profile fetched"
                );
                Ok(ProfileFetch::Fetched)
            },
            Err(e) => {
                warn!(error = %e, "profile fetch failed, logging out");
                self.logout();
                Ok(ProfileFetch::Downgraded)
            },
        }
    }

    /// Clear the session and the persisted token, then navigate to the login
    /// page. The persisted token is always deleted; on an already-empty
    /// session nothing else happens.
    pub fn logout(&self) {
        self.forget_token();

        let already_empty = {
            let s = self.session.borrow();
            s.state == SessionState::Anonymous && s.token.is_none()
        };
        if already_empty {
            return;
        }

        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.session.send_replace(Session::anonymous());
        info!("logged out");
        self.navigator.navigate(self.policy.login_path());
    }

    fn forget_token(&self) {
        if let Err(e) = self.tokens.delete(&self.account) {
            warn!(error = %e, "failed to delete persisted token");
        }
    }

    /// A new login or registration replaces any previous session, on disk
    /// as well as in memory, whatever its outcome.
    fn begin_authenticating(&self) -> u64 {
        self.forget_token();
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        self.session.send_replace(Session {
            state: SessionState::Authenticating,
            ..Session::default()
        });
        epoch
    }

    async fn complete_authentication(
        &self,
        epoch: u64,
        result: Result<AuthResponse, ClientError>,
    ) -> Result<(), ClientError> {
        if self.epoch.load(Ordering::SeqCst) != epoch {
            debug!("authentication response superseded");
            return Err(AuthFailure::NotAuthenticated.into());
        }

        let resp = match result {
            Ok(resp) => resp,
            Err(e) => {
                self.session.send_replace(Session::anonymous());
                return Err(e);
            },
        };

        if let Err(e) = self.tokens.save(&self.account, &resp.access_token) {
            warn!(error = %e, "failed to persist token");
        }
        self.session.send_modify(|s| {
            apply_user(s, &resp.user);
            s.state = SessionState::Authenticated;
            s.token = Some(resp.access_token);
        });
        info!(user_id = %resp.user.id, "authenticated");

        match self.fetch_profile().await? {
            ProfileFetch::Fetched => {
                self.navigator.navigate(self.policy.home_path());
                Ok(())
            },
            ProfileFetch::Downgraded => Err(AuthFailure::Unauthorized.into()),
            ProfileFetch::Superseded => Err(AuthFailure::NotAuthenticated.into()),
        }
    }
}

fn apply_user(session: &mut Session, user: &UserPayload) {
    session.user_id = Some(user.id.clone());
    session.display_name = user.name.clone();
    session.email = user.email.clone();
}

/// Rejected credentials come back as 401 or 422 depending on the backend.
fn login_error(err: ApiError) -> ClientError {
    match err {
        ApiError::Unauthorized { .. } | ApiError::Validation { .. } => {
            AuthFailure::InvalidCredentials.into()
        },
        ApiError::Status { status, .. } if (400..500).contains(&status) => {
            AuthFailure::InvalidCredentials.into()
        },
        other => other.into(),
    }
}

fn validate_registration(
    name: &str,
    email: &str,
    password: &SecretString,
    confirmation: &SecretString,
) -> Result<(), ClientError> {
    if name.trim().is_empty() {
        return Err(ClientError::validation("name is required"));
    }
    let email = email.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(ClientError::validation("a valid email is required"));
    }
    if password.expose_secret().is_empty() {
        return Err(ClientError::validation("password is required"));
    }
    if password.expose_secret() != confirmation.expose_secret() {
        return Err(ClientError::validation("password confirmation does not match"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        tidings_gateway::{Call, NamedEntry, ProfileResponse, ScriptedGateway},
        tidings_routing::HistoryNavigator,
    };

    const ACCOUNT: &str = "http://backend/api";

    struct Harness {
        _dir: tempfile::TempDir,
        gateway: Arc<ScriptedGateway>,
        navigator: Arc<HistoryNavigator>,
        tokens: TokenStore,
    }

    impl Harness {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let tokens = TokenStore::with_path(dir.path().join("tokens.json"));
            Self {
                _dir: dir,
                gateway: Arc::new(ScriptedGateway::new()),
                navigator: Arc::new(HistoryNavigator::new()),
                tokens,
            }
        }

        fn manager(&self) -> SessionManager {
            SessionManager::new(
                self.gateway.clone(),
                self.tokens.clone(),
                ACCOUNT,
                self.navigator.clone(),
                RoutePolicy::default(),
            )
        }
    }

    fn secret(s: &str) -> SecretString {
        SecretString::new(s.into())
    }

    fn user() -> UserPayload {
        UserPayload {
            id: "5".into(),
            name: "Ana".into(),
            email: "ana@x.io".into(),
        }
    }

    fn auth_ok(token: &str) -> AuthResponse {
        AuthResponse {
            access_token: secret(token),
            user: user(),
        }
    }

    fn profile() -> ProfileResponse {
        ProfileResponse {
            user: user(),
            roles: vec![NamedEntry::Name("employee".into())],
            permissions: vec![
                NamedEntry::Name("chat.send".into()),
                NamedEntry::Object {
                    name: "attendance.view".into(),
                },
            ],
        }
    }

    #[tokio::test]
    async fn login_authenticates_persists_and_navigates_home() {
        let h = Harness::new();
        h.gateway.push_login(Ok(auth_ok("tok-1")));
        h.gateway.push_me(Ok(profile()));
        let manager = h.manager();
        let watcher = manager.subscribe();

        manager.login("ana@x.io", secret("pw")).await.unwrap();

        let session = watcher.borrow().clone();
        assert_eq!(session.state, SessionState::Authenticated);
        assert!(session.fetched);
        assert_eq!(session.user_id.as_deref(), Some("5"));
        assert!(manager.can("chat.send"));
        assert!(manager.can("attendance.view"));
        assert!(!manager.can("payroll.edit"));
        assert!(session.has_role("employee"));
        assert_eq!(h.tokens.load(ACCOUNT).unwrap().expose_secret(), "tok-1");
        assert_eq!(h.navigator.history(), vec!["/dashboard"]);
    }

    #[tokio::test]
    async fn bad_credentials_return_to_anonymous() {
        let h = Harness::new();
        h.gateway
            .push_login(Err(ApiError::Unauthorized { status: 401 }));
        let manager = h.manager();

        let err = manager.login("ana@x.io", secret("nope")).await.unwrap_err();

        assert!(matches!(err, ClientError::Auth(AuthFailure::InvalidCredentials)));
        assert_eq!(manager.state(), SessionState::Anonymous);
        assert!(manager.snapshot().token.is_none());
        assert!(h.tokens.load(ACCOUNT).is_none());
        assert!(h.navigator.history().is_empty());
        // Never retried.
        assert_eq!(h.gateway.count(|c| matches!(c, Call::Login { .. })), 1);
    }

    #[tokio::test]
    async fn failed_login_over_a_persisted_session_leaves_nothing_behind() {
        let h = Harness::new();
        h.tokens.save(ACCOUNT, &secret("old-valid")).unwrap();
        h.gateway.push_me(Ok(profile()));
        let manager = h.manager();
        assert_eq!(manager.rehydrate().await, SessionState::Authenticated);

        h.gateway
            .push_login(Err(ApiError::Unauthorized { status: 401 }));
        manager.login("other@x.io", secret("nope")).await.unwrap_err();
        assert_eq!(manager.state(), SessionState::Anonymous);
        assert!(h.tokens.load(ACCOUNT).is_none());

        manager.logout();
        assert!(h.tokens.load(ACCOUNT).is_none());

        let restarted = h.manager();
        assert_eq!(restarted.state(), SessionState::Anonymous);
        assert_eq!(restarted.rehydrate().await, SessionState::Anonymous);
    }

    #[tokio::test]
    async fn logout_on_empty_session_still_clears_disk() {
        let h = Harness::new();
        let manager = h.manager();
        h.tokens.save(ACCOUNT, &secret("stray")).unwrap();

        manager.logout();

        assert!(h.tokens.load(ACCOUNT).is_none());
        assert!(h.navigator.history().is_empty());
    }

    #[tokio::test]
    async fn network_failure_surfaces_as_network_error() {
        let h = Harness::new();
        h.gateway
            .push_login(Err(ApiError::Transport("connection refused".into())));
        let manager = h.manager();

        let err = manager.login("ana@x.io", secret("pw")).await.unwrap_err();
        assert!(matches!(err, ClientError::Network(_)));
        assert_eq!(manager.state(), SessionState::Anonymous);
    }

    #[tokio::test]
    async fn empty_credentials_are_rejected_locally() {
        let h = Harness::new();
        let manager = h.manager();

        let err = manager.login("  ", secret("pw")).await.unwrap_err();
        assert!(matches!(err, ClientError::Validation(_)));
        let err = manager.login("a@b.c", secret("")).await.unwrap_err();
        assert!(matches!(err, ClientError::Validation(_)));
        assert!(h.gateway.calls().is_empty());
        assert_eq!(manager.state(), SessionState::Anonymous);
    }

    #[tokio::test]
    async fn register_validates_then_auto_authenticates() {
        let h = Harness::new();
        let manager = h.manager();

        let err = manager
            .register("Ana", "ana@x.io", secret("pw1"), secret("pw2"))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Validation(m) if m.contains("confirmation")));
        let err = manager
            .register("Ana", "not-an-email", secret("pw"), secret("pw"))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Validation(_)));
        assert!(h.gateway.calls().is_empty());

        h.gateway.push_register(Ok(auth_ok("tok-r")));
        h.gateway.push_me(Ok(profile()));
        manager
            .register("Ana", "ana@x.io", secret("pw"), secret("pw"))
            .await
            .unwrap();
        assert_eq!(manager.state(), SessionState::Authenticated);
        assert_eq!(h.tokens.load(ACCOUNT).unwrap().expose_secret(), "tok-r");
    }

    #[tokio::test]
    async fn register_surfaces_server_validation() {
        let h = Harness::new();
        h.gateway.push_register(Err(ApiError::Validation {
            message: "The email has already been taken.".into(),
        }));
        let manager = h.manager();

        let err = manager
            .register("Ana", "ana@x.io", secret("pw"), secret("pw"))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Validation(m) if m.contains("taken")));
        assert_eq!(manager.state(), SessionState::Anonymous);
    }

    #[tokio::test]
    async fn rehydration_with_valid_token() {
        let h = Harness::new();
        h.tokens.save(ACCOUNT, &secret("persisted")).unwrap();
        h.gateway.push_me(Ok(profile()));

        let manager = h.manager();
        assert_eq!(manager.state(), SessionState::Authenticating);
        assert_eq!(manager.rehydrate().await, SessionState::Authenticated);
        assert!(manager.snapshot().fetched);
        assert_eq!(manager.decide("/dashboard"), Decision::Allow);
    }

    #[tokio::test]
    async fn rehydration_with_expired_token_downgrades_silently() {
        let h = Harness::new();
        h.tokens.save(ACCOUNT, &secret("expired")).unwrap();
        h.gateway.push_me(Err(ApiError::Unauthorized { status: 401 }));

        let manager = h.manager();
        let state = manager.rehydrate().await;

        assert_eq!(state, SessionState::Anonymous);
        assert!(manager.snapshot().token.is_none());
        assert!(h.tokens.load(ACCOUNT).is_none());
        assert_eq!(h.navigator.history(), vec!["/login"]);
        assert_eq!(manager.decide("/dashboard"), Decision::RedirectToLogin);
    }

    #[tokio::test]
    async fn rehydrate_without_token_is_a_noop() {
        let h = Harness::new();
        let manager = h.manager();
        assert_eq!(manager.rehydrate().await, SessionState::Anonymous);
        assert!(h.gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn fetch_profile_requires_token() {
        let h = Harness::new();
        let manager = h.manager();
        let err = manager.fetch_profile().await.unwrap_err();
        assert!(matches!(err, ClientError::Auth(AuthFailure::NotAuthenticated)));
    }

    #[tokio::test]
    async fn fetch_profile_is_idempotent() {
        let h = Harness::new();
        h.gateway.push_login(Ok(auth_ok("tok")));
        h.gateway.push_me(Ok(profile()));
        h.gateway.push_me(Ok(profile()));
        let manager = h.manager();
        manager.login("ana@x.io", secret("pw")).await.unwrap();

        let before = manager.snapshot();
        assert_eq!(manager.fetch_profile().await.unwrap(), ProfileFetch::Fetched);
        let after = manager.snapshot();
        assert_eq!(before.permissions, after.permissions);
        assert_eq!(before.roles, after.roles);
        assert_eq!(after.state, SessionState::Authenticated);
    }

    #[tokio::test]
    async fn logout_is_idempotent_and_guard_sees_it_immediately() {
        let h = Harness::new();
        h.gateway.push_login(Ok(auth_ok("tok")));
        h.gateway.push_me(Ok(profile()));
        let manager = h.manager();
        manager.login("ana@x.io", secret("pw")).await.unwrap();

        manager.logout();
        assert_eq!(manager.decide("/dashboard"), Decision::RedirectToLogin);
        assert!(!manager.can("chat.send"));
        manager.logout();

        assert_eq!(h.navigator.history(), vec!["/dashboard", "/login"]);
        assert!(h.tokens.load(ACCOUNT).is_none());
        let session = manager.snapshot();
        assert!(session.token.is_none());
        assert!(session.permissions.is_empty());
        assert!(!session.fetched);
    }

    #[tokio::test]
    async fn login_fails_when_profile_is_rejected() {
        let h = Harness::new();
        h.gateway.push_login(Ok(auth_ok("tok")));
        h.gateway.push_me(Err(ApiError::Unauthorized { status: 403 }));
        let manager = h.manager();

        let err = manager.login("ana@x.io", secret("pw")).await.unwrap_err();
        assert!(err.is_unauthorized());
        assert_eq!(manager.state(), SessionState::Anonymous);
        assert_eq!(h.navigator.history(), vec!["/login"]);
    }

    #[tokio::test]
    async fn navigate_applies_guard() {
        let h = Harness::new();
        let manager = h.manager();
        assert_eq!(manager.navigate("/chat"), Decision::RedirectToLogin);
        assert_eq!(manager.navigate("/login"), Decision::Allow);
        assert_eq!(h.navigator.history(), vec!["/login", "/login"]);
    }
}
