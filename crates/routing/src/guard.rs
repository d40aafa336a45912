use {tidings_common::Session, tidings_config::RoutesConfig};

/// Outcome of a navigation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    RedirectToLogin,
    RedirectToHome,
}

/// Normalised path sets used by [`decide`].
#[derive(Debug, Clone)]
pub struct RoutePolicy {
    public_paths: Vec<String>,
    guest_paths: Vec<String>,
    login_path: String,
    home_path: String,
}

impl RoutePolicy {
    pub fn new(
        public_paths: impl IntoIterator<Item = impl AsRef<str>>,
        guest_paths: impl IntoIterator<Item = impl AsRef<str>>,
    ) -> Self {
        let defaults = RoutesConfig::default();
        Self {
            public_paths: public_paths.into_iter().map(|p| normalize(p.as_ref())).collect(),
            guest_paths: guest_paths.into_iter().map(|p| normalize(p.as_ref())).collect(),
            login_path: normalize(&defaults.login_path),
            home_path: normalize(&defaults.home_path),
        }
    }

    pub fn from_config(routes: &RoutesConfig) -> Self {
        let mut policy = Self::new(&routes.public_paths, &routes.guest_paths);
        policy.login_path = normalize(&routes.login_path);
        policy.home_path = normalize(&routes.home_path);
        policy
    }

    pub fn login_path(&self) -> &str {
        &self.login_path
    }

    pub fn home_path(&self) -> &str {
        &self.home_path
    }

    pub fn is_public(&self, path: &str) -> bool {
        let path = normalize(path);
        self.public_paths.iter().any(|p| matches_prefix(&path, p))
    }

    fn is_guest_only(&self, path: &str) -> bool {
        self.guest_paths.iter().any(|p| matches_prefix(path, p))
    }

    /// Where a decision sends the user, if anywhere.
    pub fn destination(&self, decision: Decision) -> Option<&str> {
        match decision {
            Decision::Allow => None,
            Decision::RedirectToLogin => Some(&self.login_path),
            Decision::RedirectToHome => Some(&self.home_path),
        }
    }
}

impl Default for RoutePolicy {
    fn default() -> Self {
        Self::from_config(&RoutesConfig::default())
    }
}

/// Strip a trailing slash (the root stays `/`) and ensure a leading one.
fn normalize(path: &str) -> String {
    let trimmed = path.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

/// `path` equals `base` or lies beneath it.
fn matches_prefix(path: &str, base: &str) -> bool {
    path == base
        || path
            .strip_prefix(base)
            .is_some_and(|rest| rest.starts_with('/'))
}

/// Decide whether `session` may navigate to `requested_path`.
///
/// Pure: the result depends only on the arguments.
pub fn decide(session: &Session, requested_path: &str, policy: &RoutePolicy) -> Decision {
    let path = normalize(requested_path);
    let public = policy.public_paths.iter().any(|p| matches_prefix(&path, p));

    match (session.is_authenticated(), public) {
        (false, false) => Decision::RedirectToLogin,
        (false, true) => Decision::Allow,
        (true, true) if policy.is_guest_only(&path) => Decision::RedirectToHome,
        (true, _) => Decision::Allow,
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        secrecy::SecretString,
        tidings_common::SessionState,
    };

    fn authed() -> Session {
        Session::authenticated("1", "Ana", SecretString::new("t".into()))
    }

    #[test]
    fn anonymous_is_sent_to_login_for_protected_paths() {
        let policy = RoutePolicy::default();
        let anon = Session::anonymous();
        assert_eq!(decide(&anon, "/dashboard", &policy), Decision::RedirectToLogin);
        assert_eq!(decide(&anon, "/chat/", &policy), Decision::RedirectToLogin);
        assert_eq!(decide(&anon, "/login", &policy), Decision::Allow);
        assert_eq!(decide(&anon, "/", &policy), Decision::Allow);
    }

    #[test]
    fn authenticated_is_bounced_from_guest_pages_only() {
        let policy = RoutePolicy::default();
        let session = authed();
        assert_eq!(decide(&session, "/login", &policy), Decision::RedirectToHome);
        assert_eq!(decide(&session, "/register/", &policy), Decision::RedirectToHome);
        assert_eq!(decide(&session, "/", &policy), Decision::Allow);
        assert_eq!(decide(&session, "/forgot-password", &policy), Decision::Allow);
        assert_eq!(decide(&session, "/dashboard", &policy), Decision::Allow);
    }

    #[test]
    fn explicit_paths_share_default_destinations() {
        let policy = RoutePolicy::new(["/login", "/about"], ["/login"]);
        let config = RoutePolicy::default();
        assert_eq!(policy.home_path(), config.home_path());
        assert_eq!(policy.home_path(), "/dashboard");
        assert_eq!(policy.login_path(), config.login_path());
        assert_eq!(
            policy.destination(Decision::RedirectToHome),
            config.destination(Decision::RedirectToHome)
        );
    }

    #[test]
    fn rehydrating_session_is_not_authenticated() {
        let policy = RoutePolicy::default();
        let session = Session::rehydrating(SecretString::new("t".into()));
        assert_eq!(session.state, SessionState::Authenticating);
        assert_eq!(decide(&session, "/dashboard", &policy), Decision::RedirectToLogin);
    }

    #[test]
    fn prefix_match_requires_segment_boundary() {
        let policy = RoutePolicy::default();
        let anon = Session::anonymous();
        assert_eq!(decide(&anon, "/login/help", &policy), Decision::Allow);
        assert_eq!(decide(&anon, "/loginx", &policy), Decision::RedirectToLogin);
        // The root is public but does not make every path public.
        assert_eq!(decide(&anon, "/reports", &policy), Decision::RedirectToLogin);
    }

    #[test]
    fn public_paths_without_leading_slash_are_normalised() {
        let policy = RoutePolicy::new(["reset-password"], Vec::<String>::new());
        assert!(policy.is_public("/reset-password/"));
        assert!(policy.is_public("/reset-password/abc"));
    }

    #[test]
    fn destinations_come_from_config() {
        let policy = RoutePolicy::default();
        assert_eq!(policy.destination(Decision::RedirectToLogin), Some("/login"));
        assert_eq!(policy.destination(Decision::RedirectToHome), Some("/dashboard"));
        assert_eq!(policy.destination(Decision::Allow), None);
    }

    #[test]
    fn decisions_are_deterministic() {
        let policy = RoutePolicy::default();
        let session = authed();
        let first = decide(&session, "/login", &policy);
        for _ in 0..10 {
            assert_eq!(decide(&session, "/login", &policy), first);
        }
    }
}
