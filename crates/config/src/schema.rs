//! Config schema types (api, realtime, routes, storage).

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TidingsConfig {
    pub api: ApiConfig,
    pub realtime: RealtimeConfig,
    pub routes: RoutesConfig,
    pub storage: StorageConfig,
}

/// REST backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL every endpoint path is appended to.
    pub base_url: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000/api".into(),
            timeout_secs: 30,
        }
    }
}

/// Broadcaster (Pusher protocol) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    pub ws_url: String,
    pub app_key: String,
    /// Endpoint that signs private channel subscriptions.
    pub auth_endpoint: String,
    /// Topic name; `{user_id}` is replaced with the session user's id.
    pub topic: String,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            ws_url: "ws://127.0.0.1:8080".into(),
            app_key: "local".into(),
            auth_endpoint: "http://127.0.0.1:8000/broadcasting/auth".into(),
            topic: "private-chat.{user_id}".into(),
        }
    }
}

impl RealtimeConfig {
    pub fn topic_for(&self, user_id: &str) -> String {
        self.topic.replace("{user_id}", user_id)
    }
}

/// Navigation policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutesConfig {
    /// Paths reachable without a session.
    pub public_paths: Vec<String>,
    /// Public paths an authenticated user is bounced away from.
    pub guest_paths: Vec<String>,
    pub login_path: String,
    pub home_path: String,
}

impl Default for RoutesConfig {
    fn default() -> Self {
        Self {
            public_paths: vec![
                "/login".into(),
                "/register".into(),
                "/".into(),
                "/forgot-password".into(),
                "/reset-password".into(),
            ],
            guest_paths: vec!["/login".into(), "/register".into()],
            login_path: "/login".into(),
            home_path: "/dashboard".into(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Override for the persisted session token file.
    pub token_file: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg: TidingsConfig = toml::from_str(
            r#"
            [api]
            base_url = "https://hr.example.com/api"

            [routes]
            home_path = "/home"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.api.base_url, "https://hr.example.com/api");
        assert_eq!(cfg.api.timeout_secs, 30);
        assert_eq!(cfg.routes.home_path, "/home");
        assert_eq!(cfg.routes.login_path, "/login");
        assert_eq!(cfg.realtime.app_key, "local");
    }

    #[test]
    fn topic_placeholder() {
        let rt = RealtimeConfig::default();
        assert_eq!(rt.topic_for("17"), "private-chat.17");
    }
}
