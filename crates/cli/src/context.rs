use std::sync::Arc;

use {
    anyhow::{Context, Result},
    tidings_auth::{SessionManager, TokenStore},
    tidings_chat::MessageStore,
    tidings_common::ClientError,
    tidings_config::TidingsConfig,
    tidings_gateway::{ApiGateway, HttpGateway},
    tidings_routing::{HistoryNavigator, RoutePolicy},
    tracing::debug,
};

/// Everything a command needs, wired in dependency order.
pub struct AppContext {
    pub config: TidingsConfig,
    pub gateway: Arc<dyn ApiGateway>,
    pub session: SessionManager,
    pub messages: Arc<MessageStore>,
}

impl AppContext {
    /// Load config, build the gateway and token store, rehydrate any
    /// persisted session, then create the message store.
    pub async fn start() -> Result<Self> {
        let config = tidings_config::discover_and_load();

        let gateway: Arc<dyn ApiGateway> = Arc::new(
            HttpGateway::from_config(&config.api).context("failed to build HTTP client")?,
        );
        let tokens = match &config.storage.token_file {
            Some(path) => TokenStore::with_path(path.clone()),
            None => TokenStore::new(),
        };
        debug!(path = %tokens.path().display(), "token store");

        let session = SessionManager::new(
            Arc::clone(&gateway),
            tokens,
            config.api.base_url.clone(),
            Arc::new(HistoryNavigator::new()),
            RoutePolicy::from_config(&config.routes),
        );
        let state = session.rehydrate().await;
        debug!(?state, "session ready");

        let messages = MessageStore::new(Arc::clone(&gateway), session.subscribe());
        messages.start();

        Ok(Self {
            config,
            gateway,
            session,
            messages,
        })
    }

    /// Convert a client error for display, logging out first if the backend
    /// rejected the token.
    pub fn surface<T>(&self, result: Result<T, ClientError>) -> Result<T> {
        result.map_err(|e| {
            if e.is_unauthorized() {
                self.session.logout();
            }
            anyhow::Error::new(e)
        })
    }

    pub fn shutdown(self) {
        self.messages.shutdown();
        debug!("context shut down");
    }
}
