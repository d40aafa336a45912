use std::sync::{
    Arc, Mutex, MutexGuard, PoisonError,
    atomic::{AtomicU64, Ordering},
};

use {
    async_trait::async_trait,
    chrono::Utc,
    secrecy::SecretString,
    tidings_channels::{EventSink, RealtimeEvent, Subscription, pump},
    tidings_common::{AuthFailure, ClientError, LocalId, Message, Session},
    tidings_gateway::ApiGateway,
    tokio::{
        sync::{RwLock, watch},
        task::JoinHandle,
    },
    tracing::{debug, info, warn},
};

use crate::state::{ChatState, Reconciled};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Owns the chat message list for the lifetime of a session.
///
/// Every mutation takes the write lock for a synchronous step only; network
/// calls run with the lock released, so sends, fetches and realtime events
/// interleave at await points. Reconciliation is keyed on the local id of a
/// send and on server ids, never on message content.
pub struct MessageStore {
    gateway: Arc<dyn ApiGateway>,
    session: watch::Receiver<Session>,
    state: RwLock<ChatState>,
    next_local: AtomicU64,
    typing: watch::Sender<Option<bool>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl MessageStore {
    pub fn new(gateway: Arc<dyn ApiGateway>, session: watch::Receiver<Session>) -> Arc<Self> {
        let (typing, _) = watch::channel(None);
        Arc::new(Self {
            gateway,
            session,
            state: RwLock::new(ChatState::default()),
            next_local: AtomicU64::new(0),
            typing,
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Start the typing-indicator worker. Until this is called, typing
    /// updates are recorded but never sent.
    pub fn start(&self) {
        let mut updates = self.typing.subscribe();
        let gateway = Arc::clone(&self.gateway);
        let session = self.session.clone();

        let worker = tokio::spawn(async move {
            while updates.changed().await.is_ok() {
                // Only the newest value is observed; intermediate ones are
                // coalesced away.
                let latest = *updates.borrow_and_update();
                let Some(typing) = latest else {
                    continue;
                };
                let token = session.borrow().token.clone();
                let Some(token) = token else {
                    debug!("typing update without a session, skipped");
                    continue;
                };
                if let Err(e) = gateway.send_typing(&token, typing).await {
                    warn!(error = %e, typing, "typing indicator failed");
                }
            }
        });
        lock(&self.tasks).push(worker);
    }

    /// Feed realtime events from `subscription` into this store until the
    /// subscription closes or the store shuts down.
    pub fn attach(self: &Arc<Self>, subscription: Subscription) {
        let topic = subscription.topic().to_string();
        let sink: Arc<dyn EventSink> = Arc::clone(self) as Arc<dyn EventSink>;
        let handle = tokio::spawn(async move {
            let delivered = pump(subscription, sink).await;
            debug!(topic = %topic, delivered, "realtime feed ended");
        });
        lock(&self.tasks).push(handle);
    }

    /// Stop background work. In-flight sends are not cancelled.
    ///
    /// An attached feed holds the store alive, so owners call this
    /// explicitly when the session ends.
    pub fn shutdown(&self) {
        for task in lock(&self.tasks).drain(..) {
            task.abort();
        }
    }

    pub async fn snapshot(&self) -> Vec<Message> {
        self.state.read().await.messages().to_vec()
    }

    pub async fn typing_users(&self) -> Vec<String> {
        self.state
            .read()
            .await
            .typing()
            .map(str::to_string)
            .collect()
    }

    pub async fn pending(&self) -> usize {
        self.state.read().await.pending()
    }

    fn bearer(&self) -> Result<SecretString, ClientError> {
        self.session
            .borrow()
            .token
            .clone()
            .ok_or_else(|| AuthFailure::NotAuthenticated.into())
    }

    /// Send a message optimistically.
    ///
    /// The provisional entry is visible before the request is issued. On
    /// success it is replaced in place by the server's copy (or dropped if
    /// the realtime echo already delivered that id); on failure it is
    /// removed and [`ClientError::SendFailed`] is returned.
    pub async fn send_message(&self, body: &str) -> Result<Message, ClientError> {
        let body = body.trim();
        if body.is_empty() {
            return Err(ClientError::validation("message body is empty"));
        }

        let (token, author_id, author_name) = {
            let session = self.session.borrow();
            let token = session
                .token
                .clone()
                .ok_or(AuthFailure::NotAuthenticated)?;
            let author_id = session
                .user_id
                .clone()
                .ok_or(AuthFailure::NotAuthenticated)?;
            (token, author_id, session.display_name.clone())
        };

        let local = LocalId(self.next_local.fetch_add(1, Ordering::SeqCst) + 1);
        self.state
            .write()
            .await
            .push_provisional(Message::provisional(local, author_id, author_name, body));
        debug!(%local, "provisional message inserted");

        let result = self.gateway.create_message(&token, body).await;

        let mut state = self.state.write().await;
        match result {
            Ok(confirmed) => {
                let outcome = state.confirm(local, confirmed.clone());
                debug!(%local, id = %confirmed.id, ?outcome, "send reconciled");
                if outcome == Reconciled::Appended {
                    warn!(%local, "provisional entry vanished before reconciliation");
                }
                Ok(confirmed)
            },
            Err(e) => {
                state.rollback(local);
                warn!(%local, error = %e, "send failed, provisional entry removed");
                Err(ClientError::SendFailed {
                    local_id: local,
                    cause: Box::new(e.into()),
                })
            },
        }
    }

    /// Replace the list with the server's copy, keeping unreconciled sends.
    /// On failure the list is left untouched.
    pub async fn fetch_messages(&self) -> Result<usize, ClientError> {
        let token = self.bearer()?;
        let fetched = self.gateway.list_messages(&token).await?;

        let mut state = self.state.write().await;
        state.replace_with(fetched);
        let count = state.messages().len();
        info!(count, pending = state.pending(), "messages refreshed");
        Ok(count)
    }

    /// Mark every unseen message as seen once the backend acknowledges.
    ///
    /// Failures are logged and leave the list untouched. Returns how many
    /// messages changed.
    pub async fn mark_as_seen(&self) -> usize {
        if !self.state.read().await.has_unseen() {
            return 0;
        }
        let token = match self.bearer() {
            Ok(token) => token,
            Err(e) => {
                debug!(error = %e, "mark as seen skipped");
                return 0;
            },
        };

        if let Err(e) = self.gateway.mark_seen(&token).await {
            warn!(error = %e, "mark as seen failed");
            return 0;
        }
        let changed = self.state.write().await.mark_all_seen(Utc::now());
        debug!(changed, "messages marked as seen");
        changed
    }

    /// Publish the local typing state. Never blocks, never fails; the
    /// worker started by [`MessageStore::start`] sends only the latest value.
    pub fn send_typing(&self, typing: bool) {
        self.typing.send_replace(Some(typing));
    }

    /// Merge a realtime event. Returns true when the store changed; a
    /// duplicate message, an own typing event or a seen event with nothing
    /// unseen returns false.
    pub async fn apply_event(&self, event: RealtimeEvent) -> bool {
        match event {
            RealtimeEvent::Created(message) => {
                let id = message.id.to_string();
                let merged = self.state.write().await.merge(message);
                if merged {
                    debug!(id = %id, "realtime message merged");
                } else {
                    debug!(id = %id, "realtime message already present");
                }
                merged
            },
            RealtimeEvent::Typing(typing, user_id) => {
                let own = self.session.borrow().user_id.as_deref() == Some(user_id.as_str());
                if own {
                    return false;
                }
                self.state.write().await.set_typing(&user_id, typing)
            },
            RealtimeEvent::Seen(at) => {
                let changed = self.state.write().await.mark_all_seen(at);
                debug!(changed, "peer marked messages as seen");
                changed > 0
            },
        }
    }
}

#[async_trait]
impl EventSink for MessageStore {
    async fn on_event(&self, event: RealtimeEvent) {
        self.apply_event(event).await;
    }
}
