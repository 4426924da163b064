use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use cinepick_protocol::{ErrorCode, ErrorPayload, InboundEvent};
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::auth::{HttpTokenRefresher, TokenRefresher};
use crate::config::ClientConfig;
use crate::connection::WsConnector;
use crate::credentials::{CredentialStore, MemoryCredentialStore};
use crate::handler::{AuthFailureHandler, LogAuthFailure};
use crate::receiver;
use crate::registry::{EventRegistry, Listener, Subscription};
use crate::state::{ConnectionState, ReconnectPolicy};
use crate::transport::{ConnectOptions, Connector, OutboundPacket};

/// Realtime client owning at most one transport.
///
/// Cloning is cheap and every clone drives the same connection, so one
/// instance can be created at the application root and handed to every
/// consumer. Nothing here is global.
#[derive(Clone)]
pub struct RealtimeClient {
    pub(crate) inner: Arc<Inner>,
}

pub(crate) struct Inner {
    pub(crate) config: ClientConfig,
    pub(crate) connector: Arc<dyn Connector>,
    pub(crate) credentials: Arc<dyn CredentialStore>,
    pub(crate) refresher: Option<Arc<dyn TokenRefresher>>,
    pub(crate) auth_handler: Arc<dyn AuthFailureHandler>,
    pub(crate) registry: EventRegistry,
    session: Mutex<Session>,
    state_tx: watch::Sender<ConnectionState>,
}

/// Per-connection mutable state, guarded by one lock
pub(crate) struct Session {
    pub(crate) policy: ReconnectPolicy,
    link: Option<ActiveLink>,
    generation: u64,
    pub(crate) current_room_id: Option<String>,
    pub(crate) muted_until: Option<Instant>,
}

struct ActiveLink {
    generation: u64,
    outbound: mpsc::UnboundedSender<OutboundPacket>,
    pump: JoinHandle<()>,
}

impl Session {
    pub(crate) fn is_current(&self, generation: u64) -> bool {
        self.link
            .as_ref()
            .is_some_and(|link| link.generation == generation)
    }

    pub(crate) fn outbound(&self) -> Option<&mpsc::UnboundedSender<OutboundPacket>> {
        match &self.link {
            Some(link) if self.policy.state().is_connected() => Some(&link.outbound),
            _ => None,
        }
    }

    /// Forget the transport. Its inbound pump is stopped before the outbound
    /// side is dropped, so nothing from the dying transport is delivered.
    fn discard_link(&mut self) -> bool {
        match self.link.take() {
            Some(link) => {
                link.pump.abort();
                let _ = link.outbound.send(OutboundPacket::Close);
                true
            }
            None => false,
        }
    }

    /// Drop the transport from inside its own pump
    pub(crate) fn release_link(&mut self, generation: u64) {
        if self.is_current(generation) {
            self.link = None;
        }
    }
}

impl RealtimeClient {
    pub fn builder(config: ClientConfig) -> RealtimeClientBuilder {
        RealtimeClientBuilder::new(config)
    }

    /// Open a transport unless one is open or opening, or auth is locked.
    ///
    /// Returns whether a new transport was created. The handshake outcome
    /// arrives later as a `connect` or `connect_error` event.
    ///
    /// Needs a tokio runtime. Called outside one it creates nothing and
    /// publishes a `CONNECTION_ERROR` error instead.
    pub fn connect(&self) -> bool {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                tracing::error!(error = %e, "connect() called outside a tokio runtime");
                self.emit_error(&ErrorPayload::new(
                    ErrorCode::ConnectionError,
                    "No async runtime to run the realtime connection",
                ));
                return false;
            }
        };

        let url = self.inner.config.endpoint.resolve();
        let auth_token = self.inner.credentials.access_token();

        let mut session = self.session();
        if !session.policy.begin_connect() {
            tracing::debug!(state = %session.policy.state(), "connect() ignored");
            return false;
        }

        session.generation += 1;
        let generation = session.generation;

        let options = ConnectOptions {
            url,
            namespace: self.inner.config.namespace.clone(),
            path: self.inner.config.socket_path.clone(),
            auth_token,
            websocket_only: true,
            reconnection: false,
            with_credentials: self.inner.config.with_credentials,
        };
        tracing::debug!(
            url = %options.url,
            has_token = options.auth_token.is_some(),
            generation,
            "Opening realtime transport"
        );

        let link = self.inner.connector.open(options);
        let pump = runtime.spawn(receiver::pump(self.clone(), generation, link.inbound));
        session.link = Some(ActiveLink {
            generation,
            outbound: link.outbound,
            pump,
        });
        self.publish_state(&session);
        true
    }

    /// Tear down the transport and clear per-connection state. Safe to repeat.
    pub fn disconnect(&self) {
        let was_connected = {
            let mut session = self.session();
            let was_connected = session.policy.state().is_connected();
            let had_link = session.discard_link();
            session.policy.reset();
            session.current_room_id = None;
            self.publish_state(&session);
            had_link && was_connected
        };

        if was_connected {
            tracing::info!("Realtime connection closed by client");
            self.emit(
                InboundEvent::Disconnect.as_str(),
                &Value::String("io client disconnect".to_string()),
            );
        }
    }

    /// Disconnect and drop every listener
    pub fn dispose(&self) {
        self.disconnect();
        self.inner.registry.clear();
    }

    /// Wait out the backoff for the current attempt count, then `connect()`.
    ///
    /// Reconnection is always caller-driven. Returns false when locked or
    /// when a transport already exists.
    pub async fn reconnect(&self) -> bool {
        let attempts = {
            let session = self.session();
            if !session.policy.can_connect() {
                return false;
            }
            session.policy.reconnect_attempts()
        };

        let delay = self.inner.config.backoff.delay_for_attempt(attempts.saturating_sub(1));
        tracing::info!(attempt = attempts + 1, delay_ms = delay.as_millis() as u64, "Reconnecting");
        tokio::time::sleep(delay).await;
        self.connect()
    }

    pub fn is_connected(&self) -> bool {
        self.session().outbound().is_some()
    }

    pub fn state(&self) -> ConnectionState {
        self.session().policy.state()
    }

    /// Watch connection state changes
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    pub fn current_room_id(&self) -> Option<String> {
        self.session().current_room_id.clone()
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.session().policy.reconnect_attempts()
    }

    pub fn auth_error_count(&self) -> u32 {
        self.session().policy.auth_error_count()
    }

    pub fn is_auth_locked(&self) -> bool {
        self.session().policy.is_auth_locked()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &EventRegistry {
        &self.inner.registry
    }

    /// Listen for an event by wire name
    pub fn on<F>(&self, event: &str, f: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.inner.registry.on(event, Arc::new(f))
    }

    pub fn off(&self, event: &str, listener: Option<&Listener>) {
        self.inner.registry.off(event, listener);
    }

    pub(crate) fn session(&self) -> MutexGuard<'_, Session> {
        self.inner.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn publish_state(&self, session: &Session) {
        self.inner.state_tx.send_replace(session.policy.state());
    }

    /// Fan out to listeners. Never call with the session lock held.
    pub(crate) fn emit(&self, event: &str, payload: &Value) {
        self.inner.registry.emit(event, payload);
    }

    pub(crate) fn emit_error(&self, payload: &ErrorPayload) {
        self.emit(InboundEvent::Error.as_str(), &payload.to_value());
    }

    /// Carry out an auth lock the policy already entered: drop the
    /// transport, clear credentials, then either try one refresh or hand
    /// over to the auth-failure handler.
    pub(crate) fn enforce_auth_lock(&self, reason: &str, first_failure: bool) {
        {
            let mut session = self.session();
            session.discard_link();
            session.current_room_id = None;
            self.publish_state(&session);
        }

        tracing::error!(reason, first_failure, "Realtime authentication failed; reconnects stopped");

        let refresh_token = self.inner.credentials.refresh_token();
        self.inner.credentials.clear();

        let auto_refresh = first_failure
            && self.inner.config.refresh_on_auth_failure
            && self.inner.refresher.is_some();

        if auto_refresh {
            let client = self.clone();
            tokio::spawn(async move {
                if let Err(e) = client.refresh_with(refresh_token).await {
                    tracing::warn!(error = %e, "Token refresh after auth failure did not succeed");
                }
            });
        } else {
            self.inner.auth_handler.on_auth_failure(reason);
        }
    }
}

/// Assembles a [`RealtimeClient`] from its collaborators
pub struct RealtimeClientBuilder {
    config: ClientConfig,
    connector: Option<Arc<dyn Connector>>,
    credentials: Option<Arc<dyn CredentialStore>>,
    refresher: Option<Arc<dyn TokenRefresher>>,
    auth_handler: Option<Arc<dyn AuthFailureHandler>>,
}

impl RealtimeClientBuilder {
    fn new(config: ClientConfig) -> Self {
        Self {
            config,
            connector: None,
            credentials: None,
            refresher: None,
            auth_handler: None,
        }
    }

    /// Transport factory. Defaults to [`WsConnector`].
    pub fn connector(mut self, connector: impl Connector + 'static) -> Self {
        self.connector = Some(Arc::new(connector));
        self
    }

    /// Shared credential store. Defaults to an empty [`MemoryCredentialStore`].
    pub fn credentials(mut self, credentials: Arc<dyn CredentialStore>) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Token refresher. Defaults to [`HttpTokenRefresher`] when
    /// `config.refresh_url` is set, otherwise none.
    pub fn refresher(mut self, refresher: impl TokenRefresher + 'static) -> Self {
        self.refresher = Some(Arc::new(refresher));
        self
    }

    pub fn on_auth_failure(mut self, handler: impl AuthFailureHandler + 'static) -> Self {
        self.auth_handler = Some(Arc::new(handler));
        self
    }

    pub fn build(self) -> RealtimeClient {
        let refresher = self.refresher.or_else(|| {
            self.config
                .refresh_url
                .as_ref()
                .map(|url| Arc::new(HttpTokenRefresher::new(url.clone())) as Arc<dyn TokenRefresher>)
        });

        let policy = ReconnectPolicy::new(
            self.config.max_reconnect_attempts,
            self.config.max_auth_errors,
        );
        let (state_tx, _) = watch::channel(policy.state());

        RealtimeClient {
            inner: Arc::new(Inner {
                connector: self
                    .connector
                    .unwrap_or_else(|| Arc::new(WsConnector::default())),
                credentials: self
                    .credentials
                    .unwrap_or_else(|| Arc::new(MemoryCredentialStore::new())),
                refresher,
                auth_handler: self.auth_handler.unwrap_or_else(|| Arc::new(LogAuthFailure)),
                registry: EventRegistry::new(),
                session: Mutex::new(Session {
                    policy,
                    link: None,
                    generation: 0,
                    current_room_id: None,
                    muted_until: None,
                }),
                state_tx,
                config: self.config,
            }),
        }
    }
}
