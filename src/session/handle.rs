//! Consumer API: [`Session`] builder and the cloneable [`SessionHandle`]

use super::actor::{ActorParts, Command, SessionActor, StateCallback};
use super::buffer::{InboundMessage, MessageLog, MessageReader};
use super::registry::{SubscriptionId, SubscriptionRegistry};
use super::state::SessionState;
use crate::config::SessionConfig;
use crate::credentials::CredentialProvider;
use crate::error::{SessionError, SessionResult};
use crate::observability::{MetricsSnapshot, SessionMetrics};
use crate::session_span;
use crate::transport::{connector_for_endpoint, Connector};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::Instrument;
use uuid::Uuid;

/// Options for a single publish
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishOptions {
    /// Ask the broker for a RECEIPT and resolve only once it arrives
    pub want_receipt: bool,
    /// Receipt deadline; the configured default when `None`
    pub timeout: Option<Duration>,
}

impl PublishOptions {
    /// Fire-and-forget
    pub fn fire_and_forget() -> Self {
        Self::default()
    }

    pub fn with_receipt() -> Self {
        Self {
            want_receipt: true,
            timeout: None,
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Entry point for opening sessions
pub struct Session;

impl Session {
    pub fn builder(config: SessionConfig) -> SessionBuilder {
        SessionBuilder {
            config,
            connector: None,
            credentials: None,
            on_state_change: None,
        }
    }

    /// Open a session with the connector and credential source named by
    /// `config`
    pub fn open(config: SessionConfig) -> SessionResult<SessionHandle> {
        Self::builder(config).open()
    }
}

pub struct SessionBuilder {
    config: SessionConfig,
    connector: Option<Arc<dyn Connector>>,
    credentials: Option<Arc<dyn CredentialProvider>>,
    on_state_change: Option<StateCallback>,
}

impl SessionBuilder {
    /// Transport to use instead of the one picked from the endpoint scheme
    pub fn connector(mut self, connector: impl Connector + 'static) -> Self {
        self.connector = Some(Arc::new(connector));
        self
    }

    /// Credential source polled before every connect attempt
    pub fn credentials(mut self, provider: impl CredentialProvider + 'static) -> Self {
        self.credentials = Some(Arc::new(provider));
        self
    }

    /// Callback run on the session task for every state transition.
    /// It must not block.
    pub fn on_state_change(
        mut self,
        callback: impl Fn(&SessionState) + Send + Sync + 'static,
    ) -> Self {
        self.on_state_change = Some(Arc::new(callback));
        self
    }

    /// Validate the configuration, spawn the session task and start
    /// connecting. Must be called within a tokio runtime.
    pub fn open(self) -> SessionResult<SessionHandle> {
        self.config
            .validate()
            .map_err(|e| SessionError::Config(e.to_string()))?;
        let connector = match self.connector {
            Some(connector) => connector,
            None => connector_for_endpoint(&self.config.broker.url)?,
        };
        let credentials = self
            .credentials
            .or_else(|| self.config.credential_provider());

        // initial topics are registered before the first CONNECT so they are
        // part of the first replay
        let mut registry = SubscriptionRegistry::new();
        for topic in &self.config.session.topics {
            crate::protocol::validate_destination(topic)
                .map_err(|e| SessionError::InvalidDestination(e.to_string()))?;
            registry.add(topic, Arc::new(|_: &InboundMessage| {}));
        }

        let session_id = Uuid::new_v4();
        let (state_tx, state_rx) = watch::channel(SessionState::Idle);
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let metrics = Arc::new(SessionMetrics::new());
        let log = MessageLog::new(self.config.session.log_capacity);
        let span = session_span!(session_id = %session_id, endpoint = %self.config.broker.url);
        let default_receipt_timeout = self.config.session.receipt_timeout();

        let actor = SessionActor::new(ActorParts {
            config: self.config,
            connector,
            credentials,
            on_state_change: self.on_state_change,
            metrics: metrics.clone(),
            state_tx,
            commands: commands_rx,
            registry,
            log: log.clone(),
        });
        tokio::spawn(actor.run().instrument(span));

        Ok(SessionHandle {
            session_id,
            commands: commands_tx,
            state: state_rx,
            log,
            metrics,
            default_receipt_timeout,
        })
    }
}

/// Cloneable handle to a running session.
///
/// The session shuts down with a graceful DISCONNECT when the last handle is
/// dropped.
#[derive(Clone)]
pub struct SessionHandle {
    session_id: Uuid,
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<SessionState>,
    log: MessageLog,
    metrics: Arc<SessionMetrics>,
    default_receipt_timeout: Duration,
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("session_id", &self.session_id)
            .field("state", &*self.state.borrow())
            .finish()
    }
}

impl SessionHandle {
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Watch every state transition
    pub fn state_changes(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    /// Wait until the session is `Ready`. Fails with the terminal error if
    /// the session fails or closes first. Stays pending through `Degraded`.
    pub async fn ready(&self) -> SessionResult<()> {
        let mut state = self.state.clone();
        loop {
            let current = state.borrow_and_update().clone();
            match current {
                SessionState::Ready => return Ok(()),
                SessionState::Failed(error) => return Err(error),
                SessionState::Closing | SessionState::Closed => {
                    return Err(SessionError::SessionClosed)
                }
                _ => {}
            }
            if state.changed().await.is_err() {
                return match &*state.borrow() {
                    SessionState::Ready => Ok(()),
                    SessionState::Failed(error) => Err(error.clone()),
                    _ => Err(SessionError::SessionClosed),
                };
            }
        }
    }

    /// Register a handler for `topic`. Accepted in any live state; the
    /// broker sees the SUBSCRIBE immediately when `Ready`, otherwise on the
    /// next successful connect.
    pub async fn subscribe<F>(&self, topic: &str, handler: F) -> SessionResult<SubscriptionId>
    where
        F: Fn(&InboundMessage) + Send + Sync + 'static,
    {
        let (reply, response) = oneshot::channel();
        self.send(Command::Subscribe {
            topic: topic.to_string(),
            handler: Arc::new(handler),
            reply,
        })?;
        response.await.map_err(|_| SessionError::SessionClosed)?
    }

    /// Remove a subscription. Returns whether it existed.
    pub async fn unsubscribe(&self, id: &SubscriptionId) -> SessionResult<bool> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Unsubscribe {
            id: id.clone(),
            reply,
        })?;
        response.await.map_err(|_| SessionError::SessionClosed)?
    }

    /// Publish `payload` to `destination`.
    ///
    /// Fails fast with `NotConnected` outside `Ready`; nothing is queued.
    /// Without a receipt this resolves once the frame is handed to the
    /// writer. With one it resolves on RECEIPT, ERROR, deadline or
    /// connection loss, exactly once.
    pub async fn publish(
        &self,
        destination: &str,
        payload: impl Into<Bytes>,
        options: PublishOptions,
    ) -> SessionResult<()> {
        {
            let state = self.state.borrow();
            if !state.can_publish() {
                return Err(SessionError::NotConnected {
                    state: state.name().to_string(),
                });
            }
        }

        let receipt_timeout = options
            .want_receipt
            .then(|| options.timeout.unwrap_or(self.default_receipt_timeout));
        let (reply, response) = oneshot::channel();
        self.send(Command::Publish {
            destination: destination.to_string(),
            payload: payload.into(),
            receipt_timeout,
            reply,
        })?;
        response.await.map_err(|_| SessionError::SessionClosed)?
    }

    /// Close the session. Idempotent: once closed (or failed) this returns
    /// immediately.
    pub async fn close(&self) {
        if self.state.borrow().is_terminal() {
            return;
        }
        let (reply, done) = oneshot::channel();
        if self.commands.send(Command::Close { reply }).is_err() {
            return;
        }
        let _ = done.await;
    }

    /// Read messages delivered from now on, in arrival order
    pub fn messages(&self) -> MessageReader {
        self.log.reader()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    fn send(&self, command: Command) -> SessionResult<()> {
        self.commands.send(command).map_err(|_| {
            let state = self.state.borrow();
            match &*state {
                SessionState::Failed(error) => error.clone(),
                _ => SessionError::SessionClosed,
            }
        })
    }
}
