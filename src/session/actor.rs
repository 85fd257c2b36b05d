//! The session's owner task
//!
//! One task owns the state machine, the subscription registry, the receipt
//! correlator and the inbound buffer. Handles talk to it through a command
//! channel; per-connection connect/reader/writer tasks report back through an
//! event channel tagged with the connection epoch, so events from a torn-down
//! connection are ignored.

use super::buffer::{InboundBuffer, MessageLog};
use super::deadline_after;
use super::heartbeat::HeartbeatMonitor;
use super::receipts::{PublishResponder, ReceiptCorrelator};
use super::reconnect::{ReconnectPolicy, ReconnectionDecision};
use super::registry::{Handler, SubscriptionId, SubscriptionRegistry};
use super::state::{log_state_transition, SessionState};
use crate::config::SessionConfig;
use crate::connection_span;
use crate::credentials::{validate_credential, CredentialProvider};
use crate::error::{sanitize_error_message, SessionError, SessionResult};
use crate::observability::SessionMetrics;
use crate::protocol::{
    headers, validate_destination, Command as FrameCommand, Frame, FrameCodec, FrameDecoder,
};
use crate::transport::{Connection, Connector, TransportError, TransportSink, TransportStream};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn, Instrument};

/// Callback invoked by the owner task on every state transition
pub type StateCallback = Arc<dyn Fn(&SessionState) + Send + Sync>;

/// Requests from handles
pub(crate) enum Command {
    Subscribe {
        topic: String,
        handler: Handler,
        reply: oneshot::Sender<SessionResult<SubscriptionId>>,
    },
    Unsubscribe {
        id: SubscriptionId,
        reply: oneshot::Sender<SessionResult<bool>>,
    },
    Publish {
        destination: String,
        payload: Bytes,
        receipt_timeout: Option<Duration>,
        reply: PublishResponder,
    },
    Close {
        reply: oneshot::Sender<()>,
    },
}

enum ConnectionEvent {
    Credential(Option<String>),
    Opened(Connection),
    OpenFailed(TransportError),
    Frame(Frame),
    Failed(SessionError),
    Closed,
}

struct TaggedEvent {
    epoch: u64,
    event: ConnectionEvent,
}

enum WriterCommand {
    Send(Bytes),
    Close,
}

struct ActiveLink {
    writer: mpsc::UnboundedSender<WriterCommand>,
    reader_task: JoinHandle<()>,
}

/// What the single phase deadline is currently timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Connect,
    Backoff,
    CredentialPoll,
    Disconnect,
}

pub(crate) struct SessionActor {
    config: SessionConfig,
    connector: Arc<dyn Connector>,
    credentials: Option<Arc<dyn CredentialProvider>>,
    policy: ReconnectPolicy,
    auth_error_patterns: Vec<String>,

    state: SessionState,
    state_tx: watch::Sender<SessionState>,
    on_state_change: Option<StateCallback>,
    metrics: Arc<SessionMetrics>,

    commands: mpsc::UnboundedReceiver<Command>,
    events_tx: mpsc::UnboundedSender<TaggedEvent>,
    events_rx: mpsc::UnboundedReceiver<TaggedEvent>,

    epoch: u64,
    connect_task: Option<JoinHandle<()>>,
    link: Option<ActiveLink>,
    credential: Option<String>,
    credential_sent: bool,
    phase: Option<(Phase, Instant)>,
    heartbeat: Option<HeartbeatMonitor>,
    failed_attempts: u32,

    registry: SubscriptionRegistry,
    receipts: ReceiptCorrelator,
    buffer: InboundBuffer,
    log: MessageLog,

    disconnect_receipt: Option<String>,
    close_waiters: Vec<oneshot::Sender<()>>,
}

pub(crate) struct ActorParts {
    pub config: SessionConfig,
    pub connector: Arc<dyn Connector>,
    pub credentials: Option<Arc<dyn CredentialProvider>>,
    pub on_state_change: Option<StateCallback>,
    pub metrics: Arc<SessionMetrics>,
    pub state_tx: watch::Sender<SessionState>,
    pub commands: mpsc::UnboundedReceiver<Command>,
    pub registry: SubscriptionRegistry,
    pub log: MessageLog,
}

impl SessionActor {
    pub(crate) fn new(parts: ActorParts) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let policy = ReconnectPolicy::from(&parts.config.reconnect);
        let auth_error_patterns = parts
            .config
            .reconnect
            .auth_error_patterns
            .iter()
            .map(|p| p.to_lowercase())
            .collect();
        let buffer = InboundBuffer::new(parts.config.session.dedup_capacity);

        Self {
            config: parts.config,
            connector: parts.connector,
            credentials: parts.credentials,
            policy,
            auth_error_patterns,
            state: SessionState::Idle,
            state_tx: parts.state_tx,
            on_state_change: parts.on_state_change,
            metrics: parts.metrics,
            commands: parts.commands,
            events_tx,
            events_rx,
            epoch: 0,
            connect_task: None,
            link: None,
            credential: None,
            credential_sent: false,
            phase: None,
            heartbeat: None,
            failed_attempts: 0,
            registry: parts.registry,
            receipts: ReceiptCorrelator::new(),
            buffer,
            log: parts.log,
            disconnect_receipt: None,
            close_waiters: Vec::new(),
        }
    }

    pub(crate) async fn run(mut self) {
        let mut sweep = tokio::time::interval(self.config.session.receipt_sweep_interval());
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut handles_alive = true;

        self.begin_connect();

        while !self.state.is_terminal() {
            let phase_deadline = self.phase.map(|(_, deadline)| deadline);
            let send_deadline = self.heartbeat.as_ref().and_then(|hb| hb.next_send_deadline());
            let receive_deadline = self.heartbeat.as_ref().and_then(|hb| hb.receive_deadline());
            let receipts_pending = !self.receipts.is_empty();

            tokio::select! {
                command = self.commands.recv(), if handles_alive => match command {
                    Some(command) => self.handle_command(command),
                    None => {
                        debug!(target: "stomp_session", "All handles dropped, closing session");
                        handles_alive = false;
                        self.begin_close();
                    }
                },
                Some(tagged) = self.events_rx.recv() => {
                    if tagged.epoch == self.epoch {
                        self.handle_event(tagged.event);
                    }
                }
                _ = sleep_until(phase_deadline) => self.on_phase_deadline(),
                _ = sleep_until(send_deadline) => self.send_heartbeat(),
                _ = sleep_until(receive_deadline) => self.check_heartbeat(),
                _ = sweep.tick(), if receipts_pending => {
                    let expired = self.receipts.sweep(Instant::now());
                    if expired > 0 {
                        warn!(target: "stomp_session", expired, "Publish receipts timed out");
                        self.metrics.publishes_failed(expired as u64);
                    }
                }
            }
        }

        for waiter in self.close_waiters.drain(..) {
            let _ = waiter.send(());
        }
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Subscribe {
                topic,
                handler,
                reply,
            } => {
                let _ = reply.send(self.subscribe(&topic, handler));
            }
            Command::Unsubscribe { id, reply } => {
                let _ = reply.send(self.unsubscribe(&id));
            }
            Command::Publish {
                destination,
                payload,
                receipt_timeout,
                reply,
            } => self.publish(destination, payload, receipt_timeout, reply),
            Command::Close { reply } => {
                self.close_waiters.push(reply);
                self.begin_close();
            }
        }
    }

    fn subscribe(&mut self, topic: &str, handler: Handler) -> SessionResult<SubscriptionId> {
        if !self.state.can_subscribe() {
            return Err(SessionError::SessionClosed);
        }
        validate_destination(topic).map_err(|e| SessionError::InvalidDestination(e.to_string()))?;

        let id = self.registry.add(topic, handler);
        info!(target: "stomp_session", subscription = %id, topic, "Subscribed");
        if self.state == SessionState::Ready {
            let _ = self.write(&Frame::subscribe(id.as_str(), topic));
        }
        Ok(id)
    }

    fn unsubscribe(&mut self, id: &SubscriptionId) -> SessionResult<bool> {
        if !self.state.can_subscribe() {
            return Err(SessionError::SessionClosed);
        }
        let Some(removed) = self.registry.remove(id) else {
            return Ok(false);
        };
        info!(target: "stomp_session", subscription = %id, topic = %removed.topic, "Unsubscribed");
        if self.state == SessionState::Ready {
            let _ = self.write(&Frame::unsubscribe(id.as_str()));
        }
        Ok(true)
    }

    fn publish(
        &mut self,
        destination: String,
        payload: Bytes,
        receipt_timeout: Option<Duration>,
        reply: PublishResponder,
    ) {
        if !self.state.can_publish() {
            let _ = reply.send(Err(SessionError::NotConnected {
                state: self.state.name().to_string(),
            }));
            return;
        }
        if let Err(e) = validate_destination(&destination) {
            let _ = reply.send(Err(SessionError::InvalidDestination(e.to_string())));
            return;
        }

        match receipt_timeout {
            Some(timeout) => {
                let receipt_id = self.receipts.register(timeout, Instant::now(), reply);
                debug!(target: "stomp_session", %destination, %receipt_id, "Publishing with receipt");
                // a failed write is followed by a connection event that
                // resolves the pending receipt as connection-lost
                let _ = self.write(&Frame::send(&destination, payload, Some(&receipt_id)));
                self.metrics.publish_sent();
            }
            None => {
                let result = self.write(&Frame::send(&destination, payload, None));
                if result.is_ok() {
                    self.metrics.publish_sent();
                } else {
                    self.metrics.publishes_failed(1);
                }
                let _ = reply.send(result);
            }
        }
    }

    fn handle_event(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Credential(credential) => self.on_credential(credential),
            ConnectionEvent::Opened(connection) => self.on_opened(connection),
            ConnectionEvent::OpenFailed(error) => {
                self.connect_task = None;
                self.on_connection_failure(SessionError::Transport(error));
            }
            ConnectionEvent::Frame(frame) => self.on_frame(frame),
            ConnectionEvent::Failed(error) => self.on_connection_failure(error),
            ConnectionEvent::Closed => {
                self.on_connection_failure(SessionError::Transport(TransportError::Closed))
            }
        }
    }

    /// Start a connect attempt. With a credential provider the credential
    /// is fetched on its own epoch-tagged task first; the connect deadline
    /// covers that fetch too.
    fn begin_connect(&mut self) {
        let Some(provider) = self.credentials.clone() else {
            self.open_transport(None);
            return;
        };

        self.epoch += 1;
        let epoch = self.epoch;
        self.set_phase(Phase::Connect, self.config.session.connect_timeout());
        let events = self.events_tx.clone();
        self.connect_task = Some(tokio::spawn(
            async move {
                let credential = provider.current().await;
                let _ = events.send(TaggedEvent {
                    epoch,
                    event: ConnectionEvent::Credential(credential),
                });
            }
            .instrument(connection_span!(epoch)),
        ));
    }

    fn on_credential(&mut self, credential: Option<String>) {
        self.connect_task = None;
        self.phase = None;
        match credential.map(|c| validate_credential(&c).map(|()| c)) {
            Some(Ok(credential)) => self.open_transport(Some(credential)),
            Some(Err(error)) => {
                warn!(target: "stomp_session", %error, "Credential not usable, holding");
                self.hold_for_credential(Some(error));
            }
            None => {
                debug!(target: "stomp_session", "No credential available, holding");
                self.hold_for_credential(None);
            }
        }
    }

    /// Stay in `Degraded` and ask the provider again after the poll interval
    fn hold_for_credential(&mut self, reason: Option<SessionError>) {
        self.transition(SessionState::Degraded {
            attempt: self.failed_attempts,
            reason,
        });
        self.set_phase(
            Phase::CredentialPoll,
            self.config.session.credential_poll_interval(),
        );
    }

    fn open_transport(&mut self, credential: Option<String>) {
        self.credential = credential;

        self.epoch += 1;
        let epoch = self.epoch;
        self.transition(SessionState::Connecting);
        self.metrics.connection_attempt();
        self.set_phase(Phase::Connect, self.config.session.connect_timeout());

        let connector = self.connector.clone();
        let endpoint = self.config.broker.url.clone();
        let events = self.events_tx.clone();
        self.connect_task = Some(tokio::spawn(
            async move {
                let event = match connector.open(&endpoint).await {
                    Ok(connection) => ConnectionEvent::Opened(connection),
                    Err(e) => ConnectionEvent::OpenFailed(e),
                };
                let _ = events.send(TaggedEvent { epoch, event });
            }
            .instrument(connection_span!(epoch)),
        ));
    }

    fn on_opened(&mut self, connection: Connection) {
        self.connect_task = None;
        if self.state != SessionState::Connecting {
            return;
        }

        let Connection { sink, stream } = connection;
        let (writer_tx, writer_rx) = mpsc::unbounded_channel();
        let epoch = self.epoch;
        tokio::spawn(
            run_writer(sink, writer_rx, self.events_tx.clone(), epoch)
                .instrument(connection_span!(epoch)),
        );
        let reader_task = tokio::spawn(
            run_reader(
                stream,
                FrameDecoder::new(self.config.session.max_frame_bytes),
                self.events_tx.clone(),
                epoch,
            )
            .instrument(connection_span!(epoch)),
        );
        self.link = Some(ActiveLink {
            writer: writer_tx,
            reader_task,
        });

        let host = self.config.virtual_host();
        let credential_header = self.credential.take().map(|credential| {
            let value = match &self.config.broker.auth_scheme {
                Some(scheme) if !scheme.is_empty() => format!("{scheme} {credential}"),
                _ => credential,
            };
            (self.config.broker.auth_header.as_str(), value)
        });
        self.credential_sent = credential_header.is_some();
        let connect = Frame::connect(
            &host,
            (self.config.heartbeat.outgoing_ms, self.config.heartbeat.incoming_ms),
            credential_header,
        );
        let _ = self.write(&connect);

        self.transition(SessionState::Authenticating);
        self.set_phase(Phase::Connect, self.config.session.connect_timeout());
    }

    fn on_frame(&mut self, frame: Frame) {
        let now = Instant::now();
        if let Some(heartbeat) = &mut self.heartbeat {
            heartbeat.record_received(now);
        }
        if frame.is_heartbeat() {
            self.metrics.heartbeat_received();
            return;
        }
        self.metrics.frame_received();

        match frame.command() {
            FrameCommand::Connected if self.state == SessionState::Authenticating => {
                self.on_connected(&frame, now)
            }
            FrameCommand::Message if self.state == SessionState::Ready => self.deliver(frame),
            FrameCommand::Receipt => self.on_receipt(&frame),
            FrameCommand::Error => self.on_error(&frame),
            command => {
                debug!(target: "stomp_session", %command, state = self.state.name(), "Ignoring frame");
            }
        }
    }

    fn on_connected(&mut self, frame: &Frame, now: Instant) {
        self.phase = None;
        self.failed_attempts = 0;
        self.heartbeat = Some(HeartbeatMonitor::from_config(
            &self.config.heartbeat,
            frame.get(headers::HEART_BEAT),
            now,
        ));
        if let Some(heartbeat) = &self.heartbeat {
            debug!(
                target: "stomp_session",
                version = frame.get(headers::VERSION).unwrap_or("1.0"),
                outgoing = ?heartbeat.outgoing_interval(),
                incoming_grace = ?heartbeat.incoming_grace(),
                "CONNECTED"
            );
        }

        // every registered subscription is queued before any MESSAGE of this
        // connection is processed
        let replay: Vec<Frame> = self
            .registry
            .iter()
            .map(|sub| Frame::subscribe(sub.id.as_str(), &sub.topic))
            .collect();
        let replayed = replay.len();
        for subscribe in &replay {
            let _ = self.write(subscribe);
        }
        if replayed > 0 {
            debug!(target: "stomp_session", replayed, "Replayed subscriptions");
        }

        self.metrics.connection_established();
        self.transition(SessionState::Ready);
    }

    fn deliver(&mut self, frame: Frame) {
        let Some(message) = self.buffer.accept(frame) else {
            self.metrics.duplicate_dropped();
            debug!(target: "stomp_session", "Dropped duplicate message");
            return;
        };

        for handler in self
            .registry
            .handlers_for(message.subscription.as_deref(), &message.topic)
        {
            handler(&message);
        }
        self.metrics.message_delivered();
        self.log.append(message);
    }

    fn on_receipt(&mut self, frame: &Frame) {
        let Some(receipt_id) = frame.receipt_id() else {
            return;
        };
        if self.disconnect_receipt.as_deref() == Some(receipt_id) {
            debug!(target: "stomp_session", "DISCONNECT acknowledged");
            self.finish_close();
        } else if self.receipts.resolve_receipt(receipt_id) {
            self.metrics.publish_acknowledged();
        } else {
            debug!(target: "stomp_session", receipt_id, "Receipt for unknown id");
        }
    }

    fn on_error(&mut self, frame: &Frame) {
        let message = sanitize_error_message(&frame.error_message());

        if self.state == SessionState::Authenticating {
            // an ERROR answering a CONNECT refuses the connection; when the
            // CONNECT carried a credential that credential is not retried
            if self.credential_sent || self.is_auth_rejection(&message) {
                self.fail(SessionError::auth_rejected(&message));
            } else {
                self.on_connection_failure(SessionError::broker_error(&message));
            }
            return;
        }
        if self.state == SessionState::Closing {
            self.finish_close();
            return;
        }

        if let Some(receipt_id) = frame.receipt_id() {
            if self.receipts.reject(receipt_id, &message) {
                warn!(target: "stomp_session", receipt_id, %message, "Publish rejected");
                self.metrics.publishes_failed(1);
                return;
            }
        }
        // the broker closes the connection after an ERROR
        self.on_connection_failure(SessionError::broker_error(&message));
    }

    fn is_auth_rejection(&self, message: &str) -> bool {
        let message = message.to_lowercase();
        self.auth_error_patterns
            .iter()
            .any(|pattern| message.contains(pattern.as_str()))
    }

    fn send_heartbeat(&mut self) {
        if self.write(&Frame::heartbeat()).is_err() {
            // the writer is gone and its failure event is queued; push the
            // deadline out so it is not retried in a tight loop
            if let Some(heartbeat) = &mut self.heartbeat {
                heartbeat.record_sent(Instant::now());
            }
        }
    }

    fn check_heartbeat(&mut self) {
        let silent_for = self
            .heartbeat
            .as_ref()
            .and_then(|hb| hb.is_expired(Instant::now()));
        if let Some(silent_for) = silent_for {
            warn!(target: "stomp_session", ?silent_for, "Heart-beat timeout");
            self.on_connection_failure(SessionError::HeartbeatTimeout { silent_for });
        }
    }

    fn on_phase_deadline(&mut self) {
        let Some((phase, _)) = self.phase.take() else {
            return;
        };
        match phase {
            Phase::Connect => self.on_connection_failure(SessionError::ConnectTimeout(
                self.config.session.connect_timeout(),
            )),
            Phase::Backoff | Phase::CredentialPoll => self.begin_connect(),
            Phase::Disconnect => {
                debug!(target: "stomp_session", "DISCONNECT receipt not received in time");
                self.finish_close();
            }
        }
    }

    /// Tear down the connection and either schedule a retry or give up
    fn on_connection_failure(&mut self, reason: SessionError) {
        if self.state == SessionState::Closing {
            self.finish_close();
            return;
        }
        if self.state.is_terminal() {
            return;
        }

        if self.state == SessionState::Ready {
            self.metrics.connection_lost();
        } else {
            self.metrics.connection_failed();
        }
        self.teardown_link();

        match self.policy.decide(self.failed_attempts, false) {
            ReconnectionDecision::Proceed { attempt, delay } => {
                self.failed_attempts = attempt;
                let delay = self.policy.with_jitter(delay, &mut rand::thread_rng());
                self.transition(SessionState::Degraded {
                    attempt,
                    reason: Some(reason),
                });
                debug!(target: "stomp_session", attempt, ?delay, "Scheduling reconnect");
                self.set_phase(Phase::Backoff, delay);
            }
            ReconnectionDecision::AbortMaxAttemptsExceeded => {
                self.fail(SessionError::ReconnectExhausted {
                    attempts: self.failed_attempts,
                });
            }
            ReconnectionDecision::AbortShutdownRequested => self.finish_close(),
        }
    }

    fn begin_close(&mut self) {
        if self.state == SessionState::Closing || self.state.is_terminal() {
            return;
        }

        if self.state == SessionState::Ready {
            self.transition(SessionState::Closing);
            let receipt_id = self.receipts.next_id();
            if self.write(&Frame::disconnect(&receipt_id)).is_ok() {
                self.disconnect_receipt = Some(receipt_id);
                self.heartbeat = None;
                self.set_phase(Phase::Disconnect, self.config.session.disconnect_timeout());
            } else {
                self.finish_close();
            }
        } else {
            // nothing was established; cancel whatever is in flight
            self.transition(SessionState::Closing);
            self.finish_close();
        }
    }

    fn finish_close(&mut self) {
        self.teardown_link();
        self.phase = None;
        self.disconnect_receipt = None;
        let lost = self.receipts.fail_all_connection_lost();
        self.metrics.publishes_failed(lost as u64);
        self.metrics.disconnected();
        self.transition(SessionState::Closed);
        for waiter in self.close_waiters.drain(..) {
            let _ = waiter.send(());
        }
    }

    fn fail(&mut self, error: SessionError) {
        self.teardown_link();
        self.phase = None;
        let lost = self.receipts.fail_all_connection_lost();
        self.metrics.publishes_failed(lost as u64);
        self.metrics.disconnected();
        self.transition(SessionState::Failed(error));
    }

    /// Cancel the credential or connect task, close the writer and stop the reader.
    /// Bumping the epoch discards anything they still report.
    fn teardown_link(&mut self) {
        self.epoch += 1;
        if let Some(task) = self.connect_task.take() {
            task.abort();
        }
        if let Some(link) = self.link.take() {
            let _ = link.writer.send(WriterCommand::Close);
            link.reader_task.abort();
        }
        self.heartbeat = None;
        self.credential = None;
        self.credential_sent = false;
    }

    fn write(&mut self, frame: &Frame) -> SessionResult<()> {
        let link = self.link.as_ref().ok_or_else(|| SessionError::NotConnected {
            state: self.state.name().to_string(),
        })?;
        link.writer
            .send(WriterCommand::Send(FrameCodec::encode(frame)))
            .map_err(|_| SessionError::Transport(TransportError::Closed))?;

        if let Some(heartbeat) = &mut self.heartbeat {
            heartbeat.record_sent(Instant::now());
        }
        if frame.is_heartbeat() {
            self.metrics.heartbeat_sent();
        } else {
            self.metrics.frame_sent();
        }
        Ok(())
    }

    fn set_phase(&mut self, phase: Phase, after: Duration) {
        self.phase = Some((phase, deadline_after(Instant::now(), after)));
    }

    fn transition(&mut self, next: SessionState) {
        if self.state == next {
            return;
        }
        if self.state == SessionState::Ready {
            let lost = self.receipts.fail_all_connection_lost();
            if lost > 0 {
                warn!(target: "stomp_session", lost, "Failing unacknowledged publishes");
                self.metrics.publishes_failed(lost as u64);
            }
        }

        log_state_transition(&self.state, &next);
        self.metrics.set_state(next.name());
        if let Some(callback) = &self.on_state_change {
            callback(&next);
        }
        self.state = next.clone();
        self.state_tx.send_replace(next);
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn run_writer(
    mut sink: Box<dyn TransportSink>,
    mut commands: mpsc::UnboundedReceiver<WriterCommand>,
    events: mpsc::UnboundedSender<TaggedEvent>,
    epoch: u64,
) {
    while let Some(command) = commands.recv().await {
        match command {
            WriterCommand::Send(data) => {
                if let Err(e) = sink.send(data).await {
                    debug!(target: "stomp_transport", error = %e, "Write failed");
                    let _ = events.send(TaggedEvent {
                        epoch,
                        event: ConnectionEvent::Failed(SessionError::Transport(e)),
                    });
                    return;
                }
            }
            WriterCommand::Close => break,
        }
    }
    if let Err(e) = sink.close().await {
        debug!(target: "stomp_transport", error = %e, "Close failed");
    }
}

async fn run_reader(
    mut stream: Box<dyn TransportStream>,
    mut decoder: FrameDecoder,
    events: mpsc::UnboundedSender<TaggedEvent>,
    epoch: u64,
) {
    let send = |event| events.send(TaggedEvent { epoch, event }).is_ok();

    loop {
        match stream.recv().await {
            Some(Ok(chunk)) => {
                decoder.push(&chunk);
                loop {
                    match decoder.next_frame() {
                        Ok(Some(frame)) => {
                            if !send(ConnectionEvent::Frame(frame)) {
                                return;
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            warn!(target: "stomp_transport", error = %e, "Undecodable frame");
                            send(ConnectionEvent::Failed(SessionError::Protocol(e)));
                            return;
                        }
                    }
                }
            }
            Some(Err(e)) => {
                send(ConnectionEvent::Failed(SessionError::Transport(e)));
                return;
            }
            None => {
                send(ConnectionEvent::Closed);
                return;
            }
        }
    }
}
