//! Shared fixtures for the session integration tests
//!
//! Every wait is bounded so a broken session fails the test instead of
//! hanging it. The tests run on paused time, so the bound costs nothing.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use stomp_session::config::SessionConfig;
use stomp_session::protocol::Frame;
use stomp_session::session::{InboundMessage, SessionHandle, SessionState};
use stomp_session::testing::{MockBroker, MockLink};

pub const TEST_ENDPOINT: &str = "ws://broker.test/ws-stomp";

const WAIT_LIMIT: Duration = Duration::from_secs(600);

/// Session configuration with heart-beats off and default timings
#[allow(dead_code)]
pub fn test_config() -> SessionConfig {
    let mut config = SessionConfig::for_endpoint(TEST_ENDPOINT);
    config.heartbeat.outgoing_ms = 0;
    config.heartbeat.incoming_ms = 0;
    config
}

#[allow(dead_code)]
pub async fn accept_link(broker: &mut MockBroker) -> MockLink {
    tokio::time::timeout(WAIT_LIMIT, broker.accept())
        .await
        .expect("timed out waiting for the client to connect")
        .expect("connector dropped")
}

#[allow(dead_code)]
pub async fn next_frame(link: &mut MockLink) -> Frame {
    tokio::time::timeout(WAIT_LIMIT, link.next_frame())
        .await
        .expect("timed out waiting for a client frame")
        .expect("client closed the connection")
}

/// Accept the next connection, answer CONNECTED and wait for `Ready`
#[allow(dead_code)]
pub async fn connect_ready(session: &SessionHandle, broker: &mut MockBroker) -> MockLink {
    let mut link = accept_link(broker).await;
    link.accept_connect().await;
    tokio::time::timeout(WAIT_LIMIT, session.ready())
        .await
        .expect("timed out waiting for Ready")
        .expect("session did not become ready");
    link
}

/// Wait until the session's state satisfies `predicate`
#[allow(dead_code)]
pub async fn wait_for_state<F>(session: &SessionHandle, predicate: F) -> SessionState
where
    F: Fn(&SessionState) -> bool,
{
    let mut states = session.state_changes();
    tokio::time::timeout(WAIT_LIMIT, async {
        loop {
            let current = states.borrow_and_update().clone();
            if predicate(&current) {
                return current;
            }
            states
                .changed()
                .await
                .expect("session task ended before reaching the state");
        }
    })
    .await
    .expect("timed out waiting for state")
}

/// State callback recording every transition
#[allow(dead_code)]
pub fn state_recorder() -> (
    Arc<Mutex<Vec<SessionState>>>,
    impl Fn(&SessionState) + Send + Sync + 'static,
) {
    let states = Arc::new(Mutex::new(Vec::new()));
    let sink = states.clone();
    (states, move |state: &SessionState| {
        sink.lock().unwrap().push(state.clone())
    })
}

/// Subscription handler recording every delivered message
#[allow(dead_code)]
pub fn message_recorder() -> (
    Arc<Mutex<Vec<InboundMessage>>>,
    impl Fn(&InboundMessage) + Send + Sync + 'static,
) {
    let messages = Arc::new(Mutex::new(Vec::new()));
    let sink = messages.clone();
    (messages, move |message: &InboundMessage| {
        sink.lock().unwrap().push(message.clone())
    })
}

/// Count of recorded states equal to `state`
#[allow(dead_code)]
pub fn count_state(states: &Mutex<Vec<SessionState>>, state: &SessionState) -> usize {
    states.lock().unwrap().iter().filter(|s| *s == state).count()
}
