//! STOMP session manager
//!
//! A long-lived session over one persistent, possibly unreliable, byte
//! stream. It authenticates, keeps subscriptions alive across reconnects,
//! publishes with optional receipts, watches heart-beats and hands an
//! ordered, de-duplicated stream of messages to the consumer.
//!
//! The session runs as a single owner task (`actor`); [`SessionHandle`] is a
//! cheap cloneable front end that submits commands to it. The remaining
//! modules hold the pure pieces the owner drives.
//!
//! ```no_run
//! use stomp_session::config::SessionConfig;
//! use stomp_session::credentials::StaticCredential;
//! use stomp_session::session::{PublishOptions, Session};
//!
//! # async fn example() -> Result<(), stomp_session::error::SessionError> {
//! let config = SessionConfig::for_endpoint("ws://localhost:8080/ws-stomp");
//! let session = Session::builder(config)
//!     .credentials(StaticCredential::new("token"))
//!     .open()?;
//!
//! session
//!     .subscribe("/topic/chat/1", |message| {
//!         println!("{}: {:?}", message.arrival_sequence, message.text());
//!     })
//!     .await?;
//! session.ready().await?;
//! session
//!     .publish("/app/chat/1/send", "hello", PublishOptions::with_receipt())
//!     .await?;
//! session.close().await;
//! # Ok(())
//! # }
//! ```

mod actor;
pub mod buffer;
pub mod handle;
pub mod heartbeat;
pub mod receipts;
pub mod reconnect;
pub mod registry;
pub mod state;

pub use actor::StateCallback;
pub use buffer::{InboundBuffer, InboundMessage, MessageLog, MessageReader, ReadError};
pub use handle::{PublishOptions, Session, SessionBuilder, SessionHandle};
pub use heartbeat::{negotiate, HeartbeatMonitor, NegotiatedHeartbeat};
pub use receipts::ReceiptCorrelator;
pub use reconnect::{ReconnectPolicy, ReconnectionDecision};
pub use registry::{Handler, Subscription, SubscriptionId, SubscriptionRegistry};
pub use state::SessionState;

use std::time::Duration;
use tokio::time::Instant;

/// Longest delay any session deadline is scheduled at
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// `now + after`, clamped so caller- or broker-supplied durations cannot
/// overflow the clock
pub(crate) fn deadline_after(now: Instant, after: Duration) -> Instant {
    now + after.min(FAR_FUTURE)
}
