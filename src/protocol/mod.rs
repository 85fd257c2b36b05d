//! STOMP 1.2 frame model, wire codec, and chat payload types

pub mod codec;
pub mod frame;
pub mod messages;
pub mod topics;

pub use codec::{FrameCodec, FrameDecoder, ProtocolError, DEFAULT_MAX_FRAME_BYTES};
pub use frame::{headers, Command, Frame};
pub use messages::*;
pub use topics::*;
