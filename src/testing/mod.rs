//! Testing utilities
//!
//! An in-memory connector/broker pair for exercising sessions without a
//! network or a real STOMP broker.

pub mod mocks;

pub use mocks::*;
