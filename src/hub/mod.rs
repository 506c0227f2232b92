//! Real-time notification hub
//!
//! Tracks live socket connections, their channel subscriptions and optional
//! user binding, and fans messages out to them.

pub mod messages;
pub mod registry;

pub use messages::{
    ClientMessage, Envelope, OutboundMessage, MINT_CANCELLED, MINT_COMPLETE, MINT_ERROR,
    MINT_PROGRESS,
};
pub use registry::{ConnectionId, EventSink, Hub};
