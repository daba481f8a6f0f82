//! FlowSession Runtime
//!
//! Drives the pure protocol engine from `flowsession-core`:
//! - `SessionDriver`: synchronous facade holding session state between calls
//! - `SessionTask`: tokio loop wiring flow commands and the message bus to a driver
//! - Session store and replay scheduling managers
//!
//! The core decides what a transition does; this crate decides when to run it
//! and where its effects go.

pub mod channels;
pub mod driver;
pub mod error;
pub mod managers;
pub mod task;

pub use channels::{
    create_command_channel, create_inbound_channel, create_notification_channel,
    create_outbound_channel, BusReceiver, BusSender, CommandReceiver, CommandSender, FlowCommand,
    NotificationReceiver, NotificationSender,
};
pub use driver::{DriverOutput, SessionDriver};
pub use error::{RuntimeError, RuntimeResult};
pub use managers::*;
pub use task::{SessionTask, SessionTaskHandle};

// Re-export core types for convenience
pub use flowsession_core::{
    error_kinds, ChannelConfig, CounterpartyInfo, FlowNotification, FlowSessionConfig,
    SessionConfig, SessionEvent, SessionId, SessionInit, SessionPayload, SessionState,
    SessionStatus, SystemTimeSource, TimeSource, Timestamp,
};
