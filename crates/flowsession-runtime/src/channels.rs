//! Channels between the flow engine, the session task and the message bus
//!
//! All channels are bounded `tokio::sync::mpsc` queues sized by
//! `ChannelConfig`. The bus carries raw `SessionEvent`s in both directions.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use flowsession_core::{ChannelConfig, FlowNotification, SessionEvent, SessionId};

// ----------------------------------------------------------------------------
// Flow Commands
// ----------------------------------------------------------------------------

/// Requests from the flow engine to the session task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowCommand {
    /// Open a session with a counterparty
    Initiate {
        session_id: SessionId,
        counterparty: String,
    },
    /// Send application bytes; queued until the handshake completes
    Send {
        session_id: SessionId,
        payload: Vec<u8>,
    },
    Close {
        session_id: SessionId,
    },
    /// Abort the session, skipping the close handshake
    Fail {
        session_id: SessionId,
        kind: String,
        message: String,
    },
    RequestCounterpartyInfo {
        session_id: SessionId,
    },
    /// Stop the session task
    Shutdown,
}

impl FlowCommand {
    /// Session the command targets, if any
    pub fn session_id(&self) -> Option<SessionId> {
        match self {
            FlowCommand::Initiate { session_id, .. }
            | FlowCommand::Send { session_id, .. }
            | FlowCommand::Close { session_id }
            | FlowCommand::Fail { session_id, .. }
            | FlowCommand::RequestCounterpartyInfo { session_id } => Some(*session_id),
            FlowCommand::Shutdown => None,
        }
    }
}

// ----------------------------------------------------------------------------
// Channel Types
// ----------------------------------------------------------------------------

pub type CommandSender = mpsc::Sender<FlowCommand>;
pub type CommandReceiver = mpsc::Receiver<FlowCommand>;
pub type BusSender = mpsc::Sender<SessionEvent>;
pub type BusReceiver = mpsc::Receiver<SessionEvent>;
pub type NotificationSender = mpsc::Sender<FlowNotification>;
pub type NotificationReceiver = mpsc::Receiver<FlowNotification>;

// ----------------------------------------------------------------------------
// Channel Creation Utilities
// ----------------------------------------------------------------------------

/// Create bounded command channel (flow engine → session task)
pub fn create_command_channel(config: &ChannelConfig) -> (CommandSender, CommandReceiver) {
    mpsc::channel(config.command_buffer_size)
}

/// Create bounded inbound bus channel (message bus → session task)
pub fn create_inbound_channel(config: &ChannelConfig) -> (BusSender, BusReceiver) {
    mpsc::channel(config.inbound_buffer_size)
}

/// Create bounded outbound bus channel (session task → message bus)
pub fn create_outbound_channel(config: &ChannelConfig) -> (BusSender, BusReceiver) {
    mpsc::channel(config.outbound_buffer_size)
}

/// Create bounded notification channel (session task → flow engine)
pub fn create_notification_channel(
    config: &ChannelConfig,
) -> (NotificationSender, NotificationReceiver) {
    mpsc::channel(config.notification_buffer_size)
}
