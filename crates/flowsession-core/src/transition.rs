//! Transition results and flow-engine notifications
//!
//! A transition is everything one engine call produces: the successor state,
//! the events to publish to the transport, and the callbacks for the flow
//! engine. The caller performs the effects; the engine never does.

use serde::{Deserialize, Serialize};

use crate::event::{CounterpartyInfo, Direction, PayloadKind, SessionEvent};
use crate::state::{SessionState, SessionStatus};
use crate::types::{SessionId, Timestamp};

// ----------------------------------------------------------------------------
// Flow Notifications
// ----------------------------------------------------------------------------

/// Callbacks for the flow engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowNotification {
    /// A logical message (single event or reassembled chunk group) completed
    Delivered {
        session_id: SessionId,
        payload: Vec<u8>,
    },
    Closed {
        session_id: SessionId,
    },
    Errored {
        session_id: SessionId,
        kind: String,
        message: String,
    },
    /// The peer asked for this party's durable identity
    CounterpartyInfoRequested {
        session_id: SessionId,
    },
    CounterpartyInfoReceived {
        session_id: SessionId,
        info: CounterpartyInfo,
    },
}

impl FlowNotification {
    pub fn session_id(&self) -> SessionId {
        match self {
            FlowNotification::Delivered { session_id, .. }
            | FlowNotification::Closed { session_id }
            | FlowNotification::Errored { session_id, .. }
            | FlowNotification::CounterpartyInfoRequested { session_id }
            | FlowNotification::CounterpartyInfoReceived { session_id, .. } => *session_id,
        }
    }
}

// ----------------------------------------------------------------------------
// Audit Trail
// ----------------------------------------------------------------------------

/// Audit trail entry for one engine call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: Timestamp,
    pub session_id: SessionId,
    pub direction: Direction,
    pub event: PayloadKind,
    pub from_status: Option<SessionStatus>,
    pub to_status: Option<SessionStatus>,
    pub effects_count: usize,
}

// ----------------------------------------------------------------------------
// Session Transition
// ----------------------------------------------------------------------------

/// Result of applying one event to a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionTransition {
    /// Successor state; `None` when there was no state and none was created
    pub state: Option<SessionState>,
    /// Events to publish to the transport, keyed by session id
    pub outbound: Vec<SessionEvent>,
    /// Callbacks for the flow engine
    pub notifications: Vec<FlowNotification>,
    pub audit: AuditEntry,
}

impl SessionTransition {
    pub fn status(&self) -> Option<SessionStatus> {
        self.state.as_ref().map(|s| s.status)
    }

    /// Payloads delivered to the flow engine by this transition, in order
    pub fn delivered(&self) -> impl Iterator<Item = &[u8]> {
        self.notifications.iter().filter_map(|n| match n {
            FlowNotification::Delivered { payload, .. } => Some(payload.as_slice()),
            _ => None,
        })
    }

    pub fn is_noop(&self) -> bool {
        self.outbound.is_empty() && self.notifications.is_empty()
    }
}
