//! Event processors
//!
//! One processor per (direction, payload kind). A processor owns its context,
//! runs once, and returns the full transition. Inbound Data, Close and
//! counterparty-info events share the sequencing pipeline in `sequencing`,
//! which applies them strictly in order.

pub mod ack;
pub mod close;
pub mod counterparty;
pub mod data;
pub mod error;
pub mod init;
pub mod sequencing;

use crate::chunking::ChunkCodec;
use crate::event::{Direction, PayloadKind, SessionEvent, SessionPayload};
use crate::state::{SessionState, SessionStatus};
use crate::transition::{AuditEntry, FlowNotification, SessionTransition};
use crate::types::{SessionId, Timestamp};
use crate::{info, warn, FlowSessionError, Result};

// ----------------------------------------------------------------------------
// Processor Trait
// ----------------------------------------------------------------------------

/// A single-use transition function for one event
pub trait SessionEventProcessor {
    /// Name used in logs
    fn name(&self) -> &'static str;

    /// Consume the processor and compute the transition
    fn execute(self: Box<Self>) -> Result<SessionTransition>;
}

/// Inputs handed to a processor by the dispatcher
#[derive(Debug, Clone)]
pub struct ProcessorContext {
    /// Last known state, `None` if this party has never seen the session
    pub state: Option<SessionState>,
    pub event: SessionEvent,
    pub now: Timestamp,
    /// Bound on the receive gap buffer
    pub max_buffered_events: usize,
    /// Attached on the outbound Data path only
    pub codec: Option<ChunkCodec>,
}

// ----------------------------------------------------------------------------
// Effect Accumulation
// ----------------------------------------------------------------------------

/// Effects gathered while a processor runs
#[derive(Debug, Default)]
pub(crate) struct Effects {
    pub outbound: Vec<SessionEvent>,
    pub notifications: Vec<FlowNotification>,
    /// A sequenced inbound event was seen and must be acknowledged
    pub ack_required: bool,
}

impl Effects {
    pub fn publish(&mut self, event: SessionEvent) {
        self.outbound.push(event);
    }

    pub fn notify(&mut self, notification: FlowNotification) {
        self.notifications.push(notification);
    }

    pub fn require_ack(&mut self) {
        self.ack_required = true;
    }
}

/// Captures the "before" half of the audit entry and assembles the transition
pub(crate) struct TransitionRecorder {
    session_id: SessionId,
    direction: Direction,
    kind: PayloadKind,
    from_status: Option<SessionStatus>,
    now: Timestamp,
}

impl TransitionRecorder {
    pub fn new(ctx: &ProcessorContext) -> Self {
        Self {
            session_id: ctx.event.session_id,
            direction: ctx.event.direction,
            kind: ctx.event.kind(),
            from_status: ctx.state.as_ref().map(|s| s.status),
            now: ctx.now,
        }
    }

    /// Stamp acknowledgements onto published events and build the transition
    ///
    /// An acknowledgement rides on whatever the transition publishes; a
    /// standalone `Ack` is added only when nothing else goes out.
    pub fn finish(self, state: Option<SessionState>, mut effects: Effects) -> SessionTransition {
        if let Some(state) = &state {
            if effects.ack_required && effects.outbound.is_empty() {
                effects.publish(SessionEvent::outbound(
                    self.session_id,
                    SessionPayload::Ack,
                    self.now,
                ));
            }
            effects.outbound = effects
                .outbound
                .into_iter()
                .map(|event| state.stamp_ack(event))
                .collect();
        }

        let to_status = state.as_ref().map(|s| s.status);
        if to_status != self.from_status {
            if let Some(status) = to_status.filter(|s| s.is_terminal()) {
                info!(
                    "Session {} entered {} on {} {}",
                    self.session_id, status, self.direction, self.kind
                );
            }
        }

        let audit = AuditEntry {
            timestamp: self.now,
            session_id: self.session_id,
            direction: self.direction,
            event: self.kind,
            from_status: self.from_status,
            to_status,
            effects_count: effects.outbound.len() + effects.notifications.len(),
        };

        SessionTransition {
            state,
            outbound: effects.outbound,
            notifications: effects.notifications,
            audit,
        }
    }
}

// ----------------------------------------------------------------------------
// Shared Helpers
// ----------------------------------------------------------------------------

/// Assign the next sequence number to an outbound payload
///
/// Retained events are kept in `undelivered` until cumulatively acknowledged.
pub(crate) fn send_sequenced(
    state: &mut SessionState,
    payload: SessionPayload,
    now: Timestamp,
    retain: bool,
) -> SessionEvent {
    let mut event = SessionEvent::outbound(state.session_id, payload, now);
    event.sequence_num = Some(state.send_state.next_seq());
    if retain {
        state.send_state.undelivered.push(event.clone());
    }
    event
}

/// Require existing state for an outbound event
pub(crate) fn require_state(
    state: Option<SessionState>,
    session_id: SessionId,
) -> Result<SessionState> {
    state.ok_or(FlowSessionError::UnknownSession { session_id })
}

/// Reject an outbound request that the session cannot accept right now
pub(crate) fn violation<R: Into<String>>(state: &SessionState, reason: R) -> FlowSessionError {
    let err = FlowSessionError::protocol_violation(state.session_id, state.status, reason);
    warn!("{}", err);
    err
}

/// The dispatcher routed an event to a processor for a different payload kind
pub(crate) fn wrong_kind(direction: Direction, payload: &SessionPayload) -> FlowSessionError {
    FlowSessionError::UnsupportedPayloadKind {
        direction,
        kind: payload.kind(),
    }
}
