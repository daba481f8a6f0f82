//! Error short-circuit
//!
//! An error ends the session from any non-terminal status, skipping the close
//! handshake. Inbound errors apply immediately, ahead of any sequence gap.
//! Outbound errors go out once and are never replayed.

use crate::event::{SessionErrorInfo, SessionPayload};
use crate::processor::{
    require_state, send_sequenced, violation, wrong_kind, Effects, ProcessorContext,
    SessionEventProcessor, TransitionRecorder,
};
use crate::state::SessionState;
use crate::transition::{FlowNotification, SessionTransition};
use crate::types::Timestamp;
use crate::{debug, Result};

/// Move a session to `Error`, optionally telling the peer first
pub(crate) fn fail_session(
    state: &mut SessionState,
    info: SessionErrorInfo,
    now: Timestamp,
    effects: &mut Effects,
    notify_peer: bool,
) {
    if notify_peer {
        let event = send_sequenced(state, SessionPayload::Error(info.clone()), now, false);
        effects.publish(event);
    }
    state.fail(info.clone());
    effects.notify(FlowNotification::Errored {
        session_id: state.session_id,
        kind: info.kind,
        message: info.message,
    });
}

pub struct InboundErrorProcessor {
    ctx: ProcessorContext,
}

impl InboundErrorProcessor {
    pub fn new(ctx: ProcessorContext) -> Self {
        Self { ctx }
    }
}

impl SessionEventProcessor for InboundErrorProcessor {
    fn name(&self) -> &'static str {
        "InboundError"
    }

    fn execute(self: Box<Self>) -> Result<SessionTransition> {
        let recorder = TransitionRecorder::new(&self.ctx);
        let ProcessorContext {
            state, event, now, ..
        } = self.ctx;
        let info = match &event.payload {
            SessionPayload::Error(info) => info.clone(),
            other => return Err(wrong_kind(event.direction, other)),
        };
        let mut effects = Effects::default();

        let state = match state {
            // Nothing to tear down; remember the failure so redeliveries are dropped
            None => SessionState::new_errored(event.session_id, info, now),
            Some(state) if state.status.is_terminal() => {
                debug!(
                    "Dropping error for session {} in {}",
                    event.session_id, state.status
                );
                state
            }
            Some(mut state) => {
                state.last_received_at = now;
                fail_session(&mut state, info, now, &mut effects, false);
                state
            }
        };

        Ok(recorder.finish(Some(state), effects))
    }
}

pub struct OutboundErrorProcessor {
    ctx: ProcessorContext,
}

impl OutboundErrorProcessor {
    pub fn new(ctx: ProcessorContext) -> Self {
        Self { ctx }
    }
}

impl SessionEventProcessor for OutboundErrorProcessor {
    fn name(&self) -> &'static str {
        "OutboundError"
    }

    fn execute(self: Box<Self>) -> Result<SessionTransition> {
        let recorder = TransitionRecorder::new(&self.ctx);
        let ProcessorContext {
            state, event, now, ..
        } = self.ctx;
        let info = match &event.payload {
            SessionPayload::Error(info) => info.clone(),
            other => return Err(wrong_kind(event.direction, other)),
        };

        let mut state = require_state(state, event.session_id)?;
        if state.status.is_terminal() {
            return Err(violation(&state, "cannot fail a session that already ended"));
        }

        let mut effects = Effects::default();
        fail_session(&mut state, info, now, &mut effects, true);
        Ok(recorder.finish(Some(state), effects))
    }
}
