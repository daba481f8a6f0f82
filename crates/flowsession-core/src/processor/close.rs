//! Two-sided close handshake
//!
//! Each side sends its own Close and waits for it to be acknowledged. A
//! session is closed only once both Closes are confirmed; the status in
//! between is derived by `SessionState::derived_status`.

use crate::event::SessionPayload;
use crate::processor::{
    require_state, send_sequenced, sequencing, violation, wrong_kind, Effects, ProcessorContext,
    SessionEventProcessor, TransitionRecorder,
};
use crate::state::{SessionState, SessionStatus};
use crate::transition::SessionTransition;
use crate::{debug, Result};

/// Record the peer's Close, processed in order at `seq`
pub(crate) fn accept_peer_close(state: &mut SessionState, seq: u64) {
    debug!("Peer closed session {} at seq {}", state.session_id, seq);
    state.peer_close_seq = Some(seq);
}

pub struct OutboundCloseProcessor {
    ctx: ProcessorContext,
}

impl OutboundCloseProcessor {
    pub fn new(ctx: ProcessorContext) -> Self {
        Self { ctx }
    }
}

impl SessionEventProcessor for OutboundCloseProcessor {
    fn name(&self) -> &'static str {
        "OutboundClose"
    }

    fn execute(self: Box<Self>) -> Result<SessionTransition> {
        let recorder = TransitionRecorder::new(&self.ctx);
        let ProcessorContext {
            state, event, now, ..
        } = self.ctx;
        if !matches!(event.payload, SessionPayload::Close) {
            return Err(wrong_kind(event.direction, &event.payload));
        }

        let mut state = require_state(state, event.session_id)?;
        let mut effects = Effects::default();

        match state.status {
            SessionStatus::Created => {
                return Err(violation(&state, "cannot close before the handshake completes"));
            }
            SessionStatus::Closed | SessionStatus::Error => {
                return Err(violation(&state, "session already ended"));
            }
            SessionStatus::Confirmed | SessionStatus::Closing | SessionStatus::WaitForFinalAck => {}
        }

        if let Some(seq) = state.own_close_seq {
            debug!(
                "Close already sent on session {} at seq {}",
                state.session_id, seq
            );
            return Ok(recorder.finish(Some(state), effects));
        }

        let close = send_sequenced(&mut state, SessionPayload::Close, now, true);
        state.own_close_seq = close.sequence_num;
        state.refresh_status();
        effects.publish(close);

        Ok(recorder.finish(Some(state), effects))
    }
}

pub struct InboundCloseProcessor {
    ctx: ProcessorContext,
}

impl InboundCloseProcessor {
    pub fn new(ctx: ProcessorContext) -> Self {
        Self { ctx }
    }
}

impl SessionEventProcessor for InboundCloseProcessor {
    fn name(&self) -> &'static str {
        "InboundClose"
    }

    fn execute(self: Box<Self>) -> Result<SessionTransition> {
        sequencing::process(self.ctx)
    }
}
