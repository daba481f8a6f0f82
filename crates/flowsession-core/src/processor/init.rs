//! Session handshake
//!
//! The initiator creates its state on the outbound Init and is confirmed when
//! the peer acknowledges sequence 1. The acceptor creates its state on the
//! inbound Init and is confirmed immediately. Redelivered Inits never recreate
//! a session.

use crate::event::SessionPayload;
use crate::processor::{
    send_sequenced, sequencing, wrong_kind, Effects, ProcessorContext, SessionEventProcessor,
    TransitionRecorder,
};
use crate::state::SessionState;
use crate::transition::SessionTransition;
use crate::{debug, warn, Result};

pub struct OutboundInitProcessor {
    ctx: ProcessorContext,
}

impl OutboundInitProcessor {
    pub fn new(ctx: ProcessorContext) -> Self {
        Self { ctx }
    }
}

impl SessionEventProcessor for OutboundInitProcessor {
    fn name(&self) -> &'static str {
        "OutboundInit"
    }

    fn execute(self: Box<Self>) -> Result<SessionTransition> {
        let recorder = TransitionRecorder::new(&self.ctx);
        let ProcessorContext {
            state, event, now, ..
        } = self.ctx;
        let init = match &event.payload {
            SessionPayload::Init(init) => init.clone(),
            other => return Err(wrong_kind(event.direction, other)),
        };
        let mut effects = Effects::default();

        if let Some(state) = state {
            debug!(
                "Session {} already exists in {}, ignoring Init",
                state.session_id, state.status
            );
            return Ok(recorder.finish(Some(state), effects));
        }

        let mut state = SessionState::new_initiator(event.session_id, init.clone(), now);
        let sent = send_sequenced(&mut state, SessionPayload::Init(init), now, true);
        effects.publish(sent);

        Ok(recorder.finish(Some(state), effects))
    }
}

pub struct InboundInitProcessor {
    ctx: ProcessorContext,
}

impl InboundInitProcessor {
    pub fn new(ctx: ProcessorContext) -> Self {
        Self { ctx }
    }
}

impl SessionEventProcessor for InboundInitProcessor {
    fn name(&self) -> &'static str {
        "InboundInit"
    }

    fn execute(self: Box<Self>) -> Result<SessionTransition> {
        let ctx = self.ctx;
        let init = match &ctx.event.payload {
            SessionPayload::Init(init) => init.clone(),
            other => return Err(wrong_kind(ctx.event.direction, other)),
        };

        match ctx.state.as_ref().map(|s| s.is_initiator) {
            // Redelivered Init at the acceptor: the sequencing pipeline re-acks it
            Some(false) => return sequencing::process(ctx),
            Some(true) => {
                warn!(
                    "Dropping Init for session {} opened by this party",
                    ctx.event.session_id
                );
                let recorder = TransitionRecorder::new(&ctx);
                return Ok(recorder.finish(ctx.state, Effects::default()));
            }
            None => {}
        }

        let recorder = TransitionRecorder::new(&ctx);
        let mut effects = Effects::default();
        if ctx.event.sequence_num != Some(1) {
            warn!(
                "Dropping Init for unknown session {} with sequence {:?}",
                ctx.event.session_id, ctx.event.sequence_num
            );
            return Ok(recorder.finish(None, effects));
        }

        let mut state = SessionState::new_acceptor(ctx.event.session_id, init, ctx.now);
        state.receive_state.last_processed_seq = 1;
        effects.require_ack();

        Ok(recorder.finish(Some(state), effects))
    }
}
