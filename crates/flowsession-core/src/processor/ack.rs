//! Standalone acknowledgements
//!
//! Only ever inbound: the engine generates outbound acks itself.

use crate::event::SessionPayload;
use crate::processor::{sequencing, wrong_kind, ProcessorContext, SessionEventProcessor};
use crate::transition::SessionTransition;
use crate::{warn, Result};

pub struct InboundAckProcessor {
    ctx: ProcessorContext,
}

impl InboundAckProcessor {
    pub fn new(ctx: ProcessorContext) -> Self {
        Self { ctx }
    }
}

impl SessionEventProcessor for InboundAckProcessor {
    fn name(&self) -> &'static str {
        "InboundAck"
    }

    fn execute(self: Box<Self>) -> Result<SessionTransition> {
        let mut ctx = self.ctx;
        if !matches!(ctx.event.payload, SessionPayload::Ack) {
            return Err(wrong_kind(ctx.event.direction, &ctx.event.payload));
        }
        // An ack never occupies a slot in the sequence space
        if let Some(seq) = ctx.event.sequence_num.take() {
            warn!(
                "Ignoring sequence number {} on ack for session {}",
                seq, ctx.event.session_id
            );
        }
        sequencing::process(ctx)
    }
}
