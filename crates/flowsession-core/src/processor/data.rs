//! Data transfer
//!
//! Outbound payloads above the size limit are split into a chunk group, one
//! sequenced event per chunk. Inbound data goes through the sequencing
//! pipeline, which only hands over complete, in-order payloads.

use crate::event::{SessionData, SessionPayload};
use crate::processor::{
    require_state, send_sequenced, sequencing, violation, wrong_kind, Effects, ProcessorContext,
    SessionEventProcessor, TransitionRecorder,
};
use crate::state::SessionState;
use crate::transition::{FlowNotification, SessionTransition};
use crate::{debug, FlowSessionError, Result};

/// Hand a complete payload to the flow engine
pub(crate) fn deliver(state: &SessionState, payload: Vec<u8>, effects: &mut Effects) {
    effects.notify(FlowNotification::Delivered {
        session_id: state.session_id,
        payload,
    });
}

pub struct OutboundDataProcessor {
    ctx: ProcessorContext,
}

impl OutboundDataProcessor {
    pub fn new(ctx: ProcessorContext) -> Self {
        Self { ctx }
    }
}

impl SessionEventProcessor for OutboundDataProcessor {
    fn name(&self) -> &'static str {
        "OutboundData"
    }

    fn execute(self: Box<Self>) -> Result<SessionTransition> {
        let recorder = TransitionRecorder::new(&self.ctx);
        let ProcessorContext {
            state,
            event,
            now,
            codec,
            max_buffered_events,
        } = self.ctx;

        let mut state = require_state(state, event.session_id)?;
        let data = match event.payload {
            SessionPayload::Data(data) => data,
            other => return Err(wrong_kind(event.direction, &other)),
        };
        if !state.can_send() {
            return Err(violation(&state, "data can only be sent on an open session"));
        }
        if data.chunk.is_some() {
            return Err(violation(&state, "chunk headers are assigned by the engine"));
        }
        let codec = codec.ok_or_else(|| {
            FlowSessionError::config_error("outbound data dispatched without a chunk codec")
        })?;

        // The peer holds a whole group in its receive buffer before reassembly
        let chunk_count = codec.chunk_count(data.payload.len());
        if chunk_count > max_buffered_events {
            return Err(violation(
                &state,
                format!(
                    "payload of {} bytes needs {} chunks, receive buffer holds {}",
                    data.payload.len(),
                    chunk_count,
                    max_buffered_events
                ),
            ));
        }

        let mut effects = Effects::default();
        if codec.needs_chunking(data.payload.len()) {
            let chunks = codec.encode(&data.payload)?;
            debug!(
                "Splitting {} bytes on session {} into {} chunks",
                data.payload.len(),
                state.session_id,
                chunks.len()
            );
            for chunk in chunks {
                let payload = SessionPayload::Data(SessionData {
                    payload: chunk.data,
                    chunk: Some(chunk.info),
                });
                let event = send_sequenced(&mut state, payload, now, true);
                effects.publish(event);
            }
        } else {
            let event = send_sequenced(&mut state, SessionPayload::Data(data), now, true);
            effects.publish(event);
        }

        Ok(recorder.finish(Some(state), effects))
    }
}

pub struct InboundDataProcessor {
    ctx: ProcessorContext,
}

impl InboundDataProcessor {
    pub fn new(ctx: ProcessorContext) -> Self {
        Self { ctx }
    }
}

impl SessionEventProcessor for InboundDataProcessor {
    fn name(&self) -> &'static str {
        "InboundData"
    }

    fn execute(self: Box<Self>) -> Result<SessionTransition> {
        sequencing::process(self.ctx)
    }
}
