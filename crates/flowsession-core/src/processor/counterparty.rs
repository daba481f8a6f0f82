//! Counterparty info request and response
//!
//! Ordinary sequenced events; they are sendable wherever data is.

use crate::event::{CounterpartyInfo, SessionPayload};
use crate::processor::{
    require_state, send_sequenced, sequencing, violation, wrong_kind, Effects, ProcessorContext,
    SessionEventProcessor, TransitionRecorder,
};
use crate::state::SessionState;
use crate::transition::{FlowNotification, SessionTransition};
use crate::Result;

pub(crate) fn accept_request(state: &SessionState, effects: &mut Effects) {
    effects.notify(FlowNotification::CounterpartyInfoRequested {
        session_id: state.session_id,
    });
}

pub(crate) fn accept_response(
    state: &mut SessionState,
    info: CounterpartyInfo,
    effects: &mut Effects,
) {
    state.counterparty_info = Some(info.clone());
    effects.notify(FlowNotification::CounterpartyInfoReceived {
        session_id: state.session_id,
        info,
    });
}

/// Shared outbound path for both directions of the exchange
fn send(ctx: ProcessorContext) -> Result<SessionTransition> {
    let recorder = TransitionRecorder::new(&ctx);
    let ProcessorContext {
        state, event, now, ..
    } = ctx;
    match event.payload {
        SessionPayload::CounterpartyInfoRequest | SessionPayload::CounterpartyInfoResponse(_) => {}
        ref other => return Err(wrong_kind(event.direction, other)),
    }

    let mut state = require_state(state, event.session_id)?;
    if !state.can_send() {
        return Err(violation(
            &state,
            "counterparty info can only be exchanged on an open session",
        ));
    }

    let mut effects = Effects::default();
    let sent = send_sequenced(&mut state, event.payload, now, true);
    effects.publish(sent);
    Ok(recorder.finish(Some(state), effects))
}

pub struct OutboundCounterpartyRequestProcessor {
    ctx: ProcessorContext,
}

impl OutboundCounterpartyRequestProcessor {
    pub fn new(ctx: ProcessorContext) -> Self {
        Self { ctx }
    }
}

impl SessionEventProcessor for OutboundCounterpartyRequestProcessor {
    fn name(&self) -> &'static str {
        "OutboundCounterpartyInfoRequest"
    }

    fn execute(self: Box<Self>) -> Result<SessionTransition> {
        send(self.ctx)
    }
}

pub struct OutboundCounterpartyResponseProcessor {
    ctx: ProcessorContext,
}

impl OutboundCounterpartyResponseProcessor {
    pub fn new(ctx: ProcessorContext) -> Self {
        Self { ctx }
    }
}

impl SessionEventProcessor for OutboundCounterpartyResponseProcessor {
    fn name(&self) -> &'static str {
        "OutboundCounterpartyInfoResponse"
    }

    fn execute(self: Box<Self>) -> Result<SessionTransition> {
        send(self.ctx)
    }
}

/// Inbound request or response; both go through in-order sequencing
pub struct InboundCounterpartyProcessor {
    ctx: ProcessorContext,
}

impl InboundCounterpartyProcessor {
    pub fn new(ctx: ProcessorContext) -> Self {
        Self { ctx }
    }
}

impl SessionEventProcessor for InboundCounterpartyProcessor {
    fn name(&self) -> &'static str {
        "InboundCounterpartyInfo"
    }

    fn execute(self: Box<Self>) -> Result<SessionTransition> {
        sequencing::process(self.ctx)
    }
}
