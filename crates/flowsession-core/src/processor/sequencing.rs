//! In-order inbound pipeline
//!
//! Every inbound event first has its acknowledgement fields applied to the
//! send side. A sequenced event is then either a duplicate (re-acked and
//! dropped), ahead of a gap (buffered), or next in line (applied, followed by
//! every buffered event that became contiguous). A chunk group is applied as
//! a whole once all of its chunks sit at consecutive sequence numbers.

use crate::chunking::{Chunk, ChunkCodec, ChunkInfo};
use crate::event::{error_kinds, SessionData, SessionErrorInfo, SessionEvent, SessionPayload};
use crate::processor::error::fail_session;
use crate::processor::{
    close, counterparty, data, send_sequenced, Effects, ProcessorContext, TransitionRecorder,
};
use crate::state::{SessionState, SessionStatus};
use crate::transition::{FlowNotification, SessionTransition};
use crate::types::Timestamp;
use crate::{debug, warn, Result};

/// Run one inbound event through the pipeline
pub(crate) fn process(ctx: ProcessorContext) -> Result<SessionTransition> {
    let recorder = TransitionRecorder::new(&ctx);
    let ProcessorContext {
        state,
        event,
        now,
        max_buffered_events,
        ..
    } = ctx;
    let mut effects = Effects::default();

    let Some(mut state) = state else {
        let state = unknown_session(&event, now, &mut effects);
        return Ok(recorder.finish(state, effects));
    };

    if !state.status.is_terminal() {
        state.last_received_at = now;
        state.apply_peer_ack(&event);
        if state.refresh_status() {
            notify_closed(&state, &mut effects);
        }
    }

    let Some(seq) = event.sequence_num else {
        return Ok(recorder.finish(Some(state), effects));
    };

    match state.status {
        SessionStatus::Error => {
            debug!("Dropping seq {} on errored session {}", seq, state.session_id);
            return Ok(recorder.finish(Some(state), effects));
        }
        SessionStatus::Closed => {
            // The peer may have missed our final ack; answer its redeliveries
            if seq <= state.receive_state.last_processed_seq {
                effects.require_ack();
            } else {
                debug!("Dropping seq {} on closed session {}", seq, state.session_id);
            }
            return Ok(recorder.finish(Some(state), effects));
        }
        SessionStatus::Created => {
            warn!(
                "Dropping seq {} on session {} before the handshake completed",
                seq, state.session_id
            );
            return Ok(recorder.finish(Some(state), effects));
        }
        SessionStatus::Confirmed | SessionStatus::Closing | SessionStatus::WaitForFinalAck => {}
    }

    effects.require_ack();
    let expected = state.receive_state.expected_seq();
    if seq < expected {
        debug!(
            "Dropping duplicate seq {} on session {} (processed through {})",
            seq, state.session_id, state.receive_state.last_processed_seq
        );
        return Ok(recorder.finish(Some(state), effects));
    }
    if seq > expected {
        debug!(
            "Buffering seq {} on session {}, waiting for {}",
            seq, state.session_id, expected
        );
    }

    state.receive_state.buffered.entry(seq).or_insert(event);
    if state.receive_state.buffered.len() > max_buffered_events {
        let reason = format!(
            "receive buffer exceeded {} events waiting for seq {}",
            max_buffered_events, expected
        );
        warn!("Failing session {}: {}", state.session_id, reason);
        fail_session(
            &mut state,
            SessionErrorInfo::new(error_kinds::BUFFER_OVERFLOW, reason),
            now,
            &mut effects,
            true,
        );
        return Ok(recorder.finish(Some(state), effects));
    }

    drain(&mut state, now, max_buffered_events, &mut effects);
    if state.refresh_status() {
        notify_closed(&state, &mut effects);
    }

    Ok(recorder.finish(Some(state), effects))
}

/// Apply buffered events for as long as they are contiguous
fn drain(
    state: &mut SessionState,
    now: Timestamp,
    max_buffered_events: usize,
    effects: &mut Effects,
) {
    while state.status != SessionStatus::Error {
        let next = state.receive_state.expected_seq();
        let chunk = match state.receive_state.buffered.get(&next) {
            Some(event) => chunk_info(event),
            None => break,
        };

        let Some(info) = chunk else {
            if let Some(event) = state.receive_state.buffered.remove(&next) {
                state.receive_state.last_processed_seq = next;
                apply_in_order(state, next, event.payload, now, effects);
            }
            continue;
        };

        if info.index != 0 {
            malformed(state, format!("chunk group starts at index {}", info.index), now, effects);
            break;
        }
        if info.total as usize > max_buffered_events {
            let reason = format!(
                "chunk group of {} exceeds the {} event receive buffer",
                info.total, max_buffered_events
            );
            fail_session(
                state,
                SessionErrorInfo::new(error_kinds::BUFFER_OVERFLOW, reason),
                now,
                effects,
                true,
            );
            break;
        }

        let last = next + u64::from(info.total) - 1;
        if !(next..=last).all(|seq| state.receive_state.buffered.contains_key(&seq)) {
            debug!(
                "Chunk group {} on session {} incomplete, holding",
                info.message_id, state.session_id
            );
            break;
        }

        let group: Vec<SessionEvent> = (next..=last)
            .filter_map(|seq| state.receive_state.buffered.remove(&seq))
            .collect();
        state.receive_state.last_processed_seq = last;

        match reassemble(group) {
            Ok(payload) => {
                let payload = SessionPayload::Data(SessionData::new(payload));
                apply_in_order(state, next, payload, now, effects);
            }
            Err(reason) => malformed(state, reason, now, effects),
        }
    }
}

/// Apply one in-order payload; `seq` is the first sequence number it occupied
fn apply_in_order(
    state: &mut SessionState,
    seq: u64,
    payload: SessionPayload,
    now: Timestamp,
    effects: &mut Effects,
) {
    if let Some(close_seq) = state.peer_close_seq {
        let reason = format!(
            "{} at seq {} after peer close at seq {}",
            payload.kind(),
            seq,
            close_seq
        );
        warn!("Failing session {}: {}", state.session_id, reason);
        fail_session(
            state,
            SessionErrorInfo::new(error_kinds::PROTOCOL_VIOLATION, reason),
            now,
            effects,
            true,
        );
        return;
    }

    match payload {
        SessionPayload::Data(data) => data::deliver(state, data.payload, effects),
        SessionPayload::Close => close::accept_peer_close(state, seq),
        SessionPayload::CounterpartyInfoRequest => counterparty::accept_request(state, effects),
        SessionPayload::CounterpartyInfoResponse(info) => {
            counterparty::accept_response(state, info, effects)
        }
        SessionPayload::Init(_) => {
            warn!(
                "Ignoring Init at seq {} on established session {}",
                seq, state.session_id
            );
        }
        // Errors are applied on arrival and acks are unsequenced; neither is buffered
        SessionPayload::Error(_) | SessionPayload::Ack => {}
    }
}

fn chunk_info(event: &SessionEvent) -> Option<ChunkInfo> {
    match &event.payload {
        SessionPayload::Data(SessionData {
            chunk: Some(info), ..
        }) => Some(*info),
        _ => None,
    }
}

fn reassemble(group: Vec<SessionEvent>) -> core::result::Result<Vec<u8>, String> {
    let chunks = group
        .into_iter()
        .map(|event| match event.payload {
            SessionPayload::Data(SessionData {
                payload,
                chunk: Some(info),
            }) => Ok(Chunk {
                info,
                data: payload,
            }),
            other => Err(format!("{} interleaved with a chunk group", other.kind())),
        })
        .collect::<core::result::Result<Vec<_>, _>>()?;

    ChunkCodec::decode(&chunks).map_err(|e| e.to_string())
}

fn malformed(state: &mut SessionState, reason: String, now: Timestamp, effects: &mut Effects) {
    warn!("Malformed chunk group on session {}: {}", state.session_id, reason);
    fail_session(
        state,
        SessionErrorInfo::new(error_kinds::PROTOCOL_VIOLATION, reason),
        now,
        effects,
        true,
    );
}

fn notify_closed(state: &SessionState, effects: &mut Effects) {
    effects.notify(FlowNotification::Closed {
        session_id: state.session_id,
    });
}

/// A sequenced event arrived for a session this party never saw
///
/// The session is recorded as failed and the peer is told so; unsequenced
/// acks for unknown sessions are ignored.
fn unknown_session(
    event: &SessionEvent,
    now: Timestamp,
    effects: &mut Effects,
) -> Option<SessionState> {
    let seq = event.sequence_num?;
    warn!(
        "{} seq {} for unknown session {}",
        event.kind(),
        seq,
        event.session_id
    );

    let info = SessionErrorInfo::new(
        error_kinds::SESSION_MISMATCH,
        format!("no session {} at this party", event.session_id),
    );
    let mut state = SessionState::new_errored(event.session_id, info.clone(), now);
    let reply = send_sequenced(&mut state, SessionPayload::Error(info), now, false);
    effects.publish(reply);
    Some(state)
}
