//! What a resend means
//!
//! Deciding *when* to resend belongs to the caller. Resending itself is always
//! the same: re-publish an undelivered event with its original sequence
//! number and payload. Only the acknowledgement fields are refreshed, so a
//! replay also carries the latest view of the opposite direction.

use crate::event::SessionEvent;
use crate::state::SessionState;

/// Undelivered events to re-publish now
///
/// Events the peer reported holding out of order are skipped; it already has
/// them and is only waiting for an earlier gap to fill.
pub fn pending_replay(state: &SessionState) -> Vec<SessionEvent> {
    if state.status.is_terminal() {
        return Vec::new();
    }

    state
        .send_state
        .undelivered
        .iter()
        .filter(|event| {
            event
                .sequence_num
                .map_or(true, |seq| !state.send_state.peer_out_of_order.contains(&seq))
        })
        .map(|event| state.stamp_ack(event.clone()))
        .collect()
}

/// Sequence number of the oldest event still awaiting acknowledgement
pub fn oldest_unacked(state: &SessionState) -> Option<u64> {
    state
        .send_state
        .undelivered
        .first()
        .and_then(|event| event.sequence_num)
}
