//! Per-session protocol state
//!
//! `SessionState` is a plain value. Processors take it by value and hand back
//! the successor; the caller persists whatever comes out. Close progress is
//! tracked through the sequence numbers of the two Close events, and the
//! close-handshake status is derived from them rather than stored separately.

use alloc::collections::BTreeMap;
use core::fmt;
use serde::{Deserialize, Serialize};

use crate::event::{
    CounterpartyInfo, OutOfOrderSeqs, SessionErrorInfo, SessionEvent, SessionInit,
};
use crate::types::{SessionId, Timestamp};
use crate::Result;

// ----------------------------------------------------------------------------
// Session Status
// ----------------------------------------------------------------------------

/// Lifecycle status of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionStatus {
    /// Init sent, not yet acknowledged
    Created,
    /// Handshake complete, data may flow
    Confirmed,
    /// One side of the close handshake is in progress
    Closing,
    /// Own close sent and peer close confirmed; waiting for the ack of our close
    WaitForFinalAck,
    Closed,
    Error,
}

impl SessionStatus {
    /// Check if no further transitions are possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Closed | SessionStatus::Error)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionStatus::Created => "CREATED",
            SessionStatus::Confirmed => "CONFIRMED",
            SessionStatus::Closing => "CLOSING",
            SessionStatus::WaitForFinalAck => "WAIT_FOR_FINAL_ACK",
            SessionStatus::Closed => "CLOSED",
            SessionStatus::Error => "ERROR",
        };
        write!(f, "{}", name)
    }
}

// ----------------------------------------------------------------------------
// Direction States
// ----------------------------------------------------------------------------

/// Outbound half of the session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendState {
    /// Highest sequence number assigned so far
    pub last_sent_seq: u64,
    /// Highest sequence number the peer has cumulatively acknowledged
    pub last_acked_seq: u64,
    /// Sent events not yet cumulatively acknowledged, in sequence order
    pub undelivered: Vec<SessionEvent>,
    /// Undelivered events the peer reported holding out of order
    pub peer_out_of_order: OutOfOrderSeqs,
}

impl SendState {
    /// Assign the next outbound sequence number
    pub fn next_seq(&mut self) -> u64 {
        self.last_sent_seq += 1;
        self.last_sent_seq
    }

    /// Apply the peer's acknowledgement fields; returns true if anything changed
    pub fn apply_ack(&mut self, cumulative: u64, out_of_order: &[u64]) -> bool {
        let cumulative = cumulative.min(self.last_sent_seq);
        let mut changed = false;

        if cumulative > self.last_acked_seq {
            self.last_acked_seq = cumulative;
            let acked = self.last_acked_seq;
            self.undelivered
                .retain(|e| e.sequence_num.is_some_and(|seq| seq > acked));
            changed = true;
        }

        let acked = self.last_acked_seq;
        let held: OutOfOrderSeqs = out_of_order
            .iter()
            .copied()
            .filter(|seq| *seq > acked && *seq <= self.last_sent_seq)
            .collect();
        if held != self.peer_out_of_order {
            self.peer_out_of_order = held;
            changed = true;
        }

        changed
    }

    pub fn is_acked(&self, seq: u64) -> bool {
        seq <= self.last_acked_seq
    }

    fn clear(&mut self) {
        self.undelivered.clear();
        self.peer_out_of_order.clear();
    }
}

/// Inbound half of the session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveState {
    /// Highest sequence number processed in order
    pub last_processed_seq: u64,
    /// Events received ahead of a gap, keyed by sequence number
    ///
    /// A chunk group is identified by `ChunkInfo::message_id` and occupies a
    /// contiguous run of sequence numbers here until it is reassembled.
    pub buffered: BTreeMap<u64, SessionEvent>,
}

impl ReceiveState {
    /// Next sequence number expected in order
    pub fn expected_seq(&self) -> u64 {
        self.last_processed_seq + 1
    }

    /// Sequence numbers currently held ahead of a gap
    pub fn out_of_order(&self) -> OutOfOrderSeqs {
        self.buffered.keys().copied().collect()
    }
}

// ----------------------------------------------------------------------------
// Session State
// ----------------------------------------------------------------------------

/// Complete protocol state of one session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: SessionId,
    pub status: SessionStatus,
    /// Fixed at creation
    pub is_initiator: bool,
    /// Protocol announced by the initiator's Init
    pub protocol: Option<SessionInit>,
    pub send_state: SendState,
    pub receive_state: ReceiveState,
    /// Sequence number of our own Close, once sent
    pub own_close_seq: Option<u64>,
    /// Sequence number of the peer's Close, once processed in order
    pub peer_close_seq: Option<u64>,
    /// Populated only in `SessionStatus::Error`
    pub error_info: Option<SessionErrorInfo>,
    pub counterparty_info: Option<CounterpartyInfo>,
    pub created_at: Timestamp,
    pub last_received_at: Timestamp,
}

impl SessionState {
    /// State of a session this party opened
    pub fn new_initiator(session_id: SessionId, init: SessionInit, now: Timestamp) -> Self {
        Self::new(session_id, SessionStatus::Created, true, Some(init), now)
    }

    /// State of a session opened by the peer
    pub fn new_acceptor(session_id: SessionId, init: SessionInit, now: Timestamp) -> Self {
        Self::new(session_id, SessionStatus::Confirmed, false, Some(init), now)
    }

    /// State recorded for a session that failed before this party ever knew it
    pub fn new_errored(session_id: SessionId, info: SessionErrorInfo, now: Timestamp) -> Self {
        let mut state = Self::new(session_id, SessionStatus::Error, false, None, now);
        state.error_info = Some(info);
        state
    }

    fn new(
        session_id: SessionId,
        status: SessionStatus,
        is_initiator: bool,
        protocol: Option<SessionInit>,
        now: Timestamp,
    ) -> Self {
        Self {
            session_id,
            status,
            is_initiator,
            protocol,
            send_state: SendState::default(),
            receive_state: ReceiveState::default(),
            own_close_seq: None,
            peer_close_seq: None,
            error_info: None,
            counterparty_info: None,
            created_at: now,
            last_received_at: now,
        }
    }

    /// Own Close has been sent
    pub fn own_close_sent(&self) -> bool {
        self.own_close_seq.is_some()
    }

    /// Own Close has been sent and cumulatively acknowledged
    pub fn own_close_confirmed(&self) -> bool {
        self.own_close_seq
            .is_some_and(|seq| self.send_state.is_acked(seq))
    }

    /// Peer's Close has been processed and acknowledged
    pub fn peer_close_confirmed(&self) -> bool {
        self.peer_close_seq.is_some()
    }

    /// Whether Data and counterparty-info events may be sent now
    pub fn can_send(&self) -> bool {
        match self.status {
            SessionStatus::Confirmed => true,
            SessionStatus::Closing => !self.own_close_sent(),
            _ => false,
        }
    }

    /// Status implied by the close handshake facts
    pub fn derived_status(&self) -> SessionStatus {
        match self.status {
            SessionStatus::Created | SessionStatus::Closed | SessionStatus::Error => self.status,
            SessionStatus::Confirmed | SessionStatus::Closing | SessionStatus::WaitForFinalAck => {
                let own_sent = self.own_close_sent();
                let own_confirmed = self.own_close_confirmed();
                let peer_confirmed = self.peer_close_confirmed();

                if own_confirmed && peer_confirmed {
                    SessionStatus::Closed
                } else if own_sent && peer_confirmed {
                    SessionStatus::WaitForFinalAck
                } else if own_sent || peer_confirmed {
                    SessionStatus::Closing
                } else {
                    SessionStatus::Confirmed
                }
            }
        }
    }

    /// Re-derive the status; returns true if the session just became closed
    pub fn refresh_status(&mut self) -> bool {
        let next = self.derived_status();
        let newly_closed = next == SessionStatus::Closed && self.status != SessionStatus::Closed;
        self.status = next;
        if newly_closed {
            self.send_state.clear();
            self.receive_state.buffered.clear();
        }
        newly_closed
    }

    /// Move to `Error`, discarding everything queued in either direction
    pub fn fail(&mut self, info: SessionErrorInfo) {
        self.status = SessionStatus::Error;
        self.error_info = Some(info);
        self.send_state.clear();
        self.receive_state.buffered.clear();
    }

    /// Apply the acknowledgement fields carried by an inbound event
    pub fn apply_peer_ack(&mut self, event: &SessionEvent) -> bool {
        let changed = self
            .send_state
            .apply_ack(event.received_sequence_num, &event.out_of_order_sequence_nums);
        if self.status == SessionStatus::Created && self.send_state.last_acked_seq >= 1 {
            self.status = SessionStatus::Confirmed;
        }
        changed
    }

    /// Stamp this party's current acknowledgement view onto an outgoing event
    pub fn stamp_ack(&self, mut event: SessionEvent) -> SessionEvent {
        event.received_sequence_num = self.receive_state.last_processed_seq;
        event.out_of_order_sequence_nums = self.receive_state.out_of_order();
        event
    }

    /// Serialize for storage between invocations
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Deserialize from storage
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
