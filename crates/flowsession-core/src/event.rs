//! Session events and their payloads
//!
//! A `SessionEvent` is the unit the transport carries and the engine consumes.
//! The payload is a closed enum; the dispatcher matches it exhaustively.
//!
//! Every event also carries the sender's acknowledgement view of the opposite
//! direction: `received_sequence_num` is a cumulative ack (everything up to and
//! including it has been processed) and `out_of_order_sequence_nums` lists the
//! events held in the sender's gap buffer. A standalone `Ack` payload carries
//! the same fields when nothing else is going out.

use core::fmt;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::chunking::ChunkInfo;
use crate::types::{SessionId, Timestamp};
use crate::Result;

/// Sequence numbers held out of order, usually very few
pub type OutOfOrderSeqs = SmallVec<[u64; 4]>;

// ----------------------------------------------------------------------------
// Direction
// ----------------------------------------------------------------------------

/// Direction of an event relative to the party processing it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Inbound,
    Outbound,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Inbound => write!(f, "INBOUND"),
            Direction::Outbound => write!(f, "OUTBOUND"),
        }
    }
}

// ----------------------------------------------------------------------------
// Payload Types
// ----------------------------------------------------------------------------

/// Opening message of a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInit {
    /// Name of the flow protocol the initiator wants to speak
    pub protocol_name: String,
    /// Protocol version the initiator runs
    pub protocol_version: u32,
}

impl SessionInit {
    pub fn new<N: Into<String>>(protocol_name: N, protocol_version: u32) -> Self {
        Self {
            protocol_name: protocol_name.into(),
            protocol_version,
        }
    }
}

/// Application bytes, possibly one chunk of a larger group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionData {
    pub payload: Vec<u8>,
    /// Present when this event is one chunk of a split payload
    pub chunk: Option<ChunkInfo>,
}

impl SessionData {
    pub fn new(payload: Vec<u8>) -> Self {
        Self {
            payload,
            chunk: None,
        }
    }
}

/// Error carried by an `Error` payload and surfaced to the flow engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionErrorInfo {
    pub kind: String,
    pub message: String,
}

impl SessionErrorInfo {
    pub fn new<K: Into<String>, M: Into<String>>(kind: K, message: M) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for SessionErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Error kinds the engine itself generates
pub mod error_kinds {
    /// Peer broke the protocol (malformed chunk group, data after close)
    pub const PROTOCOL_VIOLATION: &str = "ProtocolViolation";
    /// Event arrived for a session this party has no state for
    pub const SESSION_MISMATCH: &str = "SessionMismatch";
    /// Gap buffer exceeded its configured bound
    pub const BUFFER_OVERFLOW: &str = "BufferOverflow";
    /// Replay gave up on an unacknowledged event
    pub const RESEND_EXHAUSTED: &str = "ResendExhausted";
}

/// Durable identity of a counterparty, resolved over the session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterpartyInfo {
    /// Durable party name
    pub party: String,
    /// Platform protocol version of the counterparty
    pub protocol_version: u32,
}

impl CounterpartyInfo {
    pub fn new<P: Into<String>>(party: P, protocol_version: u32) -> Self {
        Self {
            party: party.into(),
            protocol_version,
        }
    }
}

/// Payload of a session event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionPayload {
    Init(SessionInit),
    Data(SessionData),
    Close,
    Error(SessionErrorInfo),
    CounterpartyInfoRequest,
    CounterpartyInfoResponse(CounterpartyInfo),
    /// Standalone acknowledgement; never carries a sequence number
    Ack,
}

impl SessionPayload {
    /// Get the payload kind used for dispatch
    pub fn kind(&self) -> PayloadKind {
        match self {
            SessionPayload::Init(_) => PayloadKind::Init,
            SessionPayload::Data(_) => PayloadKind::Data,
            SessionPayload::Close => PayloadKind::Close,
            SessionPayload::Error(_) => PayloadKind::Error,
            SessionPayload::CounterpartyInfoRequest => PayloadKind::CounterpartyInfoRequest,
            SessionPayload::CounterpartyInfoResponse(_) => PayloadKind::CounterpartyInfoResponse,
            SessionPayload::Ack => PayloadKind::Ack,
        }
    }

    /// Build a data payload
    pub fn data(payload: Vec<u8>) -> Self {
        SessionPayload::Data(SessionData::new(payload))
    }

    /// Build an error payload
    pub fn error<K: Into<String>, M: Into<String>>(kind: K, message: M) -> Self {
        SessionPayload::Error(SessionErrorInfo::new(kind, message))
    }
}

/// Discriminant of `SessionPayload`, the key of the dispatcher table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PayloadKind {
    Init,
    Data,
    Close,
    Error,
    CounterpartyInfoRequest,
    CounterpartyInfoResponse,
    Ack,
}

impl fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PayloadKind::Init => "Init",
            PayloadKind::Data => "Data",
            PayloadKind::Close => "Close",
            PayloadKind::Error => "Error",
            PayloadKind::CounterpartyInfoRequest => "CounterpartyInfoRequest",
            PayloadKind::CounterpartyInfoResponse => "CounterpartyInfoResponse",
            PayloadKind::Ack => "Ack",
        };
        write!(f, "{}", name)
    }
}

// ----------------------------------------------------------------------------
// Session Event
// ----------------------------------------------------------------------------

/// Immutable record exchanged between the engine, the driver and the transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionEvent {
    pub session_id: SessionId,
    /// Assigned by the outbound processor; `None` before assignment and on acks
    pub sequence_num: Option<u64>,
    pub timestamp: Timestamp,
    pub direction: Direction,
    pub payload: SessionPayload,
    /// Cumulative ack of the opposite direction
    pub received_sequence_num: u64,
    /// Opposite-direction events the sender holds out of order
    pub out_of_order_sequence_nums: OutOfOrderSeqs,
}

impl SessionEvent {
    /// Create an outbound event as the flow engine hands it to the engine
    pub fn outbound(session_id: SessionId, payload: SessionPayload, timestamp: Timestamp) -> Self {
        Self {
            session_id,
            sequence_num: None,
            timestamp,
            direction: Direction::Outbound,
            payload,
            received_sequence_num: 0,
            out_of_order_sequence_nums: OutOfOrderSeqs::new(),
        }
    }

    /// Create an inbound event
    pub fn inbound(
        session_id: SessionId,
        sequence_num: Option<u64>,
        payload: SessionPayload,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            session_id,
            sequence_num,
            timestamp,
            direction: Direction::Inbound,
            payload,
            received_sequence_num: 0,
            out_of_order_sequence_nums: OutOfOrderSeqs::new(),
        }
    }

    /// Set the acknowledgement fields
    pub fn with_ack(mut self, received_sequence_num: u64, out_of_order: &[u64]) -> Self {
        self.received_sequence_num = received_sequence_num;
        self.out_of_order_sequence_nums = out_of_order.iter().copied().collect();
        self
    }

    /// The same event as the receiving party sees it after transport
    pub fn into_inbound(mut self) -> Self {
        self.direction = Direction::Inbound;
        self
    }

    /// Get the payload kind
    pub fn kind(&self) -> PayloadKind {
        self.payload.kind()
    }

    /// Whether this event occupies a slot in the sequence space
    pub fn is_sequenced(&self) -> bool {
        self.sequence_num.is_some()
    }

    /// Serialize to the wire format
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Deserialize from the wire format
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
