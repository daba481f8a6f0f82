//! Error types for the session protocol engine
//!
//! Only caller-facing failures live here. Remote and local session errors are
//! not Rust errors at all: they are ordinary transitions into
//! `SessionStatus::Error` (see `processor::error`).

use crate::event::{Direction, PayloadKind};
use crate::state::SessionStatus;
use crate::types::{MessageId, SessionId};

// ----------------------------------------------------------------------------
// Chunk Codec Errors
// ----------------------------------------------------------------------------

/// Failures while splitting or reassembling a chunk group
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChunkError {
    #[error("Invalid maximum chunk size: {max_size}")]
    InvalidChunkSize { max_size: usize },
    #[error("Chunk group is empty")]
    EmptyGroup,
    #[error("Chunk belongs to message {actual}, expected {expected}")]
    MessageIdMismatch {
        expected: MessageId,
        actual: MessageId,
    },
    #[error("Chunk index out of order: expected {expected}, got {actual}")]
    IndexOutOfOrder { expected: u32, actual: u32 },
    #[error("Chunk group size mismatch: header says {expected}, got {actual}")]
    TotalMismatch { expected: u32, actual: u32 },
    #[error("Chunk group has no checksum on its final chunk")]
    MissingChecksum,
    #[error("Chunk group checksum mismatch: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch { expected: u32, actual: u32 },
    #[error("Payload needs {count} chunks, more than a group can carry")]
    TooManyChunks { count: usize },
}

// ----------------------------------------------------------------------------
// Engine Errors
// ----------------------------------------------------------------------------

/// Errors raised synchronously to the caller of the protocol engine
#[derive(Debug, thiserror::Error)]
pub enum FlowSessionError {
    #[error("Event direction mismatch: expected {expected}, got {actual}")]
    DirectionMismatch {
        expected: Direction,
        actual: Direction,
    },

    #[error("No processor registered for {kind} events in direction {direction}")]
    UnsupportedPayloadKind {
        direction: Direction,
        kind: PayloadKind,
    },

    #[error("No state for session {session_id}")]
    UnknownSession { session_id: SessionId },

    #[error("Protocol violation on session {session_id} (status {status}): {reason}")]
    ProtocolViolation {
        session_id: SessionId,
        status: SessionStatus,
        reason: String,
    },

    #[error("Chunking error: {0}")]
    Chunking(#[from] ChunkError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("Configuration error: {reason}")]
    Configuration { reason: String },
}

// ----------------------------------------------------------------------------
// Convenience Error Constructors
// ----------------------------------------------------------------------------

impl FlowSessionError {
    /// Create a protocol violation error for a session
    pub fn protocol_violation<R: Into<String>>(
        session_id: SessionId,
        status: SessionStatus,
        reason: R,
    ) -> Self {
        FlowSessionError::ProtocolViolation {
            session_id,
            status,
            reason: reason.into(),
        }
    }

    /// Create a configuration error with a reason
    pub fn config_error<T: Into<String>>(reason: T) -> Self {
        FlowSessionError::Configuration {
            reason: reason.into(),
        }
    }

    /// Whether the error was caused by the caller handing over a malformed request
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            FlowSessionError::DirectionMismatch { .. }
                | FlowSessionError::UnsupportedPayloadKind { .. }
                | FlowSessionError::UnknownSession { .. }
                | FlowSessionError::ProtocolViolation { .. }
        )
    }
}

// ----------------------------------------------------------------------------
// Type Aliases
// ----------------------------------------------------------------------------

pub type Result<T> = core::result::Result<T, FlowSessionError>;
pub type FlowSessionResult<T> = Result<T>;
