//! Runtime error types

use flowsession_core::{FlowSessionError, SessionId};

/// Errors raised by the session driver and task
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("Session not found: {session_id}")]
    SessionNotFound { session_id: SessionId },

    #[error("Channel closed: {channel}")]
    ChannelClosed { channel: &'static str },

    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    #[error(transparent)]
    Flow(#[from] FlowSessionError),
}

impl RuntimeError {
    /// Whether the task cannot make progress after this error
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RuntimeError::ChannelClosed { .. } | RuntimeError::Configuration { .. }
        )
    }
}

/// Result alias for runtime operations
pub type RuntimeResult<T> = Result<T, RuntimeError>;

#[cfg(test)]
mod tests {
    use super::*;
    use flowsession_core::SessionStatus;

    #[test]
    fn test_fatal_classification() {
        let closed = RuntimeError::ChannelClosed { channel: "bus" };
        assert!(closed.is_fatal());

        let violation: RuntimeError = FlowSessionError::protocol_violation(
            SessionId::from_u128(1),
            SessionStatus::Created,
            "data before handshake",
        )
        .into();
        assert!(!violation.is_fatal());
        assert!(violation.to_string().contains("data before handshake"));
    }
}
