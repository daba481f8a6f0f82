//! FlowSession Core
//!
//! Pure session protocol engine for flow-to-flow messaging. Two parties
//! exchange an ordered stream of messages over an at-least-once transport:
//! the engine provides the handshake, in-order delivery under duplication and
//! reordering, chunking of oversized payloads, a two-sided close and error
//! short-circuiting.
//!
//! Every operation is a synchronous function from `(state, event, now)` to a
//! [`SessionTransition`]. The engine owns no threads, clocks or I/O; the caller
//! persists the returned state and performs the returned effects, one event at
//! a time per session.

extern crate alloc;

pub mod chunking;
pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod errors;
pub mod event;
pub mod processor;
pub mod replay;
pub mod state;
pub mod transition;
pub mod types;

// Protocol logging goes through tracing when enabled, the log facade otherwise
cfg_if::cfg_if! {
    if #[cfg(feature = "tracing")] {
        #[allow(unused_imports)]
        pub(crate) use tracing::{debug, info, warn};
    } else {
        #[allow(unused_imports)]
        pub(crate) use log::{debug, info, warn};
    }
}

pub use chunking::{Chunk, ChunkCodec, ChunkInfo};
pub use config::{ChannelConfig, FlowSessionConfig, FlowSessionConfigBuilder, SessionConfig};
pub use dispatcher::SessionEventDispatcher;
pub use engine::SessionProtocolEngine;
pub use errors::{ChunkError, FlowSessionError, FlowSessionResult, Result};
pub use event::{
    error_kinds, CounterpartyInfo, Direction, OutOfOrderSeqs, PayloadKind, SessionData,
    SessionErrorInfo, SessionEvent, SessionInit, SessionPayload,
};
pub use processor::{ProcessorContext, SessionEventProcessor};
pub use state::{ReceiveState, SendState, SessionState, SessionStatus};
pub use transition::{AuditEntry, FlowNotification, SessionTransition};
pub use types::{MessageId, SessionId, SystemTimeSource, TimeSource, Timestamp};
