//! Synchronous session driver
//!
//! Wraps the protocol engine with everything it deliberately leaves out:
//! state persistence between calls, replay timing, queueing of requests made
//! before the handshake completes, and the automatic answer to counterparty
//! info requests.

use std::collections::HashMap;

use flowsession_core::{
    error_kinds, CounterpartyInfo, FlowNotification, FlowSessionConfig, FlowSessionError,
    SessionConfig, SessionEvent, SessionId, SessionInit, SessionPayload, SessionProtocolEngine,
    SessionState, SessionStatus, SessionTransition, TimeSource, Timestamp,
};
use tracing::{debug, info, warn};

use crate::error::{RuntimeError, RuntimeResult};
use crate::managers::{ReplayDecision, ReplayStatistics, ReplayTracker, SessionStore};

// ----------------------------------------------------------------------------
// Driver Output
// ----------------------------------------------------------------------------

/// Effects of one driver call, for the caller to perform
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DriverOutput {
    /// Events to publish on the message bus, in order
    pub outbound: Vec<SessionEvent>,
    /// Callbacks for the flow engine, in order
    pub notifications: Vec<FlowNotification>,
}

impl DriverOutput {
    pub fn extend(&mut self, other: DriverOutput) {
        self.outbound.extend(other.outbound);
        self.notifications.extend(other.notifications);
    }

    pub fn is_empty(&self) -> bool {
        self.outbound.is_empty() && self.notifications.is_empty()
    }
}

/// Request held back until the handshake completes
#[derive(Debug, Clone)]
enum PendingOp {
    Send(Vec<u8>),
    RequestCounterpartyInfo,
    Close,
}

impl PendingOp {
    fn into_payload(self) -> SessionPayload {
        match self {
            PendingOp::Send(bytes) => SessionPayload::data(bytes),
            PendingOp::RequestCounterpartyInfo => SessionPayload::CounterpartyInfoRequest,
            PendingOp::Close => SessionPayload::Close,
        }
    }
}

// ----------------------------------------------------------------------------
// Session Driver
// ----------------------------------------------------------------------------

/// Drives sessions of one party through the protocol engine
pub struct SessionDriver<T: TimeSource + Clone> {
    engine: SessionProtocolEngine,
    store: SessionStore,
    replay: ReplayTracker<T>,
    time_source: T,
    /// Announced in the Init of every session this party opens
    protocol: SessionInit,
    /// Returned to peers asking for this party's identity
    local_info: CounterpartyInfo,
    pending: HashMap<SessionId, Vec<PendingOp>>,
}

impl<T: TimeSource + Clone> SessionDriver<T> {
    pub fn new(
        config: SessionConfig,
        protocol: SessionInit,
        local_info: CounterpartyInfo,
        time_source: T,
    ) -> Self {
        Self {
            engine: SessionProtocolEngine::new(config.clone()),
            store: SessionStore::new(config.clone()),
            replay: ReplayTracker::new(config, time_source.clone()),
            time_source,
            protocol,
            local_info,
            pending: HashMap::new(),
        }
    }

    /// Create a driver from a full configuration, rejecting invalid settings
    pub fn from_config(
        config: &FlowSessionConfig,
        protocol: SessionInit,
        local_info: CounterpartyInfo,
        time_source: T,
    ) -> RuntimeResult<Self> {
        config
            .validate()
            .map_err(|reason| RuntimeError::Configuration { reason })?;
        Ok(Self::new(
            config.session.clone(),
            protocol,
            local_info,
            time_source,
        ))
    }

    // ------------------------------------------------------------------------
    // Flow engine API
    // ------------------------------------------------------------------------

    /// Open a session with a counterparty
    pub fn initiate(
        &mut self,
        session_id: SessionId,
        counterparty: &str,
    ) -> RuntimeResult<DriverOutput> {
        info!("Initiating session {} with {}", session_id, counterparty);
        let init = SessionPayload::Init(self.protocol.clone());
        self.submit(session_id, init)
    }

    /// Send application bytes, queueing them until the session is confirmed
    pub fn send(&mut self, session_id: SessionId, payload: Vec<u8>) -> RuntimeResult<DriverOutput> {
        self.submit_or_queue(session_id, PendingOp::Send(payload))
    }

    /// Start the close handshake after anything still queued
    pub fn close(&mut self, session_id: SessionId) -> RuntimeResult<DriverOutput> {
        self.submit_or_queue(session_id, PendingOp::Close)
    }

    pub fn request_counterparty_info(
        &mut self,
        session_id: SessionId,
    ) -> RuntimeResult<DriverOutput> {
        self.submit_or_queue(session_id, PendingOp::RequestCounterpartyInfo)
    }

    /// Abort a session; queued requests are discarded
    pub fn fail(
        &mut self,
        session_id: SessionId,
        kind: &str,
        message: &str,
    ) -> RuntimeResult<DriverOutput> {
        self.require_session(&session_id)?;
        self.pending.remove(&session_id);
        self.submit(session_id, SessionPayload::error(kind, message))
    }

    // ------------------------------------------------------------------------
    // Message bus API
    // ------------------------------------------------------------------------

    /// Process one event delivered by the message bus
    pub fn on_inbound(&mut self, event: SessionEvent) -> RuntimeResult<DriverOutput> {
        let now = self.time_source.now();
        let session_id = event.session_id;
        let state = self.store.get(&session_id).cloned();
        let transition = self
            .engine
            .handle_inbound(state, event.into_inbound(), now)?;
        let mut output = self.apply(transition, now);

        let requested = output.notifications.iter().any(|n| {
            matches!(n, FlowNotification::CounterpartyInfoRequested { .. })
                && n.session_id() == session_id
        });
        if requested {
            let response = SessionPayload::CounterpartyInfoResponse(self.local_info.clone());
            match self.submit(session_id, response) {
                Ok(answer) => output.extend(answer),
                Err(e) => warn!("Could not answer counterparty info request: {}", e),
            }
        }

        // The inbound transition is already stored; its effects must reach the caller
        output.extend(self.flush_pending(session_id));
        Ok(output)
    }

    /// Run one replay tick
    ///
    /// Resends whatever is due and fails sessions that ran out of resends.
    /// Expired sessions are retired from the store.
    pub fn poll_replay(&mut self) -> RuntimeResult<DriverOutput> {
        let now = self.time_source.now();
        let mut output = DriverOutput::default();

        for session_id in self.store.live_sessions() {
            let Some(state) = self.store.get(&session_id) else {
                continue;
            };
            let candidates = self.engine.replay(state);
            match self.replay.poll(session_id, candidates) {
                ReplayDecision::Idle => {}
                ReplayDecision::Resend(events) => output.outbound.extend(events),
                ReplayDecision::Exhausted {
                    sequence_num,
                    attempts,
                } => {
                    let message = format!(
                        "seq {} unacknowledged after {} resends",
                        sequence_num, attempts
                    );
                    warn!("Failing session {}: {}", session_id, message);
                    self.pending.remove(&session_id);
                    let error = SessionPayload::error(error_kinds::RESEND_EXHAUSTED, message);
                    match self.submit(session_id, error) {
                        Ok(failed) => output.extend(failed),
                        Err(e) => warn!("Could not fail session {}: {}", session_id, e),
                    }
                }
            }
        }

        for session_id in self.store.cleanup_expired(now) {
            self.replay.forget(&session_id);
            self.pending.remove(&session_id);
        }

        Ok(output)
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn state(&self, session_id: &SessionId) -> Option<&SessionState> {
        self.store.get(session_id)
    }

    pub fn status(&self, session_id: &SessionId) -> Option<SessionStatus> {
        self.store.get(session_id).map(|s| s.status)
    }

    pub fn session_count(&self) -> usize {
        self.store.len()
    }

    /// Requests waiting for the handshake on a session
    pub fn pending_count(&self, session_id: &SessionId) -> usize {
        self.pending.get(session_id).map_or(0, Vec::len)
    }

    pub fn replay_statistics(&self) -> ReplayStatistics {
        self.replay.statistics()
    }

    pub fn local_info(&self) -> &CounterpartyInfo {
        &self.local_info
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    fn require_session(&self, session_id: &SessionId) -> RuntimeResult<&SessionState> {
        self.store
            .get(session_id)
            .ok_or(RuntimeError::SessionNotFound {
                session_id: *session_id,
            })
    }

    fn submit_or_queue(
        &mut self,
        session_id: SessionId,
        op: PendingOp,
    ) -> RuntimeResult<DriverOutput> {
        let state = self.require_session(&session_id)?;
        let status = state.status;
        let queued = self.pending.get(&session_id);
        if queued.is_some_and(|ops| ops.iter().any(|op| matches!(op, PendingOp::Close))) {
            return Err(FlowSessionError::protocol_violation(
                session_id,
                status,
                "a close is already queued on this session",
            )
            .into());
        }
        // Requests queued earlier go first
        if status == SessionStatus::Created || queued.is_some() {
            debug!("Queueing {:?} on session {} until confirmed", op, session_id);
            self.pending.entry(session_id).or_default().push(op);
            return Ok(DriverOutput::default());
        }
        self.submit(session_id, op.into_payload())
    }

    fn submit(
        &mut self,
        session_id: SessionId,
        payload: SessionPayload,
    ) -> RuntimeResult<DriverOutput> {
        let now = self.time_source.now();
        let state = self.store.get(&session_id).cloned();
        let event = SessionEvent::outbound(session_id, payload, now);
        let transition = self.engine.handle_outbound(state, event, now)?;
        Ok(self.apply(transition, now))
    }

    /// Release queued requests once the session is confirmed
    ///
    /// A request the engine refuses is logged and dropped; the rest still go out.
    fn flush_pending(&mut self, session_id: SessionId) -> DriverOutput {
        let mut output = DriverOutput::default();
        let ready = match self.store.get(&session_id) {
            Some(state) if state.status.is_terminal() => {
                self.pending.remove(&session_id);
                false
            }
            Some(state) => state.status != SessionStatus::Created,
            None => false,
        };
        if !ready {
            return output;
        }

        let Some(ops) = self.pending.remove(&session_id) else {
            return output;
        };
        debug!("Releasing {} queued requests on session {}", ops.len(), session_id);
        for op in ops {
            match self.submit(session_id, op.into_payload()) {
                Ok(released) => output.extend(released),
                Err(e) => warn!("Dropping queued request on session {}: {}", session_id, e),
            }
        }
        output
    }

    /// Persist the successor state and hand back the effects
    fn apply(&mut self, transition: SessionTransition, now: Timestamp) -> DriverOutput {
        let SessionTransition {
            state,
            outbound,
            notifications,
            ..
        } = transition;

        if let Some(state) = state {
            self.replay.sync(&state);
            if state.status.is_terminal() {
                self.pending.remove(&state.session_id);
            }
            self.store.put(state, now);
        }
        DriverOutput {
            outbound,
            notifications,
        }
    }
}
