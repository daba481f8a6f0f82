//! Test utilities for driving two protocol engines against each other
//!
//! A `Party` holds one side's engine and last known state, the way a real
//! driver would between invocations, and records what the engine delivered.

#![allow(dead_code)]

use flowsession_core::{
    FlowNotification, FlowSessionResult, SessionConfig, SessionEvent, SessionId, SessionInit,
    SessionPayload, SessionProtocolEngine, SessionState, SessionStatus, SessionTransition,
    TimeSource, Timestamp,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

// ----------------------------------------------------------------------------
// Mock Time Source
// ----------------------------------------------------------------------------

/// Mock time source for deterministic testing
#[derive(Debug, Clone, Default)]
pub struct MockTimeSource {
    current_time: Arc<AtomicU64>,
}

impl MockTimeSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance time by the specified number of milliseconds
    pub fn advance(&self, millis: u64) {
        self.current_time.fetch_add(millis, Ordering::SeqCst);
    }
}

impl TimeSource for MockTimeSource {
    fn now(&self) -> Timestamp {
        Timestamp::new(self.current_time.load(Ordering::SeqCst))
    }
}

// ----------------------------------------------------------------------------
// Test Party
// ----------------------------------------------------------------------------

pub fn create_test_session_id(n: u128) -> SessionId {
    SessionId::from_u128(0xF10E_0000 + n)
}

pub fn test_init() -> SessionInit {
    SessionInit::new("test-flow", 1)
}

/// One side of a session under test
pub struct Party {
    pub session_id: SessionId,
    pub engine: SessionProtocolEngine,
    pub state: Option<SessionState>,
    pub clock: MockTimeSource,
    pub delivered: Vec<Vec<u8>>,
    pub notifications: Vec<FlowNotification>,
}

impl Party {
    pub fn new(session_id: SessionId, config: SessionConfig, clock: MockTimeSource) -> Self {
        Self {
            session_id,
            engine: SessionProtocolEngine::new(config),
            state: None,
            clock,
            delivered: Vec::new(),
            notifications: Vec::new(),
        }
    }

    pub fn status(&self) -> Option<SessionStatus> {
        self.state.as_ref().map(|s| s.status)
    }

    pub fn state(&self) -> &SessionState {
        self.state.as_ref().expect("party has no session state")
    }

    /// Submit an outbound payload; on error the stored state is untouched
    pub fn try_send(&mut self, payload: SessionPayload) -> FlowSessionResult<Vec<SessionEvent>> {
        let now = self.clock.now();
        let event = SessionEvent::outbound(self.session_id, payload, now);
        let transition = self
            .engine
            .handle_outbound(self.state.clone(), event, now)?;
        Ok(self.absorb(transition))
    }

    pub fn send(&mut self, payload: SessionPayload) -> Vec<SessionEvent> {
        self.try_send(payload).expect("outbound event rejected")
    }

    /// Feed one event published by the other party
    pub fn receive(&mut self, event: SessionEvent) -> Vec<SessionEvent> {
        let transition = self.receive_transition(event);
        self.absorb(transition)
    }

    /// Feed an event and return the raw transition without storing anything
    pub fn receive_transition(&self, event: SessionEvent) -> SessionTransition {
        let now = self.clock.now();
        self.engine
            .handle_inbound(self.state.clone(), event.into_inbound(), now)
            .expect("inbound event rejected")
    }

    /// Feed every event in order, collecting what this party publishes
    pub fn receive_all(&mut self, events: Vec<SessionEvent>) -> Vec<SessionEvent> {
        events
            .into_iter()
            .flat_map(|event| self.receive(event))
            .collect()
    }

    pub fn replay(&self) -> Vec<SessionEvent> {
        self.state
            .as_ref()
            .map(|s| self.engine.replay(s))
            .unwrap_or_default()
    }

    pub fn absorb(&mut self, transition: SessionTransition) -> Vec<SessionEvent> {
        self.delivered
            .extend(transition.delivered().map(|payload| payload.to_vec()));
        self.notifications.extend(transition.notifications);
        self.state = transition.state;
        transition.outbound
    }

    pub fn closed_notifications(&self) -> usize {
        self.notifications
            .iter()
            .filter(|n| matches!(n, FlowNotification::Closed { .. }))
            .count()
    }

    pub fn errored_kind(&self) -> Option<&str> {
        self.notifications.iter().find_map(|n| match n {
            FlowNotification::Errored { kind, .. } => Some(kind.as_str()),
            _ => None,
        })
    }
}

/// Two parties with a completed handshake: `a` initiated, `b` accepted
pub fn connected_pair(config: SessionConfig) -> (Party, Party) {
    let clock = MockTimeSource::new();
    let session_id = create_test_session_id(1);
    let mut a = Party::new(session_id, config.clone(), clock.clone());
    let mut b = Party::new(session_id, config, clock);

    let init = a.send(SessionPayload::Init(test_init()));
    let ack = b.receive_all(init);
    a.receive_all(ack);

    assert_eq!(a.status(), Some(SessionStatus::Confirmed));
    assert_eq!(b.status(), Some(SessionStatus::Confirmed));
    (a, b)
}

/// Whether the events are all standalone acks
pub fn only_acks(events: &[SessionEvent]) -> bool {
    events
        .iter()
        .all(|e| matches!(e.payload, SessionPayload::Ack) && e.sequence_num.is_none())
}
