//! Shared helpers for runtime tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use flowsession_runtime::{
    CounterpartyInfo, DriverOutput, FlowNotification, RuntimeResult, SessionConfig,
    SessionDriver, SessionEvent, SessionId, SessionInit, SessionStatus, TimeSource, Timestamp,
};

/// Install a test subscriber once; `RUST_LOG` picks the level
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

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

pub fn test_protocol() -> SessionInit {
    SessionInit::new("payment-flow", 3)
}

/// A driver plus everything it told the flow engine
pub struct Peer {
    pub driver: SessionDriver<MockTimeSource>,
    pub notifications: Vec<FlowNotification>,
}

impl Peer {
    pub fn new(party: &str, config: SessionConfig, clock: MockTimeSource) -> Self {
        let info = CounterpartyInfo::new(party, 4);
        Self {
            driver: SessionDriver::new(config, test_protocol(), info, clock),
            notifications: Vec::new(),
        }
    }

    /// Record notifications and return the events to publish
    pub fn take(&mut self, result: RuntimeResult<DriverOutput>) -> Vec<SessionEvent> {
        let output = result.expect("driver call failed");
        self.notifications.extend(output.notifications);
        output.outbound
    }

    pub fn initiate(&mut self, session_id: SessionId, counterparty: &str) -> Vec<SessionEvent> {
        let result = self.driver.initiate(session_id, counterparty);
        self.take(result)
    }

    pub fn send(&mut self, session_id: SessionId, payload: &[u8]) -> Vec<SessionEvent> {
        let result = self.driver.send(session_id, payload.to_vec());
        self.take(result)
    }

    pub fn close(&mut self, session_id: SessionId) -> Vec<SessionEvent> {
        let result = self.driver.close(session_id);
        self.take(result)
    }

    pub fn request_info(&mut self, session_id: SessionId) -> Vec<SessionEvent> {
        let result = self.driver.request_counterparty_info(session_id);
        self.take(result)
    }

    pub fn poll(&mut self) -> Vec<SessionEvent> {
        let result = self.driver.poll_replay();
        self.take(result)
    }

    pub fn status(&self, session_id: &SessionId) -> Option<SessionStatus> {
        self.driver.status(session_id)
    }

    pub fn delivered(&self) -> Vec<Vec<u8>> {
        self.notifications
            .iter()
            .filter_map(|n| match n {
                FlowNotification::Delivered { payload, .. } => Some(payload.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, pred: impl Fn(&FlowNotification) -> bool) -> usize {
        self.notifications.iter().filter(|n| pred(n)).count()
    }
}

/// Carry events between two peers over a bus that delivers everything twice
pub fn exchange_duplicating(
    a: &mut Peer,
    b: &mut Peer,
    mut to_b: Vec<SessionEvent>,
    mut to_a: Vec<SessionEvent>,
) {
    for _ in 0..64 {
        if to_b.is_empty() && to_a.is_empty() {
            return;
        }
        let mut next_a = Vec::new();
        for event in to_b.drain(..) {
            for copy in [event.clone(), event] {
                let result = b.driver.on_inbound(copy);
                next_a.extend(b.take(result));
            }
        }
        let mut next_b = Vec::new();
        for event in to_a.drain(..) {
            for copy in [event.clone(), event] {
                let result = a.driver.on_inbound(copy);
                next_b.extend(a.take(result));
            }
        }
        to_a = next_a;
        to_b = next_b;
    }
    panic!("peers did not go quiet");
}
