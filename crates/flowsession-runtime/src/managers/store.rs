//! In-memory session store
//!
//! Stands in for persistence between engine invocations. Terminal sessions
//! linger for `closed_session_retention` so redelivered events can still be
//! re-acknowledged; live sessions without inbound traffic for `idle_timeout`
//! are dropped.

use std::collections::HashMap;

use flowsession_core::{SessionConfig, SessionId, SessionState, Timestamp};
use tracing::{debug, warn};

/// Session states keyed by session id
#[derive(Debug)]
pub struct SessionStore {
    config: SessionConfig,
    sessions: HashMap<SessionId, SessionState>,
    /// When each terminal session was first stored as terminal
    ended_at: HashMap<SessionId, Timestamp>,
}

impl SessionStore {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            sessions: HashMap::new(),
            ended_at: HashMap::new(),
        }
    }

    /// Get the last stored state of a session
    pub fn get(&self, session_id: &SessionId) -> Option<&SessionState> {
        self.sessions.get(session_id)
    }

    pub fn contains(&self, session_id: &SessionId) -> bool {
        self.sessions.contains_key(session_id)
    }

    /// Store the successor state returned by the engine
    pub fn put(&mut self, state: SessionState, now: Timestamp) {
        if state.status.is_terminal() {
            self.ended_at.entry(state.session_id).or_insert(now);
        }
        self.sessions.insert(state.session_id, state);
    }

    /// Remove a session
    pub fn remove(&mut self, session_id: &SessionId) -> Option<SessionState> {
        self.ended_at.remove(session_id);
        self.sessions.remove(session_id)
    }

    /// All stored sessions
    pub fn sessions(&self) -> impl Iterator<Item = (&SessionId, &SessionState)> {
        self.sessions.iter()
    }

    /// Ids of sessions that are still live
    pub fn live_sessions(&self) -> Vec<SessionId> {
        self.sessions
            .values()
            .filter(|s| !s.status.is_terminal())
            .map(|s| s.session_id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Drop expired sessions; returns the ids removed
    pub fn cleanup_expired(&mut self, now: Timestamp) -> Vec<SessionId> {
        let expired: Vec<SessionId> = self
            .sessions
            .values()
            .filter(|state| match self.ended_at.get(&state.session_id) {
                Some(ended) => now.duration_since(*ended) >= self.config.closed_session_retention,
                None => now.duration_since(state.last_received_at) >= self.config.idle_timeout,
            })
            .map(|state| state.session_id)
            .collect();

        for session_id in &expired {
            if let Some(state) = self.remove(session_id) {
                if state.status.is_terminal() {
                    debug!("Retired session {} ({})", session_id, state.status);
                } else {
                    warn!(
                        "Dropping idle session {} in {} after {:?}",
                        session_id, state.status, self.config.idle_timeout
                    );
                }
            }
        }

        expired
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use flowsession_core::{SessionErrorInfo, SessionInit};

    fn live(n: u128, now: Timestamp) -> SessionState {
        SessionState::new_initiator(SessionId::from_u128(n), SessionInit::new("test", 1), now)
    }

    #[test]
    fn test_terminal_sessions_linger_for_retention() {
        let config = SessionConfig::testing();
        let retention = config.closed_session_retention.as_millis() as u64;
        let mut store = SessionStore::new(config);

        let info = SessionErrorInfo::new("test", "boom");
        let failed = SessionState::new_errored(SessionId::from_u128(1), info, Timestamp::new(0));
        store.put(failed.clone(), Timestamp::new(100));
        // A later put does not restart the retention clock
        store.put(failed, Timestamp::new(200));

        assert!(store.cleanup_expired(Timestamp::new(100 + retention - 1)).is_empty());
        assert_eq!(
            store.cleanup_expired(Timestamp::new(100 + retention)),
            vec![SessionId::from_u128(1)]
        );
        assert!(store.is_empty());
    }

    #[test]
    fn test_idle_live_sessions_are_dropped() {
        let config = SessionConfig::testing();
        let idle = config.idle_timeout.as_millis() as u64;
        let mut store = SessionStore::new(config);

        store.put(live(1, Timestamp::new(0)), Timestamp::new(0));
        store.put(live(2, Timestamp::new(idle)), Timestamp::new(idle));
        assert_eq!(store.live_sessions().len(), 2);

        let removed = store.cleanup_expired(Timestamp::new(idle));
        assert_eq!(removed, vec![SessionId::from_u128(1)]);
        assert!(store.contains(&SessionId::from_u128(2)));
        assert_eq!(store.len(), 1);
    }
}
