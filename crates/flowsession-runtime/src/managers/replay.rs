//! Replay scheduling for unacknowledged events
//!
//! The core says what a resend is (same sequence number, same payload, fresh
//! acks); the tracker says when. Every retained event gets its own backoff
//! clock, and a session whose event exhausts `max_resend_attempts` is handed
//! back to the driver to be failed locally.

use std::collections::HashMap;

use flowsession_core::{SessionConfig, SessionEvent, SessionId, SessionState, TimeSource, Timestamp};
use tracing::debug;

// ----------------------------------------------------------------------------
// Replay Decision
// ----------------------------------------------------------------------------

/// Outcome of polling one session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplayDecision {
    /// Nothing is due yet
    Idle,
    /// Re-publish these events
    Resend(Vec<SessionEvent>),
    /// An event went unacknowledged through every allowed resend
    Exhausted { sequence_num: u64, attempts: u32 },
}

#[derive(Debug, Clone, Copy)]
struct ResendEntry {
    last_published: Timestamp,
    attempts: u32,
}

// ----------------------------------------------------------------------------
// Replay Tracker
// ----------------------------------------------------------------------------

/// Tracks publish times of undelivered events and schedules resends
#[derive(Debug)]
pub struct ReplayTracker<T: TimeSource> {
    config: SessionConfig,
    /// Per-session backoff state keyed by sequence number
    sessions: HashMap<SessionId, HashMap<u64, ResendEntry>>,
    time_source: T,
    total_resends: u64,
}

impl<T: TimeSource> ReplayTracker<T> {
    pub fn new(config: SessionConfig, time_source: T) -> Self {
        Self {
            config,
            sessions: HashMap::new(),
            time_source,
            total_resends: 0,
        }
    }

    /// Align tracking with the undelivered list of a freshly stored state
    ///
    /// Newly retained events start their clock now; acknowledged ones are
    /// forgotten.
    pub fn sync(&mut self, state: &SessionState) {
        if state.status.is_terminal() || state.send_state.undelivered.is_empty() {
            self.forget(&state.session_id);
            return;
        }

        let now = self.time_source.now();
        let entries = self.sessions.entry(state.session_id).or_default();
        let live: Vec<u64> = state
            .send_state
            .undelivered
            .iter()
            .filter_map(|e| e.sequence_num)
            .collect();

        entries.retain(|seq, _| live.contains(seq));
        for seq in live {
            entries.entry(seq).or_insert(ResendEntry {
                last_published: now,
                attempts: 0,
            });
        }
    }

    /// Decide what to resend from `candidates`, the engine's replay set
    ///
    /// Backoff clocks only advance when the whole pass resends; an exhausted
    /// event leaves every entry as it was.
    pub fn poll(&mut self, session_id: SessionId, candidates: Vec<SessionEvent>) -> ReplayDecision {
        let Some(entries) = self.sessions.get_mut(&session_id) else {
            return ReplayDecision::Idle;
        };
        let now = self.time_source.now();

        let mut due = Vec::new();
        for event in candidates {
            let Some(seq) = event.sequence_num else {
                continue;
            };
            let entry = *entries.entry(seq).or_insert(ResendEntry {
                last_published: now,
                attempts: 0,
            });
            if now.duration_since(entry.last_published) < self.config.resend_delay(entry.attempts) {
                continue;
            }
            if entry.attempts >= self.config.max_resend_attempts {
                return ReplayDecision::Exhausted {
                    sequence_num: seq,
                    attempts: entry.attempts,
                };
            }
            due.push((seq, event));
        }

        if due.is_empty() {
            return ReplayDecision::Idle;
        }
        for (seq, _) in &due {
            if let Some(entry) = entries.get_mut(seq) {
                entry.attempts += 1;
                entry.last_published = now;
            }
        }
        debug!("Resending {} events on session {}", due.len(), session_id);
        self.total_resends += due.len() as u64;
        ReplayDecision::Resend(due.into_iter().map(|(_, event)| event).collect())
    }

    /// Stop tracking a session
    pub fn forget(&mut self, session_id: &SessionId) {
        self.sessions.remove(session_id);
    }

    pub fn is_tracking(&self, session_id: &SessionId) -> bool {
        self.sessions.contains_key(session_id)
    }

    /// Get replay statistics
    pub fn statistics(&self) -> ReplayStatistics {
        ReplayStatistics {
            tracked_sessions: self.sessions.len(),
            tracked_events: self.sessions.values().map(HashMap::len).sum(),
            total_resends: self.total_resends,
        }
    }
}

/// Statistics about replay activity
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReplayStatistics {
    pub tracked_sessions: usize,
    pub tracked_events: usize,
    /// Events re-published since the tracker was created
    pub total_resends: u64,
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use flowsession_core::{SessionInit, SessionPayload};
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct ManualClock(Arc<AtomicU64>);

    impl ManualClock {
        fn advance(&self, millis: u64) {
            self.0.fetch_add(millis, Ordering::SeqCst);
        }
    }

    impl TimeSource for ManualClock {
        fn now(&self) -> Timestamp {
            Timestamp::new(self.0.load(Ordering::SeqCst))
        }
    }

    fn state_with_undelivered(seqs: &[u64]) -> SessionState {
        let session_id = SessionId::from_u128(5);
        let mut state =
            SessionState::new_initiator(session_id, SessionInit::new("test", 1), Timestamp::new(0));
        for seq in seqs {
            let payload = SessionPayload::data(vec![1]);
            let mut event = SessionEvent::outbound(session_id, payload, Timestamp::new(0));
            event.sequence_num = Some(*seq);
            state.send_state.undelivered.push(event);
        }
        state.send_state.last_sent_seq = seqs.iter().copied().max().unwrap_or(0);
        state
    }

    #[test]
    fn test_resend_waits_for_backoff() {
        let config = SessionConfig::testing();
        let clock = ManualClock::default();
        let mut tracker = ReplayTracker::new(config.clone(), clock.clone());
        let state = state_with_undelivered(&[1, 2]);
        tracker.sync(&state);

        let candidates = state.send_state.undelivered.clone();
        assert_eq!(tracker.poll(state.session_id, candidates.clone()), ReplayDecision::Idle);

        clock.advance(config.resend_delay(0).as_millis() as u64);
        match tracker.poll(state.session_id, candidates.clone()) {
            ReplayDecision::Resend(events) => assert_eq!(events.len(), 2),
            other => panic!("expected resend, got {:?}", other),
        }

        // The second resend backs off further
        clock.advance(config.resend_delay(0).as_millis() as u64);
        assert_eq!(tracker.poll(state.session_id, candidates), ReplayDecision::Idle);
        assert_eq!(tracker.statistics().total_resends, 2);
    }

    #[test]
    fn test_exhaustion_after_max_attempts() {
        let config = SessionConfig::testing();
        let clock = ManualClock::default();
        let mut tracker = ReplayTracker::new(config.clone(), clock.clone());
        let state = state_with_undelivered(&[1]);
        tracker.sync(&state);
        let candidates = state.send_state.undelivered.clone();

        for attempt in 0..config.max_resend_attempts {
            clock.advance(config.resend_delay(attempt).as_millis() as u64);
            assert!(matches!(
                tracker.poll(state.session_id, candidates.clone()),
                ReplayDecision::Resend(_)
            ));
        }

        clock.advance(config.max_resend_delay.as_millis() as u64);
        assert_eq!(
            tracker.poll(state.session_id, candidates),
            ReplayDecision::Exhausted {
                sequence_num: 1,
                attempts: config.max_resend_attempts,
            }
        );
    }

    #[test]
    fn test_exhaustion_leaves_other_entries_untouched() {
        let config = SessionConfig::testing();
        let clock = ManualClock::default();
        let mut tracker = ReplayTracker::new(config.clone(), clock.clone());
        let state = state_with_undelivered(&[1, 2]);
        tracker.sync(&state);
        let first = state.send_state.undelivered[0].clone();
        let second = state.send_state.undelivered[1].clone();

        // Only seq 2 is offered until it runs out of resends
        for attempt in 0..config.max_resend_attempts {
            clock.advance(config.resend_delay(attempt).as_millis() as u64);
            assert!(matches!(
                tracker.poll(state.session_id, vec![second.clone()]),
                ReplayDecision::Resend(_)
            ));
        }
        clock.advance(config.max_resend_delay.as_millis() as u64);

        let both = vec![first.clone(), second];
        assert!(matches!(
            tracker.poll(state.session_id, both),
            ReplayDecision::Exhausted { sequence_num: 2, .. }
        ));
        assert_eq!(
            tracker.statistics().total_resends,
            u64::from(config.max_resend_attempts)
        );

        // Seq 1 was not charged a resend by the exhausted pass
        assert_eq!(
            tracker.poll(state.session_id, vec![first.clone()]),
            ReplayDecision::Resend(vec![first])
        );
    }

    #[test]
    fn test_sync_forgets_acknowledged_events() {
        let clock = ManualClock::default();
        let mut tracker = ReplayTracker::new(SessionConfig::testing(), clock);
        let mut state = state_with_undelivered(&[1, 2, 3]);
        tracker.sync(&state);
        assert_eq!(tracker.statistics().tracked_events, 3);

        state.send_state.apply_ack(2, &[]);
        tracker.sync(&state);
        assert_eq!(tracker.statistics().tracked_events, 1);

        state.send_state.apply_ack(3, &[]);
        tracker.sync(&state);
        assert!(!tracker.is_tracking(&state.session_id));
    }
}
