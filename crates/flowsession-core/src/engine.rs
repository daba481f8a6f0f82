//! Session protocol engine
//!
//! The facade a driver calls once per event. It owns nothing but the
//! dispatcher and the configuration; state comes in and goes out with every
//! call.

use crate::config::SessionConfig;
use crate::dispatcher::SessionEventDispatcher;
use crate::event::SessionEvent;
use crate::replay;
use crate::state::SessionState;
use crate::transition::SessionTransition;
use crate::types::Timestamp;
use crate::{debug, Result};

pub struct SessionProtocolEngine {
    dispatcher: SessionEventDispatcher,
    config: SessionConfig,
}

impl SessionProtocolEngine {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            dispatcher: SessionEventDispatcher::new(&config),
            config,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &SessionEventDispatcher {
        &self.dispatcher
    }

    /// Apply an event received from the transport
    pub fn handle_inbound(
        &self,
        state: Option<SessionState>,
        event: SessionEvent,
        now: Timestamp,
    ) -> Result<SessionTransition> {
        let processor = self.dispatcher.process_inbound(state, event, now)?;
        debug!("Running {}", processor.name());
        processor.execute()
    }

    /// Apply an event the flow engine wants to send
    pub fn handle_outbound(
        &self,
        state: Option<SessionState>,
        event: SessionEvent,
        now: Timestamp,
    ) -> Result<SessionTransition> {
        let max_msg_size = self.config.max_message_size;
        let processor = self
            .dispatcher
            .process_outbound(state, event, now, max_msg_size)?;
        debug!("Running {}", processor.name());
        processor.execute()
    }

    /// Undelivered events to re-publish, unchanged apart from their acks
    pub fn replay(&self, state: &SessionState) -> Vec<SessionEvent> {
        replay::pending_replay(state)
    }
}

impl Default for SessionProtocolEngine {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}
