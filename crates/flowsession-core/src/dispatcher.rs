//! Session event dispatcher
//!
//! Maps (direction, payload kind) to a processor constructor. The table is
//! built once, explicitly, when the dispatcher is created.

use hashbrown::HashMap;

use crate::chunking::ChunkCodec;
use crate::config::SessionConfig;
use crate::event::{Direction, PayloadKind, SessionEvent};
use crate::processor::ack::InboundAckProcessor;
use crate::processor::close::{InboundCloseProcessor, OutboundCloseProcessor};
use crate::processor::counterparty::{
    InboundCounterpartyProcessor, OutboundCounterpartyRequestProcessor,
    OutboundCounterpartyResponseProcessor,
};
use crate::processor::data::{InboundDataProcessor, OutboundDataProcessor};
use crate::processor::error::{InboundErrorProcessor, OutboundErrorProcessor};
use crate::processor::init::{InboundInitProcessor, OutboundInitProcessor};
use crate::processor::{ProcessorContext, SessionEventProcessor};
use crate::state::SessionState;
use crate::types::Timestamp;
use crate::{FlowSessionError, Result};

/// Constructor stored in the dispatch table
pub type ProcessorFactory = fn(ProcessorContext) -> Box<dyn SessionEventProcessor>;

fn boxed<P: SessionEventProcessor + 'static>(processor: P) -> Box<dyn SessionEventProcessor> {
    Box::new(processor)
}

/// Selects the processor for each event
pub struct SessionEventDispatcher {
    table: HashMap<(Direction, PayloadKind), ProcessorFactory>,
    max_buffered_events: usize,
}

impl SessionEventDispatcher {
    pub fn new(config: &SessionConfig) -> Self {
        let mut table: HashMap<(Direction, PayloadKind), ProcessorFactory> = HashMap::new();

        table.insert((Direction::Inbound, PayloadKind::Init), |ctx| {
            boxed(InboundInitProcessor::new(ctx))
        });
        table.insert((Direction::Inbound, PayloadKind::Data), |ctx| {
            boxed(InboundDataProcessor::new(ctx))
        });
        table.insert((Direction::Inbound, PayloadKind::Close), |ctx| {
            boxed(InboundCloseProcessor::new(ctx))
        });
        table.insert((Direction::Inbound, PayloadKind::Error), |ctx| {
            boxed(InboundErrorProcessor::new(ctx))
        });
        table.insert((Direction::Inbound, PayloadKind::CounterpartyInfoRequest), |ctx| {
            boxed(InboundCounterpartyProcessor::new(ctx))
        });
        table.insert((Direction::Inbound, PayloadKind::CounterpartyInfoResponse), |ctx| {
            boxed(InboundCounterpartyProcessor::new(ctx))
        });
        table.insert((Direction::Inbound, PayloadKind::Ack), |ctx| {
            boxed(InboundAckProcessor::new(ctx))
        });

        table.insert((Direction::Outbound, PayloadKind::Init), |ctx| {
            boxed(OutboundInitProcessor::new(ctx))
        });
        table.insert((Direction::Outbound, PayloadKind::Data), |ctx| {
            boxed(OutboundDataProcessor::new(ctx))
        });
        table.insert((Direction::Outbound, PayloadKind::Close), |ctx| {
            boxed(OutboundCloseProcessor::new(ctx))
        });
        table.insert((Direction::Outbound, PayloadKind::Error), |ctx| {
            boxed(OutboundErrorProcessor::new(ctx))
        });
        table.insert((Direction::Outbound, PayloadKind::CounterpartyInfoRequest), |ctx| {
            boxed(OutboundCounterpartyRequestProcessor::new(ctx))
        });
        table.insert((Direction::Outbound, PayloadKind::CounterpartyInfoResponse), |ctx| {
            boxed(OutboundCounterpartyResponseProcessor::new(ctx))
        });

        Self {
            table,
            max_buffered_events: config.max_buffered_events,
        }
    }

    /// Whether a processor is registered for this pair
    pub fn supports(&self, direction: Direction, kind: PayloadKind) -> bool {
        self.table.contains_key(&(direction, kind))
    }

    /// Select the processor for an inbound event
    pub fn process_inbound(
        &self,
        state: Option<SessionState>,
        event: SessionEvent,
        now: Timestamp,
    ) -> Result<Box<dyn SessionEventProcessor>> {
        self.select(Direction::Inbound, state, event, now, None)
    }

    /// Select the processor for an outbound event
    ///
    /// Data events get a chunk codec sized to `max_msg_size`; zero is rejected.
    pub fn process_outbound(
        &self,
        state: Option<SessionState>,
        event: SessionEvent,
        now: Timestamp,
        max_msg_size: usize,
    ) -> Result<Box<dyn SessionEventProcessor>> {
        let codec = match event.kind() {
            PayloadKind::Data if event.direction == Direction::Outbound => {
                Some(ChunkCodec::new(max_msg_size)?)
            }
            _ => None,
        };
        self.select(Direction::Outbound, state, event, now, codec)
    }

    fn select(
        &self,
        expected: Direction,
        state: Option<SessionState>,
        event: SessionEvent,
        now: Timestamp,
        codec: Option<ChunkCodec>,
    ) -> Result<Box<dyn SessionEventProcessor>> {
        if event.direction != expected {
            return Err(FlowSessionError::DirectionMismatch {
                expected,
                actual: event.direction,
            });
        }

        let kind = event.kind();
        let factory = self.table.get(&(expected, kind)).ok_or(
            FlowSessionError::UnsupportedPayloadKind {
                direction: expected,
                kind,
            },
        )?;

        Ok(factory(ProcessorContext {
            state,
            event,
            now,
            max_buffered_events: self.max_buffered_events,
            codec,
        }))
    }
}
