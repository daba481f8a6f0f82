//! Session task
//!
//! An async loop that owns one `SessionDriver` and serializes everything that
//! touches it: flow commands, bus deliveries and replay ticks are handled one
//! at a time, which is the single-writer guarantee the engine relies on.

use core::time::Duration;

use flowsession_core::{ChannelConfig, TimeSource};
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::channels::{
    create_command_channel, create_inbound_channel, create_notification_channel,
    create_outbound_channel, BusReceiver, BusSender, CommandReceiver, CommandSender, FlowCommand,
    NotificationReceiver, NotificationSender,
};
use crate::driver::{DriverOutput, SessionDriver};
use crate::error::{RuntimeError, RuntimeResult};

/// Endpoints of a session task for the flow engine and the message bus
pub struct SessionTaskHandle {
    /// Flow engine → task
    pub commands: CommandSender,
    /// Message bus → task
    pub inbound: BusSender,
    /// Task → message bus
    pub outbound: BusReceiver,
    /// Task → flow engine
    pub notifications: NotificationReceiver,
}

pub struct SessionTask<T: TimeSource + Clone> {
    driver: SessionDriver<T>,
    command_receiver: CommandReceiver,
    inbound_receiver: BusReceiver,
    outbound_sender: BusSender,
    notification_sender: NotificationSender,
    replay_interval: Duration,
    running: bool,
}

impl<T: TimeSource + Clone> SessionTask<T> {
    /// Create a task around a driver together with the handle to talk to it
    pub fn new(
        driver: SessionDriver<T>,
        channels: &ChannelConfig,
        replay_interval: Duration,
    ) -> (Self, SessionTaskHandle) {
        let (commands, command_receiver) = create_command_channel(channels);
        let (inbound, inbound_receiver) = create_inbound_channel(channels);
        let (outbound_sender, outbound) = create_outbound_channel(channels);
        let (notification_sender, notifications) = create_notification_channel(channels);

        let task = Self {
            driver,
            command_receiver,
            inbound_receiver,
            outbound_sender,
            notification_sender,
            replay_interval,
            running: true,
        };
        let handle = SessionTaskHandle {
            commands,
            inbound,
            outbound,
            notifications,
        };
        (task, handle)
    }

    /// Run until shut down or until one of the input channels closes
    pub async fn run(mut self) -> RuntimeResult<()> {
        info!("Session task starting");
        let mut replay_tick = tokio::time::interval(self.replay_interval);
        replay_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while self.running {
            tokio::select! {
                command = self.command_receiver.recv() => {
                    match command {
                        Some(cmd) => {
                            let result = self.process_command(cmd);
                            self.dispatch(result).await?;
                        }
                        None => {
                            info!("Command channel closed, shutting down");
                            break;
                        }
                    }
                }

                event = self.inbound_receiver.recv() => {
                    match event {
                        Some(evt) => {
                            let result = self.driver.on_inbound(evt);
                            self.dispatch(result).await?;
                        }
                        None => {
                            info!("Inbound channel closed, shutting down");
                            break;
                        }
                    }
                }

                _ = replay_tick.tick() => {
                    let result = self.driver.poll_replay();
                    self.dispatch(result).await?;
                }
            }
        }

        info!("Session task stopped");
        Ok(())
    }

    fn process_command(&mut self, command: FlowCommand) -> RuntimeResult<DriverOutput> {
        match command {
            FlowCommand::Initiate {
                session_id,
                counterparty,
            } => self.driver.initiate(session_id, &counterparty),
            FlowCommand::Send {
                session_id,
                payload,
            } => self.driver.send(session_id, payload),
            FlowCommand::Close { session_id } => self.driver.close(session_id),
            FlowCommand::Fail {
                session_id,
                kind,
                message,
            } => self.driver.fail(session_id, &kind, &message),
            FlowCommand::RequestCounterpartyInfo { session_id } => {
                self.driver.request_counterparty_info(session_id)
            }
            FlowCommand::Shutdown => {
                info!("Shutdown requested");
                self.running = false;
                Ok(DriverOutput::default())
            }
        }
    }

    /// Perform the effects of a driver call; only fatal errors end the loop
    async fn dispatch(&mut self, result: RuntimeResult<DriverOutput>) -> RuntimeResult<()> {
        match result {
            Ok(output) => self.publish(output).await,
            Err(e) if e.is_fatal() => {
                error!("Unrecoverable error, shutting down session task: {}", e);
                Err(e)
            }
            Err(e) => {
                warn!("Dropping request: {}", e);
                Ok(())
            }
        }
    }

    async fn publish(&self, output: DriverOutput) -> RuntimeResult<()> {
        for event in output.outbound {
            self.outbound_sender
                .send(event)
                .await
                .map_err(|_| RuntimeError::ChannelClosed { channel: "outbound" })?;
        }
        for notification in output.notifications {
            self.notification_sender
                .send(notification)
                .await
                .map_err(|_| RuntimeError::ChannelClosed {
                    channel: "notification",
                })?;
        }
        Ok(())
    }
}
