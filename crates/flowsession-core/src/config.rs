//! Centralized Configuration Management
//!
//! Protocol limits, replay pacing and runtime channel sizes in one place, with
//! presets for common deployments and a validating builder.

use core::time::Duration;
use serde::{Deserialize, Serialize};

use crate::errors::{FlowSessionError, Result};

// ----------------------------------------------------------------------------
// Session Configuration
// ----------------------------------------------------------------------------

/// Protocol limits and replay pacing for sessions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Largest data payload sent as a single event; larger payloads are chunked
    pub max_message_size: usize,
    /// Upper bound on events held in the receive gap buffer
    pub max_buffered_events: usize,
    /// Delay before the first resend of an unacknowledged event
    pub initial_resend_delay: Duration,
    /// Cap for the exponential resend backoff
    pub max_resend_delay: Duration,
    /// Exponential backoff multiplier
    pub resend_backoff_multiplier: f32,
    /// Resends of one event before the session is failed locally
    pub max_resend_attempts: u32,
    /// How long a closed or errored session lingers to re-acknowledge redeliveries
    pub closed_session_retention: Duration,
    /// Maximum time without inbound traffic before a session is dropped
    pub idle_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_message_size: 1024 * 1024, // 1 MiB
            max_buffered_events: 1024,
            initial_resend_delay: Duration::from_millis(500),
            max_resend_delay: Duration::from_secs(30),
            resend_backoff_multiplier: 2.0,
            max_resend_attempts: 8,
            closed_session_retention: Duration::from_secs(120),
            idle_timeout: Duration::from_secs(600), // 10 minutes
        }
    }
}

impl SessionConfig {
    /// Create configuration for low-latency links
    pub fn low_latency() -> Self {
        Self {
            max_message_size: 64 * 1024,
            max_buffered_events: 256,
            initial_resend_delay: Duration::from_millis(100),
            max_resend_delay: Duration::from_secs(5),
            resend_backoff_multiplier: 1.5,
            max_resend_attempts: 10,
            closed_session_retention: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(120),
        }
    }

    /// Create configuration for bulk transfer
    pub fn high_throughput() -> Self {
        Self {
            max_message_size: 10 * 1024 * 1024,
            max_buffered_events: 8192,
            initial_resend_delay: Duration::from_secs(1),
            max_resend_delay: Duration::from_secs(60),
            resend_backoff_multiplier: 2.0,
            max_resend_attempts: 6,
            closed_session_retention: Duration::from_secs(300),
            idle_timeout: Duration::from_secs(1800),
        }
    }

    /// Create configuration optimized for testing (tiny chunks, fast resends)
    pub fn testing() -> Self {
        Self {
            max_message_size: 16,
            max_buffered_events: 64,
            initial_resend_delay: Duration::from_millis(10),
            max_resend_delay: Duration::from_millis(100),
            resend_backoff_multiplier: 2.0,
            max_resend_attempts: 3,
            closed_session_retention: Duration::from_millis(500),
            idle_timeout: Duration::from_secs(10),
        }
    }

    /// Resend delay after `attempts` previous resends
    pub fn resend_delay(&self, attempts: u32) -> Duration {
        let factor = self.resend_backoff_multiplier.powi(attempts as i32) as f64;
        let millis = self.initial_resend_delay.as_millis() as f64 * factor;
        let capped = millis.min(self.max_resend_delay.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }
}

// ----------------------------------------------------------------------------
// Channel Configuration
// ----------------------------------------------------------------------------

/// Buffer sizes for the runtime channels
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Flow engine -> session task
    pub command_buffer_size: usize,
    /// Message bus -> session task
    pub inbound_buffer_size: usize,
    /// Session task -> message bus
    pub outbound_buffer_size: usize,
    /// Session task -> flow engine
    pub notification_buffer_size: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            command_buffer_size: 32,
            inbound_buffer_size: 128, // Redeliveries arrive in bursts
            outbound_buffer_size: 128,
            notification_buffer_size: 64,
        }
    }
}

impl ChannelConfig {
    /// Create configuration for high-memory environments
    pub fn high_memory() -> Self {
        Self {
            command_buffer_size: 128,
            inbound_buffer_size: 1024,
            outbound_buffer_size: 1024,
            notification_buffer_size: 256,
        }
    }

    /// Create configuration for low-memory environments
    pub fn low_memory() -> Self {
        Self {
            command_buffer_size: 8,
            inbound_buffer_size: 32,
            outbound_buffer_size: 32,
            notification_buffer_size: 16,
        }
    }

    /// Create configuration optimized for testing
    pub fn testing() -> Self {
        Self {
            command_buffer_size: 100,
            inbound_buffer_size: 100,
            outbound_buffer_size: 100,
            notification_buffer_size: 100,
        }
    }
}

// ----------------------------------------------------------------------------
// Master Configuration
// ----------------------------------------------------------------------------

/// Master configuration consolidating protocol and runtime settings
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FlowSessionConfig {
    pub session: SessionConfig,
    pub channels: ChannelConfig,
}

impl FlowSessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new builder
    pub fn builder() -> FlowSessionConfigBuilder {
        FlowSessionConfigBuilder::new()
    }

    pub fn low_latency() -> Self {
        Self {
            session: SessionConfig::low_latency(),
            channels: ChannelConfig::low_memory(),
        }
    }

    pub fn high_throughput() -> Self {
        Self {
            session: SessionConfig::high_throughput(),
            channels: ChannelConfig::high_memory(),
        }
    }

    pub fn testing() -> Self {
        Self {
            session: SessionConfig::testing(),
            channels: ChannelConfig::testing(),
        }
    }

    pub fn with_session(mut self, session: SessionConfig) -> Self {
        self.session = session;
        self
    }

    pub fn with_channels(mut self, channels: ChannelConfig) -> Self {
        self.channels = channels;
        self
    }

    /// Load and validate a configuration from JSON
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| FlowSessionError::config_error(format!("Invalid JSON config: {}", e)))?;
        config.validate().map_err(FlowSessionError::config_error)?;
        Ok(config)
    }

    /// Validate the configuration for consistency and feasibility
    pub fn validate(&self) -> core::result::Result<(), String> {
        let session = &self.session;
        if session.max_message_size == 0 {
            return Err("Max message size cannot be zero".into());
        }
        if session.max_buffered_events == 0 {
            return Err("Max buffered events cannot be zero".into());
        }
        if session.max_resend_attempts == 0 {
            return Err("Max resend attempts cannot be zero".into());
        }
        if session.resend_backoff_multiplier < 1.0 {
            return Err("Resend backoff multiplier must be at least 1.0".into());
        }
        if session.initial_resend_delay.is_zero() {
            return Err("Initial resend delay cannot be zero".into());
        }
        if session.initial_resend_delay > session.max_resend_delay {
            return Err("Initial resend delay cannot be greater than max resend delay".into());
        }

        let channels = &self.channels;
        if channels.command_buffer_size == 0 {
            return Err("Command buffer size cannot be zero".into());
        }
        if channels.inbound_buffer_size == 0 {
            return Err("Inbound buffer size cannot be zero".into());
        }
        if channels.outbound_buffer_size == 0 {
            return Err("Outbound buffer size cannot be zero".into());
        }
        if channels.notification_buffer_size == 0 {
            return Err("Notification buffer size cannot be zero".into());
        }

        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Configuration Builder Pattern
// ----------------------------------------------------------------------------

/// Builder for FlowSessionConfig that validates on build
#[derive(Debug, Clone, Default)]
pub struct FlowSessionConfigBuilder {
    session: Option<SessionConfig>,
    channels: Option<ChannelConfig>,
    max_message_size: Option<usize>,
}

impl FlowSessionConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session(mut self, config: SessionConfig) -> Self {
        self.session = Some(config);
        self
    }

    pub fn channels(mut self, config: ChannelConfig) -> Self {
        self.channels = Some(config);
        self
    }

    /// Override just the chunking threshold
    pub fn max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = Some(size);
        self
    }

    /// Use the testing preset as base (can be further customized)
    pub fn testing(mut self) -> Self {
        self.session = Some(SessionConfig::testing());
        self.channels = Some(ChannelConfig::testing());
        self
    }

    /// Build the configuration with validation
    pub fn build(self) -> Result<FlowSessionConfig> {
        let config = self.build_unchecked();
        config.validate().map_err(FlowSessionError::config_error)?;
        Ok(config)
    }

    /// Build the configuration without validation
    pub fn build_unchecked(self) -> FlowSessionConfig {
        let mut session = self.session.unwrap_or_default();
        if let Some(size) = self.max_message_size {
            session.max_message_size = size;
        }
        FlowSessionConfig {
            session,
            channels: self.channels.unwrap_or_default(),
        }
    }
}
