//! Engine configuration.

use std::time::Duration;

use chronicle_core::{ChronicleError, ChronicleResult};
use serde::{Deserialize, Serialize};

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Name for logging
    pub name: String,
    /// Capacity of one routing or sending buffer, in payload bytes
    pub max_payload_size: usize,
    /// Publish attempts per event before the output failure is reported
    pub output_max_attempts: u32,
    /// Commands handled per duty cycle
    pub commands_per_cycle: usize,
    /// Events applied per duty cycle
    pub events_per_cycle: usize,
    /// Transport messages received per duty cycle
    pub messages_per_cycle: usize,
    /// Sleep of a spawned engine after a cycle with no work, in microseconds
    pub idle_sleep_micros: u64,
    /// Capacity of the loopback transport used when no transport is configured
    pub loopback_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            name: "chronicle-engine".to_string(),
            max_payload_size: 64 * 1024,
            output_max_attempts: 3,
            commands_per_cycle: 16,
            events_per_cycle: 64,
            messages_per_cycle: 16,
            idle_sleep_micros: 1_000,
            loopback_capacity: 1024,
        }
    }
}

impl EngineConfig {
    /// Parse a JSON document; missing fields take their defaults.
    pub fn from_json(json: &str) -> ChronicleResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| ChronicleError::config(format!("invalid engine config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> ChronicleResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| ChronicleError::config(e.to_string()))
    }

    /// Reject limits that would stall the engine.
    pub fn validate(&self) -> ChronicleResult<()> {
        let limits = [
            ("max_payload_size", self.max_payload_size),
            ("output_max_attempts", self.output_max_attempts as usize),
            ("commands_per_cycle", self.commands_per_cycle),
            ("events_per_cycle", self.events_per_cycle),
            ("messages_per_cycle", self.messages_per_cycle),
            ("loopback_capacity", self.loopback_capacity),
        ];
        for (field, value) in limits {
            if value == 0 {
                return Err(ChronicleError::config(format!("{field} must be greater than zero")));
            }
        }
        if self.max_payload_size > u32::MAX as usize {
            return Err(ChronicleError::config("max_payload_size does not fit the record header"));
        }
        Ok(())
    }

    pub fn idle_sleep(&self) -> Duration {
        Duration::from_micros(self.idle_sleep_micros)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_max_payload_size(mut self, max: usize) -> Self {
        self.max_payload_size = max;
        self
    }

    pub fn with_output_max_attempts(mut self, attempts: u32) -> Self {
        self.output_max_attempts = attempts;
        self
    }

    pub fn with_commands_per_cycle(mut self, limit: usize) -> Self {
        self.commands_per_cycle = limit;
        self
    }

    pub fn with_events_per_cycle(mut self, limit: usize) -> Self {
        self.events_per_cycle = limit;
        self
    }

    pub fn with_messages_per_cycle(mut self, limit: usize) -> Self {
        self.messages_per_cycle = limit;
        self
    }

    pub fn with_loopback_capacity(mut self, capacity: usize) -> Self {
        self.loopback_capacity = capacity;
        self
    }

    pub fn with_idle_sleep(mut self, sleep: Duration) -> Self {
        self.idle_sleep_micros = sleep.as_micros().min(u64::MAX as u128) as u64;
        self
    }
}
