//! Session configuration

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::command::{SetpointKind, Setpoints, SharedSetpoints};
use crate::crypto::DeviceToken;
use crate::error::{KettleError, Result};

/// Accepted poll interval range in seconds
pub const POLL_INTERVAL_RANGE: (u64, u64) = (10, 300);

// ----------------------------------------------------------------------------
// Configuration
// ----------------------------------------------------------------------------

/// Configuration for one kettle session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KettleConfig {
    /// Pre-shared device token, hex encoded
    pub device_token: String,
    /// BLE interfaces tried in order; empty means the first adapter found
    pub adapters: Vec<String>,
    /// Seconds between status polls
    pub poll_interval_secs: u64,
    /// Initial heat setpoint in °C
    pub heat_temperature: u8,
    /// Initial warm setpoint in °C
    pub warm_temperature: u8,
    /// Maximum time to wait for a connection
    pub connection_timeout_secs: u64,
    /// Maximum time to wait for a single notification
    pub notification_timeout_ms: u64,
    /// Upper bound of the reconnect backoff
    pub max_backoff_secs: u64,
}

impl Default for KettleConfig {
    fn default() -> Self {
        Self {
            device_token: String::new(),
            adapters: Vec::new(),
            poll_interval_secs: 30,
            heat_temperature: SetpointKind::Heat.default_temperature(),
            warm_temperature: SetpointKind::Warm.default_temperature(),
            connection_timeout_secs: 30,
            notification_timeout_ms: 5000,
            max_backoff_secs: 60,
        }
    }
}

impl KettleConfig {
    pub fn new(device_token: impl Into<String>) -> Self {
        Self {
            device_token: device_token.into(),
            ..Self::default()
        }
    }

    /// Parse a TOML document; missing fields take their defaults
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| KettleError::InvalidConfiguration {
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text =
            std::fs::read_to_string(path).map_err(|e| KettleError::InvalidConfiguration {
                reason: format!("cannot read {}: {e}", path.display()),
            })?;
        Self::from_toml_str(&text)
    }

    /// Check every field against its accepted range
    pub fn validate(&self) -> Result<()> {
        self.device_token()?;

        let (min, max) = POLL_INTERVAL_RANGE;
        if !(min..=max).contains(&self.poll_interval_secs) {
            return Err(invalid(format!(
                "poll_interval_secs {} outside {min}..={max}",
                self.poll_interval_secs
            )));
        }
        SetpointKind::Heat.validate(i64::from(self.heat_temperature))?;
        SetpointKind::Warm.validate(i64::from(self.warm_temperature))?;

        if self.connection_timeout_secs == 0 {
            return Err(invalid("connection_timeout_secs must be positive".into()));
        }
        if self.notification_timeout_ms == 0 {
            return Err(invalid("notification_timeout_ms must be positive".into()));
        }
        if self.max_backoff_secs == 0 {
            return Err(invalid("max_backoff_secs must be at least 1".into()));
        }
        Ok(())
    }

    /// Decoded pre-shared key
    pub fn device_token(&self) -> Result<DeviceToken> {
        DeviceToken::from_hex(&self.device_token)
    }

    pub fn setpoints(&self) -> Setpoints {
        Setpoints {
            heat: self.heat_temperature,
            warm: self.warm_temperature,
        }
    }

    /// Setpoint handle seeded from this configuration
    pub fn shared_setpoints(&self) -> SharedSetpoints {
        SharedSetpoints::new(self.setpoints())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }

    pub fn notification_timeout(&self) -> Duration {
        Duration::from_millis(self.notification_timeout_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_secs)
    }

    pub fn with_adapters(mut self, adapters: Vec<String>) -> Self {
        self.adapters = adapters;
        self
    }

    pub fn with_poll_interval_secs(mut self, secs: u64) -> Self {
        self.poll_interval_secs = secs;
        self
    }

    pub fn with_heat_temperature(mut self, temperature: u8) -> Self {
        self.heat_temperature = temperature;
        self
    }

    pub fn with_warm_temperature(mut self, temperature: u8) -> Self {
        self.warm_temperature = temperature;
        self
    }

    pub fn with_connection_timeout_secs(mut self, secs: u64) -> Self {
        self.connection_timeout_secs = secs;
        self
    }

    pub fn with_notification_timeout_ms(mut self, millis: u64) -> Self {
        self.notification_timeout_ms = millis;
        self
    }

    pub fn with_max_backoff_secs(mut self, secs: u64) -> Self {
        self.max_backoff_secs = secs;
        self
    }
}

fn invalid(reason: String) -> KettleError {
    KettleError::InvalidConfiguration { reason }
}
