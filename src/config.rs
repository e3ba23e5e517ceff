//! Process and broadcaster configuration

use std::env;
use std::time::Duration;

use crate::error::ConfigError;

/// Default HTTP listening port
pub const DEFAULT_PORT: u16 = 8080;

/// Environment variable overriding the listening port
pub const PORT_ENV: &str = "HTTP_PORT";

/// Tuning knobs for the [`Broadcaster`](crate::broadcast::Broadcaster)
#[derive(Clone, Debug)]
pub struct BroadcasterConfig {
    /// How long one delivery task waits for a subscriber's sink
    pub delivery_timeout: Duration,
    /// How long `publish` waits for the loop to accept an event
    pub publish_timeout: Duration,
    /// How long `register` waits for the loop; `None` waits forever
    pub register_timeout: Option<Duration>,
    /// Capacity of the register and publish request queues
    pub queue_capacity: usize,
}

impl Default for BroadcasterConfig {
    fn default() -> Self {
        Self {
            delivery_timeout: Duration::from_secs(1),
            publish_timeout: Duration::from_secs(1),
            register_timeout: Some(Duration::from_secs(5)),
            queue_capacity: 1,
        }
    }
}

/// Server configuration
#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub broadcaster: BroadcasterConfig,
    /// Interval between graphql-ws `ka` frames
    pub keep_alive: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            broadcaster: BroadcasterConfig::default(),
            keep_alive: Duration::from_secs(20),
        }
    }
}

impl Config {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_port_var(env::var(PORT_ENV).ok())
    }

    fn from_port_var(port: Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        match port {
            Some(value) if !value.is_empty() => {
                config.port = value.parse().map_err(|e: std::num::ParseIntError| {
                    ConfigError::InvalidPort {
                        value: value.clone(),
                        reason: e.to_string(),
                    }
                })?;
            }
            _ => {}
        }
        Ok(config)
    }
}
