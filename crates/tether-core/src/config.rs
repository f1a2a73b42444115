//! Runtime configuration
//!
//! A `tether.toml` file has one optional table per component:
//!
//! ```toml
//! [registry]
//! strategy = "atomic"
//! max_handles = 65536
//!
//! [queue]
//! limit = 0          # <0 fixed, 0 unbounded, >0 bounded
//! min_capacity = 16
//!
//! [scheduler]
//! thread_name = "tether-timer"
//!
//! [pool]
//! max_threads = 4
//! idle_timeout_ms = 5000
//! ```
//!
//! Missing tables and keys take their defaults.

use crate::handle::RegistryOptions;
use crate::pool::PoolOptions;
use crate::queue::{QueueLimit, QueueOptions};
use crate::timer::SchedulerOptions;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse TOML
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Options for every runtime component
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Handle registry
    pub registry: RegistryOptions,
    /// Standalone queues
    pub queue: QueueOptions,
    /// Task scheduler
    pub scheduler: SchedulerOptions,
    /// Default thread pool
    pub pool: PoolOptions,
}

impl RuntimeConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse configuration from a TOML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let config: RuntimeConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        let registry = &self.registry;
        if registry.max_handles == 0 {
            return Err(invalid("registry.max_handles must be positive"));
        }
        if registry.max_handles > isize::MAX as usize {
            return Err(invalid(format!(
                "registry.max_handles {} exceeds the addressable range",
                registry.max_handles
            )));
        }
        check_capacity("registry.initial_capacity", registry.initial_capacity)?;

        check_capacity("queue.min_capacity", self.queue.min_capacity)?;
        if let QueueLimit::Bounded(n) = self.queue.limit {
            if n.checked_next_power_of_two().is_none() {
                return Err(invalid(format!("queue.limit {} is too large", n)));
            }
        }

        check_capacity("scheduler.min_capacity", self.scheduler.min_capacity)?;
        if self.scheduler.thread_name.is_empty() {
            return Err(invalid("scheduler.thread_name cannot be empty"));
        }

        if self.pool.max_threads == 0 {
            return Err(invalid("pool.max_threads must be positive"));
        }
        if self.pool.idle_timeout_ms == 0 {
            return Err(invalid("pool.idle_timeout_ms must be positive"));
        }
        if self.pool.thread_name.is_empty() {
            return Err(invalid("pool.thread_name cannot be empty"));
        }
        if let Some(size) = self.pool.stack_size {
            if size < 16 * 1024 {
                return Err(invalid(format!("pool.stack_size {} is below 16 KiB", size)));
            }
        }

        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(message.into())
}

fn check_capacity(field: &str, value: usize) -> Result<(), ConfigError> {
    if value == 0 || !value.is_power_of_two() {
        return Err(invalid(format!(
            "{} must be a positive power of two, got {}",
            field, value
        )));
    }
    Ok(())
}
