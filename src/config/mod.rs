//! Configuration management for the coordination client.
//!
//! Provides hierarchical configuration loading and validation with:
//! - Default values as code base
//! - Environment variable overrides
//! - Configuration file support
//! - Component-wise validation
mod client;
mod path;
mod reservation;
mod retry;
pub use client::*;
pub use path::*;
pub use reservation::*;
pub use retry::*;
use std::env;

use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::Result;

/// Main configuration container for the coordination client
///
/// Combines all subsystem configurations with hierarchical override support:
/// 1. Default values from code implementation
/// 2. Configuration file specified by `CONFIG_PATH`
/// 3. Environment variables (highest priority)
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct CoordConfig {
    /// Where coordination entities live in the store namespace
    #[serde(default)]
    pub path: PathConfig,
    /// Acquisition wait and polling parameters
    #[serde(default)]
    pub reservation: ReservationConfig,
    /// Retry policies for store mutations
    #[serde(default)]
    pub retry: RetryPolicies,
    /// Client identity and event delivery
    #[serde(default)]
    pub client: ClientConfig,
}

impl CoordConfig {
    /// Loads configuration from hierarchical sources without validation.
    ///
    /// Configuration sources are merged in the following order (later sources override earlier):
    /// 1. Type defaults (lowest priority)
    /// 2. Configuration file from `CONFIG_PATH` environment variable (if set)
    /// 3. Environment variables with `COORD__` prefix (highest priority)
    ///
    /// Callers must call `validate()` before using the configuration.
    ///
    /// # Examples
    /// ```ignore
    /// std::env::set_var("COORD__RESERVATION__POLL_CEILING_MS", "5000");
    /// let cfg = CoordConfig::new()?.validate()?;
    /// ```
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var("CONFIG_PATH") {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix("COORD")
                .separator("__")
                .ignore_empty(true)
                .try_parsing(true),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Applies additional configuration overrides from file without validation.
    ///
    /// Merging order (later sources override earlier):
    /// 1. Current configuration values
    /// 2. New configuration file
    /// 3. Latest environment variables (highest priority)
    pub fn with_override_config(
        &self,
        path: &str,
    ) -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(Config::try_from(self)?)
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("COORD")
                    .separator("__")
                    .ignore_empty(true)
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Validates configuration and returns validated instance.
    ///
    /// # Errors
    /// Returns validation errors from any subsystem:
    /// - Malformed base path
    /// - Zero poll ceiling or out-of-range default wait
    /// - Retry policies with a zero attempt timeout
    pub fn validate(self) -> Result<Self> {
        self.path.validate()?;
        self.reservation.validate()?;
        self.retry.validate()?;
        self.client.validate()?;
        Ok(self)
    }
}
