use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Basic retry policy template
#[derive(Debug, Serialize, Deserialize, Clone, Copy)]
pub struct BackoffPolicy {
    /// Maximum number of attempts (0 is treated as a single attempt)
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    /// Single operation timeout (unit: milliseconds)
    #[serde(default = "default_op_timeout_ms")]
    pub timeout_ms: u64,

    /// Backoff base (unit: milliseconds)
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Maximum backoff time (unit: milliseconds)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            timeout_ms: default_op_timeout_ms(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl BackoffPolicy {
    fn validate(
        &self,
        name: &str,
    ) -> Result<()> {
        if self.timeout_ms == 0 {
            return Err(Error::Config(ConfigError::Message(format!(
                "retry.{name}.timeout_ms must be greater than 0"
            ))));
        }
        if self.base_delay_ms > self.max_delay_ms {
            return Err(Error::Config(ConfigError::Message(format!(
                "retry.{name}.base_delay_ms ({}) exceeds max_delay_ms ({})",
                self.base_delay_ms, self.max_delay_ms
            ))));
        }
        Ok(())
    }
}

/// Divide strategies by store operation
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RetryPolicies {
    // Reservation node deletion (must eventually succeed)
    #[serde(default = "default_relinquish")]
    pub relinquish: BackoffPolicy,

    // Entity path creation and permit pool configuration
    #[serde(default)]
    pub setup: BackoffPolicy,
}

impl Default for RetryPolicies {
    fn default() -> Self {
        Self {
            relinquish: default_relinquish(),
            setup: BackoffPolicy::default(),
        }
    }
}

impl RetryPolicies {
    pub fn validate(&self) -> Result<()> {
        self.relinquish.validate("relinquish")?;
        self.setup.validate("setup")?;
        Ok(())
    }
}

fn default_relinquish() -> BackoffPolicy {
    BackoffPolicy {
        max_retries: 10,
        timeout_ms: 3000,
        base_delay_ms: 50,
        max_delay_ms: 2000,
    }
}
fn default_max_retries() -> usize {
    3
}
fn default_op_timeout_ms() -> u64 {
    3000
}
fn default_base_delay_ms() -> u64 {
    50
}
fn default_max_delay_ms() -> u64 {
    1000
}
