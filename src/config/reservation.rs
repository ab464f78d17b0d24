use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::constants::DEFAULT_POLL_CEILING_MS;
use crate::constants::WAIT_FOREVER_MS;
use crate::Error;
use crate::Result;

/// Acquisition tuning.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ReservationConfig {
    /// Longest single wait between re-evaluations of a reservation queue.
    ///
    /// Default: 15000
    #[serde(default = "default_poll_ceiling_ms")]
    pub poll_ceiling_ms: u64,

    /// Wait timeout used by handle operations that take none explicitly
    /// (`lock`, `acquire`). `-1` waits without limit.
    ///
    /// Default: -1
    #[serde(default = "default_wait_timeout_ms")]
    pub default_wait_timeout_ms: i64,
}

impl Default for ReservationConfig {
    fn default() -> Self {
        Self {
            poll_ceiling_ms: default_poll_ceiling_ms(),
            default_wait_timeout_ms: default_wait_timeout_ms(),
        }
    }
}

fn default_poll_ceiling_ms() -> u64 {
    DEFAULT_POLL_CEILING_MS
}

fn default_wait_timeout_ms() -> i64 {
    WAIT_FOREVER_MS
}

impl ReservationConfig {
    pub fn validate(&self) -> Result<()> {
        if self.poll_ceiling_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "poll_ceiling_ms must be greater than 0".into(),
            )));
        }

        if self.default_wait_timeout_ms < WAIT_FOREVER_MS {
            return Err(Error::Config(ConfigError::Message(format!(
                "default_wait_timeout_ms must be -1 or >= 0, got {}",
                self.default_wait_timeout_ms
            ))));
        }

        Ok(())
    }
}
