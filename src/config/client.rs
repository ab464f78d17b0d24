use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::constants::EVENT_CHANNEL_CAPACITY;
use crate::Error;
use crate::Result;

/// Client identity and event fan-out settings.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ClientConfig {
    /// Owner id written into every reservation node. Empty means a random
    /// id is generated when the client is built.
    #[serde(default)]
    pub owner_id: String,

    /// Buffered [`crate::ReservationEvent`]s per subscriber before lagging
    /// subscribers start missing events.
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            owner_id: String::new(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

fn default_event_channel_capacity() -> usize {
    EVENT_CHANNEL_CAPACITY
}

impl ClientConfig {
    pub fn validate(&self) -> Result<()> {
        if self.event_channel_capacity == 0 {
            return Err(Error::Config(ConfigError::Message(
                "event_channel_capacity must be greater than 0".into(),
            )));
        }
        if self.owner_id.contains('/') {
            return Err(Error::Config(ConfigError::Message(format!(
                "owner_id must not contain '/', got {:?}",
                self.owner_id
            ))));
        }
        Ok(())
    }
}
