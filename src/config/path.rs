use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::constants::DEFAULT_BASE_PATH;
use crate::Error;
use crate::Result;

/// Store namespace settings.
///
/// ```toml
/// [path]
/// base_path = "/my-app"
/// ```
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PathConfig {
    /// Absolute path under which `coord/<category>/<name>` entities are
    /// created. Ancestors are created on demand.
    #[serde(default = "default_base_path")]
    pub base_path: String,
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            base_path: default_base_path(),
        }
    }
}

fn default_base_path() -> String {
    DEFAULT_BASE_PATH.to_string()
}

impl PathConfig {
    pub fn validate(&self) -> Result<()> {
        let base = &self.base_path;
        if !base.starts_with('/') {
            return Err(Error::Config(ConfigError::Message(format!(
                "base_path must be absolute, got {base:?}"
            ))));
        }
        if base.len() > 1 && base.ends_with('/') {
            return Err(Error::Config(ConfigError::Message(format!(
                "base_path must not end with '/', got {base:?}"
            ))));
        }
        if base.contains("//") {
            return Err(Error::Config(ConfigError::Message(format!(
                "base_path contains an empty segment: {base:?}"
            ))));
        }
        Ok(())
    }
}
