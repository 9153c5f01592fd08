use serde::Deserialize;

use crate::error::ConfigError;

const DEFAULT_BASE_PATH: &str = "/pcstorage/img/cntlog/";

/// Settings for a `CountLog` instance.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountLogConfig {
    /// Path prefix of the beacon image; the request timestamp is appended directly.
    #[serde(default = "default_base_path")]
    pub base_path: String,
}

fn default_base_path() -> String {
    DEFAULT_BASE_PATH.to_string()
}

impl Default for CountLogConfig {
    fn default() -> Self {
        Self {
            base_path: default_base_path(),
        }
    }
}

impl CountLogConfig {
    /// Parse a config object. `null` yields the defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let parsed: Option<Self> =
            serde_json::from_str(json).map_err(|e| ConfigError(e.to_string()))?;
        Ok(parsed.unwrap_or_default())
    }
}
