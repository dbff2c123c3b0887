use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Parameters used when translating between service instances and
/// directory records
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DirectoryConfig {
    /// Interval of the TCP health check attached to every registration
    #[serde(default = "default_health_check_interval")]
    pub health_check_interval_in_secs: u64,

    /// Tag key carrying the instance version (`<key>=<version>`)
    #[serde(default = "default_version_tag")]
    pub version_tag: String,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            health_check_interval_in_secs: default_health_check_interval(),
            version_tag: default_version_tag(),
        }
    }
}

impl DirectoryConfig {
    pub fn validate(&self) -> Result<()> {
        if self.health_check_interval_in_secs == 0 {
            return Err(Error::Config(ConfigError::Message(
                "health_check_interval_in_secs must be > 0".into(),
            )));
        }

        if self.version_tag.is_empty() || self.version_tag.contains('=') {
            return Err(Error::Config(ConfigError::Message(format!(
                "version_tag {:?} must be non-empty and must not contain '='",
                self.version_tag
            ))));
        }

        Ok(())
    }

    /// Check interval in the directory's duration notation, e.g. `10s`
    pub fn health_check_interval(&self) -> String {
        format!("{}s", self.health_check_interval_in_secs)
    }
}

fn default_health_check_interval() -> u64 {
    10
}
fn default_version_tag() -> String {
    "version".to_string()
}
