use super::{ConfigError, LogFormat, LogLevel, LogOutput};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_UPLOAD_DELAY: Duration = Duration::from_millis(5000);
pub const DEFAULT_QUEUE_SIZE: usize = 4 * 1024 * 1024;
pub const DEFAULT_MESSAGE_FORMAT: &str = "{{message}}";
pub const DEFAULT_STREAM: &str = "{{instance_id}}";

/// The whole agent configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    #[serde(default)]
    pub main: MainConfig,
    #[serde(rename = "flow", default)]
    pub flows: Vec<FlowConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MainConfig {
    #[serde(default)]
    pub log_level: LogLevel,
    #[serde(default)]
    pub log_output: LogOutput,
    #[serde(default)]
    pub log_format: LogFormat,
    /// Falls back to `AWS_REGION`, `AWS_DEFAULT_REGION`, then the instance
    /// identity document.
    #[serde(default)]
    pub region: Option<String>,
    /// Overrides the regional Logs endpoint.
    #[serde(default)]
    pub endpoint: Option<String>,
}

/// One source-to-stream pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FlowConfig {
    pub name: String,
    /// `udp://host:port` or `unixgram:///path`.
    pub source: String,
    pub syslog_format: String,
    #[serde(default = "default_message_format")]
    pub message_format: String,
    pub group: String,
    #[serde(default = "default_stream")]
    pub stream: String,
    #[serde(
        rename = "upload_delay_ms",
        with = "super::serde_helpers",
        default = "default_upload_delay"
    )]
    pub upload_delay: Duration,
    /// Byte ceiling of the flow's in-memory queue.
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,
}

fn default_message_format() -> String {
    DEFAULT_MESSAGE_FORMAT.to_string()
}

fn default_stream() -> String {
    DEFAULT_STREAM.to_string()
}

fn default_upload_delay() -> Duration {
    DEFAULT_UPLOAD_DELAY
}

fn default_queue_size() -> usize {
    DEFAULT_QUEUE_SIZE
}

impl AgentConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::FileError {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: AgentConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }
}
