use super::{AgentConfig, ConfigError, LogLevel};
use clap::Parser;
use std::path::PathBuf;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/rask-logs-agent.toml";

/// Ships syslog lines to CloudWatch Logs.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file location
    #[arg(
        short = 'c',
        long = "config",
        env = "RASK_LOGS_AGENT_CONFIG",
        default_value = DEFAULT_CONFIG_PATH
    )]
    pub config_file: PathBuf,

    /// Overrides `[main] log_level`
    #[arg(long, env = "RASK_LOGS_AGENT_LOG_LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Validate the configuration and exit
    #[arg(long)]
    pub check: bool,
}

impl Cli {
    pub fn from_args<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        Cli::try_parse_from(args)
    }

    /// Reads and validates the configuration file, applying CLI overrides.
    pub fn load_config(&self) -> Result<AgentConfig, ConfigError> {
        let mut config = AgentConfig::from_file(&self.config_file)?;
        if let Some(level) = self.log_level {
            config.main.log_level = level;
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_config_flag() {
        let cli = Cli::from_args(["rask-logs-agent", "-c", "/tmp/agent.toml", "--check"]).unwrap();
        assert_eq!(cli.config_file, PathBuf::from("/tmp/agent.toml"));
        assert!(cli.check);
        assert_eq!(cli.log_level, None);
    }

    #[test]
    fn test_log_level_flag() {
        let cli = Cli::from_args(["rask-logs-agent", "--config", "x.toml", "--log-level", "trace"])
            .unwrap();
        assert_eq!(cli.log_level, Some(LogLevel::Trace));
    }

    #[test]
    fn test_invalid_log_level() {
        assert!(Cli::from_args(["rask-logs-agent", "--log-level", "loud"]).is_err());
    }
}
