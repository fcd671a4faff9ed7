use super::config::{LogFormat, LogLevel, LogOutput, MainConfig};
use std::sync::OnceLock;
use thiserror::Error;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{EnvFilter, Layer, fmt, prelude::*};

/// Dependencies whose debug output drowns the agent's own.
const QUIET_TARGETS: &[(&str, LogLevel)] = &[
    ("hyper", LogLevel::Warn),
    ("hyper_util", LogLevel::Warn),
    ("reqwest", LogLevel::Warn),
    ("h2", LogLevel::Warn),
    ("rustls", LogLevel::Warn),
];

#[derive(Error, Debug, Clone)]
pub enum LoggingError {
    #[error("Invalid log directive '{directive}': {reason}")]
    InvalidDirective { directive: String, reason: String },
    #[error("Logging initialization failed: {0}")]
    InitFailed(String),
}

pub struct LoggingSystem {
    level: LogLevel,
    output: LogOutput,
    format: LogFormat,
    directives: Vec<String>,
}

impl LoggingSystem {
    pub fn new(level: LogLevel, output: LogOutput, format: LogFormat) -> Self {
        Self {
            level,
            output,
            format,
            directives: Vec::new(),
        }
    }

    pub fn from_config(main: &MainConfig) -> Self {
        let mut system = Self::new(main.log_level, main.log_output, main.log_format);
        system.add_default_directives();
        system
    }

    pub fn add_directive(&mut self, directive: &str) -> Result<(), LoggingError> {
        directive
            .parse::<Directive>()
            .map_err(|e| LoggingError::InvalidDirective {
                directive: directive.to_string(),
                reason: e.to_string(),
            })?;
        self.directives.push(directive.to_string());
        Ok(())
    }

    pub fn add_default_directives(&mut self) {
        for (target, level) in QUIET_TARGETS {
            self.directives.push(format!("{target}={}", level.as_str()));
        }
    }

    pub fn build_filter_string(&self) -> String {
        std::iter::once(self.level.as_str().to_string())
            .chain(self.directives.iter().cloned())
            .collect::<Vec<_>>()
            .join(",")
    }

    /// `RUST_LOG` wins over the configured level when it is set.
    fn env_filter(&self) -> Result<EnvFilter, LoggingError> {
        if let Ok(from_env) = std::env::var(EnvFilter::DEFAULT_ENV)
            && !from_env.trim().is_empty()
        {
            return EnvFilter::try_new(&from_env).map_err(|e| LoggingError::InvalidDirective {
                directive: from_env.clone(),
                reason: e.to_string(),
            });
        }

        let filter_string = self.build_filter_string();
        EnvFilter::try_new(&filter_string).map_err(|e| LoggingError::InvalidDirective {
            directive: filter_string.clone(),
            reason: e.to_string(),
        })
    }

    fn writer(&self) -> BoxMakeWriter {
        match self.output {
            LogOutput::Stderr => BoxMakeWriter::new(std::io::stderr),
            LogOutput::Stdout => BoxMakeWriter::new(std::io::stdout),
        }
    }

    pub fn initialize_tracing(&self) -> Result<(), LoggingError> {
        let env_filter = self.env_filter()?;

        let fmt_layer = match self.format {
            LogFormat::Compact => fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_ansi(false)
                .with_writer(self.writer())
                .compact()
                .boxed(),
            LogFormat::Json => fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_writer(self.writer())
                .json()
                .boxed(),
        };

        let subscriber = tracing_subscriber::registry().with(fmt_layer).with(env_filter);

        tracing::subscriber::set_global_default(subscriber)
            .map_err(|e| LoggingError::InitFailed(e.to_string()))
    }
}

/// Installs the global subscriber once. Later calls return the first outcome.
pub fn setup_logging(main: &MainConfig) -> Result<(), LoggingError> {
    static INIT: OnceLock<Result<(), LoggingError>> = OnceLock::new();

    INIT.get_or_init(|| LoggingSystem::from_config(main).initialize_tracing())
        .clone()
}
