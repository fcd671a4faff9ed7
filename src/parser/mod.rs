//! Syslog parsing and message rendering.
//!
//! Each flow picks one parser by selector (`rfc3164` or `rfc5424`) and one
//! handlebars template. The convert stage runs every received line through
//! both before turning it into a [`LogEvent`](crate::domain::LogEvent).

pub mod rfc3164;
pub mod rfc5424;
pub mod template;

pub use rfc3164::Rfc3164Parser;
pub use rfc5424::Rfc5424Parser;
pub use template::{MessageTemplate, RenderError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

/// Highest valid PRI value (facility 23, severity 7).
pub const MAX_PRIORITY: u16 = 191;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Line does not match {format} syntax")]
    NoMatch { format: &'static str },
    #[error("Invalid priority: {0}")]
    InvalidPriority(String),
    #[error("Invalid timestamp '{value}': {reason}")]
    InvalidTimestamp { value: String, reason: String },
    #[error("Unknown syslog format: {0}")]
    UnknownFormat(String),
    #[error("Pattern compilation failed: {0}")]
    Pattern(#[from] regex::Error),
}

/// One parsed syslog message. Field names are what message templates see.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyslogRecord {
    pub timestamp: DateTime<Utc>,
    pub priority: u8,
    pub facility: u8,
    pub severity: u8,
    pub hostname: Option<String>,
    pub app_name: Option<String>,
    pub proc_id: Option<String>,
    pub msg_id: Option<String>,
    pub message: String,
}

impl SyslogRecord {
    pub fn timestamp_millis(&self) -> i64 {
        self.timestamp.timestamp() * 1000
    }
}

pub trait SyslogParser: Send + Sync {
    fn name(&self) -> &'static str;

    fn parse(&self, raw: &str) -> Result<SyslogRecord, ParseError>;
}

/// Builds the parser for a configuration selector.
pub fn parser_for(format: &str) -> Result<Box<dyn SyslogParser>, ParseError> {
    match format {
        rfc3164::NAME => Ok(Box::new(Rfc3164Parser::new()?)),
        rfc5424::NAME => Ok(Box::new(Rfc5424Parser::new()?)),
        other => Err(ParseError::UnknownFormat(other.to_string())),
    }
}

/// Splits a PRI value into (priority, facility, severity).
pub(crate) fn split_priority(raw: &str) -> Result<(u8, u8, u8), ParseError> {
    let value: u16 = raw
        .parse()
        .map_err(|_| ParseError::InvalidPriority(raw.to_string()))?;
    if value > MAX_PRIORITY || (raw.len() > 1 && raw.starts_with('0')) {
        return Err(ParseError::InvalidPriority(raw.to_string()));
    }
    let priority = value as u8;
    Ok((priority, priority / 8, priority % 8))
}
