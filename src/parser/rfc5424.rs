use super::{ParseError, SyslogParser, SyslogRecord, split_priority};
use chrono::{DateTime, Utc};
use regex::Regex;

pub const NAME: &str = "rfc5424";

const NIL: &str = "-";
const BOM: char = '\u{FEFF}';

const PATTERN: &str = concat!(
    r"(?s)^<(\d{1,3})>1 ",
    r"(\S+) ",
    r"(\S+) ",
    r"(\S+) ",
    r"(\S+) ",
    r"(\S+) ",
    r#"(-|(?:\[(?:[^\]"\\]|\\.|"(?:[^"\\]|\\.)*")*\])+)"#,
    r"(?: (.*))?$",
);

/// IETF syslog:
/// `<PRI>1 TIMESTAMP HOSTNAME APP-NAME PROCID MSGID SD [MSG]`.
///
/// Nil fields (`-`) become `None`. A nil timestamp is replaced with the
/// time of parsing. Structured data is validated but not kept.
pub struct Rfc5424Parser {
    pattern: Regex,
}

impl Rfc5424Parser {
    pub fn new() -> Result<Self, ParseError> {
        Ok(Self {
            pattern: Regex::new(PATTERN)?,
        })
    }
}

impl SyslogParser for Rfc5424Parser {
    fn name(&self) -> &'static str {
        NAME
    }

    fn parse(&self, raw: &str) -> Result<SyslogRecord, ParseError> {
        let captures = self
            .pattern
            .captures(raw)
            .ok_or(ParseError::NoMatch { format: NAME })?;
        let (priority, facility, severity) = split_priority(&captures[1])?;

        let timestamp = match &captures[2] {
            NIL => Utc::now(),
            value => DateTime::parse_from_rfc3339(value)
                .map(|parsed| parsed.with_timezone(&Utc))
                .map_err(|e| ParseError::InvalidTimestamp {
                    value: value.to_string(),
                    reason: e.to_string(),
                })?,
        };

        let message = captures
            .get(8)
            .map_or("", |m| m.as_str())
            .trim_start_matches(BOM)
            .to_string();

        Ok(SyslogRecord {
            timestamp,
            priority,
            facility,
            severity,
            hostname: non_nil(&captures[3]),
            app_name: non_nil(&captures[4]),
            proc_id: non_nil(&captures[5]),
            msg_id: non_nil(&captures[6]),
            message,
        })
    }
}

fn non_nil(value: &str) -> Option<String> {
    if value == NIL {
        None
    } else {
        Some(value.to_string())
    }
}
