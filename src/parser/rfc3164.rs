use super::{ParseError, SyslogParser, SyslogRecord, split_priority};
use chrono::{DateTime, Datelike, Duration, NaiveDateTime, Utc};
use regex::Regex;

pub const NAME: &str = "rfc3164";

const HEADER_PATTERN: &str = r"(?s)^<(\d{1,3})>([A-Z][a-z]{2} +\d{1,2} \d{2}:\d{2}:\d{2}) (.*)$";
const TAG_PATTERN: &str = r"(?s)^([^\s\[\]:]+)(?:\[([^\]]*)\])?: ?(.*)$";

/// BSD syslog: `<PRI>Mmm dd hh:mm:ss HOSTNAME TAG[PID]: MSG`.
///
/// The hostname is optional, as in messages written by a local libc to
/// `/dev/log`. Timestamps carry neither year nor zone; they are read as UTC
/// in the current year, or the previous one if that would put them more than
/// a day in the future.
pub struct Rfc3164Parser {
    header: Regex,
    tag: Regex,
}

impl Rfc3164Parser {
    pub fn new() -> Result<Self, ParseError> {
        Ok(Self {
            header: Regex::new(HEADER_PATTERN)?,
            tag: Regex::new(TAG_PATTERN)?,
        })
    }

    /// Parses relative to `now`, which anchors the missing year.
    pub fn parse_at(&self, raw: &str, now: DateTime<Utc>) -> Result<SyslogRecord, ParseError> {
        let captures = self
            .header
            .captures(raw)
            .ok_or(ParseError::NoMatch { format: NAME })?;
        let (priority, facility, severity) = split_priority(&captures[1])?;
        let timestamp = resolve_timestamp(&captures[2], now)?;
        let rest = captures.get(3).map_or("", |m| m.as_str());

        let (hostname, body) = match rest.split_once(' ') {
            Some((first, remainder)) if !self.is_tag(first) => (Some(first.to_string()), remainder),
            _ => (None, rest),
        };

        let (app_name, proc_id, message) = match self.tag.captures(body) {
            Some(tag) => (
                Some(tag[1].to_string()),
                tag.get(2).map(|m| m.as_str().to_string()),
                tag.get(3).map_or("", |m| m.as_str()).to_string(),
            ),
            None => (None, None, body.to_string()),
        };

        Ok(SyslogRecord {
            timestamp,
            priority,
            facility,
            severity,
            hostname,
            app_name,
            proc_id,
            msg_id: None,
            message,
        })
    }

    fn is_tag(&self, token: &str) -> bool {
        token.ends_with(':') && self.tag.is_match(token)
    }
}

impl SyslogParser for Rfc3164Parser {
    fn name(&self) -> &'static str {
        NAME
    }

    fn parse(&self, raw: &str) -> Result<SyslogRecord, ParseError> {
        self.parse_at(raw, Utc::now())
    }
}

fn resolve_timestamp(value: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>, ParseError> {
    let normalized = value.split_whitespace().collect::<Vec<_>>().join(" ");
    let at_year = |year: i32| {
        NaiveDateTime::parse_from_str(&format!("{year} {normalized}"), "%Y %b %d %H:%M:%S")
            .map(|naive| naive.and_utc())
    };

    let candidate = at_year(now.year()).or_else(|_| at_year(now.year() - 1));
    let timestamp = candidate.map_err(|e| ParseError::InvalidTimestamp {
        value: value.to_string(),
        reason: e.to_string(),
    })?;

    if timestamp > now + Duration::days(1) {
        return at_year(now.year() - 1).map_err(|e| ParseError::InvalidTimestamp {
            value: value.to_string(),
            reason: e.to_string(),
        });
    }
    Ok(timestamp)
}
