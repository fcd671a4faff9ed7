use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Bytes the Logs API charges per event on top of the message itself.
pub const EVENT_OVERHEAD: usize = 26;
/// Largest accepted event, overhead included.
pub const MAX_EVENT_SIZE: usize = 256 * 1024;
/// Largest accepted `PutLogEvents` payload, overhead included.
pub const MAX_BATCH_SIZE: usize = 1024 * 1024;
/// Most events accepted by a single `PutLogEvents` call.
pub const MAX_BATCH_COUNT: usize = 10_000;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventError {
    #[error("Event too big: {size} bytes (max {max})")]
    TooBig { size: usize, max: usize },
}

/// A single rendered log line ready for upload.
///
/// The serialized form matches the `InputLogEvent` shape of the Logs API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEvent {
    pub message: String,
    #[serde(rename = "timestamp")]
    pub timestamp_millis: i64,
}

impl LogEvent {
    pub fn new(message: impl Into<String>, timestamp_millis: i64) -> Self {
        Self {
            message: message.into(),
            timestamp_millis,
        }
    }

    /// Builds an event and rejects it if the Logs API would refuse it.
    pub fn try_new(message: impl Into<String>, timestamp_millis: i64) -> Result<Self, EventError> {
        let event = Self::new(message, timestamp_millis);
        event.validate()?;
        Ok(event)
    }

    pub fn size(&self) -> usize {
        self.message.len() + EVENT_OVERHEAD
    }

    pub fn validate(&self) -> Result<(), EventError> {
        let size = self.size();
        if size > MAX_EVENT_SIZE {
            return Err(EventError::TooBig {
                size,
                max: MAX_EVENT_SIZE,
            });
        }
        Ok(())
    }
}
