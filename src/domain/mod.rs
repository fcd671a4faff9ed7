//! Domain layer for rask-logs-agent.
//!
//! Contains the canonical types shared across all modules:
//! - `LogEvent`: one rendered log line with its millisecond timestamp
//! - `EventError`: rejection of events the Logs API would refuse
//! - the Logs API protocol limits used for size accounting

pub mod log_event;

pub use log_event::{
    EVENT_OVERHEAD, EventError, LogEvent, MAX_BATCH_COUNT, MAX_BATCH_SIZE, MAX_EVENT_SIZE,
};
