//! Log sources.
//!
//! A receiver binds a datagram socket and turns every datagram into one line
//! on an unbounded channel. The channel closes when the receiver is closed.

pub mod source;
pub mod udp;
#[cfg(unix)]
pub mod unix;

pub use source::Source;
pub use udp::UdpReceiver;
#[cfg(unix)]
pub use unix::UnixDatagramReceiver;

use async_trait::async_trait;
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Largest datagram read in one call.
pub const MAX_DATAGRAM_SIZE: usize = 64 * 1024;

const READ_BACKOFF_INITIAL: Duration = Duration::from_millis(10);
const READ_BACKOFF_MAX: Duration = Duration::from_secs(1);
const READ_FAILURE_REPORT_EVERY: u32 = 100;

#[derive(Error, Debug)]
pub enum ReceiverError {
    #[error("Invalid source '{input}': {reason}")]
    InvalidSource { input: String, reason: String },
    #[error("Unsupported source scheme: {0}")]
    UnsupportedScheme(String),
    #[error("Failed to bind {address}: {error}")]
    Bind {
        address: String,
        #[source]
        error: std::io::Error,
    },
    #[error("Receiver is already listening")]
    AlreadyListening,
    #[error("Unix sockets are not supported on this platform: {}", .0.display())]
    UnixUnsupported(PathBuf),
}

#[async_trait]
pub trait Receiver: Send {
    /// Binds the socket and starts reading. Bind failures surface here.
    async fn listen(&mut self) -> Result<(), ReceiverError>;

    /// Hands out the line channel. Returns `None` before `listen` or when
    /// already taken.
    fn receive(&mut self) -> Option<mpsc::UnboundedReceiver<String>>;

    /// Stops reading; the line channel closes once buffered lines are consumed.
    fn close(&mut self);
}

/// Builds an unbound receiver for `source`.
pub fn receiver_for(source: &Source) -> Result<Box<dyn Receiver>, ReceiverError> {
    match source {
        Source::Udp(address) => Ok(Box::new(UdpReceiver::new(address.clone()))),
        #[cfg(unix)]
        Source::UnixDatagram(path) => Ok(Box::new(UnixDatagramReceiver::new(path.clone()))),
        #[cfg(not(unix))]
        Source::UnixDatagram(path) => Err(ReceiverError::UnixUnsupported(path.clone())),
    }
}

/// Paces a socket reader after failed reads.
///
/// Consecutive failures double the pause up to one second and are logged on
/// the first and every hundredth occurrence. Errors that cannot clear up on
/// their own stop the reader.
#[derive(Debug, Default)]
pub(crate) struct ReadBackoff {
    failures: u32,
}

impl ReadBackoff {
    /// Pause before the next read, or `None` when the reader should stop.
    pub(crate) fn on_error(&mut self, source: &str, e: &io::Error) -> Option<Duration> {
        if is_fatal(e) {
            error!("{} read failed, stopping reader: {}", source, e);
            return None;
        }

        self.failures = self.failures.saturating_add(1);
        if self.failures == 1 || self.failures % READ_FAILURE_REPORT_EVERY == 0 {
            warn!("{} read failed ({} in a row): {}", source, self.failures, e);
        }
        let doublings = (self.failures - 1).min(7);
        Some((READ_BACKOFF_INITIAL * (1 << doublings)).min(READ_BACKOFF_MAX))
    }

    pub(crate) fn on_success(&mut self, source: &str) {
        if self.failures > 0 {
            info!("{} reads recovered after {} failures", source, self.failures);
            self.failures = 0;
        }
    }
}

fn is_fatal(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::PermissionDenied
            | io::ErrorKind::NotConnected
            | io::ErrorKind::InvalidInput
            | io::ErrorKind::Unsupported
    )
}

/// Converts one datagram into a line, or `None` for empty payloads.
pub(crate) fn decode_datagram(payload: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(payload);
    let line = text.trim_end_matches(['\r', '\n']);
    if line.is_empty() {
        None
    } else {
        Some(line.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_backoff_grows_and_caps() {
        let mut backoff = ReadBackoff::default();
        let refused = io::Error::from(io::ErrorKind::ConnectionRefused);

        let delays: Vec<_> = (0..10)
            .map(|_| backoff.on_error("udp://test", &refused).unwrap())
            .collect();
        assert_eq!(delays[0], Duration::from_millis(10));
        assert_eq!(delays[1], Duration::from_millis(20));
        assert_eq!(delays[6], Duration::from_millis(640));
        assert_eq!(delays[7], Duration::from_secs(1));
        assert_eq!(delays[9], Duration::from_secs(1));

        backoff.on_success("udp://test");
        assert_eq!(
            backoff.on_error("udp://test", &refused),
            Some(Duration::from_millis(10))
        );
    }

    #[test]
    fn test_read_backoff_stops_on_fatal_errors() {
        let mut backoff = ReadBackoff::default();
        for kind in [io::ErrorKind::PermissionDenied, io::ErrorKind::NotConnected] {
            assert_eq!(backoff.on_error("unixgram:///dev/log", &io::Error::from(kind)), None);
        }
        assert!(
            backoff
                .on_error("unixgram:///dev/log", &io::Error::other("no buffer space"))
                .is_some()
        );
    }

    #[test]
    fn test_decode_trims_line_endings() {
        assert_eq!(decode_datagram(b"hello\r\n").as_deref(), Some("hello"));
        assert_eq!(decode_datagram(b"hello\n\n").as_deref(), Some("hello"));
        assert_eq!(decode_datagram(b"  spaced  ").as_deref(), Some("  spaced  "));
    }

    #[test]
    fn test_decode_skips_empty() {
        assert_eq!(decode_datagram(b""), None);
        assert_eq!(decode_datagram(b"\r\n"), None);
    }

    #[test]
    fn test_decode_replaces_invalid_utf8() {
        let line = decode_datagram(&[b'a', 0xff, b'b']).unwrap();
        assert_eq!(line, "a\u{FFFD}b");
    }

    #[test]
    fn test_receiver_for_udp() {
        let source: Source = "udp://127.0.0.1:0".parse().unwrap();
        assert!(receiver_for(&source).is_ok());
    }
}
