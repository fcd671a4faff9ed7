pub mod client;
pub mod credentials;
pub mod destination;
pub mod error;
pub mod signing;

pub use client::{ClientConfig, CloudWatchLogsClient};
pub use credentials::{Credentials, CredentialsError, CredentialsProvider};
pub use destination::{BatchDisposition, Destination};
pub use error::LogServiceError;
pub use signing::{SigV4Signer, SigningError};

use crate::domain::LogEvent;
use async_trait::async_trait;

#[cfg(test)]
use mockall::automock;

/// Remote Logs API operations the agent relies on.
///
/// One implementation is built at startup and shared by reference between
/// all flows; tests substitute fakes.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait LogService: Send + Sync {
    /// Writes `events` (already in timestamp order) and returns the token for
    /// the next write to this stream.
    async fn put_log_events(
        &self,
        group: &str,
        stream: &str,
        sequence_token: Option<String>,
        events: &[LogEvent],
    ) -> Result<Option<String>, LogServiceError>;

    async fn create_log_group(&self, group: &str) -> Result<(), LogServiceError>;

    async fn create_log_stream(&self, group: &str, stream: &str) -> Result<(), LogServiceError>;

    /// Current upload token of an existing stream.
    async fn describe_upload_token(
        &self,
        group: &str,
        stream: &str,
    ) -> Result<Option<String>, LogServiceError>;
}
