use super::{LogService, LogServiceError};
use crate::buffer::Batch;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// What the scheduler should do with a batch after an upload attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchDisposition {
    Discard,
    Requeue,
}

/// One remote log stream plus the sequence token needed to write to it.
///
/// Owned by a single flow. Uploads must be serialized by the caller: the
/// token is a per-stream counter and concurrent writers invalidate it.
pub struct Destination {
    group: String,
    stream: String,
    sequence_token: Option<String>,
    service: Arc<dyn LogService>,
}

impl Destination {
    pub fn new(
        group: impl Into<String>,
        stream: impl Into<String>,
        service: Arc<dyn LogService>,
    ) -> Self {
        Self {
            group: group.into(),
            stream: stream.into(),
            sequence_token: None,
            service,
        }
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn stream(&self) -> &str {
        &self.stream
    }

    pub fn sequence_token(&self) -> Option<&str> {
        self.sequence_token.as_deref()
    }

    /// Same stream, no token. The next upload resynchronizes through the
    /// token-mismatch path.
    pub fn without_token(&self) -> Self {
        Self::new(self.group.clone(), self.stream.clone(), self.service.clone())
    }

    /// Sorts the batch and writes it with the current token.
    pub async fn upload(&mut self, batch: &mut Batch) -> Result<(), LogServiceError> {
        batch.sort_by_timestamp();
        let next_token = self
            .service
            .put_log_events(
                &self.group,
                &self.stream,
                self.sequence_token.clone(),
                batch.events(),
            )
            .await?;
        self.sequence_token = next_token;
        Ok(())
    }

    /// Ensures group and stream exist. "Already exists" counts as success.
    pub async fn create(&self) -> Result<(), LogServiceError> {
        match self.service.create_log_group(&self.group).await {
            Ok(()) | Err(LogServiceError::ResourceAlreadyExists(_)) => {}
            Err(e) => return Err(e),
        }
        match self
            .service
            .create_log_stream(&self.group, &self.stream)
            .await
        {
            Ok(()) | Err(LogServiceError::ResourceAlreadyExists(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Adopts the token the service expects.
    ///
    /// Uses the token reported in the error when there is one, otherwise asks
    /// the service for the stream's current token.
    pub async fn set_token(&mut self, expected: Option<String>) -> Result<(), LogServiceError> {
        self.sequence_token = match expected {
            Some(token) => Some(token),
            None => {
                self.service
                    .describe_upload_token(&self.group, &self.stream)
                    .await?
            }
        };
        Ok(())
    }

    /// Applies corrective action for an upload result and decides the batch's fate.
    pub async fn handle_result(
        &mut self,
        result: Result<(), LogServiceError>,
    ) -> BatchDisposition {
        match result {
            Ok(()) => BatchDisposition::Discard,
            Err(LogServiceError::InvalidSequenceToken { expected_token, .. }) => {
                debug!("{} invalid sequence token", self);
                if let Err(e) = self.set_token(expected_token).await {
                    warn!("{} failed to refresh sequence token: {}", self, e);
                }
                BatchDisposition::Requeue
            }
            Err(LogServiceError::ResourceNotFound(_)) => {
                debug!("{} missing group/stream", self);
                if let Err(e) = self.create().await {
                    warn!("{} failed to create group/stream: {}", self, e);
                }
                self.sequence_token = None;
                BatchDisposition::Requeue
            }
            Err(e) => {
                error!("upload to {} failed {}: {}", self, e.code(), e);
                BatchDisposition::Discard
            }
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "group: {} stream: {}", self.group, self.stream)
    }
}

impl fmt::Debug for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Destination")
            .field("group", &self.group)
            .field("stream", &self.stream)
            .field("sequence_token", &self.sequence_token)
            .finish_non_exhaustive()
    }
}
