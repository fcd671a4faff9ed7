use super::error::LogServiceError;
use super::credentials::CredentialsProvider;
use super::signing::SigV4Signer;
use super::LogService;
use crate::domain::LogEvent;
use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{CONTENT_TYPE, HeaderValue, USER_AGENT};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

const CONTENT_TYPE_JSON: &str = "application/x-amz-json-1.1";
const TARGET_PREFIX: &str = "Logs_20140328";

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub endpoint: String,
    pub region: String,
    pub timeout: Duration,
    pub connection_timeout: Duration,
    pub user_agent: String,
    /// Requests go out unsigned without a provider.
    pub credentials: Option<Arc<CredentialsProvider>>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint("us-east-1"),
            region: "us-east-1".to_string(),
            timeout: Duration::from_secs(30),
            connection_timeout: Duration::from_secs(10),
            user_agent: format!("rask-logs-agent/{}", env!("CARGO_PKG_VERSION")),
            credentials: None,
        }
    }
}

pub fn default_endpoint(region: &str) -> String {
    format!("https://logs.{region}.amazonaws.com/")
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PutLogEventsRequest<'a> {
    log_group_name: &'a str,
    log_stream_name: &'a str,
    log_events: &'a [LogEvent],
    #[serde(skip_serializing_if = "Option::is_none")]
    sequence_token: Option<&'a str>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PutLogEventsResponse {
    #[serde(default)]
    next_sequence_token: Option<String>,
    #[serde(default)]
    rejected_log_events_info: Option<RejectedLogEventsInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RejectedLogEventsInfo {
    #[serde(default)]
    too_new_log_event_start_index: Option<i64>,
    #[serde(default)]
    too_old_log_event_end_index: Option<i64>,
    #[serde(default)]
    expired_log_event_end_index: Option<i64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateLogGroupRequest<'a> {
    log_group_name: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateLogStreamRequest<'a> {
    log_group_name: &'a str,
    log_stream_name: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DescribeLogStreamsRequest<'a> {
    log_group_name: &'a str,
    log_stream_name_prefix: &'a str,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DescribeLogStreamsResponse {
    #[serde(default)]
    log_streams: Vec<LogStreamDescription>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LogStreamDescription {
    log_stream_name: String,
    #[serde(default)]
    upload_sequence_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Empty {}

/// Logs JSON API client shared by every flow.
#[derive(Debug, Clone)]
pub struct CloudWatchLogsClient {
    client: Client,
    endpoint: Url,
    signer: SigV4Signer,
    credentials: Option<Arc<CredentialsProvider>>,
    user_agent: String,
}

impl CloudWatchLogsClient {
    pub fn new(config: ClientConfig) -> Result<Self, LogServiceError> {
        let endpoint: Url = config.endpoint.parse().map_err(|e| {
            LogServiceError::InvalidResponse(format!(
                "Invalid endpoint URL '{}': {e}",
                config.endpoint
            ))
        })?;

        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connection_timeout)
            .build()?;

        Ok(Self {
            client,
            endpoint,
            signer: SigV4Signer::new(config.region),
            credentials: config.credentials,
            user_agent: config.user_agent,
        })
    }

    async fn call<B, R>(&self, operation: &str, body: &B) -> Result<R, LogServiceError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned + Default,
    {
        let payload = serde_json::to_vec(body)
            .map_err(|e| LogServiceError::InvalidResponse(format!("Serialization failed: {e}")))?;
        let target = format!("{TARGET_PREFIX}.{operation}");

        let mut request = self
            .client
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE_JSON))
            .header("x-amz-target", &target)
            .header(USER_AGENT, &self.user_agent);

        if let Some(provider) = &self.credentials {
            let credentials = provider.credentials().await?;
            let signed = self.signer.sign(
                &credentials,
                &self.host_header(),
                self.endpoint.path(),
                CONTENT_TYPE_JSON,
                &target,
                &payload,
                chrono::Utc::now(),
            )?;
            request = request
                .header("x-amz-date", signed.amz_date)
                .header("authorization", signed.authorization);
            if let Some(token) = signed.security_token {
                request = request.header("x-amz-security-token", token);
            }
        }

        debug!("Calling {} ({} bytes)", target, payload.len());
        let response = request.body(payload).send().await?;
        let status = response.status();
        let error_type = response
            .headers()
            .get("x-amzn-errortype")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let text = response.text().await?;

        if !status.is_success() {
            return Err(LogServiceError::from_response(
                status.as_u16(),
                error_type.as_deref(),
                &text,
            ));
        }

        if text.trim().is_empty() {
            return Ok(R::default());
        }
        serde_json::from_str(&text).map_err(|e| {
            LogServiceError::InvalidResponse(format!("{operation} response: {e}"))
        })
    }

    fn host_header(&self) -> String {
        let host = self.endpoint.host_str().unwrap_or_default();
        match self.endpoint.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        }
    }
}

#[async_trait]
impl LogService for CloudWatchLogsClient {
    async fn put_log_events(
        &self,
        group: &str,
        stream: &str,
        sequence_token: Option<String>,
        events: &[LogEvent],
    ) -> Result<Option<String>, LogServiceError> {
        let request = PutLogEventsRequest {
            log_group_name: group,
            log_stream_name: stream,
            log_events: events,
            sequence_token: sequence_token.as_deref(),
        };
        let response: PutLogEventsResponse = self.call("PutLogEvents", &request).await?;

        if let Some(rejected) = response.rejected_log_events_info {
            warn!(
                "group: {} stream: {} rejected events (too_new_from={:?}, too_old_until={:?}, expired_until={:?})",
                group,
                stream,
                rejected.too_new_log_event_start_index,
                rejected.too_old_log_event_end_index,
                rejected.expired_log_event_end_index
            );
        }

        Ok(response.next_sequence_token)
    }

    async fn create_log_group(&self, group: &str) -> Result<(), LogServiceError> {
        let _: Empty = self
            .call(
                "CreateLogGroup",
                &CreateLogGroupRequest {
                    log_group_name: group,
                },
            )
            .await?;
        Ok(())
    }

    async fn create_log_stream(&self, group: &str, stream: &str) -> Result<(), LogServiceError> {
        let _: Empty = self
            .call(
                "CreateLogStream",
                &CreateLogStreamRequest {
                    log_group_name: group,
                    log_stream_name: stream,
                },
            )
            .await?;
        Ok(())
    }

    async fn describe_upload_token(
        &self,
        group: &str,
        stream: &str,
    ) -> Result<Option<String>, LogServiceError> {
        let response: DescribeLogStreamsResponse = self
            .call(
                "DescribeLogStreams",
                &DescribeLogStreamsRequest {
                    log_group_name: group,
                    log_stream_name_prefix: stream,
                },
            )
            .await?;

        response
            .log_streams
            .into_iter()
            .find(|description| description.log_stream_name == stream)
            .map(|description| description.upload_sequence_token)
            .ok_or_else(|| LogServiceError::ResourceNotFound(format!("log stream {stream}")))
    }
}
