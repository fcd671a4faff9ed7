use super::config::serde_helpers::first_env_var;
use super::config::{ConfigError, FlowConfig, MainConfig};
use super::flow::Flow;
use super::logging_system::LoggingError;
use crate::collector::{Receiver, ReceiverError, Source, receiver_for};
use crate::metadata::{MetadataClient, MetadataError, StreamVars};
use crate::parser::{MessageTemplate, ParseError, RenderError, parser_for};
use crate::sender::client::default_endpoint;
use crate::sender::{
    ClientConfig, CloudWatchLogsClient, CredentialsError, CredentialsProvider, Destination,
    LogService, LogServiceError,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Logging error: {0}")]
    Logging(#[from] LoggingError),
    #[error("Receiver error: {0}")]
    Receiver(#[from] ReceiverError),
    #[error("Receiver for flow '{0}' has no line channel")]
    ReceiverUnavailable(String),
    #[error("Parser error: {0}")]
    Parser(#[from] ParseError),
    #[error("Template error: {0}")]
    Template(#[from] RenderError),
    #[error("Logs client error: {0}")]
    Client(#[from] LogServiceError),
    #[error("Metadata error: {0}")]
    Metadata(#[from] MetadataError),
    #[error("No region configured and none could be discovered")]
    NoRegion,
    #[error("Credentials error: {0}")]
    Credentials(#[from] CredentialsError),
    #[error(
        "No AWS credentials found in the environment, the shared credentials file or the instance role"
    )]
    NoCredentials,
}

/// Picks the region from config, environment, then instance identity.
pub async fn resolve_region(
    main: &MainConfig,
    metadata: &MetadataClient,
) -> Result<String, ServiceError> {
    if let Some(region) = &main.region {
        return Ok(region.clone());
    }
    if let Some(region) = first_env_var(&["AWS_REGION", "AWS_DEFAULT_REGION"]) {
        return Ok(region);
    }
    match metadata.identity().await {
        Ok(identity) => Ok(identity.region),
        Err(e) => {
            warn!("Region lookup via instance metadata failed: {}", e);
            Err(ServiceError::NoRegion)
        }
    }
}

/// Builds the Logs client shared by all flows.
///
/// Unsigned requests are only allowed against an explicit `[main] endpoint`.
pub async fn build_log_service(
    main: &MainConfig,
    region: &str,
    metadata: &MetadataClient,
) -> Result<Arc<dyn LogService>, ServiceError> {
    let credentials = match CredentialsProvider::resolve(metadata).await? {
        Some(provider) => {
            info!("AWS credentials from {}", provider.source());
            Some(Arc::new(provider))
        }
        None if main.endpoint.is_some() => {
            warn!("No AWS credentials found, requests will be unsigned");
            None
        }
        None => return Err(ServiceError::NoCredentials),
    };

    let config = ClientConfig {
        endpoint: main
            .endpoint
            .clone()
            .unwrap_or_else(|| default_endpoint(region)),
        region: region.to_string(),
        credentials,
        ..ClientConfig::default()
    };
    info!("Logs endpoint {} ({})", config.endpoint, config.region);
    Ok(Arc::new(CloudWatchLogsClient::new(config)?))
}

/// Resolves one flow's configuration into an unbound receiver and a ready flow.
pub fn build_flow(
    config: &FlowConfig,
    vars: &StreamVars,
    service: Arc<dyn LogService>,
) -> Result<(Box<dyn Receiver>, Flow), ServiceError> {
    let source: Source = config.source.parse()?;
    let receiver = receiver_for(&source)?;
    let stream = vars.render(&MessageTemplate::compile(&config.stream)?)?;

    let flow = Flow {
        name: config.name.clone(),
        parser: parser_for(&config.syslog_format)?,
        template: MessageTemplate::compile(&config.message_format)?,
        destination: Destination::new(config.group.clone(), stream, service),
        upload_delay: config.upload_delay,
        queue_size: config.queue_size,
    };
    Ok((receiver, flow))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sender::MockLogService;
    use serial_test::serial;
    use std::time::Duration;

    fn flow_config() -> FlowConfig {
        FlowConfig {
            name: "syslog".to_string(),
            source: "udp://127.0.0.1:0".to_string(),
            syslog_format: "rfc3164".to_string(),
            message_format: "{{message}}".to_string(),
            group: "system".to_string(),
            stream: "{{instance_id}}-{{hostname}}".to_string(),
            upload_delay: Duration::from_millis(10),
            queue_size: 1024 * 1024,
        }
    }

    #[test]
    fn test_build_flow_renders_stream_name() {
        let vars = StreamVars {
            instance_id: "i-1".to_string(),
            hostname: "box".to_string(),
        };
        let (_receiver, flow) =
            build_flow(&flow_config(), &vars, Arc::new(MockLogService::new())).unwrap();

        assert_eq!(flow.name, "syslog");
        assert_eq!(flow.destination.group(), "system");
        assert_eq!(flow.destination.stream(), "i-1-box");
        assert_eq!(flow.destination.sequence_token(), None);
        assert_eq!(flow.parser.name(), "rfc3164");
    }

    #[test]
    fn test_build_flow_rejects_bad_source() {
        let mut config = flow_config();
        config.source = "ftp://x:1".to_string();
        let result = build_flow(&config, &StreamVars::default(), Arc::new(MockLogService::new()));
        assert!(matches!(result, Err(ServiceError::Receiver(_))));
    }

    #[tokio::test]
    #[serial]
    async fn test_region_from_config_wins() {
        let main = MainConfig {
            region: Some("ap-northeast-1".to_string()),
            ..MainConfig::default()
        };
        let metadata = MetadataClient::with_endpoint("http://127.0.0.1:1/", Duration::from_millis(50)).unwrap();
        assert_eq!(resolve_region(&main, &metadata).await.unwrap(), "ap-northeast-1");
    }

    #[tokio::test]
    #[serial]
    async fn test_region_from_environment() {
        unsafe {
            std::env::remove_var("AWS_REGION");
            std::env::set_var("AWS_DEFAULT_REGION", "sa-east-1");
        }
        let metadata = MetadataClient::with_endpoint("http://127.0.0.1:1/", Duration::from_millis(50)).unwrap();
        let region = resolve_region(&MainConfig::default(), &metadata).await;
        unsafe {
            std::env::remove_var("AWS_DEFAULT_REGION");
        }
        assert_eq!(region.unwrap(), "sa-east-1");
    }

    #[tokio::test]
    #[serial]
    async fn test_no_region_anywhere() {
        unsafe {
            std::env::remove_var("AWS_REGION");
            std::env::remove_var("AWS_DEFAULT_REGION");
        }
        let metadata = MetadataClient::with_endpoint("http://127.0.0.1:1/", Duration::from_millis(50)).unwrap();
        assert!(matches!(
            resolve_region(&MainConfig::default(), &metadata).await,
            Err(ServiceError::NoRegion)
        ));
    }

    fn isolate_credentials(dir: &std::path::Path) {
        unsafe {
            for name in [
                "AWS_ACCESS_KEY_ID",
                "AWS_SECRET_ACCESS_KEY",
                "AWS_SESSION_TOKEN",
                "AWS_PROFILE",
                "AWS_DEFAULT_PROFILE",
            ] {
                std::env::remove_var(name);
            }
            std::env::set_var("AWS_SHARED_CREDENTIALS_FILE", dir.join("credentials"));
        }
    }

    fn unreachable_metadata() -> MetadataClient {
        MetadataClient::with_endpoint("http://127.0.0.1:1/", Duration::from_millis(50)).unwrap()
    }

    #[tokio::test]
    #[serial]
    async fn test_missing_credentials_fail_startup() {
        let dir = tempfile::tempdir().unwrap();
        isolate_credentials(dir.path());

        let result = build_log_service(&MainConfig::default(), "us-east-1", &unreachable_metadata()).await;
        unsafe { std::env::remove_var("AWS_SHARED_CREDENTIALS_FILE") };

        assert!(matches!(result, Err(ServiceError::NoCredentials)));
    }

    #[tokio::test]
    #[serial]
    async fn test_explicit_endpoint_allows_unsigned_requests() {
        let dir = tempfile::tempdir().unwrap();
        isolate_credentials(dir.path());
        let main = MainConfig {
            endpoint: Some("http://127.0.0.1:4566/".to_string()),
            ..MainConfig::default()
        };

        let result = build_log_service(&main, "us-east-1", &unreachable_metadata()).await;
        unsafe { std::env::remove_var("AWS_SHARED_CREDENTIALS_FILE") };

        assert!(result.is_ok());
    }

    #[tokio::test]
    #[serial]
    async fn test_environment_credentials_build_client() {
        let dir = tempfile::tempdir().unwrap();
        isolate_credentials(dir.path());
        unsafe {
            std::env::set_var("AWS_ACCESS_KEY_ID", "AKIDEXAMPLE");
            std::env::set_var("AWS_SECRET_ACCESS_KEY", "secret");
        }

        let result = build_log_service(&MainConfig::default(), "us-east-1", &unreachable_metadata()).await;
        unsafe {
            std::env::remove_var("AWS_ACCESS_KEY_ID");
            std::env::remove_var("AWS_SECRET_ACCESS_KEY");
            std::env::remove_var("AWS_SHARED_CREDENTIALS_FILE");
        }

        assert!(result.is_ok());
    }
}
