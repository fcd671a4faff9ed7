use chrono::{DateTime, Utc};
use reqwest::{Client, Response};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use url::Url;

pub const DEFAULT_METADATA_ENDPOINT: &str = "http://169.254.169.254/";

const TOKEN_PATH: &str = "latest/api/token";
const IDENTITY_PATH: &str = "latest/dynamic/instance-identity/document";
const ROLE_PATH: &str = "latest/meta-data/iam/security-credentials/";
const TOKEN_TTL_HEADER: &str = "x-aws-ec2-metadata-token-ttl-seconds";
const TOKEN_HEADER: &str = "x-aws-ec2-metadata-token";
const TOKEN_TTL_SECONDS: &str = "60";

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("Invalid metadata endpoint: {0}")]
    InvalidEndpoint(#[from] url::ParseError),
    #[error("Metadata request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Metadata service returned HTTP {0}")]
    Status(u16),
    #[error("No IAM role is attached to this instance")]
    NoRole,
    #[error("Role credentials for '{role}' unavailable: {code}")]
    RoleCredentials { role: String, code: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceIdentity {
    pub instance_id: String,
    pub region: String,
    #[serde(default)]
    pub availability_zone: Option<String>,
    #[serde(default)]
    pub account_id: Option<String>,
}

/// Temporary credentials of the instance profile role.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RoleCredentials {
    #[serde(default)]
    pub code: Option<String>,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub token: String,
    pub expiration: DateTime<Utc>,
}

impl std::fmt::Debug for RoleCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoleCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("expiration", &self.expiration)
            .finish_non_exhaustive()
    }
}

/// EC2 instance metadata (IMDSv2) client.
///
/// Built once at startup. Off EC2 every call fails within the timeout.
#[derive(Debug, Clone)]
pub struct MetadataClient {
    client: Client,
    base: Url,
}

impl MetadataClient {
    pub fn new() -> Result<Self, MetadataError> {
        Self::with_endpoint(DEFAULT_METADATA_ENDPOINT, Duration::from_secs(1))
    }

    pub fn with_endpoint(endpoint: &str, timeout: Duration) -> Result<Self, MetadataError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .no_proxy()
            .build()?;
        Ok(Self {
            client,
            base: Url::parse(endpoint)?,
        })
    }

    async fn token(&self) -> Result<String, MetadataError> {
        let response = self
            .client
            .put(self.base.join(TOKEN_PATH)?)
            .header(TOKEN_TTL_HEADER, TOKEN_TTL_SECONDS)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(MetadataError::Status(response.status().as_u16()));
        }
        Ok(response.text().await?)
    }

    async fn get(&self, path: &str, token: &str) -> Result<Response, MetadataError> {
        let response = self
            .client
            .get(self.base.join(path)?)
            .header(TOKEN_HEADER, token.trim())
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(MetadataError::Status(response.status().as_u16()));
        }
        Ok(response)
    }

    /// Fetches the instance identity document.
    pub async fn identity(&self) -> Result<InstanceIdentity, MetadataError> {
        let token = self.token().await?;
        Ok(self.get(IDENTITY_PATH, &token).await?.json().await?)
    }

    /// Fetches the credentials of the first role in the instance profile.
    pub async fn role_credentials(&self) -> Result<RoleCredentials, MetadataError> {
        let token = self.token().await?;
        let roles = self.get(ROLE_PATH, &token).await?.text().await?;
        let role = roles
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .ok_or(MetadataError::NoRole)?;

        let credentials: RoleCredentials = self
            .get(&format!("{ROLE_PATH}{role}"), &token)
            .await?
            .json()
            .await?;
        match credentials.code.as_deref() {
            None | Some("Success") => Ok(credentials),
            Some(code) => Err(MetadataError::RoleCredentials {
                role: role.to_string(),
                code: code.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client_for(server: &MockServer) -> MetadataClient {
        MetadataClient::with_endpoint(&server.uri(), Duration::from_secs(1)).unwrap()
    }

    #[tokio::test]
    async fn test_identity_uses_session_token() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/latest/api/token"))
            .and(header(TOKEN_TTL_HEADER, TOKEN_TTL_SECONDS))
            .respond_with(ResponseTemplate::new(200).set_body_string("secret-token"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/latest/dynamic/instance-identity/document"))
            .and(header(TOKEN_HEADER, "secret-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "instanceId": "i-0123456789abcdef0",
                "region": "eu-central-1",
                "availabilityZone": "eu-central-1a",
                "accountId": "123456789012",
                "imageId": "ami-1"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let identity = client_for(&server).await.identity().await.unwrap();
        assert_eq!(identity.instance_id, "i-0123456789abcdef0");
        assert_eq!(identity.region, "eu-central-1");
        assert_eq!(identity.availability_zone.as_deref(), Some("eu-central-1a"));
    }

    #[tokio::test]
    async fn test_token_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let err = client_for(&server).await.identity().await.unwrap_err();
        assert!(matches!(err, MetadataError::Status(403)));
    }

    async fn mount_token(server: &MockServer) {
        Mock::given(method("PUT"))
            .and(path("/latest/api/token"))
            .respond_with(ResponseTemplate::new(200).set_body_string("secret-token"))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_role_credentials() {
        let server = MockServer::start().await;
        mount_token(&server).await;
        Mock::given(method("GET"))
            .and(path("/latest/meta-data/iam/security-credentials/"))
            .and(header(TOKEN_HEADER, "secret-token"))
            .respond_with(ResponseTemplate::new(200).set_body_string("agent-role\n"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/latest/meta-data/iam/security-credentials/agent-role"))
            .and(header(TOKEN_HEADER, "secret-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "Code": "Success",
                "LastUpdated": "2024-05-01T10:00:00Z",
                "Type": "AWS-HMAC",
                "AccessKeyId": "ASIAROLE",
                "SecretAccessKey": "role-secret",
                "Token": "role-token",
                "Expiration": "2024-05-01T16:00:00Z"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let credentials = client_for(&server).await.role_credentials().await.unwrap();
        assert_eq!(credentials.access_key_id, "ASIAROLE");
        assert_eq!(credentials.token, "role-token");
        assert_eq!(credentials.expiration.to_rfc3339(), "2024-05-01T16:00:00+00:00");
        assert!(!format!("{credentials:?}").contains("role-secret"));
    }

    #[tokio::test]
    async fn test_no_role_attached() {
        let server = MockServer::start().await;
        mount_token(&server).await;
        Mock::given(method("GET"))
            .and(path("/latest/meta-data/iam/security-credentials/"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        assert!(matches!(
            client_for(&server).await.role_credentials().await,
            Err(MetadataError::Status(404))
        ));

        let empty = MockServer::start().await;
        mount_token(&empty).await;
        Mock::given(method("GET"))
            .and(path("/latest/meta-data/iam/security-credentials/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("\n"))
            .mount(&empty)
            .await;
        assert!(matches!(
            client_for(&empty).await.role_credentials().await,
            Err(MetadataError::NoRole)
        ));
    }

    #[tokio::test]
    async fn test_role_credentials_failure_code() {
        let server = MockServer::start().await;
        mount_token(&server).await;
        Mock::given(method("GET"))
            .and(path("/latest/meta-data/iam/security-credentials/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("agent-role"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/latest/meta-data/iam/security-credentials/agent-role"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "Code": "AssumeRoleUnauthorizedAccess",
                "AccessKeyId": "",
                "SecretAccessKey": "",
                "Token": "",
                "Expiration": "2024-05-01T16:00:00Z"
            })))
            .mount(&server)
            .await;

        match client_for(&server).await.role_credentials().await {
            Err(MetadataError::RoleCredentials { role, code }) => {
                assert_eq!(role, "agent-role");
                assert_eq!(code, "AssumeRoleUnauthorizedAccess");
            }
            other => panic!("Expected RoleCredentials error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unreachable_endpoint() {
        let client =
            MetadataClient::with_endpoint("http://127.0.0.1:1/", Duration::from_millis(200)).unwrap();
        assert!(matches!(
            client.identity().await,
            Err(MetadataError::Request(_))
        ));
    }
}
