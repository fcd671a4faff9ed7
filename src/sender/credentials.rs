//! AWS credential resolution.
//!
//! Sources are tried in order: environment variables, the shared credentials
//! file, then the EC2 instance profile role. Role credentials are temporary
//! and are refreshed shortly before they expire.

use crate::metadata::{MetadataClient, MetadataError, RoleCredentials};
use chrono::{DateTime, TimeDelta, Utc};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Role credentials are refreshed once they are this close to expiring.
pub const REFRESH_MARGIN: TimeDelta = TimeDelta::minutes(5);

const DEFAULT_PROFILE: &str = "default";

#[derive(Error, Debug)]
pub enum CredentialsError {
    #[error("Cannot read shared credentials file {path}: {reason}")]
    SharedFile { path: String, reason: String },
    #[error("Profile '{profile}' in {path} has no {key}")]
    IncompleteProfile {
        path: String,
        profile: String,
        key: &'static str,
    },
    #[error("Instance role credentials unavailable: {0}")]
    InstanceRole(#[from] MetadataError),
}

#[derive(Clone)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
    /// `None` for long-lived keys.
    pub expiration: Option<DateTime<Utc>>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .field("expiration", &self.expiration)
            .finish()
    }
}

impl From<RoleCredentials> for Credentials {
    fn from(role: RoleCredentials) -> Self {
        Self {
            access_key_id: role.access_key_id,
            secret_access_key: role.secret_access_key,
            session_token: Some(role.token),
            expiration: Some(role.expiration),
        }
    }
}

impl Credentials {
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        session_token: Option<String>,
    ) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token,
            expiration: None,
        }
    }

    /// Reads the standard `AWS_*` environment variables.
    pub fn from_env() -> Option<Self> {
        let access_key_id = non_empty_env("AWS_ACCESS_KEY_ID")?;
        let secret_access_key = non_empty_env("AWS_SECRET_ACCESS_KEY")?;
        Some(Self::new(
            access_key_id,
            secret_access_key,
            non_empty_env("AWS_SESSION_TOKEN"),
        ))
    }

    /// Reads `profile` from an INI-style shared credentials file.
    ///
    /// A missing file or profile is `Ok(None)`; a profile without keys is an
    /// error.
    pub fn from_shared_file(path: &Path, profile: &str) -> Result<Option<Self>, CredentialsError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(CredentialsError::SharedFile {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                });
            }
        };

        let Some(section) = profile_section(&content, profile) else {
            return Ok(None);
        };
        let required = |key: &'static str| {
            section
                .get(key)
                .filter(|value| !value.is_empty())
                .cloned()
                .ok_or_else(|| CredentialsError::IncompleteProfile {
                    path: path.display().to_string(),
                    profile: profile.to_string(),
                    key,
                })
        };

        Ok(Some(Self::new(
            required("aws_access_key_id")?,
            required("aws_secret_access_key")?,
            section
                .get("aws_session_token")
                .filter(|value| !value.is_empty())
                .cloned(),
        )))
    }

    fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        self.expiration
            .is_some_and(|expiration| expiration - REFRESH_MARGIN <= now)
    }

    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiration.is_some_and(|expiration| expiration <= now)
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.trim().is_empty())
}

/// `AWS_SHARED_CREDENTIALS_FILE`, else `~/.aws/credentials`.
pub fn shared_credentials_path() -> Option<PathBuf> {
    if let Some(path) = non_empty_env("AWS_SHARED_CREDENTIALS_FILE") {
        return Some(PathBuf::from(path));
    }
    non_empty_env("HOME")
        .or_else(|| non_empty_env("USERPROFILE"))
        .map(|home| PathBuf::from(home).join(".aws").join("credentials"))
}

/// `AWS_PROFILE`, else `AWS_DEFAULT_PROFILE`, else `default`.
pub fn profile_name() -> String {
    non_empty_env("AWS_PROFILE")
        .or_else(|| non_empty_env("AWS_DEFAULT_PROFILE"))
        .unwrap_or_else(|| DEFAULT_PROFILE.to_string())
}

fn profile_section(content: &str, profile: &str) -> Option<HashMap<String, String>> {
    let mut section: Option<HashMap<String, String>> = None;
    let mut in_profile = false;

    for line in content.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(name) = line.strip_prefix('[').and_then(|rest| rest.strip_suffix(']')) {
            in_profile = name.trim() == profile;
            if in_profile {
                section.get_or_insert_with(HashMap::new);
            }
            continue;
        }
        if in_profile
            && let Some((key, value)) = line.split_once('=')
            && let Some(section) = section.as_mut()
        {
            section.insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
        }
    }

    section
}

enum Origin {
    Environment,
    SharedFile(PathBuf),
    InstanceRole(MetadataClient),
    Fixed,
}

/// Hands out signing credentials, refreshing temporary ones as needed.
///
/// Built once at startup and shared by every flow through the Logs client.
pub struct CredentialsProvider {
    origin: Origin,
    current: Mutex<Credentials>,
}

impl fmt::Debug for CredentialsProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialsProvider")
            .field("source", &self.source())
            .finish_non_exhaustive()
    }
}

impl CredentialsProvider {
    /// Long-lived credentials that never refresh.
    pub fn fixed(credentials: Credentials) -> Self {
        Self::with_origin(Origin::Fixed, credentials)
    }

    fn with_origin(origin: Origin, credentials: Credentials) -> Self {
        Self {
            origin,
            current: Mutex::new(credentials),
        }
    }

    /// Fetches the instance role credentials once and keeps `metadata` for
    /// refreshes.
    pub async fn instance_role(metadata: MetadataClient) -> Result<Self, CredentialsError> {
        let credentials = metadata.role_credentials().await?;
        Ok(Self::with_origin(
            Origin::InstanceRole(metadata),
            credentials.into(),
        ))
    }

    /// Walks the credential chain. `Ok(None)` means no source had credentials.
    pub async fn resolve(metadata: &MetadataClient) -> Result<Option<Self>, CredentialsError> {
        if let Some(credentials) = Credentials::from_env() {
            return Ok(Some(Self::with_origin(Origin::Environment, credentials)));
        }

        if let Some(path) = shared_credentials_path() {
            let profile = profile_name();
            if let Some(credentials) = Credentials::from_shared_file(&path, &profile)? {
                return Ok(Some(Self::with_origin(Origin::SharedFile(path), credentials)));
            }
            debug!("No profile '{}' in {}", profile, path.display());
        }

        match Self::instance_role(metadata.clone()).await {
            Ok(provider) => Ok(Some(provider)),
            Err(e) => {
                debug!("{}", e);
                Ok(None)
            }
        }
    }

    pub fn source(&self) -> String {
        match &self.origin {
            Origin::Environment => "environment".to_string(),
            Origin::SharedFile(path) => format!("shared credentials file {}", path.display()),
            Origin::InstanceRole(_) => "instance profile role".to_string(),
            Origin::Fixed => "static credentials".to_string(),
        }
    }

    /// Current credentials, refreshed first when they are about to expire.
    ///
    /// A failed refresh keeps the old credentials while they are still valid.
    pub async fn credentials(&self) -> Result<Credentials, CredentialsError> {
        let mut current = self.current.lock().await;
        let now = Utc::now();

        if let Origin::InstanceRole(metadata) = &self.origin
            && current.needs_refresh(now)
        {
            match metadata.role_credentials().await {
                Ok(fresh) => {
                    *current = fresh.into();
                    info!(
                        "Refreshed instance role credentials, valid until {:?}",
                        current.expiration
                    );
                }
                Err(e) if current.is_expired(now) => return Err(e.into()),
                Err(e) => warn!(
                    "Credential refresh failed, reusing credentials valid until {:?}: {}",
                    current.expiration, e
                ),
            }
        }

        Ok(current.clone())
    }
}
