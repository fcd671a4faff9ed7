//! Host facts used to name log streams.

pub mod instance;

pub use instance::{InstanceIdentity, MetadataClient, MetadataError, RoleCredentials};

use crate::parser::{MessageTemplate, RenderError};
use serde::Serialize;
use tracing::debug;

pub const UNKNOWN: &str = "UNKNOWN";

/// Variables available to stream-name templates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamVars {
    pub instance_id: String,
    pub hostname: String,
}

impl Default for StreamVars {
    fn default() -> Self {
        Self {
            instance_id: UNKNOWN.to_string(),
            hostname: UNKNOWN.to_string(),
        }
    }
}

impl StreamVars {
    /// Collects hostname and instance id, falling back to `UNKNOWN` for
    /// whatever cannot be determined.
    pub async fn lookup(metadata: &MetadataClient) -> Self {
        let mut vars = Self::default();

        match hostname::get() {
            Ok(name) => vars.hostname = name.to_string_lossy().into_owned(),
            Err(e) => debug!("Hostname unavailable: {}", e),
        }

        match metadata.identity().await {
            Ok(identity) => vars.instance_id = identity.instance_id,
            Err(e) => debug!("Instance identity unavailable: {}", e),
        }

        vars
    }

    pub fn render(&self, template: &MessageTemplate) -> Result<String, RenderError> {
        template.render_to_string(self)
    }
}
