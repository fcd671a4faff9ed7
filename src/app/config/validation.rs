use super::{AgentConfig, ConfigError, FlowConfig};
use crate::collector::Source;
use crate::domain::MAX_EVENT_SIZE;
use crate::parser::{MessageTemplate, parser_for};
use std::collections::HashSet;
use url::Url;

impl AgentConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.flows.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "At least one [[flow]] must be configured".to_string(),
            ));
        }

        if let Some(endpoint) = &self.main.endpoint {
            Url::parse(endpoint).map_err(|e| {
                ConfigError::InvalidConfig(format!("Invalid endpoint URL '{endpoint}': {e}"))
            })?;
        }

        if let Some(region) = &self.main.region
            && region.trim().is_empty()
        {
            return Err(ConfigError::InvalidConfig(
                "Region must not be empty".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for flow in &self.flows {
            if !names.insert(flow.name.as_str()) {
                return Err(ConfigError::InvalidConfig(format!(
                    "Duplicate flow name '{}'",
                    flow.name
                )));
            }
            flow.validate()?;
        }

        Ok(())
    }
}

impl FlowConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidFlow {
            flow: self.name.clone(),
            reason,
        };

        if self.name.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "Flow name must not be empty".to_string(),
            ));
        }

        if self.group.trim().is_empty() {
            return Err(invalid("group must not be empty".to_string()));
        }

        if self.upload_delay.is_zero() {
            return Err(invalid("upload_delay_ms must be greater than 0".to_string()));
        }

        if self.queue_size < MAX_EVENT_SIZE {
            return Err(invalid(format!(
                "queue_size ({}) must be at least {MAX_EVENT_SIZE} bytes",
                self.queue_size
            )));
        }

        self.source
            .parse::<Source>()
            .map_err(|e| invalid(e.to_string()))?;
        parser_for(&self.syslog_format).map_err(|e| invalid(e.to_string()))?;
        MessageTemplate::compile(&self.message_format)
            .map_err(|e| invalid(format!("message_format: {e}")))?;
        MessageTemplate::compile(&self.stream).map_err(|e| invalid(format!("stream: {e}")))?;

        Ok(())
    }
}
