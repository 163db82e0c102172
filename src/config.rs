use std::{path::Path, time::Duration};

use serde::Deserialize;
use serde_aux::prelude::*;

use crate::template::TemplateValues;

/// `params` of the channel "Live" tab.
pub const STREAMS_TAB_PARAMS: &str = "EgdzdHJlYW1z";

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("could not read config: {0}")]
    IoError(#[from] std::io::Error),
    #[error("could not parse config: {0}")]
    ParseError(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PollerConfig {
    pub channel_name: String,
    /// Milliseconds between poll cycles.
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub poll_interval: u64,
    pub api_scheme: String,
    pub api_host: String,
    pub api_path: String,
    pub channel_url: String,
    /// One browse request is made per entry, in parallel.
    pub query_params: Vec<String>,
    /// Extra values for the first template pass.
    pub template_values: TemplateValues,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            channel_name: String::new(),
            poll_interval: 60_000,
            api_scheme: "https".into(),
            api_host: "www.youtube.com".into(),
            api_path: "/youtubei/v1/browse?key=%apiKey&prettyPrint=false".into(),
            channel_url: "https://www.youtube.com/@%channelName/streams".into(),
            query_params: vec![STREAMS_TAB_PARAMS.into()],
            template_values: TemplateValues::new(),
        }
    }
}

impl PollerConfig {
    pub fn for_channel(channel_name: &str) -> Self {
        Self {
            channel_name: channel_name.into(),
            ..Default::default()
        }
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.channel_name.is_empty() {
            return Err(ConfigError::Invalid("channelName is empty".into()));
        }
        if self.poll_interval == 0 {
            return Err(ConfigError::Invalid("pollInterval must be positive".into()));
        }
        if self.query_params.is_empty() {
            return Err(ConfigError::Invalid("queryParams is empty".into()));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval)
    }

    /// Values for the first template pass: the configured extras plus
    /// `channelName`.
    pub fn local_values(&self) -> TemplateValues {
        let mut values = self.template_values.clone();
        values.insert("channelName".into(), self.channel_name.clone());
        values
    }
}
