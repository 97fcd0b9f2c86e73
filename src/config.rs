use crate::constants::SITEMAP_ADAPTER;
use crate::error::{Result, ScraperError};
use crate::types::Location;
use chrono_tz::Tz;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub ai: AiConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

/// Tuning for the run coordinator and the derived-entity writers
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Worker limit for the per-event artist fan-out
    pub artist_concurrency: usize,
    pub item_timeout_secs: u64,
    pub nlu_timeout_secs: u64,
    /// Cursor fallback when a source has no successful run yet
    pub default_lookback_hours: i64,
    pub review_model: String,
    pub review_temperature: f32,
    pub identity_email_domain: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            artist_concurrency: 4,
            item_timeout_secs: 60,
            nlu_timeout_secs: 30,
            default_lookback_hours: 24,
            review_model: "gpt-3.5-turbo".to_string(),
            review_temperature: 0.4,
            identity_email_domain: "unclaimed.invalid".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AiProvider {
    OpenAi,
    #[default]
    Heuristic,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    pub provider: AiProvider,
    pub model: String,
    pub api_key: Option<String>,
    pub request_timeout_secs: u64,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            provider: AiProvider::Heuristic,
            model: "gpt-3.5-turbo".to_string(),
            api_key: None,
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotificationConfig {
    pub slack_webhook_url: Option<String>,
}

/// A single venue/listing source and how to read it
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub id: String,
    pub name: String,
    #[serde(default = "default_kind")]
    pub kind: String,
    pub url: String,
    pub sitemap: Option<String>,
    pub timezone: Tz,
    pub location: Location,
    /// Only sitemap urls whose path matches this pattern are event pages
    pub event_path_pattern: Option<String>,
    #[serde(default)]
    pub selectors: SelectorConfig,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    pub title: String,
    pub description: Option<String>,
    pub price: Option<String>,
    pub flier: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            title: "h1".to_string(),
            description: None,
            price: None,
            flier: None,
            start: None,
            end: None,
        }
    }
}

fn default_kind() -> String {
    SITEMAP_ADAPTER.to_string()
}

fn default_request_timeout() -> u64 {
    30
}

impl Config {
    /// Load configuration from a TOML file, then apply environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            ScraperError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        let mut config = Self::from_toml(&content)?;
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            if !key.trim().is_empty() {
                self.ai.api_key = Some(key);
            }
        }
        if let Ok(url) = std::env::var("SLACK_WEBHOOK_URL") {
            if !url.trim().is_empty() {
                self.notifications.slack_webhook_url = Some(url);
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.pipeline.artist_concurrency == 0 {
            return Err(ScraperError::Config(
                "pipeline.artist_concurrency must be at least 1".to_string(),
            ));
        }
        if self.pipeline.default_lookback_hours < 0 {
            return Err(ScraperError::Config(
                "pipeline.default_lookback_hours must not be negative".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for source in &self.sources {
            if !seen.insert(source.id.as_str()) {
                return Err(ScraperError::Config(format!(
                    "Duplicate source id '{}'",
                    source.id
                )));
            }
        }
        Ok(())
    }

    pub fn source(&self, id: &str) -> Option<&SourceConfig> {
        self.sources.iter().find(|s| s.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[pipeline]
artist_concurrency = 6

[ai]
provider = "openai"

[[sources]]
id = "ember"
name = "Ember Music Hall"
url = "https://embermusichall.com/"
sitemap = "https://embermusichall.com/rhp_events-sitemap.xml"
timezone = "America/New_York"
event_path_pattern = "^/event/(.+)$"

[sources.location]
place_id = "ChIJUdIEeTwRsYkRDeZRVM5FIbI"
geohash = "dq8vtfdd9"
lat = 37.5434971
lng = -77.4391272

[sources.selectors]
title = ".event-title"
price = ".tw-price"
"#;

    #[test]
    fn test_parse_sample_config() {
        let config = Config::from_toml(SAMPLE).unwrap();
        assert_eq!(config.pipeline.artist_concurrency, 6);
        assert_eq!(config.pipeline.item_timeout_secs, 60);
        assert_eq!(config.ai.provider, AiProvider::OpenAi);

        let ember = config.source("ember").unwrap();
        assert_eq!(ember.kind, SITEMAP_ADAPTER);
        assert_eq!(ember.timezone, chrono_tz::America::New_York);
        assert_eq!(ember.selectors.title, ".event-title");
        assert_eq!(ember.selectors.price.as_deref(), Some(".tw-price"));
    }

    #[test]
    fn test_rejects_duplicate_sources() {
        let doubled = format!("{}\n{}", SAMPLE, &SAMPLE[SAMPLE.find("[[sources]]").unwrap()..]);
        let err = Config::from_toml(&doubled).unwrap_err();
        assert!(err.to_string().contains("Duplicate source id"));
    }

    #[test]
    fn test_rejects_zero_concurrency() {
        let err = Config::from_toml("[pipeline]\nartist_concurrency = 0\n").unwrap_err();
        assert!(matches!(err, ScraperError::Config(_)));
    }

    #[test]
    fn test_rejects_unknown_timezone() {
        let bad = SAMPLE.replace("America/New_York", "Mars/Olympus_Mons");
        assert!(Config::from_toml(&bad).is_err());
    }
}
