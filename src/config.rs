use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Address the HTTP server listens on
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default)]
    pub fetch: FetchConfig,
    pub channels: Vec<ChannelConfig>,
}

fn default_bind() -> String {
    "0.0.0.0:3000".to_string()
}

/// Network limits shared by every channel.
#[derive(Debug, Deserialize, Clone)]
pub struct FetchConfig {
    #[serde(default = "default_source_timeout_secs")]
    pub source_timeout_secs: u64,
    #[serde(default = "default_image_timeout_secs")]
    pub image_timeout_secs: u64,
    /// Bytes of an article page read while looking for preview metadata
    #[serde(default = "default_image_max_bytes")]
    pub image_max_bytes: usize,
    #[serde(default = "default_max_source_bytes")]
    pub max_source_bytes: usize,
    /// Image fallback requests allowed in flight at once
    #[serde(default = "default_fallback_concurrency")]
    pub fallback_concurrency: usize,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_reject_patterns")]
    pub reject_patterns: Vec<String>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            source_timeout_secs: default_source_timeout_secs(),
            image_timeout_secs: default_image_timeout_secs(),
            image_max_bytes: default_image_max_bytes(),
            max_source_bytes: default_max_source_bytes(),
            fallback_concurrency: default_fallback_concurrency(),
            user_agent: default_user_agent(),
            reject_patterns: default_reject_patterns(),
        }
    }
}

fn default_source_timeout_secs() -> u64 {
    8
}

fn default_image_timeout_secs() -> u64 {
    5
}

fn default_image_max_bytes() -> usize {
    10 * 1024
}

fn default_max_source_bytes() -> usize {
    5 * 1024 * 1024
}

fn default_fallback_concurrency() -> usize {
    10
}

fn default_user_agent() -> String {
    "NewsDigest/1.0 (Feed Aggregator)".to_string()
}

/// URL fragments that mark tracking pixels, logos and placeholder art.
pub const DEFAULT_REJECT_PATTERNS: &[&str] = &[
    "1x1",
    "pixel",
    "track",
    "logo",
    "placeholder",
    "spacer",
    "blank.gif",
    "doubleclick",
    "feeds.feedburner.com/~r",
];

fn default_reject_patterns() -> Vec<String> {
    DEFAULT_REJECT_PATTERNS.iter().map(|p| p.to_string()).collect()
}

/// One independently served source registry, e.g. `/api/latest`.
#[derive(Debug, Deserialize, Clone)]
pub struct ChannelConfig {
    pub name: String,
    #[serde(default = "default_max_items_per_source")]
    pub max_items_per_source: usize,
    #[serde(default = "default_per_category_cap")]
    pub per_category_cap: usize,
    /// Optional bound on the final list, applied after the recency sort
    #[serde(default)]
    pub max_results: Option<usize>,
    /// Cache lifetime advertised to callers; the pipeline itself keeps nothing
    #[serde(default = "default_cache_seconds")]
    pub cache_seconds: u64,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

fn default_max_items_per_source() -> usize {
    6
}

fn default_per_category_cap() -> usize {
    10
}

fn default_cache_seconds() -> u64 {
    3600
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    pub name: String,
    pub url: String,
    pub category: Category,
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Overrides the channel's `max_items_per_source`
    #[serde(default)]
    pub max_items: Option<usize>,
}

impl ChannelConfig {
    /// Per-source item cap after applying the source's own override.
    pub fn item_cap(&self, source: &SourceConfig) -> usize {
        source.max_items.unwrap_or(self.max_items_per_source)
    }
}

/// Fixed classification used to group and cap output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Technology,
    Finance,
    Food,
    Travel,
    Sports,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Technology,
        Category::Finance,
        Category::Food,
        Category::Travel,
        Category::Sports,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Technology => "technology",
            Category::Finance => "finance",
            Category::Food => "food",
            Category::Travel => "travel",
            Category::Sports => "sports",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no channels configured")]
    NoChannels,
    #[error("channel name must not be empty")]
    EmptyChannelName,
    #[error("duplicate channel name: {0}")]
    DuplicateChannel(String),
    #[error("source '{source_name}' has an invalid url: {url}")]
    InvalidSourceUrl { source_name: String, url: String },
    #[error("{0} must be greater than zero")]
    ZeroValue(String),
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse config from a TOML string (useful for testing)
    pub fn from_str(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.channels.is_empty() {
            return Err(ConfigError::NoChannels);
        }

        let fetch = &self.fetch;
        let limits = [
            ("fetch.source_timeout_secs", fetch.source_timeout_secs),
            ("fetch.image_timeout_secs", fetch.image_timeout_secs),
            ("fetch.image_max_bytes", fetch.image_max_bytes as u64),
            ("fetch.max_source_bytes", fetch.max_source_bytes as u64),
            ("fetch.fallback_concurrency", fetch.fallback_concurrency as u64),
        ];
        if let Some((field, _)) = limits.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::ZeroValue(field.to_string()));
        }

        let mut seen = HashSet::new();
        for channel in &self.channels {
            if channel.name.trim().is_empty() {
                return Err(ConfigError::EmptyChannelName);
            }
            if !seen.insert(channel.name.as_str()) {
                return Err(ConfigError::DuplicateChannel(channel.name.clone()));
            }
            if channel.per_category_cap == 0 {
                return Err(ConfigError::ZeroValue(format!(
                    "channel '{}' per_category_cap",
                    channel.name
                )));
            }
            for source in &channel.sources {
                let valid = Url::parse(&source.url)
                    .map(|u| matches!(u.scheme(), "http" | "https"))
                    .unwrap_or(false);
                if !valid {
                    return Err(ConfigError::InvalidSourceUrl {
                        source_name: source.name.clone(),
                        url: source.url.clone(),
                    });
                }
            }
        }

        Ok(())
    }

    pub fn channel(&self, name: &str) -> Option<&ChannelConfig> {
        self.channels.iter().find(|c| c.name == name)
    }
}
