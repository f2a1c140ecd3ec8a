use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable consulted for the API key when neither the CLI nor
/// the config file provides one.
pub const API_KEY_ENV: &str = "YOUTUBE_API_KEY";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub harvest: HarvestConfig,
    #[serde(default)]
    pub search: SearchConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

fn default_store_path() -> PathBuf {
    PathBuf::from("./data/comments.sqlite")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_results")]
    pub max_results: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            key: None,
            timeout_secs: default_timeout_secs(),
            max_results: default_max_results(),
        }
    }
}

fn default_base_url() -> String {
    "https://www.googleapis.com/youtube/v3".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_results() -> u32 {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct HarvestConfig {
    #[serde(default = "default_reply_concurrency")]
    pub reply_concurrency: usize,
    #[serde(default)]
    pub max_pages: Option<usize>,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            reply_concurrency: default_reply_concurrency(),
            max_pages: None,
        }
    }
}

fn default_reply_concurrency() -> usize {
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default)]
    pub webpage_url: Option<String>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            webpage_url: None,
        }
    }
}

fn default_page_size() -> u32 {
    20
}

impl Config {
    /// Resolve the API key: explicit override, then config, then environment.
    pub fn api_key(&self, override_key: Option<&str>) -> Option<String> {
        override_key
            .map(str::to_string)
            .or_else(|| self.api.key.clone())
            .or_else(|| std::env::var(API_KEY_ENV).ok())
            .filter(|k| !k.trim().is_empty())
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=100).contains(&self.api.max_results) {
            bail!("api.max_results must be in [1, 100]");
        }
        if self.api.timeout_secs == 0 {
            bail!("api.timeout_secs must be >= 1");
        }
        if self.harvest.reply_concurrency == 0 {
            bail!("harvest.reply_concurrency must be >= 1");
        }
        if self.harvest.max_pages == Some(0) {
            bail!("harvest.max_pages must be >= 1 when set");
        }
        if self.search.page_size == 0 {
            bail!("search.page_size must be >= 1");
        }
        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;

    Ok(config)
}

/// Load `path` if given; otherwise the default location if it exists,
/// falling back to built-in defaults.
pub fn load_or_default(path: Option<&Path>, default_path: &Path) -> Result<Config> {
    match path {
        Some(p) => load_config(p),
        None if default_path.exists() => load_config(default_path),
        None => Ok(Config::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.api.max_results, 100);
        assert_eq!(config.harvest.reply_concurrency, 4);
        assert_eq!(config.search.page_size, 20);
        assert!(config.harvest.max_pages.is_none());
        config.validate().unwrap();
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config: Config = toml::from_str(
            r#"
            [store]
            path = "/tmp/x.sqlite"

            [api]
            timeout_secs = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.store.path, PathBuf::from("/tmp/x.sqlite"));
        assert_eq!(config.api.timeout_secs, 5);
        assert_eq!(config.api.base_url, "https://www.googleapis.com/youtube/v3");
    }

    #[test]
    fn validation_rejects_out_of_range() {
        let mut config = Config::default();
        config.api.max_results = 101;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.harvest.reply_concurrency = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.harvest.max_pages = Some(0);
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.search.page_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn example_config_is_valid() {
        let config: Config = toml::from_str(include_str!("../config/chv.example.toml")).unwrap();
        config.validate().unwrap();
        assert_eq!(config.harvest.reply_concurrency, 4);
        assert!(config.api.key.is_none());
    }

    #[test]
    fn api_key_override_wins() {
        let mut config = Config::default();
        config.api.key = Some("from-config".to_string());
        assert_eq!(config.api_key(Some("cli")).as_deref(), Some("cli"));
        assert_eq!(config.api_key(None).as_deref(), Some("from-config"));
    }
}
