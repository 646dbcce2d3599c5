use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::constants;
use crate::error::{PipelineError, Result};

/// Runtime configuration, loaded from `config.toml`. Every section has
/// defaults so tests can run on `Config::default()`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub search: SearchConfig,
    pub extraction: ExtractionConfig,
    pub curation: CurationConfig,
    pub run: RunConfig,
    pub model: ModelConfig,
    pub source: SourceConfig,
    pub cities: Vec<CityConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub max_results: usize,
    pub query_timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_results: constants::SEARCH_RESULTS_PER_QUERY,
            query_timeout_secs: 20,
        }
    }
}

impl SearchConfig {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    pub concurrency: usize,
    pub min_content_chars: usize,
    pub content_budget_chars: usize,
    pub page_timeout_secs: u64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            concurrency: 5,
            min_content_chars: constants::MIN_CONTENT_CHARS,
            content_budget_chars: constants::CONTENT_BUDGET_CHARS,
            page_timeout_secs: 45,
        }
    }
}

impl ExtractionConfig {
    /// Concurrency permits, clamped to the supported 3..=10 band.
    pub fn permits(&self) -> usize {
        self.concurrency.clamp(3, 10)
    }

    pub fn page_timeout(&self) -> Duration {
        Duration::from_secs(self.page_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CurationConfig {
    pub batch_size: usize,
    pub request_timeout_secs: u64,
}

impl Default for CurationConfig {
    fn default() -> Self {
        Self {
            batch_size: constants::CURATOR_BATCH_SIZE,
            request_timeout_secs: 60,
        }
    }
}

impl CurationConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub deadline_secs: u64,
    pub stale_after_minutes: i64,
    pub max_urls: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            deadline_secs: 300,
            stale_after_minutes: constants::STALE_RUN_MINUTES,
            max_urls: constants::MAX_DISCOVERED_URLS,
        }
    }
}

impl RunConfig {
    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub name: String,
    pub temperature: f32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: "gpt-4o-mini".to_string(),
            temperature: 0.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub name: String,
    pub reliability: u8,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            name: "web-discovery".to_string(),
            reliability: 70,
        }
    }
}

/// One seed city for the in-memory store.
#[derive(Debug, Clone, Deserialize)]
pub struct CityConfig {
    pub name: String,
    #[serde(default)]
    pub province: Option<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new("config.toml"))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_stay_in_band() {
        let config = Config::default();
        assert!(config.extraction.permits() >= 3 && config.extraction.permits() <= 10);
        assert_eq!(config.curation.batch_size, constants::CURATOR_BATCH_SIZE);
        assert_eq!(config.model.temperature, 0.0);
    }

    #[test]
    fn test_permits_clamped() {
        let mut extraction = ExtractionConfig::default();
        extraction.concurrency = 1;
        assert_eq!(extraction.permits(), 3);
        extraction.concurrency = 64;
        assert_eq!(extraction.permits(), 10);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [run]
            max_urls = 10

            [[cities]]
            name = "Córdoba"
            province = "Córdoba"
            aliases = ["cba"]
            "#,
        )
        .unwrap();
        assert_eq!(config.run.max_urls, 10);
        assert_eq!(config.run.deadline_secs, 300);
        assert_eq!(config.cities.len(), 1);
        assert_eq!(config.cities[0].aliases, vec!["cba".to_string()]);
    }
}
