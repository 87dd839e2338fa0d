//! Source and synthesis configuration.
//!
//! The configuration file lists every outlet per editorial leaning plus the
//! scraping limits, and optionally overrides synthesis settings. YAML is the
//! default format; files ending in `.json` are parsed as JSON, which is how the shipped
//! `config_sources.json` is read.
//!
//! ```yaml
//! sources:
//!   right_wing:
//!     - { name: Magyar Nemzet, type: rss, rss_url: "https://magyarnemzet.hu/feed" }
//!     - { name: Origo, type: custom, scraper: origo }
//!   left_wing:
//!     - { name: Népszava, type: rss, rss_url: "https://nepszava.hu/feed" }
//!   independent:
//!     - { name: Telex, type: rss, rss_url: "https://telex.hu/rss" }
//! scraping_settings:
//!   max_articles_per_source: 10
//!   max_article_age_hours: 24
//! synthesis:
//!   max_stories: 3
//! ```

use crate::models::Leaning;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::error::Error;
use std::path::Path;
use std::time::Duration;
use tracing::{info, instrument};

/// Top-level configuration file.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub sources: BTreeMap<Leaning, Vec<SourceConfig>>,
    #[serde(default)]
    pub scraping_settings: ScrapingSettings,
    #[serde(default)]
    pub synthesis: SynthesisSettings,
}

impl AppConfig {
    /// Map every configured source name to its leaning.
    pub fn leaning_by_source(&self) -> BTreeMap<String, Leaning> {
        self.sources
            .iter()
            .flat_map(|(leaning, sources)| sources.iter().map(move |s| (s.name.clone(), *leaning)))
            .collect()
    }
}

/// One configured outlet.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SourceConfig {
    pub name: String,
    #[serde(flatten)]
    pub kind: SourceKind,
}

/// How articles are obtained from an outlet.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceKind {
    /// RSS 2.0 or Atom feed.
    Rss { rss_url: String },
    /// Site-specific scraper resolved through the scraper registration table.
    Custom { scraper: String },
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ScrapingSettings {
    pub max_articles_per_source: usize,
    pub max_article_age_hours: i64,
    pub request_timeout_secs: u64,
}

impl Default for ScrapingSettings {
    fn default() -> Self {
        Self {
            max_articles_per_source: 10,
            max_article_age_hours: 24,
            request_timeout_secs: 30,
        }
    }
}

/// Which orchestration strategy produces the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Pipeline {
    /// Identify candidate stories, then expand each with its own call.
    TwoStep,
    /// Ask for the whole document in one call.
    SingleCall,
}

/// Sampling parameters for one kind of model call.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct GenerationParams {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_output_tokens: u32,
}

impl GenerationParams {
    /// Factual, low-temperature sampling capped at `max_output_tokens`.
    pub const fn factual(max_output_tokens: u32) -> Self {
        Self {
            temperature: 0.3,
            top_p: 0.8,
            top_k: 40,
            max_output_tokens,
        }
    }
}

/// Tunables for the synthesis core. Every field has a default.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SynthesisSettings {
    pub model: String,
    pub pipeline: Pipeline,
    /// Stories requested on the first identification attempt; also the cap on the document.
    pub max_stories: usize,
    /// Stories requested on every identification retry.
    pub retry_max_stories: usize,
    pub identify_attempts: usize,
    pub single_call_attempts: usize,
    pub history_days: u32,
    pub history_stories_per_day: usize,
    pub call_timeout_secs: u64,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    pub summary_max_chars: usize,
    pub identification: GenerationParams,
    pub expansion: GenerationParams,
    pub full_synthesis: GenerationParams,
}

impl Default for SynthesisSettings {
    fn default() -> Self {
        Self {
            model: "gemini-2.5-flash".to_string(),
            pipeline: Pipeline::TwoStep,
            max_stories: 3,
            retry_max_stories: 2,
            identify_attempts: 3,
            single_call_attempts: 3,
            history_days: 3,
            history_stories_per_day: 3,
            call_timeout_secs: 120,
            backoff_base_ms: 1000,
            backoff_max_ms: 30_000,
            summary_max_chars: 4000,
            identification: GenerationParams::factual(2048),
            expansion: GenerationParams::factual(4096),
            full_synthesis: GenerationParams::factual(8192),
        }
    }
}

impl SynthesisSettings {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

/// Parse configuration text, picking JSON or YAML by the file extension.
pub fn parse_config(text: &str, path: &Path) -> Result<AppConfig, Box<dyn Error>> {
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));
    let config: AppConfig = if is_json {
        serde_json::from_str(text)?
    } else {
        serde_yaml::from_str(text)?
    };
    Ok(config)
}

/// Load and parse the configuration file at `path`.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn load_config(path: &Path) -> Result<AppConfig, Box<dyn Error>> {
    let text = tokio::fs::read_to_string(path).await?;
    let config = parse_config(&text, path)?;
    let source_count: usize = config.sources.values().map(Vec::len).sum();
    info!(sources = source_count, pipeline = ?config.synthesis.pipeline, "Loaded configuration");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
sources:
  right_wing:
    - { name: Magyar Nemzet, type: rss, rss_url: "https://magyarnemzet.hu/feed" }
    - { name: Origo, type: custom, scraper: origo }
  independent:
    - { name: Telex, type: rss, rss_url: "https://telex.hu/rss" }
scraping_settings:
  max_articles_per_source: 5
synthesis:
  max_stories: 2
  pipeline: single_call
"#;

    #[test]
    fn test_parse_yaml_config() {
        let config = parse_config(YAML, Path::new("config.yaml")).unwrap();
        let right = &config.sources[&Leaning::RightWing];
        assert_eq!(right.len(), 2);
        assert_eq!(
            right[1].kind,
            SourceKind::Custom {
                scraper: "origo".to_string()
            }
        );
        assert_eq!(config.scraping_settings.max_articles_per_source, 5);
        assert_eq!(config.scraping_settings.max_article_age_hours, 24);
        assert_eq!(config.synthesis.max_stories, 2);
        assert_eq!(config.synthesis.retry_max_stories, 2);
        assert_eq!(config.synthesis.pipeline, Pipeline::SingleCall);
    }

    #[test]
    fn test_parse_json_config_without_synthesis_section() {
        let json = r#"{
            "sources": {
                "left_wing": [{"name": "Népszava", "type": "rss", "rss_url": "https://nepszava.hu/feed"}]
            },
            "scraping_settings": {"max_articles_per_source": 10, "max_article_age_hours": 12}
        }"#;
        let config = parse_config(json, Path::new("config_sources.json")).unwrap();
        assert_eq!(config.scraping_settings.max_article_age_hours, 12);
        assert_eq!(config.synthesis.max_stories, 3);
        assert_eq!(config.synthesis.identification.max_output_tokens, 2048);
        assert_eq!(config.synthesis.full_synthesis.top_k, 40);
    }

    #[test]
    fn test_leaning_by_source() {
        let config = parse_config(YAML, Path::new("config.yml")).unwrap();
        let map = config.leaning_by_source();
        assert_eq!(map["Origo"], Leaning::RightWing);
        assert_eq!(map["Telex"], Leaning::Independent);
    }

    #[test]
    fn test_unknown_source_type_is_rejected() {
        let yaml = "sources:\n  independent:\n    - { name: X, type: carrier_pigeon }\n";
        assert!(parse_config(yaml, Path::new("c.yaml")).is_err());
    }
}
