//! Command-line interface definitions for Hungarian Truth News.
//!
//! This module defines the CLI arguments and options using the `clap` crate.
//! Secrets can be provided via environment variables instead of flags.

use crate::config::Pipeline;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Which model service writes the synthesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// Google Gemini `generateContent` REST API.
    Gemini,
    /// OpenAI-compatible endpoint configured through `awful_aj`.
    Awful,
}

/// Command-line arguments for the daily synthesis run.
///
/// # Examples
///
/// ```sh
/// # Daily run with the Gemini backend (key from GEMINI_API_KEY)
/// hungarian_truth_news -c config_sources.json -d ../data
///
/// # Single-call pipeline against a local OpenAI-compatible server
/// hungarian_truth_news -c config.yaml --backend awful --pipeline single-call
///
/// # Only rebuild data/index.json
/// hungarian_truth_news -d ../data --update-index-only
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Source configuration file (YAML, or JSON when it ends in .json)
    #[arg(short, long, default_value = "config_sources.json")]
    pub config: PathBuf,

    /// Archive directory holding one synthesis per day plus index.json
    #[arg(short, long, env = "NEWS_DATA_DIR", default_value = "../data")]
    pub data_dir: PathBuf,

    /// Model backend
    #[arg(long, value_enum, default_value_t = Backend::Gemini)]
    pub backend: Backend,

    /// Gemini API key
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub gemini_api_key: Option<String>,

    /// Gemini API root, e.g. a proxy in front of generativelanguage.googleapis.com
    #[arg(long, env = "GEMINI_BASE_URL")]
    pub gemini_base_url: Option<String>,

    /// Model name; overrides `synthesis.model` from the configuration
    #[arg(long)]
    pub model: Option<String>,

    /// Orchestration pipeline; overrides `synthesis.pipeline` from the configuration
    #[arg(long, value_enum)]
    pub pipeline: Option<Pipeline>,

    /// Optional path to the awful_aj config.yaml (awful backend)
    #[arg(long)]
    pub awful_config: Option<PathBuf>,

    /// awful_aj chat template name (awful backend)
    #[arg(long, default_value = "hungarian_synthesis")]
    pub awful_template: String,

    /// Where to save a model response that could not be parsed
    #[arg(long, default_value = "gemini_error_response.txt")]
    pub debug_response_path: PathBuf,

    /// Where to dump every scraped article
    #[arg(long, default_value = "raw_articles.json")]
    pub raw_articles_path: PathBuf,

    /// Rebuild index.json from the archive and exit
    #[arg(long)]
    pub update_index_only: bool,

    /// Run date (YYYY-MM-DD); defaults to today
    #[arg(long)]
    pub date: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["hungarian_truth_news"]);

        assert_eq!(cli.config, PathBuf::from("config_sources.json"));
        assert_eq!(cli.backend, Backend::Gemini);
        assert_eq!(cli.pipeline, None);
        assert_eq!(cli.debug_response_path, PathBuf::from("gemini_error_response.txt"));
        assert!(!cli.update_index_only);
    }

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::parse_from([
            "hungarian_truth_news",
            "-c",
            "sources.yaml",
            "-d",
            "/tmp/data",
            "--backend",
            "awful",
            "--pipeline",
            "single-call",
            "--model",
            "gemini-2.5-pro",
            "--date",
            "2025-01-02",
            "--gemini-base-url",
            "http://localhost:8080/v1beta",
        ]);

        assert_eq!(cli.config, PathBuf::from("sources.yaml"));
        assert_eq!(cli.data_dir, PathBuf::from("/tmp/data"));
        assert_eq!(cli.backend, Backend::Awful);
        assert_eq!(cli.pipeline, Some(Pipeline::SingleCall));
        assert_eq!(cli.model.as_deref(), Some("gemini-2.5-pro"));
        assert_eq!(cli.date.as_deref(), Some("2025-01-02"));
        assert_eq!(cli.gemini_base_url.as_deref(), Some("http://localhost:8080/v1beta"));
    }

    #[test]
    fn test_cli_update_index_only() {
        let cli = Cli::parse_from(["hungarian_truth_news", "--update-index-only"]);
        assert!(cli.update_index_only);
    }
}
