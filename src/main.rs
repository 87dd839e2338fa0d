//! # Hungarian Truth News
//!
//! A daily news pipeline that collects articles from Hungarian outlets across
//! the political spectrum and has an LLM write a neutral, bilingual
//! (Hungarian/English) synthesis of the day's most important stories.
//!
//! ## Features
//!
//! - Reads RSS/Atom feeds and scrapes outlet homepages, grouped by leaning
//! - Two-step synthesis (identify stories, then expand each) or a single call
//! - Tolerates fenced, truncated and malformed model JSON
//! - Marks stories that continue one from the previous days
//! - Archives one JSON document per day and maintains `index.json`
//!
//! ## Usage
//!
//! ```sh
//! GEMINI_API_KEY=... hungarian_truth_news -c config_sources.json -d ../data
//! ```
//!
//! ## Architecture
//!
//! The application follows a pipeline architecture:
//! 1. **Collection**: Fetch every configured source and group by leaning
//! 2. **History**: Load recent archived stories for continuity
//! 3. **Synthesis**: Drive the model through the configured pipeline
//! 4. **Output**: Write the dated document and regenerate the index

use chrono::Local;
use clap::Parser;
use std::error::Error;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod api;
mod cli;
mod config;
mod error;
mod extract;
mod history;
mod models;
mod outputs;
mod prompts;
mod repair;
mod scrapers;
mod synthesis;
mod utils;

use api::{AwfulAjModel, GeminiModel, GenerativeModel, ModelBackend};
use cli::{Backend, Cli};
use error::SynthesisError;
use history::HistoryLoader;
use models::parse_date;
use outputs::{archive, index};
use synthesis::SynthesisOrchestrator;
use utils::ensure_writable_dir;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("hungarian_truth_news starting up");

    // Parse CLI
    let args = Cli::parse();
    debug!(config = %args.config.display(), data_dir = %args.data_dir.display(), backend = ?args.backend, "Parsed CLI arguments");

    if args.update_index_only {
        let path = index::update_index(&args.data_dir).await?;
        info!(path = %path.display(), "Index regenerated");
        return Ok(());
    }

    let run_date = match args.date.as_deref() {
        Some(raw) => parse_date(raw).ok_or_else(|| format!("Invalid --date {raw:?}; expected YYYY-MM-DD"))?,
        None => Local::now().date_naive(),
    };

    // ---- Configuration ----
    let mut config = config::load_config(&args.config).await?;
    if let Some(model) = &args.model {
        config.synthesis.model = model.clone();
    }
    if let Some(pipeline) = args.pipeline {
        config.synthesis.pipeline = pipeline;
    }

    // Resolve the history dir before the archive dir is created below
    let history_loader = HistoryLoader::new(&args.data_dir);

    // Early check: ensure the archive dir is writable
    if let Err(e) = ensure_writable_dir(&args.data_dir).await {
        error!(
            path = %args.data_dir.display(),
            error = %e,
            "Archive directory is not writable (fix perms or choose a different path)"
        );
        return Err(e);
    }

    // ---- Model backend (before scraping, so a missing key fails fast) ----
    let model = match args.backend {
        Backend::Gemini => {
            let mut gemini = GeminiModel::new(
                args.gemini_api_key.clone(),
                &config.synthesis.model,
                config.synthesis.call_timeout(),
            )?;
            if let Some(base_url) = &args.gemini_base_url {
                gemini = gemini.with_base_url(base_url);
            }
            ModelBackend::Gemini(gemini)
        }
        Backend::Awful => ModelBackend::AwfulAj(
            AwfulAjModel::load(
                args.awful_config.as_deref(),
                &args.awful_template,
                args.model.as_deref().unwrap_or("awful_aj"),
            )
            .await?,
        ),
    };
    info!(model = model.name(), pipeline = ?config.synthesis.pipeline, %run_date, "Model backend ready");

    // ---- Collect articles ----
    let articles = scrapers::collect_articles(&config).await?;
    if articles.is_empty() {
        error!("No articles collected! Exiting.");
        return Err(SynthesisError::NoArticles.into());
    }

    if let Err(e) = archive::write_raw_articles(&articles, &args.raw_articles_path, Local::now()).await {
        warn!(path = %args.raw_articles_path.display(), error = %e, "Failed to save raw articles; continuing");
    }

    // ---- Historical context ----
    let history = history_loader
        .load(
            run_date,
            config.synthesis.history_days,
            config.synthesis.history_stories_per_day,
        )
        .await;

    // ---- Synthesis ----
    let document = SynthesisOrchestrator::new(&model, &config.synthesis)
        .with_debug_path(args.debug_response_path.clone())
        .run(&articles, &history, run_date)
        .await?;

    for (i, story) in document.stories.iter().enumerate() {
        info!(
            index = i + 1,
            title = %story.display_title(),
            ongoing = story.is_ongoing,
            sources = story.sources_analyzed.len(),
            "Synthesized story"
        );
    }

    // ---- Output ----
    let path = archive::write_synthesis(&document, &args.data_dir).await?;

    if let Err(e) = index::update_index(&args.data_dir).await {
        error!(error = %e, "Failed to update index.json");
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        path = %path.display(),
        stories = document.stories.len(),
        method = ?document.metadata.generation_method,
        "Execution complete"
    );

    Ok(())
}
