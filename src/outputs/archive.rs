//! Archive writers for the daily synthesis and its side files.
//!
//! # Output Structure
//!
//! ```text
//! data_dir/
//! ├── 2025-05-05.json
//! ├── 2025-05-06.json     # one document per day, replaced on re-run
//! └── index.json
//! ```
//!
//! A day's document is serialized in full before anything touches the disk,
//! then written to a temporary sibling and renamed over the target. A reader
//! never observes a partial file, and a failed run leaves the previous
//! document for that day in place.

use crate::models::{Article, CategorizedArticles, SynthesisDocument};
use chrono::{DateTime, Local};
use serde::Serialize;
use std::error::Error;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{error, info, instrument};

/// Path of the archive file for `date` (`YYYY-MM-DD`).
pub fn synthesis_path(data_dir: &Path, date: &str) -> PathBuf {
    data_dir.join(format!("{date}.json"))
}

/// Write `doc` to `{data_dir}/{doc.date}.json`, replacing any earlier file.
///
/// # Returns
///
/// The path written, or an error if serialization, directory creation or
/// the write itself fails.
#[instrument(level = "info", skip_all, fields(data_dir = %data_dir.display(), date = %doc.date))]
pub async fn write_synthesis(doc: &SynthesisDocument, data_dir: &Path) -> Result<PathBuf, Box<dyn Error>> {
    let json = serde_json::to_string_pretty(doc)?;

    if let Err(e) = fs::create_dir_all(data_dir).await {
        error!(error = %e, "Failed to create archive dir");
        return Err(e.into());
    }

    let path = synthesis_path(data_dir, &doc.date);
    replace_file(&path, json.as_bytes()).await?;
    info!(path = %path.display(), stories = doc.stories.len(), "Wrote synthesis");
    Ok(path)
}

/// Save a raw model response that could not be parsed.
pub async fn write_debug_response(path: &Path, text: &str) -> Result<(), Box<dyn Error>> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await?;
    }
    fs::write(path, text).await?;
    Ok(())
}

#[derive(Serialize)]
struct RawArticlesDump<'a> {
    scrape_date: DateTime<Local>,
    total_articles: usize,
    articles: Vec<&'a Article>,
    by_category: &'a CategorizedArticles,
}

/// Dump everything collected this run, flat and grouped by leaning.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn write_raw_articles(
    articles: &CategorizedArticles,
    path: &Path,
    scrape_date: DateTime<Local>,
) -> Result<(), Box<dyn Error>> {
    let dump = RawArticlesDump {
        scrape_date,
        total_articles: articles.total(),
        articles: articles.iter().map(|(_, a)| a).collect(),
        by_category: articles,
    };
    let json = serde_json::to_string_pretty(&dump)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await?;
    }
    replace_file(path, json.as_bytes()).await?;
    info!(total = articles.total(), "Saved raw articles");
    Ok(())
}

/// Write `contents` to a temporary sibling of `path`, then rename it into place.
pub(crate) async fn replace_file(path: &Path, contents: &[u8]) -> Result<(), Box<dyn Error>> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, contents).await?;
    if let Err(e) = fs::rename(&tmp, path).await {
        error!(path = %path.display(), error = %e, "Failed to move file into place");
        let _ = fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GenerationMethod, Leaning, Story, SynthesisMetadata};

    fn document(date: &str, titles: &[&str]) -> SynthesisDocument {
        SynthesisDocument {
            date: date.to_string(),
            stories: titles
                .iter()
                .map(|t| Story {
                    title_hu: t.to_string(),
                    ..Story::default()
                })
                .collect(),
            methodology_note_hu: "hu".to_string(),
            methodology_note_en: "en".to_string(),
            metadata: SynthesisMetadata {
                sources_scraped: 4,
                generation_time: Local::now(),
                ai_model: "test".to_string(),
                generation_method: GenerationMethod::TwoStep,
            },
        }
    }

    #[tokio::test]
    async fn test_write_synthesis_creates_dated_file() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("data");

        let path = write_synthesis(&document("2025-01-02", &["A"]), &dir).await.unwrap();

        assert_eq!(path, dir.join("2025-01-02.json"));
        let value: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["stories"][0]["title_hu"], "A");
        assert_eq!(value["metadata"]["generation_method"], "two_step");
        assert!(!dir.join("2025-01-02.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_second_write_for_same_day_replaces_first() {
        let tmp = tempfile::tempdir().unwrap();

        write_synthesis(&document("2025-01-02", &["first", "run"]), tmp.path())
            .await
            .unwrap();
        let path = write_synthesis(&document("2025-01-02", &["second"]), tmp.path())
            .await
            .unwrap();

        let doc: SynthesisDocument = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(doc.stories.len(), 1);
        assert_eq!(doc.stories[0].title_hu, "second");
    }

    #[tokio::test]
    async fn test_raw_articles_dump_shape() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("raw_articles.json");
        let mut articles = CategorizedArticles::new();
        articles.push(
            Leaning::LeftWing,
            Article {
                source: "Népszava".to_string(),
                title: "Cím".to_string(),
                link: "https://nepszava.hu/1".to_string(),
                summary: None,
                published: None,
            },
        );

        write_raw_articles(&articles, &path, Local::now()).await.unwrap();

        let value: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["total_articles"], 1);
        assert_eq!(value["articles"][0]["source"], "Népszava");
        assert_eq!(value["by_category"]["left_wing"][0]["title"], "Cím");
    }

    #[tokio::test]
    async fn test_debug_response_creates_parent() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("debug").join("response.txt");
        write_debug_response(&path, "raw").await.unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "raw");
    }
}
