//! Regeneration of the archive index (`index.json`).
//!
//! The index is rebuilt from scratch on every run by scanning the archive
//! directory, so it always reflects exactly the documents present:
//!
//! ```json
//! {
//!   "available_dates": ["2025-05-06", "2025-05-05"],
//!   "story_counts": {"2025-05-05": 3, "2025-05-06": 2},
//!   "last_updated": "2025-05-06T07:00:12.345+02:00",
//!   "total_files": 2
//! }
//! ```
//!
//! Only files named `YYYY-MM-DD.json` are listed. A document that cannot be
//! read still appears, with a story count of zero.

use crate::models::{ArchiveIndex, ArchivedSynthesis, DATE_FORMAT, parse_date};
use crate::outputs::archive::replace_file;
use chrono::Local;
use std::collections::BTreeMap;
use std::error::Error;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, instrument, warn};

pub const INDEX_FILE_NAME: &str = "index.json";

/// Build the index for `data_dir` without writing it.
pub async fn build_index(data_dir: &Path) -> Result<ArchiveIndex, Box<dyn Error>> {
    let mut story_counts = BTreeMap::new();

    let mut entries = fs::read_dir(data_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let Some(date) = archive_date(&path) else {
            continue;
        };

        let count = match fs::read_to_string(&path).await {
            Ok(text) => match serde_json::from_str::<ArchivedSynthesis>(&text) {
                Ok(doc) => doc.stories.len(),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Unreadable synthesis; counting zero stories");
                    0
                }
            },
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Could not read synthesis; counting zero stories");
                0
            }
        };
        debug!(%date, count, "Indexed synthesis");
        story_counts.insert(date, count);
    }

    // ISO dates sort lexicographically; newest first.
    let available_dates: Vec<String> = story_counts.keys().rev().cloned().collect();
    Ok(ArchiveIndex {
        total_files: available_dates.len(),
        available_dates,
        story_counts,
        last_updated: Local::now(),
    })
}

/// Rebuild `{data_dir}/index.json` from the documents in `data_dir`.
#[instrument(level = "info", skip_all, fields(data_dir = %data_dir.display()))]
pub async fn update_index(data_dir: &Path) -> Result<PathBuf, Box<dyn Error>> {
    fs::create_dir_all(data_dir).await?;
    let index = build_index(data_dir).await?;

    let path = data_dir.join(INDEX_FILE_NAME);
    let json = serde_json::to_string_pretty(&index)?;
    replace_file(&path, json.as_bytes()).await?;
    info!(dates = index.total_files, path = %path.display(), "Updated archive index");
    Ok(path)
}

/// The canonical date of an archive document path, if it is one.
fn archive_date(path: &Path) -> Option<String> {
    if path.extension().and_then(|e| e.to_str()) != Some("json") {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    let date = parse_date(stem)?;
    // Reject stems like "2025-1-2" that parse but are not canonical file names.
    let canonical = date.format(DATE_FORMAT).to_string();
    (canonical == stem).then_some(canonical)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn write(dir: &Path, name: &str, contents: &str) {
        std::fs::write(dir.join(name), contents).unwrap();
    }

    #[tokio::test]
    async fn test_index_lists_dated_documents_newest_first() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path();
        write(dir, "2025-01-01.json", &json!({"stories": [{}, {}, {}]}).to_string());
        write(dir, "2025-01-03.json", &json!({"stories": [{}]}).to_string());
        write(dir, "2025-01-02.json", "{ not json");
        write(dir, "index.json", "{}");
        write(dir, "raw_articles.json", "{}");
        write(dir, "2025-01-04.txt", "ignored");

        let path = update_index(dir).await.unwrap();
        let index: ArchiveIndex = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();

        assert_eq!(index.available_dates, vec!["2025-01-03", "2025-01-02", "2025-01-01"]);
        assert_eq!(index.total_files, 3);
        assert_eq!(index.story_counts["2025-01-01"], 3);
        assert_eq!(index.story_counts["2025-01-02"], 0);
        assert_eq!(index.story_counts["2025-01-03"], 1);
    }

    #[tokio::test]
    async fn test_index_of_empty_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let index = build_index(tmp.path()).await.unwrap();
        assert!(index.available_dates.is_empty());
        assert_eq!(index.total_files, 0);
    }

    #[tokio::test]
    async fn test_rerun_reflects_new_documents() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "2025-01-01.json", &json!({"stories": []}).to_string());
        update_index(tmp.path()).await.unwrap();
        write(tmp.path(), "2025-01-02.json", &json!({"stories": [{}]}).to_string());

        let index = build_index(tmp.path()).await.unwrap();
        assert_eq!(index.available_dates, vec!["2025-01-02", "2025-01-01"]);
    }

    #[test]
    fn test_archive_date_requires_canonical_stem() {
        assert_eq!(archive_date(Path::new("d/2025-01-02.json")).as_deref(), Some("2025-01-02"));
        assert_eq!(archive_date(Path::new("d/2025-1-2.json")), None);
        assert_eq!(archive_date(Path::new("d/index.json")), None);
        assert_eq!(archive_date(Path::new("d/2025-01-02.json.tmp")), None);
    }
}
