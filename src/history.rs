//! Load recent synthesis documents as continuity context.
//!
//! The archive directory is located by trying a short list of candidates,
//! because the binary runs both from the repository root and from inside the
//! scraper directory. Missing or unreadable files never fail a run: they are
//! logged and skipped.

use crate::models::{ArchivedSynthesis, DATE_FORMAT, PreviousStory};
use chrono::{Duration, NaiveDate};
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

/// Relative archive locations tried after the configured one.
pub const FALLBACK_ARCHIVE_DIRS: [&str; 3] = ["../data", "data", "./data"];

#[derive(Debug, Clone)]
pub struct HistoryLoader {
    candidates: Vec<PathBuf>,
    archive_dir: Option<PathBuf>,
}

impl HistoryLoader {
    /// Look in `data_dir` first, then in [`FALLBACK_ARCHIVE_DIRS`].
    ///
    /// The directory is resolved here, so build the loader before anything
    /// creates `data_dir`; otherwise the fallbacks are never consulted.
    pub fn new(data_dir: &Path) -> Self {
        let mut candidates = vec![data_dir.to_path_buf()];
        candidates.extend(
            FALLBACK_ARCHIVE_DIRS
                .iter()
                .map(PathBuf::from)
                .filter(|p| p != data_dir),
        );
        Self::with_candidates(candidates)
    }

    /// Only look in the given directories, in order.
    pub fn with_candidates(candidates: Vec<PathBuf>) -> Self {
        let archive_dir = candidates.iter().find(|p| p.is_dir()).cloned();
        Self { candidates, archive_dir }
    }

    /// First candidate that existed as a directory when the loader was built.
    pub fn archive_dir(&self) -> Option<&Path> {
        self.archive_dir.as_deref()
    }

    /// Stories from the `days_back` days before `today`, newest day first.
    ///
    /// Each day contributes at most `per_day` stories, in file order, each
    /// stamped with the day it came from. `today` itself is never read.
    #[instrument(level = "info", skip_all, fields(%today, days_back, per_day))]
    pub async fn load(&self, today: NaiveDate, days_back: u32, per_day: usize) -> Vec<PreviousStory> {
        let Some(dir) = self.archive_dir() else {
            warn!(candidates = ?self.candidates, "No archive directory found; continuing without history");
            return Vec::new();
        };

        let mut history = Vec::new();
        for offset in 1..=i64::from(days_back) {
            let date = (today - Duration::days(offset)).format(DATE_FORMAT).to_string();
            let path = dir.join(format!("{date}.json"));

            let text = match tokio::fs::read_to_string(&path).await {
                Ok(text) => text,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    debug!(%date, "No synthesis for this day");
                    continue;
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Could not read previous synthesis");
                    continue;
                }
            };
            let archived: ArchivedSynthesis = match serde_json::from_str(&text) {
                Ok(doc) => doc,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping corrupt previous synthesis");
                    continue;
                }
            };

            let before = history.len();
            history.extend(archived.stories.into_iter().take(per_day).map(|story| PreviousStory {
                previous_date: date.clone(),
                story,
            }));
            debug!(%date, loaded = history.len() - before, "Loaded previous stories");
        }

        info!(dir = %dir.display(), stories = history.len(), "Loaded historical context");
        history
    }
}
