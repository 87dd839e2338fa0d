//! Data models for ingested articles, story records and the persisted synthesis.
//!
//! This module defines the core data structures used throughout the application:
//! - [`Article`]: A single scraped or syndicated article, read-only to the synthesis core
//! - [`CategorizedArticles`]: Articles grouped by editorial [`Leaning`]
//! - [`StoryDraft`]: Output of the identification stage, drives one expansion call
//! - [`Story`]: A fully expanded, bilingual story record
//! - [`PreviousStory`]: A story loaded from a prior day's archive file
//! - [`SynthesisDocument`]: The artifact written once per day to the archive
//! - [`ArchiveIndex`]: The summary of every dated document in the archive
//!
//! Field names are snake_case on the wire to match the JSON schema given to
//! the model in the prompt.

use chrono::{DateTime, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Date format used for archive file names and every date field on the wire.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Editorial leaning of a news source.
///
/// The set is closed: every configured source belongs to exactly one bucket,
/// and sources missing from the configuration fall back to [`Leaning::Independent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Leaning {
    RightWing,
    LeftWing,
    Independent,
}

impl Leaning {
    /// Every leaning, in the order buckets are rendered into prompts.
    pub const ALL: [Leaning; 3] = [Leaning::RightWing, Leaning::LeftWing, Leaning::Independent];

    /// Section heading used when the bucket is rendered into a prompt.
    pub fn heading(self) -> &'static str {
        match self {
            Leaning::RightWing => "RIGHT-WING/GOVERNMENT SOURCES",
            Leaning::LeftWing => "LEFT-WING/OPPOSITION SOURCES",
            Leaning::Independent => "INDEPENDENT SOURCES",
        }
    }

    /// Short label used inside article listings.
    pub fn label(self) -> &'static str {
        match self {
            Leaning::RightWing => "right-wing",
            Leaning::LeftWing => "left-wing",
            Leaning::Independent => "independent",
        }
    }
}

/// A single news article as delivered by ingestion.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Article {
    /// Configured name of the outlet (e.g. "Telex").
    pub source: String,
    pub title: String,
    pub link: String,
    /// Plain-text teaser, already stripped of markup and capped in length.
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub published: Option<DateTime<Local>>,
}

/// Articles grouped by editorial leaning.
///
/// Built once per run by ingestion and never mutated by the synthesis core.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(transparent)]
pub struct CategorizedArticles {
    buckets: BTreeMap<Leaning, Vec<Article>>,
}

impl CategorizedArticles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an article to the bucket for `leaning`.
    pub fn push(&mut self, leaning: Leaning, article: Article) {
        self.buckets.entry(leaning).or_default().push(article);
    }

    /// Articles for one leaning, empty when nothing was collected.
    pub fn get(&self, leaning: Leaning) -> &[Article] {
        self.buckets.get(&leaning).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Total number of articles across every bucket.
    pub fn total(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Every article paired with its leaning, buckets visited in [`Leaning::ALL`] order.
    pub fn iter(&self) -> impl Iterator<Item = (Leaning, &Article)> {
        Leaning::ALL
            .into_iter()
            .flat_map(move |leaning| self.get(leaning).iter().map(move |a| (leaning, a)))
    }
}

/// Identification-stage output: a story the model considers worth expanding.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StoryDraft {
    #[serde(default)]
    pub story_id: u32,
    #[serde(default)]
    pub title_hu: String,
    #[serde(default)]
    pub title_en: String,
    #[serde(default)]
    pub is_ongoing: bool,
    #[serde(default)]
    pub previous_date: Option<String>,
}

impl StoryDraft {
    /// Synthetic draft used when identification never produced a usable list.
    pub fn placeholder() -> Self {
        Self {
            story_id: 1,
            title_hu: "Fontos hírek".to_string(),
            title_en: "Important news".to_string(),
            is_ongoing: false,
            previous_date: None,
        }
    }
}

/// A fully expanded, bilingual story.
///
/// Invariant: `is_ongoing == true` implies `previous_date` names a date for
/// which a [`PreviousStory`] was loaded. The orchestrator enforces this before
/// a story reaches a [`SynthesisDocument`].
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Story {
    pub title_hu: String,
    pub title_en: String,
    pub summary_hu: String,
    pub summary_en: String,
    pub sources_analyzed: Vec<String>,
    pub perspective_comparison: String,
    pub key_facts: Vec<String>,
    pub is_ongoing: bool,
    pub previous_date: Option<String>,
}

impl Story {
    /// Minimal bilingual stand-in for a story whose expansion failed.
    ///
    /// Keeps the draft's titles and continuity flags so the document still
    /// lists the story in its identified position.
    pub fn placeholder_for(draft: &StoryDraft) -> Self {
        Self {
            title_hu: draft.title_hu.clone(),
            title_en: draft.title_en.clone(),
            summary_hu: "A történet részletes összefoglalója jelenleg nem érhető el.".to_string(),
            summary_en: "A detailed summary of this story is currently unavailable.".to_string(),
            sources_analyzed: Vec::new(),
            perspective_comparison: "A források összehasonlítása nem érhető el. / Source comparison unavailable."
                .to_string(),
            key_facts: Vec::new(),
            is_ongoing: draft.is_ongoing,
            previous_date: draft.previous_date.clone(),
        }
    }

    /// Hungarian title, falling back to the English one.
    pub fn display_title(&self) -> &str {
        if self.title_hu.trim().is_empty() {
            &self.title_en
        } else {
            &self.title_hu
        }
    }
}

/// A story loaded from a prior day's archive file, stamped with that day.
#[derive(Debug, Clone, PartialEq)]
pub struct PreviousStory {
    /// Date of the archive file the story came from (`YYYY-MM-DD`).
    pub previous_date: String,
    pub story: Story,
}

/// How the stories of a document were produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationMethod {
    /// Identification followed by one expansion call per story.
    TwoStep,
    /// One call returning the whole document, parsed after structural repair.
    SingleCall,
    /// One call whose output only survived per-story salvage.
    Salvaged,
    /// No usable output; the document carries placeholder content.
    Placeholder,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SynthesisMetadata {
    /// Number of articles across every bucket handed to the model.
    pub sources_scraped: usize,
    pub generation_time: DateTime<Local>,
    pub ai_model: String,
    pub generation_method: GenerationMethod,
}

/// The daily artifact written to `{data_dir}/{date}.json`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SynthesisDocument {
    pub date: String,
    pub stories: Vec<Story>,
    pub methodology_note_hu: String,
    pub methodology_note_en: String,
    pub metadata: SynthesisMetadata,
}

/// Loose view of a synthesis file, used when reading archives whose shape may
/// predate the current schema (history loading, index regeneration). The file
/// name, not the embedded `date`, decides which day a file belongs to.
#[derive(Debug, Default, Deserialize)]
pub struct ArchivedSynthesis {
    #[serde(default)]
    pub stories: Vec<Story>,
}

/// `index.json`: every dated document available in the archive.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ArchiveIndex {
    /// Dates in descending order.
    pub available_dates: Vec<String>,
    pub story_counts: BTreeMap<String, usize>,
    pub last_updated: DateTime<Local>,
    pub total_files: usize,
}

/// Parse a `YYYY-MM-DD` string, rejecting anything else.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), DATE_FORMAT).ok()
}
