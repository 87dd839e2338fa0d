//! Drive the model from categorized articles to a finished [`SynthesisDocument`].
//!
//! # Two-step pipeline
//!
//! ```text
//! START → IDENTIFY → EXPAND (once per draft) → ASSEMBLE → DONE
//! ```
//!
//! - **IDENTIFY** asks for a short list of [`StoryDraft`]s. Failed or empty
//!   attempts are retried with a smaller story count; when every attempt fails
//!   a single placeholder draft is used, so there is always something to expand.
//! - **EXPAND** writes each draft up with its own call. A failure replaces only
//!   that story with a bilingual placeholder.
//! - **ASSEMBLE** attaches run metadata.
//!
//! This pipeline never fails on model errors. A response that nothing could be
//! recovered from is written to the debug path, when one is set.
//!
//! # Single-call pipeline
//!
//! One prompt asks for the whole document. Output that does not parse after
//! structural repair is salvaged story by story. If every attempt was a call
//! failure the run fails with [`SynthesisError::ModelUnavailable`]; any other
//! outcome yields a document, degraded if necessary.
//!
//! Calls are strictly sequential. Every call is bounded by the configured
//! timeout, and a timeout counts as an ordinary call failure.

use crate::api::{Backoff, GenerativeModel};
use crate::config::{GenerationParams, Pipeline, SynthesisSettings};
use crate::error::{Result, SynthesisError};
use crate::extract::extract_json;
use crate::models::{
    CategorizedArticles, DATE_FORMAT, GenerationMethod, PreviousStory, Story, StoryDraft, SynthesisDocument,
    SynthesisMetadata,
};
use crate::outputs::archive;
use crate::prompts::PromptBuilder;
use crate::repair::{parse_model_json, repair_json, salvage_stories};
use crate::utils::{tail_for_log, truncate_chars, truncate_for_log};
use chrono::{Local, NaiveDate};
use itertools::Itertools;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration as StdDuration;
use tracing::{debug, error, info, instrument, warn};

pub const METHODOLOGY_NOTE_HU: &str = "Ez az összefoglaló a politikai paletta különböző pontjain álló magyar hírforrások cikkei alapján készült. \
A nap legfontosabb történeteit először azonosítottuk, majd mindegyiket külön, a kapcsolódó cikkek alapján, semleges hangnemben foglaltuk össze, \
jelezve, ha a források a tényekben vagy azok értelmezésében eltérnek.";

pub const METHODOLOGY_NOTE_EN: &str = "This synthesis is based on articles from Hungarian news sources across the political spectrum. \
The day's most important stories were identified first, then each was summarized separately and neutrally from its related articles, \
noting where sources disagree on facts or their interpretation.";

const DEGRADED_NOTE_HU: &str = "A mai összefoglaló technikai hiba miatt csak részben készült el.";
const DEGRADED_NOTE_EN: &str = "Today's synthesis could only be partially generated due to a technical error.";

/// Loose view of a single-call response; every field may be missing.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawSynthesis {
    date: Option<String>,
    stories: Vec<Story>,
    methodology_note_hu: Option<String>,
    methodology_note_en: Option<String>,
}

/// Runs one synthesis against a [`GenerativeModel`].
#[derive(Debug)]
pub struct SynthesisOrchestrator<'a, M> {
    model: &'a M,
    settings: &'a SynthesisSettings,
    backoff: Backoff,
    debug_path: Option<PathBuf>,
}

impl<'a, M: GenerativeModel> SynthesisOrchestrator<'a, M> {
    pub fn new(model: &'a M, settings: &'a SynthesisSettings) -> Self {
        Self {
            model,
            settings,
            backoff: Backoff::new(
                StdDuration::from_millis(settings.backoff_base_ms),
                StdDuration::from_millis(settings.backoff_max_ms),
            ),
            debug_path: None,
        }
    }

    /// Where to write a raw response that nothing could be recovered from.
    pub fn with_debug_path(mut self, path: PathBuf) -> Self {
        self.debug_path = Some(path);
        self
    }

    /// Produce the document for `date` with the configured pipeline.
    ///
    /// # Errors
    ///
    /// - [`SynthesisError::NoArticles`] when every bucket is empty
    /// - [`SynthesisError::ModelUnavailable`] when a single-call run never got a response
    #[instrument(level = "info", skip_all, fields(%date, pipeline = ?self.settings.pipeline, articles = articles.total()))]
    pub async fn run(
        &self,
        articles: &CategorizedArticles,
        history: &[PreviousStory],
        date: NaiveDate,
    ) -> Result<SynthesisDocument> {
        if articles.is_empty() {
            return Err(SynthesisError::NoArticles);
        }
        match self.settings.pipeline {
            Pipeline::TwoStep => Ok(self.run_two_step(articles, history, date).await),
            Pipeline::SingleCall => self.run_single_call(articles, history, date).await,
        }
    }

    /// Identify, expand each draft, assemble. Never fails.
    pub async fn run_two_step(
        &self,
        articles: &CategorizedArticles,
        history: &[PreviousStory],
        date: NaiveDate,
    ) -> SynthesisDocument {
        let prompts = PromptBuilder::new(articles, history);
        let drafts = self.identify(&prompts, history).await;
        info!(drafts = drafts.len(), "Identification complete");

        let mut stories = Vec::with_capacity(drafts.len());
        let mut failed = 0usize;
        for draft in &drafts {
            match self.expand(&prompts, draft).await {
                Ok(story) => {
                    info!(story_id = draft.story_id, title = %story.display_title(), "Expanded story");
                    stories.push(self.normalize(story, draft));
                }
                Err(e) => {
                    failed += 1;
                    warn!(story_id = draft.story_id, error = %e, "Expansion failed; using placeholder story");
                    stories.push(Story::placeholder_for(draft));
                }
            }
        }
        info!(stories = stories.len(), failed, "Expansion complete");

        self.assemble(
            date,
            stories,
            METHODOLOGY_NOTE_HU.to_string(),
            METHODOLOGY_NOTE_EN.to_string(),
            articles.total(),
            GenerationMethod::TwoStep,
        )
    }

    /// Ask for the whole document in one call, salvaging what can be salvaged.
    pub async fn run_single_call(
        &self,
        articles: &CategorizedArticles,
        history: &[PreviousStory],
        date: NaiveDate,
    ) -> Result<SynthesisDocument> {
        let date_str = date.format(DATE_FORMAT).to_string();
        let prompt = PromptBuilder::new(articles, history).full_synthesis(self.settings.max_stories, &date_str);
        let known_dates = known_dates(history);
        let attempts = self.settings.single_call_attempts.max(1);

        let mut last_error: Option<SynthesisError> = None;
        let mut last_response: Option<String> = None;
        let mut salvaged: Vec<Story> = Vec::new();

        for attempt in 1..=attempts {
            info!(attempt, attempts, "Sending synthesis request");
            match self.call(&prompt, &self.settings.full_synthesis).await {
                Err(e) => {
                    warn!(attempt, error = %e, "Synthesis call failed");
                    last_error = Some(e);
                }
                Ok(text) => {
                    match parse_model_json::<RawSynthesis>(&text) {
                        Ok(raw) if !raw.stories.is_empty() => {
                            if raw.date.as_deref().is_some_and(|d| d != date_str) {
                                debug!(model_date = ?raw.date, "Model returned a different date; using run date");
                            }
                            let stories = raw
                                .stories
                                .into_iter()
                                .map(|s| self.normalize_free(s, &known_dates))
                                .collect();
                            info!(attempt, "Parsed full synthesis");
                            return Ok(self.assemble(
                                date,
                                stories,
                                raw.methodology_note_hu.unwrap_or_else(|| METHODOLOGY_NOTE_HU.to_string()),
                                raw.methodology_note_en.unwrap_or_else(|| METHODOLOGY_NOTE_EN.to_string()),
                                articles.total(),
                                GenerationMethod::SingleCall,
                            ));
                        }
                        Ok(_) => warn!(attempt, "Synthesis parsed but contained no stories"),
                        Err(e) => error!(
                            attempt,
                            error = %e,
                            response_len = text.len(),
                            head = %truncate_for_log(&text, 1000),
                            tail = %tail_for_log(&text, 500),
                            "Failed to parse synthesis JSON"
                        ),
                    }

                    let recovered = salvage(&text);
                    if recovered.len() > salvaged.len() {
                        info!(attempt, recovered = recovered.len(), "Salvaged stories from malformed response");
                        salvaged = recovered;
                    }
                    last_response = Some(text);
                }
            }
            if attempt < attempts {
                info!("Retrying synthesis request");
                self.backoff.wait(attempt).await;
            }
        }

        if !salvaged.is_empty() {
            let stories = salvaged
                .into_iter()
                .map(|s| self.normalize_free(s, &known_dates))
                .collect();
            return Ok(self.assemble(
                date,
                stories,
                format!("{METHODOLOGY_NOTE_HU} {DEGRADED_NOTE_HU}"),
                format!("{METHODOLOGY_NOTE_EN} {DEGRADED_NOTE_EN}"),
                articles.total(),
                GenerationMethod::Salvaged,
            ));
        }

        match last_response {
            Some(text) => {
                self.save_debug_response(&text).await;
                Ok(self.assemble(
                    date,
                    vec![Story::placeholder_for(&StoryDraft::placeholder())],
                    DEGRADED_NOTE_HU.to_string(),
                    DEGRADED_NOTE_EN.to_string(),
                    articles.total(),
                    GenerationMethod::Placeholder,
                ))
            }
            None => Err(SynthesisError::ModelUnavailable {
                attempts,
                last_error: last_error.map(|e| e.to_string()).unwrap_or_default(),
            }),
        }
    }

    /// Identification with narrowing retries; falls back to a placeholder draft.
    async fn identify(&self, prompts: &PromptBuilder<'_>, history: &[PreviousStory]) -> Vec<StoryDraft> {
        let attempts = self.settings.identify_attempts.max(1);
        let mut unparsed: Option<String> = None;
        for attempt in 1..=attempts {
            let max_stories = if attempt == 1 {
                self.settings.max_stories
            } else {
                self.settings.retry_max_stories
            };
            debug!(attempt, max_stories, "Identifying stories");

            match self
                .call(&prompts.identification(max_stories), &self.settings.identification)
                .await
            {
                Ok(text) => match parse_drafts(&text) {
                    Ok(drafts) => {
                        let drafts = self.validate_drafts(drafts, max_stories, history);
                        if !drafts.is_empty() {
                            return drafts;
                        }
                        warn!(attempt, "Identification returned no usable stories");
                        unparsed = Some(text);
                    }
                    Err(e) => {
                        warn!(attempt, error = %e, tail = %tail_for_log(&text, 300), "Identification output did not parse");
                        unparsed = Some(text);
                    }
                },
                Err(e) => warn!(attempt, error = %e, "Identification failed"),
            }
            if attempt < attempts {
                self.backoff.wait(attempt).await;
            }
        }

        warn!(attempts, "Identification exhausted; expanding a single placeholder story");
        if let Some(text) = unparsed {
            self.save_debug_response(&text).await;
        }
        vec![StoryDraft::placeholder()]
    }

    /// Expand one draft. The error is the reason the story becomes a placeholder.
    #[instrument(level = "info", skip_all, fields(story_id = draft.story_id))]
    async fn expand(&self, prompts: &PromptBuilder<'_>, draft: &StoryDraft) -> Result<Story> {
        let text = self.call(&prompts.expansion(draft), &self.settings.expansion).await?;

        let parsed = parse_model_json::<Value>(&text).ok().and_then(story_from_value);
        if let Some(story) = parsed {
            return Ok(story);
        }

        warn!(
            response_len = text.len(),
            tail = %tail_for_log(&text, 300),
            "Expansion output did not parse; trying story salvage"
        );
        match salvage(&text).into_iter().next() {
            Some(story) => Ok(story),
            None => {
                self.save_debug_response(&text).await;
                Err(SynthesisError::Parse("no story could be recovered".to_string()))
            }
        }
    }

    /// Keep the raw text of a response nothing could be recovered from.
    async fn save_debug_response(&self, text: &str) {
        let Some(path) = &self.debug_path else {
            return;
        };
        match archive::write_debug_response(path, text).await {
            Ok(()) => error!(path = %path.display(), "Saved problematic response"),
            Err(e) => warn!(path = %path.display(), error = %e, "Could not save problematic response"),
        }
    }

    /// One model call bounded by the configured timeout.
    async fn call(&self, prompt: &str, params: &GenerationParams) -> Result<String> {
        let limit = self.settings.call_timeout();
        debug!(prompt_chars = prompt.len(), max_output_tokens = params.max_output_tokens, "Calling model");
        match tokio::time::timeout(limit, self.model.generate(prompt, params)).await {
            Err(_) => Err(SynthesisError::Timeout(limit)),
            Ok(Err(e)) => Err(SynthesisError::Model(e.to_string())),
            Ok(Ok(text)) if text.trim().is_empty() => Err(SynthesisError::EmptyResponse),
            Ok(Ok(text)) => Ok(text),
        }
    }

    /// Cap the draft list, fill missing titles, and keep continuity claims honest.
    fn validate_drafts(
        &self,
        drafts: Vec<StoryDraft>,
        max_stories: usize,
        history: &[PreviousStory],
    ) -> Vec<StoryDraft> {
        let known = known_dates(history);
        drafts
            .into_iter()
            .filter(|d| !(d.title_hu.trim().is_empty() && d.title_en.trim().is_empty()))
            .take(max_stories.max(1))
            .map(|mut d| {
                if d.title_hu.trim().is_empty() {
                    d.title_hu = d.title_en.clone();
                }
                if d.title_en.trim().is_empty() {
                    d.title_en = d.title_hu.clone();
                }
                (d.is_ongoing, d.previous_date) = checked_continuity(d.is_ongoing, d.previous_date.take(), &known);
                d
            })
            .collect()
    }

    /// Finish an expanded story: the draft decides titles and continuity.
    fn normalize(&self, mut story: Story, draft: &StoryDraft) -> Story {
        if story.title_hu.trim().is_empty() {
            story.title_hu = draft.title_hu.clone();
        }
        if story.title_en.trim().is_empty() {
            story.title_en = draft.title_en.clone();
        }
        story.is_ongoing = draft.is_ongoing;
        story.previous_date = draft.previous_date.clone();
        self.tidy(story)
    }

    /// Finish a story produced without a draft (single-call pipeline).
    fn normalize_free(&self, mut story: Story, known: &HashSet<&str>) -> Story {
        (story.is_ongoing, story.previous_date) = checked_continuity(story.is_ongoing, story.previous_date.take(), known);
        self.tidy(story)
    }

    fn tidy(&self, mut story: Story) -> Story {
        let max = self.settings.summary_max_chars;
        story.summary_hu = truncate_chars(&story.summary_hu, max).to_string();
        story.summary_en = truncate_chars(&story.summary_en, max).to_string();
        story.sources_analyzed = dedupe(story.sources_analyzed);
        story.key_facts = dedupe(story.key_facts);
        story
    }

    fn assemble(
        &self,
        date: NaiveDate,
        mut stories: Vec<Story>,
        methodology_note_hu: String,
        methodology_note_en: String,
        sources_scraped: usize,
        generation_method: GenerationMethod,
    ) -> SynthesisDocument {
        stories.truncate(self.settings.max_stories.max(1));
        SynthesisDocument {
            date: date.format(DATE_FORMAT).to_string(),
            stories,
            methodology_note_hu,
            methodology_note_en,
            metadata: SynthesisMetadata {
                sources_scraped,
                generation_time: Local::now(),
                ai_model: self.model.name().to_string(),
                generation_method,
            },
        }
    }
}

/// Drafts from an identification response: `{"stories": [...]}` or a bare list.
fn parse_drafts(text: &str) -> Result<Vec<StoryDraft>> {
    let value: Value = parse_model_json(text)?;
    let list = match value {
        Value::Object(mut map) => map.remove("stories").unwrap_or(Value::Array(Vec::new())),
        other => other,
    };
    Ok(serde_json::from_value(list)?)
}

/// A story from an expansion response, accepting a wrapped `{"stories": [..]}` too.
///
/// A story with neither a title nor a summary counts as no story.
fn story_from_value(value: Value) -> Option<Story> {
    let value = match value {
        Value::Object(mut map) if map.contains_key("stories") && !map.contains_key("title_hu") => {
            match map.remove("stories") {
                Some(Value::Array(list)) => list.into_iter().next()?,
                _ => return None,
            }
        }
        other => other,
    };
    let story: Story = serde_json::from_value(value).ok()?;
    let has_title = !story.title_hu.trim().is_empty() || !story.title_en.trim().is_empty();
    let has_summary = !story.summary_hu.trim().is_empty() || !story.summary_en.trim().is_empty();
    (has_title || has_summary).then_some(story)
}

/// Per-story recovery: scan the repaired text first, then the unrepaired candidate.
fn salvage(text: &str) -> Vec<Story> {
    let candidate = extract_json(text);
    let stories = salvage_stories(&repair_json(candidate));
    if stories.is_empty() {
        salvage_stories(candidate)
    } else {
        stories
    }
}

fn known_dates(history: &[PreviousStory]) -> HashSet<&str> {
    history.iter().map(|p| p.previous_date.as_str()).collect()
}

/// `is_ongoing` survives only with a `previous_date` that history actually holds.
fn checked_continuity(is_ongoing: bool, previous_date: Option<String>, known: &HashSet<&str>) -> (bool, Option<String>) {
    match previous_date {
        Some(date) if is_ongoing && known.contains(date.trim()) => (true, Some(date.trim().to_string())),
        Some(date) if is_ongoing => {
            debug!(%date, "Dropping continuity claim for a date without loaded history");
            (false, None)
        }
        _ => (false, None),
    }
}

fn dedupe(items: Vec<String>) -> Vec<String> {
    items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unique()
        .collect()
}
