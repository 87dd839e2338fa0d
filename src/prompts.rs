//! Prompt construction for the three kinds of synthesis calls.
//!
//! - **Full synthesis**: one call asks for the whole bilingual document.
//! - **Identification**: source + title pairs only, asks for a short list of
//!   [`StoryDraft`]s. Article bodies are omitted to keep the call cheap.
//! - **Expansion**: one [`StoryDraft`] plus the articles related to it, asks
//!   for a single fully written [`Story`](crate::models::Story).
//!
//! Every mode ends with a compact block of recent stories (date, title, up to
//! three key facts) so the model can spot continuing stories. Full summaries
//! of past days are never included.

use crate::models::{Article, CategorizedArticles, Leaning, PreviousStory, StoryDraft};

/// Titles listed per leaning in identification prompts.
const IDENTIFICATION_CAPS: [(Leaning, usize); 3] = [
    (Leaning::RightWing, 30),
    (Leaning::LeftWing, 30),
    (Leaning::Independent, 20),
];

/// Upper bound on articles embedded in one expansion prompt.
pub const MAX_EXPANSION_ARTICLES: usize = 30;

/// Articles scanned first are included even without a keyword match.
pub const ALWAYS_INCLUDED_ARTICLES: usize = 15;

/// Words of the draft title used as match keywords.
const KEYWORD_COUNT: usize = 3;

/// Key facts listed per historical story.
const HISTORY_FACTS: usize = 3;

const ROLE: &str = "You are a professional journalist creating unbiased news synthesis for Hungarian readers.";

const SOURCES_INTRO: &str = "You will receive news articles from different political perspectives:
- Right-wing/Government-aligned sources
- Left-wing/Opposition sources
- Independent sources";

const GUIDELINES: &str = "Guidelines:
- Be strictly neutral and objective
- Focus on verifiable facts
- Note when sources disagree on facts vs. interpretation
- Avoid inflammatory language
- Present multiple perspectives fairly
- If only one side reports something, note this explicitly
- Attribute every claim to the sources that reported it";

const JSON_ONLY: &str = "IMPORTANT: You MUST return ONLY valid, complete JSON. Do not truncate. Complete all fields. Do not add any text before or after the JSON.";

const STORY_SCHEMA: &str = r#"{
  "title_hu": "Hungarian title",
  "title_en": "English title",
  "summary_hu": "Detailed neutral summary in Hungarian (2-3 paragraphs)",
  "summary_en": "Detailed neutral summary in English (2-3 paragraphs)",
  "sources_analyzed": ["Source1", "Source2"],
  "perspective_comparison": "How different sources covered this (1 paragraph)",
  "key_facts": ["Fact 1", "Fact 2", "Fact 3"]
}"#;

/// Builds prompts over one run's articles and loaded history.
#[derive(Debug, Clone, Copy)]
pub struct PromptBuilder<'a> {
    articles: &'a CategorizedArticles,
    history: &'a [PreviousStory],
}

impl<'a> PromptBuilder<'a> {
    pub fn new(articles: &'a CategorizedArticles, history: &'a [PreviousStory]) -> Self {
        Self { articles, history }
    }

    /// Single-call prompt asking for the whole document.
    pub fn full_synthesis(&self, max_stories: usize, date: &str) -> String {
        let mut prompt = format!(
            "{ROLE}\n\n{SOURCES_INTRO}\n\nYour task:
1. Identify the top {} most important news stories of the day
2. For each story, analyze how different sources cover it
3. Create a neutral, fact-based synthesis that presents the truth without political bias
4. Provide both Hungarian and English versions
5. Cite which sources reported what

{JSON_ONLY}

{GUIDELINES}

Output format: JSON with this structure:
{{
  \"date\": \"{date}\",
  \"stories\": [
{}
  ],
  \"methodology_note_hu\": \"Brief note on synthesis methodology in Hungarian\",
  \"methodology_note_en\": \"Brief note on synthesis methodology in English\"
}}

Here are today's articles:
",
            story_range(max_stories),
            indent(STORY_SCHEMA, 4)
        );

        for leaning in Leaning::ALL {
            prompt.push_str(&format!("\n=== {} ===\n", leaning.heading()));
            for article in self.articles.get(leaning) {
                write_article(&mut prompt, article);
            }
        }

        self.push_history(&mut prompt);
        prompt.push_str("\n\nNow create the neutral synthesis in JSON format:");
        prompt
    }

    /// Cheap prompt listing only titles, asking for up to `max_stories` drafts.
    pub fn identification(&self, max_stories: usize) -> String {
        let mut prompt = format!(
            "{ROLE}\n\n{SOURCES_INTRO}\n\nYour task: identify the {max_stories} most important news stories of the day from the headlines below.
Prefer stories covered by several sources and by more than one political side.
If a story continues one of the previous days' stories listed at the end, set \"is_ongoing\" to true and \"previous_date\" to that story's date; otherwise set \"is_ongoing\" to false and \"previous_date\" to null.

{JSON_ONLY}

Output format: JSON with this structure (at most {max_stories} stories):
{{
  \"stories\": [
    {{\"story_id\": 1, \"title_hu\": \"Hungarian title\", \"title_en\": \"English title\", \"is_ongoing\": false, \"previous_date\": null}}
  ]
}}

Today's headlines:
"
        );

        for (leaning, cap) in IDENTIFICATION_CAPS {
            prompt.push_str(&format!("\n=== {} ===\n", leaning.heading()));
            for article in self.articles.get(leaning).iter().take(cap) {
                prompt.push_str(&format!("- [{}] {}\n", article.source, article.title));
            }
        }

        self.push_history(&mut prompt);
        prompt.push_str("\n\nNow return the list of stories in JSON format:");
        prompt
    }

    /// Prompt expanding one draft into a fully written story.
    pub fn expansion(&self, draft: &StoryDraft) -> String {
        let mut prompt = format!(
            "{ROLE}\n\nWrite a neutral, bilingual synthesis of exactly one news story:
- Hungarian title: {}
- English title: {}

Use only the articles below that are relevant to this story, and analyze how the different political sides cover it.

{JSON_ONLY}

{GUIDELINES}

Output format: a single JSON object with this structure:
{STORY_SCHEMA}
",
            draft.title_hu, draft.title_en
        );

        if draft.is_ongoing {
            if let Some(previous) = self.continuity_for(draft) {
                prompt.push_str(&format!(
                    "\nThis story continues \"{}\" from {}. Focus on what is new today. Previously established facts:\n",
                    previous.story.display_title(),
                    previous.previous_date
                ));
                for fact in previous.story.key_facts.iter().take(HISTORY_FACTS) {
                    prompt.push_str(&format!("- {fact}\n"));
                }
            }
        }

        prompt.push_str("\nRelated articles:\n");
        for (leaning, article) in self.related_articles(draft) {
            prompt.push_str(&format!("\nPerspective: {}", leaning.label()));
            write_article(&mut prompt, article);
        }

        self.push_history(&mut prompt);
        prompt.push_str("\n\nNow write the story in JSON format:");
        prompt
    }

    /// Articles embedded in the expansion prompt for `draft`.
    ///
    /// An article qualifies when its title contains one of the first three
    /// words of the draft's Hungarian title (case-insensitive), or when it is
    /// among the first [`ALWAYS_INCLUDED_ARTICLES`] scanned. At most
    /// [`MAX_EXPANSION_ARTICLES`] are returned.
    pub fn related_articles(&self, draft: &StoryDraft) -> Vec<(Leaning, &'a Article)> {
        let keywords = keywords(&draft.title_hu);
        self.articles
            .iter()
            .enumerate()
            .filter(|(idx, (_, article))| {
                *idx < ALWAYS_INCLUDED_ARTICLES || {
                    let title = article.title.to_lowercase();
                    keywords.iter().any(|k| title.contains(k.as_str()))
                }
            })
            .map(|(_, pair)| pair)
            .take(MAX_EXPANSION_ARTICLES)
            .collect()
    }

    /// The previous story an ongoing draft continues.
    ///
    /// Among the stories loaded for the draft's `previous_date`, the one whose
    /// title shares the most keywords with the draft wins; ties keep the first.
    fn continuity_for(&self, draft: &StoryDraft) -> Option<&'a PreviousStory> {
        let date = draft.previous_date.as_deref()?;
        let keywords = keywords(&draft.title_hu);
        let mut best: Option<(&PreviousStory, usize)> = None;
        for previous in self.history.iter().filter(|p| p.previous_date == date) {
            let title = previous.story.display_title().to_lowercase();
            let score = keywords.iter().filter(|k| title.contains(k.as_str())).count();
            if best.is_none_or(|(_, s)| score > s) {
                best = Some((previous, score));
            }
        }
        best.map(|(p, _)| p)
    }

    fn push_history(&self, prompt: &mut String) {
        prompt.push_str(&history_block(self.history));
    }
}

/// Compact continuity block: date, title and up to three key facts per story.
///
/// Empty when no history was loaded.
pub fn history_block(history: &[PreviousStory]) -> String {
    if history.is_empty() {
        return String::new();
    }
    let mut block = String::from("\n\n=== STORIES FROM PREVIOUS DAYS (for continuity) ===\n");
    for previous in history {
        block.push_str(&format!("[{}] {}\n", previous.previous_date, previous.story.display_title()));
        for fact in previous.story.key_facts.iter().take(HISTORY_FACTS) {
            block.push_str(&format!("  - {fact}\n"));
        }
    }
    block
}

/// Lowercased first words of a title.
fn keywords(title: &str) -> Vec<String> {
    title
        .split_whitespace()
        .take(KEYWORD_COUNT)
        .map(str::to_lowercase)
        .collect()
}

fn write_article(prompt: &mut String, article: &Article) {
    prompt.push_str(&format!("\nSource: {}\nTitle: {}\n", article.source, article.title));
    if let Some(summary) = article.summary.as_deref().filter(|s| !s.is_empty()) {
        prompt.push_str(&format!("Summary: {summary}\n"));
    }
    prompt.push_str(&format!("Link: {}\n", article.link));
}

fn story_range(max_stories: usize) -> String {
    if max_stories <= 2 {
        max_stories.to_string()
    } else {
        format!("2-{max_stories}")
    }
}

fn indent(text: &str, spaces: usize) -> String {
    let pad = " ".repeat(spaces);
    text.lines().map(|l| format!("{pad}{l}")).collect::<Vec<_>>().join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Story;

    fn article(source: &str, title: &str) -> Article {
        Article {
            source: source.to_string(),
            title: title.to_string(),
            link: format!("https://{}.hu/{}", source.to_lowercase(), title.len()),
            summary: Some(format!("Summary of {title}")),
            published: None,
        }
    }

    fn categorized(per_bucket: usize) -> CategorizedArticles {
        let mut c = CategorizedArticles::new();
        for leaning in Leaning::ALL {
            for i in 0..per_bucket {
                c.push(leaning, article(leaning.label(), &format!("{} headline {i}", leaning.label())));
            }
        }
        c
    }

    fn previous(date: &str, title: &str, facts: &[&str]) -> PreviousStory {
        PreviousStory {
            previous_date: date.to_string(),
            story: Story {
                title_hu: title.to_string(),
                summary_hu: "SHOULD NOT APPEAR".to_string(),
                key_facts: facts.iter().map(|f| f.to_string()).collect(),
                ..Story::default()
            },
        }
    }

    fn draft(title_hu: &str) -> StoryDraft {
        StoryDraft {
            story_id: 1,
            title_hu: title_hu.to_string(),
            title_en: "English".to_string(),
            is_ongoing: false,
            previous_date: None,
        }
    }

    #[test]
    fn test_full_synthesis_lists_every_bucket_with_bodies() {
        let articles = categorized(2);
        let prompt = PromptBuilder::new(&articles, &[]).full_synthesis(3, "2025-01-01");
        assert!(prompt.contains("top 2-3 most important"));
        assert!(prompt.contains("=== RIGHT-WING/GOVERNMENT SOURCES ==="));
        assert!(prompt.contains("=== LEFT-WING/OPPOSITION SOURCES ==="));
        assert!(prompt.contains("=== INDEPENDENT SOURCES ==="));
        assert!(prompt.contains("Summary of independent headline 1"));
        assert!(prompt.contains("\"date\": \"2025-01-01\""));
        assert!(prompt.contains("ONLY valid, complete JSON"));
        assert!(!prompt.contains("PREVIOUS DAYS"));
    }

    #[test]
    fn test_identification_caps_titles_per_bucket_and_omits_bodies() {
        let articles = categorized(40);
        let prompt = PromptBuilder::new(&articles, &[]).identification(2);
        let count = |label: &str| prompt.matches(&format!("] {label} headline")).count();
        assert_eq!(count("right-wing"), 30);
        assert_eq!(count("left-wing"), 30);
        assert_eq!(count("independent"), 20);
        assert!(!prompt.contains("Summary of"));
        assert!(!prompt.contains("Link:"));
        assert!(prompt.contains("at most 2 stories"));
    }

    #[test]
    fn test_article_block_one_field_per_line() {
        let mut articles = categorized(1);
        let mut bare = article("Telex", "Cikk összefoglaló nélkül");
        bare.summary = None;
        articles.push(Leaning::Independent, bare);
        let prompt = PromptBuilder::new(&articles, &[]).full_synthesis(3, "2025-01-01");

        assert!(prompt.contains(
            "=== INDEPENDENT SOURCES ===\n\nSource: independent\nTitle: independent headline 0\nSummary: Summary of independent headline 0\nLink: https://independent.hu/"
        ));
        assert!(prompt.contains("\nSource: Telex\nTitle: Cikk összefoglaló nélkül\nLink: https://telex.hu/"));
        assert!(prompt.contains("Here are today's articles:\n\n=== RIGHT-WING/GOVERNMENT SOURCES ==="));
    }

    #[test]
    fn test_history_block_is_compact() {
        let history = vec![previous("2025-01-01", "Árvíz a Dunán", &["f1", "f2", "f3", "f4"])];
        let block = history_block(&history);
        assert!(block.contains("[2025-01-01] Árvíz a Dunán"));
        assert!(block.contains("  - f3"));
        assert!(!block.contains("f4"));
        assert!(!block.contains("SHOULD NOT APPEAR"));
    }

    #[test]
    fn test_history_block_uses_english_title_when_hungarian_missing() {
        let mut p = previous("2025-01-02", "", &[]);
        p.story.title_en = "Flood".to_string();
        assert!(history_block(&[p]).contains("[2025-01-02] Flood"));
    }

    #[test]
    fn test_every_mode_appends_history() {
        let articles = categorized(1);
        let history = vec![previous("2025-01-01", "Régi hír", &["tény"])];
        let builder = PromptBuilder::new(&articles, &history);
        assert!(builder.full_synthesis(3, "2025-01-02").contains("[2025-01-01] Régi hír"));
        assert!(builder.identification(3).contains("[2025-01-01] Régi hír"));
        assert!(builder.expansion(&draft("Valami")).contains("[2025-01-01] Régi hír"));
    }

    #[test]
    fn test_related_articles_keyword_match_beyond_first_fifteen() {
        let mut articles = CategorizedArticles::new();
        for i in 0..40 {
            articles.push(Leaning::RightWing, article("Origo", &format!("Unrelated story {i}")));
        }
        articles.push(Leaning::Independent, article("Telex", "A KÖLTSÉGVETÉS vitája"));
        let builder = PromptBuilder::new(&articles, &[]);

        let related = builder.related_articles(&draft("Költségvetés vita parlament ülés"));
        assert_eq!(related.len(), 16);
        assert!(related[..15].iter().all(|(l, _)| *l == Leaning::RightWing));
        assert_eq!(related[15].1.source, "Telex");
    }

    #[test]
    fn test_related_articles_nonempty_on_keyword_miss() {
        let articles = categorized(3);
        let builder = PromptBuilder::new(&articles, &[]);
        let related = builder.related_articles(&draft("Semmi közös"));
        assert_eq!(related.len(), 9);
    }

    #[test]
    fn test_related_articles_capped() {
        let mut articles = CategorizedArticles::new();
        for i in 0..50 {
            articles.push(Leaning::LeftWing, article("Népszava", &format!("Választás {i}")));
        }
        let builder = PromptBuilder::new(&articles, &[]);
        assert_eq!(builder.related_articles(&draft("Választás")).len(), MAX_EXPANSION_ARTICLES);
    }

    #[test]
    fn test_expansion_embeds_continuity_for_ongoing_story() {
        let articles = categorized(1);
        let history = vec![
            previous("2025-01-01", "Sztrájk a vasútnál", &["vasúti tény"]),
            previous("2025-01-01", "Árvíz a Dunán", &["árvíz tény 1", "árvíz tény 2"]),
        ];
        let builder = PromptBuilder::new(&articles, &history);
        let mut d = draft("Árvíz tetőzik");
        d.is_ongoing = true;
        d.previous_date = Some("2025-01-01".to_string());

        let prompt = builder.expansion(&d);
        assert!(prompt.contains("continues \"Árvíz a Dunán\" from 2025-01-01"));
        assert!(prompt.contains("- árvíz tény 2"));
        assert!(prompt.contains("Hungarian title: Árvíz tetőzik"));
    }

    #[test]
    fn test_expansion_without_ongoing_has_no_continuity() {
        let articles = categorized(1);
        let history = vec![previous("2025-01-01", "Árvíz", &["x"])];
        let prompt = PromptBuilder::new(&articles, &history).expansion(&draft("Árvíz"));
        assert!(!prompt.contains("This story continues"));
    }
}
