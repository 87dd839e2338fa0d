//! RSS 2.0 and Atom feed reader.
//!
//! Feeds are parsed with `feed-rs`, which also decodes entities and
//! timestamps. Only the fields an [`Article`] needs are kept per entry:
//!
//! | Article field | RSS 2.0 | Atom |
//! |---------------|---------|------|
//! | title | `<title>` | `<title>` |
//! | link | `<link>` | `<link rel="alternate">`, else the first link |
//! | summary | `<description>` | `<summary>`, else `<content>` |
//! | published | `<pubDate>` / `<dc:date>` | `<published>`, else `<updated>` |
//!
//! Entries without a title or link are skipped. Entries older than the
//! configured age are skipped; entries without a parseable date are kept.

use crate::models::Article;
use crate::utils::{strip_html, truncate_chars};
use chrono::{DateTime, Duration, Local};
use feed_rs::model::Entry;
use feed_rs::parser;
use reqwest::Client;
use std::error::Error;
use std::io;
use tracing::{debug, info, instrument, warn};

/// Feed summaries are capped at this many characters.
pub const MAX_SUMMARY_CHARS: usize = 500;

/// One `<item>`/`<entry>` reduced to what an article needs.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct FeedEntry {
    pub title: String,
    pub link: String,
    pub summary: String,
    pub published: Option<DateTime<Local>>,
}

impl From<Entry> for FeedEntry {
    fn from(entry: Entry) -> Self {
        let link = entry
            .links
            .iter()
            .find(|l| l.rel.as_deref().is_none_or(|r| r == "alternate"))
            .or_else(|| entry.links.first())
            .map(|l| l.href.clone())
            .unwrap_or_default();
        let summary = entry
            .summary
            .map(|t| t.content)
            .or_else(|| entry.content.and_then(|c| c.body))
            .unwrap_or_default();
        Self {
            title: entry.title.map(|t| t.content).unwrap_or_default(),
            link,
            summary,
            published: entry.published.or(entry.updated).map(|d| d.with_timezone(&Local)),
        }
    }
}

/// Parse every entry of an RSS 2.0 or Atom document, in document order.
pub fn parse_feed(body: &[u8]) -> Result<Vec<FeedEntry>, parser::ParseFeedError> {
    let feed = parser::parse(io::Cursor::new(body))?;
    Ok(feed.entries.into_iter().map(FeedEntry::from).collect())
}

/// Turn the first `max_articles` entries into articles, dropping stale and
/// incomplete ones.
pub fn entries_to_articles(
    source: &str,
    entries: Vec<FeedEntry>,
    max_articles: usize,
    max_age_hours: i64,
    now: DateTime<Local>,
) -> Vec<Article> {
    let cutoff = now - Duration::hours(max_age_hours);
    entries
        .into_iter()
        .take(max_articles)
        .filter_map(|entry| {
            let published = entry.published;
            if published.is_some_and(|p| p < cutoff) {
                debug!(title = %entry.title, "Skipping stale entry");
                return None;
            }
            let title = entry.title.split_whitespace().collect::<Vec<_>>().join(" ");
            let link = entry.link.trim().to_string();
            if title.is_empty() || link.is_empty() {
                return None;
            }
            let summary = strip_html(&entry.summary);
            let summary = truncate_chars(&summary, MAX_SUMMARY_CHARS).trim().to_string();
            Some(Article {
                source: source.to_string(),
                title,
                link,
                summary: (!summary.is_empty()).then_some(summary),
                published,
            })
        })
        .collect()
}

/// Fetch and parse one feed.
#[instrument(level = "info", skip_all, fields(%source, %url))]
pub async fn fetch_feed(
    client: &Client,
    source: &str,
    url: &str,
    max_articles: usize,
    max_age_hours: i64,
) -> Result<Vec<Article>, Box<dyn Error>> {
    let body = client.get(url).send().await?.error_for_status()?.bytes().await?;
    let entries = parse_feed(&body)?;
    if entries.is_empty() {
        warn!("Feed contained no entries");
    }
    let articles = entries_to_articles(source, entries, max_articles, max_age_hours, Local::now());
    info!(count = articles.len(), "Fetched feed articles");
    Ok(articles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:dc="http://purl.org/dc/elements/1.1/">
  <channel>
    <title>Telex</title>
    <link>https://telex.hu</link>
    <item>
      <title>Árvíz a Dunán &amp; a Tiszán</title>
      <link>https://telex.hu/belfold/1</link>
      <description><![CDATA[<p>A víz <b>tovább</b> emelkedik.</p>]]></description>
      <pubDate>Thu, 02 Jan 2025 08:00:00 +0100</pubDate>
    </item>
    <item>
      <title>Régi hír</title>
      <link>https://telex.hu/belfold/2</link>
      <pubDate>Mon, 30 Dec 2024 08:00:00 +0100</pubDate>
    </item>
    <item>
      <title></title>
      <link>https://telex.hu/belfold/3</link>
    </item>
    <item>
      <title>Dátum nélkül</title>
      <link>https://telex.hu/belfold/4</link>
      <description>Szöveg &#233;s m&#xE9;g</description>
    </item>
  </channel>
</rss>"#;

    const ATOM: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>444</title>
  <entry>
    <title>Atom cím</title>
    <link rel="alternate" href="https://444.hu/2025/01/02/cikk"/>
    <published>2025-01-02T07:30:00+01:00</published>
    <updated>2025-01-02T09:30:00+01:00</updated>
    <summary>Rövid összefoglaló</summary>
  </entry>
</feed>"#;

    fn now() -> DateTime<Local> {
        chrono::FixedOffset::east_opt(3600)
            .unwrap()
            .with_ymd_and_hms(2025, 1, 2, 12, 0, 0)
            .unwrap()
            .with_timezone(&Local)
    }

    #[test]
    fn test_parse_rss_entries() {
        let entries = parse_feed(RSS.as_bytes()).unwrap();
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[0].title, "Árvíz a Dunán & a Tiszán");
        assert_eq!(entries[0].link, "https://telex.hu/belfold/1");
        assert!(entries[0].summary.contains("tovább"));
        assert_eq!(entries[3].summary, "Szöveg és még");
    }

    #[test]
    fn test_parse_atom_entry() {
        let entries = parse_feed(ATOM.as_bytes()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].link, "https://444.hu/2025/01/02/cikk");
        let published = DateTime::parse_from_rfc3339("2025-01-02T07:30:00+01:00").unwrap();
        assert_eq!(entries[0].published, Some(published.with_timezone(&Local)));
        assert_eq!(entries[0].summary, "Rövid összefoglaló");
    }

    #[test]
    fn test_entries_to_articles_filters_stale_and_incomplete() {
        let articles = entries_to_articles("Telex", parse_feed(RSS.as_bytes()).unwrap(), 10, 24, now());
        let titles: Vec<&str> = articles.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, vec!["Árvíz a Dunán & a Tiszán", "Dátum nélkül"]);
        assert_eq!(articles[0].summary.as_deref(), Some("A víz tovább emelkedik."));
        assert!(articles[0].published.is_some());
        assert!(articles[1].published.is_none());
        assert!(articles.iter().all(|a| a.source == "Telex"));
    }

    #[test]
    fn test_max_articles_applies_before_filtering() {
        let articles = entries_to_articles("Telex", parse_feed(RSS.as_bytes()).unwrap(), 2, 24, now());
        assert_eq!(articles.len(), 1);
    }

    #[test]
    fn test_summary_is_capped() {
        let entry = FeedEntry {
            title: "Cím".to_string(),
            link: "https://x.hu/1".to_string(),
            summary: "é".repeat(800),
            published: None,
        };
        let articles = entries_to_articles("X", vec![entry], 10, 24, now());
        assert_eq!(articles[0].summary.as_ref().unwrap().chars().count(), MAX_SUMMARY_CHARS);
    }

    #[test]
    fn test_malformed_feed_is_an_error() {
        assert!(parse_feed(b"<html><body>not a feed</body></html>").is_err());
    }
}
