//! Article collection from the configured Hungarian outlets.
//!
//! Every configured source is fetched once per run, either through its feed
//! or through a registered homepage scraper:
//!
//! | Source type | Module | Method |
//! |-------------|--------|--------|
//! | `rss` | [`rss`] | RSS 2.0 / Atom via `feed-rs` |
//! | `custom` | [`homepage`] | HTML scraping of the outlet's front page |
//!
//! A source that fails is logged and skipped; it never fails the run. After
//! fetching, articles are de-duplicated by link and grouped by the leaning
//! their source is configured under.

pub mod homepage;
pub mod rss;

use crate::config::{AppConfig, ScrapingSettings, SourceConfig, SourceKind};
use crate::models::{Article, CategorizedArticles, Leaning};
use futures::stream::{self, StreamExt};
use homepage::HomepageScraper;
use itertools::Itertools;
use reqwest::Client;
use std::collections::BTreeMap;
use std::error::Error;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// Sources fetched at the same time.
const CONCURRENT_SOURCES: usize = 4;

/// HTTP client shared by every source of one run.
pub fn build_client(settings: &ScrapingSettings) -> Result<Client, Box<dyn Error>> {
    let client = Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(settings.request_timeout_secs))
        .build()?;
    Ok(client)
}

/// Fetch every configured source and group the results by leaning.
#[instrument(level = "info", skip_all)]
pub async fn collect_articles(config: &AppConfig) -> Result<CategorizedArticles, Box<dyn Error>> {
    let client = build_client(&config.scraping_settings)?;
    let settings = &config.scraping_settings;

    let sources: Vec<&SourceConfig> = config.sources.values().flatten().collect();
    let fetched: Vec<Vec<Article>> = stream::iter(sources)
        .map(|source| {
            let client = &client;
            async move { fetch_source(client, source, settings).await }
        })
        .buffered(CONCURRENT_SOURCES)
        .collect()
        .await;

    let articles = categorize(fetched.into_iter().flatten(), &config.leaning_by_source());
    for leaning in Leaning::ALL {
        info!(leaning = leaning.label(), count = articles.get(leaning).len(), "Collected articles");
    }
    info!(total = articles.total(), "Total articles collected");
    Ok(articles)
}

/// Fetch one source, logging instead of failing.
async fn fetch_source(client: &Client, source: &SourceConfig, settings: &ScrapingSettings) -> Vec<Article> {
    let result = match &source.kind {
        SourceKind::Rss { rss_url } => {
            rss::fetch_feed(
                client,
                &source.name,
                rss_url,
                settings.max_articles_per_source,
                settings.max_article_age_hours,
            )
            .await
        }
        SourceKind::Custom { scraper } => match HomepageScraper::by_key(scraper) {
            Some(s) => s.fetch(client, &source.name, settings.max_articles_per_source).await,
            None => {
                warn!(source = %source.name, %scraper, "Unknown custom scraper; skipping source");
                return Vec::new();
            }
        },
    };

    result.unwrap_or_else(|e| {
        error!(source = %source.name, error = %e, "Source fetch failed");
        Vec::new()
    })
}

/// Group articles by the leaning of their source, dropping repeated links.
///
/// Articles from a source missing from `leanings` count as independent.
pub fn categorize(articles: impl IntoIterator<Item = Article>, leanings: &BTreeMap<String, Leaning>) -> CategorizedArticles {
    let mut categorized = CategorizedArticles::new();
    for article in articles.into_iter().unique_by(|a| a.link.clone()) {
        let leaning = leanings.get(&article.source).copied().unwrap_or(Leaning::Independent);
        categorized.push(leaning, article);
    }
    categorized
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use std::path::Path;

    fn article(source: &str, link: &str) -> Article {
        Article {
            source: source.to_string(),
            title: format!("Cikk {link}"),
            link: link.to_string(),
            summary: None,
            published: None,
        }
    }

    #[test]
    fn test_categorize_by_configured_leaning() {
        let config = parse_config(
            r#"
sources:
  right_wing:
    - { name: Origo, type: custom, scraper: origo }
  left_wing:
    - { name: Népszava, type: rss, rss_url: "https://nepszava.hu/feed" }
"#,
            Path::new("c.yaml"),
        )
        .unwrap();

        let articles = categorize(
            vec![
                article("Origo", "https://origo.hu/1"),
                article("Népszava", "https://nepszava.hu/1"),
                article("Ismeretlen", "https://ismeretlen.hu/1"),
                article("Népszava", "https://origo.hu/1"),
            ],
            &config.leaning_by_source(),
        );

        assert_eq!(articles.get(Leaning::RightWing).len(), 1);
        assert_eq!(articles.get(Leaning::LeftWing).len(), 1);
        assert_eq!(articles.get(Leaning::Independent)[0].source, "Ismeretlen");
        assert_eq!(articles.total(), 3);
    }

    #[tokio::test]
    async fn test_unknown_scraper_yields_nothing() {
        let client = build_client(&ScrapingSettings::default()).unwrap();
        let source = SourceConfig {
            name: "Index".to_string(),
            kind: SourceKind::Custom {
                scraper: "index".to_string(),
            },
        };
        assert!(fetch_source(&client, &source, &ScrapingSettings::default()).await.is_empty());
    }
}
