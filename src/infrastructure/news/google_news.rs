//! Company headlines via a Google-News-style RSS search feed.

use crate::domain::ports::{Headline, NewsFeed};
use crate::infrastructure::core::http_client_factory::build_url_with_query;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use rss::Channel;
use std::io::Cursor;
use tracing::{debug, info};

const DEFAULT_BASE_URL: &str = "https://news.google.com/rss/search";
const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(15);

pub struct GoogleNewsFeed {
    client: Client,
    base_url: String,
}

impl GoogleNewsFeed {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL.to_string())
    }

    pub fn with_base_url(base_url: String) -> Self {
        Self {
            client: Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_else(|_| Client::new()),
            base_url,
        }
    }
}

impl Default for GoogleNewsFeed {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NewsFeed for GoogleNewsFeed {
    async fn recent_headlines(
        &self,
        company: &str,
        days_back: i64,
        limit: usize,
    ) -> Result<Vec<Headline>> {
        let url = build_url_with_query(
            &self.base_url,
            &[("q", company), ("hl", "en-IN"), ("gl", "IN"), ("ceid", "IN:en")],
        );
        debug!("fetching news feed: {}", url);

        let bytes = self
            .client
            .get(&url)
            .send()
            .await
            .context("failed to fetch news feed")?
            .bytes()
            .await
            .context("failed to read news feed body")?;

        let channel =
            Channel::read_from(Cursor::new(bytes)).context("failed to parse news feed")?;

        let cutoff = Utc::now() - Duration::days(days_back);
        let headlines: Vec<Headline> = channel
            .items()
            .iter()
            .take(limit)
            .filter_map(|item| {
                let published = item
                    .pub_date()
                    .and_then(|d| DateTime::parse_from_rfc2822(d).ok())
                    .map(|d| d.with_timezone(&Utc))?;
                if published < cutoff {
                    return None;
                }
                Some(Headline {
                    title: item.title().unwrap_or("No Title").to_string(),
                    publisher: item
                        .source()
                        .and_then(|s| s.title())
                        .unwrap_or("Google News")
                        .to_string(),
                    link: item.link().map(str::to_string),
                    published,
                })
            })
            .collect();

        info!("{}: {} recent headlines", company, headlines.len());
        Ok(headlines)
    }
}
