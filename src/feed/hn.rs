// src/feed/hn.rs
//! Hacker News front page via the Algolia search API.

use async_trait::async_trait;
use metrics::{counter, histogram};
use reqwest::header::{ACCEPT, CACHE_CONTROL, PRAGMA};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use crate::error::FetchError;
use crate::feed::{FeedSource, RawItem};

pub const DEFAULT_HN_API_URL: &str = "https://hn.algolia.com/api/v1/search?tags=front_page";

/// Source tag written to `cards.source` and `counts.source`.
pub const SOURCE_TAG: &str = "hackernews";

const USER_AGENT: &str = concat!("trend-ingest/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct HnResponse {
    // Hits are decoded one by one so a single bad hit stays an item-level failure.
    hits: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct HnHit {
    #[serde(rename = "objectID", default)]
    object_id: Option<serde_json::Value>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    points: Option<i64>,
    #[serde(default)]
    num_comments: Option<i64>,
    #[serde(default)]
    created_at_i: Option<i64>,
    #[serde(rename = "_tags", default)]
    tags: Option<Vec<String>>,
}

impl From<HnHit> for RawItem {
    fn from(hit: HnHit) -> Self {
        RawItem {
            external_id: hit.object_id.as_ref().and_then(object_id_of),
            title: hit.title,
            url: hit.url.filter(|u| !u.trim().is_empty()),
            author: hit.author,
            points: hit.points,
            comment_count: hit.num_comments,
            created_at_epoch_seconds: hit.created_at_i,
            tags: hit.tags.unwrap_or_default(),
            malformed: None,
        }
    }
}

/// objectID is a string in practice; accept numbers too.
fn object_id_of(v: &serde_json::Value) -> Option<String> {
    match v {
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn decode_hit(value: serde_json::Value) -> RawItem {
    let external_id = value.get("objectID").and_then(object_id_of);
    match serde_json::from_value::<HnHit>(value) {
        Ok(hit) => hit.into(),
        Err(e) => {
            tracing::warn!(
                target: "ingest",
                external_id = external_id.as_deref().unwrap_or("<missing>"),
                error = %e,
                "hit could not be decoded"
            );
            RawItem::malformed(external_id, e.to_string())
        }
    }
}

/// Discussion page of a story, used when the story has no outbound link.
pub fn discussion_url(external_id: &str) -> String {
    format!("https://news.ycombinator.com/item?id={external_id}")
}

pub struct HnFeed {
    url: String,
    client: Client,
}

impl HnFeed {
    pub fn new(url: impl Into<String>) -> Result<Self, FetchError> {
        Self::with_timeout(url, None)
    }

    /// `timeout = None` keeps reqwest's defaults.
    pub fn with_timeout(url: impl Into<String>, timeout: Option<Duration>) -> Result<Self, FetchError> {
        let mut builder = Client::builder().user_agent(USER_AGENT);
        if let Some(t) = timeout {
            builder = builder.timeout(t);
        }
        let client = builder.build().map_err(FetchError::Transport)?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Decode an Algolia search response body into feed items, preserving order.
    ///
    /// Only a body that is not JSON or lacks the `hits` array fails the fetch.
    /// Hits with wrongly typed fields come back as [`RawItem::malformed`].
    pub fn parse_hits(body: &str) -> Result<Vec<RawItem>, FetchError> {
        let resp: HnResponse = serde_json::from_str(body).map_err(FetchError::Decode)?;
        Ok(resp.hits.into_iter().map(decode_hit).collect())
    }
}

#[async_trait]
impl FeedSource for HnFeed {
    async fn fetch_items(&self) -> Result<Vec<RawItem>, FetchError> {
        let t0 = std::time::Instant::now();
        let result = async {
            let resp = self
                .client
                .get(&self.url)
                .header(ACCEPT, "application/json")
                .header(CACHE_CONTROL, "no-cache")
                .header(PRAGMA, "no-cache")
                .send()
                .await
                .map_err(FetchError::Transport)?;

            let status = resp.status();
            if !status.is_success() {
                return Err(FetchError::Status(status));
            }

            let body = resp.text().await.map_err(FetchError::Transport)?;
            Self::parse_hits(&body)
        }
        .await;

        histogram!("ingest_fetch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        match &result {
            Ok(items) => {
                tracing::debug!(target: "ingest", provider = self.name(), count = items.len(), "feed fetched");
            }
            Err(e) => {
                tracing::warn!(target: "ingest", error = %e, provider = self.name(), "feed fetch failed");
                counter!("ingest_provider_errors_total").increment(1);
            }
        }
        result
    }

    fn name(&self) -> &'static str {
        SOURCE_TAG
    }
}
