// src/feed/mod.rs
pub mod hn;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::FetchError;

/// One story as delivered by the feed, before identity validation.
///
/// `external_id` and `title` stay optional here so a single incomplete hit
/// is rejected by the orchestrator instead of failing the whole fetch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawItem {
    pub external_id: Option<String>,
    pub title: Option<String>,
    pub url: Option<String>,
    pub author: Option<String>,
    pub points: Option<i64>,
    pub comment_count: Option<i64>,
    pub created_at_epoch_seconds: Option<i64>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Decoder message for a hit whose fields had the wrong shape.
    #[serde(skip)]
    pub malformed: Option<String>,
}

impl RawItem {
    /// Placeholder for a hit that failed to decode. It keeps its feed position.
    pub fn malformed(external_id: Option<String>, reason: impl Into<String>) -> Self {
        Self {
            external_id,
            malformed: Some(reason.into()),
            ..Self::default()
        }
    }
}

/// A remote source of items. One call, no retry, all-or-nothing.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch_items(&self) -> Result<Vec<RawItem>, FetchError>;
    fn name(&self) -> &'static str;
}

/// Fixed in-memory feed. Handy for tests and dry runs.
#[derive(Debug, Clone, Default)]
pub struct StaticFeed {
    items: Vec<RawItem>,
}

impl StaticFeed {
    pub fn new(items: Vec<RawItem>) -> Self {
        Self { items }
    }
}

#[async_trait]
impl FeedSource for StaticFeed {
    async fn fetch_items(&self) -> Result<Vec<RawItem>, FetchError> {
        Ok(self.items.clone())
    }

    fn name(&self) -> &'static str {
        "static"
    }
}
