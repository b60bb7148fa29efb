// src/ingest/record.rs
//! Canonical card and metric rows derived from one feed item.

use chrono::{DateTime, Utc};
use serde_json::json;

use crate::bucket::{to_iso, BucketWindow};
use crate::error::ItemProcessingError;
use crate::feed::hn::{discussion_url, SOURCE_TAG};
use crate::feed::RawItem;
use crate::slug::generate_slug;
use crate::store::{CardId, MetricObservation, NewCard, Scores};

pub const CATEGORY: &str = "Technology";

pub const METRIC_RANK: &str = "rank";
pub const METRIC_POINTS: &str = "points";
pub const METRIC_COMMENTS: &str = "comments";

/// A feed item that passed identity validation.
#[derive(Debug, Clone, PartialEq)]
pub struct StoryRecord {
    pub external_id: String,
    pub title: String,
    pub url: Option<String>,
    pub author: Option<String>,
    pub points: i64,
    pub comment_count: i64,
    pub created_at: Option<DateTime<Utc>>,
    pub tags: Vec<String>,
    /// 1-based position in the fetched sequence.
    pub rank: usize,
}

impl StoryRecord {
    /// `rank` is the item's 1-based position in feed order, never re-sorted.
    pub fn from_raw(raw: &RawItem, rank: usize) -> Result<Self, ItemProcessingError> {
        if let Some(reason) = &raw.malformed {
            return Err(ItemProcessingError::Malformed {
                position: rank,
                reason: reason.clone(),
            });
        }
        let external_id = raw
            .external_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(ItemProcessingError::MissingField {
                position: rank,
                field: "external_id",
            })?
            .to_string();
        let title = raw.title.clone().ok_or(ItemProcessingError::MissingField {
            position: rank,
            field: "title",
        })?;

        Ok(Self {
            external_id,
            title,
            url: raw.url.clone(),
            author: raw.author.clone(),
            points: raw.points.unwrap_or(0),
            comment_count: raw.comment_count.unwrap_or(0),
            created_at: raw
                .created_at_epoch_seconds
                .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0)),
            tags: raw.tags.clone(),
            rank,
        })
    }

    pub fn slug(&self) -> String {
        generate_slug(&self.title, &self.external_id)
    }

    pub fn discussion_url(&self) -> String {
        discussion_url(&self.external_id)
    }

    pub fn to_card(&self) -> NewCard {
        let hn_url = self.discussion_url();
        let metadata = json!({
            "hn_id": self.external_id,
            "url": self.url,
            "hn_url": hn_url,
            "author": self.author,
            "created_at": self.created_at.as_ref().map(to_iso),
            "source": SOURCE_TAG,
            "points": self.points,
            "num_comments": self.comment_count,
            "tags": self.tags,
        });

        NewCard {
            slug: self.slug(),
            title: self.title.clone(),
            description: format!(
                "Hacker News story by {}",
                self.author.as_deref().unwrap_or("unknown")
            ),
            category: CATEGORY.to_string(),
            source: SOURCE_TAG.to_string(),
            source_url: self.url.clone().unwrap_or(hn_url),
            scores: Scores::default(),
            source_tags: vec![SOURCE_TAG.to_string()],
            metadata,
        }
    }

    /// Tracked metrics for a card in feed order: rank, points, comments.
    pub fn observations(
        &self,
        card_id: CardId,
        window: &BucketWindow<Utc>,
        bucket_label: &str,
    ) -> Vec<MetricObservation> {
        [
            (METRIC_RANK, self.rank as f64),
            (METRIC_POINTS, self.points as f64),
            (METRIC_COMMENTS, self.comment_count as f64),
        ]
        .into_iter()
        .map(|(name, value)| MetricObservation {
            card_id,
            source: SOURCE_TAG.to_string(),
            metric_name: name.to_string(),
            metric_value: value,
            bucket_start: window.start,
            bucket_end: window.end,
            bucket_size: bucket_label.to_string(),
        })
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucket::BucketSpec;
    use chrono::TimeZone;

    fn raw(id: Option<&str>, title: Option<&str>) -> RawItem {
        RawItem {
            external_id: id.map(str::to_string),
            title: title.map(str::to_string),
            author: Some("pg".into()),
            points: Some(321),
            comment_count: Some(45),
            created_at_epoch_seconds: Some(1_700_000_000),
            tags: vec!["story".into()],
            ..RawItem::default()
        }
    }

    #[test]
    fn card_uses_discussion_url_when_story_has_no_link() {
        let story = StoryRecord::from_raw(&raw(Some("42"), Some("Ask HN: Anything?")), 3).unwrap();
        let card = story.to_card();
        assert_eq!(card.slug, "ask-hn-anything-42");
        assert_eq!(card.source_url, "https://news.ycombinator.com/item?id=42");
        assert_eq!(card.description, "Hacker News story by pg");
        assert_eq!(card.category, "Technology");
        assert_eq!(card.scores, Scores::default());
        assert_eq!(card.metadata["url"], serde_json::Value::Null);
        assert_eq!(card.metadata["created_at"], "2023-11-14T22:13:20.000Z");
        assert_eq!(card.metadata["num_comments"], 45);
    }

    #[test]
    fn missing_identity_is_an_item_error() {
        let err = StoryRecord::from_raw(&raw(None, Some("t")), 1).unwrap_err();
        assert!(matches!(err, ItemProcessingError::MissingField { field: "external_id", .. }));
        let err = StoryRecord::from_raw(&raw(Some("  "), Some("t")), 1).unwrap_err();
        assert!(matches!(err, ItemProcessingError::MissingField { field: "external_id", .. }));
        let err = StoryRecord::from_raw(&raw(Some("1"), None), 2).unwrap_err();
        assert!(matches!(err, ItemProcessingError::MissingField { position: 2, field: "title" }));
    }

    #[test]
    fn undecodable_hit_is_an_item_error() {
        let raw = RawItem::malformed(Some("8".into()), "invalid type: string \"many\"");
        let err = StoryRecord::from_raw(&raw, 4).unwrap_err();
        assert!(matches!(err, ItemProcessingError::Malformed { position: 4, .. }));
        assert!(err.to_string().contains("many"));
    }

    #[test]
    fn observations_carry_rank_points_comments() {
        let story = StoryRecord::from_raw(&raw(Some("7"), Some("x")), 5).unwrap();
        let spec = BucketSpec::default();
        let window = spec.align_to_bucket(&Utc.with_ymd_and_hms(2025, 1, 1, 12, 7, 0).unwrap());
        let obs = story.observations(99, &window, &spec.label());
        let pairs: Vec<(&str, f64)> = obs
            .iter()
            .map(|o| (o.metric_name.as_str(), o.metric_value))
            .collect();
        assert_eq!(pairs, vec![("rank", 5.0), ("points", 321.0), ("comments", 45.0)]);
        assert!(obs.iter().all(|o| o.bucket_size == "15m" && o.card_id == 99));
    }
}
