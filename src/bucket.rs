// src/bucket.rs
//! # Bucket Aligner
//! Maps a timestamp to the fixed-size window that contains it.
//!
//! Alignment works on the wall-clock minute of whatever timezone the
//! timestamp carries. The service always passes `DateTime<Utc>`, so stored
//! bucket boundaries are UTC-aligned regardless of the host's local zone.

use chrono::{DateTime, Duration, SecondsFormat, TimeZone, Timelike, Utc};

use crate::error::ConfigError;

/// Default bucket width used by the reference deployment.
pub const DEFAULT_BUCKET_MINUTES: u32 = 15;

/// ISO-8601 with millisecond precision and a `Z` suffix, e.g. `2025-03-14T10:30:00.000Z`.
pub fn to_iso(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// A validated bucket width in minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketSpec {
    minutes: u32,
}

/// Half-open window `[start, end)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketWindow<Tz: TimeZone = Utc> {
    pub start: DateTime<Tz>,
    pub end: DateTime<Tz>,
}

impl<Tz: TimeZone> BucketWindow<Tz> {
    pub fn contains(&self, ts: &DateTime<Tz>) -> bool {
        self.start <= *ts && *ts < self.end
    }
}

impl BucketSpec {
    /// Widths must divide the hour evenly, otherwise the window starting at
    /// the last aligned minute of an hour would overlap the next hour's first one.
    pub fn new(minutes: u32) -> Result<Self, ConfigError> {
        if minutes == 0 || minutes > 60 || 60 % minutes != 0 {
            return Err(ConfigError::InvalidBucketSize(minutes));
        }
        Ok(Self { minutes })
    }

    pub fn minutes(&self) -> u32 {
        self.minutes
    }

    pub fn duration(&self) -> Duration {
        Duration::minutes(i64::from(self.minutes))
    }

    /// Audit label stored next to each observation, e.g. `15m` or `1h`.
    pub fn label(&self) -> String {
        if self.minutes == 60 {
            "1h".to_string()
        } else {
            format!("{}m", self.minutes)
        }
    }

    /// Floor `ts` to its bucket and return the enclosing window.
    pub fn align_to_bucket<Tz: TimeZone>(&self, ts: &DateTime<Tz>) -> BucketWindow<Tz> {
        let minute = ts.minute();
        let aligned_minute = (minute / self.minutes) * self.minutes;
        let offset = Duration::minutes(i64::from(minute - aligned_minute))
            + Duration::seconds(i64::from(ts.second()))
            + Duration::nanoseconds(i64::from(ts.nanosecond()));
        let start = ts.clone() - offset;
        let end = start.clone() + self.duration();
        BucketWindow { start, end }
    }

    /// Window containing the current instant.
    pub fn current_window(&self) -> BucketWindow<Utc> {
        self.align_to_bucket(&Utc::now())
    }
}

impl Default for BucketSpec {
    fn default() -> Self {
        Self {
            minutes: DEFAULT_BUCKET_MINUTES,
        }
    }
}
