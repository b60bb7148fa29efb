// tests/bucket.rs
//
// Bucket alignment over fixed instants, fixed-offset zones, and a seeded
// sweep of random timestamps.

use chrono::{DateTime, Duration, FixedOffset, TimeZone, Timelike, Utc};
use rand::{rngs::StdRng, Rng, SeedableRng};

use trend_ingest::bucket::{to_iso, BucketSpec};
use trend_ingest::error::ConfigError;

fn utc(h: u32, m: u32, s: u32, ms: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 14, h, m, s).unwrap() + Duration::milliseconds(i64::from(ms))
}

#[test]
fn fifteen_minute_examples() {
    let spec = BucketSpec::new(15).unwrap();

    let w = spec.align_to_bucket(&utc(10, 37, 45, 123));
    assert_eq!(to_iso(&w.start), "2025-03-14T10:30:00.000Z");
    assert_eq!(to_iso(&w.end), "2025-03-14T10:45:00.000Z");

    let w = spec.align_to_bucket(&utc(10, 45, 0, 0));
    assert_eq!(to_iso(&w.start), "2025-03-14T10:45:00.000Z");
    assert_eq!(to_iso(&w.end), "2025-03-14T11:00:00.000Z");

    let w = spec.align_to_bucket(&utc(23, 59, 59, 999));
    assert_eq!(to_iso(&w.start), "2025-03-14T23:45:00.000Z");
    assert_eq!(to_iso(&w.end), "2025-03-15T00:00:00.000Z");
}

#[test]
fn other_widths() {
    let t = utc(10, 37, 45, 0);
    let five = BucketSpec::new(5).unwrap().align_to_bucket(&t);
    assert_eq!(to_iso(&five.start), "2025-03-14T10:35:00.000Z");
    let hour = BucketSpec::new(60).unwrap().align_to_bucket(&t);
    assert_eq!(to_iso(&hour.start), "2025-03-14T10:00:00.000Z");
    assert_eq!(to_iso(&hour.end), "2025-03-14T11:00:00.000Z");
    let one = BucketSpec::new(1).unwrap().align_to_bucket(&t);
    assert_eq!(to_iso(&one.start), "2025-03-14T10:37:00.000Z");
}

#[test]
fn invalid_widths_are_config_errors() {
    for bad in [0, 7, 45, 61, 90] {
        assert!(
            matches!(BucketSpec::new(bad), Err(ConfigError::InvalidBucketSize(n)) if n == bad),
            "{bad} should be rejected"
        );
    }
    for good in [1, 2, 3, 4, 5, 6, 10, 12, 15, 20, 30, 60] {
        assert!(BucketSpec::new(good).is_ok(), "{good} should be accepted");
    }
}

#[test]
fn alignment_uses_the_timestamps_own_wall_clock() {
    // +05:30 shifts minute-of-hour by 30, so a 60m bucket differs from UTC's.
    let ist = FixedOffset::east_opt(5 * 3600 + 1800).unwrap();
    let t = ist.with_ymd_and_hms(2025, 3, 14, 16, 7, 45).unwrap();
    let w = BucketSpec::new(60).unwrap().align_to_bucket(&t);
    assert_eq!(w.start, ist.with_ymd_and_hms(2025, 3, 14, 16, 0, 0).unwrap());

    let same_instant_utc = t.with_timezone(&Utc);
    let wu = BucketSpec::new(60).unwrap().align_to_bucket(&same_instant_utc);
    assert_eq!(to_iso(&wu.start), "2025-03-14T10:00:00.000Z");
    assert_ne!(w.start.with_timezone(&Utc), wu.start);
}

#[test]
fn randomized_instants_fall_in_their_window() {
    let mut rng = StdRng::seed_from_u64(42);
    let base = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
    let widths = [1, 5, 10, 15, 20, 30, 60];

    for _ in 0..2_000 {
        let minutes = widths[rng.random_range(0..widths.len())];
        let spec = BucketSpec::new(minutes).unwrap();
        let offset_ms: i64 = rng.random_range(0..(6 * 365 * 24 * 3600 * 1000_i64));
        let t = base + Duration::milliseconds(offset_ms);

        let w = spec.align_to_bucket(&t);
        assert!(w.contains(&t), "{t} not in [{}, {})", w.start, w.end);
        assert_eq!(w.end - w.start, spec.duration());
        assert_eq!(w.start.second(), 0);
        assert_eq!(w.start.nanosecond(), 0);
        assert_eq!(w.start.minute() % minutes, 0);
        // Same window for every instant inside it.
        assert_eq!(spec.align_to_bucket(&w.start), w);
        assert_eq!(
            spec.align_to_bucket(&(w.end - Duration::milliseconds(1))),
            w
        );
    }
}

#[test]
fn labels() {
    assert_eq!(BucketSpec::new(15).unwrap().label(), "15m");
    assert_eq!(BucketSpec::new(60).unwrap().label(), "1h");
    assert_eq!(BucketSpec::default().minutes(), 15);
}
