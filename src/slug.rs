// src/slug.rs
//! Deterministic, URL-safe card identifiers.
//!
//! Pattern: `<slugified-title>-<external id>`. The output is used as the
//! idempotency key of the `cards` table, so it must stay stable across releases.

use once_cell::sync::OnceCell;
use regex::Regex;
use std::fmt::Display;

/// Maximum length of the title part (before the id suffix).
pub const MAX_TITLE_LEN: usize = 50;

/// Title part used when nothing alphanumeric survives normalization.
pub const FALLBACK_TITLE: &str = "untitled";

/// Generate the slug for a title and its external id.
///
/// Total over any input: empty or pure-symbol titles fall back to `untitled`.
pub fn generate_slug(title: &str, external_id: impl Display) -> String {
    format!("{}-{}", slugify_title(title), external_id)
}

/// Title part of the slug, without the id suffix.
pub fn slugify_title(title: &str) -> String {
    static RE_NON_ALNUM: OnceCell<Regex> = OnceCell::new();
    static RE_HYPHENS: OnceCell<Regex> = OnceCell::new();
    let re_non_alnum = RE_NON_ALNUM.get_or_init(|| Regex::new(r"[^a-z0-9]").expect("slug regex"));
    let re_hyphens = RE_HYPHENS.get_or_init(|| Regex::new(r"-+").expect("hyphen regex"));

    let lowered = title.to_lowercase().replace('\'', "");
    let hyphenated = re_non_alnum.replace_all(&lowered, "-");
    let collapsed = re_hyphens.replace_all(&hyphenated, "-");
    let trimmed = collapsed.trim_matches('-');

    let mut slug = if trimmed.is_empty() {
        FALLBACK_TITLE.to_string()
    } else {
        trimmed.to_string()
    };

    // Only ASCII is left at this point, so byte truncation is char-safe.
    if slug.len() > MAX_TITLE_LEN {
        slug.truncate(MAX_TITLE_LEN);
        let keep = slug.trim_end_matches('-').len();
        slug.truncate(keep);
    }
    slug
}
