use std::cmp::Reverse;
use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::config::Category;
use crate::item::NewsItem;

const NAIVE_DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y/%m/%d %H:%M:%S"];

/// Parses the timestamp formats seen in syndication feeds.
///
/// Tries RFC 2822 (RSS `pubDate`), then RFC 3339 (Atom), then a few
/// zone-less layouts which are taken as UTC. Returns `None` for anything
/// else, including the empty string.
pub fn parse_published(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(dt.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// Newest first. Unparsable timestamps rank as oldest; ties keep their order.
pub fn sort_by_recency(items: &mut [NewsItem]) {
    items.sort_by_cached_key(|item| Reverse(parse_published(&item.published_at)));
}

/// Builds the final list from everything the sources produced.
///
/// Every category keeps at most `per_category_cap` of its newest items.
/// The selections are concatenated, duplicate links are dropped (first
/// occurrence wins) and the result is ordered newest first.
pub fn select(items: Vec<NewsItem>, per_category_cap: usize) -> Vec<NewsItem> {
    let mut buckets: Vec<Vec<NewsItem>> = Category::ALL.iter().map(|_| Vec::new()).collect();
    for item in items {
        if let Some(idx) = Category::ALL.iter().position(|c| *c == item.category) {
            buckets[idx].push(item);
        }
    }

    let mut seen = HashSet::new();
    let mut selected = Vec::new();
    for mut bucket in buckets {
        sort_by_recency(&mut bucket);
        bucket.truncate(per_category_cap);
        selected.extend(bucket.into_iter().filter(|item| seen.insert(item.link.clone())));
    }

    sort_by_recency(&mut selected);
    selected
}
