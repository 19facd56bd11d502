use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};

use crate::card::{expiry_instant, WARNING_DAYS};
use crate::models::ApiKey;

/// Aggregates shown above the card grid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyStats {
    pub total: usize,
    pub active: usize,
    /// Expiring within 30 days, already expired included.
    pub expiring_soon: usize,
    pub categories: usize,
}

impl KeyStats {
    pub fn collect<'a, I>(keys: I, now: DateTime<Utc>) -> Self
    where
        I: IntoIterator<Item = &'a ApiKey>,
    {
        let horizon = now + Duration::days(WARNING_DAYS);
        let mut stats = KeyStats::default();
        let mut categories = BTreeSet::new();
        for key in keys {
            stats.total += 1;
            if key.is_active {
                stats.active += 1;
            }
            if key.expires_at.is_some_and(|d| expiry_instant(d) <= horizon) {
                stats.expiring_soon += 1;
            }
            categories.insert(key.category);
        }
        stats.categories = categories.len();
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, KeyDraft};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).unwrap()
    }

    fn key(category: Category, active: bool, expires_in: Option<i64>) -> ApiKey {
        let mut draft = KeyDraft::new("k", "secret");
        draft.category = category;
        draft.is_active = active;
        draft.expires_at = expires_in.map(|d| (now() + Duration::days(d)).date_naive());
        ApiKey::from_draft(draft, "user_1", now())
    }

    #[test]
    fn empty_set_has_zero_stats() {
        assert_eq!(KeyStats::collect(Vec::<&ApiKey>::new(), now()), KeyStats::default());
    }

    #[test]
    fn counts_active_expiring_and_distinct_categories() {
        let keys = vec![
            key(Category::Ai, true, Some(-10)),
            key(Category::Ai, false, Some(30)),
            key(Category::Payment, true, Some(31)),
            key(Category::Email, true, None),
        ];
        let stats = KeyStats::collect(&keys, now());
        assert_eq!(
            stats,
            KeyStats {
                total: 4,
                active: 3,
                expiring_soon: 2,
                categories: 3,
            }
        );
    }

    #[test]
    fn stats_follow_the_filtered_view() {
        let keys = vec![key(Category::Ai, true, None), key(Category::Social, false, None)];
        let view: Vec<&ApiKey> = keys.iter().filter(|k| k.is_active).collect();
        let stats = KeyStats::collect(view, now());
        assert_eq!(stats.total, 1);
        assert_eq!(stats.categories, 1);
    }
}
