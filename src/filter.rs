use crate::models::{ApiKey, CategoryFilter};

/// True when `key` passes the category chip and contains `query`
/// (case-insensitive) in its name, description or any tag.
pub fn matches(key: &ApiKey, query: &str, category: CategoryFilter) -> bool {
    category.accepts(key.category) && matches_query(key, &query.to_lowercase())
}

fn matches_query(key: &ApiKey, needle: &str) -> bool {
    if needle.is_empty() {
        return true;
    }
    key.name.to_lowercase().contains(needle)
        || key
            .description
            .as_deref()
            .is_some_and(|d| d.to_lowercase().contains(needle))
        || key.tags.iter().any(|t| t.to_lowercase().contains(needle))
}

/// Filtered view over `keys`, preserving order.
pub fn filter_keys<'a>(keys: &'a [ApiKey], query: &str, category: CategoryFilter) -> Vec<&'a ApiKey> {
    keys.iter()
        .filter(|key| matches(key, query, category))
        .collect()
}
