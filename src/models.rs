use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use rand::rngs::OsRng;
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

const ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const ID_SUFFIX_LEN: usize = 9;

/// Record identifier: `key_<unix millis>_<9 base36 chars>`.
pub fn new_key_id() -> String {
    let millis = Utc::now().timestamp_millis();
    let mut rng = OsRng;
    let suffix: String = (0..ID_SUFFIX_LEN)
        .map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char)
        .collect();
    format!("key_{millis}_{suffix}")
}

pub fn new_user_id() -> String {
    let mut bytes = [0u8; 16];
    OsRng.fill_bytes(&mut bytes);
    // set version 4 and variant bits
    bytes[6] = (bytes[6] & 0x0F) | 0x40;
    bytes[8] = (bytes[8] & 0x3F) | 0x80;
    let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
    format!(
        "user_{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    )
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Ai,
    Payment,
    Email,
    Database,
    Analytics,
    Social,
    #[default]
    General,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Category::Ai,
        Category::Payment,
        Category::Email,
        Category::Database,
        Category::Analytics,
        Category::Social,
        Category::General,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Ai => "ai",
            Category::Payment => "payment",
            Category::Email => "email",
            Category::Database => "database",
            Category::Analytics => "analytics",
            Category::Social => "social",
            Category::General => "general",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Category::Ai => "AI & ML",
            Category::Payment => "Payment",
            Category::Email => "Email",
            Category::Database => "Database",
            Category::Analytics => "Analytics",
            Category::Social => "Social",
            Category::General => "General",
        }
    }

    pub fn parse(raw: &str) -> Option<Category> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(raw.trim()))
    }

    pub fn next(self) -> Category {
        let idx = Category::ALL.iter().position(|c| *c == self).unwrap_or(0);
        Category::ALL[(idx + 1) % Category::ALL.len()]
    }

    pub fn prev(self) -> Category {
        let idx = Category::ALL.iter().position(|c| *c == self).unwrap_or(0);
        Category::ALL[(idx + Category::ALL.len() - 1) % Category::ALL.len()]
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Category selection in the header; `All` is the wildcard chip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CategoryFilter {
    #[default]
    All,
    Only(Category),
}

impl CategoryFilter {
    pub fn chips() -> Vec<CategoryFilter> {
        let mut chips = vec![CategoryFilter::All];
        chips.extend(Category::ALL.into_iter().map(CategoryFilter::Only));
        chips
    }

    pub fn label(self) -> &'static str {
        match self {
            CategoryFilter::All => "All Keys",
            CategoryFilter::Only(category) => category.label(),
        }
    }

    pub fn accepts(self, category: Category) -> bool {
        match self {
            CategoryFilter::All => true,
            CategoryFilter::Only(wanted) => wanted == category,
        }
    }

    pub fn next(self) -> CategoryFilter {
        let chips = Self::chips();
        let idx = chips.iter().position(|c| *c == self).unwrap_or(0);
        chips[(idx + 1) % chips.len()]
    }

    pub fn prev(self) -> CategoryFilter {
        let chips = Self::chips();
        let idx = chips.iter().position(|c| *c == self).unwrap_or(0);
        chips[(idx + chips.len() - 1) % chips.len()]
    }
}

/// One stored API credential with its metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiKey {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub description: Option<String>,
    pub api_key: String,
    pub category: Category,
    pub service_url: Option<String>,
    pub expires_at: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub tags: Vec<String>,
}

impl ApiKey {
    /// Builds a fresh record owned by `user_id`; both timestamps are `now`.
    pub fn from_draft(draft: KeyDraft, user_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: new_key_id(),
            user_id: user_id.to_string(),
            name: draft.name,
            description: draft.description,
            api_key: draft.api_key,
            category: draft.category,
            service_url: draft.service_url,
            expires_at: draft.expires_at,
            created_at: now,
            updated_at: now,
            last_used_at: draft.last_used_at,
            is_active: draft.is_active,
            tags: draft.tags,
        }
    }

    pub fn wipe(&mut self) {
        self.api_key.zeroize();
        self.name.zeroize();
        if let Some(description) = self.description.as_mut() {
            description.zeroize();
        }
    }
}

/// Creation payload: everything except identity and timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyDraft {
    pub name: String,
    pub description: Option<String>,
    pub api_key: String,
    pub category: Category,
    pub service_url: Option<String>,
    pub expires_at: Option<NaiveDate>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub tags: Vec<String>,
}

impl KeyDraft {
    pub fn new(name: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            api_key: api_key.into(),
            category: Category::default(),
            service_url: None,
            expires_at: None,
            last_used_at: None,
            is_active: true,
            tags: Vec::new(),
        }
    }
}

/// Partial update. `None` leaves a field untouched; `Some(None)` clears a
/// nullable field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeyUpdate {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub api_key: Option<String>,
    pub category: Option<Category>,
    pub service_url: Option<Option<String>>,
    pub expires_at: Option<Option<NaiveDate>>,
    pub last_used_at: Option<Option<DateTime<Utc>>>,
    pub is_active: Option<bool>,
    pub tags: Option<Vec<String>>,
}

impl KeyUpdate {
    pub fn active(is_active: bool) -> Self {
        Self {
            is_active: Some(is_active),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AuthState {
    pub user: Option<User>,
    pub is_loading: bool,
}

impl AuthState {
    pub fn signed_out() -> Self {
        Self::default()
    }

    pub fn loading() -> Self {
        Self {
            user: None,
            is_loading: true,
        }
    }

    pub fn signed_in(user: User) -> Self {
        Self {
            user: Some(user),
            is_loading: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_ids_follow_the_prefixed_format() {
        let id = new_key_id();
        let parts: Vec<&str> = id.split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "key");
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2].len(), ID_SUFFIX_LEN);
        assert!(parts[2].bytes().all(|b| ID_ALPHABET.contains(&b)));
        assert_ne!(new_key_id(), new_key_id());
    }

    #[test]
    fn category_parse_is_case_insensitive_and_rejects_unknown() {
        assert_eq!(Category::parse("AI"), Some(Category::Ai));
        assert_eq!(Category::parse(" payment "), Some(Category::Payment));
        assert_eq!(Category::parse("crypto"), None);
    }

    #[test]
    fn category_cycling_wraps_around() {
        assert_eq!(Category::General.next(), Category::Ai);
        assert_eq!(Category::Ai.prev(), Category::General);
        assert_eq!(CategoryFilter::All.prev(), CategoryFilter::Only(Category::General));
        assert_eq!(CategoryFilter::All.next(), CategoryFilter::Only(Category::Ai));
    }

    #[test]
    fn draft_defaults_to_active_general_without_tags() {
        let draft = KeyDraft::new("OpenAI", "sk-abc123xyz789");
        assert_eq!(draft.category, Category::General);
        assert!(draft.is_active);
        assert!(draft.tags.is_empty());
    }

    #[test]
    fn record_from_draft_has_equal_timestamps() {
        let now = Utc::now();
        let key = ApiKey::from_draft(KeyDraft::new("n", "s"), "user_1", now);
        assert_eq!(key.created_at, key.updated_at);
        assert_eq!(key.user_id, "user_1");
        assert!(key.id.starts_with("key_"));
    }
}
