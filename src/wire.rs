//! Persisted record shape and its conversion to [`ApiKey`].
//!
//! Stores keep rows the way a hosted table would: booleans as `0`/`1`,
//! the tag list as a JSON text blob, timestamps as RFC 3339 text and the
//! expiry as a bare `YYYY-MM-DD` date.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::models::{ApiKey, Category, KeyUpdate};

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Error)]
pub enum WireError {
    #[error("invalid {field} timestamp '{value}'")]
    Timestamp { field: &'static str, value: String },
    #[error("invalid expiry date '{0}'")]
    Date(String),
    #[error("invalid tag list: {0}")]
    Tags(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredKey {
    pub id: String,
    pub user_id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub api_key: String,
    pub category: String,
    #[serde(default)]
    pub service_url: Option<String>,
    #[serde(default)]
    pub expires_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default)]
    pub last_used_at: Option<String>,
    pub is_active: i64,
    #[serde(default)]
    pub tags: Option<String>,
}

/// Column changes sent with an update. `updated_at` is always present.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredPatch {
    pub updated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_url: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<String>,
}

impl StoredPatch {
    pub fn apply_to(&self, row: &mut StoredKey) {
        row.updated_at = self.updated_at.clone();
        if let Some(name) = &self.name {
            row.name = name.clone();
        }
        if let Some(description) = &self.description {
            row.description = description.clone();
        }
        if let Some(api_key) = &self.api_key {
            row.api_key = api_key.clone();
        }
        if let Some(category) = &self.category {
            row.category = category.clone();
        }
        if let Some(service_url) = &self.service_url {
            row.service_url = service_url.clone();
        }
        if let Some(expires_at) = &self.expires_at {
            row.expires_at = expires_at.clone();
        }
        if let Some(last_used_at) = &self.last_used_at {
            row.last_used_at = last_used_at.clone();
        }
        if let Some(is_active) = self.is_active {
            row.is_active = is_active;
        }
        if let Some(tags) = &self.tags {
            row.tags = Some(tags.clone());
        }
    }
}

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_timestamp(field: &'static str, raw: &str) -> Result<DateTime<Utc>, WireError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| WireError::Timestamp {
            field,
            value: raw.to_string(),
        })
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Accepts a bare date or a full timestamp (its UTC date is kept).
pub fn parse_date(raw: &str) -> Result<NaiveDate, WireError> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .or_else(|_| DateTime::parse_from_rfc3339(raw).map(|dt| dt.with_timezone(&Utc).date_naive()))
        .map_err(|_| WireError::Date(raw.to_string()))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn encode_tags(tags: &[String]) -> Result<String, WireError> {
    Ok(serde_json::to_string(tags)?)
}

impl StoredKey {
    pub fn encode(key: &ApiKey) -> Result<Self, WireError> {
        Ok(Self {
            id: key.id.clone(),
            user_id: key.user_id.clone(),
            name: key.name.clone(),
            description: non_empty(key.description.clone()),
            api_key: key.api_key.clone(),
            category: key.category.as_str().to_string(),
            service_url: non_empty(key.service_url.clone()),
            expires_at: key.expires_at.map(format_date),
            created_at: format_timestamp(key.created_at),
            updated_at: format_timestamp(key.updated_at),
            last_used_at: key.last_used_at.map(format_timestamp),
            is_active: i64::from(key.is_active),
            tags: Some(encode_tags(&key.tags)?),
        })
    }

    pub fn decode(self) -> Result<ApiKey, WireError> {
        let category = Category::parse(&self.category).unwrap_or_else(|| {
            warn!(id = %self.id, category = %self.category, "unknown category, showing as general");
            Category::General
        });
        let tags: Vec<String> = match self.tags.as_deref() {
            Some(raw) if !raw.is_empty() => serde_json::from_str(raw)?,
            _ => Vec::new(),
        };
        let expires_at = match non_empty(self.expires_at) {
            Some(raw) => Some(parse_date(&raw)?),
            None => None,
        };
        let last_used_at = match non_empty(self.last_used_at) {
            Some(raw) => Some(parse_timestamp("lastUsedAt", &raw)?),
            None => None,
        };
        Ok(ApiKey {
            created_at: parse_timestamp("createdAt", &self.created_at)?,
            updated_at: parse_timestamp("updatedAt", &self.updated_at)?,
            id: self.id,
            user_id: self.user_id,
            name: self.name,
            description: non_empty(self.description),
            api_key: self.api_key,
            category,
            service_url: non_empty(self.service_url),
            expires_at,
            last_used_at,
            is_active: self.is_active > 0,
            tags,
        })
    }
}

/// Maps the present fields of `update`; empty optional text clears the column.
pub fn encode_update(update: &KeyUpdate, now: DateTime<Utc>) -> Result<StoredPatch, WireError> {
    Ok(StoredPatch {
        updated_at: format_timestamp(now),
        name: update.name.clone(),
        description: update.description.clone().map(non_empty),
        api_key: update.api_key.clone(),
        category: update.category.map(|c| c.as_str().to_string()),
        service_url: update.service_url.clone().map(non_empty),
        expires_at: update.expires_at.map(|d| d.map(format_date)),
        last_used_at: update.last_used_at.map(|t| t.map(format_timestamp)),
        is_active: update.is_active.map(i64::from),
        tags: match &update.tags {
            Some(tags) => Some(encode_tags(tags)?),
            None => None,
        },
    })
}
