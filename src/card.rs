//! Per-card presentation helpers: secret masking, expiry badges, relative
//! times and the clipboard/browser affordances.

use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Result};
use arboard::Clipboard;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, NaiveTime, TimeZone, Utc};
use url::Url;

const CLIPBOARD_LIFETIME_SECS: u64 = 20;
const MASK_CHAR: char = '•';
const VISIBLE_EDGE: usize = 4;
const DAY_MS: i64 = 24 * 60 * 60 * 1000;
pub const CRITICAL_DAYS: i64 = 7;
pub const WARNING_DAYS: i64 = 30;

/// Keeps the first and last four characters of secrets longer than eight.
pub fn mask_secret(secret: &str) -> String {
    let len = secret.chars().count();
    if len <= VISIBLE_EDGE * 2 {
        return secret.to_string();
    }
    secret
        .chars()
        .enumerate()
        .map(|(idx, ch)| {
            if idx < VISIBLE_EDGE || idx >= len - VISIBLE_EDGE {
                ch
            } else {
                MASK_CHAR
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryStatus {
    Expired,
    /// 0 to 7 days left.
    Expiring(i64),
    /// 8 to 30 days left.
    Warning(i64),
    Good(i64),
}

impl ExpiryStatus {
    pub fn label(self) -> String {
        match self {
            ExpiryStatus::Expired => "Expired".to_string(),
            ExpiryStatus::Expiring(days) | ExpiryStatus::Warning(days) | ExpiryStatus::Good(days) => {
                format!("Expires in {days} days")
            }
        }
    }
}

/// Start of the expiry day, UTC.
pub fn expiry_instant(expires_on: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&expires_on.and_time(NaiveTime::MIN))
}

/// Whole days until expiry, rounded up.
pub fn days_until(expires_on: NaiveDate, now: DateTime<Utc>) -> i64 {
    let millis = (expiry_instant(expires_on) - now).num_milliseconds();
    millis.div_euclid(DAY_MS) + i64::from(millis.rem_euclid(DAY_MS) != 0)
}

pub fn expiry_status(expires_on: Option<NaiveDate>, now: DateTime<Utc>) -> Option<ExpiryStatus> {
    let days = days_until(expires_on?, now);
    Some(if days < 0 {
        ExpiryStatus::Expired
    } else if days <= CRITICAL_DAYS {
        ExpiryStatus::Expiring(days)
    } else if days <= WARNING_DAYS {
        ExpiryStatus::Warning(days)
    } else {
        ExpiryStatus::Good(days)
    })
}

fn plural(n: i64, unit: &str) -> String {
    if n == 1 {
        format!("1 {unit}")
    } else {
        format!("{n} {unit}s")
    }
}

/// "3 days ago" style distance between `then` and `now`.
pub fn relative_time(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let delta = now - then;
    let future = delta < ChronoDuration::zero();
    let delta = if future { -delta } else { delta };

    let phrase = if delta < ChronoDuration::minutes(1) {
        "less than a minute".to_string()
    } else if delta < ChronoDuration::hours(1) {
        plural(delta.num_minutes(), "minute")
    } else if delta < ChronoDuration::days(1) {
        format!("about {}", plural(delta.num_hours(), "hour"))
    } else if delta < ChronoDuration::days(30) {
        plural(delta.num_days(), "day")
    } else if delta < ChronoDuration::days(365) {
        format!("about {}", plural(delta.num_days() / 30, "month"))
    } else {
        format!("about {}", plural(delta.num_days() / 365, "year"))
    };

    if future {
        format!("in {phrase}")
    } else {
        format!("{phrase} ago")
    }
}

/// Hostname for display; unparseable URLs are shown as typed.
pub fn service_host(raw: &str) -> String {
    Url::parse(raw)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| raw.to_string())
}

/// Copies `secret` and clears the clipboard again after a short delay.
pub fn copy_to_clipboard(secret: &str) -> Result<()> {
    let mut clipboard = Clipboard::new().map_err(|e| anyhow!("Clipboard unavailable: {e}"))?;
    clipboard
        .set_text(secret.to_string())
        .map_err(|e| anyhow!("Failed to set clipboard: {e}"))?;
    thread::spawn(move || {
        thread::sleep(Duration::from_secs(CLIPBOARD_LIFETIME_SECS));
        let _ = clipboard.set_text(String::new());
    });
    Ok(())
}

pub fn open_service_url(raw: &str) -> Result<()> {
    let url = Url::parse(raw).map_err(|e| anyhow!("Invalid service URL '{raw}': {e}"))?;
    open::that(url.as_str()).map_err(|e| anyhow!("Failed to open {url}: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).unwrap()
    }

    fn in_days(days: i64) -> Option<NaiveDate> {
        Some((noon() + ChronoDuration::days(days)).date_naive())
    }

    #[test]
    fn short_secrets_are_not_masked() {
        assert_eq!(mask_secret(""), "");
        assert_eq!(mask_secret("abc"), "abc");
        assert_eq!(mask_secret("12345678"), "12345678");
    }

    #[test]
    fn long_secrets_keep_four_characters_each_side() {
        let masked = mask_secret("sk-abc123xyz789");
        assert_eq!(masked, "sk-a•••••••z789");
        assert_eq!(masked.chars().count(), "sk-abc123xyz789".len());
        assert_eq!(mask_secret("123456789"), "1234•6789");
    }

    #[test]
    fn masking_counts_characters_not_bytes() {
        assert_eq!(mask_secret("ключ-секретный"), "ключ••••••тный");
    }

    #[test]
    fn expiry_classification_bands() {
        assert_eq!(expiry_status(None, noon()), None);
        assert_eq!(expiry_status(in_days(-1), noon()), Some(ExpiryStatus::Expired));
        assert_eq!(expiry_status(in_days(3), noon()), Some(ExpiryStatus::Expiring(3)));
        assert_eq!(expiry_status(in_days(20), noon()), Some(ExpiryStatus::Warning(20)));
        assert_eq!(expiry_status(in_days(90), noon()), Some(ExpiryStatus::Good(90)));
    }

    #[test]
    fn expiry_band_edges() {
        // today's midnight has already passed at noon: zero days, still critical
        assert_eq!(expiry_status(in_days(0), noon()), Some(ExpiryStatus::Expiring(0)));
        assert_eq!(expiry_status(in_days(7), noon()), Some(ExpiryStatus::Expiring(7)));
        assert_eq!(expiry_status(in_days(8), noon()), Some(ExpiryStatus::Warning(8)));
        assert_eq!(expiry_status(in_days(30), noon()), Some(ExpiryStatus::Warning(30)));
        assert_eq!(expiry_status(in_days(31), noon()), Some(ExpiryStatus::Good(31)));
    }

    #[test]
    fn expiry_labels() {
        assert_eq!(ExpiryStatus::Expired.label(), "Expired");
        assert_eq!(ExpiryStatus::Warning(12).label(), "Expires in 12 days");
    }

    #[test]
    fn relative_time_phrases() {
        let now = noon();
        assert_eq!(relative_time(now - ChronoDuration::seconds(10), now), "less than a minute ago");
        assert_eq!(relative_time(now - ChronoDuration::minutes(1), now), "1 minute ago");
        assert_eq!(relative_time(now - ChronoDuration::hours(5), now), "about 5 hours ago");
        assert_eq!(relative_time(now - ChronoDuration::days(3), now), "3 days ago");
        assert_eq!(relative_time(now - ChronoDuration::days(65), now), "about 2 months ago");
        assert_eq!(relative_time(now + ChronoDuration::days(2), now), "in 2 days");
    }

    #[test]
    fn service_host_extracts_hostname() {
        assert_eq!(service_host("https://api.openai.com/v1"), "api.openai.com");
        assert_eq!(service_host("not a url"), "not a url");
    }
}
