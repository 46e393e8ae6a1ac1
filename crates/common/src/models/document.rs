//! Scraped document entity

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// A scraped page or extracted PDF
///
/// Immutable once stored; `url` is unique within a store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub url: String,

    pub title: String,

    pub content: String,

    #[serde(default)]
    pub category: String,

    /// Written as RFC 3339; naive ISO timestamps are read as UTC
    #[serde(default = "Utc::now", deserialize_with = "deserialize_scraped_at")]
    pub scraped_at: DateTime<Utc>,
}

impl Document {
    pub fn new(
        url: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            content: content.into(),
            category: category.into(),
            scraped_at: Utc::now(),
        }
    }
}

fn deserialize_scraped_at<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw).map_err(serde::de::Error::custom)
}

/// Accept RFC 3339 and the naive `YYYY-MM-DDTHH:MM:SS[.ffffff]` form
fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .map(|naive| naive.and_utc())
        .map_err(|e| format!("invalid scraped_at timestamp '{}': {}", raw, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_naive_timestamp_is_utc() {
        let json = r#"{
            "url": "https://help.example.com/bank-reconciliation/",
            "title": "Bank Reconciliation",
            "content": "Reconcile statements.",
            "category": "Banking",
            "scraped_at": "2024-03-05T10:15:30.123456"
        }"#;
        let doc: Document = serde_json::from_str(json).unwrap();
        assert_eq!(doc.scraped_at.year(), 2024);
        assert_eq!(doc.scraped_at.hour(), 10);
    }

    #[test]
    fn test_rfc3339_roundtrip_and_default_category() {
        let json = r#"{
            "url": "manual.pdf",
            "title": "Manual",
            "content": "text",
            "scraped_at": "2024-03-05T10:15:30+05:30"
        }"#;
        let doc: Document = serde_json::from_str(json).unwrap();
        assert_eq!(doc.category, "");
        assert_eq!(doc.scraped_at.hour(), 4);

        let written = serde_json::to_value(&doc).unwrap();
        let ts = written["scraped_at"].as_str().unwrap();
        assert!(DateTime::parse_from_rfc3339(ts).is_ok());
    }

    #[test]
    fn test_rejects_garbage_timestamp() {
        assert!(parse_timestamp("yesterday").is_err());
    }
}
