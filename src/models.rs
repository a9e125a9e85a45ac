//! Core data models shared by the ingestion and delivery pipeline.
//!
//! Guides flow from upload through the storage agent into the
//! [`GuideStore`](crate::store::GuideStore); segments and translations are
//! produced on demand and never persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Identifier issued by the storage agent for a stored file.
///
/// The agent issues integers, but clients send them either as JSON
/// numbers or strings, so both are accepted. Always serialized as a string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(pub u64);

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for FileId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u64>()
            .map(FileId)
            .map_err(|_| anyhow::anyhow!("invalid fileId: '{}'", s))
    }
}

impl Serialize for FileId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for FileId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Ok(FileId(n)),
            Raw::Text(s) => s.parse().map_err(serde::de::Error::custom),
        }
    }
}

/// A user-authored guide, as held in the guide store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Guide {
    pub file_id: FileId,
    pub title: String,
    pub content: String,
    pub content_hash: String,
    pub creator: String,
    pub timestamp: DateTime<Utc>,
}

/// One entry of the persisted guide index file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuideRecord {
    pub file_id: FileId,
    pub creator: String,
    pub timestamp: DateTime<Utc>,
}

impl From<&Guide> for GuideRecord {
    fn from(guide: &Guide) -> Self {
        Self {
            file_id: guide.file_id,
            creator: guide.creator.clone(),
            timestamp: guide.timestamp,
        }
    }
}

/// Body of the guide index file: `{ "guides": [...] }`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GuideIndex {
    #[serde(default)]
    pub guides: Vec<GuideRecord>,
}

/// A titled sub-section of a guide produced by the completion model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    pub title: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translated_content: Option<String>,
    /// Any other keys the model attached, passed through untouched.
    #[serde(flatten, default)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: String,
    pub message: String,
}

impl LogEntry {
    pub fn now(message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            message: message.into(),
        }
    }
}

/// Languages a guide can be narrated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Language {
    #[default]
    English,
    French,
    Spanish,
}

impl Language {
    /// Map a language code to a language. Unknown codes fall back to English.
    pub fn from_code(code: Option<&str>) -> Self {
        match code.map(|c| c.trim().to_ascii_lowercase()).as_deref() {
            Some("fr") => Language::French,
            Some("es") => Language::Spanish,
            _ => Language::English,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Language::English => "en",
            Language::French => "fr",
            Language::Spanish => "es",
        }
    }

    /// Human-readable name used in model prompts.
    pub fn name(self) -> &'static str {
        match self {
            Language::English => "English",
            Language::French => "French",
            Language::Spanish => "Spanish",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_id_accepts_number_and_string() {
        let a: FileId = serde_json::from_str("42").unwrap();
        let b: FileId = serde_json::from_str("\"42\"").unwrap();
        assert_eq!(a, b);
        assert_eq!(serde_json::to_string(&a).unwrap(), "\"42\"");
    }

    #[test]
    fn test_file_id_rejects_garbage() {
        assert!(serde_json::from_str::<FileId>("\"abc\"").is_err());
        assert!(serde_json::from_str::<FileId>("-1").is_err());
    }

    #[test]
    fn test_language_fallback() {
        assert_eq!(Language::from_code(Some("fr")), Language::French);
        assert_eq!(Language::from_code(Some("ES")), Language::Spanish);
        assert_eq!(Language::from_code(Some("de")), Language::English);
        assert_eq!(Language::from_code(None), Language::English);
        assert_eq!(Language::Spanish.name(), "Spanish");
    }

    #[test]
    fn test_guide_serializes_camel_case() {
        let guide = Guide {
            file_id: FileId(7),
            title: "Museum Tour".to_string(),
            content: "Welcome.".to_string(),
            content_hash: "abc".to_string(),
            creator: "0xabc".to_string(),
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&guide).unwrap();
        assert_eq!(json["fileId"], "7");
        assert_eq!(json["contentHash"], "abc");
        assert!(json.get("file_id").is_none());
    }

    #[test]
    fn test_segment_omits_missing_translation() {
        let seg = Segment {
            title: "Hall".to_string(),
            content: "Statues".to_string(),
            translated_content: None,
            extra: serde_json::Map::new(),
        };
        let json = serde_json::to_value(&seg).unwrap();
        assert!(json.get("translatedContent").is_none());
    }
}
