//! UI-agnostic chat data types
//!
//! Sessions and messages as the chat service sends them over the wire, plus
//! the small presentation helpers shared by the TUI and the one-shot CLI.

use base64::Engine;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Maximum number of characters kept when a title is derived from a message
pub const TITLE_MAX_CHARS: usize = 50;

const PNG_DATA_URL_PREFIX: &str = "data:image/png;base64,";

/// A named conversation thread
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub title: String,
    #[serde(deserialize_with = "timestamp::deserialize")]
    pub created_at: DateTime<Utc>,
    #[serde(default, deserialize_with = "timestamp::deserialize_opt")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// One turn in a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub session_id: String,
    #[serde(rename = "type")]
    pub role: Role,
    pub content: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub content_type: ContentType,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(deserialize_with = "timestamp::deserialize")]
    pub timestamp: DateTime<Utc>,
}

/// The author of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// What a message carries, and what kind of reply a send asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    #[default]
    Text,
    Image,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Text => "text",
            ContentType::Image => "image",
        }
    }
}

impl Message {
    pub fn is_image(&self) -> bool {
        self.content_type == ContentType::Image
    }

    /// File name offered when the message is saved to disk
    pub fn download_filename(&self) -> String {
        match self.content_type {
            ContentType::Image => format!("image-{}.png", self.id),
            ContentType::Text => format!("message-{}.txt", self.id),
        }
    }

    /// Short description of an image reference, for surfaces that cannot draw pixels
    pub fn image_summary(&self) -> String {
        if let Some(bytes) = decode_png_data_url(&self.content) {
            format!("PNG image, {}", format_size(bytes.len()))
        } else if self.content.starts_with("data:") {
            "inline image".to_string()
        } else {
            self.content.clone()
        }
    }
}

/// Title the service gives a fresh session after its first message
pub fn derive_title(content: &str) -> String {
    let mut title: String = content.chars().take(TITLE_MAX_CHARS).collect();
    if content.chars().count() > TITLE_MAX_CHARS {
        title.push_str("...");
    }
    title
}

/// Decode a `data:image/png;base64,...` URL into raw bytes
pub fn decode_png_data_url(content: &str) -> Option<Vec<u8>> {
    let payload = content.strip_prefix(PNG_DATA_URL_PREFIX)?;
    base64::engine::general_purpose::STANDARD.decode(payload).ok()
}

fn format_size(len: usize) -> String {
    if len < 1024 {
        format!("{} B", len)
    } else {
        format!("{:.1} KB", len as f64 / 1024.0)
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// The service emits naive UTC timestamps; accept those as well as RFC 3339.
mod timestamp {
    use super::*;
    use serde::de::Error;

    fn parse(raw: &str) -> Option<DateTime<Utc>> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|naive| naive.and_utc())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| D::Error::custom(format!("invalid timestamp: {}", raw)))
    }

    pub fn deserialize_opt<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<String>::deserialize(deserializer)? {
            Some(raw) => parse(&raw)
                .map(Some)
                .ok_or_else(|| D::Error::custom(format!("invalid timestamp: {}", raw))),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_message_from_service_json() {
        let json = r#"{
            "id": "m1",
            "session_id": "s1",
            "type": "assistant",
            "content": "hello",
            "content_type": null,
            "prompt": null,
            "timestamp": "2025-01-20T10:00:30.123456"
        }"#;
        let msg: Message = serde_json::from_str(json).unwrap();
        assert_eq!(msg.role, Role::Assistant);
        assert_eq!(msg.content_type, ContentType::Text);
        assert_eq!(msg.prompt, None);
        assert_eq!(msg.timestamp.second(), 30);
    }

    #[test]
    fn test_message_missing_content_type_is_text() {
        let json = r#"{"id":"m1","session_id":"s1","type":"user","content":"hi","timestamp":"2025-01-20T10:00:00Z"}"#;
        let msg: Message = serde_json::from_str(json).unwrap();
        assert_eq!(msg.content_type, ContentType::Text);
        assert_eq!(msg.role, Role::User);
    }

    #[test]
    fn test_session_without_updated_at() {
        let json = r#"{"id":"s1","title":"Chat","created_at":"2025-01-20T10:00:00"}"#;
        let session: Session = serde_json::from_str(json).unwrap();
        assert_eq!(session.updated_at, None);
        assert_eq!(session.created_at.hour(), 10);
    }

    #[test]
    fn test_bad_timestamp_is_rejected() {
        let json = r#"{"id":"s1","title":"Chat","created_at":"yesterday"}"#;
        assert!(serde_json::from_str::<Session>(json).is_err());
    }

    #[test]
    fn test_download_filename_by_content_type() {
        let json = r#"{"id":"abc","session_id":"s1","type":"assistant","content":"x","content_type":"image","timestamp":"2025-01-20T10:00:00Z"}"#;
        let mut msg: Message = serde_json::from_str(json).unwrap();
        assert_eq!(msg.download_filename(), "image-abc.png");
        msg.content_type = ContentType::Text;
        assert_eq!(msg.download_filename(), "message-abc.txt");
    }

    #[test]
    fn test_derive_title_truncates_on_chars() {
        assert_eq!(derive_title("short"), "short");
        let long = "é".repeat(60);
        let title = derive_title(&long);
        assert_eq!(title.chars().count(), TITLE_MAX_CHARS + 3);
        assert!(title.ends_with("..."));
    }

    #[test]
    fn test_decode_png_data_url() {
        assert_eq!(decode_png_data_url("data:image/png;base64,aGVsbG8="), Some(b"hello".to_vec()));
        assert_eq!(decode_png_data_url("https://example.com/a.png"), None);
        assert_eq!(decode_png_data_url("data:image/png;base64,!!!"), None);
    }
}
