//! Guide segmentation via the completion model.
//!
//! The model is asked for `{ "segments": [{ "title", "content" }] }`. The
//! reply is validated strictly: a missing array or any element without a
//! non-empty `title` and `content` fails the whole request. Any other keys
//! on an element are kept on the segment and echoed back to the client.

use anyhow::Result;

use crate::completion::{parse_model_json, ChatRequest, CompletionClient, ModelOutputError};
use crate::models::{Language, Segment};
use crate::translate::translate;

pub const SEGMENT_PROMPT: &str = r#"You are a museum guide content organizer. Your task is to break down museum content into segments.
You must respond with a JSON object in this exact format:
{
  "segments": [
    {
      "title": "Section Title",
      "content": "Section Content"
    }
  ]
}
Do not include any other text or formatting in your response."#;

/// Split guide content into titled segments.
pub async fn segment_content(client: &dyn CompletionClient, content: &str) -> Result<Vec<Segment>> {
    let request = ChatRequest {
        system: SEGMENT_PROMPT.to_string(),
        user: content.to_string(),
    };

    let reply = client.complete(&request).await?;
    let segments = parse_segments(&reply)?;
    tracing::info!(count = segments.len(), "segmented content");
    Ok(segments)
}

/// Fill `translated_content` for every segment, one request at a time.
pub async fn translate_segments(
    client: &dyn CompletionClient,
    segments: &mut [Segment],
    language: Language,
) -> Result<()> {
    for segment in segments.iter_mut() {
        let translated = translate(client, &segment.content, language).await?;
        segment.translated_content = Some(translated);
    }
    Ok(())
}

/// Validate a segmentation reply and return its segments in order.
pub fn parse_segments(reply: &str) -> std::result::Result<Vec<Segment>, ModelOutputError> {
    let value = parse_model_json(reply)?;

    let items = value
        .get("segments")
        .and_then(|s| s.as_array())
        .ok_or_else(|| {
            ModelOutputError("invalid response format: segments is not an array".to_string())
        })?;

    items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            let invalid =
                || ModelOutputError(format!("invalid segment format at index {}", index));
            let mut object = item.as_object().cloned().ok_or_else(invalid)?;
            let mut field = |name: &str| {
                object
                    .remove(name)
                    .and_then(|v| v.as_str().map(str::to_string))
                    .filter(|s| !s.trim().is_empty())
            };
            let (title, content) = match (field("title"), field("content")) {
                (Some(title), Some(content)) => (title, content),
                _ => return Err(invalid()),
            };
            let translated_content = field("translatedContent");
            Ok(Segment {
                title,
                content,
                translated_content,
                extra: object,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_well_formed_reply_returned_unmodified() {
        let reply = r#"{"segments": [
            {"title": "Entrance", "content": "Welcome to the hall."},
            {"title": "Gallery", "content": "Paintings from 1500."}
        ]}"#;
        let segments = parse_segments(reply).unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].title, "Entrance");
        assert_eq!(segments[0].content, "Welcome to the hall.");
        assert_eq!(segments[1].title, "Gallery");
        assert!(segments.iter().all(|s| s.translated_content.is_none()));
    }

    #[test]
    fn test_extra_keys_pass_through() {
        let element = serde_json::json!({
            "title": "Entrance",
            "content": "Welcome to the hall.",
            "duration": 30,
            "tags": ["intro"]
        });
        let reply = serde_json::json!({ "segments": [element.clone()] }).to_string();
        let segments = parse_segments(&reply).unwrap();
        assert_eq!(segments[0].extra.get("duration"), Some(&serde_json::json!(30)));
        assert_eq!(serde_json::to_value(&segments[0]).unwrap(), element);
    }

    #[test]
    fn test_non_object_element_fails() {
        let err = parse_segments(r#"{"segments": ["just text"]}"#).unwrap_err();
        assert_eq!(err.0, "invalid segment format at index 0");
    }

    #[test]
    fn test_missing_title_fails_whole_reply() {
        let reply = r#"{"segments": [
            {"title": "Entrance", "content": "ok"},
            {"content": "no title"}
        ]}"#;
        let err = parse_segments(reply).unwrap_err();
        assert_eq!(err.0, "invalid segment format at index 1");
    }

    #[test]
    fn test_empty_content_fails() {
        let reply = r#"{"segments": [{"title": "A", "content": ""}]}"#;
        let err = parse_segments(reply).unwrap_err();
        assert!(err.0.contains("index 0"));
    }

    #[test]
    fn test_non_string_title_fails() {
        let reply = r#"{"segments": [{"title": 5, "content": "x"}]}"#;
        assert!(parse_segments(reply).is_err());
    }

    #[test]
    fn test_segments_not_array() {
        let err = parse_segments(r#"{"segments": "nope"}"#).unwrap_err();
        assert!(err.0.contains("not an array"));
        assert!(parse_segments(r#"{"sections": []}"#).is_err());
    }

    #[test]
    fn test_empty_array_is_valid() {
        assert!(parse_segments(r#"{"segments": []}"#).unwrap().is_empty());
    }

    #[test]
    fn test_not_json() {
        assert!(parse_segments("Here are your segments: ...").is_err());
    }
}
