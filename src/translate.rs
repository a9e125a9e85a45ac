//! Guide translation via the completion model.
//!
//! One contract for every caller: the model must reply with
//! `{ "translation": "..." }`; a missing or empty translation is an error.

use anyhow::Result;

use crate::completion::{parse_model_json, ChatRequest, CompletionClient, ModelOutputError};
use crate::models::Language;

/// System prompt for translating into `language`.
pub fn translation_prompt(language: Language) -> String {
    format!(
        r#"You are a professional translator. Your task is to translate text to {}.
You must respond with a JSON object in this exact format:
{{
  "translation": "your translated text here"
}}
Do not include any other text or formatting in your response."#,
        language.name()
    )
}

pub async fn translate(
    client: &dyn CompletionClient,
    content: &str,
    language: Language,
) -> Result<String> {
    tracing::info!(
        language = language.code(),
        chars = content.chars().count(),
        "translating content"
    );

    let request = ChatRequest {
        system: translation_prompt(language),
        user: content.to_string(),
    };

    let reply = client.complete(&request).await?;
    Ok(parse_translation(&reply)?)
}

pub fn parse_translation(reply: &str) -> std::result::Result<String, ModelOutputError> {
    let value = parse_model_json(reply)?;
    value
        .get("translation")
        .and_then(|t| t.as_str())
        .filter(|t| !t.trim().is_empty())
        .map(str::to_string)
        .ok_or_else(|| ModelOutputError("no translation in model reply".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_names_language() {
        assert!(translation_prompt(Language::French).contains("translate text to French."));
        assert!(translation_prompt(Language::Spanish).contains("Spanish"));
        assert!(translation_prompt(Language::from_code(Some("xx"))).contains("English"));
    }

    #[test]
    fn test_parse_translation() {
        assert_eq!(
            parse_translation(r#"{"translation": "Bienvenue."}"#).unwrap(),
            "Bienvenue."
        );
    }

    #[test]
    fn test_missing_or_empty_translation_fails() {
        assert!(parse_translation(r#"{"text": "Bienvenue."}"#).is_err());
        assert!(parse_translation(r#"{"translation": ""}"#).is_err());
        assert!(parse_translation(r#"{"translation": 3}"#).is_err());
    }

    #[test]
    fn test_raw_text_reply_fails() {
        let err = parse_translation("Bienvenue au musée.").unwrap_err();
        assert!(err.0.contains("not valid JSON"));
    }
}
