//! Text-to-speech.
//!
//! [`voice_for`] picks a voice from the fixed language table unless the
//! caller names one explicitly; a [`SpeechSynthesizer`] turns text into
//! MPEG audio bytes.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;

use crate::config::{env_secret, SpeechConfig};
use crate::models::Language;

pub const AUDIO_MPEG: &str = "audio/mpeg";

/// Default voice per narration language.
pub fn language_voice(language: Language) -> &'static str {
    match language {
        Language::English => "21m00Tcm4TlvDq8ikWAM",
        Language::Spanish => "ErXwobaYiN019PkySvjV",
        Language::French => "MF3mGyEYCl7XYWbV9V6O",
    }
}

/// Resolve the voice for a request. An explicit, non-blank `voice_id` wins.
pub fn voice_for(language: Language, voice_id: Option<&str>) -> String {
    voice_id
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| language_voice(language))
        .to_string()
}

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Returns `audio/mpeg` bytes.
    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<Vec<u8>>;
}

pub struct DisabledSynthesizer;

#[async_trait]
impl SpeechSynthesizer for DisabledSynthesizer {
    async fn synthesize(&self, _text: &str, _voice_id: &str) -> Result<Vec<u8>> {
        bail!("Speech provider is disabled (set ELEVENLABS_API_KEY)")
    }
}

pub struct ElevenLabsClient {
    client: reqwest::Client,
    api_key: String,
    config: SpeechConfig,
}

impl ElevenLabsClient {
    pub fn new(config: &SpeechConfig, api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            api_key,
            config: config.clone(),
        })
    }

    fn body(&self, text: &str) -> serde_json::Value {
        serde_json::json!({
            "text": text,
            "model_id": self.config.model_id,
            "voice_settings": {
                "stability": self.config.stability,
                "similarity_boost": self.config.similarity_boost,
            },
        })
    }
}

#[async_trait]
impl SpeechSynthesizer for ElevenLabsClient {
    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<Vec<u8>> {
        let url = format!(
            "{}/text-to-speech/{}",
            self.config.base_url.trim_end_matches('/'),
            voice_id
        );

        let response = self
            .client
            .post(&url)
            .header("xi-api-key", &self.api_key)
            .header("Accept", AUDIO_MPEG)
            .json(&self.body(text))
            .send()
            .await
            .context("speech API unreachable")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Speech API error {}: {}", status, body);
        }

        let audio = response.bytes().await?;
        if audio.is_empty() {
            bail!("Speech API returned no audio");
        }
        Ok(audio.to_vec())
    }
}

/// Build the synthesizer selected by configuration.
///
/// `"elevenlabs"` requires `ELEVENLABS_API_KEY` in the environment.
pub fn create_speech_client(config: &SpeechConfig) -> Result<Box<dyn SpeechSynthesizer>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledSynthesizer)),
        "elevenlabs" => {
            let api_key = env_secret("ELEVENLABS_API_KEY").ok_or_else(|| {
                anyhow::anyhow!("ELEVENLABS_API_KEY environment variable not set")
            })?;
            Ok(Box::new(ElevenLabsClient::new(config, api_key)?))
        }
        other => bail!("Unknown speech provider: {}", other),
    }
}
