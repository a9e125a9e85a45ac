//! Guide illustration generation.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{env_secret, ImageConfig};

const PROMPT_SUFFIX: &str = "Professional, artistic, vibrant colors, 4k, highly detailed";
const NEGATIVE_PROMPT: &str = "blurry, low quality, distorted, ugly, bad anatomy";

/// Vendor reply passed through to the client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeneratedImages {
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub request: serde_json::Value,
    #[serde(default)]
    pub timing: serde_json::Value,
}

#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<GeneratedImages>;
}

pub fn enhance_prompt(prompt: &str) -> String {
    format!(
        "High quality, detailed illustration of: {}. {}",
        prompt.trim(),
        PROMPT_SUFFIX
    )
}

pub struct DisabledImageGenerator;

#[async_trait]
impl ImageGenerator for DisabledImageGenerator {
    async fn generate(&self, _prompt: &str) -> Result<GeneratedImages> {
        bail!("Image provider is disabled (set VENICE_API_KEY)")
    }
}

pub struct VeniceImageClient {
    client: reqwest::Client,
    api_key: String,
    config: ImageConfig,
}

impl VeniceImageClient {
    pub fn new(config: &ImageConfig, api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            api_key,
            config: config.clone(),
        })
    }

    fn body(&self, prompt: &str) -> serde_json::Value {
        serde_json::json!({
            "model": self.config.model,
            "prompt": enhance_prompt(prompt),
            "width": self.config.width,
            "height": self.config.height,
            "steps": self.config.steps,
            "hide_watermark": false,
            "return_binary": false,
            "style_preset": self.config.style_preset,
            "negative_prompt": NEGATIVE_PROMPT,
        })
    }
}

#[async_trait]
impl ImageGenerator for VeniceImageClient {
    async fn generate(&self, prompt: &str) -> Result<GeneratedImages> {
        let url = format!(
            "{}/image/generate",
            self.config.base_url.trim_end_matches('/')
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&self.body(prompt))
            .send()
            .await
            .context("image API unreachable")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Image API error {}: {}", status, body);
        }

        let generated: GeneratedImages = response
            .json()
            .await
            .context("Invalid image API response")?;
        if generated.images.is_empty() {
            bail!("No image generated");
        }
        tracing::info!(count = generated.images.len(), "generated images");
        Ok(generated)
    }
}

/// Build the image generator selected by configuration.
///
/// `"venice"` requires `VENICE_API_KEY` in the environment.
pub fn create_image_client(config: &ImageConfig) -> Result<Box<dyn ImageGenerator>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledImageGenerator)),
        "venice" => {
            let api_key = env_secret("VENICE_API_KEY")
                .ok_or_else(|| anyhow::anyhow!("VENICE_API_KEY environment variable not set"))?;
            Ok(Box::new(VeniceImageClient::new(config, api_key)?))
        }
        other => bail!("Unknown image provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_enhanced() {
        assert_eq!(
            enhance_prompt(" The British Museum "),
            "High quality, detailed illustration of: The British Museum. \
             Professional, artistic, vibrant colors, 4k, highly detailed"
        );
    }

    #[test]
    fn test_request_body_shape() {
        let client = VeniceImageClient::new(&ImageConfig::default(), "key".to_string()).unwrap();
        let body = client.body("a statue");
        assert_eq!(body["model"], "sdxl-1.0");
        assert_eq!(body["width"], 1024);
        assert_eq!(body["steps"], 30);
        assert_eq!(body["style_preset"], "digital-art");
        assert_eq!(body["negative_prompt"], NEGATIVE_PROMPT);
    }

    #[test]
    fn test_reply_parses_with_missing_fields() {
        let reply: GeneratedImages = serde_json::from_str(r#"{"images": ["b64data"]}"#).unwrap();
        assert_eq!(reply.images.len(), 1);
        assert!(reply.timing.is_null());
    }
}
