use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub library: LibraryConfig,
    #[serde(default)]
    pub completion: CompletionConfig,
    #[serde(default)]
    pub speech: SpeechConfig,
    #[serde(default)]
    pub image: ImageConfig,
    #[serde(default)]
    pub logs: LogsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_storage_provider")]
    pub provider: String,
    /// Base URL of the storage-agent gateway (`provider = "http"`).
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// IPFS gateway host, e.g. `example.mypinata.cloud`.
    #[serde(default)]
    pub ipfs_gateway: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            provider: default_storage_provider(),
            url: None,
            namespace: default_namespace(),
            ipfs_gateway: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_storage_provider() -> String {
    "memory".to_string()
}
fn default_namespace() -> String {
    "audio-guides".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LibraryConfig {
    /// File holding the persisted guide index. Recovery probes a fixed
    /// id range when unset.
    #[serde(default)]
    pub index_file_id: Option<u64>,
    #[serde(default = "default_probe_start")]
    pub probe_start: u64,
    #[serde(default = "default_probe_end")]
    pub probe_end: u64,
    /// Rebuild the guide store from the storage agent on startup.
    #[serde(default = "default_true")]
    pub recover: bool,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            index_file_id: None,
            probe_start: default_probe_start(),
            probe_end: default_probe_end(),
            recover: true,
        }
    }
}

fn default_probe_start() -> u64 {
    1
}
fn default_probe_end() -> u64 {
    21
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct CompletionConfig {
    #[serde(default = "default_completion_provider")]
    pub provider: String,
    #[serde(default = "default_venice_url")]
    pub base_url: String,
    #[serde(default = "default_chat_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            provider: default_completion_provider(),
            base_url: default_venice_url(),
            model: default_chat_model(),
            temperature: default_temperature(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_completion_provider() -> String {
    "venice".to_string()
}
fn default_venice_url() -> String {
    "https://api.venice.ai/api/v1".to_string()
}
fn default_chat_model() -> String {
    "dolphin-2.9.2-qwen2-72b".to_string()
}
fn default_temperature() -> f64 {
    0.3
}
fn default_max_retries() -> u32 {
    2
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct SpeechConfig {
    #[serde(default = "default_speech_provider")]
    pub provider: String,
    #[serde(default = "default_elevenlabs_url")]
    pub base_url: String,
    #[serde(default = "default_speech_model")]
    pub model_id: String,
    #[serde(default = "default_stability")]
    pub stability: f64,
    #[serde(default = "default_similarity_boost")]
    pub similarity_boost: f64,
    #[serde(default = "default_max_chunk_chars")]
    pub max_chunk_chars: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            provider: default_speech_provider(),
            base_url: default_elevenlabs_url(),
            model_id: default_speech_model(),
            stability: default_stability(),
            similarity_boost: default_similarity_boost(),
            max_chunk_chars: default_max_chunk_chars(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_speech_provider() -> String {
    "elevenlabs".to_string()
}
fn default_elevenlabs_url() -> String {
    "https://api.elevenlabs.io/v1".to_string()
}
fn default_speech_model() -> String {
    "eleven_multilingual_v2".to_string()
}
fn default_stability() -> f64 {
    0.5
}
fn default_similarity_boost() -> f64 {
    0.5
}
fn default_max_chunk_chars() -> usize {
    2500
}

#[derive(Debug, Deserialize, Clone)]
pub struct ImageConfig {
    #[serde(default = "default_image_provider")]
    pub provider: String,
    #[serde(default = "default_venice_url")]
    pub base_url: String,
    #[serde(default = "default_image_model")]
    pub model: String,
    #[serde(default = "default_image_size")]
    pub width: u32,
    #[serde(default = "default_image_size")]
    pub height: u32,
    #[serde(default = "default_image_steps")]
    pub steps: u32,
    #[serde(default = "default_style_preset")]
    pub style_preset: String,
    #[serde(default = "default_image_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            provider: default_image_provider(),
            base_url: default_venice_url(),
            model: default_image_model(),
            width: default_image_size(),
            height: default_image_size(),
            steps: default_image_steps(),
            style_preset: default_style_preset(),
            timeout_secs: default_image_timeout_secs(),
        }
    }
}

fn default_image_provider() -> String {
    "venice".to_string()
}
fn default_image_model() -> String {
    "sdxl-1.0".to_string()
}
fn default_image_size() -> u32 {
    1024
}
fn default_image_steps() -> u32 {
    30
}
fn default_style_preset() -> String {
    "digital-art".to_string()
}
fn default_image_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogsConfig {
    #[serde(default = "default_log_capacity")]
    pub capacity: usize,
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self {
            capacity: default_log_capacity(),
        }
    }
}

fn default_log_capacity() -> usize {
    100
}

impl Config {
    /// All-default configuration bound to localhost.
    pub fn minimal() -> Self {
        Self {
            server: ServerConfig {
                bind: "127.0.0.1:3000".to_string(),
            },
            storage: StorageConfig::default(),
            library: LibraryConfig::default(),
            completion: CompletionConfig::default(),
            speech: SpeechConfig::default(),
            image: ImageConfig::default(),
            logs: LogsConfig::default(),
        }
    }
}

/// Read a secret from the environment, treating blank values as unset.
pub fn env_secret(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if config.server.bind.trim().is_empty() {
        anyhow::bail!("server.bind must not be empty");
    }

    match config.storage.provider.as_str() {
        "memory" => {}
        "http" => {
            if config.storage.url.is_none() {
                anyhow::bail!("storage.url must be specified when provider is 'http'");
            }
        }
        other => anyhow::bail!(
            "Unknown storage provider: '{}'. Must be memory or http.",
            other
        ),
    }

    if config.library.probe_start >= config.library.probe_end {
        anyhow::bail!("library.probe_start must be < library.probe_end");
    }

    match config.completion.provider.as_str() {
        "disabled" | "venice" => {}
        other => anyhow::bail!(
            "Unknown completion provider: '{}'. Must be disabled or venice.",
            other
        ),
    }

    match config.speech.provider.as_str() {
        "disabled" | "elevenlabs" => {}
        other => anyhow::bail!(
            "Unknown speech provider: '{}'. Must be disabled or elevenlabs.",
            other
        ),
    }

    match config.image.provider.as_str() {
        "disabled" | "venice" => {}
        other => anyhow::bail!(
            "Unknown image provider: '{}'. Must be disabled or venice.",
            other
        ),
    }

    if config.speech.max_chunk_chars == 0 {
        anyhow::bail!("speech.max_chunk_chars must be > 0");
    }

    if config.logs.capacity == 0 {
        anyhow::bail!("logs.capacity must be > 0");
    }

    for (name, secs) in [
        ("storage", config.storage.timeout_secs),
        ("completion", config.completion.timeout_secs),
        ("speech", config.speech.timeout_secs),
        ("image", config.image.timeout_secs),
    ] {
        if secs == 0 {
            anyhow::bail!("{}.timeout_secs must be > 0", name);
        }
    }

    Ok(())
}
