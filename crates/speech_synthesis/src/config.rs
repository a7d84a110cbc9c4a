//! Configuration for speech synthesis
//!
//! Values are layered from built-in defaults, an optional TOML file and
//! `SPEECH_`-prefixed environment variables (nested keys use `__`, e.g.
//! `SPEECH_CLOUD__API_KEY`).

use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::error::SpeechError;
use crate::types::AudioFormat;

/// Top-level speech synthesis configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpeechConfig {
    /// Remote synthesis API settings
    #[serde(default)]
    pub cloud: CloudTtsConfig,

    /// On-device model settings
    #[serde(default)]
    pub local: LocalModelConfig,
}

impl SpeechConfig {
    /// Load configuration from an optional file and the environment
    ///
    /// Without an explicit path, `speech.toml` in the working directory is
    /// used when present.
    pub fn load(path: Option<&Path>) -> Result<Self, SpeechError> {
        let file = path.map_or_else(
            || config::File::with_name("speech").required(false),
            |p| config::File::from(p).required(true),
        );

        let config = config::Config::builder()
            .add_source(file)
            .add_source(
                config::Environment::with_prefix("SPEECH")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .map_err(|e| SpeechError::Configuration(e.to_string()))?;

        config
            .try_deserialize()
            .map_err(|e| SpeechError::Configuration(e.to_string()))
    }

    /// Create a minimal config for testing
    #[cfg(test)]
    pub fn test() -> Self {
        Self {
            cloud: CloudTtsConfig {
                api_key: Some(SecretString::from("test-key".to_string())),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid setting.
    pub fn validate(&self) -> Result<(), String> {
        self.cloud.validate()?;
        self.local.validate()
    }
}

/// ElevenLabs-compatible cloud synthesis configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct CloudTtsConfig {
    /// API key sent as `xi-api-key` (an empty key is passed through unchanged)
    #[serde(default, skip_serializing)]
    pub api_key: Option<SecretString>,

    /// API base URL (for custom endpoints and tests)
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Voice used when a request does not name one
    #[serde(default = "default_voice_id")]
    pub voice_id: String,

    /// Model used when a request does not name one
    #[serde(default = "default_model_id")]
    pub model_id: String,

    /// Voice stability (0.0 to 1.0)
    #[serde(default = "default_stability")]
    pub stability: f32,

    /// Similarity boost (0.0 to 1.0)
    #[serde(default = "default_similarity_boost")]
    pub similarity_boost: f32,

    /// HTTP client timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl std::fmt::Debug for CloudTtsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudTtsConfig")
            .field(
                "api_key",
                &if self.api_key.is_some() {
                    Some("[REDACTED]")
                } else {
                    None
                },
            )
            .field("base_url", &self.base_url)
            .field("voice_id", &self.voice_id)
            .field("model_id", &self.model_id)
            .field("stability", &self.stability)
            .field("similarity_boost", &self.similarity_boost)
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

fn default_base_url() -> String {
    "https://api.elevenlabs.io".to_string()
}

fn default_voice_id() -> String {
    "21m00Tcm4TlvDq8ikWAM".to_string()
}

fn default_model_id() -> String {
    "eleven_monolingual_v1".to_string()
}

const fn default_stability() -> f32 {
    0.5
}

const fn default_similarity_boost() -> f32 {
    0.75
}

const fn default_timeout_ms() -> u64 {
    30000 // 30 seconds
}

impl Default for CloudTtsConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            voice_id: default_voice_id(),
            model_id: default_model_id(),
            stability: default_stability(),
            similarity_boost: default_similarity_boost(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl CloudTtsConfig {
    /// Configuration with the given API key and defaults elsewhere
    #[must_use]
    pub fn with_api_key(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(SecretString::from(api_key.into())),
            ..Default::default()
        }
    }

    /// The API key, or an empty string when none is configured
    #[must_use]
    pub fn api_key(&self) -> &str {
        self.api_key
            .as_ref()
            .map_or("", ExposeSecret::expose_secret)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.base_url.trim().is_empty() {
            return Err("Cloud base URL must not be empty".to_string());
        }

        if self.timeout_ms == 0 {
            return Err("Timeout must be greater than 0".to_string());
        }

        if !(0.0..=1.0).contains(&self.stability) {
            return Err(format!(
                "Stability must be between 0.0 and 1.0, got {}",
                self.stability
            ));
        }

        if !(0.0..=1.0).contains(&self.similarity_boost) {
            return Err(format!(
                "Similarity boost must be between 0.0 and 1.0, got {}",
                self.similarity_boost
            ));
        }

        Ok(())
    }
}

/// On-device synthesis model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalModelConfig {
    /// Model runner executable (resolved through PATH when relative)
    #[serde(default = "default_executable_path")]
    pub executable_path: PathBuf,

    /// Model weights loaded once at initialization
    #[serde(default = "default_weights_path")]
    pub weights_path: PathBuf,

    /// Speaker index passed to the model
    #[serde(default)]
    pub speaker: u32,

    /// Ceiling on generated audio length in milliseconds
    #[serde(default = "default_max_audio_length_ms")]
    pub max_audio_length_ms: u64,

    /// Sampling configuration
    #[serde(default)]
    pub sampler: SamplerConfig,

    /// Format of the audio the runner writes
    #[serde(default = "default_local_output_format")]
    pub output_format: AudioFormat,
}

/// Token sampling parameters for the local model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplerConfig {
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_k")]
    pub top_k: u32,
}

fn default_executable_path() -> PathBuf {
    PathBuf::from("csm-mlx")
}

fn default_weights_path() -> PathBuf {
    PathBuf::from("ckpt.safetensors")
}

const fn default_max_audio_length_ms() -> u64 {
    5000
}

const fn default_local_output_format() -> AudioFormat {
    AudioFormat::Wav
}

const fn default_temperature() -> f32 {
    0.8
}

const fn default_top_k() -> u32 {
    50
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            top_k: default_top_k(),
        }
    }
}

impl Default for LocalModelConfig {
    fn default() -> Self {
        Self {
            executable_path: default_executable_path(),
            weights_path: default_weights_path(),
            speaker: 0,
            max_audio_length_ms: default_max_audio_length_ms(),
            sampler: SamplerConfig::default(),
            output_format: default_local_output_format(),
        }
    }
}

impl LocalModelConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.executable_path.as_os_str().is_empty() {
            return Err("Local model executable path must not be empty".to_string());
        }

        if self.weights_path.as_os_str().is_empty() {
            return Err("Local model weights path must not be empty".to_string());
        }

        if self.max_audio_length_ms == 0 {
            return Err("Max audio length must be greater than 0".to_string());
        }

        if !self.sampler.temperature.is_finite() || self.sampler.temperature <= 0.0 {
            return Err(format!(
                "Sampler temperature must be a positive number, got {}",
                self.sampler.temperature
            ));
        }

        if self.sampler.top_k == 0 {
            return Err("Sampler top_k must be greater than 0".to_string());
        }

        Ok(())
    }
}
