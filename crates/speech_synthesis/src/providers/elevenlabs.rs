//! ElevenLabs cloud speech provider
//!
//! Synthesizes speech through the ElevenLabs text-to-speech HTTP API. Every
//! call issues exactly one request against the streaming endpoint; the
//! response body is either forwarded chunk by chunk or drained into a single
//! buffer. Non-success responses are surfaced with their status code and are
//! never retried here.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Response};
use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::config::CloudTtsConfig;
use crate::error::SpeechError;
use crate::ports::{AudioStream, SpeechProvider, fuse_on_error};
use crate::types::{AudioData, AudioFormat, ProviderKind};

/// Header carrying the ElevenLabs API key
const API_KEY_HEADER: &str = "xi-api-key";

/// Cloud speech provider backed by ElevenLabs
#[derive(Debug, Clone)]
pub struct CloudSpeechProvider {
    client: Client,
    config: CloudTtsConfig,
}

/// ElevenLabs TTS request body
#[derive(Debug, Serialize)]
struct TtsRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: VoiceSettings,
}

#[derive(Debug, Serialize)]
struct VoiceSettings {
    stability: f32,
    similarity_boost: f32,
}

impl CloudSpeechProvider {
    /// Create a new cloud provider
    ///
    /// The API key is held in memory only and is not checked locally; an
    /// empty key is sent as-is and rejected by the remote service.
    ///
    /// # Errors
    ///
    /// Returns `SpeechError::Configuration` if the configuration is invalid.
    pub fn new(config: CloudTtsConfig) -> Result<Self, SpeechError> {
        config.validate().map_err(SpeechError::Configuration)?;

        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| {
                SpeechError::Configuration(format!("Failed to create HTTP client: {e}"))
            })?;

        Ok(Self { client, config })
    }

    /// Build the streaming synthesis endpoint URL for a voice
    fn tts_url(&self, voice_id: &str) -> String {
        format!(
            "{}/v1/text-to-speech/{}/stream",
            self.config.base_url.trim_end_matches('/'),
            voice_id
        )
    }

    /// Voice used when the request names none
    #[must_use]
    pub fn default_voice(&self) -> &str {
        &self.config.voice_id
    }

    /// Model used when the request names none
    #[must_use]
    pub fn model_name(&self) -> &str {
        &self.config.model_id
    }

    /// Send the synthesis request and reject non-success statuses
    async fn send(
        &self,
        text: &str,
        voice: Option<&str>,
        model: Option<&str>,
    ) -> Result<Response, SpeechError> {
        let voice_id = voice.unwrap_or(&self.config.voice_id);
        let model_id = model.unwrap_or(&self.config.model_id);

        let request = TtsRequest {
            text,
            model_id,
            voice_settings: VoiceSettings {
                stability: self.config.stability,
                similarity_boost: self.config.similarity_boost,
            },
        };

        debug!(voice_id, model_id, "Requesting ElevenLabs synthesis");

        let response = self
            .client
            .post(self.tts_url(voice_id))
            .header(API_KEY_HEADER, self.config.api_key())
            .header(ACCEPT, AudioFormat::Mp3.mime_type())
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let reason = status.canonical_reason().unwrap_or("Unknown status");
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "ElevenLabs request failed");

            let message = if body.trim().is_empty() {
                format!("ElevenLabs API error: {reason}")
            } else {
                format!("ElevenLabs API error: {reason}: {}", body.trim())
            };
            return Err(SpeechError::cloud_status(status.as_u16(), message));
        }

        Ok(response)
    }

    /// Audio format announced by the response, defaulting to MP3
    fn response_format(response: &Response) -> AudioFormat {
        response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .and_then(AudioFormat::from_mime_type)
            .unwrap_or(AudioFormat::Mp3)
    }
}

#[async_trait]
impl SpeechProvider for CloudSpeechProvider {
    #[instrument(skip(self, text), fields(text_len = text.len()))]
    async fn generate(
        &self,
        text: &str,
        voice: Option<&str>,
        model: Option<&str>,
    ) -> Result<AudioData, SpeechError> {
        let response = self.send(text, voice, model).await?;
        let format = Self::response_format(&response);

        let audio_bytes = response
            .bytes()
            .await
            .map_err(|e| SpeechError::cloud(format!("Failed to read audio: {e}")))?;

        debug!(audio_size = audio_bytes.len(), "Cloud speech synthesis complete");
        Ok(AudioData::new(audio_bytes.to_vec(), format))
    }

    #[instrument(skip(self, text), fields(text_len = text.len()))]
    async fn generate_stream(
        &self,
        text: &str,
        voice: Option<&str>,
        model: Option<&str>,
    ) -> Result<AudioStream, SpeechError> {
        let response = self.send(text, voice, model).await?;

        let chunks = response.bytes_stream().map(|result| {
            result.map_err(|e| SpeechError::cloud(format!("Audio stream interrupted: {e}")))
        });

        Ok(fuse_on_error(chunks))
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Cloud
    }

    async fn is_available(&self) -> bool {
        // Stateless: reachability is only known per request
        true
    }
}
