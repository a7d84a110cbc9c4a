//! Speech orchestrator
//!
//! Single entry point that hides provider selection from callers. Owns at
//! most one local provider and exactly one cloud provider, picks one per
//! request and falls back from local to cloud on buffered failures.
//!
//! # Selection policy (first match wins)
//!
//! 1. no local provider        → cloud
//! 2. `force_cloud`            → cloud
//! 3. `prefer_local`           → local
//! 4. `quality == high`        → cloud
//! 5. otherwise                → local
//!
//! # Flow
//!
//! ```text
//! text + options
//!     │ validate (non-blank)
//!     ▼
//! ┌──────────────────────────────┐
//! │     SpeechOrchestrator       │
//! │                              │
//! │  ┌─────────┐   ┌──────────┐  │
//! │  │ Local   │──▶│ Cloud    │  │
//! │  │(policy) │   │(fallback)│  │
//! │  └─────────┘   └──────────┘  │
//! └──────────────────────────────┘
//!     │
//!     ▼
//! AudioData / AudioStream
//! ```
//!
//! Streaming never falls back; a failed stream is reported as-is.

use tracing::{debug, info, instrument, warn};

use crate::config::SpeechConfig;
use crate::error::SpeechError;
use crate::ports::{AudioStream, SpeechProvider};
use crate::providers::elevenlabs::CloudSpeechProvider;
use crate::providers::local::LocalSpeechProvider;
use crate::types::{AudioData, ProviderKind, Quality, SynthesisOptions, SynthesisRequest};

/// Provider-selecting front door for speech synthesis
pub struct SpeechOrchestrator<L = LocalSpeechProvider, C = CloudSpeechProvider> {
    local: Option<L>,
    cloud: C,
}

impl<L, C> std::fmt::Debug for SpeechOrchestrator<L, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeechOrchestrator")
            .field("local", &self.local.is_some())
            .field("cloud", &true)
            .finish()
    }
}

impl SpeechOrchestrator {
    /// Build the orchestrator from configuration
    ///
    /// `local_capable` is the host capability verdict (see
    /// [`host_supports_local_model`](crate::platform::host_supports_local_model)).
    /// When true, the local provider is constructed eagerly and its model
    /// load starts in the background; the cloud provider is always built.
    ///
    /// # Errors
    ///
    /// Returns `SpeechError::Configuration` if either provider rejects its
    /// configuration.
    pub fn new(config: SpeechConfig, local_capable: bool) -> Result<Self, SpeechError> {
        let local = if local_capable {
            Some(LocalSpeechProvider::new(config.local)?)
        } else {
            None
        };

        let cloud = CloudSpeechProvider::new(config.cloud)?;

        info!(
            "Speech orchestrator initialized: local={}, cloud=true",
            local.is_some()
        );

        Ok(Self { local, cloud })
    }
}

impl<L: SpeechProvider, C: SpeechProvider> SpeechOrchestrator<L, C> {
    /// Assemble an orchestrator from already constructed providers
    pub fn from_providers(local: Option<L>, cloud: C) -> Self {
        Self { local, cloud }
    }

    #[must_use]
    pub const fn has_local_provider(&self) -> bool {
        self.local.is_some()
    }

    #[must_use]
    pub const fn local_provider(&self) -> Option<&L> {
        self.local.as_ref()
    }

    #[must_use]
    pub const fn cloud_provider(&self) -> &C {
        &self.cloud
    }

    /// Decide whether a request with `options` should try the local provider
    #[must_use]
    pub fn should_use_local(&self, options: &SynthesisOptions) -> bool {
        if self.local.is_none() {
            return false;
        }
        if options.force_cloud {
            return false;
        }
        if options.prefer_local {
            return true;
        }
        if options.quality == Some(Quality::High) {
            return false;
        }
        true
    }

    fn validate(text: &str) -> Result<(), SpeechError> {
        if text.trim().is_empty() {
            return Err(SpeechError::Validation(
                "Text must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Pick the provider for a request
    fn select(&self, options: &SynthesisOptions) -> (ProviderKind, &dyn SpeechProvider) {
        if let Some(local) = self.local.as_ref().filter(|_| self.should_use_local(options)) {
            return (ProviderKind::Local, local as &dyn SpeechProvider);
        }
        (ProviderKind::Cloud, &self.cloud as &dyn SpeechProvider)
    }

    /// Synthesize `text` into one complete buffer
    ///
    /// A local failure is logged and retried once on the cloud provider;
    /// only the cloud outcome reaches the caller.
    ///
    /// # Errors
    ///
    /// Returns `SpeechError::Validation` for blank text (before any provider
    /// is touched) or the cloud provider's `SpeechError::Provider`.
    #[instrument(skip(self, text, options), fields(text_len = text.len()))]
    pub async fn generate_speech(
        &self,
        text: &str,
        options: &SynthesisOptions,
    ) -> Result<AudioData, SpeechError> {
        Self::validate(text)?;

        let voice = options.voice.as_deref();
        let model = options.model.as_deref();

        let (kind, provider) = self.select(options);
        debug!(provider = %kind, "Selected speech provider");

        if kind == ProviderKind::Local {
            match provider.generate(text, voice, model).await {
                Ok(audio) => {
                    info!("Local TTS succeeded");
                    return Ok(audio);
                },
                Err(e) => {
                    warn!("Local TTS failed, falling back to cloud: {e}");
                },
            }
        }

        let audio = self.cloud.generate(text, voice, model).await?;
        if kind == ProviderKind::Local {
            info!("Cloud TTS succeeded (fallback)");
        }
        Ok(audio)
    }

    /// Synthesize `text` incrementally from the selected provider
    ///
    /// No fallback: failures, whether before the first chunk or mid-stream,
    /// reach the caller unchanged.
    ///
    /// # Errors
    ///
    /// Returns `SpeechError::Validation` for blank text or the selected
    /// provider's error if the stream cannot be started.
    #[instrument(skip(self, text, options), fields(text_len = text.len()))]
    pub async fn generate_speech_stream(
        &self,
        text: &str,
        options: &SynthesisOptions,
    ) -> Result<AudioStream, SpeechError> {
        Self::validate(text)?;

        let (kind, provider) = self.select(options);
        debug!(provider = %kind, "Selected speech provider for streaming");

        provider
            .generate_stream(text, options.voice.as_deref(), options.model.as_deref())
            .await
    }

    /// Buffered synthesis of a transport-level request
    ///
    /// # Errors
    ///
    /// Same as [`generate_speech`](Self::generate_speech).
    pub async fn synthesize(&self, request: &SynthesisRequest) -> Result<AudioData, SpeechError> {
        self.generate_speech(&request.text, &request.options).await
    }

    /// Streaming synthesis of a transport-level request
    ///
    /// # Errors
    ///
    /// Same as [`generate_speech_stream`](Self::generate_speech_stream).
    pub async fn synthesize_stream(
        &self,
        request: &SynthesisRequest,
    ) -> Result<AudioStream, SpeechError> {
        self.generate_speech_stream(&request.text, &request.options)
            .await
    }
}
