//! Local on-device speech provider
//!
//! Wraps a locally hosted synthesis model. Construction kicks off a one-shot,
//! fire-and-forget model load on the current tokio runtime; calls made before
//! the load resolves, or after it failed, are rejected immediately with
//! "model not initialized" instead of waiting.
//!
//! ```text
//! Uninitialized ──▶ Initializing ──┬──▶ Ready
//!                                  └──▶ Failed
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

use crate::config::{LocalModelConfig, SamplerConfig};
use crate::error::SpeechError;
use crate::ports::{AudioStream, SpeechProvider, fuse_on_error};
use crate::providers::command::CommandModelLoader;
use crate::types::{AudioData, AudioFormat, ProviderKind, Readiness};

/// Fixed parameters applied to every synthesis call
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisParams {
    /// Speaker index
    pub speaker: u32,
    /// Prior utterances used as conversational context (always empty here)
    pub context: Vec<String>,
    /// Ceiling on generated audio length
    pub max_audio_length_ms: u64,
    pub sampler: SamplerConfig,
}

impl From<&LocalModelConfig> for SynthesisParams {
    fn from(config: &LocalModelConfig) -> Self {
        Self {
            speaker: config.speaker,
            context: Vec::new(),
            max_audio_length_ms: config.max_audio_length_ms,
            sampler: config.sampler,
        }
    }
}

impl Default for SynthesisParams {
    fn default() -> Self {
        Self::from(&LocalModelConfig::default())
    }
}

/// A loaded synthesis model
#[async_trait]
pub trait SynthesisModel: Send + Sync {
    /// Generate all audio for `text` in one call
    async fn generate(
        &self,
        text: &str,
        params: &SynthesisParams,
    ) -> Result<Vec<u8>, SpeechError>;

    /// Generate audio for `text` incrementally
    async fn generate_stream(
        &self,
        text: &str,
        params: &SynthesisParams,
    ) -> Result<AudioStream, SpeechError>;
}

/// One-shot loader producing a [`SynthesisModel`]
#[async_trait]
pub trait ModelLoader: Send + Sync + 'static {
    /// Load model weights; failures become `SpeechError::Initialization`
    async fn load(&self) -> Result<Arc<dyn SynthesisModel>, SpeechError>;
}

enum ModelState {
    Uninitialized,
    Initializing,
    Ready(Arc<dyn SynthesisModel>),
    Failed(String),
}

impl ModelState {
    const fn readiness(&self) -> Readiness {
        match self {
            Self::Uninitialized => Readiness::Uninitialized,
            Self::Initializing => Readiness::Initializing,
            Self::Ready(_) => Readiness::Ready,
            Self::Failed(_) => Readiness::Failed,
        }
    }
}

/// Move the state forward; backwards or repeated transitions are ignored
fn advance(state: &watch::Sender<ModelState>, next: ModelState) -> bool {
    state.send_if_modified(|current| {
        if current.readiness().can_advance_to(next.readiness()) {
            *current = next;
            true
        } else {
            false
        }
    })
}

/// Speech provider backed by an on-device model
pub struct LocalSpeechProvider {
    state: Arc<watch::Sender<ModelState>>,
    params: SynthesisParams,
    output_format: AudioFormat,
}

impl std::fmt::Debug for LocalSpeechProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalSpeechProvider")
            .field("readiness", &self.readiness())
            .field("params", &self.params)
            .field("output_format", &self.output_format)
            .finish()
    }
}

impl LocalSpeechProvider {
    /// Create a provider driving the configured model runner
    ///
    /// Must be called from within a tokio runtime; the model load starts
    /// immediately in the background.
    ///
    /// # Errors
    ///
    /// Returns `SpeechError::Configuration` if the configuration is invalid
    /// or no runtime is available.
    pub fn new(config: LocalModelConfig) -> Result<Self, SpeechError> {
        config.validate().map_err(SpeechError::Configuration)?;

        let params = SynthesisParams::from(&config);
        let output_format = config.output_format;
        Self::with_loader(CommandModelLoader::new(&config), params, output_format)
    }

    /// Create a provider around an arbitrary model loader
    ///
    /// # Errors
    ///
    /// Returns `SpeechError::Configuration` when called outside a tokio runtime.
    pub fn with_loader(
        loader: impl ModelLoader,
        params: SynthesisParams,
        output_format: AudioFormat,
    ) -> Result<Self, SpeechError> {
        let runtime = Handle::try_current().map_err(|e| {
            SpeechError::Configuration(format!(
                "Local model initialization requires a tokio runtime: {e}"
            ))
        })?;

        let (sender, _) = watch::channel(ModelState::Uninitialized);
        let state = Arc::new(sender);

        let init_state = Arc::clone(&state);
        runtime.spawn(async move {
            advance(&init_state, ModelState::Initializing);
            debug!("Loading local speech model");

            match loader.load().await {
                Ok(model) => {
                    info!("Local speech model ready");
                    advance(&init_state, ModelState::Ready(model));
                },
                Err(e) => {
                    error!(error = %e, "Failed to initialize local speech model");
                    advance(&init_state, ModelState::Failed(e.to_string()));
                },
            }
        });

        Ok(Self {
            state,
            params,
            output_format,
        })
    }

    /// Current lifecycle state of the model
    #[must_use]
    pub fn readiness(&self) -> Readiness {
        self.state.borrow().readiness()
    }

    /// Why initialization failed, once it has
    #[must_use]
    pub fn failure_reason(&self) -> Option<String> {
        match &*self.state.borrow() {
            ModelState::Failed(reason) => Some(reason.clone()),
            _ => None,
        }
    }

    /// Wait until initialization has resolved and report the outcome
    ///
    /// Only for observers (health checks, startup logging); `generate`
    /// never waits.
    pub async fn wait_until_settled(&self) -> Readiness {
        let mut receiver = self.state.subscribe();
        receiver
            .wait_for(|state| state.readiness().is_settled())
            .await
            .map_or(Readiness::Failed, |state| state.readiness())
    }

    #[must_use]
    pub const fn params(&self) -> &SynthesisParams {
        &self.params
    }

    fn ready_model(&self) -> Result<Arc<dyn SynthesisModel>, SpeechError> {
        match &*self.state.borrow() {
            ModelState::Ready(model) => Ok(Arc::clone(model)),
            ModelState::Uninitialized | ModelState::Initializing | ModelState::Failed(_) => {
                Err(SpeechError::local("model not initialized"))
            },
        }
    }
}

#[async_trait]
impl SpeechProvider for LocalSpeechProvider {
    #[instrument(skip(self, text, _voice, _model), fields(text_len = text.len()))]
    async fn generate(
        &self,
        text: &str,
        _voice: Option<&str>,
        _model: Option<&str>,
    ) -> Result<AudioData, SpeechError> {
        let model = self.ready_model()?;

        let audio = model.generate(text, &self.params).await.map_err(|e| {
            warn!(error = %e, "Local speech generation failed");
            e
        })?;

        debug!(audio_size = audio.len(), "Local speech generation complete");
        Ok(AudioData::new(audio, self.output_format))
    }

    #[instrument(skip(self, text, _voice, _model), fields(text_len = text.len()))]
    async fn generate_stream(
        &self,
        text: &str,
        _voice: Option<&str>,
        _model: Option<&str>,
    ) -> Result<AudioStream, SpeechError> {
        let model = self.ready_model()?;

        let stream = model
            .generate_stream(text, &self.params)
            .await
            .map_err(|e| {
                warn!(error = %e, "Local speech stream failed to start");
                e
            })?;

        Ok(fuse_on_error(stream))
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Local
    }

    async fn is_available(&self) -> bool {
        self.readiness() == Readiness::Ready
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use bytes::Bytes;
    use futures::{StreamExt, stream};
    use tokio::sync::Notify;

    use super::*;

    /// Model that echoes text and streams it word by word
    struct EchoModel {
        fail_after: Option<usize>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl SynthesisModel for EchoModel {
        async fn generate(
            &self,
            text: &str,
            _params: &SynthesisParams,
        ) -> Result<Vec<u8>, SpeechError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(text.as_bytes().to_vec())
        }

        async fn generate_stream(
            &self,
            text: &str,
            _params: &SynthesisParams,
        ) -> Result<AudioStream, SpeechError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut items: Vec<Result<Bytes, SpeechError>> = text
                .split_whitespace()
                .map(|w| Ok(Bytes::copy_from_slice(w.as_bytes())))
                .collect();
            if let Some(n) = self.fail_after {
                items.truncate(n);
                items.push(Err(SpeechError::local("inference crashed")));
                items.push(Ok(Bytes::from_static(b"after-failure")));
            }
            Ok(Box::pin(stream::iter(items)))
        }
    }

    /// Loader that resolves once `release` is notified
    struct GatedLoader {
        release: Arc<Notify>,
        outcome: Result<(), String>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ModelLoader for GatedLoader {
        async fn load(&self) -> Result<Arc<dyn SynthesisModel>, SpeechError> {
            self.release.notified().await;
            match &self.outcome {
                Ok(()) => Ok(Arc::new(EchoModel {
                    fail_after: None,
                    calls: Arc::clone(&self.calls),
                })),
                Err(reason) => Err(SpeechError::Initialization(reason.clone())),
            }
        }
    }

    struct ReadyLoader {
        fail_after: Option<usize>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ModelLoader for ReadyLoader {
        async fn load(&self) -> Result<Arc<dyn SynthesisModel>, SpeechError> {
            Ok(Arc::new(EchoModel {
                fail_after: self.fail_after,
                calls: Arc::clone(&self.calls),
            }))
        }
    }

    fn ready_provider(fail_after: Option<usize>) -> (LocalSpeechProvider, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let provider = LocalSpeechProvider::with_loader(
            ReadyLoader {
                fail_after,
                calls: Arc::clone(&calls),
            },
            SynthesisParams::default(),
            AudioFormat::Wav,
        )
        .unwrap();
        (provider, calls)
    }

    #[tokio::test]
    async fn becomes_ready_after_load() {
        let (provider, _) = ready_provider(None);

        assert_eq!(provider.wait_until_settled().await, Readiness::Ready);
        assert!(provider.is_available().await);
        assert!(provider.failure_reason().is_none());
    }

    #[tokio::test]
    async fn generate_before_ready_fails_fast() {
        let release = Arc::new(Notify::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let provider = LocalSpeechProvider::with_loader(
            GatedLoader {
                release: Arc::clone(&release),
                outcome: Ok(()),
                calls: Arc::clone(&calls),
            },
            SynthesisParams::default(),
            AudioFormat::Wav,
        )
        .unwrap();

        assert!(!provider.readiness().is_settled());

        let err = provider.generate("too early", None, None).await.unwrap_err();
        assert_eq!(err.provider(), Some(ProviderKind::Local));
        assert!(err.to_string().contains("model not initialized"));

        let err = provider
            .generate_stream("too early", None, None)
            .await
            .err()
            .unwrap();
        assert!(err.to_string().contains("model not initialized"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        release.notify_one();
        assert_eq!(provider.wait_until_settled().await, Readiness::Ready);

        let audio = provider.generate("now ready", None, None).await.unwrap();
        assert_eq!(audio.data(), b"now ready");
        assert_eq!(audio.format(), AudioFormat::Wav);
    }

    #[tokio::test]
    async fn failed_initialization_is_permanent() {
        let release = Arc::new(Notify::new());
        let provider = LocalSpeechProvider::with_loader(
            GatedLoader {
                release: Arc::clone(&release),
                outcome: Err("weights missing".to_string()),
                calls: Arc::new(AtomicUsize::new(0)),
            },
            SynthesisParams::default(),
            AudioFormat::Wav,
        )
        .unwrap();

        release.notify_one();
        assert_eq!(provider.wait_until_settled().await, Readiness::Failed);
        assert!(
            provider
                .failure_reason()
                .unwrap()
                .contains("weights missing")
        );

        let err = provider.generate("hello", None, None).await.unwrap_err();
        assert!(err.to_string().contains("model not initialized"));

        // A late Ready can never overwrite Failed
        let late_model: Arc<dyn SynthesisModel> = Arc::new(EchoModel {
            fail_after: None,
            calls: Arc::new(AtomicUsize::new(0)),
        });
        assert!(!advance(&provider.state, ModelState::Ready(late_model)));
        assert_eq!(provider.readiness(), Readiness::Failed);
        assert!(!provider.is_available().await);
    }

    #[tokio::test]
    async fn ready_state_cannot_regress() {
        let (provider, _) = ready_provider(None);
        provider.wait_until_settled().await;

        assert!(!advance(&provider.state, ModelState::Initializing));
        assert!(!advance(
            &provider.state,
            ModelState::Failed("late failure".to_string())
        ));
        assert_eq!(provider.readiness(), Readiness::Ready);
    }

    #[tokio::test]
    async fn stream_preserves_production_order() {
        let (provider, _) = ready_provider(None);
        provider.wait_until_settled().await;

        let stream = provider
            .generate_stream("first second third", None, None)
            .await
            .unwrap();
        let chunks: Vec<Bytes> = stream.map(Result::unwrap).collect().await;

        assert_eq!(
            chunks,
            vec![
                Bytes::from_static(b"first"),
                Bytes::from_static(b"second"),
                Bytes::from_static(b"third"),
            ]
        );
    }

    #[tokio::test]
    async fn mid_stream_failure_terminates_sequence() {
        let (provider, _) = ready_provider(Some(2));
        provider.wait_until_settled().await;

        let stream = provider
            .generate_stream("one two three four", None, None)
            .await
            .unwrap();
        let items: Vec<Result<Bytes, SpeechError>> = stream.collect().await;

        assert_eq!(items.len(), 3);
        assert_eq!(items[0].as_ref().unwrap(), &Bytes::from_static(b"one"));
        assert_eq!(items[1].as_ref().unwrap(), &Bytes::from_static(b"two"));
        assert!(items[2].is_err());
    }

    #[tokio::test]
    async fn concurrent_generation_after_ready() {
        let (provider, calls) = ready_provider(None);
        provider.wait_until_settled().await;

        let (a, b) = tokio::join!(
            provider.generate("alpha", None, None),
            provider.generate("beta", None, None)
        );

        assert_eq!(a.unwrap().data(), b"alpha");
        assert_eq!(b.unwrap().data(), b"beta");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn construction_outside_runtime_is_rejected() {
        let result = LocalSpeechProvider::with_loader(
            ReadyLoader {
                fail_after: None,
                calls: Arc::new(AtomicUsize::new(0)),
            },
            SynthesisParams::default(),
            AudioFormat::Wav,
        );
        assert!(matches!(result, Err(SpeechError::Configuration(_))));
    }

    #[test]
    fn new_rejects_invalid_config() {
        let config = LocalModelConfig {
            max_audio_length_ms: 0,
            ..Default::default()
        };
        assert!(matches!(
            LocalSpeechProvider::new(config),
            Err(SpeechError::Configuration(_))
        ));
    }

    #[test]
    fn params_follow_config() {
        let params = SynthesisParams::default();
        assert_eq!(params.speaker, 0);
        assert!(params.context.is_empty());
        assert_eq!(params.max_audio_length_ms, 5000);
        assert_eq!(params.sampler.top_k, 50);
    }
}
