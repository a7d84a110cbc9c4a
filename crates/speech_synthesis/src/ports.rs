//! Port definitions for speech synthesis
//!
//! Defines the trait (port) that synthesis adapters must implement.

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt, future};

use crate::error::SpeechError;
use crate::types::{AudioData, ProviderKind};

/// Lazy, finite, consume-once sequence of encoded audio chunks
///
/// Chunks arrive in production order. An `Err` item terminates the sequence;
/// chunks yielded before it are not retracted.
pub type AudioStream = Pin<Box<dyn Stream<Item = Result<Bytes, SpeechError>> + Send>>;

/// Stop a stream right after its first error item
///
/// Providers wrap their streams with this so a consumer never sees chunks
/// after a failure.
pub fn fuse_on_error<S>(stream: S) -> AudioStream
where
    S: Stream<Item = Result<Bytes, SpeechError>> + Send + 'static,
{
    Box::pin(stream.scan(false, |failed, item| {
        if *failed {
            return future::ready(None);
        }
        *failed = item.is_err();
        future::ready(Some(item))
    }))
}

/// Port for speech synthesis backends
///
/// Implemented by the on-device model provider and the cloud API provider.
/// Both operations expect non-empty text; validation happens at the
/// orchestrator boundary, not inside each provider.
///
/// # Example
///
/// ```ignore
/// use speech_synthesis::{SpeechProvider, SpeechError};
///
/// async fn narrate(provider: &impl SpeechProvider, text: &str) -> Result<Vec<u8>, SpeechError> {
///     let audio = provider.generate(text, None, None).await?;
///     Ok(audio.into_data())
/// }
/// ```
#[async_trait]
pub trait SpeechProvider: Send + Sync {
    /// Synthesize the whole text and return the complete audio
    ///
    /// # Arguments
    ///
    /// * `text` - Text to synthesize
    /// * `voice` - Optional voice override (ignored by providers with a fixed speaker)
    /// * `model` - Optional model override (ignored by providers with a fixed model)
    ///
    /// # Errors
    ///
    /// Returns `SpeechError::Provider` if the backend is unavailable,
    /// uninitialized, or reports a failure.
    async fn generate(
        &self,
        text: &str,
        voice: Option<&str>,
        model: Option<&str>,
    ) -> Result<AudioData, SpeechError>;

    /// Synthesize the text incrementally
    ///
    /// Failure may surface before the stream is returned or as an error item
    /// mid-stream.
    ///
    /// # Errors
    ///
    /// Returns `SpeechError::Provider` if the backend cannot start synthesis.
    async fn generate_stream(
        &self,
        text: &str,
        voice: Option<&str>,
        model: Option<&str>,
    ) -> Result<AudioStream, SpeechError>;

    /// Which side of the local/cloud split this provider sits on
    fn kind(&self) -> ProviderKind;

    /// Check if the provider can currently accept requests
    async fn is_available(&self) -> bool;
}
