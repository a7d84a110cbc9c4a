//! Integration tests for speech_synthesis crate
//!
//! Drives the orchestrator end to end with a mocked ElevenLabs API and
//! scripted local models.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use speech_synthesis::providers::{ModelLoader, SynthesisModel, SynthesisParams};
use speech_synthesis::{
    AudioFormat, AudioStream, CloudSpeechProvider, CloudTtsConfig, LocalSpeechProvider,
    ProviderKind, Quality, Readiness, SpeechError, SpeechOrchestrator, SynthesisOptions,
    SynthesisRequest,
};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const VOICE_PATH: &str = "/v1/text-to-speech/21m00Tcm4TlvDq8ikWAM/stream";

/// Create a cloud provider pointing to mock server
fn cloud_provider(mock_server: &MockServer) -> CloudSpeechProvider {
    let config = CloudTtsConfig {
        base_url: mock_server.uri(),
        timeout_ms: 5000,
        ..CloudTtsConfig::with_api_key("test-api-key")
    };
    CloudSpeechProvider::new(config).expect("Failed to create cloud provider")
}

/// Minimal MP3 frame header
fn mock_mp3_audio() -> Vec<u8> {
    vec![0xFF, 0xFB, 0x90, 0x00, 0x00, 0x00, 0x00, 0x00]
}

/// Model returning a fixed WAV-like payload
struct CannedModel;

#[async_trait]
impl SynthesisModel for CannedModel {
    async fn generate(&self, text: &str, _params: &SynthesisParams) -> Result<Vec<u8>, SpeechError> {
        Ok(format!("RIFF{text}").into_bytes())
    }

    async fn generate_stream(
        &self,
        text: &str,
        _params: &SynthesisParams,
    ) -> Result<AudioStream, SpeechError> {
        let chunks: Vec<Result<Bytes, SpeechError>> = vec![
            Ok(Bytes::from_static(b"RIFF")),
            Ok(Bytes::copy_from_slice(text.as_bytes())),
        ];
        Ok(Box::pin(futures::stream::iter(chunks)))
    }
}

struct CannedLoader;

#[async_trait]
impl ModelLoader for CannedLoader {
    async fn load(&self) -> Result<Arc<dyn SynthesisModel>, SpeechError> {
        Ok(Arc::new(CannedModel))
    }
}

struct BrokenLoader;

#[async_trait]
impl ModelLoader for BrokenLoader {
    async fn load(&self) -> Result<Arc<dyn SynthesisModel>, SpeechError> {
        Err(SpeechError::Initialization("weights corrupted".to_string()))
    }
}

async fn settled_local(loader: impl ModelLoader) -> LocalSpeechProvider {
    let local = LocalSpeechProvider::with_loader(loader, SynthesisParams::default(), AudioFormat::Wav)
        .expect("Failed to create local provider");
    local.wait_until_settled().await;
    local
}

// ============ Buffered synthesis ============

#[tokio::test]
async fn cloud_only_orchestrator_synthesizes() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(VOICE_PATH))
        .and(header("xi-api-key", "test-api-key"))
        .and(body_partial_json(serde_json::json!({ "text": "Hello there" })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(mock_mp3_audio())
                .insert_header("content-type", "audio/mpeg"),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let orchestrator: SpeechOrchestrator<LocalSpeechProvider> =
        SpeechOrchestrator::from_providers(None, cloud_provider(&mock_server));

    let audio = orchestrator
        .generate_speech("Hello there", &SynthesisOptions::default().prefer_local())
        .await
        .expect("Synthesis should succeed");

    assert_eq!(audio.data(), mock_mp3_audio().as_slice());
    assert_eq!(audio.format(), AudioFormat::Mp3);
}

#[tokio::test]
async fn ready_local_model_serves_default_requests() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(mock_mp3_audio()))
        .expect(0)
        .mount(&mock_server)
        .await;

    let local = settled_local(CannedLoader).await;
    assert_eq!(local.readiness(), Readiness::Ready);

    let orchestrator = SpeechOrchestrator::from_providers(Some(local), cloud_provider(&mock_server));

    let audio = orchestrator
        .generate_speech("local voice", &SynthesisOptions::default())
        .await
        .unwrap();

    assert_eq!(audio.data(), b"RIFFlocal voice");
    assert_eq!(audio.format(), AudioFormat::Wav);
}

#[tokio::test]
async fn failed_local_model_falls_back_to_cloud() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(VOICE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(mock_mp3_audio()))
        .expect(1)
        .mount(&mock_server)
        .await;

    let local = settled_local(BrokenLoader).await;
    assert_eq!(local.readiness(), Readiness::Failed);
    assert!(local.failure_reason().unwrap().contains("weights corrupted"));

    let orchestrator = SpeechOrchestrator::from_providers(Some(local), cloud_provider(&mock_server));

    let audio = orchestrator
        .generate_speech("fallback please", &SynthesisOptions::default().prefer_local())
        .await
        .unwrap();

    assert_eq!(audio.data(), mock_mp3_audio().as_slice());
}

#[tokio::test]
async fn fallback_surfaces_cloud_error_when_both_fail() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let local = settled_local(BrokenLoader).await;
    let orchestrator = SpeechOrchestrator::from_providers(Some(local), cloud_provider(&mock_server));

    let err = orchestrator
        .generate_speech("nobody home", &SynthesisOptions::default())
        .await
        .unwrap_err();

    assert_eq!(err.provider(), Some(ProviderKind::Cloud));
    assert_eq!(err.status(), Some(401));
}

#[tokio::test]
async fn high_quality_request_skips_ready_local_model() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(mock_mp3_audio()))
        .expect(1)
        .mount(&mock_server)
        .await;

    let local = settled_local(CannedLoader).await;
    let orchestrator = SpeechOrchestrator::from_providers(Some(local), cloud_provider(&mock_server));

    let request = SynthesisRequest::new("studio quality")
        .with_options(SynthesisOptions::default().with_quality(Quality::High));
    let audio = orchestrator.synthesize(&request).await.unwrap();

    assert_eq!(audio.data(), mock_mp3_audio().as_slice());
}

// ============ Streaming ============

#[tokio::test]
async fn cloud_stream_passes_body_through() {
    let mock_server = MockServer::start().await;
    let body: Vec<u8> = (0..=255u8).cycle().take(64 * 1024).collect();

    Mock::given(method("POST"))
        .and(path(VOICE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
        .expect(1)
        .mount(&mock_server)
        .await;

    let orchestrator: SpeechOrchestrator<LocalSpeechProvider> =
        SpeechOrchestrator::from_providers(None, cloud_provider(&mock_server));

    let mut stream = orchestrator
        .generate_speech_stream("a long chapter", &SynthesisOptions::default())
        .await
        .unwrap();

    let mut received = Vec::new();
    while let Some(chunk) = stream.next().await {
        received.extend_from_slice(&chunk.unwrap());
    }
    assert_eq!(received, body);
}

#[tokio::test]
async fn local_stream_failure_does_not_fall_back() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(mock_mp3_audio()))
        .expect(0)
        .mount(&mock_server)
        .await;

    let local = settled_local(BrokenLoader).await;
    let orchestrator = SpeechOrchestrator::from_providers(Some(local), cloud_provider(&mock_server));

    let err = orchestrator
        .generate_speech_stream("no retry", &SynthesisOptions::default())
        .await
        .err()
        .unwrap();

    assert_eq!(err.provider(), Some(ProviderKind::Local));
}

#[tokio::test]
async fn local_stream_yields_model_chunks() {
    let mock_server = MockServer::start().await;
    let local = settled_local(CannedLoader).await;
    let orchestrator = SpeechOrchestrator::from_providers(Some(local), cloud_provider(&mock_server));

    let stream = orchestrator
        .generate_speech_stream("abc", &SynthesisOptions::default())
        .await
        .unwrap();
    let chunks: Vec<Bytes> = stream.map(Result::unwrap).collect().await;

    assert_eq!(chunks, vec![Bytes::from_static(b"RIFF"), Bytes::from_static(b"abc")]);
}

// ============ Validation ============

#[tokio::test]
async fn blank_text_never_reaches_the_api() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let orchestrator: SpeechOrchestrator<LocalSpeechProvider> =
        SpeechOrchestrator::from_providers(None, cloud_provider(&mock_server));

    for text in ["", " ", "\n\t  "] {
        let err = orchestrator
            .generate_speech(text, &SynthesisOptions::default().force_cloud())
            .await
            .unwrap_err();
        assert!(matches!(err, SpeechError::Validation(_)));
    }
}
