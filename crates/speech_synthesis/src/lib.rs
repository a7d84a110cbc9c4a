//! Speech Synthesis - local-first text-to-speech with cloud fallback
//!
//! Turns text into encoded audio through one of two interchangeable
//! providers:
//! - `LocalSpeechProvider` - on-device model, loaded in the background
//! - `CloudSpeechProvider` - ElevenLabs streaming TTS API
//!
//! `SpeechOrchestrator` picks one per request from caller options and host
//! capability, and retries buffered local failures on the cloud provider.
//!
//! # Architecture
//!
//! This crate follows the ports & adapters pattern:
//! - `ports` module defines the `SpeechProvider` trait (port)
//! - `providers` module contains concrete implementations (adapters)
//! - `orchestrator` module owns the selection policy
//!
//! # Example
//!
//! ```ignore
//! use speech_synthesis::{
//!     SpeechConfig, SpeechOrchestrator, SynthesisOptions, host_supports_local_model,
//! };
//!
//! let config = SpeechConfig::load(None)?;
//! let orchestrator = SpeechOrchestrator::new(config, host_supports_local_model())?;
//!
//! let audio = orchestrator
//!     .generate_speech("Welcome to the show", &SynthesisOptions::default())
//!     .await?;
//! std::fs::write(audio.filename("intro"), audio.data())?;
//! ```

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod platform;
pub mod ports;
pub mod providers;
pub mod types;

pub use config::{CloudTtsConfig, LocalModelConfig, SamplerConfig, SpeechConfig};
pub use error::SpeechError;
pub use orchestrator::SpeechOrchestrator;
pub use platform::{host_supports_local_model, supports_local_model};
pub use ports::{AudioStream, SpeechProvider};
pub use providers::{CloudSpeechProvider, LocalSpeechProvider};
pub use types::{
    AudioData, AudioFormat, ProviderKind, Quality, Readiness, SynthesisOptions, SynthesisRequest,
};
