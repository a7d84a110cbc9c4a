//! Speech synthesis provider implementations
//!
//! - `local` - on-device model with asynchronous, one-shot initialization
//! - `command` - model runner subprocess backing the local provider
//! - `elevenlabs` - ElevenLabs streaming TTS API

pub mod command;
pub mod elevenlabs;
pub mod local;

pub use command::{CommandModel, CommandModelLoader};
pub use elevenlabs::CloudSpeechProvider;
pub use local::{LocalSpeechProvider, ModelLoader, SynthesisModel, SynthesisParams};
