//! Generative collaborators for the StoryReel pipeline.
//!
//! The pipeline only sees the [`TextCompleter`], [`ImageSynthesizer`] and
//! [`VoiceSynthesizer`] traits; [`OpenAiClient`] implements all three against
//! an OpenAI-compatible HTTP API.

pub mod config;
pub mod error;
pub mod openai;
pub mod traits;

pub use config::ProviderConfig;
pub use error::{ProviderError, ProviderResult};
pub use openai::OpenAiClient;
pub use traits::{ImageSynthesizer, TextCompleter, VoiceClip, VoiceSynthesizer};
