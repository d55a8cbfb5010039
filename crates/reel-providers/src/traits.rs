//! Collaborator interfaces consumed by the pipeline.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::error::ProviderResult;

/// Large-language-model text completion.
#[async_trait]
pub trait TextCompleter: Send + Sync {
    async fn complete(
        &self,
        system: &str,
        prompt: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> ProviderResult<String>;
}

/// Text-to-image synthesis. Writes the image to `output` and returns its path.
#[async_trait]
pub trait ImageSynthesizer: Send + Sync {
    async fn generate_image(
        &self,
        prompt: &str,
        size: &str,
        output: &Path,
    ) -> ProviderResult<PathBuf>;
}

/// A synthesized narration clip.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceClip {
    pub path: PathBuf,
    /// Measured duration in seconds
    pub duration: f64,
}

/// Text-to-speech synthesis. Writes the clip to `output`.
#[async_trait]
pub trait VoiceSynthesizer: Send + Sync {
    async fn synthesize(
        &self,
        text: &str,
        voice: &str,
        rate: f32,
        output: &Path,
    ) -> ProviderResult<VoiceClip>;
}
