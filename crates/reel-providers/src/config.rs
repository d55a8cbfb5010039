//! Provider client configuration.

use std::time::Duration;

/// Configuration for the OpenAI-compatible provider client.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Base URL including the API version prefix
    pub base_url: String,
    /// Bearer token
    pub api_key: String,
    /// Chat completion model
    pub text_model: String,
    /// Image generation model
    pub image_model: String,
    /// Speech synthesis model
    pub voice_model: String,
    /// HTTP request timeout
    pub timeout: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            text_model: "gpt-4o-mini".to_string(),
            image_model: "dall-e-3".to_string(),
            voice_model: "tts-1".to_string(),
            timeout: Duration::from_secs(120),
        }
    }
}

impl ProviderConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("REEL_PROVIDER_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.base_url),
            api_key: std::env::var("REEL_PROVIDER_API_KEY").unwrap_or_default(),
            text_model: std::env::var("REEL_TEXT_MODEL").unwrap_or(defaults.text_model),
            image_model: std::env::var("REEL_IMAGE_MODEL").unwrap_or(defaults.image_model),
            voice_model: std::env::var("REEL_VOICE_MODEL").unwrap_or(defaults.voice_model),
            timeout: Duration::from_secs(
                std::env::var("REEL_PROVIDER_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(120),
            ),
        }
    }

    /// Config pointing at a custom base URL (tests, self-hosted gateways).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}
