//! OpenAI-compatible HTTP client implementing all three collaborators.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use reel_media::{FfmpegEncoder, MediaEncoder};

use crate::config::ProviderConfig;
use crate::error::{ProviderError, ProviderResult};
use crate::traits::{ImageSynthesizer, TextCompleter, VoiceClip, VoiceSynthesizer};

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageOwned,
}

#[derive(Deserialize)]
struct ChatMessageOwned {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Serialize)]
struct ImageRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    size: &'a str,
    n: u8,
    response_format: &'a str,
}

#[derive(Deserialize)]
struct ImageResponse {
    data: Vec<ImageData>,
}

#[derive(Deserialize)]
struct ImageData {
    b64_json: Option<String>,
    url: Option<String>,
}

#[derive(Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    speed: f32,
    response_format: &'a str,
}

/// Client for an OpenAI-compatible API.
pub struct OpenAiClient {
    http: Client,
    config: ProviderConfig,
    media: Arc<dyn MediaEncoder>,
}

impl OpenAiClient {
    /// Create a new client. Voice clip durations are measured with FFprobe.
    pub fn new(config: ProviderConfig) -> ProviderResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(ProviderError::Network)?;

        Ok(Self {
            http,
            config,
            media: Arc::new(FfmpegEncoder::new()),
        })
    }

    /// Create from environment variables.
    pub fn from_env() -> ProviderResult<Self> {
        Self::new(ProviderConfig::from_env())
    }

    /// Use a different encoder for measuring voice clips.
    pub fn with_media(mut self, media: Arc<dyn MediaEncoder>) -> Self {
        self.media = media;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url, path)
    }

    async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> ProviderResult<Response> {
        let url = self.url(path);
        debug!("POST {}", url);

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| self.map_network(e))?;

        check_status(response).await
    }

    fn map_network(&self, error: reqwest::Error) -> ProviderError {
        if error.is_timeout() {
            ProviderError::Timeout(self.config.timeout.as_secs())
        } else {
            ProviderError::Network(error)
        }
    }
}

async fn check_status(response: Response) -> ProviderResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ProviderError::from_status(status.as_u16(), &body))
}

async fn write_bytes(output: &Path, bytes: &[u8]) -> ProviderResult<()> {
    if bytes.is_empty() {
        return Err(ProviderError::invalid_response("empty payload"));
    }
    if let Some(parent) = output.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(output, bytes).await?;
    Ok(())
}

#[async_trait]
impl TextCompleter for OpenAiClient {
    async fn complete(
        &self,
        system: &str,
        prompt: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> ProviderResult<String> {
        let request = ChatRequest {
            model: &self.config.text_model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature,
            max_tokens,
        };

        let response: ChatResponse = self.post("chat/completions", &request).await?.json().await?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| ProviderError::invalid_response("completion has no content"))
    }
}

#[async_trait]
impl ImageSynthesizer for OpenAiClient {
    async fn generate_image(
        &self,
        prompt: &str,
        size: &str,
        output: &Path,
    ) -> ProviderResult<PathBuf> {
        let request = ImageRequest {
            model: &self.config.image_model,
            prompt,
            size,
            n: 1,
            response_format: "b64_json",
        };

        let response: ImageResponse = self
            .post("images/generations", &request)
            .await?
            .json()
            .await?;

        let image = response
            .data
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::invalid_response("no image in response"))?;

        let bytes = match (image.b64_json, image.url) {
            (Some(encoded), _) => BASE64
                .decode(encoded.trim())
                .map_err(|e| ProviderError::invalid_response(format!("bad base64 image: {}", e)))?,
            (None, Some(url)) => {
                let response = self
                    .http
                    .get(&url)
                    .send()
                    .await
                    .map_err(|e| self.map_network(e))?;
                check_status(response).await?.bytes().await?.to_vec()
            }
            (None, None) => return Err(ProviderError::invalid_response("image has no payload")),
        };

        write_bytes(output, &bytes).await?;
        Ok(output.to_path_buf())
    }
}

#[async_trait]
impl VoiceSynthesizer for OpenAiClient {
    async fn synthesize(
        &self,
        text: &str,
        voice: &str,
        rate: f32,
        output: &Path,
    ) -> ProviderResult<VoiceClip> {
        let request = SpeechRequest {
            model: &self.config.voice_model,
            input: text,
            voice,
            speed: rate,
            response_format: "mp3",
        };

        let bytes = self.post("audio/speech", &request).await?.bytes().await?;
        write_bytes(output, &bytes).await?;

        let duration = self.media.duration(output).await?;
        Ok(VoiceClip {
            path: output.to_path_buf(),
            duration,
        })
    }
}
