use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::generation::GenerationConfig;

/// Parameters of one txt2img call.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub negative_prompt: String,
    pub steps: u32,
    pub cfg_scale: f64,
    pub width: u32,
    pub height: u32,
    pub sampler_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduler: Option<String>,
    pub seed: i64,
    pub batch_size: u32,
    pub n_iter: u32,
    pub override_settings: serde_json::Value,
}

impl GenerationRequest {
    /// Merge a config's generation settings with a resolved prompt and seed.
    pub fn from_config(config: &GenerationConfig, prompt: &str, seed: i64) -> Self {
        let mut overrides = serde_json::Map::new();
        if let Some(checkpoint) = &config.model.checkpoint {
            overrides.insert("sd_model_checkpoint".into(), checkpoint.clone().into());
        }
        if let Some(vae) = &config.model.vae {
            overrides.insert("sd_vae".into(), vae.clone().into());
        }
        overrides.insert("CLIP_stop_at_last_layers".into(), config.model.clip_skip.into());

        let params = &config.generation;
        Self {
            prompt: prompt.to_string(),
            negative_prompt: config.prompt.negative.clone(),
            steps: params.steps,
            cfg_scale: params.cfg_scale,
            width: params.width,
            height: params.height,
            sampler_name: params.sampler.clone(),
            scheduler: params.scheduler.clone(),
            seed,
            batch_size: 1,
            n_iter: 1,
            override_settings: serde_json::Value::Object(overrides),
        }
    }
}

/// A generated image as returned by the remote API.
#[derive(Debug, Clone)]
pub struct GeneratedImage {
    /// Base64-encoded PNG.
    pub image_base64: String,
    /// Generation info reported by the server (seed, sampler, ...).
    pub metadata: serde_json::Value,
}

/// The remote image-generation call.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedImage, GenerateError>;

    /// Reachability check used by `/health`.
    async fn health_check(&self) -> Result<(), GenerateError>;
}

/// Client for an AUTOMATIC1111-compatible Stable Diffusion web API.
pub struct SdApiClient {
    http: Client,
    base_url: String,
}

#[derive(Deserialize)]
struct Txt2ImgResponse {
    #[serde(default)]
    images: Vec<String>,
    #[serde(default)]
    info: Option<String>,
}

impl SdApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, GenerateError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(GenerateError::Client)?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Check the status code, turning failures into classified errors.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, GenerateError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());

        Err(if status == StatusCode::TOO_MANY_REQUESTS {
            GenerateError::RateLimited
        } else if status.is_server_error() {
            GenerateError::Server {
                status: status.as_u16(),
                body,
            }
        } else {
            GenerateError::Rejected {
                status: status.as_u16(),
                body,
            }
        })
    }
}

#[async_trait]
impl ImageGenerator for SdApiClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedImage, GenerateError> {
        let url = format!("{}/sdapi/v1/txt2img", self.base_url);

        let response = self
            .http
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(GenerateError::from_transport)?;
        let response = Self::ensure_success(response).await?;

        let body: Txt2ImgResponse = response.json().await.map_err(GenerateError::Decode)?;
        let image_base64 = body
            .images
            .into_iter()
            .next()
            .ok_or(GenerateError::NoImage)?;

        // `info` is a JSON document encoded as a string.
        let metadata = body
            .info
            .as_deref()
            .and_then(|info| serde_json::from_str(info).ok())
            .unwrap_or(serde_json::Value::Null);

        Ok(GeneratedImage {
            image_base64,
            metadata,
        })
    }

    async fn health_check(&self) -> Result<(), GenerateError> {
        let url = format!("{}/sdapi/v1/sd-models", self.base_url);
        let response = self
            .http
            .get(&url)
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map_err(GenerateError::from_transport)?;
        Self::ensure_success(response).await?;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GenerateError {
    #[error("Generation request timed out")]
    Timeout,

    #[error("Could not reach generation API: {0}")]
    Connection(reqwest::Error),

    #[error("Generation API rate limited the request")]
    RateLimited,

    #[error("Generation API server error ({status}): {body}")]
    Server { status: u16, body: String },

    #[error("Generation API rejected the request ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Generation API returned no image")]
    NoImage,

    #[error("Failed to decode generation response: {0}")]
    Decode(reqwest::Error),

    #[error("Failed to build HTTP client: {0}")]
    Client(reqwest::Error),
}

impl GenerateError {
    fn from_transport(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else {
            Self::Connection(e)
        }
    }

    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::Connection(_) | Self::RateLimited | Self::Server { .. }
        )
    }
}
