//! HTTP client runtime against the local inference sidecar
//!
//! The sidecar owns the accelerator process (diffusion sampler, identity
//! extractor, codecs); this client maps the `EngineRuntime` capability
//! surface onto its control endpoints. Images cross the boundary base64
//! encoded.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::engine::identity::IdentityDescriptor;
use crate::engine::traits::{DeviceBinding, DeviceStatus, EngineId, EngineJob, EngineRuntime};
use crate::error::{AppError, Result};

pub struct SidecarRuntime {
    client: Client,
    base_url: String,
}

#[derive(Serialize)]
struct LoadEngineRequest<'a> {
    engine: EngineId,
    artifact_path: &'a str,
}

#[derive(Deserialize)]
struct LoadEngineResponse {
    device: String,
}

#[derive(Serialize)]
struct AttachModifierRequest<'a> {
    artifact_path: &'a str,
    scale: f32,
}

#[derive(Serialize)]
struct ExtractIdentityRequest<'a> {
    image_b64: &'a str,
}

#[derive(Deserialize)]
struct ExtractIdentityResponse {
    found: bool,
    #[serde(default)]
    embedding: Vec<f32>,
    #[serde(default)]
    keypoints: Vec<[f32; 2]>,
    #[serde(default)]
    confidence: f32,
}

#[derive(Serialize)]
struct GenerateRequestBody<'a> {
    prompt: &'a str,
    negative_prompt: &'a str,
    image_b64: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    identity: Option<&'a IdentityDescriptor>,
    guidance_scale: f32,
    num_inference_steps: u32,
    conditioning_scale: f32,
    adapter_scale: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    modifier_scale: Option<f32>,
}

#[derive(Deserialize)]
struct GenerateResponseBody {
    image_b64: String,
}

#[derive(Deserialize)]
struct StatusResponse {
    #[serde(default)]
    gpu_available: bool,
    #[serde(default)]
    gpu_memory_free_gb: Option<f64>,
}

impl SidecarRuntime {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn read_image_b64(&self, image: &Path) -> Result<String> {
        let bytes = tokio::fs::read(image).await?;
        Ok(BASE64.encode(bytes))
    }

    async fn post_expect_ok<B: Serialize>(&self, path: &str, body: &B) -> Result<reqwest::Response> {
        let response = self.client.post(self.url(path)).json(body).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(AppError::Internal(format!(
                "Sidecar {} returned {}: {}",
                path, status, detail
            )));
        }
        Ok(response)
    }
}

#[async_trait]
impl EngineRuntime for SidecarRuntime {
    async fn load_engine(&self, engine: EngineId, artifact: &Path) -> Result<DeviceBinding> {
        debug!(engine = %engine, artifact = %artifact.display(), "Loading engine via sidecar");
        let body = LoadEngineRequest {
            engine,
            artifact_path: artifact.to_str().unwrap_or_default(),
        };
        let response = self
            .post_expect_ok("/engine/load", &body)
            .await
            .map_err(|e| AppError::EngineLoad(e.to_string()))?;
        let parsed: LoadEngineResponse = response
            .json()
            .await
            .map_err(|e| AppError::EngineLoad(format!("Malformed load response: {}", e)))?;
        Ok(DeviceBinding {
            device: parsed.device,
        })
    }

    async fn release_engine(&self) -> Result<()> {
        self.post_expect_ok("/engine/release", &serde_json::json!({}))
            .await?;
        Ok(())
    }

    async fn attach_modifier(&self, artifact: &Path, scale: f32) -> Result<()> {
        let body = AttachModifierRequest {
            artifact_path: artifact.to_str().unwrap_or_default(),
            scale,
        };
        self.post_expect_ok("/modifier/attach", &body).await?;
        Ok(())
    }

    async fn detach_modifier(&self) -> Result<()> {
        self.post_expect_ok("/modifier/detach", &serde_json::json!({}))
            .await?;
        Ok(())
    }

    async fn extract_identity(&self, image: &Path) -> Result<Option<IdentityDescriptor>> {
        let image_b64 = self.read_image_b64(image).await?;
        let body = ExtractIdentityRequest {
            image_b64: &image_b64,
        };
        let response = self.post_expect_ok("/identity/extract", &body).await?;
        let parsed: ExtractIdentityResponse = response
            .json()
            .await
            .map_err(|e| AppError::Internal(format!("Malformed identity response: {}", e)))?;

        if !parsed.found {
            return Ok(None);
        }
        Ok(Some(IdentityDescriptor {
            embedding: parsed.embedding,
            keypoints: parsed.keypoints,
            confidence: parsed.confidence,
        }))
    }

    async fn generate(&self, job: &EngineJob) -> Result<Vec<u8>> {
        let image_b64 = self.read_image_b64(&job.source_image).await?;
        let body = GenerateRequestBody {
            prompt: &job.prompt,
            negative_prompt: &job.negative_prompt,
            image_b64,
            identity: job.identity.as_ref(),
            guidance_scale: job.params.guidance_scale,
            num_inference_steps: job.params.inference_steps,
            conditioning_scale: job.params.conditioning_scale,
            adapter_scale: job.params.adapter_scale,
            modifier_scale: job.params.modifier_scale,
        };
        let response = self
            .post_expect_ok("/generate", &body)
            .await
            .map_err(|e| AppError::EngineInvocation(e.to_string()))?;
        let parsed: GenerateResponseBody = response
            .json()
            .await
            .map_err(|e| AppError::EngineInvocation(format!("Malformed generate response: {}", e)))?;

        BASE64
            .decode(parsed.image_b64.trim())
            .map_err(|e| AppError::EngineInvocation(format!("Invalid image payload: {}", e)))
    }

    async fn device_status(&self) -> DeviceStatus {
        match self.client.get(self.url("/status")).send().await {
            Ok(response) if response.status().is_success() => {
                match response.json::<StatusResponse>().await {
                    Ok(status) => DeviceStatus {
                        gpu_available: status.gpu_available,
                        gpu_memory_free_gb: status.gpu_memory_free_gb,
                    },
                    Err(_) => DeviceStatus::default(),
                }
            }
            _ => DeviceStatus::default(),
        }
    }
}
