//! Request handlers for generation and health endpoints

use axum::{
    extract::{Extension, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

use crate::engine::{EffectiveParams, EngineId, GenerationJob};
use crate::error::{ApiError, AppError, Result};
use crate::middleware::RequestId;
use crate::AppState;

/// Body of `POST /generate`
#[derive(Debug, Clone, Deserialize)]
pub struct GenerateRequestBody {
    pub image_url: String,
    pub prompt: String,
    #[serde(default = "default_style")]
    pub style: String,
    #[serde(default)]
    pub engine: Option<EngineId>,
}

fn default_style() -> String {
    "cinematic".to_string()
}

/// Successful generation response
#[derive(Debug, Serialize)]
pub struct GenerateResponseBody {
    pub status: &'static str,
    pub output_url: String,
    pub request_id: String,
    pub processing_time_ms: u64,
    pub params: EffectiveParams,
}

/// Health probe response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub gpu_available: bool,
    pub models_loaded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpu_memory_free_gb: Option<f64>,
}

/// Validate the request fields against the configured bounds. Nothing is
/// downloaded before this passes.
fn validate_request(state: &AppState, body: &GenerateRequestBody) -> Result<()> {
    let prompt = body.prompt.trim();
    if prompt.is_empty() {
        return Err(AppError::Validation("Prompt cannot be empty".to_string()));
    }
    let max_len = state.settings.limits.max_prompt_length;
    if prompt.chars().count() > max_len {
        return Err(AppError::Validation(format!(
            "Prompt too long: {} chars (max: {})",
            prompt.chars().count(),
            max_len
        )));
    }

    if !state.settings.allowed_styles.iter().any(|s| s == &body.style) {
        return Err(AppError::Validation(format!(
            "Unknown style '{}'",
            body.style
        )));
    }

    Ok(())
}

pub async fn generate(
    State(state): State<Arc<AppState>>,
    Extension(RequestId(request_id)): Extension<RequestId>,
    Json(body): Json<GenerateRequestBody>,
) -> std::result::Result<Json<GenerateResponseBody>, ApiError> {
    let start = Instant::now();
    info!(
        request_id = %request_id,
        style = %body.style,
        prompt_length = body.prompt.len(),
        "Generation started"
    );

    match run_generation(&state, &body).await {
        Ok((output_url, params)) => {
            let processing_time_ms = start.elapsed().as_millis() as u64;
            info!(request_id = %request_id, processing_time_ms, "Generation succeeded");
            Ok(Json(GenerateResponseBody {
                status: "success",
                output_url,
                request_id: request_id.to_string(),
                processing_time_ms,
                params,
            }))
        }
        Err(e) => {
            warn!(request_id = %request_id, error_code = e.code(), error = %e, "Generation failed");
            Err(e.with_request_id(request_id))
        }
    }
}

async fn run_generation(
    state: &AppState,
    body: &GenerateRequestBody,
) -> Result<(String, EffectiveParams)> {
    validate_request(state, body)?;
    let url = state.fetcher.validate_url(&body.image_url)?;

    // The guard removes the temp file on every path out of this function
    let input = state.fetcher.download(&url).await?;

    let job = GenerationJob {
        source_image: input.path().to_path_buf(),
        prompt: body.prompt.trim().to_string(),
        style_key: body.style.clone(),
        engine: body.engine.unwrap_or(EngineId::PrimaryIdentity),
    };

    let outcome = state.worker.submit(job).await?;
    let output_url = state.fetcher.upload(&outcome.image).await?;

    Ok((output_url, outcome.params))
}

/// Liveness probe: is the process running?
pub async fn liveness() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "alive" }))
}

/// Readiness probe: can the service take traffic?
pub async fn readiness(
    State(state): State<Arc<AppState>>,
) -> std::result::Result<Json<HealthResponse>, ApiError> {
    let device = state.runtime.device_status().await;

    if !device.gpu_available {
        warn!("Readiness check failed: GPU not available");
        return Err(AppError::NotReady("GPU not available".to_string())
            .with_request_id(Uuid::new_v4()));
    }

    if let Some(free_gb) = device.gpu_memory_free_gb {
        if free_gb < 1.0 {
            warn!(free_gb, "Readiness check failed: low GPU memory");
            return Err(
                AppError::NotReady("Low GPU memory".to_string()).with_request_id(Uuid::new_v4())
            );
        }
    }

    Ok(Json(HealthResponse {
        status: "ready",
        gpu_available: true,
        models_loaded: state.worker.status().engine_loaded,
        gpu_memory_free_gb: device.gpu_memory_free_gb,
    }))
}

/// Legacy health endpoint: always 200, status field carries the verdict
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let device = state.runtime.device_status().await;
    let status = if device.gpu_available {
        "healthy"
    } else {
        "unhealthy"
    };

    Json(HealthResponse {
        status,
        gpu_available: device.gpu_available,
        models_loaded: state.worker.status().engine_loaded,
        gpu_memory_free_gb: device.gpu_memory_free_gb,
    })
}
