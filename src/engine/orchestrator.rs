//! Per-request generation state machine
//!
//! Idle → EnsureEngine → EnsureModifier → (ExtractIdentity) → BuildPrompt
//! → Invoke → Done, with any step failing the request. The orchestrator is
//! the only writer of engine slot and modifier cache state.

use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::engine::modifier::ModifierCache;
use crate::engine::slot::EngineSlot;
use crate::engine::traits::{EngineId, EngineJob, EngineRuntime, InvocationParams};
use crate::error::{AppError, Result};
use crate::resource::resolver::Resolver;
use crate::resource::ResourceTable;

/// Negative prompt attached to every invocation
pub const NEGATIVE_PROMPT: &str =
    "monochrome, lowres, bad anatomy, worst quality, low quality, blurry, nsfw, nude";

/// Quality suffix appended to every composed prompt
const QUALITY_SUFFIX: &str = "high quality, detailed, professional";

/// Style phrase fragments keyed by style
const STYLE_PHRASES: &[(&str, &str)] = &[
    (
        "anime",
        "anime art style, vibrant colors, cel shading, manga illustration, Japanese animation",
    ),
    (
        "cartoon",
        "cartoon style, bold outlines, flat colors, animated character design, Western animation",
    ),
    (
        "bollywood",
        "Bollywood movie star, dramatic Indian cinema style, vibrant colors, cinematic lighting",
    ),
    (
        "cinematic",
        "cinematic photography, professional film still, dramatic lighting, depth of field",
    ),
    (
        "natural",
        "natural photography, realistic, soft lighting, photorealistic",
    ),
    (
        "corporate",
        "corporate headshot, professional business portrait, neutral background",
    ),
    (
        "artistic",
        "artistic portrait, painterly style, creative interpretation",
    ),
    (
        "vintage",
        "vintage photography, classic portrait, timeless aesthetic, film grain",
    ),
    (
        "glamour",
        "glamour photography, elegant portrait, sophisticated lighting",
    ),
    (
        "pixar",
        "Pixar animation style, 3D character, glossy rendering, animated feature film",
    ),
];

/// Compose the final prompt: user prompt, style phrase, quality suffix.
/// Unmapped styles fall back to "<style> style".
pub fn compose_prompt(user_prompt: &str, style_key: &str) -> String {
    let phrase = STYLE_PHRASES
        .iter()
        .find(|(key, _)| *key == style_key)
        .map(|(_, phrase)| phrase.to_string())
        .unwrap_or_else(|| format!("{} style", style_key));

    format!("{}, {}, {}", user_prompt.trim(), phrase, QUALITY_SUFFIX)
}

/// An accepted, validated unit of generation work
#[derive(Debug, Clone)]
pub struct GenerationJob {
    pub source_image: PathBuf,
    pub prompt: String,
    pub style_key: String,
    pub engine: EngineId,
}

/// Parameters actually used for one invocation, echoed back to the caller
#[derive(Debug, Clone, Serialize)]
pub struct EffectiveParams {
    pub engine: EngineId,
    pub style: String,
    pub prompt: String,
    pub guidance_scale: f32,
    pub inference_steps: u32,
    pub conditioning_scale: f32,
    pub adapter_scale: f32,
    pub modifier_scale: Option<f32>,
}

/// Result of one generation
#[derive(Debug)]
pub struct GenerationOutcome {
    pub image: Vec<u8>,
    pub elapsed: Duration,
    pub params: EffectiveParams,
}

/// Drives a request through engine residency, modifier attachment, identity
/// extraction, prompt composition, and invocation.
pub struct Orchestrator {
    runtime: Arc<dyn EngineRuntime>,
    slot: EngineSlot,
    modifiers: ModifierCache,
    config: EngineConfig,
}

impl Orchestrator {
    pub fn new(
        runtime: Arc<dyn EngineRuntime>,
        resolver: Arc<Resolver>,
        table: Arc<ResourceTable>,
        config: EngineConfig,
    ) -> Self {
        let slot = EngineSlot::new(runtime.clone(), resolver.clone(), table.clone());
        let modifiers = ModifierCache::new(
            runtime.clone(),
            resolver,
            table,
            config.modifier_scale,
        );
        Self {
            runtime,
            slot,
            modifiers,
            config,
        }
    }

    /// Run one generation to completion.
    pub async fn generate(&mut self, job: &GenerationJob) -> Result<GenerationOutcome> {
        let start = Instant::now();

        debug!(stage = "ensure_engine", engine = %job.engine, "Orchestrating");
        self.slot.ensure(job.engine).await?;
        let epoch = self.slot.epoch();

        debug!(stage = "ensure_modifier", style = %job.style_key, epoch);
        let modifier_scale = self
            .modifiers
            .ensure(&job.style_key, epoch)
            .await?
            .map(|_| self.config.modifier_scale);

        let identity = if job.engine.requires_identity() {
            debug!(stage = "extract_identity");
            match self.runtime.extract_identity(&job.source_image).await? {
                Some(descriptor) => {
                    debug!(confidence = descriptor.confidence, "Subject detected");
                    Some(descriptor)
                }
                None => return Err(AppError::NoSubjectFound),
            }
        } else {
            None
        };

        let prompt = compose_prompt(&job.prompt, &job.style_key);
        debug!(stage = "build_prompt", prompt = %prompt);

        let params = InvocationParams {
            guidance_scale: self.config.guidance_scale,
            inference_steps: self.config.inference_steps,
            conditioning_scale: self.config.conditioning_scale,
            adapter_scale: self.config.adapter_scale,
            modifier_scale,
        };

        let engine_job = EngineJob {
            prompt: prompt.clone(),
            negative_prompt: NEGATIVE_PROMPT.to_string(),
            source_image: job.source_image.clone(),
            identity,
            params: params.clone(),
        };

        debug!(stage = "invoke", steps = params.inference_steps);
        let image = self.runtime.generate(&engine_job).await.map_err(|e| match e {
            err @ (AppError::EngineInvocation(_) | AppError::NoSubjectFound) => err,
            other => AppError::EngineInvocation(other.to_string()),
        })?;

        let elapsed = start.elapsed();
        info!(
            engine = %job.engine,
            style = %job.style_key,
            elapsed_ms = elapsed.as_millis() as u64,
            "Generation complete"
        );

        Ok(GenerationOutcome {
            image,
            elapsed,
            params: EffectiveParams {
                engine: job.engine,
                style: job.style_key.clone(),
                prompt,
                guidance_scale: self.config.guidance_scale,
                inference_steps: self.config.inference_steps,
                conditioning_scale: self.config.conditioning_scale,
                adapter_scale: self.config.adapter_scale,
                modifier_scale,
            },
        })
    }

    /// Whether an engine is currently resident
    pub fn engine_loaded(&self) -> bool {
        self.slot.current().is_some()
    }

    pub fn slot(&self) -> &EngineSlot {
        &self.slot
    }

    pub fn modifier_cache(&self) -> &ModifierCache {
        &self.modifiers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compose_prompt_mapped_style() {
        let prompt = compose_prompt("portrait of a chef", "anime");
        assert!(prompt.starts_with("portrait of a chef, anime art style"));
        assert!(prompt.ends_with(QUALITY_SUFFIX));
    }

    #[test]
    fn test_compose_prompt_unmapped_style_falls_back() {
        let prompt = compose_prompt("portrait", "y2k");
        assert!(prompt.contains("y2k style"));
        assert!(prompt.ends_with(QUALITY_SUFFIX));
    }

    #[test]
    fn test_compose_prompt_trims_user_prompt() {
        let prompt = compose_prompt("  portrait  ", "natural");
        assert!(prompt.starts_with("portrait, natural photography"));
    }
}
