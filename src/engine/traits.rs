//! Common traits and types for generation engines

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::engine::identity::IdentityDescriptor;
use crate::error::Result;

/// Closed set of generation engine variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineId {
    /// Diffusion engine with identity conditioning (embedding + keypoints)
    PrimaryIdentity,
    /// Adapter engine operating on structural conditioning only
    GenericAdapter,
}

impl EngineId {
    /// Key into the resource location table
    pub fn resource_name(&self) -> &'static str {
        match self {
            EngineId::PrimaryIdentity => "primary_identity",
            EngineId::GenericAdapter => "generic_adapter",
        }
    }

    /// Whether a request on this engine needs an identity descriptor
    pub fn requires_identity(&self) -> bool {
        matches!(self, EngineId::PrimaryIdentity)
    }
}

impl fmt::Display for EngineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.resource_name())
    }
}

/// Where on the accelerator an engine instance lives
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceBinding {
    pub device: String,
}

/// Accelerator status snapshot, reported by the readiness probe
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceStatus {
    pub gpu_available: bool,
    pub gpu_memory_free_gb: Option<f64>,
}

/// Fixed, engine-level sampling parameters for one invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvocationParams {
    pub guidance_scale: f32,
    pub inference_steps: u32,
    pub conditioning_scale: f32,
    pub adapter_scale: f32,
    /// Set only while a style modifier is attached
    pub modifier_scale: Option<f32>,
}

/// A fully prepared unit of device work
#[derive(Debug, Clone)]
pub struct EngineJob {
    pub prompt: String,
    pub negative_prompt: String,
    pub source_image: PathBuf,
    pub identity: Option<IdentityDescriptor>,
    pub params: InvocationParams,
}

/// The opaque accelerator collaborator. Everything that touches device
/// memory goes through this trait; the service itself never branches on
/// which concrete runtime is wired in.
#[async_trait]
pub trait EngineRuntime: Send + Sync {
    /// Materialize an engine from a resolved weight artifact and bind it to
    /// the accelerator.
    async fn load_engine(&self, engine: EngineId, artifact: &Path) -> Result<DeviceBinding>;

    /// Release the resident engine and free its device memory.
    async fn release_engine(&self) -> Result<()>;

    /// Attach a style modifier to the resident engine.
    async fn attach_modifier(&self, artifact: &Path, scale: f32) -> Result<()>;

    /// Detach the currently attached style modifier, if any.
    async fn detach_modifier(&self) -> Result<()>;

    /// Extract an identity descriptor from a normalized input image.
    /// `Ok(None)` means no identifiable subject was found.
    async fn extract_identity(&self, image: &Path) -> Result<Option<IdentityDescriptor>>;

    /// Run one generation on the resident engine.
    async fn generate(&self, job: &EngineJob) -> Result<Vec<u8>>;

    /// Current accelerator status.
    async fn device_status(&self) -> DeviceStatus;
}
