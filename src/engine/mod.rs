//! Engine residency and orchestration - slot, modifier cache, runtime trait

pub mod identity;
pub mod modifier;
pub mod orchestrator;
pub mod sidecar;
pub mod slot;
pub mod traits;

pub use identity::IdentityDescriptor;
pub use orchestrator::{EffectiveParams, GenerationJob, GenerationOutcome, Orchestrator};
pub use traits::{DeviceBinding, DeviceStatus, EngineId, EngineJob, EngineRuntime};
