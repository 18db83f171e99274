//! Engine slot - exclusive owner of the resident generation engine
//!
//! The slot holds zero or one engine handle. Switching engines releases the
//! old instance before the new one is materialized, and bumps an epoch
//! counter so stale modifier attachments can never be reused.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::engine::traits::{DeviceBinding, EngineId, EngineRuntime};
use crate::error::{AppError, Result};
use crate::resource::resolver::Resolver;
use crate::resource::ResourceTable;

/// Handle to the resident engine instance
#[derive(Debug, Clone)]
pub struct EngineHandle {
    pub engine_id: EngineId,
    pub device: DeviceBinding,
    pub loaded_at: DateTime<Utc>,
}

/// Owns at most one active engine instance. Only the generation worker
/// touches this; serialization comes from single-worker execution, not from
/// a lock.
pub struct EngineSlot {
    runtime: Arc<dyn EngineRuntime>,
    resolver: Arc<Resolver>,
    table: Arc<ResourceTable>,
    current: Option<EngineHandle>,
    epoch: u64,
}

impl EngineSlot {
    pub fn new(
        runtime: Arc<dyn EngineRuntime>,
        resolver: Arc<Resolver>,
        table: Arc<ResourceTable>,
    ) -> Self {
        Self {
            runtime,
            resolver,
            table,
            current: None,
            epoch: 0,
        }
    }

    /// Ensure the requested engine is resident and return its handle.
    ///
    /// A matching resident engine is returned unchanged with no I/O. On a
    /// switch the old instance is released first, the descriptor is resolved
    /// through the fallback chain, and a fresh instance is loaded. Failure
    /// leaves the slot empty; the next request retries from scratch.
    pub async fn ensure(&mut self, engine_id: EngineId) -> Result<&EngineHandle> {
        if let Some(handle) = &self.current {
            if handle.engine_id == engine_id {
                debug!(engine = %engine_id, "Engine already resident");
                return Ok(self.current.as_ref().unwrap());
            }
        }

        if let Some(old) = self.current.take() {
            // The old engine is gone either way; a failed release must not
            // block the swap, the subsequent load surfaces any real trouble.
            if let Err(e) = self.runtime.release_engine().await {
                warn!(engine = %old.engine_id, error = %e, "Engine release failed");
            }
            self.epoch += 1;
            debug!(from = %old.engine_id, to = %engine_id, epoch = self.epoch, "Engine replaced");
        }

        let descriptor = self
            .table
            .engine(engine_id.resource_name())
            .ok_or_else(|| {
                AppError::EngineLoad(format!("No configured locations for engine {}", engine_id))
            })?;

        let artifact = self.resolver.resolve(descriptor).await?;

        let device = self
            .runtime
            .load_engine(engine_id, &artifact)
            .await
            .map_err(|e| match e {
                err @ (AppError::EngineLoad(_) | AppError::ResourceUnavailable(_)) => err,
                other => AppError::EngineLoad(other.to_string()),
            })?;

        info!(engine = %engine_id, device = %device.device, "Engine loaded");

        self.current = Some(EngineHandle {
            engine_id,
            device,
            loaded_at: Utc::now(),
        });
        Ok(self.current.as_ref().unwrap())
    }

    /// Monotonic counter bumped on every engine replacement
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn current(&self) -> Option<&EngineHandle> {
        self.current.as_ref()
    }
}
