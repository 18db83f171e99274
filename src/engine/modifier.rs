//! Style modifier cache - zero-or-one modifier attached to the resident engine
//!
//! Modifiers are not composable: attaching a different one always detaches
//! the previous one first. An attachment is only valid for the engine epoch
//! it was made under; an engine switch invalidates it wholesale.

use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::engine::traits::EngineRuntime;
use crate::error::{AppError, Result};
use crate::resource::resolver::Resolver;
use crate::resource::ResourceTable;

/// Handle to the currently attached style modifier
#[derive(Debug, Clone)]
pub struct ModifierHandle {
    pub style_key: String,
    pub source: PathBuf,
    pub attached_epoch: u64,
}

/// Owns the modifier attached to the engine slot's resident engine
pub struct ModifierCache {
    runtime: Arc<dyn EngineRuntime>,
    resolver: Arc<Resolver>,
    table: Arc<ResourceTable>,
    scale: f32,
    current: Option<ModifierHandle>,
}

impl ModifierCache {
    pub fn new(
        runtime: Arc<dyn EngineRuntime>,
        resolver: Arc<Resolver>,
        table: Arc<ResourceTable>,
        scale: f32,
    ) -> Self {
        Self {
            runtime,
            resolver,
            table,
            scale,
            current: None,
        }
    }

    /// Ensure the modifier for `style_key` is attached under `engine_epoch`.
    ///
    /// Styles without a configured modifier detach whatever is attached and
    /// return `None`; the request falls back to prompt-only styling.
    pub async fn ensure(
        &mut self,
        style_key: &str,
        engine_epoch: u64,
    ) -> Result<Option<&ModifierHandle>> {
        let Some(descriptor) = self.table.modifier(style_key) else {
            debug!(style = style_key, "No modifier for style, prompt-only");
            self.detach_current(engine_epoch).await;
            return Ok(None);
        };
        let descriptor = descriptor.clone();

        if let Some(handle) = &self.current {
            if handle.style_key == style_key && handle.attached_epoch == engine_epoch {
                debug!(style = style_key, "Modifier already attached");
                return Ok(self.current.as_ref());
            }
        }

        self.detach_current(engine_epoch).await;

        let artifact = self.resolver.resolve(&descriptor).await?;

        self.runtime
            .attach_modifier(&artifact, self.scale)
            .await
            .map_err(|e| match e {
                err @ AppError::ResourceUnavailable(_) => err,
                other => AppError::ResourceUnavailable(format!(
                    "Failed to attach modifier for {}: {}",
                    style_key, other
                )),
            })?;

        info!(style = style_key, epoch = engine_epoch, "Modifier attached");

        self.current = Some(ModifierHandle {
            style_key: style_key.to_string(),
            source: artifact,
            attached_epoch: engine_epoch,
        });
        Ok(self.current.as_ref())
    }

    pub fn current(&self) -> Option<&ModifierHandle> {
        self.current.as_ref()
    }

    /// Drop the current attachment. Detachment failures must not block
    /// progress; they are logged and the handle is discarded regardless.
    async fn detach_current(&mut self, engine_epoch: u64) {
        let Some(old) = self.current.take() else {
            return;
        };

        // A stale-epoch attachment died with its engine; there is nothing
        // left on the device to detach.
        if old.attached_epoch != engine_epoch {
            debug!(
                style = %old.style_key,
                attached_epoch = old.attached_epoch,
                engine_epoch,
                "Dropping modifier handle invalidated by engine switch"
            );
            return;
        }

        match self.runtime.detach_modifier().await {
            Ok(()) => debug!(style = %old.style_key, "Modifier detached"),
            Err(e) => warn!(style = %old.style_key, error = %e, "Modifier detach failed"),
        }
    }
}
