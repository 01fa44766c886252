//! # Renderer Configuration
//!
//! Read-only knobs consumed by the section renderer. The host persists them as
//! JSON; every field has a default so partial files are accepted.
//!
//! ```json
//! {
//!   "chunk_builder_threads": 0,
//!   "prefer_indirect_draw": true,
//!   "queue_limits": { "important_rebuild": 32 }
//! }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{RenderError, RenderResult};

/// Maximum number of sections queued per update type in one traversal.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RebuildQueueLimits {
    /// Sections waiting only for a translucency re-sort.
    pub sort_only: usize,
    /// Sections that have never been built.
    pub initial_build: usize,
    /// Sections rebuilt in the background after a world change.
    pub rebuild: usize,
    /// Sections rebuilt synchronously because the change is near the player.
    pub important_rebuild: usize,
}

impl Default for RebuildQueueLimits {
    fn default() -> Self {
        Self {
            sort_only: 256,
            initial_build: 128,
            rebuild: 512,
            important_rebuild: 512,
        }
    }
}

/// Configuration of the chunk section renderer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Number of background chunk builder threads. Zero picks a value from the
    /// available parallelism.
    pub chunk_builder_threads: usize,
    /// Never rebuild sections synchronously, even for changes near the camera.
    pub always_defer_chunk_updates: bool,
    /// Skip facings that point away from the camera when emitting draws.
    pub use_block_face_culling: bool,
    /// Stop the visibility traversal at the fog distance.
    pub use_fog_occlusion: bool,
    /// Use per-section face connectivity to stop the visibility traversal.
    pub use_occlusion_culling: bool,
    /// Emit draws through an indirect buffer when the device supports it.
    pub prefer_indirect_draw: bool,
    /// Use the smooth (ambient occlusion) light pipeline instead of flat lighting.
    pub smooth_lighting: bool,
    /// Render distance in sections.
    pub render_distance: u32,
    /// Per-update-type rebuild queue caps.
    pub queue_limits: RebuildQueueLimits,
    /// Number of cloned section snapshots kept for reuse between builds.
    pub snapshot_cache_capacity: usize,
    /// Snapshots older than this are dropped by the cache cleanup pass.
    pub snapshot_max_age_ms: u64,
    /// Initial size in bytes of each region geometry arena.
    pub initial_arena_capacity: u64,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            chunk_builder_threads: 0,
            always_defer_chunk_updates: false,
            use_block_face_culling: true,
            use_fog_occlusion: true,
            use_occlusion_culling: true,
            prefer_indirect_draw: true,
            smooth_lighting: true,
            render_distance: 8,
            queue_limits: RebuildQueueLimits::default(),
            snapshot_cache_capacity: 256,
            snapshot_max_age_ms: 5_000,
            initial_arena_capacity: 256 * 1024,
        }
    }
}

impl RendererConfig {
    /// Loads and validates a configuration file.
    ///
    /// # Arguments
    /// * `path` - Path of a JSON configuration file
    ///
    /// # Returns
    /// The parsed configuration, or an I/O, JSON or validation error
    pub fn load(path: impl AsRef<Path>) -> RenderResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Parses and validates a configuration from a JSON string.
    pub fn from_json_str(json: &str) -> RenderResult<Self> {
        let config: RendererConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serializes the configuration as pretty-printed JSON.
    pub fn to_json_pretty(&self) -> RenderResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Rejects values the renderer cannot operate with.
    pub fn validate(&self) -> RenderResult<()> {
        if self.render_distance == 0 {
            return Err(RenderError::InvalidConfig(
                "render_distance must be at least 1".to_string(),
            ));
        }

        let limits = &self.queue_limits;
        if limits.sort_only == 0
            || limits.initial_build == 0
            || limits.rebuild == 0
            || limits.important_rebuild == 0
        {
            return Err(RenderError::InvalidConfig(
                "rebuild queue limits must be non-zero".to_string(),
            ));
        }

        if self.snapshot_cache_capacity == 0 {
            return Err(RenderError::InvalidConfig(
                "snapshot_cache_capacity must be non-zero".to_string(),
            ));
        }

        Ok(())
    }

    /// Number of builder threads to spawn.
    ///
    /// When `chunk_builder_threads` is zero this leaves one core for the
    /// render thread, with a minimum of one worker.
    pub fn effective_builder_threads(&self) -> usize {
        if self.chunk_builder_threads > 0 {
            return self.chunk_builder_threads;
        }

        std::thread::available_parallelism()
            .map(|n| n.get().saturating_sub(1))
            .unwrap_or(1)
            .max(1)
    }
}
