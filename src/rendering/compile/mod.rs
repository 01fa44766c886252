//! # Section Compilation
//!
//! Everything that runs on a builder thread to turn a world snapshot into
//! uploadable geometry.
//!
//! ## Tasks
//!
//! * [`build_task::ChunkBuilderMeshingTask`] - Meshes a section, computes its
//!   visibility and the initial translucent order
//! * [`sort_task::ChunkBuilderSortTask`] - Reorders translucent indices for a
//!   new camera position without touching vertices
//!
//! Both produce a [`output::ChunkTaskOutput`] that the main thread uploads.

pub mod block_renderer;
pub mod buffers;
pub mod build_task;
pub mod output;
pub mod render_pass;
pub mod sort;
pub mod sort_task;
pub mod visibility;

pub use build_task::ChunkBuilderMeshingTask;
pub use render_pass::{RenderPassConfiguration, TerrainRenderPass, VertexFormat};
pub use sort_task::ChunkBuilderSortTask;
