//! Rendering side of the section pipeline.
//!
//! Everything here runs on the main thread except `compile` and `light`,
//! which the builder workers drive through their own build contexts.
//! [`section_manager::RenderSectionManager`] ties the subsystems together and
//! [`chunk_renderer::ChunkRenderer`] turns its render lists into draws.

pub mod arena;
pub mod chunk_renderer;
pub mod compile;
pub mod gpu;
pub mod light;
pub mod lists;
pub mod multidraw;
pub mod occlusion;
pub mod region;
pub mod section;
pub mod section_manager;
pub mod vertex;

// Re-export commonly used types
pub use chunk_renderer::ChunkRenderer;
pub use section_manager::RenderSectionManager;
pub use vertex::ChunkVertex;
