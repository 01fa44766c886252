use crate::rendering::compile::block_renderer::BlockRenderer;
use crate::rendering::compile::buffers::ChunkBuildBuffers;
use crate::rendering::compile::visibility::VisibilityGraph;
use crate::rendering::light::{ArrayLightDataCache, LightPipeline};
use crate::world::world_slice::WorldSlice;

/// Scratch state owned by one builder thread and reused between jobs.
pub struct ChunkBuildContext {
    pub buffers: ChunkBuildBuffers,
    pub light_cache: ArrayLightDataCache,
    pub light_pipeline: LightPipeline,
    pub block_renderer: BlockRenderer,
    pub visibility_graph: VisibilityGraph,
}

impl ChunkBuildContext {
    pub fn new(smooth_lighting: bool) -> Self {
        Self {
            buffers: ChunkBuildBuffers::new(),
            light_cache: ArrayLightDataCache::new(),
            light_pipeline: LightPipeline::new(smooth_lighting),
            block_renderer: BlockRenderer::new(),
            visibility_graph: VisibilityGraph::new(),
        }
    }

    /// Clears everything left over from the previous job and points the
    /// light cache at `slice`.
    pub fn prepare(&mut self, slice: &WorldSlice) {
        self.buffers.init();
        self.light_cache.reset(slice.clone());
        self.light_pipeline.reset();
        self.visibility_graph.reset();
    }
}
