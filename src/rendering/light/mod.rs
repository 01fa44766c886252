//! # Lighting
//!
//! Computes per-vertex lightmap coordinates and brightness for block quads.
//! Light words are read through an [`ArrayLightDataCache`]; the pipelines
//! themselves only keep per-block scratch data, so one lives in every
//! worker's build context.

pub mod data;
pub mod flat;
pub mod quad;
pub mod smooth;

use crate::world::facing::ModelQuadFacing;

pub use data::ArrayLightDataCache;
pub use flat::FlatLightPipeline;
pub use quad::{ModelQuad, QuadLightData};
pub use smooth::SmoothLightPipeline;

/// The light pipeline of one worker, chosen once from the configuration.
pub enum LightPipeline {
    Flat(FlatLightPipeline),
    Smooth(SmoothLightPipeline),
}

impl LightPipeline {
    pub fn new(smooth_lighting: bool) -> Self {
        if smooth_lighting {
            LightPipeline::Smooth(SmoothLightPipeline::new())
        } else {
            LightPipeline::Flat(FlatLightPipeline::new())
        }
    }

    /// Lights one quad.
    ///
    /// # Arguments
    /// * `cache` - Light words of the section being built
    /// * `quad` - Quad in block-local coordinates
    /// * `(x, y, z)` - Block position in slice coordinates
    /// * `cull_face` - Face the quad is culled against, if any
    /// * `shade` - Apply directional shading
    #[allow(clippy::too_many_arguments)]
    pub fn calculate(
        &mut self,
        cache: &mut ArrayLightDataCache,
        quad: &ModelQuad,
        x: i32,
        y: i32,
        z: i32,
        cull_face: Option<ModelQuadFacing>,
        shade: bool,
    ) -> QuadLightData {
        let mut out = QuadLightData::default();
        match self {
            LightPipeline::Flat(pipeline) => pipeline.calculate(cache, quad, x, y, z, cull_face, shade, &mut out),
            LightPipeline::Smooth(pipeline) => pipeline.calculate(cache, quad, x, y, z, cull_face, shade, &mut out),
        }
        out
    }

    /// Drops per-block scratch data before a new section.
    pub fn reset(&mut self) {
        if let LightPipeline::Smooth(pipeline) = self {
            pipeline.reset();
        }
    }

    pub fn is_smooth(&self) -> bool {
        matches!(self, LightPipeline::Smooth(_))
    }
}
