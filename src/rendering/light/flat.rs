use crate::world::facing::ModelQuadFacing;

use super::data::{self, ArrayLightDataCache};
use super::quad::{self, ModelQuad, QuadLightData, IS_ALIGNED, IS_PARALLEL};

/// One light value for the whole quad, sampled from the block it faces.
#[derive(Default)]
pub struct FlatLightPipeline;

impl FlatLightPipeline {
    pub fn new() -> Self {
        Self
    }

    /// # Arguments
    /// * `cache` - Light words of the section being built
    /// * `quad` - Quad in block-local coordinates
    /// * `(x, y, z)` - Block position in slice coordinates
    /// * `cull_face` - Face the quad is culled against, if any
    /// * `shade` - Apply directional shading
    #[allow(clippy::too_many_arguments)]
    pub fn calculate(
        &self,
        cache: &mut ArrayLightDataCache,
        quad: &ModelQuad,
        x: i32,
        y: i32,
        z: i32,
        cull_face: Option<ModelQuadFacing>,
        shade: bool,
        out: &mut QuadLightData,
    ) {
        let light_face = quad.light_face();
        let lightmap = match cull_face {
            Some(cull_face) => offset_lightmap(cache, x, y, z, cull_face),
            None => {
                let flags = quad.flags();
                if flags & IS_ALIGNED != 0
                    || (flags & IS_PARALLEL != 0 && data::unpack_fc(cache.get(x, y, z)))
                {
                    offset_lightmap(cache, x, y, z, light_face)
                } else {
                    data::emissive_lightmap(cache.get(x, y, z))
                }
            }
        };

        out.lm = [lightmap; 4];
        out.br = [quad::diffuse(light_face, shade); 4];
    }
}

/// Lightmap of the neighbour towards `face`, keeping the origin's own emission.
fn offset_lightmap(cache: &mut ArrayLightDataCache, x: i32, y: i32, z: i32, face: ModelQuadFacing) -> u32 {
    let origin = cache.get(x, y, z);
    if data::unpack_em(origin) {
        return data::FULL_BRIGHT;
    }
    let adjacent = cache.get_offset(x, y, z, face);
    data::pack(
        data::unpack_bl(adjacent).max(data::unpack_lu(origin)),
        data::unpack_sl(adjacent),
    )
}

#[cfg(test)]
mod tests {
    use cgmath::Point3;
    use std::time::Duration;

    use super::*;
    use crate::world::block::BlockType;
    use crate::world::cloned_section::ClonedSectionCache;
    use crate::world::world_slice::WorldSlice;
    use crate::world::{GenerationMethod, World};

    fn cache_with(blocks: &[((i32, i32, i32), BlockType)]) -> ArrayLightDataCache {
        let mut world = World::new(GenerationMethod::Empty, 0);
        world.add_section_at(Point3::new(0, 0, 0));
        for &((x, y, z), block) in blocks {
            world.set_block(x, y, z, block);
        }
        let mut snapshots = ClonedSectionCache::new(32, Duration::from_secs(60));
        let context = WorldSlice::prepare(&world, &mut snapshots, Point3::new(0, 0, 0)).unwrap();
        let mut cache = ArrayLightDataCache::new();
        cache.reset(context.slice);
        cache
    }

    #[test]
    fn culled_faces_read_the_neighbour() {
        let mut cache = cache_with(&[((4, 4, 4), BlockType::STONE)]);
        let top = ModelQuad::new([[0.0, 1.0, 0.0], [0.0, 1.0, 1.0], [1.0, 1.0, 1.0], [1.0, 1.0, 0.0]]);
        let mut out = QuadLightData::default();

        FlatLightPipeline::new().calculate(&mut cache, &top, 4, 4, 4, Some(ModelQuadFacing::PosY), true, &mut out);

        let above = cache.get(4, 5, 4);
        let expected = data::pack(data::unpack_bl(above), data::unpack_sl(above));
        assert_eq!(out.lm, [expected; 4]);
        assert_eq!(out.br, [1.0; 4]);
    }

    #[test]
    fn emissive_blocks_are_full_bright() {
        let mut cache = cache_with(&[((4, 4, 4), BlockType::LAMP)]);
        let side = ModelQuad::new([[0.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 1.0], [0.0, 1.0, 0.0]]);
        let mut out = QuadLightData::default();

        FlatLightPipeline::new().calculate(&mut cache, &side, 4, 4, 4, None, true, &mut out);

        assert_eq!(out.lm, [data::FULL_BRIGHT; 4]);
        assert_eq!(out.br, [0.6; 4]);
    }
}
