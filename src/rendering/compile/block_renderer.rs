//! Turns blocks into lit quads.

use crate::rendering::light::{ArrayLightDataCache, LightPipeline, ModelQuad};
use crate::rendering::vertex::ChunkVertex;
use crate::world::block::{BlockShape, BlockType};
use crate::world::facing::ModelQuadFacing;
use crate::world::world_slice::WorldSlice;

use super::buffers::ChunkBuildBuffers;
use super::render_pass::TerrainRenderPass;

type QuadPositions = [[f32; 3]; 4];

/// Unit cube faces in [`ModelQuadFacing::directions`] order, counter-clockwise
/// when seen from outside.
const CUBE_FACES: [QuadPositions; 6] = [
    [[1.0, 0.0, 0.0], [1.0, 1.0, 0.0], [1.0, 1.0, 1.0], [1.0, 0.0, 1.0]],
    [[0.0, 1.0, 0.0], [0.0, 1.0, 1.0], [1.0, 1.0, 1.0], [1.0, 1.0, 0.0]],
    [[0.0, 0.0, 1.0], [1.0, 0.0, 1.0], [1.0, 1.0, 1.0], [0.0, 1.0, 1.0]],
    [[0.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 1.0], [0.0, 1.0, 0.0]],
    [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [1.0, 0.0, 1.0], [0.0, 0.0, 1.0]],
    [[0.0, 0.0, 0.0], [0.0, 1.0, 0.0], [1.0, 1.0, 0.0], [1.0, 0.0, 0.0]],
];

/// The two diagonal planes of a cross-shaped block.
const CROSS_PLANES: [QuadPositions; 2] = [
    [[0.0, 0.0, 0.0], [0.0, 1.0, 0.0], [1.0, 1.0, 1.0], [1.0, 0.0, 1.0]],
    [[0.0, 0.0, 1.0], [0.0, 1.0, 1.0], [1.0, 1.0, 0.0], [1.0, 0.0, 0.0]],
];

/// Everything a block renderer writes into or reads from during a build.
pub struct BlockRenderContext<'a> {
    pub slice: &'a WorldSlice,
    pub light_cache: &'a mut ArrayLightDataCache,
    pub light_pipeline: &'a mut LightPipeline,
    pub buffers: &'a mut ChunkBuildBuffers,
    /// Index of the section inside its region, stored in every vertex.
    pub section_index: u32,
}

/// Emits the quads of single blocks.
#[derive(Default)]
pub struct BlockRenderer {
    quads_emitted: u64,
}

impl BlockRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Quads emitted since the renderer was created.
    pub fn quads_emitted(&self) -> u64 {
        self.quads_emitted
    }

    /// Renders the block at `(x, y, z)` of the centre section.
    ///
    /// # Returns
    /// The pass the block's quads went to, or `None` if nothing was emitted
    pub fn render_block(
        &mut self,
        context: &mut BlockRenderContext<'_>,
        block: BlockType,
        x: i32,
        y: i32,
        z: i32,
    ) -> Option<TerrainRenderPass> {
        let pass = block.render_pass()?;
        let before = self.quads_emitted;

        match block.shape() {
            BlockShape::Empty => {}
            BlockShape::FullCube => {
                for (face, positions) in ModelQuadFacing::directions().into_iter().zip(CUBE_FACES) {
                    if is_face_culled(context.slice, block, x, y, z, face) {
                        continue;
                    }
                    self.emit(context, block, pass, x, y, z, positions, Some(face));
                }
            }
            BlockShape::Slab => {
                for (face, positions) in ModelQuadFacing::directions().into_iter().zip(CUBE_FACES) {
                    let positions = positions.map(|[px, py, pz]| [px, py * 0.5, pz]);
                    if face == ModelQuadFacing::PosY {
                        self.emit(context, block, pass, x, y, z, positions, None);
                        continue;
                    }
                    if is_face_culled(context.slice, block, x, y, z, face) {
                        continue;
                    }
                    self.emit(context, block, pass, x, y, z, positions, Some(face));
                }
            }
            BlockShape::Cross => {
                for positions in CROSS_PLANES {
                    let [a, b, c, d] = positions;
                    self.emit(context, block, pass, x, y, z, positions, None);
                    self.emit(context, block, pass, x, y, z, [d, c, b, a], None);
                }
            }
        }

        (self.quads_emitted != before).then_some(pass)
    }

    #[allow(clippy::too_many_arguments)]
    fn emit(
        &mut self,
        context: &mut BlockRenderContext<'_>,
        block: BlockType,
        pass: TerrainRenderPass,
        x: i32,
        y: i32,
        z: i32,
        positions: QuadPositions,
        cull_face: Option<ModelQuadFacing>,
    ) {
        let quad = ModelQuad::new(positions);
        let light = context
            .light_pipeline
            .calculate(context.light_cache, &quad, x, y, z, cull_face, true);

        let facing = if pass.is_sorted() {
            ModelQuadFacing::Unassigned
        } else {
            quad.normal_face()
        };

        let base = block.color();
        let vertices: [ChunkVertex; 4] = std::array::from_fn(|i| {
            let [px, py, pz] = positions[i];
            ChunkVertex::new(
                [px + x as f32, py + y as f32, pz + z as f32],
                shade(base, light.br[i]),
                light.lm[i],
                context.section_index,
            )
        });

        context.buffers.push_quad(pass, facing, vertices);
        self.quads_emitted += 1;
    }
}

fn is_face_culled(slice: &WorldSlice, block: BlockType, x: i32, y: i32, z: i32, face: ModelQuadFacing) -> bool {
    let step = face.step();
    block.is_face_hidden_by(slice.get_block(x + step.x, y + step.y, z + step.z))
}

fn shade(color: [u8; 4], brightness: f32) -> [u8; 4] {
    let scale = |channel: u8| (channel as f32 * brightness).round().clamp(0.0, 255.0) as u8;
    [scale(color[0]), scale(color[1]), scale(color[2]), color[3]]
}

#[cfg(test)]
mod tests {
    use cgmath::Point3;
    use std::time::Duration;

    use super::*;
    use crate::world::cloned_section::ClonedSectionCache;
    use crate::world::{GenerationMethod, World};

    struct Fixture {
        slice: WorldSlice,
        cache: ArrayLightDataCache,
        pipeline: LightPipeline,
        buffers: ChunkBuildBuffers,
    }

    impl Fixture {
        fn new(blocks: &[((i32, i32, i32), BlockType)], smooth: bool) -> Self {
            let mut world = World::new(GenerationMethod::Empty, 0);
            world.add_section_at(Point3::new(0, 0, 0));
            for &((x, y, z), block) in blocks {
                world.set_block(x, y, z, block);
            }
            let mut snapshots = ClonedSectionCache::new(32, Duration::from_secs(60));
            let slice = WorldSlice::prepare(&world, &mut snapshots, Point3::new(0, 0, 0))
                .unwrap()
                .slice;
            let mut cache = ArrayLightDataCache::new();
            cache.reset(slice.clone());
            Self {
                slice,
                cache,
                pipeline: LightPipeline::new(smooth),
                buffers: ChunkBuildBuffers::new(),
            }
        }

        fn render(&mut self, block: BlockType, x: i32, y: i32, z: i32) -> (BlockRenderer, Option<TerrainRenderPass>) {
            let mut renderer = BlockRenderer::new();
            let mut context = BlockRenderContext {
                slice: &self.slice,
                light_cache: &mut self.cache,
                light_pipeline: &mut self.pipeline,
                buffers: &mut self.buffers,
                section_index: 3,
            };
            let pass = renderer.render_block(&mut context, block, x, y, z);
            (renderer, pass)
        }
    }

    #[test]
    fn touching_cubes_hide_their_shared_faces() {
        let mut fixture = Fixture::new(&[((4, 4, 4), BlockType::STONE), ((5, 4, 4), BlockType::STONE)], true);
        let (renderer, pass) = fixture.render(BlockType::STONE, 4, 4, 4);

        assert_eq!(pass, Some(TerrainRenderPass::Solid));
        assert_eq!(renderer.quads_emitted(), 5);
        let (mesh, _) = fixture
            .buffers
            .take_mesh(TerrainRenderPass::Solid, Point3::new(0.0, 0.0, 0.0))
            .unwrap();
        assert_eq!(mesh.vertex_ranges[ModelQuadFacing::PosX.index()], 0);
        assert_eq!(mesh.vertex_ranges[ModelQuadFacing::NegX.index()], 4);
        assert_eq!(mesh.vertex_ranges[ModelQuadFacing::Unassigned.index()], 0);
    }

    #[test]
    fn slabs_always_draw_their_top() {
        let mut fixture = Fixture::new(&[((4, 4, 4), BlockType::SLAB), ((4, 5, 4), BlockType::STONE)], false);
        let (renderer, _) = fixture.render(BlockType::SLAB, 4, 4, 4);
        assert_eq!(renderer.quads_emitted(), 6);
    }

    #[test]
    fn cross_plants_go_to_the_unassigned_facing() {
        let mut fixture = Fixture::new(&[((4, 4, 4), BlockType::FLOWER)], true);
        let (renderer, pass) = fixture.render(BlockType::FLOWER, 4, 4, 4);

        assert_eq!(pass, Some(TerrainRenderPass::Cutout));
        assert_eq!(renderer.quads_emitted(), 4);
        let (mesh, _) = fixture
            .buffers
            .take_mesh(TerrainRenderPass::Cutout, Point3::new(0.0, 0.0, 0.0))
            .unwrap();
        assert_eq!(mesh.vertex_ranges[ModelQuadFacing::Unassigned.index()], 16);
    }

    #[test]
    fn vertices_are_section_relative_and_tagged() {
        let mut fixture = Fixture::new(&[((2, 3, 4), BlockType::GLASS)], false);
        fixture.render(BlockType::GLASS, 2, 3, 4);
        let (mesh, sort) = fixture
            .buffers
            .take_mesh(TerrainRenderPass::Translucent, Point3::new(0.0, 0.0, 0.0))
            .unwrap();

        assert_eq!(sort.unwrap().quad_count(), 6);
        let vertices: Vec<ChunkVertex> = mesh
            .vertex_data
            .chunks_exact(std::mem::size_of::<ChunkVertex>())
            .map(bytemuck::pod_read_unaligned)
            .collect();
        assert!(vertices.iter().all(|vertex| vertex.section_index == 3));
        assert!(vertices
            .iter()
            .all(|vertex| (2.0..=3.0).contains(&vertex.position[0]) && (4.0..=5.0).contains(&vertex.position[2])));
    }
}
