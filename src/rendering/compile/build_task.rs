//! Meshing of a whole section on a worker thread.

use std::collections::HashMap;
use std::sync::Arc;

use cgmath::Point3;

use crate::core::position::{section_origin, SECTION_SIZE};
use crate::error::RenderResult;
use crate::rendering::region;
use crate::rendering::section::BuiltRenderSectionData;
use crate::task_management::build_context::ChunkBuildContext;
use crate::task_management::job::ChunkBuilderTask;
use crate::world::block::BlockType;
use crate::world::world_slice::ChunkRenderContext;

use super::block_renderer::BlockRenderContext;
use super::output::{ChunkBuildOutput, ChunkTaskOutput, TaskOutputKind};
use super::render_pass::TerrainRenderPass;

/// Rebuilds the geometry and visibility of one section.
pub struct ChunkBuilderMeshingTask {
    render: ChunkRenderContext,
    build_frame: i64,
    camera: Point3<f32>,
}

impl ChunkBuilderMeshingTask {
    /// # Arguments
    /// * `render` - Snapshot of the section and its neighbours
    /// * `build_frame` - Frame the build was requested in
    /// * `camera` - Camera position in world space, used for the initial sort
    pub fn new(render: ChunkRenderContext, build_frame: i64, camera: Point3<f32>) -> Self {
        Self {
            render,
            build_frame,
            camera,
        }
    }
}

impl ChunkBuilderTask for ChunkBuilderMeshingTask {
    fn section(&self) -> Point3<i32> {
        self.render.origin
    }

    fn kind(&self) -> TaskOutputKind {
        TaskOutputKind::Build
    }

    fn execute(self: Box<Self>, context: &mut ChunkBuildContext) -> RenderResult<ChunkTaskOutput> {
        let section = self.render.origin;
        let slice = &self.render.slice;
        context.prepare(slice);

        let ChunkBuildContext {
            buffers,
            light_cache,
            light_pipeline,
            block_renderer,
            visibility_graph,
        } = context;

        let mut blocks = BlockRenderContext {
            slice,
            light_cache,
            light_pipeline,
            buffers: &mut *buffers,
            section_index: region::section_index(section) as u32,
        };

        for y in 0..SECTION_SIZE {
            for z in 0..SECTION_SIZE {
                for x in 0..SECTION_SIZE {
                    let block = slice.get_block(x, y, z);
                    if block.is_opaque_full_cube() {
                        visibility_graph.mark_opaque(x, y, z);
                    }
                    if block == BlockType::AIR {
                        continue;
                    }
                    block_renderer.render_block(&mut blocks, block, x, y, z);
                }
            }
        }

        let visibility = visibility_graph.compute();
        let origin = section_origin(section);
        let relative_camera = Point3::new(
            self.camera.x - origin.x as f32,
            self.camera.y - origin.y as f32,
            self.camera.z - origin.z as f32,
        );

        let mut pass_mask = 0;
        let mut meshes = HashMap::new();
        let mut sort_states = HashMap::new();
        for pass in TerrainRenderPass::all() {
            let Some((mesh, sort_state)) = buffers.take_mesh(pass, relative_camera) else {
                continue;
            };
            pass_mask |= pass.bit();
            meshes.insert(pass, mesh);
            if let Some(sort_state) = sort_state {
                sort_states.insert(pass, Arc::new(sort_state));
            }
        }

        Ok(ChunkTaskOutput::Build(ChunkBuildOutput {
            section,
            build_frame: self.build_frame,
            info: BuiltRenderSectionData::new(pass_mask, visibility),
            meshes,
            sort_states,
            camera: self.camera,
        }))
    }
}
