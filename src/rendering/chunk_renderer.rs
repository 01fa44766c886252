//! # Chunk Renderer
//!
//! Emits the draw calls for one render pass from the frame's render lists.
//!
//! ## Per Region
//! 1. Collect the draws of every listed section into the multidraw emitter,
//!    culling facings that point away from the camera
//! 2. Pick the index source: sorted passes draw from the region's own index
//!    arena, all others from a shared quad index buffer
//! 3. Fetch (or recreate) the region's tessellation and execute the batch

use cgmath::Point3;
use log::debug;

use crate::config::RendererConfig;
use crate::core::position::{section_origin, SECTION_SIZE};
use crate::error::RenderResult;
use crate::rendering::compile::render_pass::TerrainRenderPass;
use crate::rendering::gpu::{BufferUsage, CommandList, GpuBuffer};
use crate::rendering::lists::{ChunkRenderList, SortedRenderLists};
use crate::rendering::multidraw::{MultiDrawEmitter, LOCAL_INDEX_POINTER_MASK, SHARED_INDEX_POINTER_MASK};
use crate::rendering::region::manager::RenderRegionManager;
use crate::rendering::region::RenderRegion;
use crate::world::facing::ModelQuadFacing;

/// Index pattern of one quad.
const QUAD_INDICES: [u32; 6] = [0, 1, 2, 2, 3, 0];

/// An index buffer of consecutive quads shared by every unsorted draw.
pub struct SharedQuadIndexBuffer {
    buffer: Option<GpuBuffer>,
    max_quads: u32,
}

impl SharedQuadIndexBuffer {
    pub fn new() -> Self {
        Self {
            buffer: None,
            max_quads: 0,
        }
    }

    /// Grows the buffer to hold at least `element_count` indices.
    ///
    /// The quad capacity grows to the next power of two, so repeated small
    /// increases do not reallocate every frame.
    ///
    /// # Returns
    /// The buffer to draw with, or `None` when nothing needs indices
    ///
    /// # Errors
    /// `RenderError::ResourceExhaustion` if the device cannot allocate it
    pub fn ensure_capacity(
        &mut self,
        command_list: &mut dyn CommandList,
        element_count: u32,
    ) -> RenderResult<Option<GpuBuffer>> {
        let quads = element_count.div_ceil(QUAD_INDICES.len() as u32);
        if quads == 0 {
            return Ok(self.buffer);
        }
        if let Some(buffer) = self.buffer {
            if quads <= self.max_quads {
                return Ok(Some(buffer));
            }
        }

        let max_quads = quads.next_power_of_two();
        let data = quad_index_bytes(max_quads);
        let buffer = match self.buffer {
            Some(buffer) => buffer,
            None => command_list.create_buffer("Shared Quad Index Buffer", data.len() as u64, BufferUsage::StaticDraw)?,
        };
        command_list.upload_data(buffer, &data, BufferUsage::StaticDraw)?;
        debug!("Grew shared quad index buffer to {} quads", max_quads);

        self.buffer = Some(buffer);
        self.max_quads = max_quads;
        Ok(Some(buffer))
    }

    pub fn max_quads(&self) -> u32 {
        self.max_quads
    }

    pub fn delete(&mut self, command_list: &mut dyn CommandList) {
        if let Some(buffer) = self.buffer.take() {
            command_list.delete_buffer(buffer);
        }
        self.max_quads = 0;
    }
}

impl Default for SharedQuadIndexBuffer {
    fn default() -> Self {
        Self::new()
    }
}

fn quad_index_bytes(quads: u32) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(quads as usize * QUAD_INDICES.len() * 4);
    for quad in 0..quads {
        let base = quad * 4;
        for index in QUAD_INDICES {
            bytes.extend_from_slice(&(base + index).to_ne_bytes());
        }
    }
    bytes
}

/// Draws render lists through multidraw batches.
pub struct ChunkRenderer {
    emitter: MultiDrawEmitter,
    shared_indices: SharedQuadIndexBuffer,
    use_block_face_culling: bool,
}

impl ChunkRenderer {
    /// Creates a renderer using the multidraw strategy of the device.
    pub fn new(command_list: &dyn CommandList, config: &RendererConfig) -> Self {
        Self {
            emitter: MultiDrawEmitter::for_device(&command_list.device_functions(), config.prefer_indirect_draw),
            shared_indices: SharedQuadIndexBuffer::new(),
            use_block_face_culling: config.use_block_face_culling,
        }
    }

    /// Draws one pass.
    ///
    /// # Arguments
    /// * `lists` - Render lists of the frame, nearest region first
    /// * `pass` - Pass to draw; reverse-ordered passes walk the lists backwards
    /// * `camera` - Camera position in world space
    /// * `regions` - Geometry of the listed regions
    ///
    /// # Returns
    /// The number of batches executed
    ///
    /// # Errors
    /// `RenderError::Unsupported` if the device cannot multidraw, or
    /// `RenderError::ResourceExhaustion` if the shared index buffer cannot grow
    pub fn render(
        &mut self,
        command_list: &mut dyn CommandList,
        lists: &SortedRenderLists,
        pass: TerrainRenderPass,
        camera: Point3<f32>,
        regions: &mut RenderRegionManager,
    ) -> RenderResult<usize> {
        let camera_block = Point3::new(camera.x.floor() as i32, camera.y.floor() as i32, camera.z.floor() as i32);
        let format = regions.pass_config().vertex_format(pass);
        let reverse = pass.is_reverse_order();
        let index_pointer_mask = if pass.is_sorted() {
            LOCAL_INDEX_POINTER_MASK
        } else {
            SHARED_INDEX_POINTER_MASK
        };

        let ordered: Vec<&ChunkRenderList> = if reverse {
            lists.iter_reversed().collect()
        } else {
            lists.iter().collect()
        };

        let mut batches = 0;
        for list in ordered {
            let Some(region) = regions.region_mut(list.region_key()) else {
                continue;
            };

            self.emitter.clear();
            self.fill_commands(region, list, pass, camera_block, reverse, index_pointer_mask);
            if self.emitter.is_empty() {
                continue;
            }

            let shared_index = if pass.is_sorted() {
                None
            } else {
                self.shared_indices
                    .ensure_capacity(command_list, self.emitter.index_buffer_size())?
            };
            let Some(tessellation) = region.tessellation(command_list, format, shared_index) else {
                continue;
            };

            self.emitter.execute_batch(command_list, &tessellation)?;
            batches += 1;
        }

        self.emitter.clear();
        Ok(batches)
    }

    fn fill_commands(
        &mut self,
        region: &RenderRegion,
        list: &ChunkRenderList,
        pass: TerrainRenderPass,
        camera_block: Point3<i32>,
        reverse: bool,
        index_pointer_mask: u64,
    ) {
        let Some(storage) = region.storage(pass) else {
            return;
        };

        let sections: Vec<usize> = if reverse {
            list.sections_reversed().collect()
        } else {
            list.sections().collect()
        };

        for section_index in sections {
            if !storage.has_vertex_data(section_index) {
                continue;
            }
            if pass.is_sorted() && !storage.has_index_data(section_index) {
                continue;
            }

            let mesh = storage.mesh_data(section_index);
            let mut mask = mesh.facing_mask;
            if self.use_block_face_culling {
                let min = section_origin(region.section_coordinates(section_index));
                let max = min + cgmath::Vector3::new(SECTION_SIZE, SECTION_SIZE, SECTION_SIZE);
                mask &= ModelQuadFacing::visible_mask(camera_block, min, max);
            }
            if mask == 0 {
                continue;
            }

            self.emitter.add_draw_commands(mesh, mask, index_pointer_mask);
        }
    }

    pub fn shared_index_buffer(&self) -> &SharedQuadIndexBuffer {
        &self.shared_indices
    }

    /// Releases the shared index buffer and any emitter resources.
    pub fn delete(&mut self, command_list: &mut dyn CommandList) {
        self.emitter.delete(command_list);
        self.shared_indices.delete(command_list);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rendering::compile::render_pass::RenderPassConfiguration;
    use crate::rendering::gpu::recording::{RecordedCommand, RecordingCommandList};
    use crate::rendering::occlusion::Viewport;
    use crate::rendering::section_manager::RenderSectionManager;
    use crate::world::block::BlockType;
    use crate::world::{GenerationMethod, World};

    fn draws(command_list: &RecordingCommandList) -> Vec<usize> {
        command_list
            .commands()
            .iter()
            .filter_map(|command| match command {
                RecordedCommand::MultiDrawElements { draws, .. } | RecordedCommand::MultiDrawIndirect { draws, .. } => {
                    Some(draws.len())
                }
                _ => None,
            })
            .collect()
    }

    fn built_scene(config: RendererConfig, blocks: &[(i32, i32, i32, BlockType)]) -> (RenderSectionManager, RecordingCommandList) {
        let mut world = World::new(GenerationMethod::Empty, 0);
        world.add_section_at(Point3::new(0, 0, 0));
        for &(x, y, z, block) in blocks {
            world.set_block(x, y, z, block);
        }

        let mut command_list = RecordingCommandList::new();
        let mut manager = RenderSectionManager::new(config, RenderPassConfiguration::default(), &mut command_list).unwrap();
        manager.update_camera(Point3::new(8.0, 8.0, 8.0));
        manager.on_section_added(&world, 0, 0, 0);
        let viewport = Viewport::unbounded(Point3::new(8.0, 8.0, 8.0));
        manager.create_render_lists(&viewport, 1, true);
        manager.update_chunks(&world, true);
        manager.upload_chunks(&mut command_list).unwrap();
        manager.create_render_lists(&viewport, 2, false);
        (manager, command_list)
    }

    fn config(use_block_face_culling: bool) -> RendererConfig {
        RendererConfig {
            chunk_builder_threads: 1,
            prefer_indirect_draw: false,
            use_block_face_culling,
            ..Default::default()
        }
    }

    #[test]
    fn quad_indices_repeat_per_quad() {
        let bytes = quad_index_bytes(2);
        let indices: Vec<u32> = bytes
            .chunks_exact(4)
            .map(|bytes| u32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
            .collect();
        assert_eq!(indices, vec![0, 1, 2, 2, 3, 0, 4, 5, 6, 6, 7, 4]);
    }

    #[test]
    fn shared_index_buffer_grows_to_powers_of_two() {
        let mut command_list = RecordingCommandList::new();
        let mut shared = SharedQuadIndexBuffer::new();

        assert_eq!(shared.ensure_capacity(&mut command_list, 0).unwrap(), None);
        let buffer = shared.ensure_capacity(&mut command_list, 18).unwrap().unwrap();
        assert_eq!(shared.max_quads(), 4);
        assert_eq!(command_list.buffer_contents(buffer).unwrap().len(), 4 * 6 * 4);

        shared.ensure_capacity(&mut command_list, 24).unwrap();
        assert_eq!(shared.max_quads(), 4);
        shared.ensure_capacity(&mut command_list, 25).unwrap();
        assert_eq!(shared.max_quads(), 8);

        shared.delete(&mut command_list);
        assert_eq!(command_list.buffer_contents(buffer), None);
    }

    #[test]
    fn solid_geometry_draws_one_batch_per_region() {
        let (mut manager, mut command_list) = built_scene(config(false), &[(4, 4, 4, BlockType::STONE)]);
        let mut renderer = ChunkRenderer::new(&command_list, manager.config());
        command_list.take_commands();

        let batches = manager
            .render_pass(&mut renderer, &mut command_list, TerrainRenderPass::Solid)
            .unwrap();
        assert_eq!(batches, 1);
        assert_eq!(draws(&command_list), vec![6]);
        assert_eq!(renderer.shared_index_buffer().max_quads(), 1);

        command_list.take_commands();
        let batches = manager
            .render_pass(&mut renderer, &mut command_list, TerrainRenderPass::Translucent)
            .unwrap();
        assert_eq!(batches, 0);
        assert!(draws(&command_list).is_empty());
    }

    #[test]
    fn face_culling_skips_facings_pointing_away() {
        let (mut manager, mut command_list) = built_scene(config(true), &[(4, 4, 4, BlockType::STONE)]);
        let mut renderer = ChunkRenderer::new(&command_list, manager.config());
        command_list.take_commands();

        manager
            .render_pass(&mut renderer, &mut command_list, TerrainRenderPass::Solid)
            .unwrap();
        assert_eq!(draws(&command_list), vec![6]);

        manager.update_camera(Point3::new(-20.0, 8.0, 8.0));
        command_list.take_commands();
        manager
            .render_pass(&mut renderer, &mut command_list, TerrainRenderPass::Solid)
            .unwrap();
        assert_eq!(draws(&command_list), vec![5]);
    }

    #[test]
    fn translucent_geometry_draws_from_its_own_indices() {
        let (mut manager, mut command_list) =
            built_scene(config(false), &[(1, 1, 1, BlockType::GLASS), (8, 1, 1, BlockType::GLASS)]);
        let mut renderer = ChunkRenderer::new(&command_list, manager.config());
        command_list.take_commands();

        let batches = manager
            .render_pass(&mut renderer, &mut command_list, TerrainRenderPass::Translucent)
            .unwrap();
        assert_eq!(batches, 1);
        assert_eq!(renderer.shared_index_buffer().max_quads(), 0);

        let counts: Vec<u32> = command_list
            .commands()
            .iter()
            .filter_map(|command| match command {
                RecordedCommand::MultiDrawElements { draws, .. } => Some(draws.iter().map(|draw| draw.count).sum()),
                _ => None,
            })
            .collect();
        assert_eq!(counts, vec![12 * 6]);
    }
}
