//! # Multidraw Emission
//!
//! Turns the per-facing draw data of the sections in one render list into a
//! single multidraw call per region.
//!
//! ## Strategies
//!
//! * [`direct::DirectMultiDrawEmitter`] - CPU arrays submitted through the
//!   device's base-vertex multidraw strategy
//! * [`indirect::IndirectMultiDrawEmitter`] - Commands written to a device
//!   buffer and submitted with one indirect draw
//!
//! The strategy is picked once per device by [`MultiDrawEmitter::for_device`].
//! A batch never holds more than one region, so [`MAX_COMMAND_COUNT`] bounds
//! it without runtime checks.

pub mod batch;
pub mod direct;
pub mod indirect;

use crate::error::RenderResult;
use crate::rendering::gpu::device_functions::DeviceFunctions;
use crate::rendering::gpu::{CommandList, Tessellation};
use crate::rendering::region::storage::SectionMeshData;
use crate::rendering::region::REGION_SIZE;
use crate::world::facing::ModelQuadFacing;

use direct::DirectMultiDrawEmitter;
use indirect::IndirectMultiDrawEmitter;

/// Facings per section times sections per region, plus one slot for the
/// trailing unconditional write of the direct emitter.
pub const MAX_COMMAND_COUNT: usize = ModelQuadFacing::COUNT * REGION_SIZE + 1;

/// Index pointer mask for sections drawing from their own index data.
pub const LOCAL_INDEX_POINTER_MASK: u64 = u64::MAX;
/// Index pointer mask for sections drawing from the shared quad index buffer.
pub const SHARED_INDEX_POINTER_MASK: u64 = 0;

/// Multidraw strategy resolved for a device.
pub enum MultiDrawEmitter {
    Direct(DirectMultiDrawEmitter),
    Indirect(IndirectMultiDrawEmitter),
}

impl MultiDrawEmitter {
    /// Picks the indirect emitter when it is preferred and supported.
    pub fn for_device(functions: &DeviceFunctions, prefer_indirect: bool) -> Self {
        if prefer_indirect && functions.indirect_draw {
            MultiDrawEmitter::Indirect(IndirectMultiDrawEmitter::new())
        } else {
            MultiDrawEmitter::Direct(DirectMultiDrawEmitter::new())
        }
    }

    /// Adds the draws of one section.
    ///
    /// # Arguments
    /// * `mesh` - Draw data of the section in the current pass
    /// * `mask` - Facings to draw
    /// * `index_pointer_mask` - [`LOCAL_INDEX_POINTER_MASK`] or [`SHARED_INDEX_POINTER_MASK`]
    #[inline]
    pub fn add_draw_commands(&mut self, mesh: &SectionMeshData, mask: u32, index_pointer_mask: u64) {
        match self {
            MultiDrawEmitter::Direct(emitter) => emitter.add_draw_commands(mesh, mask, index_pointer_mask),
            MultiDrawEmitter::Indirect(emitter) => emitter.add_draw_commands(mesh, mask, index_pointer_mask),
        }
    }

    /// Draws everything collected since the last [`Self::clear`].
    pub fn execute_batch(
        &mut self,
        command_list: &mut dyn CommandList,
        tessellation: &Tessellation,
    ) -> RenderResult<()> {
        match self {
            MultiDrawEmitter::Direct(emitter) => emitter.execute_batch(command_list, tessellation),
            MultiDrawEmitter::Indirect(emitter) => emitter.execute_batch(command_list, tessellation),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            MultiDrawEmitter::Direct(emitter) => emitter.is_empty(),
            MultiDrawEmitter::Indirect(emitter) => emitter.is_empty(),
        }
    }

    /// Largest index count of any collected draw; the shared quad index
    /// buffer must hold at least this many indices.
    pub fn index_buffer_size(&self) -> u32 {
        match self {
            MultiDrawEmitter::Direct(emitter) => emitter.index_buffer_size(),
            MultiDrawEmitter::Indirect(emitter) => emitter.index_buffer_size(),
        }
    }

    pub fn clear(&mut self) {
        match self {
            MultiDrawEmitter::Direct(emitter) => emitter.clear(),
            MultiDrawEmitter::Indirect(emitter) => emitter.clear(),
        }
    }

    /// Releases device resources held by the emitter.
    pub fn delete(&mut self, command_list: &mut dyn CommandList) {
        match self {
            MultiDrawEmitter::Direct(_) => {}
            MultiDrawEmitter::Indirect(emitter) => emitter.delete(command_list),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rendering::compile::render_pass::{RenderPassConfiguration, TerrainRenderPass};
    use crate::rendering::gpu::device_functions::DeviceCapabilities;
    use crate::rendering::gpu::recording::{DrawCall, RecordedCommand, RecordingCommandList};
    use crate::rendering::gpu::BufferUsage;

    fn mesh() -> SectionMeshData {
        let mut mesh = SectionMeshData::default();
        let up = ModelQuadFacing::PosY.index();
        let down = ModelQuadFacing::NegY.index();
        mesh.facing_mask = ModelQuadFacing::PosY.bit() | ModelQuadFacing::NegY.bit();
        mesh.vertex_offset[up] = 100;
        mesh.element_count[up] = 12;
        mesh.index_offset[up] = 400;
        mesh.vertex_offset[down] = 108;
        mesh.element_count[down] = 6;
        mesh.index_offset[down] = 448;
        mesh
    }

    fn tessellation(command_list: &mut RecordingCommandList) -> Tessellation {
        let format = RenderPassConfiguration::default().vertex_format(TerrainRenderPass::Solid);
        let vertices = command_list.create_buffer("v", 64, BufferUsage::StaticDraw).unwrap();
        let indices = command_list.create_buffer("i", 64, BufferUsage::StaticDraw).unwrap();
        command_list.create_tessellation(format, vertices, indices)
    }

    fn drawn(command_list: &RecordingCommandList) -> Vec<DrawCall> {
        command_list
            .commands()
            .iter()
            .find_map(|command| match command {
                RecordedCommand::MultiDrawElements { draws, .. }
                | RecordedCommand::MultiDrawIndirect { draws, .. } => Some(draws.clone()),
                _ => None,
            })
            .unwrap()
    }

    fn emit(indirect: bool, mask: u32, index_pointer_mask: u64) -> (Vec<DrawCall>, u32) {
        let mut command_list = RecordingCommandList::new();
        let tessellation = tessellation(&mut command_list);
        let functions = command_list.device_functions();
        let mut emitter = MultiDrawEmitter::for_device(&functions, indirect);
        assert_eq!(matches!(emitter, MultiDrawEmitter::Indirect(_)), indirect);

        emitter.add_draw_commands(&mesh(), mask, index_pointer_mask);
        let size = emitter.index_buffer_size();
        emitter.execute_batch(&mut command_list, &tessellation).unwrap();
        emitter.clear();
        assert!(emitter.is_empty());
        emitter.delete(&mut command_list);
        (drawn(&command_list), size)
    }

    #[test]
    fn both_emitters_draw_the_masked_facings() {
        let mask = ModelQuadFacing::PosY.bit() | ModelQuadFacing::NegY.bit();
        let expected = vec![
            DrawCall {
                count: 12,
                index_offset: 400,
                base_vertex: 100,
            },
            DrawCall {
                count: 6,
                index_offset: 448,
                base_vertex: 108,
            },
        ];

        for indirect in [false, true] {
            let (draws, size) = emit(indirect, mask, LOCAL_INDEX_POINTER_MASK);
            assert_eq!(draws, expected);
            assert_eq!(size, 12);
        }
    }

    #[test]
    fn culled_facings_and_shared_indices() {
        for indirect in [false, true] {
            let (draws, _) = emit(indirect, ModelQuadFacing::NegY.bit(), SHARED_INDEX_POINTER_MASK);
            assert_eq!(
                draws,
                vec![DrawCall {
                    count: 6,
                    index_offset: 0,
                    base_vertex: 108,
                }]
            );
        }
    }

    #[test]
    fn indirect_is_not_used_without_device_support() {
        let capabilities = DeviceCapabilities {
            indirect_draw: false,
            ..DeviceCapabilities::full()
        };
        let emitter = MultiDrawEmitter::for_device(&DeviceFunctions::resolve(&capabilities), true);
        assert!(matches!(emitter, MultiDrawEmitter::Direct(_)));
    }

    #[test]
    fn a_full_region_fits_in_one_batch() {
        let mut emitter = DirectMultiDrawEmitter::new();
        let mut mesh = SectionMeshData::default();
        mesh.element_count = [6; ModelQuadFacing::COUNT];
        for _ in 0..REGION_SIZE {
            emitter.add_draw_commands(&mesh, ModelQuadFacing::ALL_MASK, LOCAL_INDEX_POINTER_MASK);
        }
        assert_eq!(emitter.batch().size(), MAX_COMMAND_COUNT - 1);
    }
}
