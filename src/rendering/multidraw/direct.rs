use crate::error::RenderResult;
use crate::rendering::gpu::{CommandList, IndexType, PrimitiveType, Tessellation};
use crate::rendering::region::storage::SectionMeshData;
use crate::world::facing::ModelQuadFacing;

use super::batch::MultiDrawBatch;
use super::MAX_COMMAND_COUNT;

/// Collects draws into CPU arrays and submits them through the device's
/// base-vertex multidraw strategy.
pub struct DirectMultiDrawEmitter {
    batch: MultiDrawBatch,
}

impl DirectMultiDrawEmitter {
    pub fn new() -> Self {
        Self {
            batch: MultiDrawBatch::new(MAX_COMMAND_COUNT),
        }
    }

    /// Adds one draw per facing set in `mask`.
    ///
    /// Every facing is written; the size only advances for facings in the
    /// mask, so unmasked slots are overwritten by the next write.
    pub fn add_draw_commands(&mut self, mesh: &SectionMeshData, mask: u32, index_pointer_mask: u64) {
        for facing in 0..ModelQuadFacing::COUNT {
            self.batch.write(
                mesh.index_offset[facing] & index_pointer_mask,
                mesh.element_count[facing],
                mesh.vertex_offset[facing] as i32,
                (mask >> facing) & 1 != 0,
            );
        }
    }

    pub fn execute_batch(
        &mut self,
        command_list: &mut dyn CommandList,
        tessellation: &Tessellation,
    ) -> RenderResult<()> {
        if self.batch.is_empty() {
            return Ok(());
        }
        let mut draw = command_list.begin_tessellating(tessellation);
        draw.multi_draw_elements_base_vertex(&self.batch, PrimitiveType::Triangles, IndexType::UnsignedInt)
    }

    pub fn batch(&self) -> &MultiDrawBatch {
        &self.batch
    }

    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }

    pub fn index_buffer_size(&self) -> u32 {
        self.batch.max_element_count()
    }

    pub fn clear(&mut self) {
        self.batch.clear();
    }
}

impl Default for DirectMultiDrawEmitter {
    fn default() -> Self {
        Self::new()
    }
}
