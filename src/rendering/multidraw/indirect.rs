use log::debug;

use crate::error::RenderResult;
use crate::rendering::gpu::{
    BufferTarget, BufferUsage, CommandList, GpuBuffer, IndexType, PrimitiveType, Tessellation,
};
use crate::rendering::region::storage::SectionMeshData;
use crate::world::facing::ModelQuadFacing;

use super::MAX_COMMAND_COUNT;

/// Layout of one indexed indirect draw as the device reads it.
///
/// # Memory Layout
/// Five tightly packed 32-bit fields, 20 bytes total.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct DrawElementsIndirectCommand {
    pub count: u32,
    pub instance_count: u32,
    /// Offset into the index buffer, in indices.
    pub first_index: u32,
    pub base_vertex: i32,
    pub base_instance: u32,
}

/// Collects draws into a device buffer and submits them in one indirect call.
pub struct IndirectMultiDrawEmitter {
    commands: Vec<DrawElementsIndirectCommand>,
    buffer: Option<GpuBuffer>,
}

impl IndirectMultiDrawEmitter {
    pub fn new() -> Self {
        Self {
            commands: Vec::with_capacity(MAX_COMMAND_COUNT),
            buffer: None,
        }
    }

    /// Adds one draw per facing set in `mask`.
    pub fn add_draw_commands(&mut self, mesh: &SectionMeshData, mask: u32, index_pointer_mask: u64) {
        let index_stride = IndexType::UnsignedInt.stride() as u64;
        for facing in 0..ModelQuadFacing::COUNT {
            if (mask >> facing) & 1 == 0 {
                continue;
            }
            self.commands.push(DrawElementsIndirectCommand {
                count: mesh.element_count[facing],
                instance_count: 1,
                first_index: ((mesh.index_offset[facing] & index_pointer_mask) / index_stride) as u32,
                base_vertex: mesh.vertex_offset[facing] as i32,
                base_instance: 0,
            });
        }
    }

    /// Uploads the collected commands and draws them.
    ///
    /// # Errors
    /// `RenderError::ResourceExhaustion` if the command buffer cannot be allocated
    pub fn execute_batch(
        &mut self,
        command_list: &mut dyn CommandList,
        tessellation: &Tessellation,
    ) -> RenderResult<()> {
        if self.commands.is_empty() {
            return Ok(());
        }

        let buffer = match self.buffer {
            Some(buffer) => buffer,
            None => {
                debug!("Allocating indirect draw buffer");
                let size = (MAX_COMMAND_COUNT * std::mem::size_of::<DrawElementsIndirectCommand>()) as u64;
                let buffer = command_list.create_buffer("Indirect Draw Commands", size, BufferUsage::StreamDraw)?;
                self.buffer = Some(buffer);
                buffer
            }
        };
        command_list.write_buffer(buffer, 0, bytemuck::cast_slice(&self.commands));
        command_list.bind_buffer(BufferTarget::DrawIndirectBuffer, Some(buffer));

        {
            let mut draw = command_list.begin_tessellating(tessellation);
            draw.multi_draw_elements_indirect(
                buffer,
                self.commands.len() as u32,
                PrimitiveType::Triangles,
                IndexType::UnsignedInt,
            );
        }

        command_list.bind_buffer(BufferTarget::DrawIndirectBuffer, None);
        Ok(())
    }

    pub fn commands(&self) -> &[DrawElementsIndirectCommand] {
        &self.commands
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn index_buffer_size(&self) -> u32 {
        self.commands.iter().map(|command| command.count).max().unwrap_or(0)
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }

    pub fn delete(&mut self, command_list: &mut dyn CommandList) {
        if let Some(buffer) = self.buffer.take() {
            command_list.delete_buffer(buffer);
        }
    }
}

impl Default for IndirectMultiDrawEmitter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_layout_is_twenty_bytes() {
        assert_eq!(std::mem::size_of::<DrawElementsIndirectCommand>(), 20);
    }
}
