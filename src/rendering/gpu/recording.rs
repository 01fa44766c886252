//! # Recording Command List
//!
//! A [`CommandList`] that keeps every buffer in CPU memory and records the
//! calls made against it. It backs the unit tests and the headless demo when
//! no adapter is available.
//!
//! Indirect draws are decoded from the indirect buffer at submission time so
//! the recorded command captures what the device would have drawn.

use std::collections::HashMap;

use log::trace;

use crate::error::{RenderError, RenderResult};
use crate::rendering::compile::render_pass::VertexFormat;
use crate::rendering::multidraw::indirect::DrawElementsIndirectCommand;

use super::device_functions::DeviceCapabilities;
use super::{BufferTarget, BufferUsage, CommandList, GpuBuffer, IndexType, PrimitiveType, Tessellation};

/// One indexed draw.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DrawCall {
    /// Number of indices.
    pub count: u32,
    /// Byte offset into the index buffer.
    pub index_offset: u64,
    /// Value added to every index.
    pub base_vertex: i32,
}

/// A call recorded by [`RecordingCommandList`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecordedCommand {
    BindBuffer {
        target: BufferTarget,
        buffer: Option<GpuBuffer>,
    },
    Upload {
        buffer: GpuBuffer,
        len: u64,
    },
    Write {
        buffer: GpuBuffer,
        offset: u64,
        len: u64,
    },
    Copy {
        src: GpuBuffer,
        dst: GpuBuffer,
        read_offset: u64,
        write_offset: u64,
        len: u64,
    },
    BindTessellation(u32),
    UnbindTessellation,
    DrawElements {
        tessellation: Option<u32>,
        draw: DrawCall,
    },
    MultiDrawElements {
        tessellation: Option<u32>,
        draws: Vec<DrawCall>,
    },
    MultiDrawIndirect {
        tessellation: Option<u32>,
        draws: Vec<DrawCall>,
    },
}

/// In-memory [`CommandList`].
pub struct RecordingCommandList {
    capabilities: DeviceCapabilities,
    buffers: HashMap<GpuBuffer, Vec<u8>>,
    tessellations: HashMap<u32, Tessellation>,
    bound_tessellation: Option<u32>,
    next_id: u32,
    memory_limit: u64,
    commands: Vec<RecordedCommand>,
}

impl RecordingCommandList {
    /// Creates a command list for a device supporting every feature.
    pub fn new() -> Self {
        Self::with_capabilities(DeviceCapabilities::full())
    }

    /// Creates a command list reporting the given capabilities.
    pub fn with_capabilities(capabilities: DeviceCapabilities) -> Self {
        Self {
            capabilities,
            buffers: HashMap::new(),
            tessellations: HashMap::new(),
            bound_tessellation: None,
            next_id: 1,
            memory_limit: u64::MAX,
            commands: Vec::new(),
        }
    }

    /// Caps the total bytes that may be allocated; further allocations fail
    /// with `RenderError::ResourceExhaustion`.
    pub fn with_memory_limit(mut self, limit: u64) -> Self {
        self.memory_limit = limit;
        self
    }

    /// Current bytes of a buffer.
    pub fn buffer_contents(&self, buffer: GpuBuffer) -> Option<&[u8]> {
        self.buffers.get(&buffer).map(Vec::as_slice)
    }

    /// Recorded calls since creation or the last [`Self::take_commands`].
    pub fn commands(&self) -> &[RecordedCommand] {
        &self.commands
    }

    /// Drains the recorded calls.
    pub fn take_commands(&mut self) -> Vec<RecordedCommand> {
        std::mem::take(&mut self.commands)
    }

    /// Number of buffers not yet deleted.
    pub fn live_buffer_count(&self) -> usize {
        self.buffers.len()
    }

    /// Number of tessellations not yet deleted.
    pub fn live_tessellation_count(&self) -> usize {
        self.tessellations.len()
    }

    /// Sum of all live buffer sizes.
    pub fn allocated_bytes(&self) -> u64 {
        self.buffers.values().map(|bytes| bytes.len() as u64).sum()
    }

    fn reserve(&self, label: &str, requested: u64, replacing: u64) -> RenderResult<()> {
        let total = self.allocated_bytes() - replacing + requested;
        if total > self.memory_limit || requested > self.capabilities.max_buffer_size {
            return Err(RenderError::ResourceExhaustion {
                label: label.to_string(),
                requested,
            });
        }
        Ok(())
    }

    fn buffer_mut(&mut self, buffer: GpuBuffer) -> &mut Vec<u8> {
        self.buffers
            .get_mut(&buffer)
            .unwrap_or_else(|| panic!("Use of deleted or unknown buffer {:?}", buffer))
    }
}

impl Default for RecordingCommandList {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandList for RecordingCommandList {
    fn capabilities(&self) -> DeviceCapabilities {
        self.capabilities
    }

    fn create_buffer(&mut self, label: &str, size: u64, _usage: BufferUsage) -> RenderResult<GpuBuffer> {
        self.reserve(label, size, 0)?;
        let buffer = GpuBuffer::from_id(self.next_id);
        self.next_id += 1;
        self.buffers.insert(buffer, vec![0; size as usize]);
        trace!("Created buffer {} ({}) with {} bytes", buffer.id(), label, size);
        Ok(buffer)
    }

    fn delete_buffer(&mut self, buffer: GpuBuffer) {
        self.buffers.remove(&buffer);
    }

    fn buffer_size(&self, buffer: GpuBuffer) -> u64 {
        self.buffers.get(&buffer).map_or(0, |bytes| bytes.len() as u64)
    }

    fn upload_data(&mut self, buffer: GpuBuffer, data: &[u8], _usage: BufferUsage) -> RenderResult<()> {
        let current = self.buffer_size(buffer);
        self.reserve("upload", data.len() as u64, current)?;
        let bytes = self.buffer_mut(buffer);
        bytes.clear();
        bytes.extend_from_slice(data);
        self.commands.push(RecordedCommand::Upload {
            buffer,
            len: data.len() as u64,
        });
        Ok(())
    }

    fn write_buffer(&mut self, buffer: GpuBuffer, offset: u64, data: &[u8]) {
        let bytes = self.buffer_mut(buffer);
        let start = offset as usize;
        let end = start + data.len();
        if end > bytes.len() {
            panic!("Buffer write out of bounds for buffer {:?}", buffer);
        }
        bytes[start..end].copy_from_slice(data);
        self.commands.push(RecordedCommand::Write {
            buffer,
            offset,
            len: data.len() as u64,
        });
    }

    fn copy_buffer_sub_data(
        &mut self,
        src: GpuBuffer,
        dst: GpuBuffer,
        read_offset: u64,
        write_offset: u64,
        len: u64,
    ) {
        let source = self.buffer_mut(src)[read_offset as usize..(read_offset + len) as usize].to_vec();
        let destination = self.buffer_mut(dst);
        destination[write_offset as usize..(write_offset + len) as usize].copy_from_slice(&source);
        self.commands.push(RecordedCommand::Copy {
            src,
            dst,
            read_offset,
            write_offset,
            len,
        });
    }

    fn read_buffer(&mut self, buffer: GpuBuffer, offset: u64, len: u64) -> RenderResult<Vec<u8>> {
        Ok(self.buffer_mut(buffer)[offset as usize..(offset + len) as usize].to_vec())
    }

    fn bind_buffer(&mut self, target: BufferTarget, buffer: Option<GpuBuffer>) {
        self.commands.push(RecordedCommand::BindBuffer { target, buffer });
    }

    fn create_tessellation(
        &mut self,
        format: VertexFormat,
        vertex_buffer: GpuBuffer,
        index_buffer: GpuBuffer,
    ) -> Tessellation {
        let tessellation = Tessellation {
            id: self.next_id,
            vertex_buffer,
            index_buffer,
            format,
        };
        self.next_id += 1;
        self.tessellations.insert(tessellation.id, tessellation);
        tessellation
    }

    fn delete_tessellation(&mut self, tessellation: Tessellation) {
        self.tessellations.remove(&tessellation.id);
    }

    fn bind_tessellation(&mut self, tessellation: &Tessellation) {
        self.bound_tessellation = Some(tessellation.id);
        self.commands.push(RecordedCommand::BindTessellation(tessellation.id));
    }

    fn unbind_tessellation(&mut self) {
        self.bound_tessellation = None;
        self.commands.push(RecordedCommand::UnbindTessellation);
    }

    fn draw_elements_base_vertex(
        &mut self,
        _primitive: PrimitiveType,
        _index_type: IndexType,
        count: u32,
        index_offset: u64,
        base_vertex: i32,
    ) {
        self.commands.push(RecordedCommand::DrawElements {
            tessellation: self.bound_tessellation,
            draw: DrawCall {
                count,
                index_offset,
                base_vertex,
            },
        });
    }

    fn multi_draw_elements_base_vertex(
        &mut self,
        _primitive: PrimitiveType,
        _index_type: IndexType,
        counts: &[u32],
        index_offsets: &[u64],
        base_vertices: &[i32],
    ) {
        let draws = counts
            .iter()
            .zip(index_offsets)
            .zip(base_vertices)
            .map(|((&count, &index_offset), &base_vertex)| DrawCall {
                count,
                index_offset,
                base_vertex,
            })
            .collect();
        self.commands.push(RecordedCommand::MultiDrawElements {
            tessellation: self.bound_tessellation,
            draws,
        });
    }

    fn multi_draw_elements_indirect(
        &mut self,
        indirect_buffer: GpuBuffer,
        command_count: u32,
        _primitive: PrimitiveType,
        index_type: IndexType,
    ) {
        let stride = std::mem::size_of::<DrawElementsIndirectCommand>();
        let bytes = self.buffer_mut(indirect_buffer);
        let draws = bytes
            .chunks_exact(stride)
            .take(command_count as usize)
            .map(|chunk| {
                let command: DrawElementsIndirectCommand = bytemuck::pod_read_unaligned(chunk);
                DrawCall {
                    count: command.count,
                    index_offset: command.first_index as u64 * index_type.stride() as u64,
                    base_vertex: command.base_vertex,
                }
            })
            .collect();
        self.commands.push(RecordedCommand::MultiDrawIndirect {
            tessellation: self.bound_tessellation,
            draws,
        });
    }

    fn flush(&mut self) {}
}
