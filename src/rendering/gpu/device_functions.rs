//! Device capability detection and the strategy table resolved from it.

use crate::error::{RenderError, RenderResult};
use crate::rendering::multidraw::batch::MultiDrawBatch;

use super::{CommandList, GpuBuffer, IndexType, PrimitiveType};

/// Optional features of a graphics device.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DeviceCapabilities {
    /// Indexed draws accept a base vertex.
    pub base_vertex: bool,
    /// Many indexed draws can be submitted in one call.
    pub multi_draw: bool,
    /// Draw parameters can be sourced from a GPU buffer.
    pub indirect_draw: bool,
    /// Buffers can be copied on the device.
    pub copy_buffer: bool,
    /// Sub-ranges of a buffer can be mapped for writing.
    pub map_buffer_range: bool,
    /// Largest buffer the device will allocate, in bytes.
    pub max_buffer_size: u64,
}

impl DeviceCapabilities {
    /// A device supporting every optional feature.
    pub fn full() -> Self {
        Self {
            base_vertex: true,
            multi_draw: true,
            indirect_draw: true,
            copy_buffer: true,
            map_buffer_range: true,
            max_buffer_size: 1 << 30,
        }
    }

    /// Derives capabilities from a `wgpu` adapter.
    ///
    /// Multidraw is reported as supported because the wgpu backend records
    /// draws and replays them into a render pass, where each command becomes
    /// one `draw_indexed`. Uploads always go through `Queue::write_buffer`, so
    /// a staging buffer can be written at any offset.
    pub fn from_wgpu(downlevel: &wgpu::DownlevelCapabilities, limits: &wgpu::Limits) -> Self {
        Self {
            base_vertex: downlevel
                .flags
                .contains(wgpu::DownlevelFlags::BASE_VERTEX),
            multi_draw: true,
            indirect_draw: downlevel
                .flags
                .contains(wgpu::DownlevelFlags::INDIRECT_EXECUTION),
            copy_buffer: true,
            map_buffer_range: true,
            max_buffer_size: limits.max_buffer_size,
        }
    }
}

/// How bytes move between two device buffers.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BufferCopyFunctions {
    /// Device-side copy.
    Core,
    /// Read the source back to the CPU and write it into the destination.
    ReadBack,
}

impl BufferCopyFunctions {
    /// Copies `len` bytes from `src` to `dst`.
    pub fn copy(
        self,
        command_list: &mut dyn CommandList,
        src: GpuBuffer,
        dst: GpuBuffer,
        read_offset: u64,
        write_offset: u64,
        len: u64,
    ) -> RenderResult<()> {
        match self {
            BufferCopyFunctions::Core => {
                command_list.copy_buffer_sub_data(src, dst, read_offset, write_offset, len);
            }
            BufferCopyFunctions::ReadBack => {
                let bytes = command_list.read_buffer(src, read_offset, len)?;
                command_list.write_buffer(dst, write_offset, &bytes);
            }
        }
        Ok(())
    }
}

/// How a batch of indexed draws is submitted.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MultidrawFunctions {
    /// No base-vertex draws; the renderer cannot run.
    None,
    /// One draw per command, skipping empty ones.
    Fallback,
    /// Native multidraw.
    Core,
}

impl MultidrawFunctions {
    /// Submits the first `batch.size()` commands of `batch`.
    ///
    /// # Errors
    /// `RenderError::Unsupported` for [`MultidrawFunctions::None`]
    pub fn multi_draw_elements_base_vertex(
        self,
        command_list: &mut dyn CommandList,
        batch: &MultiDrawBatch,
        primitive: PrimitiveType,
        index_type: IndexType,
    ) -> RenderResult<()> {
        let size = batch.size();
        match self {
            MultidrawFunctions::None => {
                return Err(RenderError::Unsupported("indexed draws with a base vertex"));
            }
            MultidrawFunctions::Fallback => {
                for i in 0..size {
                    let count = batch.element_count()[i];
                    if count == 0 {
                        continue;
                    }
                    command_list.draw_elements_base_vertex(
                        primitive,
                        index_type,
                        count,
                        batch.element_pointer()[i],
                        batch.base_vertex()[i],
                    );
                }
            }
            MultidrawFunctions::Core => {
                command_list.multi_draw_elements_base_vertex(
                    primitive,
                    index_type,
                    &batch.element_count()[..size],
                    &batch.element_pointer()[..size],
                    &batch.base_vertex()[..size],
                );
            }
        }
        Ok(())
    }
}

/// How CPU data reaches device buffers.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BufferMapRangeFunctions {
    /// Sub-range mapping; a persistent staging buffer can be used.
    Core,
    /// Whole-buffer writes only.
    MapFullAndSlice,
}

/// Strategy table resolved once per device.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DeviceFunctions {
    /// Buffer-to-buffer copy strategy.
    pub buffer_copy: BufferCopyFunctions,
    /// Multidraw strategy.
    pub multidraw: MultidrawFunctions,
    /// Upload strategy.
    pub map_range: BufferMapRangeFunctions,
    /// Whether indirect draws are available.
    pub indirect_draw: bool,
}

impl DeviceFunctions {
    /// Picks the best strategy for every optional feature.
    pub fn resolve(capabilities: &DeviceCapabilities) -> Self {
        let multidraw = if !capabilities.base_vertex {
            MultidrawFunctions::None
        } else if capabilities.multi_draw {
            MultidrawFunctions::Core
        } else {
            MultidrawFunctions::Fallback
        };

        Self {
            buffer_copy: if capabilities.copy_buffer {
                BufferCopyFunctions::Core
            } else {
                BufferCopyFunctions::ReadBack
            },
            multidraw,
            map_range: if capabilities.map_buffer_range {
                BufferMapRangeFunctions::Core
            } else {
                BufferMapRangeFunctions::MapFullAndSlice
            },
            indirect_draw: capabilities.indirect_draw && capabilities.base_vertex,
        }
    }
}
