//! # wgpu Backend
//!
//! Maps the [`CommandList`] surface onto a `wgpu` device.
//!
//! ## Architecture
//!
//! Buffers live in a registry keyed by [`GpuBuffer`] handles, each paired with
//! usage analytics (allocated bytes, bytes written, write count). Writes are
//! bounds-checked before they reach the queue.
//!
//! `wgpu` draws can only be issued inside a render pass, which borrows the
//! buffers it references. Draw calls are therefore recorded into a pending
//! list and replayed by [`WgpuCommandList::encode_draws`] once the host has
//! opened its pass.
//!
//! ## Performance Considerations
//!
//! * Every buffer carries `VERTEX | INDEX | INDIRECT | COPY_SRC | COPY_DST`
//!   so an arena buffer can be grown by a device-side copy
//! * Buffer-to-buffer copies are submitted immediately to keep their order
//!   relative to `Queue::write_buffer`
//! * Allocation failures are caught through an out-of-memory error scope

use std::collections::HashMap;

use log::{debug, info};

use crate::error::{RenderError, RenderResult};
use crate::rendering::compile::render_pass::VertexFormat;

use super::device_functions::DeviceCapabilities;
use super::recording::DrawCall;
use super::{BufferTarget, BufferUsage, CommandList, GpuBuffer, IndexType, PrimitiveType, Tessellation};

/// Usage statistics for one device buffer.
#[derive(Debug, Default, Clone, Copy)]
pub struct BufferAnalytics {
    /// Bytes allocated on the device.
    pub allocated_memory: u64,
    /// Highest byte written so far.
    pub used_memory: u64,
    /// Number of writes.
    pub times_written: u64,
}

struct BufferEntry {
    label: String,
    buffer: wgpu::Buffer,
    analytics: BufferAnalytics,
}

enum PendingDraw {
    Indexed {
        tessellation: Tessellation,
        draw: DrawCall,
    },
    Indirect {
        tessellation: Tessellation,
        indirect_buffer: GpuBuffer,
        command_count: u32,
    },
}

/// [`CommandList`] backed by a `wgpu` device and queue.
pub struct WgpuCommandList {
    device: wgpu::Device,
    queue: wgpu::Queue,
    capabilities: DeviceCapabilities,
    buffers: HashMap<GpuBuffer, BufferEntry>,
    tessellations: HashMap<u32, Tessellation>,
    bound_tessellation: Option<Tessellation>,
    pending_draws: Vec<PendingDraw>,
    next_id: u32,
}

const BUFFER_USAGES: wgpu::BufferUsages = wgpu::BufferUsages::VERTEX
    .union(wgpu::BufferUsages::INDEX)
    .union(wgpu::BufferUsages::INDIRECT)
    .union(wgpu::BufferUsages::COPY_SRC)
    .union(wgpu::BufferUsages::COPY_DST);

#[inline]
fn align_size(size: u64) -> u64 {
    size.max(wgpu::COPY_BUFFER_ALIGNMENT)
        .div_ceil(wgpu::COPY_BUFFER_ALIGNMENT)
        * wgpu::COPY_BUFFER_ALIGNMENT
}

impl WgpuCommandList {
    /// Wraps an existing device and queue.
    ///
    /// # Arguments
    /// * `device` - The GPU device
    /// * `queue` - The GPU command queue
    /// * `capabilities` - Features reported by the adapter the device came from
    pub fn new(device: wgpu::Device, queue: wgpu::Queue, capabilities: DeviceCapabilities) -> Self {
        Self {
            device,
            queue,
            capabilities,
            buffers: HashMap::new(),
            tessellations: HashMap::new(),
            bound_tessellation: None,
            pending_draws: Vec::new(),
            next_id: 1,
        }
    }

    /// Requests a device from the first available adapter, without a surface.
    ///
    /// # Errors
    /// `RenderError::Unsupported` when no adapter or device is available
    pub async fn headless() -> RenderResult<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            flags: wgpu::InstanceFlags::empty(),
            backend_options: wgpu::BackendOptions::from_env_or_default(),
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|_| RenderError::Unsupported("a graphics adapter"))?;

        let capabilities =
            DeviceCapabilities::from_wgpu(&adapter.get_downlevel_capabilities(), &adapter.limits());
        info!("Using adapter {:?}", adapter.get_info().name);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                required_features: wgpu::Features::empty(),
                required_limits: adapter.limits(),
                label: Some("Section Renderer Device"),
                memory_hints: wgpu::MemoryHints::MemoryUsage,
                trace: wgpu::Trace::Off,
            })
            .await
            .map_err(|_| RenderError::Unsupported("a graphics device"))?;

        Ok(Self::new(device, queue, capabilities))
    }

    /// The wrapped device.
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    /// Analytics for a buffer.
    pub fn buffer_analytics(&self, buffer: GpuBuffer) -> Option<BufferAnalytics> {
        self.buffers.get(&buffer).map(|entry| entry.analytics)
    }

    /// Total bytes allocated across all live buffers.
    pub fn allocated_memory(&self) -> u64 {
        self.buffers
            .values()
            .map(|entry| entry.analytics.allocated_memory)
            .sum()
    }

    /// Number of draws waiting for [`Self::encode_draws`].
    pub fn pending_draw_count(&self) -> usize {
        self.pending_draws.len()
    }

    /// Replays every recorded draw into `pass` and clears the pending list.
    ///
    /// The pass must already have a pipeline whose vertex layout matches the
    /// tessellations' formats.
    pub fn encode_draws(&mut self, pass: &mut wgpu::RenderPass<'_>) {
        for pending in self.pending_draws.drain(..) {
            let tessellation = match &pending {
                PendingDraw::Indexed { tessellation, .. } => tessellation,
                PendingDraw::Indirect { tessellation, .. } => tessellation,
            };
            let (Some(vertices), Some(indices)) = (
                self.buffers.get(&tessellation.vertex_buffer),
                self.buffers.get(&tessellation.index_buffer),
            ) else {
                continue;
            };
            pass.set_vertex_buffer(0, vertices.buffer.slice(..));
            pass.set_index_buffer(indices.buffer.slice(..), wgpu::IndexFormat::Uint32);

            match pending {
                PendingDraw::Indexed { draw, .. } => {
                    let first = (draw.index_offset / IndexType::UnsignedInt.stride() as u64) as u32;
                    pass.draw_indexed(first..first + draw.count, draw.base_vertex, 0..1);
                }
                PendingDraw::Indirect {
                    indirect_buffer,
                    command_count,
                    ..
                } => {
                    if let Some(entry) = self.buffers.get(&indirect_buffer) {
                        pass.multi_draw_indexed_indirect(&entry.buffer, 0, command_count);
                    }
                }
            }
        }
    }

    fn allocate(&self, label: &str, size: u64) -> RenderResult<wgpu::Buffer> {
        let size = align_size(size);
        if size > self.capabilities.max_buffer_size {
            return Err(RenderError::ResourceExhaustion {
                label: label.to_string(),
                requested: size,
            });
        }

        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage: BUFFER_USAGES,
            mapped_at_creation: false,
        });
        if pollster::block_on(self.device.pop_error_scope()).is_some() {
            return Err(RenderError::ResourceExhaustion {
                label: label.to_string(),
                requested: size,
            });
        }
        Ok(buffer)
    }

    fn entry(&self, buffer: GpuBuffer) -> &BufferEntry {
        self.buffers
            .get(&buffer)
            .unwrap_or_else(|| panic!("Use of deleted or unknown buffer {:?}", buffer))
    }

    fn submit_copy(&self, src: &wgpu::Buffer, dst: &wgpu::Buffer, read_offset: u64, write_offset: u64, len: u64) {
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Buffer Copy Encoder"),
            });
        encoder.copy_buffer_to_buffer(src, read_offset, dst, write_offset, len);
        self.queue.submit(Some(encoder.finish()));
    }
}

impl CommandList for WgpuCommandList {
    fn capabilities(&self) -> DeviceCapabilities {
        self.capabilities
    }

    fn create_buffer(&mut self, label: &str, size: u64, _usage: BufferUsage) -> RenderResult<GpuBuffer> {
        let buffer = self.allocate(label, size)?;
        let handle = GpuBuffer::from_id(self.next_id);
        self.next_id += 1;
        debug!("Allocated buffer '{}' with {} bytes", label, buffer.size());

        self.buffers.insert(
            handle,
            BufferEntry {
                label: label.to_string(),
                analytics: BufferAnalytics {
                    allocated_memory: buffer.size(),
                    ..Default::default()
                },
                buffer,
            },
        );
        Ok(handle)
    }

    fn delete_buffer(&mut self, buffer: GpuBuffer) {
        if let Some(entry) = self.buffers.remove(&buffer) {
            entry.buffer.destroy();
        }
    }

    fn buffer_size(&self, buffer: GpuBuffer) -> u64 {
        self.buffers
            .get(&buffer)
            .map_or(0, |entry| entry.analytics.allocated_memory)
    }

    fn upload_data(&mut self, buffer: GpuBuffer, data: &[u8], _usage: BufferUsage) -> RenderResult<()> {
        let size = align_size(data.len() as u64);
        if self.entry(buffer).analytics.allocated_memory != size {
            let label = self.entry(buffer).label.clone();
            let replacement = self.allocate(&label, size)?;
            if let Some(entry) = self.buffers.get_mut(&buffer) {
                entry.buffer.destroy();
                entry.buffer = replacement;
                entry.analytics = BufferAnalytics {
                    allocated_memory: size,
                    ..Default::default()
                };
            }
        }
        if !data.is_empty() {
            self.write_buffer(buffer, 0, data);
        }
        Ok(())
    }

    fn write_buffer(&mut self, buffer: GpuBuffer, offset: u64, data: &[u8]) {
        let entry = self
            .buffers
            .get_mut(&buffer)
            .unwrap_or_else(|| panic!("Use of deleted or unknown buffer {:?}", buffer));
        let data_size = data.len() as u64;
        if offset + data_size > entry.analytics.allocated_memory {
            panic!("Buffer write out of bounds for buffer '{}'", entry.label);
        }

        if data_size % wgpu::COPY_BUFFER_ALIGNMENT == 0 {
            self.queue.write_buffer(&entry.buffer, offset, data);
        } else {
            let mut padded = data.to_vec();
            padded.resize(align_size(data_size) as usize, 0);
            self.queue.write_buffer(&entry.buffer, offset, &padded);
        }
        entry.analytics.used_memory = entry.analytics.used_memory.max(offset + data_size);
        entry.analytics.times_written += 1;
    }

    fn copy_buffer_sub_data(
        &mut self,
        src: GpuBuffer,
        dst: GpuBuffer,
        read_offset: u64,
        write_offset: u64,
        len: u64,
    ) {
        let source = &self.entry(src).buffer;
        let destination = &self.entry(dst).buffer;
        self.submit_copy(source, destination, read_offset, write_offset, len);
    }

    fn read_buffer(&mut self, buffer: GpuBuffer, offset: u64, len: u64) -> RenderResult<Vec<u8>> {
        let size = align_size(len);
        let readback = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Read Back Buffer"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        self.submit_copy(&self.entry(buffer).buffer, &readback, offset, 0, size);

        let (sender, receiver) = crossbeam_channel::bounded(1);
        let slice = readback.slice(..);
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.device
            .poll(wgpu::PollType::Wait)
            .map_err(|error| RenderError::Device(error.to_string()))?;
        receiver
            .recv()
            .map_err(|error| RenderError::Device(error.to_string()))?
            .map_err(|error| RenderError::Device(error.to_string()))?;

        let bytes = slice.get_mapped_range()[..len as usize].to_vec();
        readback.unmap();
        Ok(bytes)
    }

    fn bind_buffer(&mut self, _target: BufferTarget, _buffer: Option<GpuBuffer>) {
        // Bindings are resolved per draw in `encode_draws`.
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
        self.bound_tessellation = Some(*tessellation);
    }

    fn unbind_tessellation(&mut self) {
        self.bound_tessellation = None;
    }

    fn draw_elements_base_vertex(
        &mut self,
        _primitive: PrimitiveType,
        _index_type: IndexType,
        count: u32,
        index_offset: u64,
        base_vertex: i32,
    ) {
        if let Some(tessellation) = self.bound_tessellation {
            self.pending_draws.push(PendingDraw::Indexed {
                tessellation,
                draw: DrawCall {
                    count,
                    index_offset,
                    base_vertex,
                },
            });
        }
    }

    fn multi_draw_elements_base_vertex(
        &mut self,
        primitive: PrimitiveType,
        index_type: IndexType,
        counts: &[u32],
        index_offsets: &[u64],
        base_vertices: &[i32],
    ) {
        for ((&count, &index_offset), &base_vertex) in counts.iter().zip(index_offsets).zip(base_vertices) {
            if count > 0 {
                self.draw_elements_base_vertex(primitive, index_type, count, index_offset, base_vertex);
            }
        }
    }

    fn multi_draw_elements_indirect(
        &mut self,
        indirect_buffer: GpuBuffer,
        command_count: u32,
        _primitive: PrimitiveType,
        _index_type: IndexType,
    ) {
        if let Some(tessellation) = self.bound_tessellation {
            self.pending_draws.push(PendingDraw::Indirect {
                tessellation,
                indirect_buffer,
                command_count,
            });
        }
    }

    fn flush(&mut self) {
        self.queue.submit(std::iter::empty());
    }
}
