//! # GPU Command Surface
//!
//! The renderer never talks to a graphics API directly. Everything it needs
//! from the device goes through the [`CommandList`] trait: buffer creation and
//! uploads, buffer-to-buffer copies, binding, tessellation (vertex + index
//! buffer pairs) and three draw primitives.
//!
//! ## Implementations
//!
//! * [`recording::RecordingCommandList`] keeps buffers in CPU memory and
//!   records every call. Tests and the headless demo use it.
//! * [`wgpu_backend::WgpuCommandList`] maps the surface onto a `wgpu` device
//!   and replays recorded draws into a render pass.
//!
//! ## Capability Strategies
//!
//! Optional hardware features are resolved once into
//! [`device_functions::DeviceFunctions`]; [`DrawCommandList`] consults that
//! table instead of re-checking capabilities per draw.

pub mod device_functions;
pub mod recording;
pub mod staging_buffer;
pub mod wgpu_backend;

use crate::error::RenderResult;
use crate::rendering::compile::render_pass::VertexFormat;
use crate::rendering::multidraw::batch::MultiDrawBatch;
use device_functions::{DeviceCapabilities, DeviceFunctions, MultidrawFunctions};

/// Opaque handle to a GPU buffer owned by a [`CommandList`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GpuBuffer(u32);

impl GpuBuffer {
    /// Wraps a backend-specific id.
    pub fn from_id(id: u32) -> Self {
        Self(id)
    }

    /// Backend-specific id.
    pub fn id(self) -> u32 {
        self.0
    }
}

/// Expected update frequency of a buffer.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BufferUsage {
    /// Written rarely, drawn often.
    StaticDraw,
    /// Rewritten every frame.
    StreamDraw,
    /// CPU-written staging memory that is copied into other buffers.
    StagingCopy,
}

/// Binding points a buffer can be attached to.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BufferTarget {
    /// Vertex data.
    ArrayBuffer,
    /// Index data.
    ElementArrayBuffer,
    /// Indirect draw commands.
    DrawIndirectBuffer,
}

/// Primitive topology of a draw.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum PrimitiveType {
    /// Independent triangles.
    Triangles,
}

/// Index element type of a draw.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum IndexType {
    /// 32-bit indices.
    UnsignedInt,
}

impl IndexType {
    /// Size of one index in bytes.
    pub fn stride(self) -> u32 {
        match self {
            IndexType::UnsignedInt => 4,
        }
    }
}

/// A vertex buffer paired with an index buffer and a vertex format.
///
/// Tessellations capture buffer handles, so they must be recreated whenever
/// either buffer is reallocated.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Tessellation {
    /// Backend-specific id.
    pub id: u32,
    /// Vertex buffer.
    pub vertex_buffer: GpuBuffer,
    /// Index buffer.
    pub index_buffer: GpuBuffer,
    /// Layout of the vertex buffer.
    pub format: VertexFormat,
}

/// The capability surface the renderer consumes from the graphics device.
pub trait CommandList {
    /// Optional features the device supports.
    fn capabilities(&self) -> DeviceCapabilities;

    /// Strategy table resolved from [`CommandList::capabilities`].
    fn device_functions(&self) -> DeviceFunctions {
        DeviceFunctions::resolve(&self.capabilities())
    }

    /// Allocates a zero-initialized buffer.
    ///
    /// # Errors
    /// `RenderError::ResourceExhaustion` when the device is out of memory
    fn create_buffer(&mut self, label: &str, size: u64, usage: BufferUsage) -> RenderResult<GpuBuffer>;

    /// Releases a buffer. The handle must not be used afterwards.
    fn delete_buffer(&mut self, buffer: GpuBuffer);

    /// Current size of a buffer in bytes.
    fn buffer_size(&self, buffer: GpuBuffer) -> u64;

    /// Replaces the whole contents of a buffer, reallocating it to `data.len()`
    /// bytes when the size differs.
    fn upload_data(&mut self, buffer: GpuBuffer, data: &[u8], usage: BufferUsage) -> RenderResult<()>;

    /// Writes `data` at `offset` without reallocating.
    fn write_buffer(&mut self, buffer: GpuBuffer, offset: u64, data: &[u8]);

    /// Copies a byte range between two buffers on the device.
    fn copy_buffer_sub_data(
        &mut self,
        src: GpuBuffer,
        dst: GpuBuffer,
        read_offset: u64,
        write_offset: u64,
        len: u64,
    );

    /// Reads a byte range back to the CPU. Used by the read-back copy strategy.
    fn read_buffer(&mut self, buffer: GpuBuffer, offset: u64, len: u64) -> RenderResult<Vec<u8>>;

    /// Binds a buffer to a target, or unbinds the target with `None`.
    fn bind_buffer(&mut self, target: BufferTarget, buffer: Option<GpuBuffer>);

    /// Creates a tessellation over a vertex and index buffer.
    fn create_tessellation(
        &mut self,
        format: VertexFormat,
        vertex_buffer: GpuBuffer,
        index_buffer: GpuBuffer,
    ) -> Tessellation;

    /// Releases a tessellation. The buffers it references are not affected.
    fn delete_tessellation(&mut self, tessellation: Tessellation);

    /// Makes a tessellation the target of subsequent draws.
    fn bind_tessellation(&mut self, tessellation: &Tessellation);

    /// Clears the bound tessellation.
    fn unbind_tessellation(&mut self);

    /// Draws one indexed range.
    fn draw_elements_base_vertex(
        &mut self,
        primitive: PrimitiveType,
        index_type: IndexType,
        count: u32,
        index_offset: u64,
        base_vertex: i32,
    );

    /// Draws many indexed ranges in one call.
    fn multi_draw_elements_base_vertex(
        &mut self,
        primitive: PrimitiveType,
        index_type: IndexType,
        counts: &[u32],
        index_offsets: &[u64],
        base_vertices: &[i32],
    );

    /// Draws `command_count` commands read from the bound indirect buffer.
    fn multi_draw_elements_indirect(
        &mut self,
        indirect_buffer: GpuBuffer,
        command_count: u32,
        primitive: PrimitiveType,
        index_type: IndexType,
    );

    /// Submits any pending device work.
    fn flush(&mut self);
}

/// Draw-scoped view of a [`CommandList`] with a tessellation bound.
///
/// Dropping the guard unbinds the tessellation.
pub struct DrawCommandList<'a> {
    command_list: &'a mut dyn CommandList,
    functions: DeviceFunctions,
}

impl<'a> DrawCommandList<'a> {
    /// Binds `tessellation` and returns a guard for issuing draws against it.
    pub fn begin(command_list: &'a mut dyn CommandList, tessellation: &Tessellation) -> Self {
        let functions = command_list.device_functions();
        command_list.bind_tessellation(tessellation);
        Self {
            command_list,
            functions,
        }
    }

    /// Issues every command in `batch`, using the device's multidraw strategy.
    pub fn multi_draw_elements_base_vertex(
        &mut self,
        batch: &MultiDrawBatch,
        primitive: PrimitiveType,
        index_type: IndexType,
    ) -> RenderResult<()> {
        self.functions.multidraw.multi_draw_elements_base_vertex(
            &mut *self.command_list,
            batch,
            primitive,
            index_type,
        )
    }

    /// Issues `command_count` indirect commands from `indirect_buffer`.
    pub fn multi_draw_elements_indirect(
        &mut self,
        indirect_buffer: GpuBuffer,
        command_count: u32,
        primitive: PrimitiveType,
        index_type: IndexType,
    ) {
        self.command_list.multi_draw_elements_indirect(
            indirect_buffer,
            command_count,
            primitive,
            index_type,
        );
    }

    /// Multidraw strategy in use.
    pub fn multidraw_functions(&self) -> MultidrawFunctions {
        self.functions.multidraw
    }
}

impl<'a> dyn CommandList + 'a {
    /// Starts issuing draws against `tessellation`. See [`DrawCommandList`].
    pub fn begin_tessellating(&mut self, tessellation: &Tessellation) -> DrawCommandList<'_> {
        DrawCommandList::begin(self, tessellation)
    }
}

impl Drop for DrawCommandList<'_> {
    fn drop(&mut self) {
        self.command_list.unbind_tessellation();
    }
}
