//! Vertex data structures and layouts for terrain rendering.
//!
//! This module defines the vertex format produced by the chunk mesher and the
//! matching layout description for the render pipeline.

use super::compile::render_pass::VertexFormat;

/// A terrain vertex.
///
/// Positions are relative to the section origin; the shader adds the section
/// offset. Colour is pre-multiplied by the diffuse and ambient occlusion
/// brightness computed by the light pipeline.
///
/// # Memory Layout
/// - Position: [f32; 3] (12 bytes)
/// - Colour: [u8; 4] (4 bytes)
/// - Light map coordinate: u32 (4 bytes, sky light << 16 | block light)
/// - Section index within its region: u32 (4 bytes)
///
/// Total size: 24 bytes
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ChunkVertex {
    /// Section-relative position
    pub position: [f32; 3],
    /// Shaded RGBA colour
    pub color: [u8; 4],
    /// Packed light map coordinate
    pub light: u32,
    /// Index of the owning section inside its region
    pub section_index: u32,
}

impl ChunkVertex {
    /// Format descriptor used to key geometry arenas.
    pub const FORMAT: VertexFormat = VertexFormat {
        id: 0,
        stride: std::mem::size_of::<ChunkVertex>() as u32,
        name: "chunk_vertex",
    };

    /// Creates a new vertex.
    pub fn new(position: [f32; 3], color: [u8; 4], light: u32, section_index: u32) -> Self {
        Self {
            position,
            color,
            light,
            section_index,
        }
    }

    /// Returns the vertex buffer layout description for the shader pipeline.
    ///
    /// # Shader Attributes
    /// - `location = 0`: position (vec3<f32>)
    /// - `location = 1`: colour (vec4<f32>, normalized)
    /// - `location = 2`: light map coordinate (u32)
    /// - `location = 3`: section index (u32)
    pub fn desc<'a>() -> wgpu::VertexBufferLayout<'a> {
        const ATTRIBUTES: [wgpu::VertexAttribute; 4] = wgpu::vertex_attr_array![
            0 => Float32x3,
            1 => Unorm8x4,
            2 => Uint32,
            3 => Uint32,
        ];

        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<ChunkVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &ATTRIBUTES,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_stride_matches_format() {
        assert_eq!(std::mem::size_of::<ChunkVertex>(), 24);
        assert_eq!(ChunkVertex::desc().array_stride, ChunkVertex::FORMAT.stride as u64);
    }
}
