//! Per-worker vertex scratch buffers for one section build.

use cgmath::Point3;

use crate::rendering::vertex::ChunkVertex;
use crate::world::facing::ModelQuadFacing;

use super::output::BuiltSectionMeshParts;
use super::render_pass::TerrainRenderPass;
use super::sort::SortState;

/// Vertices of the section being built, per pass and facing.
///
/// The buffers are cleared between builds but keep their allocations, so a
/// worker settles on a steady capacity after a few sections.
pub struct ChunkBuildBuffers {
    vertices: [[Vec<ChunkVertex>; ModelQuadFacing::COUNT]; TerrainRenderPass::COUNT],
}

impl ChunkBuildBuffers {
    pub fn new() -> Self {
        Self {
            vertices: Default::default(),
        }
    }

    /// Clears every buffer before a new build.
    pub fn init(&mut self) {
        for facings in self.vertices.iter_mut() {
            for buffer in facings.iter_mut() {
                buffer.clear();
            }
        }
    }

    /// Appends one quad, given as four counter-clockwise vertices.
    pub fn push_quad(&mut self, pass: TerrainRenderPass, facing: ModelQuadFacing, quad: [ChunkVertex; 4]) {
        self.vertices[pass.index()][facing.index()].extend_from_slice(&quad);
    }

    /// Number of vertices written for a pass.
    pub fn vertex_count(&self, pass: TerrainRenderPass) -> usize {
        self.vertices[pass.index()].iter().map(Vec::len).sum()
    }

    /// Packs the vertices of a pass into mesh parts.
    ///
    /// Sorted passes also get a sort state and an index buffer ordered for
    /// `camera`, which is relative to the section origin.
    ///
    /// # Returns
    /// `None` when the pass has no geometry
    pub fn take_mesh(
        &mut self,
        pass: TerrainRenderPass,
        camera: Point3<f32>,
    ) -> Option<(BuiltSectionMeshParts, Option<SortState>)> {
        if self.vertex_count(pass) == 0 {
            return None;
        }

        let facings = &mut self.vertices[pass.index()];
        let mut vertex_ranges = [0u32; ModelQuadFacing::COUNT];
        let mut vertex_data = Vec::with_capacity(
            facings.iter().map(Vec::len).sum::<usize>() * std::mem::size_of::<ChunkVertex>(),
        );
        for (facing, buffer) in facings.iter_mut().enumerate() {
            vertex_ranges[facing] = buffer.len() as u32;
            vertex_data.extend_from_slice(bytemuck::cast_slice(buffer.as_slice()));
        }

        let (index_data, sort_state) = if pass.is_sorted() {
            let positions: Vec<[f32; 3]> = facings
                .iter()
                .flat_map(|buffer| buffer.iter().map(|vertex| vertex.position))
                .collect();
            let state = SortState::from_quad_vertices(&positions);
            (Some(state.sorted_index_bytes(camera)), Some(state))
        } else {
            (None, None)
        };

        for buffer in facings.iter_mut() {
            buffer.clear();
        }

        Some((
            BuiltSectionMeshParts {
                vertex_data,
                index_data,
                vertex_ranges,
            },
            sort_state,
        ))
    }
}

impl Default for ChunkBuildBuffers {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad(z: f32) -> [ChunkVertex; 4] {
        [
            ChunkVertex::new([0.0, 0.0, z], [255; 4], 0, 0),
            ChunkVertex::new([1.0, 0.0, z], [255; 4], 0, 0),
            ChunkVertex::new([1.0, 1.0, z], [255; 4], 0, 0),
            ChunkVertex::new([0.0, 1.0, z], [255; 4], 0, 0),
        ]
    }

    #[test]
    fn meshes_are_grouped_by_facing() {
        let mut buffers = ChunkBuildBuffers::new();
        buffers.push_quad(TerrainRenderPass::Solid, ModelQuadFacing::PosZ, quad(1.0));
        buffers.push_quad(TerrainRenderPass::Solid, ModelQuadFacing::NegY, quad(0.0));
        buffers.push_quad(TerrainRenderPass::Solid, ModelQuadFacing::PosZ, quad(2.0));

        let (mesh, sort) = buffers
            .take_mesh(TerrainRenderPass::Solid, Point3::new(0.0, 0.0, 0.0))
            .unwrap();
        assert!(sort.is_none());
        assert!(mesh.index_data.is_none());
        assert_eq!(mesh.vertex_ranges[ModelQuadFacing::PosZ.index()], 8);
        assert_eq!(mesh.vertex_ranges[ModelQuadFacing::NegY.index()], 4);
        assert_eq!(mesh.vertex_data.len(), 12 * std::mem::size_of::<ChunkVertex>());

        assert!(buffers.take_mesh(TerrainRenderPass::Solid, Point3::new(0.0, 0.0, 0.0)).is_none());
        assert!(buffers.take_mesh(TerrainRenderPass::Cutout, Point3::new(0.0, 0.0, 0.0)).is_none());
    }

    #[test]
    fn sorted_passes_carry_back_to_front_indices() {
        let mut buffers = ChunkBuildBuffers::new();
        buffers.push_quad(TerrainRenderPass::Translucent, ModelQuadFacing::Unassigned, quad(1.0));
        buffers.push_quad(TerrainRenderPass::Translucent, ModelQuadFacing::Unassigned, quad(8.0));

        let (mesh, sort) = buffers
            .take_mesh(TerrainRenderPass::Translucent, Point3::new(0.5, 0.5, 0.0))
            .unwrap();
        assert_eq!(sort.unwrap().quad_count(), 2);
        let indices: Vec<u32> = mesh
            .index_data
            .unwrap()
            .chunks_exact(4)
            .map(|bytes| u32::from_ne_bytes(bytes.try_into().unwrap()))
            .collect();
        assert_eq!(indices, vec![4, 5, 6, 6, 7, 4, 0, 1, 2, 2, 3, 0]);
    }
}
