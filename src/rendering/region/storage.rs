//! Per-pass bookkeeping of where each section's geometry lives in its
//! region's arenas, plus the draw metadata derived from it.

use crate::rendering::arena::BufferSegment;
use crate::world::facing::ModelQuadFacing;

use super::REGION_SIZE;

/// Draw parameters of one section in one pass, per facing.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct SectionMeshData {
    /// Bit per facing with at least one quad.
    pub facing_mask: u32,
    /// Base vertex per facing, in arena elements.
    pub vertex_offset: [u32; ModelQuadFacing::COUNT],
    /// Index count per facing.
    pub element_count: [u32; ModelQuadFacing::COUNT],
    /// Byte offset into the index buffer per facing. Zero when the section
    /// uses the shared quad index buffer.
    pub index_offset: [u64; ModelQuadFacing::COUNT],
}

impl SectionMeshData {
    /// Largest per-facing index count.
    pub fn max_element_count(&self) -> u32 {
        self.element_count.iter().copied().max().unwrap_or(0)
    }
}

#[derive(Copy, Clone, Debug)]
struct SectionAllocation {
    vertex: BufferSegment,
    index: Option<BufferSegment>,
    vertex_ranges: [u32; ModelQuadFacing::COUNT],
}

/// Geometry locations for every section of a region in one render pass.
pub struct SectionRenderDataStorage {
    allocations: Vec<Option<SectionAllocation>>,
    mesh_data: Vec<SectionMeshData>,
    allocated_sections: usize,
}

impl SectionRenderDataStorage {
    /// Creates an empty storage sized for one region.
    pub fn new() -> Self {
        Self {
            allocations: vec![None; REGION_SIZE],
            mesh_data: vec![SectionMeshData::default(); REGION_SIZE],
            allocated_sections: 0,
        }
    }

    /// Records the vertex allocation of a section and recomputes its draw data.
    ///
    /// # Arguments
    /// * `section_index` - Region-local section index
    /// * `segment` - Where the vertices were placed
    /// * `vertex_ranges` - Vertex count per facing, in facing order
    pub fn set_vertex_data(
        &mut self,
        section_index: usize,
        segment: BufferSegment,
        vertex_ranges: [u32; ModelQuadFacing::COUNT],
    ) {
        if self.allocations[section_index].is_none() {
            self.allocated_sections += 1;
        }
        self.allocations[section_index] = Some(SectionAllocation {
            vertex: segment,
            index: None,
            vertex_ranges,
        });
        self.update_mesh(section_index);
    }

    /// Records the index allocation of a section that already has vertices.
    pub fn set_index_data(&mut self, section_index: usize, segment: BufferSegment) {
        if let Some(allocation) = self.allocations[section_index].as_mut() {
            allocation.index = Some(segment);
            self.update_mesh(section_index);
        }
    }

    /// Forgets the index allocation of a section.
    ///
    /// # Returns
    /// The segment to free from the index arena
    pub fn remove_index_data(&mut self, section_index: usize) -> Option<BufferSegment> {
        let removed = self.allocations[section_index].as_mut()?.index.take();
        self.update_mesh(section_index);
        removed
    }

    /// Forgets everything stored for a section.
    ///
    /// # Returns
    /// The vertex and index segments to free
    pub fn remove_data(&mut self, section_index: usize) -> Option<(BufferSegment, Option<BufferSegment>)> {
        let allocation = self.allocations[section_index].take()?;
        self.allocated_sections -= 1;
        self.mesh_data[section_index] = SectionMeshData::default();
        Some((allocation.vertex, allocation.index))
    }

    /// Whether a section has vertices stored.
    pub fn has_vertex_data(&self, section_index: usize) -> bool {
        self.allocations[section_index].is_some()
    }

    /// Whether a section has its own index data.
    pub fn has_index_data(&self, section_index: usize) -> bool {
        self.allocations[section_index]
            .as_ref()
            .is_some_and(|allocation| allocation.index.is_some())
    }

    /// Draw data of a section.
    #[inline]
    pub fn mesh_data(&self, section_index: usize) -> &SectionMeshData {
        &self.mesh_data[section_index]
    }

    /// Recomputes the draw data of every section.
    pub fn refresh_all(&mut self) {
        for section_index in 0..REGION_SIZE {
            self.update_mesh(section_index);
        }
    }

    /// Whether no section has data in this storage.
    pub fn is_empty(&self) -> bool {
        self.allocated_sections == 0
    }

    fn update_mesh(&mut self, section_index: usize) {
        let Some(allocation) = self.allocations[section_index] else {
            self.mesh_data[section_index] = SectionMeshData::default();
            return;
        };

        let mut data = SectionMeshData::default();
        let mut vertex_offset = allocation.vertex.offset();
        let mut index_cursor: u64 = 0;
        let index_base = allocation.index.map(|segment| segment.offset() as u64 * 4);

        for facing in ModelQuadFacing::all() {
            let vertex_count = allocation.vertex_ranges[facing.index()];
            if vertex_count > 0 {
                let element_count = (vertex_count >> 2) * 6;
                data.facing_mask |= facing.bit();
                data.vertex_offset[facing.index()] = vertex_offset;
                data.element_count[facing.index()] = element_count;
                if let Some(base) = index_base {
                    data.index_offset[facing.index()] = base + index_cursor * 4;
                    index_cursor += element_count as u64;
                }
            }
            vertex_offset += vertex_count;
        }

        self.mesh_data[section_index] = data;
    }
}

impl Default for SectionRenderDataStorage {
    fn default() -> Self {
        Self::new()
    }
}
