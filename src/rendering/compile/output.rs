//! Results produced by build and sort tasks on worker threads.

use std::collections::HashMap;
use std::sync::Arc;

use cgmath::Point3;

use crate::rendering::section::BuiltRenderSectionData;
use crate::world::facing::ModelQuadFacing;

use super::render_pass::TerrainRenderPass;
use super::sort::SortState;

/// Which kind of task produced an output. Metrics are kept per kind.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TaskOutputKind {
    Build,
    Sort,
}

/// Geometry of one section in one pass.
#[derive(Clone, Debug, Default)]
pub struct BuiltSectionMeshParts {
    /// Vertices grouped by facing, in facing order.
    pub vertex_data: Vec<u8>,
    /// Explicit index data. Only sorted passes carry their own indices.
    pub index_data: Option<Vec<u8>>,
    /// Vertex count per facing.
    pub vertex_ranges: [u32; ModelQuadFacing::COUNT],
}

impl BuiltSectionMeshParts {
    pub fn vertex_count(&self) -> u32 {
        self.vertex_ranges.iter().sum()
    }
}

/// Result of meshing one section.
#[derive(Clone, Debug)]
pub struct ChunkBuildOutput {
    pub section: Point3<i32>,
    pub build_frame: i64,
    pub info: BuiltRenderSectionData,
    pub meshes: HashMap<TerrainRenderPass, BuiltSectionMeshParts>,
    pub sort_states: HashMap<TerrainRenderPass, Arc<SortState>>,
    /// Camera the translucent indices were sorted for, section-independent.
    pub camera: Point3<f32>,
}

impl ChunkBuildOutput {
    /// Output of a section with nothing to draw.
    pub fn empty(section: Point3<i32>, build_frame: i64) -> Self {
        Self {
            section,
            build_frame,
            info: BuiltRenderSectionData::EMPTY,
            meshes: HashMap::new(),
            sort_states: HashMap::new(),
            camera: Point3::new(0.0, 0.0, 0.0),
        }
    }
}

/// Result of re-sorting the translucent passes of one section.
#[derive(Clone, Debug)]
pub struct ChunkSortOutput {
    pub section: Point3<i32>,
    pub build_frame: i64,
    /// Replacement index data per sorted pass.
    pub meshes: HashMap<TerrainRenderPass, Vec<u8>>,
    pub camera: Point3<f32>,
}

/// Output of any chunk task.
#[derive(Clone, Debug)]
pub enum ChunkTaskOutput {
    Build(ChunkBuildOutput),
    Sort(ChunkSortOutput),
}

impl ChunkTaskOutput {
    pub fn section(&self) -> Point3<i32> {
        match self {
            ChunkTaskOutput::Build(output) => output.section,
            ChunkTaskOutput::Sort(output) => output.section,
        }
    }

    pub fn build_frame(&self) -> i64 {
        match self {
            ChunkTaskOutput::Build(output) => output.build_frame,
            ChunkTaskOutput::Sort(output) => output.build_frame,
        }
    }

    pub fn kind(&self) -> TaskOutputKind {
        match self {
            ChunkTaskOutput::Build(_) => TaskOutputKind::Build,
            ChunkTaskOutput::Sort(_) => TaskOutputKind::Sort,
        }
    }
}
