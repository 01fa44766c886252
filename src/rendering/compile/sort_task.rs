//! Re-sorting of translucent geometry after the camera moved.

use std::collections::HashMap;
use std::sync::Arc;

use cgmath::Point3;

use crate::core::position::section_origin;
use crate::error::RenderResult;
use crate::task_management::build_context::ChunkBuildContext;
use crate::task_management::job::ChunkBuilderTask;

use super::output::{ChunkSortOutput, ChunkTaskOutput, TaskOutputKind};
use super::render_pass::TerrainRenderPass;
use super::sort::SortState;

/// Produces new index buffers for the sorted passes of a built section.
pub struct ChunkBuilderSortTask {
    section: Point3<i32>,
    build_frame: i64,
    camera: Point3<f32>,
    sort_states: HashMap<TerrainRenderPass, Arc<SortState>>,
}

impl ChunkBuilderSortTask {
    pub fn new(
        section: Point3<i32>,
        build_frame: i64,
        camera: Point3<f32>,
        sort_states: HashMap<TerrainRenderPass, Arc<SortState>>,
    ) -> Self {
        Self {
            section,
            build_frame,
            camera,
            sort_states,
        }
    }
}

impl ChunkBuilderTask for ChunkBuilderSortTask {
    fn section(&self) -> Point3<i32> {
        self.section
    }

    fn kind(&self) -> TaskOutputKind {
        TaskOutputKind::Sort
    }

    fn execute(self: Box<Self>, _context: &mut ChunkBuildContext) -> RenderResult<ChunkTaskOutput> {
        let origin = section_origin(self.section);
        let relative_camera = Point3::new(
            self.camera.x - origin.x as f32,
            self.camera.y - origin.y as f32,
            self.camera.z - origin.z as f32,
        );

        let meshes = self
            .sort_states
            .iter()
            .map(|(&pass, state)| (pass, state.sorted_index_bytes(relative_camera)))
            .collect();

        Ok(ChunkTaskOutput::Sort(ChunkSortOutput {
            section: self.section,
            build_frame: self.build_frame,
            meshes,
            camera: self.camera,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indices_are_sorted_relative_to_the_section() {
        let state = SortState::new(vec![[1.0, 0.0, 0.0], [15.0, 0.0, 0.0]]);
        let sort_states = HashMap::from([(TerrainRenderPass::Translucent, Arc::new(state))]);
        let task = Box::new(ChunkBuilderSortTask::new(
            Point3::new(1, 0, 0),
            3,
            Point3::new(17.0, 0.0, 0.0),
            sort_states,
        ));

        let output = match task.execute(&mut ChunkBuildContext::new(false)).unwrap() {
            ChunkTaskOutput::Sort(output) => output,
            ChunkTaskOutput::Build(_) => panic!("sorting produced a build output"),
        };
        let indices: Vec<u32> = output.meshes[&TerrainRenderPass::Translucent]
            .chunks_exact(4)
            .map(|bytes| u32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
            .collect();

        assert_eq!(output.build_frame, 3);
        assert_eq!(&indices[..6], &[4, 5, 6, 6, 7, 4]);
    }
}
