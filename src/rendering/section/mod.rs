//! # Render Sections
//!
//! Main-thread state of every loaded section: whether and how it was built,
//! what work it is waiting for, and the job currently building it.
//!
//! ## State Machine
//!
//! A section starts unbuilt with no pending update. Requests raise the
//! pending update by priority ([`ChunkUpdateType::promote`]); submitting a job
//! clears it and stores the job's cancellation token; uploading the result
//! swaps in new [`BuiltRenderSectionData`]. Deleting a section cancels its job
//! and makes it permanently unbuilt.

pub mod built_data;
pub mod metrics;
pub mod update_type;

use std::collections::HashMap;
use std::sync::Arc;

use cgmath::{MetricSpace, Point3};

use crate::core::position::{section_origin, SECTION_SIZE};
use crate::rendering::compile::render_pass::TerrainRenderPass;
use crate::rendering::compile::sort::{SortLevel, SortState};
use crate::rendering::region::manager::RegionHandle;
use crate::rendering::region::RegionKey;
use crate::task_management::job::CancellationToken;

pub use built_data::{BuiltRenderSectionData, VisibilityEncoding};
pub use update_type::ChunkUpdateType;

/// A loaded section as seen by the renderer.
pub struct RenderSection {
    position: Point3<i32>,
    region_key: RegionKey,
    region_id: u32,
    section_index: usize,

    built: Option<BuiltRenderSectionData>,
    pending_update: Option<ChunkUpdateType>,
    build_cancellation_token: Option<CancellationToken>,

    last_built_frame: i64,
    last_submitted_frame: i64,
    disposed: bool,
    last_build_duration_nanos: u64,

    translucency_sort_states: HashMap<TerrainRenderPass, Arc<SortState>>,
    last_sort_camera: Option<Point3<f32>>,
}

impl RenderSection {
    /// Creates an unbuilt section owned by the region behind `region`.
    pub fn new(position: Point3<i32>, region: RegionHandle, section_index: usize) -> Self {
        Self {
            position,
            region_key: region.key,
            region_id: region.id,
            section_index,
            built: None,
            pending_update: None,
            build_cancellation_token: None,
            last_built_frame: -1,
            last_submitted_frame: -1,
            disposed: false,
            last_build_duration_nanos: 0,
            translucency_sort_states: HashMap::new(),
            last_sort_camera: None,
        }
    }

    pub fn position(&self) -> Point3<i32> {
        self.position
    }

    pub fn region_key(&self) -> RegionKey {
        self.region_key
    }

    pub fn region_id(&self) -> u32 {
        self.region_id
    }

    /// Index of the section inside its region.
    pub fn section_index(&self) -> usize {
        self.section_index
    }

    /// Cancels any running build and marks the section dead.
    pub fn delete(&mut self) {
        if let Some(token) = self.build_cancellation_token.take() {
            token.cancel();
        }
        self.set_info(None);
        self.pending_update = None;
        self.translucency_sort_states.clear();
        self.disposed = true;
    }

    /// Replaces the built data.
    ///
    /// # Returns
    /// `true` if built-ness, pass mask or visibility changed
    pub fn set_info(&mut self, info: Option<BuiltRenderSectionData>) -> bool {
        let previous = self.built;
        self.built = info;

        previous.is_some() != info.is_some()
            || previous.map(|data| data.pass_mask()) != info.map(|data| data.pass_mask())
            || previous.map(|data| data.visibility()) != info.map(|data| data.visibility())
    }

    pub fn built(&self) -> Option<&BuiltRenderSectionData> {
        self.built.as_ref()
    }

    pub fn is_built(&self) -> bool {
        self.built.is_some()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Pass bitmask of the built data; zero when unbuilt.
    pub fn visual_flags(&self) -> u32 {
        self.built.map_or(0, |data| data.pass_mask())
    }

    pub fn has_anything_to_render(&self) -> bool {
        self.visual_flags() != 0
    }

    /// Face connectivity. Unbuilt sections are treated as fully open.
    pub fn visibility(&self) -> VisibilityEncoding {
        self.built
            .map_or(VisibilityEncoding::EVERYTHING, |data| data.visibility())
    }

    pub fn pending_update(&self) -> Option<ChunkUpdateType> {
        self.pending_update
    }

    /// Raises the pending update to `update` if it has higher priority.
    ///
    /// # Returns
    /// `true` if the pending update changed
    pub fn request_update(&mut self, update: ChunkUpdateType) -> bool {
        if self.disposed {
            return false;
        }
        match ChunkUpdateType::promote(self.pending_update, update) {
            Some(promoted) => {
                self.pending_update = Some(promoted);
                true
            }
            None => false,
        }
    }

    pub fn set_pending_update(&mut self, update: Option<ChunkUpdateType>) {
        self.pending_update = update;
    }

    pub fn build_cancellation_token(&self) -> Option<&CancellationToken> {
        self.build_cancellation_token.as_ref()
    }

    /// Stores the token of a newly submitted job, cancelling any previous one.
    pub fn set_build_cancellation_token(&mut self, token: Option<CancellationToken>) {
        if let Some(previous) = std::mem::replace(&mut self.build_cancellation_token, token) {
            previous.cancel();
        }
    }

    pub fn take_build_cancellation_token(&mut self) -> Option<CancellationToken> {
        self.build_cancellation_token.take()
    }

    /// Drops the stored token if the job behind it has finished.
    pub fn clear_finished_token(&mut self) {
        if self
            .build_cancellation_token
            .as_ref()
            .is_some_and(CancellationToken::is_finished)
        {
            self.build_cancellation_token = None;
        }
    }

    pub fn translucency_sort_states(&self) -> &HashMap<TerrainRenderPass, Arc<SortState>> {
        &self.translucency_sort_states
    }

    pub fn set_translucency_sort_states(&mut self, states: HashMap<TerrainRenderPass, Arc<SortState>>) {
        self.translucency_sort_states = states;
    }

    /// Strongest sort requirement over all translucent passes.
    pub fn highest_sorting_level(&self) -> SortLevel {
        self.translucency_sort_states
            .values()
            .map(|state| state.sort_level())
            .max()
            .unwrap_or(SortLevel::None)
    }

    /// Whether some pass must be re-sorted when the camera moves.
    pub fn needs_dynamic_sorting(&self) -> bool {
        self.highest_sorting_level() == SortLevel::Dynamic
    }

    pub fn last_sort_camera(&self) -> Option<Point3<f32>> {
        self.last_sort_camera
    }

    pub fn set_last_sort_camera(&mut self, camera: Point3<f32>) {
        self.last_sort_camera = Some(camera);
    }

    pub fn last_built_frame(&self) -> i64 {
        self.last_built_frame
    }

    pub fn set_last_built_frame(&mut self, frame: i64) {
        self.last_built_frame = frame;
    }

    pub fn last_submitted_frame(&self) -> i64 {
        self.last_submitted_frame
    }

    pub fn set_last_submitted_frame(&mut self, frame: i64) {
        self.last_submitted_frame = frame;
    }

    pub fn last_build_duration_nanos(&self) -> u64 {
        self.last_build_duration_nanos
    }

    pub fn set_last_build_duration_nanos(&mut self, nanos: u64) {
        self.last_build_duration_nanos = nanos;
    }

    /// Minimum block corner.
    pub fn min_block(&self) -> Point3<f32> {
        let origin = section_origin(self.position);
        Point3::new(origin.x as f32, origin.y as f32, origin.z as f32)
    }

    /// Maximum block corner.
    pub fn max_block(&self) -> Point3<f32> {
        let min = self.min_block();
        let size = SECTION_SIZE as f32;
        Point3::new(min.x + size, min.y + size, min.z + size)
    }

    /// Centre of the section in block coordinates.
    pub fn center(&self) -> Point3<f32> {
        let half = SECTION_SIZE as f32 / 2.0;
        let min = self.min_block();
        Point3::new(min.x + half, min.y + half, min.z + half)
    }

    /// Squared distance from the section centre to `point`.
    pub fn squared_distance(&self, point: Point3<f32>) -> f32 {
        self.center().distance2(point)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section() -> RenderSection {
        RenderSection::new(Point3::new(1, 2, 3), RegionHandle { key: 0, id: 0 }, 0)
    }

    #[test]
    fn sorting_level_follows_the_busiest_pass() {
        let mut section = section();
        assert_eq!(section.highest_sorting_level(), SortLevel::None);

        let single = Arc::new(SortState::new(vec![[0.5, 0.5, 0.5]]));
        section.set_translucency_sort_states(HashMap::from([(TerrainRenderPass::Translucent, single)]));
        assert_eq!(section.highest_sorting_level(), SortLevel::Static);
        assert!(!section.needs_dynamic_sorting());

        let pair = Arc::new(SortState::new(vec![[0.5, 0.5, 0.5], [1.5, 0.5, 0.5]]));
        section.set_translucency_sort_states(HashMap::from([(TerrainRenderPass::Translucent, pair)]));
        assert_eq!(section.highest_sorting_level(), SortLevel::Dynamic);
        assert!(section.needs_dynamic_sorting());
    }

    #[test]
    fn delete_cancels_the_running_build() {
        let mut section = section();
        let token = CancellationToken::new();
        section.set_build_cancellation_token(Some(token.clone()));
        section.set_info(Some(BuiltRenderSectionData::EMPTY));

        section.delete();
        assert!(token.is_cancelled());
        assert!(!section.is_built());
        assert!(section.is_disposed());
        assert!(section.build_cancellation_token().is_none());
        assert!(!section.request_update(ChunkUpdateType::Rebuild));
    }

    #[test]
    fn set_info_reports_changes() {
        let mut section = section();
        assert!(section.set_info(Some(BuiltRenderSectionData::EMPTY)));
        assert!(!section.set_info(Some(BuiltRenderSectionData::EMPTY)));

        let solid = BuiltRenderSectionData::new(
            TerrainRenderPass::Solid.bit(),
            VisibilityEncoding::NOTHING,
        );
        assert!(section.set_info(Some(solid)));
        assert!(section.has_anything_to_render());
        assert_eq!(section.visibility(), VisibilityEncoding::NOTHING);
        assert!(section.set_info(None));
        assert_eq!(section.visibility(), VisibilityEncoding::EVERYTHING);
    }

    #[test]
    fn requests_are_promoted_by_priority() {
        let mut section = section();
        assert!(section.request_update(ChunkUpdateType::SortOnly));
        assert!(section.request_update(ChunkUpdateType::Rebuild));
        assert!(!section.request_update(ChunkUpdateType::InitialBuild));
        assert_eq!(section.pending_update(), Some(ChunkUpdateType::Rebuild));
    }

    #[test]
    fn replacing_a_token_cancels_the_old_job() {
        let mut section = section();
        let first = CancellationToken::new();
        section.set_build_cancellation_token(Some(first.clone()));
        section.set_build_cancellation_token(Some(CancellationToken::new()));
        assert!(first.is_cancelled());
    }

    #[test]
    fn bounds_cover_sixteen_blocks() {
        let section = section();
        assert_eq!(section.min_block(), Point3::new(16.0, 32.0, 48.0));
        assert_eq!(section.max_block(), Point3::new(32.0, 48.0, 64.0));
        assert_eq!(section.center(), Point3::new(24.0, 40.0, 56.0));
    }
}
