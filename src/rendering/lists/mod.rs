//! # Render and Rebuild Lists
//!
//! Per-frame output of the visibility traversal: what to draw, grouped by
//! region in traversal order, and which sections need work.

pub mod rebuild;
pub mod render_list;

use crate::config::RebuildQueueLimits;
use crate::rendering::occlusion::OcclusionVisitor;
use crate::rendering::section::RenderSection;

pub use rebuild::ChunkRebuildLists;
pub use render_list::{ChunkRenderList, SortedRenderLists};

/// Builds render lists and rebuild queues from traversal visits.
pub struct VisibleChunkCollector {
    frame: i64,
    limits: RebuildQueueLimits,
    ignore_queue_size_limit: bool,
    list_by_region_id: Vec<Option<usize>>,
    lists: Vec<ChunkRenderList>,
    rebuild_lists: ChunkRebuildLists,
}

impl VisibleChunkCollector {
    /// # Arguments
    /// * `frame` - Frame the lists are built for
    /// * `region_ids_length` - One past the highest region id in use
    /// * `limits` - Rebuild queue caps
    /// * `ignore_queue_size_limit` - Queue every request regardless of `limits`
    pub fn new(
        frame: i64,
        region_ids_length: usize,
        limits: RebuildQueueLimits,
        ignore_queue_size_limit: bool,
    ) -> Self {
        Self {
            frame,
            limits,
            ignore_queue_size_limit,
            list_by_region_id: vec![None; region_ids_length],
            lists: Vec::new(),
            rebuild_lists: ChunkRebuildLists::new(),
        }
    }

    pub fn frame(&self) -> i64 {
        self.frame
    }

    fn list_for(&mut self, section: &RenderSection) -> &mut ChunkRenderList {
        let id = section.region_id() as usize;
        if id >= self.list_by_region_id.len() {
            self.list_by_region_id.resize(id + 1, None);
        }
        let index = match self.list_by_region_id[id] {
            Some(index) => index,
            None => {
                self.lists
                    .push(ChunkRenderList::new(section.region_key(), section.region_id()));
                let index = self.lists.len() - 1;
                self.list_by_region_id[id] = Some(index);
                index
            }
        };
        &mut self.lists[index]
    }

    fn add_to_rebuild_lists(&mut self, section: &RenderSection) {
        let Some(update) = section.pending_update() else {
            return;
        };
        if section.build_cancellation_token().is_some() {
            return;
        }
        let limit = if self.ignore_queue_size_limit {
            usize::MAX
        } else {
            update.maximum_queue_size(&self.limits)
        };
        self.rebuild_lists.offer(update, section.position(), limit);
    }

    /// Finishes collection.
    pub fn finish(self) -> (SortedRenderLists, ChunkRebuildLists) {
        (SortedRenderLists::new(self.lists), self.rebuild_lists)
    }
}

impl OcclusionVisitor for VisibleChunkCollector {
    fn visit(&mut self, section: &RenderSection, visible: bool) {
        // Every region reached gets a list, even an empty one, to keep draw order stable.
        let list = self.list_for(section);
        if !visible {
            return;
        }
        if section.has_anything_to_render() {
            list.add(section.section_index());
        }
        self.add_to_rebuild_lists(section);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use cgmath::{Deg, Point3};

    use super::*;
    use crate::core::position::pack_section;
    use crate::rendering::compile::render_pass::TerrainRenderPass;
    use crate::rendering::occlusion::viewport::{Camera, Projection};
    use crate::rendering::occlusion::{OcclusionCuller, Viewport};
    use crate::rendering::region::manager::RegionHandle;
    use crate::rendering::region::{region_coordinates, region_key, section_index};
    use crate::rendering::section::{BuiltRenderSectionData, ChunkUpdateType, VisibilityEncoding};
    use crate::task_management::job::CancellationToken;

    fn section(x: i32, region_id: u32) -> RenderSection {
        let position = Point3::new(x, 0, 0);
        let handle = RegionHandle {
            key: region_key(position),
            id: region_id,
        };
        RenderSection::new(position, handle, section_index(position))
    }

    #[test]
    fn occluded_regions_keep_an_empty_list() {
        let mut sections = HashMap::new();
        for x in -2..=9 {
            let region_id = (region_coordinates(Point3::new(x, 0, 0)).x + 1) as u32;
            let mut section = section(x, region_id);
            section.set_info(Some(BuiltRenderSectionData::new(
                TerrainRenderPass::Solid.bit(),
                VisibilityEncoding::EVERYTHING,
            )));
            sections.insert(pack_section(x, 0, 0), section);
        }

        let camera = Camera::new((8.0, 8.0, 8.0), Deg(0.0), Deg(0.0));
        let projection = Projection::new(100, 100, Deg(70.0), 0.1, 1000.0);
        let viewport = Viewport::from_camera(&camera, &projection);

        let mut collector = VisibleChunkCollector::new(1, 3, RebuildQueueLimits::default(), false);
        OcclusionCuller::new(&sections).find_visible(&mut collector, &viewport, 1000.0, true, 1);
        let (lists, rebuild) = collector.finish();

        let keys: Vec<_> = lists.iter().map(ChunkRenderList::region_key).collect();
        let a = region_key(Point3::new(0, 0, 0));
        let b = region_key(Point3::new(-1, 0, 0));
        let c = region_key(Point3::new(8, 0, 0));
        assert_eq!(keys, vec![a, b, c]);

        assert!(lists.find(b).unwrap().is_empty());
        assert_eq!(lists.find(a).unwrap().size(), 8);
        assert_eq!(lists.find(c).unwrap().sections().collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(lists.section_count(), 10);
        assert!(rebuild.is_empty());
    }

    #[test]
    fn full_queues_record_overflow() {
        let limits = RebuildQueueLimits {
            important_rebuild: 5,
            ..Default::default()
        };
        let mut collector = VisibleChunkCollector::new(0, 1, limits, false);

        for x in 0..8 {
            let mut section = section(x, 0);
            section.request_update(ChunkUpdateType::ImportantRebuild);
            collector.visit(&section, true);
        }

        let mut busy = section(9, 0);
        busy.request_update(ChunkUpdateType::Rebuild);
        busy.set_build_cancellation_token(Some(CancellationToken::new()));
        collector.visit(&busy, true);

        let (lists, rebuild) = collector.finish();
        assert_eq!(rebuild.update_count(ChunkUpdateType::ImportantRebuild), 5);
        assert_eq!(rebuild.queue_overflow_count(ChunkUpdateType::ImportantRebuild), 3);
        assert!(rebuild.has_additional_updates());
        assert_eq!(rebuild.update_count(ChunkUpdateType::Rebuild), 0);
        assert_eq!(
            rebuild.queue(ChunkUpdateType::ImportantRebuild).front(),
            Some(&Point3::new(0, 0, 0))
        );

        assert_eq!(lists.len(), 1);
        assert!(lists.iter().next().unwrap().is_empty());
    }

    #[test]
    fn sections_without_geometry_are_only_queued() {
        let mut collector = VisibleChunkCollector::new(0, 1, RebuildQueueLimits::default(), false);
        let mut section = section(3, 0);
        section.request_update(ChunkUpdateType::InitialBuild);
        collector.visit(&section, true);

        let (lists, rebuild) = collector.finish();
        assert_eq!(lists.section_count(), 0);
        assert_eq!(rebuild.update_count(ChunkUpdateType::InitialBuild), 1);
        assert!(!rebuild.has_additional_updates());
    }

    #[test]
    fn invisible_sections_are_never_queued() {
        let limits = RebuildQueueLimits {
            rebuild: 2,
            ..Default::default()
        };
        let mut collector = VisibleChunkCollector::new(0, 1, limits, false);
        for x in 0..3 {
            let mut section = section(x, 0);
            section.request_update(ChunkUpdateType::Rebuild);
            collector.visit(&section, false);
        }

        let (lists, rebuild) = collector.finish();
        assert_eq!(rebuild.update_count(ChunkUpdateType::Rebuild), 0);
        assert_eq!(rebuild.queue_overflow_count(ChunkUpdateType::Rebuild), 0);
        assert!(!rebuild.has_additional_updates());
        assert_eq!(lists.len(), 1);
    }

    #[test]
    fn ignoring_the_limit_queues_everything() {
        let limits = RebuildQueueLimits {
            initial_build: 2,
            ..Default::default()
        };
        let mut collector = VisibleChunkCollector::new(0, 1, limits, true);
        for x in 0..7 {
            let mut section = section(x, 0);
            section.request_update(ChunkUpdateType::InitialBuild);
            collector.visit(&section, true);
        }

        let (_, rebuild) = collector.finish();
        assert_eq!(rebuild.update_count(ChunkUpdateType::InitialBuild), 7);
        assert_eq!(rebuild.queue_overflow_count(ChunkUpdateType::InitialBuild), 0);
        assert!(!rebuild.has_additional_updates());
    }
}
