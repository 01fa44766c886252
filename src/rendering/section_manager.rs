//! # Render Section Manager
//!
//! Per-frame orchestration of the section pipeline on the main thread.
//!
//! ## Frame Lifecycle
//! 1. `update_camera()` requests re-sorts for translucent sections the camera
//!    moved away from
//! 2. `create_render_lists()` walks the section graph and produces the render
//!    lists and rebuild queues for the frame
//! 3. `update_chunks()` turns queued sections into builder jobs: important
//!    rebuilds into a blocking collector, everything else against the
//!    builder's scheduling budget
//! 4. `upload_chunks()` waits for the blocking jobs, drains every finished
//!    result, uploads geometry into the region arenas and swaps the new data
//!    into the sections
//!
//! ## Ownership
//! - Sections, regions and arenas are only touched here, on the main thread
//! - Workers see cloned world snapshots and return owned outputs
//! - Results travel back through an unbounded channel

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use cgmath::{MetricSpace, Point3};
use crossbeam_channel::{unbounded, Receiver};
use log::{debug, info};

use crate::config::RendererConfig;
use crate::core::position::{pack_section, SECTION_SIZE};
use crate::error::RenderResult;
use crate::rendering::chunk_renderer::ChunkRenderer;
use crate::rendering::compile::output::{ChunkBuildOutput, ChunkTaskOutput, TaskOutputKind};
use crate::rendering::compile::render_pass::{RenderPassConfiguration, TerrainRenderPass};
use crate::rendering::compile::{ChunkBuilderMeshingTask, ChunkBuilderSortTask};
use crate::rendering::gpu::CommandList;
use crate::rendering::lists::{ChunkRebuildLists, SortedRenderLists, VisibleChunkCollector};
use crate::rendering::occlusion::{OcclusionCuller, Viewport};
use crate::rendering::region::manager::RenderRegionManager;
use crate::rendering::region::section_index;
use crate::rendering::section::metrics::RenderSectionMetricsTracker;
use crate::rendering::section::{BuiltRenderSectionData, ChunkUpdateType, RenderSection};
use crate::task_management::build_context::ChunkBuildContext;
use crate::task_management::collector::{ChunkJobCollector, JobConsumer};
use crate::task_management::job::ChunkBuilderTask;
use crate::task_management::job_result::ChunkJobResult;
use crate::task_management::metrics::ChunkJobMetricsTracker;
use crate::task_management::ChunkBuilder;
use crate::world::cloned_section::ClonedSectionCache;
use crate::world::world_slice::WorldSlice;
use crate::world::World;

/// Camera movement in blocks after which translucent sections are re-sorted.
const RESORT_DISTANCE: f32 = 1.0;

/// Owns every loaded [`RenderSection`] and drives their builds.
pub struct RenderSectionManager {
    config: RendererConfig,
    builder: ChunkBuilder,
    regions: RenderRegionManager,
    sections: HashMap<u64, RenderSection>,
    snapshots: ClonedSectionCache,

    consumer: JobConsumer,
    results: Receiver<ChunkJobResult>,
    blocking_collector: Option<ChunkJobCollector>,

    job_metrics: ChunkJobMetricsTracker,
    section_metrics: RenderSectionMetricsTracker,

    render_lists: SortedRenderLists,
    rebuild_lists: ChunkRebuildLists,

    camera: Point3<f32>,
    frame: i64,
    needs_graph_update: bool,
    total_jobs_submitted: u64,
    failed_jobs: u64,
}

impl RenderSectionManager {
    /// Creates the manager, its worker pool and region storage.
    ///
    /// # Arguments
    /// * `config` - Renderer settings, validated here
    /// * `pass_config` - Vertex format of every render pass
    /// * `command_list` - Device used for the staging buffer
    ///
    /// # Errors
    /// `RenderError::InvalidConfig` for a rejected config, `RenderError::Io` if
    /// a worker cannot be spawned, or a device error from the staging buffer
    pub fn new(
        config: RendererConfig,
        pass_config: RenderPassConfiguration,
        command_list: &mut dyn CommandList,
    ) -> RenderResult<Self> {
        config.validate()?;

        let smooth_lighting = config.smooth_lighting;
        let builder = ChunkBuilder::new(config.effective_builder_threads(), move || {
            ChunkBuildContext::new(smooth_lighting)
        })?;
        let regions = RenderRegionManager::new(command_list, pass_config, config.initial_arena_capacity)?;
        let snapshots = ClonedSectionCache::new(
            config.snapshot_cache_capacity,
            Duration::from_millis(config.snapshot_max_age_ms),
        );

        let (sender, results) = unbounded();
        let consumer: JobConsumer = Arc::new(move |result| {
            if sender.send(result).is_err() {
                debug!("Dropping chunk job result, the section manager is gone");
            }
        });

        Ok(Self {
            config,
            builder,
            regions,
            sections: HashMap::new(),
            snapshots,
            consumer,
            results,
            blocking_collector: None,
            job_metrics: ChunkJobMetricsTracker::new(),
            section_metrics: RenderSectionMetricsTracker::new(),
            render_lists: SortedRenderLists::EMPTY,
            rebuild_lists: ChunkRebuildLists::new(),
            camera: Point3::new(0.0, 0.0, 0.0),
            frame: 0,
            needs_graph_update: true,
            total_jobs_submitted: 0,
            failed_jobs: 0,
        })
    }

    /// Starts tracking a section that entered view distance.
    ///
    /// Sections that hold only air are marked built and empty right away;
    /// all others wait for their initial build.
    ///
    /// # Returns
    /// `false` if the section was already tracked
    pub fn on_section_added(&mut self, world: &World, x: i32, y: i32, z: i32) -> bool {
        let key = pack_section(x, y, z);
        if self.sections.contains_key(&key) {
            return false;
        }

        let position = Point3::new(x, y, z);
        let handle = self.regions.create_for_chunk(x, y, z);
        if let Some(region) = self.regions.region_mut(handle.key) {
            region.add_section();
        }

        let mut section = RenderSection::new(position, handle, section_index(position));
        let visually_empty = world
            .get_section_at(position)
            .map_or(true, |section| section.get().is_empty());
        if visually_empty {
            section.set_info(Some(BuiltRenderSectionData::EMPTY));
        } else {
            section.request_update(ChunkUpdateType::InitialBuild);
        }

        self.sections.insert(key, section);
        self.needs_graph_update = true;
        true
    }

    /// Stops tracking a section, cancelling its build and freeing its geometry.
    ///
    /// # Returns
    /// `false` if the section was not tracked
    pub fn on_section_removed(&mut self, x: i32, y: i32, z: i32) -> bool {
        let Some(mut section) = self.sections.remove(&pack_section(x, y, z)) else {
            return false;
        };

        section.delete();
        if let Some(region) = self.regions.region_mut(section.region_key()) {
            region.remove_meshes(section.section_index());
            region.remove_empty_storages();
            region.remove_section();
        }

        let position = section.position();
        self.section_metrics.remove_section(position);
        self.snapshots.invalidate(position);
        self.needs_graph_update = true;
        true
    }

    /// Requests a rebuild after the section's blocks changed.
    ///
    /// # Arguments
    /// * `important` - Finish the rebuild before the next frame, unless
    ///   updates are configured to always be deferred
    pub fn schedule_rebuild(&mut self, x: i32, y: i32, z: i32, important: bool) {
        let position = Point3::new(x, y, z);
        self.snapshots.invalidate(position);

        let Some(section) = self.sections.get_mut(&pack_section(x, y, z)) else {
            return;
        };
        let update = if important && !self.config.always_defer_chunk_updates {
            ChunkUpdateType::ImportantRebuild
        } else {
            ChunkUpdateType::Rebuild
        };
        if section.request_update(update) {
            self.needs_graph_update = true;
        }
    }

    /// Moves the camera, requesting re-sorts where translucent geometry was
    /// sorted for a position at least a block away.
    pub fn update_camera(&mut self, camera: Point3<f32>) {
        self.camera = camera;

        for section in self.sections.values_mut() {
            if !section.needs_dynamic_sorting() {
                continue;
            }
            let moved = section
                .last_sort_camera()
                .map_or(true, |last| last.distance(camera) >= RESORT_DISTANCE);
            if moved && section.request_update(ChunkUpdateType::SortOnly) {
                self.needs_graph_update = true;
            }
        }
    }

    /// Computes the render lists and rebuild queues of a frame.
    ///
    /// # Arguments
    /// * `update_immediately` - Queue every visible section with a pending
    ///   update, ignoring the queue caps. Pass the same value to the
    ///   following [`Self::update_chunks`]
    pub fn create_render_lists(&mut self, viewport: &Viewport, frame: i64, update_immediately: bool) {
        self.frame = frame;

        let mut collector = VisibleChunkCollector::new(
            frame,
            self.regions.region_ids_length(),
            self.config.queue_limits,
            update_immediately,
        );
        let stats = OcclusionCuller::new(&self.sections).find_visible(
            &mut collector,
            viewport,
            self.search_distance(),
            self.config.use_occlusion_culling,
            frame,
        );
        let (render_lists, rebuild_lists) = collector.finish();

        self.render_lists = render_lists;
        self.rebuild_lists = rebuild_lists;
        self.needs_graph_update = false;
        debug!(
            "Frame {}: visited {} sections, {} visible",
            frame, stats.visited, stats.visible
        );
    }

    fn search_distance(&self) -> f32 {
        let distance = self.config.render_distance as f32 * SECTION_SIZE as f32;
        if self.config.use_fog_occlusion {
            distance
        } else {
            distance + SECTION_SIZE as f32
        }
    }

    /// Submits jobs for the sections queued by the last [`Self::create_render_lists`].
    ///
    /// # Arguments
    /// * `world` - Source of the snapshots that build tasks mesh
    /// * `update_immediately` - Route every update through the blocking
    ///   collector and wait for it before returning
    pub fn update_chunks(&mut self, world: &World, update_immediately: bool) {
        self.snapshots.cleanup();
        self.job_metrics.tick();

        let mut blocking = self
            .blocking_collector
            .take()
            .unwrap_or_else(|| ChunkJobCollector::unbounded(self.consumer.clone()));

        if update_immediately {
            for update in [
                ChunkUpdateType::ImportantRebuild,
                ChunkUpdateType::SortOnly,
                ChunkUpdateType::InitialBuild,
                ChunkUpdateType::Rebuild,
            ] {
                self.submit_section_tasks(world, &mut blocking, update);
            }
            blocking.await_completion(&self.builder);
            return;
        }

        self.submit_section_tasks(world, &mut blocking, ChunkUpdateType::ImportantRebuild);

        let mut deferred = ChunkJobCollector::new(self.builder.scheduling_budget(), self.consumer.clone());
        for update in [
            ChunkUpdateType::SortOnly,
            ChunkUpdateType::InitialBuild,
            ChunkUpdateType::Rebuild,
        ] {
            self.submit_section_tasks(world, &mut deferred, update);
        }

        self.blocking_collector = Some(blocking);
    }

    fn submit_section_tasks(&mut self, world: &World, collector: &mut ChunkJobCollector, update: ChunkUpdateType) {
        let mut queue = std::mem::take(self.rebuild_lists.queue_mut(update));

        while collector.can_offer() {
            let Some(position) = queue.pop_front() else {
                break;
            };
            let key = pack_section(position.x, position.y, position.z);
            let Some(section) = self.sections.get_mut(&key) else {
                continue;
            };
            if section.is_disposed() || section.build_cancellation_token().is_some() {
                continue;
            }

            let task: Box<dyn ChunkBuilderTask> = if update.is_sort() {
                if !section.needs_dynamic_sorting() {
                    section.set_pending_update(None);
                    continue;
                }
                Box::new(ChunkBuilderSortTask::new(
                    position,
                    self.frame,
                    self.camera,
                    section.translucency_sort_states().clone(),
                ))
            } else {
                match WorldSlice::prepare(world, &mut self.snapshots, position) {
                    Some(context) => Box::new(ChunkBuilderMeshingTask::new(context, self.frame, self.camera)),
                    None => {
                        (self.consumer)(ChunkJobResult::Success {
                            output: ChunkTaskOutput::Build(ChunkBuildOutput::empty(position, self.frame)),
                            execution_time_nanos: 0,
                        });
                        section.set_pending_update(None);
                        section.set_last_submitted_frame(self.frame);
                        continue;
                    }
                }
            };

            let Some(token) = collector.submit(&self.builder, task, update.is_important()) else {
                queue.push_front(position);
                break;
            };
            section.set_build_cancellation_token(Some(token));
            section.set_pending_update(None);
            section.set_last_submitted_frame(self.frame);
            self.total_jobs_submitted += 1;
        }

        *self.rebuild_lists.queue_mut(update) = queue;
    }

    /// Uploads every finished result and applies it to its section.
    ///
    /// Waits for the important jobs submitted by the last
    /// [`Self::update_chunks`] first.
    ///
    /// # Returns
    /// `true` if any result was applied
    ///
    /// # Errors
    /// `RenderError::ResourceExhaustion` if a region arena cannot grow
    pub fn upload_chunks(&mut self, command_list: &mut dyn CommandList) -> RenderResult<bool> {
        if let Some(mut blocking) = self.blocking_collector.take() {
            blocking.await_completion(&self.builder);
        }

        let mut latest: HashMap<(u64, TaskOutputKind), (ChunkTaskOutput, u64)> = HashMap::new();
        for result in self.results.try_iter() {
            self.job_metrics.collect_metrics(&result);
            let (output, nanos) = match result {
                ChunkJobResult::Success {
                    output,
                    execution_time_nanos,
                } => (output, execution_time_nanos),
                ChunkJobResult::Failure { section, .. } => {
                    self.failed_jobs += 1;
                    if let Some(section) = self.sections.get_mut(&pack_section(section.x, section.y, section.z)) {
                        section.clear_finished_token();
                    }
                    continue;
                }
            };

            let position = output.section();
            let key = pack_section(position.x, position.y, position.z);
            let Some(section) = self.sections.get_mut(&key) else {
                continue;
            };
            // A section removed and added again may still receive results of
            // jobs submitted for its previous instance.
            let running = section
                .build_cancellation_token()
                .is_some_and(|token| !token.is_finished());
            if running
                || section.last_submitted_frame() < 0
                || output.build_frame() < section.last_submitted_frame()
            {
                debug!("Dropping stale result for section {:?}", position);
                continue;
            }
            section.clear_finished_token();
            if output.build_frame() < section.last_built_frame() {
                continue;
            }

            let slot = (key, output.kind());
            let newer = latest
                .get(&slot)
                .map_or(true, |(current, _)| output.build_frame() >= current.build_frame());
            if newer {
                latest.insert(slot, (output, nanos));
            }
        }

        if latest.is_empty() {
            self.regions.update(command_list);
            return Ok(false);
        }

        let build_frames: HashMap<u64, i64> = latest
            .iter()
            .filter(|((_, kind), _)| *kind == TaskOutputKind::Build)
            .map(|((key, _), (output, _))| (*key, output.build_frame()))
            .collect();
        let mut pending: Vec<(ChunkTaskOutput, u64)> = latest
            .into_iter()
            .filter(|((key, kind), (output, _))| {
                *kind == TaskOutputKind::Build
                    || build_frames
                        .get(key)
                        .map_or(true, |&frame| output.build_frame() >= frame)
            })
            .map(|(_, entry)| entry)
            .collect();
        pending.sort_by_key(|(output, _)| (output.kind() == TaskOutputKind::Sort, output.build_frame()));

        let mut outputs: Vec<ChunkTaskOutput> = Vec::with_capacity(pending.len());
        let mut durations = Vec::with_capacity(pending.len());
        for (output, nanos) in pending {
            outputs.push(output);
            durations.push(nanos);
        }

        let mut graph_changed = false;
        self.regions
            .upload_meshes(command_list, &mut outputs, || graph_changed = true)?;

        for (output, nanos) in outputs.into_iter().zip(durations) {
            self.apply_output(output, nanos, &mut graph_changed);
        }

        self.regions.update(command_list);
        if graph_changed {
            self.needs_graph_update = true;
        }
        Ok(true)
    }

    fn apply_output(&mut self, output: ChunkTaskOutput, nanos: u64, graph_changed: &mut bool) {
        let position = output.section();
        let Some(section) = self
            .sections
            .get_mut(&pack_section(position.x, position.y, position.z))
        else {
            return;
        };

        match output {
            ChunkTaskOutput::Build(build) => {
                *graph_changed |= section.set_info(Some(build.info));
                section.set_translucency_sort_states(build.sort_states);
                section.set_last_sort_camera(build.camera);
                section.set_last_built_frame(build.build_frame);
                section.set_last_build_duration_nanos(nanos);
                self.section_metrics.update_section_build_duration(position, nanos);
            }
            ChunkTaskOutput::Sort(sort) => {
                section.set_last_sort_camera(sort.camera);
            }
        }
    }

    /// Draws one pass of the current render lists from the current camera.
    ///
    /// # Returns
    /// The number of batches executed
    ///
    /// # Errors
    /// Any error of [`ChunkRenderer::render`]
    pub fn render_pass(
        &mut self,
        renderer: &mut ChunkRenderer,
        command_list: &mut dyn CommandList,
        pass: TerrainRenderPass,
    ) -> RenderResult<usize> {
        renderer.render(command_list, &self.render_lists, pass, self.camera, &mut self.regions)
    }

    /// Whether sections changed since the render lists were last computed.
    pub fn needs_update(&self) -> bool {
        self.needs_graph_update
    }

    pub fn render_lists(&self) -> &SortedRenderLists {
        &self.render_lists
    }

    pub fn rebuild_lists(&self) -> &ChunkRebuildLists {
        &self.rebuild_lists
    }

    pub fn regions(&self) -> &RenderRegionManager {
        &self.regions
    }

    pub fn section(&self, x: i32, y: i32, z: i32) -> Option<&RenderSection> {
        self.sections.get(&pack_section(x, y, z))
    }

    pub fn section_count(&self) -> usize {
        self.sections.len()
    }

    /// The slowest sections by last build time, slowest first.
    pub fn slowest_sections(&self) -> Vec<(Point3<i32>, u64)> {
        self.section_metrics.slowest_sections()
    }

    pub fn job_metrics(&self) -> &ChunkJobMetricsTracker {
        &self.job_metrics
    }

    /// Jobs handed to the builder since creation.
    pub fn total_jobs_submitted(&self) -> u64 {
        self.total_jobs_submitted
    }

    /// Jobs that failed with an error or a panic.
    pub fn failed_jobs(&self) -> u64 {
        self.failed_jobs
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// Human-readable status lines for a debug overlay.
    pub fn debug_strings(&self) -> Vec<String> {
        let memory = self.regions.memory_stats();
        let build = self.job_metrics.stats(TaskOutputKind::Build);
        let queue_sizes = ChunkUpdateType::all()
            .map(|update| self.rebuild_lists.update_count(update).to_string())
            .join("/");

        vec![
            format!(
                "Geometry Pool: {}/{} KiB ({} regions)",
                memory.used / 1024,
                memory.allocated / 1024,
                memory.regions
            ),
            format!(
                "Chunk Builder: {} queued, {} threads, budget {}",
                self.builder.queued_job_count(),
                self.builder.total_threads(),
                self.builder.scheduling_budget()
            ),
            format!(
                "Chunk Updates: {} (S/I/R/IR){}",
                queue_sizes,
                if self.rebuild_lists.has_additional_updates() { " +" } else { "" }
            ),
            format!(
                "Sections: {} loaded, {} drawn, {} failed jobs",
                self.sections.len(),
                self.render_lists.section_count(),
                self.failed_jobs
            ),
            format!(
                "Build Time: avg {:.0}us, max {}us, {} builds/s",
                build.average / 1000.0,
                build.max / 1000,
                self.job_metrics
                    .observations_in_last_time_interval(TaskOutputKind::Build)
            ),
        ]
    }

    /// Stops the builder and releases every section and region.
    pub fn destroy(&mut self, command_list: &mut dyn CommandList) {
        self.blocking_collector = None;
        self.builder.shutdown();
        for section in self.sections.values_mut() {
            section.delete();
        }
        self.sections.clear();
        self.results.try_iter().for_each(drop);
        self.regions.delete(command_list);
        self.render_lists = SortedRenderLists::EMPTY;
        self.rebuild_lists = ChunkRebuildLists::new();
        info!("Destroyed render section manager after {} jobs", self.total_jobs_submitted);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rendering::gpu::recording::RecordingCommandList;
    use crate::rendering::region::region_key;
    use crate::world::block::BlockType;
    use crate::world::GenerationMethod;

    fn config() -> RendererConfig {
        RendererConfig {
            chunk_builder_threads: 4,
            ..Default::default()
        }
    }

    fn world_with_blocks(sections: &[Point3<i32>]) -> World {
        let mut world = World::new(GenerationMethod::Empty, 0);
        for &position in sections {
            world.add_section_at(position);
            let origin = crate::core::position::section_origin(position);
            world.set_block(origin.x + 4, origin.y + 4, origin.z + 4, BlockType::STONE);
        }
        world
    }

    fn manager(world: &World, sections: &[Point3<i32>]) -> (RenderSectionManager, RecordingCommandList) {
        let mut command_list = RecordingCommandList::new();
        let mut manager =
            RenderSectionManager::new(config(), RenderPassConfiguration::default(), &mut command_list).unwrap();
        for position in sections {
            assert!(manager.on_section_added(world, position.x, position.y, position.z));
        }
        (manager, command_list)
    }

    fn viewport() -> Viewport {
        Viewport::unbounded(Point3::new(8.0, 8.0, 8.0))
    }

    #[test]
    fn sections_build_and_upload() {
        let positions = [Point3::new(0, 0, 0), Point3::new(1, 0, 0)];
        let world = world_with_blocks(&positions);
        let (mut manager, mut command_list) = manager(&world, &positions);

        manager.create_render_lists(&viewport(), 1, false);
        assert_eq!(manager.rebuild_lists().update_count(ChunkUpdateType::InitialBuild), 2);
        manager.update_chunks(&world, true);
        assert!(manager.upload_chunks(&mut command_list).unwrap());

        let section = manager.section(0, 0, 0).unwrap();
        assert!(section.is_built());
        assert_eq!(section.last_built_frame(), 1);
        assert!(section.build_cancellation_token().is_none());
        assert!(manager.needs_update());

        manager.create_render_lists(&viewport(), 2, false);
        assert_eq!(manager.render_lists().section_count(), 2);
        let region = manager.regions().region(region_key(Point3::new(0, 0, 0))).unwrap();
        assert!(region.storage(TerrainRenderPass::Solid).is_some());
        assert_eq!(manager.total_jobs_submitted(), 2);
        assert_eq!(manager.slowest_sections().len(), 2);
    }

    #[test]
    fn updating_twice_without_changes_submits_nothing_new() {
        let positions = [Point3::new(0, 0, 0), Point3::new(0, 1, 0), Point3::new(0, 0, 1)];
        let world = world_with_blocks(&positions);
        let (mut manager, mut command_list) = manager(&world, &positions);

        manager.create_render_lists(&viewport(), 1, false);
        manager.update_chunks(&world, false);
        let submitted = manager.total_jobs_submitted();
        assert_eq!(submitted, 3);

        manager.update_chunks(&world, false);
        assert_eq!(manager.total_jobs_submitted(), submitted);

        manager.upload_chunks(&mut command_list).unwrap();
    }

    #[test]
    fn empty_sections_need_no_build() {
        let world = World::new(GenerationMethod::Empty, 0);
        let (mut manager, _command_list) = manager(&world, &[Point3::new(2, 0, 2)]);

        let section = manager.section(2, 0, 2).unwrap();
        assert!(section.is_built());
        assert!(section.pending_update().is_none());

        manager.create_render_lists(&viewport(), 1, false);
        assert!(manager.rebuild_lists().is_empty());
    }

    #[test]
    fn important_rebuilds_finish_before_upload() {
        let positions = [Point3::new(0, 0, 0)];
        let mut world = world_with_blocks(&positions);
        let (mut manager, mut command_list) = manager(&world, &positions);

        manager.create_render_lists(&viewport(), 1, true);
        manager.update_chunks(&world, true);
        manager.upload_chunks(&mut command_list).unwrap();

        for affected in world.set_block(6, 6, 6, BlockType::GLASS) {
            manager.schedule_rebuild(affected.x, affected.y, affected.z, true);
        }
        assert_eq!(
            manager.section(0, 0, 0).unwrap().pending_update(),
            Some(ChunkUpdateType::ImportantRebuild)
        );

        manager.create_render_lists(&viewport(), 2, false);
        manager.update_chunks(&world, false);
        manager.upload_chunks(&mut command_list).unwrap();

        let section = manager.section(0, 0, 0).unwrap();
        assert_eq!(section.last_built_frame(), 2);
        assert!(section.visual_flags() & TerrainRenderPass::Translucent.bit() != 0);
        assert!(section.needs_dynamic_sorting());
    }

    #[test]
    fn removed_sections_release_their_region() {
        let positions = [Point3::new(0, 0, 0)];
        let world = world_with_blocks(&positions);
        let (mut manager, mut command_list) = manager(&world, &positions);

        manager.create_render_lists(&viewport(), 1, true);
        manager.update_chunks(&world, true);
        manager.upload_chunks(&mut command_list).unwrap();
        assert_eq!(manager.regions().memory_stats().regions, 1);

        assert!(manager.on_section_removed(0, 0, 0));
        assert!(!manager.on_section_removed(0, 0, 0));
        manager.upload_chunks(&mut command_list).unwrap();
        assert_eq!(manager.regions().memory_stats().regions, 0);
        assert_eq!(manager.section_count(), 0);
        assert!(manager.slowest_sections().is_empty());
    }

    #[test]
    fn camera_movement_requests_resorts() {
        let positions = [Point3::new(0, 0, 0)];
        let mut world = world_with_blocks(&positions);
        world.set_block(1, 1, 1, BlockType::GLASS);
        world.set_block(9, 1, 1, BlockType::GLASS);
        let (mut manager, mut command_list) = manager(&world, &positions);

        manager.create_render_lists(&viewport(), 1, true);
        manager.update_chunks(&world, true);
        manager.upload_chunks(&mut command_list).unwrap();

        manager.update_camera(Point3::new(0.2, 0.0, 0.0));
        assert_eq!(manager.section(0, 0, 0).unwrap().pending_update(), None);

        manager.update_camera(Point3::new(30.0, 0.0, 0.0));
        assert_eq!(
            manager.section(0, 0, 0).unwrap().pending_update(),
            Some(ChunkUpdateType::SortOnly)
        );

        manager.create_render_lists(&viewport(), 2, true);
        manager.update_chunks(&world, true);
        manager.upload_chunks(&mut command_list).unwrap();
        let section = manager.section(0, 0, 0).unwrap();
        assert_eq!(section.last_sort_camera(), Some(Point3::new(30.0, 0.0, 0.0)));
        assert_eq!(section.last_built_frame(), 1);
        assert_eq!(manager.total_jobs_submitted(), 2);
    }

    #[test]
    fn leftovers_over_budget_are_submitted_exactly_once() {
        let positions: Vec<_> = (0..5)
            .flat_map(|x| (0..4).map(move |z| Point3::new(x, 0, z)))
            .collect();
        let world = world_with_blocks(&positions);
        let mut command_list = RecordingCommandList::new();
        let config = RendererConfig {
            chunk_builder_threads: 1,
            ..Default::default()
        };
        let mut manager =
            RenderSectionManager::new(config, RenderPassConfiguration::default(), &mut command_list).unwrap();
        for position in &positions {
            manager.on_section_added(&world, position.x, position.y, position.z);
        }

        manager.create_render_lists(&viewport(), 1, false);
        assert_eq!(manager.rebuild_lists().update_count(ChunkUpdateType::InitialBuild), 20);
        manager.update_chunks(&world, false);
        let first = manager.total_jobs_submitted() as usize;
        assert!(first <= 2);
        assert_eq!(
            manager.rebuild_lists().update_count(ChunkUpdateType::InitialBuild),
            20 - first
        );

        let mut rounds = 0;
        while positions
            .iter()
            .any(|p| !manager.section(p.x, p.y, p.z).unwrap().is_built())
        {
            assert!(rounds < 5_000, "sections never finished building");
            manager.update_chunks(&world, false);
            manager.upload_chunks(&mut command_list).unwrap();
            std::thread::sleep(Duration::from_millis(1));
            rounds += 1;
        }

        assert_eq!(manager.total_jobs_submitted(), 20);
        assert!(manager.rebuild_lists().is_empty());
        manager.update_chunks(&world, false);
        assert_eq!(manager.total_jobs_submitted(), 20);
        manager.destroy(&mut command_list);
    }

    #[test]
    fn results_for_a_removed_section_are_not_applied_to_its_replacement() {
        let positions = [Point3::new(0, 0, 0)];
        let mut world = world_with_blocks(&positions);
        let (mut manager, mut command_list) = manager(&world, &positions);

        manager.create_render_lists(&viewport(), 1, true);
        manager.update_chunks(&world, true);

        assert!(manager.on_section_removed(0, 0, 0));
        world.set_block(4, 4, 4, BlockType::AIR);
        assert!(manager.on_section_added(&world, 0, 0, 0));

        manager.upload_chunks(&mut command_list).unwrap();
        let section = manager.section(0, 0, 0).unwrap();
        assert!(!section.has_anything_to_render());
        assert_eq!(section.last_built_frame(), -1);
        let region = manager.regions().region(region_key(Point3::new(0, 0, 0))).unwrap();
        assert!(region.storage(TerrainRenderPass::Solid).is_none());
    }

    #[test]
    fn updating_immediately_ignores_the_queue_caps() {
        let positions: Vec<_> = (0..6).map(|x| Point3::new(x, 0, 0)).collect();
        let world = world_with_blocks(&positions);
        let mut command_list = RecordingCommandList::new();
        let mut config = config();
        config.queue_limits.initial_build = 2;
        let mut manager =
            RenderSectionManager::new(config, RenderPassConfiguration::default(), &mut command_list).unwrap();
        for position in &positions {
            manager.on_section_added(&world, position.x, position.y, position.z);
        }

        manager.create_render_lists(&viewport(), 1, false);
        assert_eq!(manager.rebuild_lists().update_count(ChunkUpdateType::InitialBuild), 2);
        assert!(manager.rebuild_lists().has_additional_updates());

        manager.create_render_lists(&viewport(), 1, true);
        assert_eq!(manager.rebuild_lists().update_count(ChunkUpdateType::InitialBuild), 6);
        manager.update_chunks(&world, true);
        manager.upload_chunks(&mut command_list).unwrap();
        assert_eq!(manager.total_jobs_submitted(), 6);
        assert!(positions
            .iter()
            .all(|p| manager.section(p.x, p.y, p.z).unwrap().is_built()));
    }

    #[test]
    fn destroy_releases_everything() {
        let positions = [Point3::new(0, 0, 0)];
        let world = world_with_blocks(&positions);
        let (mut manager, mut command_list) = manager(&world, &positions);

        manager.create_render_lists(&viewport(), 1, true);
        manager.update_chunks(&world, true);
        manager.upload_chunks(&mut command_list).unwrap();
        assert_eq!(manager.debug_strings().len(), 5);

        manager.destroy(&mut command_list);
        assert_eq!(manager.section_count(), 0);
        assert_eq!(command_list.live_buffer_count(), 0);
    }
}
