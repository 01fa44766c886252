//! # Region Manager
//!
//! Owns every [`RenderRegion`], hands out small stable region ids and moves
//! finished build and sort results into the regions' arenas.
//!
//! ## Architecture
//!
//! Region ids come from a bit set: a new region takes the lowest clear bit at
//! or after `next_free_id`, and deleting a region lowers `next_free_id` back to
//! the freed id so ids stay dense. Render lists index per-region tables by id.
//!
//! Uploads are grouped by region and then by vertex format so each arena sees
//! one batched upload per frame. Only the main thread calls into the manager.

use std::collections::{BTreeMap, HashMap};

use bitvec::prelude::*;
use cgmath::Point3;
use log::{debug, warn};

use crate::error::RenderResult;
use crate::rendering::arena::PendingUpload;
use crate::rendering::compile::output::ChunkTaskOutput;
use crate::rendering::compile::render_pass::{RenderPassConfiguration, TerrainRenderPass, VertexFormat};
use crate::rendering::gpu::staging_buffer::StagingBuffer;
use crate::rendering::gpu::CommandList;
use crate::world::facing::ModelQuadFacing;

use super::{region_coordinates, region_key, section_index, RegionKey, RenderRegion};

/// Key and id of a region.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct RegionHandle {
    pub key: RegionKey,
    pub id: u32,
}

/// Device memory used by all regions.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct RegionMemoryStats {
    pub regions: usize,
    pub used: u64,
    pub allocated: u64,
}

struct FormatBatch {
    format: VertexFormat,
    vertex_uploads: Vec<PendingUpload>,
    vertex_targets: Vec<(usize, TerrainRenderPass, [u32; ModelQuadFacing::COUNT])>,
    index_uploads: Vec<PendingUpload>,
    index_targets: Vec<(usize, TerrainRenderPass)>,
}

impl FormatBatch {
    fn new(format: VertexFormat) -> Self {
        Self {
            format,
            vertex_uploads: Vec::new(),
            vertex_targets: Vec::new(),
            index_uploads: Vec::new(),
            index_targets: Vec::new(),
        }
    }
}

/// Registry of render regions.
pub struct RenderRegionManager {
    regions: HashMap<RegionKey, RenderRegion>,
    regions_by_id: HashMap<u32, RegionKey>,
    region_ids: BitVec,
    next_free_id: usize,
    staging: StagingBuffer,
    pass_config: RenderPassConfiguration,
    initial_arena_capacity: u64,
}

impl RenderRegionManager {
    /// Creates a manager and its staging buffer.
    ///
    /// # Arguments
    /// * `pass_config` - Vertex format of every render pass
    /// * `initial_arena_capacity` - Initial geometry arena size in bytes
    pub fn new(
        command_list: &mut dyn CommandList,
        pass_config: RenderPassConfiguration,
        initial_arena_capacity: u64,
    ) -> RenderResult<Self> {
        let functions = command_list.device_functions();
        Ok(Self {
            regions: HashMap::new(),
            regions_by_id: HashMap::new(),
            region_ids: BitVec::new(),
            next_free_id: 0,
            staging: StagingBuffer::new(command_list, &functions)?,
            pass_config,
            initial_arena_capacity,
        })
    }

    /// Returns the region containing a section, creating it if needed.
    pub fn create_for_chunk(&mut self, x: i32, y: i32, z: i32) -> RegionHandle {
        let section = Point3::new(x, y, z);
        let key = region_key(section);
        if let Some(region) = self.regions.get(&key) {
            return RegionHandle { key, id: region.id() };
        }

        let id = self.get_next_id();
        let coordinates = region_coordinates(section);
        debug!("Created region {} at {:?}", id, coordinates);
        self.regions.insert(
            key,
            RenderRegion::new(coordinates.x, coordinates.y, coordinates.z, id, self.pass_config),
        );
        self.regions_by_id.insert(id, key);
        RegionHandle { key, id }
    }

    fn get_next_id(&mut self) -> u32 {
        let id = self.region_ids[self.next_free_id..]
            .first_zero()
            .map_or(self.region_ids.len(), |offset| self.next_free_id + offset);
        if id == self.region_ids.len() {
            self.region_ids.push(true);
        } else {
            self.region_ids.set(id, true);
        }
        self.next_free_id = id + 1;
        id as u32
    }

    /// One past the highest id in use.
    pub fn region_ids_length(&self) -> usize {
        self.region_ids.last_one().map_or(0, |id| id + 1)
    }

    /// Per-frame maintenance: flips the staging buffer, releases empty device
    /// resources and deletes regions with no sections and no geometry.
    pub fn update(&mut self, command_list: &mut dyn CommandList) {
        self.staging.flip();

        let mut deleted = Vec::new();
        for (&key, region) in self.regions.iter_mut() {
            region.update(command_list);
            if region.is_empty() {
                deleted.push(key);
            }
        }

        for key in deleted {
            if let Some(mut region) = self.regions.remove(&key) {
                let id = region.id();
                region.delete(command_list);
                self.regions_by_id.remove(&id);
                self.region_ids.set(id as usize, false);
                self.next_free_id = self.next_free_id.min(id as usize);
                debug!("Deleted region {}", id);
            }
        }
    }

    /// Uploads the geometry of finished build and sort results.
    ///
    /// Vertex and index bytes are moved out of `outputs`; everything else is
    /// left for the caller to apply to its sections.
    ///
    /// # Arguments
    /// * `outputs` - Results to upload, already filtered to live sections
    /// * `on_graph_changed` - Called when a region's set of passes with geometry changes
    ///
    /// # Errors
    /// `RenderError::ResourceExhaustion` if an arena cannot grow
    pub fn upload_meshes(
        &mut self,
        command_list: &mut dyn CommandList,
        outputs: &mut [ChunkTaskOutput],
        mut on_graph_changed: impl FnMut(),
    ) -> RenderResult<()> {
        let mut by_region: BTreeMap<RegionKey, Vec<&mut ChunkTaskOutput>> = BTreeMap::new();
        for output in outputs.iter_mut() {
            by_region.entry(region_key(output.section())).or_default().push(output);
        }

        for (key, outputs) in by_region {
            let Some(region) = self.regions.get_mut(&key) else {
                warn!("Dropping results for unloaded region {:?}", super::unpack_region_key(key));
                continue;
            };
            let cookie = region.pass_set_update_count();

            Self::upload_region(
                command_list,
                &mut self.staging,
                &self.pass_config,
                self.initial_arena_capacity,
                region,
                outputs,
            )?;

            region.remove_empty_storages();
            if region.pass_set_update_count() != cookie {
                on_graph_changed();
            }
        }

        self.staging.flush(command_list);
        Ok(())
    }

    fn upload_region(
        command_list: &mut dyn CommandList,
        staging: &mut StagingBuffer,
        pass_config: &RenderPassConfiguration,
        initial_arena_capacity: u64,
        region: &mut RenderRegion,
        outputs: Vec<&mut ChunkTaskOutput>,
    ) -> RenderResult<()> {
        let mut batches: BTreeMap<u32, FormatBatch> = BTreeMap::new();

        for output in outputs {
            let index = section_index(output.section());
            match output {
                ChunkTaskOutput::Build(build) => {
                    region.remove_meshes(index);
                    for (&pass, parts) in build.meshes.iter_mut() {
                        if parts.vertex_data.is_empty() {
                            continue;
                        }
                        let format = pass_config.vertex_format(pass);
                        let batch = batches.entry(format.id).or_insert_with(|| FormatBatch::new(format));
                        batch
                            .vertex_uploads
                            .push(PendingUpload::new(std::mem::take(&mut parts.vertex_data)));
                        batch.vertex_targets.push((index, pass, parts.vertex_ranges));
                        if let Some(indices) = parts.index_data.take() {
                            batch.index_uploads.push(PendingUpload::new(indices));
                            batch.index_targets.push((index, pass));
                        }
                    }
                }
                ChunkTaskOutput::Sort(sort) => {
                    for (&pass, indices) in sort.meshes.iter_mut() {
                        let has_vertices = region
                            .storage(pass)
                            .is_some_and(|storage| storage.has_vertex_data(index));
                        if !has_vertices {
                            continue;
                        }
                        region.remove_index_data(pass, index);
                        let format = pass_config.vertex_format(pass);
                        let batch = batches.entry(format.id).or_insert_with(|| FormatBatch::new(format));
                        batch.index_uploads.push(PendingUpload::new(std::mem::take(indices)));
                        batch.index_targets.push((index, pass));
                    }
                }
            }
        }

        for (_, mut batch) in batches {
            let format = batch.format;
            let mut buffer_changed = false;

            if !batch.vertex_uploads.is_empty() {
                let resources = region.create_resources(command_list, format, initial_arena_capacity)?;
                buffer_changed |=
                    resources
                        .geometry_arena
                        .upload(command_list, staging, &mut batch.vertex_uploads)?;
            }
            if !batch.index_uploads.is_empty() {
                let arena = region.index_arena_mut(command_list, format, initial_arena_capacity)?;
                buffer_changed |= arena.upload(command_list, staging, &mut batch.index_uploads)?;
            }

            for (upload, (index, pass, ranges)) in batch.vertex_uploads.iter().zip(batch.vertex_targets) {
                if let Some(segment) = upload.result() {
                    region.create_storage(pass).set_vertex_data(index, segment, ranges);
                }
            }
            for (upload, (index, pass)) in batch.index_uploads.iter().zip(batch.index_targets) {
                if let Some(segment) = upload.result() {
                    region.create_storage(pass).set_index_data(index, segment);
                }
            }

            if buffer_changed {
                region.refresh(command_list, format);
            }
        }

        Ok(())
    }

    pub fn region(&self, key: RegionKey) -> Option<&RenderRegion> {
        self.regions.get(&key)
    }

    pub fn region_mut(&mut self, key: RegionKey) -> Option<&mut RenderRegion> {
        self.regions.get_mut(&key)
    }

    pub fn region_by_id(&self, id: u32) -> Option<&RenderRegion> {
        self.regions_by_id.get(&id).and_then(|key| self.regions.get(key))
    }

    pub fn loaded_regions(&self) -> impl Iterator<Item = &RenderRegion> {
        self.regions.values()
    }

    pub fn pass_config(&self) -> &RenderPassConfiguration {
        &self.pass_config
    }

    /// Device memory summed over every region.
    pub fn memory_stats(&self) -> RegionMemoryStats {
        self.regions.values().fold(
            RegionMemoryStats {
                regions: self.regions.len(),
                ..Default::default()
            },
            |total, region| {
                let stats = region.stats();
                RegionMemoryStats {
                    used: total.used + stats.used,
                    allocated: total.allocated + stats.allocated,
                    ..total
                }
            },
        )
    }

    /// Releases every region and the staging buffer.
    pub fn delete(&mut self, command_list: &mut dyn CommandList) {
        for (_, mut region) in self.regions.drain() {
            region.delete(command_list);
        }
        self.regions_by_id.clear();
        self.region_ids.clear();
        self.next_free_id = 0;
        self.staging.delete(command_list);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rendering::compile::output::{BuiltSectionMeshParts, ChunkBuildOutput, ChunkSortOutput};
    use crate::rendering::gpu::recording::RecordingCommandList;
    use crate::rendering::section::{BuiltRenderSectionData, VisibilityEncoding};

    fn manager(command_list: &mut RecordingCommandList) -> RenderRegionManager {
        RenderRegionManager::new(command_list, RenderPassConfiguration::default(), 24 * 64).unwrap()
    }

    fn build_output(section: Point3<i32>, passes: &[(TerrainRenderPass, u32)]) -> ChunkTaskOutput {
        let mut output = ChunkBuildOutput::empty(section, 0);
        let mut mask = 0;
        for &(pass, quads) in passes {
            let facing = if pass.is_sorted() {
                ModelQuadFacing::Unassigned
            } else {
                ModelQuadFacing::PosY
            };
            let mut vertex_ranges = [0; ModelQuadFacing::COUNT];
            vertex_ranges[facing.index()] = quads * 4;
            let vertex_data = (0..quads * 4 * 24).map(|i| (i % 251) as u8).collect();
            let index_data = pass
                .is_sorted()
                .then(|| bytemuck::cast_slice(&vec![7u32; quads as usize * 6]).to_vec());
            output.meshes.insert(
                pass,
                BuiltSectionMeshParts {
                    vertex_data,
                    index_data,
                    vertex_ranges,
                },
            );
            mask |= pass.bit();
        }
        output.info = BuiltRenderSectionData::new(mask, VisibilityEncoding::EVERYTHING);
        ChunkTaskOutput::Build(output)
    }

    fn region_contents(command_list: &RecordingCommandList, region: &RenderRegion) -> Vec<u8> {
        let format = RenderPassConfiguration::default().vertex_format(TerrainRenderPass::Solid);
        let arena = region.resources(format).unwrap().geometry_arena();
        command_list.buffer_contents(arena.buffer()).unwrap().to_vec()
    }

    #[test]
    fn region_ids_are_reused_after_deletion() {
        let mut command_list = RecordingCommandList::new();
        let mut manager = manager(&mut command_list);

        let a = manager.create_for_chunk(0, 0, 0);
        let b = manager.create_for_chunk(8, 0, 0);
        let c = manager.create_for_chunk(16, 0, 0);
        assert_eq!((a.id, b.id, c.id), (0, 1, 2));
        assert_eq!(manager.create_for_chunk(1, 1, 1), a);

        for handle in [b, c] {
            manager.region_mut(handle.key).unwrap().add_section();
        }
        manager.update(&mut command_list);
        assert!(manager.region(a.key).is_none());
        assert_eq!(manager.region_ids_length(), 3);

        let d = manager.create_for_chunk(-8, 0, 0);
        assert_eq!(d.id, 0);
        assert_eq!(manager.create_for_chunk(24, 0, 0).id, 3);
        assert_eq!(manager.region_by_id(0).map(RenderRegion::key), Some(d.key));
    }

    #[test]
    fn build_results_fill_storage_and_fire_the_graph_trigger() {
        let mut command_list = RecordingCommandList::new();
        let mut manager = manager(&mut command_list);
        let handle = manager.create_for_chunk(0, 0, 0);
        manager.region_mut(handle.key).unwrap().add_section();

        let section = Point3::new(1, 0, 0);
        let mut outputs = vec![build_output(
            section,
            &[(TerrainRenderPass::Solid, 2), (TerrainRenderPass::Translucent, 3)],
        )];
        let mut changes = 0;
        manager
            .upload_meshes(&mut command_list, &mut outputs, || changes += 1)
            .unwrap();
        assert_eq!(changes, 1);

        let region = manager.region(handle.key).unwrap();
        let index = section_index(section);
        let solid = region.storage(TerrainRenderPass::Solid).unwrap().mesh_data(index);
        assert_eq!(solid.element_count[ModelQuadFacing::PosY.index()], 12);
        let translucent = region.storage(TerrainRenderPass::Translucent).unwrap();
        assert!(translucent.has_index_data(index));

        let mut outputs = vec![ChunkTaskOutput::Sort(ChunkSortOutput {
            section,
            build_frame: 1,
            meshes: [(TerrainRenderPass::Translucent, vec![0; 18 * 4])].into_iter().collect(),
            camera: Point3::new(0.0, 0.0, 0.0),
        })];
        manager
            .upload_meshes(&mut command_list, &mut outputs, || changes += 1)
            .unwrap();
        assert_eq!(changes, 1);
        let region = manager.region(handle.key).unwrap();
        assert!(region
            .storage(TerrainRenderPass::Translucent)
            .unwrap()
            .has_index_data(index));
        assert!(region.storage(TerrainRenderPass::Solid).unwrap().has_vertex_data(index));

        let mut outputs = vec![ChunkTaskOutput::Build(ChunkBuildOutput::empty(section, 2))];
        manager
            .upload_meshes(&mut command_list, &mut outputs, || changes += 1)
            .unwrap();
        assert_eq!(changes, 2);
        assert!(manager.region(handle.key).unwrap().storage(TerrainRenderPass::Solid).is_none());
    }

    #[test]
    fn sort_results_for_sections_without_geometry_are_ignored() {
        let mut command_list = RecordingCommandList::new();
        let mut manager = manager(&mut command_list);
        let handle = manager.create_for_chunk(0, 0, 0);

        let mut outputs = vec![ChunkTaskOutput::Sort(ChunkSortOutput {
            section: Point3::new(0, 0, 0),
            build_frame: 0,
            meshes: [(TerrainRenderPass::Translucent, vec![0; 24])].into_iter().collect(),
            camera: Point3::new(0.0, 0.0, 0.0),
        })];
        manager.upload_meshes(&mut command_list, &mut outputs, || {}).unwrap();
        assert!(manager
            .region(handle.key)
            .unwrap()
            .storage(TerrainRenderPass::Translucent)
            .is_none());
    }

    #[test]
    fn rebuilding_an_emptied_region_matches_a_fresh_one() {
        let section = Point3::new(2, 1, 3);
        let passes = [(TerrainRenderPass::Solid, 5)];

        let mut fresh_list = RecordingCommandList::new();
        let mut fresh = manager(&mut fresh_list);
        let fresh_handle = fresh.create_for_chunk(section.x, section.y, section.z);
        fresh.region_mut(fresh_handle.key).unwrap().add_section();
        fresh
            .upload_meshes(&mut fresh_list, &mut [build_output(section, &passes)], || {})
            .unwrap();
        let expected = region_contents(&fresh_list, fresh.region(fresh_handle.key).unwrap());

        let mut command_list = RecordingCommandList::new();
        let mut manager = manager(&mut command_list);
        let handle = manager.create_for_chunk(section.x, section.y, section.z);
        manager.region_mut(handle.key).unwrap().add_section();
        manager
            .upload_meshes(&mut command_list, &mut [build_output(section, &[(TerrainRenderPass::Solid, 9)])], || {})
            .unwrap();

        let region = manager.region_mut(handle.key).unwrap();
        region.remove_meshes(section_index(section));
        region.remove_empty_storages();
        region.remove_section();
        manager.update(&mut command_list);
        assert!(manager.region(handle.key).is_none());

        let handle = manager.create_for_chunk(section.x, section.y, section.z);
        manager.region_mut(handle.key).unwrap().add_section();
        manager
            .upload_meshes(&mut command_list, &mut [build_output(section, &passes)], || {})
            .unwrap();
        assert_eq!(
            region_contents(&command_list, manager.region(handle.key).unwrap()),
            expected
        );
    }

    #[test]
    fn rebuilding_a_section_reuses_its_freed_geometry() {
        let anchor = Point3::new(3, 1, 3);
        let section = Point3::new(2, 1, 3);
        assert_eq!(region_key(anchor), region_key(section));
        let passes = [(TerrainRenderPass::Solid, 5)];

        let mut fresh_list = RecordingCommandList::new();
        let mut fresh = manager(&mut fresh_list);
        let fresh_handle = fresh.create_for_chunk(section.x, section.y, section.z);
        fresh.region_mut(fresh_handle.key).unwrap().add_section();
        fresh.region_mut(fresh_handle.key).unwrap().add_section();
        fresh
            .upload_meshes(&mut fresh_list, &mut [build_output(anchor, &[(TerrainRenderPass::Solid, 2)])], || {})
            .unwrap();
        fresh
            .upload_meshes(&mut fresh_list, &mut [build_output(section, &passes)], || {})
            .unwrap();

        let mut command_list = RecordingCommandList::new();
        let mut manager = manager(&mut command_list);
        let handle = manager.create_for_chunk(section.x, section.y, section.z);
        manager.region_mut(handle.key).unwrap().add_section();
        manager.region_mut(handle.key).unwrap().add_section();
        manager
            .upload_meshes(&mut command_list, &mut [build_output(anchor, &[(TerrainRenderPass::Solid, 2)])], || {})
            .unwrap();
        manager
            .upload_meshes(&mut command_list, &mut [build_output(section, &[(TerrainRenderPass::Solid, 9)])], || {})
            .unwrap();

        let region = manager.region_mut(handle.key).unwrap();
        region.remove_meshes(section_index(section));
        region.remove_empty_storages();
        region.remove_section();
        manager.update(&mut command_list);
        assert_eq!(manager.region(handle.key).map(RenderRegion::id), Some(handle.id));

        manager.region_mut(handle.key).unwrap().add_section();
        manager
            .upload_meshes(&mut command_list, &mut [build_output(section, &passes)], || {})
            .unwrap();

        let expected_region = fresh.region(fresh_handle.key).unwrap();
        let region = manager.region(handle.key).unwrap();
        let expected_storage = expected_region.storage(TerrainRenderPass::Solid).unwrap();
        let storage = region.storage(TerrainRenderPass::Solid).unwrap();
        for position in [anchor, section] {
            assert_eq!(
                storage.mesh_data(section_index(position)),
                expected_storage.mesh_data(section_index(position))
            );
        }

        let mesh = storage.mesh_data(section_index(section));
        let facing = ModelQuadFacing::PosY.index();
        assert_eq!(mesh.vertex_offset[facing], 8);
        let used_bytes = (mesh.vertex_offset[facing] as usize + 5 * 4) * 24;
        assert_eq!(
            region_contents(&command_list, region)[..used_bytes],
            region_contents(&fresh_list, expected_region)[..used_bytes]
        );
    }

    #[test]
    fn arena_growth_keeps_draw_data_consistent() {
        let mut command_list = RecordingCommandList::new();
        let mut manager = RenderRegionManager::new(&mut command_list, RenderPassConfiguration::default(), 24 * 8).unwrap();
        let handle = manager.create_for_chunk(0, 0, 0);

        let first = Point3::new(0, 0, 0);
        let second = Point3::new(1, 0, 0);
        manager
            .upload_meshes(&mut command_list, &mut [build_output(first, &[(TerrainRenderPass::Solid, 1)])], || {})
            .unwrap();
        manager
            .upload_meshes(&mut command_list, &mut [build_output(second, &[(TerrainRenderPass::Solid, 4)])], || {})
            .unwrap();

        let region = manager.region(handle.key).unwrap();
        let storage = region.storage(TerrainRenderPass::Solid).unwrap();
        let facing = ModelQuadFacing::PosY.index();
        assert_eq!(storage.mesh_data(section_index(first)).vertex_offset[facing], 0);
        assert_eq!(storage.mesh_data(section_index(second)).vertex_offset[facing], 4);

        let bytes = region_contents(&command_list, region);
        let expected: Vec<u8> = (0..4 * 24).map(|i| (i % 251) as u8).collect();
        assert_eq!(&bytes[..4 * 24], &expected[..]);
        assert_eq!(manager.memory_stats().regions, 1);
    }
}
