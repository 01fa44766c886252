//! # Render Regions
//!
//! Sections are grouped into regions of 8×4×8 so their geometry can share a
//! few large device buffers and be drawn with one multidraw batch per pass.
//!
//! ## Key Components
//!
//! * [`RenderRegion`] - Occupancy, per-pass storage and per-format device resources
//! * [`storage::SectionRenderDataStorage`] - Where each section's geometry lives
//! * [`manager::RenderRegionManager`] - Region lifetime, stable ids and mesh uploads

pub mod manager;
pub mod storage;

use std::collections::HashMap;

use cgmath::Point3;
use log::debug;

use crate::core::position::{pack_section, unpack_section};
use crate::error::RenderResult;
use crate::rendering::arena::{ArenaStats, BufferArena};
use crate::rendering::compile::render_pass::{RenderPassConfiguration, TerrainRenderPass, VertexFormat};
use crate::rendering::gpu::{CommandList, GpuBuffer, Tessellation};

use storage::SectionRenderDataStorage;

pub const REGION_WIDTH: i32 = 8;
pub const REGION_HEIGHT: i32 = 4;
pub const REGION_LENGTH: i32 = 8;

pub const REGION_WIDTH_SH: i32 = 3;
pub const REGION_HEIGHT_SH: i32 = 2;
pub const REGION_LENGTH_SH: i32 = 3;

/// Sections per region.
pub const REGION_SIZE: usize = (REGION_WIDTH * REGION_HEIGHT * REGION_LENGTH) as usize;

/// Packed region coordinates.
pub type RegionKey = u64;

/// Region coordinates containing a section.
#[inline]
pub fn region_coordinates(section: Point3<i32>) -> Point3<i32> {
    Point3::new(
        section.x >> REGION_WIDTH_SH,
        section.y >> REGION_HEIGHT_SH,
        section.z >> REGION_LENGTH_SH,
    )
}

/// Key of the region containing a section.
#[inline]
pub fn region_key(section: Point3<i32>) -> RegionKey {
    let region = region_coordinates(section);
    pack_section(region.x, region.y, region.z)
}

/// Index of a section inside its region.
#[inline]
pub fn section_index(section: Point3<i32>) -> usize {
    (((section.y & (REGION_HEIGHT - 1)) << (REGION_WIDTH_SH + REGION_LENGTH_SH))
        | ((section.z & (REGION_LENGTH - 1)) << REGION_WIDTH_SH)
        | (section.x & (REGION_WIDTH - 1))) as usize
}

/// Device buffers of one vertex format within a region.
pub struct DeviceResources {
    format: VertexFormat,
    geometry_arena: BufferArena,
    index_arena: Option<BufferArena>,
    index_tessellation: Option<Tessellation>,
    shared_tessellation: Option<(GpuBuffer, Tessellation)>,
}

impl DeviceResources {
    fn new(command_list: &mut dyn CommandList, format: VertexFormat, initial_bytes: u64) -> RenderResult<Self> {
        Ok(Self {
            format,
            geometry_arena: BufferArena::new(
                command_list,
                &format!("Region Geometry ({})", format.name),
                format.stride,
                initial_bytes,
            )?,
            index_arena: None,
            index_tessellation: None,
            shared_tessellation: None,
        })
    }

    /// Arena holding vertices.
    pub fn geometry_arena(&self) -> &BufferArena {
        &self.geometry_arena
    }

    /// Arena holding per-section index data, if any was ever uploaded.
    pub fn index_arena(&self) -> Option<&BufferArena> {
        self.index_arena.as_ref()
    }

    fn should_delete(&self) -> bool {
        self.geometry_arena.is_empty() && self.index_arena.as_ref().map_or(true, BufferArena::is_empty)
    }

    fn delete_tessellations(&mut self, command_list: &mut dyn CommandList) {
        if let Some(tessellation) = self.index_tessellation.take() {
            command_list.delete_tessellation(tessellation);
        }
        if let Some((_, tessellation)) = self.shared_tessellation.take() {
            command_list.delete_tessellation(tessellation);
        }
    }

    fn delete(&mut self, command_list: &mut dyn CommandList) {
        self.delete_tessellations(command_list);
        self.geometry_arena.delete(command_list);
        if let Some(arena) = self.index_arena.as_mut() {
            arena.delete(command_list);
        }
    }

    fn stats(&self) -> ArenaStats {
        let geometry = self.geometry_arena.stats();
        let index = self.index_arena.as_ref().map(BufferArena::stats).unwrap_or_default();
        ArenaStats {
            used: geometry.used + index.used,
            allocated: geometry.allocated + index.allocated,
        }
    }
}

/// A group of up to [`REGION_SIZE`] sections sharing device buffers.
pub struct RenderRegion {
    x: i32,
    y: i32,
    z: i32,
    id: u32,
    section_count: u32,
    storage: HashMap<TerrainRenderPass, SectionRenderDataStorage>,
    resources: HashMap<u32, DeviceResources>,
    pass_config: RenderPassConfiguration,
    pass_set_update_count: u64,
}

impl RenderRegion {
    /// Creates an empty region at region coordinates `(x, y, z)`.
    pub fn new(x: i32, y: i32, z: i32, id: u32, pass_config: RenderPassConfiguration) -> Self {
        Self {
            x,
            y,
            z,
            id,
            section_count: 0,
            storage: HashMap::new(),
            resources: HashMap::new(),
            pass_config,
            pass_set_update_count: 0,
        }
    }

    /// Stable small id, reused after deletion.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Packed region coordinates.
    pub fn key(&self) -> RegionKey {
        pack_section(self.x, self.y, self.z)
    }

    /// Region coordinates.
    pub fn coordinates(&self) -> Point3<i32> {
        Point3::new(self.x, self.y, self.z)
    }

    /// Section coordinates of the section at `section_index`.
    pub fn section_coordinates(&self, section_index: usize) -> Point3<i32> {
        let index = section_index as i32;
        Point3::new(
            (self.x << REGION_WIDTH_SH) + (index & (REGION_WIDTH - 1)),
            (self.y << REGION_HEIGHT_SH) + (index >> (REGION_WIDTH_SH + REGION_LENGTH_SH)),
            (self.z << REGION_LENGTH_SH) + ((index >> REGION_WIDTH_SH) & (REGION_LENGTH - 1)),
        )
    }

    /// Counts a newly added section.
    pub fn add_section(&mut self) {
        self.section_count += 1;
    }

    /// Forgets a removed section.
    pub fn remove_section(&mut self) {
        self.section_count = self.section_count.saturating_sub(1);
    }

    /// Number of sections registered in the region.
    pub fn section_count(&self) -> u32 {
        self.section_count
    }

    /// Counter bumped whenever the set of passes with storage changes.
    pub fn pass_set_update_count(&self) -> u64 {
        self.pass_set_update_count
    }

    /// Storage of a pass, if the region has geometry for it.
    pub fn storage(&self, pass: TerrainRenderPass) -> Option<&SectionRenderDataStorage> {
        self.storage.get(&pass)
    }

    /// Storage of a pass, created on demand.
    pub fn create_storage(&mut self, pass: TerrainRenderPass) -> &mut SectionRenderDataStorage {
        let cookie = &mut self.pass_set_update_count;
        self.storage.entry(pass).or_insert_with(|| {
            *cookie += 1;
            SectionRenderDataStorage::new()
        })
    }

    /// Drops storages no section uses anymore.
    pub fn remove_empty_storages(&mut self) {
        let before = self.storage.len();
        self.storage.retain(|_, storage| !storage.is_empty());
        if self.storage.len() != before {
            self.pass_set_update_count += 1;
        }
    }

    /// Device resources of a format, if allocated.
    pub fn resources(&self, format: VertexFormat) -> Option<&DeviceResources> {
        self.resources.get(&format.id)
    }

    /// Device resources of a format, allocated on demand.
    pub fn create_resources(
        &mut self,
        command_list: &mut dyn CommandList,
        format: VertexFormat,
        initial_bytes: u64,
    ) -> RenderResult<&mut DeviceResources> {
        if !self.resources.contains_key(&format.id) {
            debug!("Allocating {} resources for region {}", format.name, self.id);
            let resources = DeviceResources::new(command_list, format, initial_bytes)?;
            self.resources.insert(format.id, resources);
        }
        Ok(self
            .resources
            .get_mut(&format.id)
            .unwrap_or_else(|| unreachable!("resources inserted above")))
    }

    /// Frees every allocation of a section in every pass.
    pub fn remove_meshes(&mut self, section_index: usize) {
        for (pass, storage) in self.storage.iter_mut() {
            let Some((vertex, index)) = storage.remove_data(section_index) else {
                continue;
            };
            let format = self.pass_config.vertex_format(*pass);
            if let Some(resources) = self.resources.get_mut(&format.id) {
                resources.geometry_arena.free(vertex);
                if let (Some(index), Some(arena)) = (index, resources.index_arena.as_mut()) {
                    arena.free(index);
                }
            }
        }
    }

    /// Frees the per-section index data of one pass.
    pub fn remove_index_data(&mut self, pass: TerrainRenderPass, section_index: usize) {
        let Some(index) = self
            .storage
            .get_mut(&pass)
            .and_then(|storage| storage.remove_index_data(section_index))
        else {
            return;
        };
        let format = self.pass_config.vertex_format(pass);
        if let Some(arena) = self
            .resources
            .get_mut(&format.id)
            .and_then(|resources| resources.index_arena.as_mut())
        {
            arena.free(index);
        }
    }

    /// Drops cached tessellations of a format and regenerates the draw data
    /// of every pass using it. Called after an arena buffer was replaced.
    pub fn refresh(&mut self, command_list: &mut dyn CommandList, format: VertexFormat) {
        if let Some(resources) = self.resources.get_mut(&format.id) {
            resources.delete_tessellations(command_list);
        }
        for (pass, storage) in self.storage.iter_mut() {
            if self.pass_config.vertex_format(*pass) == format {
                storage.refresh_all();
            }
        }
    }

    /// Returns the tessellation for drawing a format with either the region's
    /// own index arena (`shared_index = None`) or a shared index buffer,
    /// creating it if the cached one is missing or stale.
    ///
    /// # Returns
    /// `None` if the region has no resources for the format, or no index
    /// arena when one is requested
    pub fn tessellation(
        &mut self,
        command_list: &mut dyn CommandList,
        format: VertexFormat,
        shared_index: Option<GpuBuffer>,
    ) -> Option<Tessellation> {
        let resources = self.resources.get_mut(&format.id)?;
        let vertex_buffer = resources.geometry_arena.buffer();

        match shared_index {
            Some(index_buffer) => {
                if let Some((buffer, tessellation)) = resources.shared_tessellation {
                    if buffer == index_buffer {
                        return Some(tessellation);
                    }
                    command_list.delete_tessellation(tessellation);
                }
                let tessellation = command_list.create_tessellation(resources.format, vertex_buffer, index_buffer);
                resources.shared_tessellation = Some((index_buffer, tessellation));
                Some(tessellation)
            }
            None => {
                if let Some(tessellation) = resources.index_tessellation {
                    return Some(tessellation);
                }
                let index_buffer = resources.index_arena.as_ref()?.buffer();
                let tessellation = command_list.create_tessellation(resources.format, vertex_buffer, index_buffer);
                resources.index_tessellation = Some(tessellation);
                Some(tessellation)
            }
        }
    }

    /// Releases device resources whose arenas became empty.
    pub fn update(&mut self, command_list: &mut dyn CommandList) {
        let empty: Vec<u32> = self
            .resources
            .iter()
            .filter(|(_, resources)| resources.should_delete())
            .map(|(&id, _)| id)
            .collect();
        for id in empty {
            if let Some(mut resources) = self.resources.remove(&id) {
                resources.delete(command_list);
            }
        }
    }

    /// Releases everything the region owns.
    pub fn delete(&mut self, command_list: &mut dyn CommandList) {
        for (_, mut resources) in self.resources.drain() {
            resources.delete(command_list);
        }
        self.storage.clear();
    }

    /// Whether the region holds no sections and no geometry.
    pub fn is_empty(&self) -> bool {
        self.section_count == 0 && self.storage.is_empty()
    }

    /// Memory usage across all formats.
    pub fn stats(&self) -> ArenaStats {
        self.resources.values().fold(ArenaStats::default(), |total, resources| {
            let stats = resources.stats();
            ArenaStats {
                used: total.used + stats.used,
                allocated: total.allocated + stats.allocated,
            }
        })
    }

    fn index_arena_mut(
        &mut self,
        command_list: &mut dyn CommandList,
        format: VertexFormat,
        initial_bytes: u64,
    ) -> RenderResult<&mut BufferArena> {
        let id = self.id;
        let resources = self.create_resources(command_list, format, initial_bytes)?;
        if resources.index_arena.is_none() {
            debug!("Allocating index arena for region {}", id);
            resources.index_arena = Some(BufferArena::new(
                command_list,
                &format!("Region Indices ({})", format.name),
                4,
                initial_bytes / 4,
            )?);
        }
        Ok(resources
            .index_arena
            .as_mut()
            .unwrap_or_else(|| unreachable!("index arena created above")))
    }
}

/// Packed region key back to region coordinates.
pub fn unpack_region_key(key: RegionKey) -> Point3<i32> {
    unpack_section(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rendering::arena::PendingUpload;
    use crate::rendering::gpu::recording::RecordingCommandList;
    use crate::rendering::gpu::staging_buffer::StagingBuffer;

    #[test]
    fn section_index_round_trips_through_region_coordinates() {
        let section = Point3::new(-3, 5, 17);
        let region_position = region_coordinates(section);
        let region = RenderRegion::new(
            region_position.x,
            region_position.y,
            region_position.z,
            0,
            RenderPassConfiguration::default(),
        );
        assert_eq!(region.section_coordinates(section_index(section)), section);
        assert_eq!(unpack_region_key(region.key()), region_position);
        assert!(section_index(section) < REGION_SIZE);
    }

    #[test]
    fn storages_bump_the_pass_set_cookie() {
        let mut region = RenderRegion::new(0, 0, 0, 0, RenderPassConfiguration::default());
        region.create_storage(TerrainRenderPass::Solid);
        region.create_storage(TerrainRenderPass::Solid);
        assert_eq!(region.pass_set_update_count(), 1);

        region.remove_empty_storages();
        assert_eq!(region.pass_set_update_count(), 2);
        assert!(region.storage(TerrainRenderPass::Solid).is_none());
    }

    #[test]
    fn removed_meshes_release_arena_space() {
        let mut command_list = RecordingCommandList::new();
        let functions = command_list.device_functions();
        let mut staging = StagingBuffer::new(&mut command_list, &functions).unwrap();
        let format = RenderPassConfiguration::default().vertex_format(TerrainRenderPass::Solid);
        let mut region = RenderRegion::new(0, 0, 0, 0, RenderPassConfiguration::default());
        region.add_section();

        let mut uploads = vec![PendingUpload::new(vec![1; format.stride as usize * 4])];
        region
            .create_resources(&mut command_list, format, 1024)
            .unwrap()
            .geometry_arena
            .upload(&mut command_list, &mut staging, &mut uploads)
            .unwrap();
        region
            .create_storage(TerrainRenderPass::Solid)
            .set_vertex_data(5, uploads[0].result().unwrap(), [4, 0, 0, 0, 0, 0, 0]);
        assert!(!region.resources(format).unwrap().geometry_arena().is_empty());

        region.remove_meshes(5);
        region.remove_empty_storages();
        region.remove_section();
        assert!(region.is_empty());

        region.update(&mut command_list);
        assert!(region.resources(format).is_none());
    }

    #[test]
    fn shared_tessellation_is_recreated_when_the_index_buffer_changes() {
        let mut command_list = RecordingCommandList::new();
        let format = RenderPassConfiguration::default().vertex_format(TerrainRenderPass::Solid);
        let mut region = RenderRegion::new(0, 0, 0, 0, RenderPassConfiguration::default());
        region.create_resources(&mut command_list, format, 1024).unwrap();

        let first = region
            .tessellation(&mut command_list, format, Some(GpuBuffer::from_id(900)))
            .unwrap();
        let again = region
            .tessellation(&mut command_list, format, Some(GpuBuffer::from_id(900)))
            .unwrap();
        let other = region
            .tessellation(&mut command_list, format, Some(GpuBuffer::from_id(901)))
            .unwrap();
        assert_eq!(first, again);
        assert_ne!(first.id, other.id);
        assert_eq!(command_list.live_tessellation_count(), 1);
        assert!(region.tessellation(&mut command_list, format, None).is_none());
    }
}
