//! # World Module
//!
//! The host world model the renderer consumes: a sparse map of 16x16x16
//! [`ChunkSection`]s, read-only snapshots of them for background meshing, and
//! the [`WorldSlice`](world_slice::WorldSlice) view a build task reads through.
//!
//! ## Architecture
//!
//! Sections are stored in thread-safe containers so the host can keep editing
//! the world while the renderer clones the sections a build needs. Builders
//! never read the live world: the render thread copies a 3x3x3 neighbourhood
//! into [`ClonedChunkSection`](cloned_section::ClonedChunkSection)s and hands
//! those to the job.

pub mod block;
pub mod chunk_section;
pub mod cloned_section;
pub mod facing;
pub mod world_slice;

use std::collections::HashMap;

use cgmath::Point3;
use noise::Perlin;

use crate::core::position::{block_to_section, SECTION_SIZE};
use crate::core::MtResource;
use block::BlockType;
use chunk_section::ChunkSection;

/// The method used to generate new sections.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum GenerationMethod {
    /// Perlin noise terrain.
    Perlin,
    /// Alternating solid and air blocks.
    Checkerboard,
    /// Completely solid sections.
    Solid,
    /// Completely empty sections.
    Empty,
}

/// A voxel world composed of sparse sections.
///
/// # Examples
///
/// ```
/// use cgmath::Point3;
/// use voxel_section_renderer::world::{GenerationMethod, World};
///
/// let mut world = World::new(GenerationMethod::Solid, 0);
/// world.add_section_at(Point3::new(0, 0, 0));
/// assert!(world.get_section_at(Point3::new(0, 0, 0)).is_some());
/// ```
pub struct World {
    /// Mapping from section coordinates to section data.
    pub sections: HashMap<Point3<i32>, MtResource<ChunkSection>>,
    generation_method: GenerationMethod,
    perlin: Perlin,
}

impl World {
    /// Creates a new, empty world.
    ///
    /// # Arguments
    /// * `generation_method` - How `add_section_at` fills new sections
    /// * `seed` - Noise seed for Perlin generation
    pub fn new(generation_method: GenerationMethod, seed: u32) -> Self {
        World {
            sections: HashMap::new(),
            generation_method,
            perlin: Perlin::new(seed),
        }
    }

    /// Generates and adds a section if one doesn't already exist.
    ///
    /// # Returns
    /// `true` if a new section was added
    pub fn add_section_at(&mut self, position: Point3<i32>) -> bool {
        if self.sections.contains_key(&position) {
            return false;
        }

        let mut section = match self.generation_method {
            GenerationMethod::Perlin => ChunkSection::perlin(position, &self.perlin),
            GenerationMethod::Checkerboard => ChunkSection::checkerboard(position),
            GenerationMethod::Solid => ChunkSection::solid(position, BlockType::STONE),
            GenerationMethod::Empty => ChunkSection::empty(position),
        };
        section.relight(&self.sky_entering(position));

        self.sections.insert(position, MtResource::new(section));
        true
    }

    /// Inserts an already built section, replacing any previous one.
    pub fn insert_section(&mut self, section: ChunkSection) {
        self.sections
            .insert(section.position, MtResource::new(section));
    }

    /// Removes a section.
    ///
    /// # Returns
    /// `true` if the section existed
    pub fn remove_section_at(&mut self, position: Point3<i32>) -> bool {
        self.sections.remove(&position).is_some()
    }

    /// Retrieves the section at the specified section coordinates.
    pub fn get_section_at(&self, position: Point3<i32>) -> Option<MtResource<ChunkSection>> {
        self.sections.get(&position).cloned()
    }

    /// Whether a section is loaded at the given coordinates.
    pub fn has_section_at(&self, position: Point3<i32>) -> bool {
        self.sections.contains_key(&position)
    }

    /// Returns the block at world block coordinates, air if the section is not loaded.
    pub fn get_block(&self, x: i32, y: i32, z: i32) -> BlockType {
        let section = Point3::new(block_to_section(x), block_to_section(y), block_to_section(z));
        match self.sections.get(&section) {
            Some(section) => section.get().get_block(
                x.rem_euclid(SECTION_SIZE),
                y.rem_euclid(SECTION_SIZE),
                z.rem_euclid(SECTION_SIZE),
            ),
            None => BlockType::AIR,
        }
    }

    /// Sets a block at world block coordinates and relights its section.
    ///
    /// # Returns
    /// The sections whose meshes are affected by the change: the owning section
    /// plus any loaded neighbour touching the changed block.
    pub fn set_block(&mut self, x: i32, y: i32, z: i32, block: BlockType) -> Vec<Point3<i32>> {
        let position = Point3::new(block_to_section(x), block_to_section(y), block_to_section(z));
        let (lx, ly, lz) = (
            x.rem_euclid(SECTION_SIZE),
            y.rem_euclid(SECTION_SIZE),
            z.rem_euclid(SECTION_SIZE),
        );

        let sky_above = self.sky_entering(position);
        let Some(section) = self.sections.get(&position) else {
            return Vec::new();
        };
        {
            let mut section = section.get_mut();
            section.set_block(lx, ly, lz, block);
            section.relight(&sky_above);
        }

        let mut affected = vec![position];
        let edges = [
            (lx == 0, Point3::new(-1, 0, 0)),
            (lx == SECTION_SIZE - 1, Point3::new(1, 0, 0)),
            (ly == 0, Point3::new(0, -1, 0)),
            (ly == SECTION_SIZE - 1, Point3::new(0, 1, 0)),
            (lz == 0, Point3::new(0, 0, -1)),
            (lz == SECTION_SIZE - 1, Point3::new(0, 0, 1)),
        ];
        for (on_edge, offset) in edges {
            let neighbour = Point3::new(
                position.x + offset.x,
                position.y + offset.y,
                position.z + offset.z,
            );
            if on_edge && self.sections.contains_key(&neighbour) {
                affected.push(neighbour);
            }
        }
        affected
    }

    /// Sky light entering a section from the one above it.
    fn sky_entering(&self, position: Point3<i32>) -> Vec<u8> {
        let above = Point3::new(position.x, position.y + 1, position.z);
        match self.sections.get(&above) {
            Some(section) => section.get().bottom_sky_light(),
            None => Vec::new(),
        }
    }

    /// Number of loaded sections.
    pub fn section_count(&self) -> usize {
        self.sections.len()
    }
}
