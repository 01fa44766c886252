//! # Chunk Section Module
//!
//! This module provides the `ChunkSection` struct: a 16x16x16 block of voxel
//! data together with its block and sky light levels. Sections are the unit the
//! renderer meshes, snapshots and tracks visibility for.
//!
//! ## Storage
//!
//! Blocks, block light and sky light are stored as dense arrays indexed by
//! [`ChunkSection::index`] (`y * 256 + z * 16 + x`). A bit vector mirrors which
//! blocks are non-air so emptiness checks and snapshot skipping stay O(1)-ish
//! without scanning the block array.

use bitvec::prelude::BitVec;
use cgmath::Point3;
use noise::{NoiseFn, Perlin};

use super::block::BlockType;
use crate::core::position::{SECTION_SIZE, SECTION_VOLUME};

/// Threshold above which Perlin noise is considered solid for terrain generation.
pub const PERLIN_POSITIVE_THRESHOLD: f64 = 0.2;
/// Threshold below which Perlin noise is considered solid for terrain generation.
pub const PERLIN_NEGATIVE_THRESHOLD: f64 = -0.2;
/// Scaling factor applied to world coordinates when sampling Perlin noise.
pub const PERLIN_SCALE_FACTOR: f64 = 0.02;

/// Maximum light level.
pub const MAX_LIGHT: u8 = 15;

/// A 16x16x16 collection of blocks and their light levels.
#[derive(Clone)]
pub struct ChunkSection {
    /// The position of this section in section coordinates.
    pub position: Point3<i32>,
    blocks: Vec<BlockType>,
    block_light: Vec<u8>,
    sky_light: Vec<u8>,
    /// One bit per block, set for every non-air block.
    solid_array: BitVec,
}

impl ChunkSection {
    /// Creates a new section filled with air and full sky light.
    pub fn empty(position: Point3<i32>) -> Self {
        let mut solid_array = BitVec::with_capacity(SECTION_VOLUME);
        solid_array.resize(SECTION_VOLUME, false);

        Self {
            position,
            blocks: vec![BlockType::AIR; SECTION_VOLUME],
            block_light: vec![0; SECTION_VOLUME],
            sky_light: vec![MAX_LIGHT; SECTION_VOLUME],
            solid_array,
        }
    }

    /// Creates a new section completely filled with `block`.
    pub fn solid(position: Point3<i32>, block: BlockType) -> Self {
        let mut section = Self::empty(position);
        section.fill(block);
        section
    }

    /// Creates a section with a 3D checkerboard of dirt and air (for testing).
    pub fn checkerboard(position: Point3<i32>) -> Self {
        let mut section = Self::empty(position);
        for y in 0..SECTION_SIZE {
            for z in 0..SECTION_SIZE {
                for x in 0..SECTION_SIZE {
                    if (x + y + z) % 2 == 0 {
                        section.set_block(x, y, z, BlockType::DIRT);
                    }
                }
            }
        }
        section
    }

    /// Creates a section with randomly placed dirt blocks (for testing).
    ///
    /// # Arguments
    /// * `position` - Section coordinates
    /// * `density` - Probability in `0.0..=1.0` that a block is solid
    pub fn random(position: Point3<i32>, density: f64) -> Self {
        let mut section = Self::empty(position);
        for index in 0..SECTION_VOLUME {
            if fastrand::f64() < density {
                let (x, y, z) = Self::coordinates(index);
                section.set_block(x, y, z, BlockType::DIRT);
            }
        }
        section
    }

    /// Generates a section using Perlin noise for natural-looking terrain.
    ///
    /// The terrain is generated by sampling 3D Perlin noise and applying
    /// thresholds to determine which blocks are solid, resembling natural
    /// terrain with caves and overhangs. Cave floors exposed to open air are
    /// dressed with grass, flowers and the occasional water pool.
    ///
    /// # Arguments
    /// * `position` - The section coordinates where the section will be placed
    /// * `perlin` - Noise source shared across the world
    ///
    /// # Returns
    /// A new `ChunkSection` with terrain generated using Perlin noise.
    pub fn perlin(position: Point3<i32>, perlin: &Perlin) -> Self {
        let mut section = Self::empty(position);

        for y in 0..SECTION_SIZE {
            for z in 0..SECTION_SIZE {
                for x in 0..SECTION_SIZE {
                    let world = Point3::new(
                        x + SECTION_SIZE * position.x,
                        y + SECTION_SIZE * position.y,
                        z + SECTION_SIZE * position.z,
                    );
                    let sample = perlin.get(Self::to_perlin_pos(world, PERLIN_SCALE_FACTOR));
                    if !(PERLIN_NEGATIVE_THRESHOLD..=PERLIN_POSITIVE_THRESHOLD).contains(&sample) {
                        section.set_block(x, y, z, BlockType::get_random_type());
                    }
                }
            }
        }

        section.decorate();
        section
    }

    /// Converts world block coordinates to scaled Perlin sample coordinates.
    fn to_perlin_pos(pos: Point3<i32>, scale_factor: f64) -> [f64; 3] {
        [
            pos.x as f64 * scale_factor,
            pos.y as f64 * scale_factor,
            pos.z as f64 * scale_factor,
        ]
    }

    /// Places surface blocks on top of solid ground inside the section.
    fn decorate(&mut self) {
        for z in 0..SECTION_SIZE {
            for x in 0..SECTION_SIZE {
                for y in 0..SECTION_SIZE - 1 {
                    if !self.get_block(x, y, z).is_opaque_full_cube()
                        || self.get_block(x, y + 1, z) != BlockType::AIR
                    {
                        continue;
                    }

                    self.set_block(x, y, z, BlockType::GRASS);
                    match fastrand::u8(0..32) {
                        0 => self.set_block(x, y + 1, z, BlockType::FLOWER),
                        1 => self.set_block(x, y + 1, z, BlockType::WATER),
                        2 => self.set_block(x, y + 1, z, BlockType::LAMP),
                        _ => {}
                    }
                }
            }
        }
    }

    /// Dense array index of section-local coordinates.
    #[inline]
    pub fn index(x: i32, y: i32, z: i32) -> usize {
        (y * SECTION_SIZE * SECTION_SIZE + z * SECTION_SIZE + x) as usize
    }

    /// Reverses [`ChunkSection::index`].
    #[inline]
    pub fn coordinates(index: usize) -> (i32, i32, i32) {
        let index = index as i32;
        (
            index % SECTION_SIZE,
            index / (SECTION_SIZE * SECTION_SIZE),
            (index / SECTION_SIZE) % SECTION_SIZE,
        )
    }

    /// Returns the block at section-local coordinates.
    #[inline]
    pub fn get_block(&self, x: i32, y: i32, z: i32) -> BlockType {
        self.blocks[Self::index(x, y, z)]
    }

    /// Replaces the block at section-local coordinates.
    pub fn set_block(&mut self, x: i32, y: i32, z: i32, block: BlockType) {
        let index = Self::index(x, y, z);
        self.blocks[index] = block;
        self.solid_array.set(index, block != BlockType::AIR);
    }

    /// Fills the whole section with `block`.
    pub fn fill(&mut self, block: BlockType) {
        self.blocks.fill(block);
        self.solid_array.fill(block != BlockType::AIR);
    }

    /// Whether the section contains only air.
    pub fn is_empty(&self) -> bool {
        self.solid_array.not_any()
    }

    /// Number of non-air blocks.
    pub fn non_air_count(&self) -> usize {
        self.solid_array.count_ones()
    }

    /// Block light level at section-local coordinates.
    #[inline]
    pub fn block_light(&self, x: i32, y: i32, z: i32) -> u8 {
        self.block_light[Self::index(x, y, z)]
    }

    /// Sky light level at section-local coordinates.
    #[inline]
    pub fn sky_light(&self, x: i32, y: i32, z: i32) -> u8 {
        self.sky_light[Self::index(x, y, z)]
    }

    /// Sets the block light level at section-local coordinates.
    pub fn set_block_light(&mut self, x: i32, y: i32, z: i32, level: u8) {
        self.block_light[Self::index(x, y, z)] = level.min(MAX_LIGHT);
    }

    /// Sets the sky light level at section-local coordinates.
    pub fn set_sky_light(&mut self, x: i32, y: i32, z: i32, level: u8) {
        self.sky_light[Self::index(x, y, z)] = level.min(MAX_LIGHT);
    }

    /// Raw block array in index order.
    pub fn blocks(&self) -> &[BlockType] {
        &self.blocks
    }

    /// Raw block light array in index order.
    pub fn block_light_array(&self) -> &[u8] {
        &self.block_light
    }

    /// Raw sky light array in index order.
    pub fn sky_light_array(&self) -> &[u8] {
        &self.sky_light
    }

    /// Recomputes light levels local to this section.
    ///
    /// Sky light falls straight down from the top of the section until it hits
    /// an opaque block, with `sky_above` as the level entering from above.
    /// Block light floods out from emitters, losing one level per step through
    /// non-opaque blocks. Light does not cross section borders.
    pub fn relight(&mut self, sky_above: &[u8]) {
        for z in 0..SECTION_SIZE {
            for x in 0..SECTION_SIZE {
                let mut level = sky_above
                    .get((z * SECTION_SIZE + x) as usize)
                    .copied()
                    .unwrap_or(MAX_LIGHT);
                for y in (0..SECTION_SIZE).rev() {
                    if self.get_block(x, y, z).is_opaque() {
                        level = 0;
                    }
                    self.set_sky_light(x, y, z, level);
                }
            }
        }

        self.block_light.fill(0);
        let mut queue = std::collections::VecDeque::new();
        for index in self.solid_array.iter_ones() {
            let emission = self.blocks[index].light_emission();
            if emission > 0 {
                self.block_light[index] = emission;
                queue.push_back(index);
            }
        }

        while let Some(index) = queue.pop_front() {
            let level = self.block_light[index];
            if level <= 1 {
                continue;
            }
            let (x, y, z) = Self::coordinates(index);
            for (dx, dy, dz) in [(1, 0, 0), (-1, 0, 0), (0, 1, 0), (0, -1, 0), (0, 0, 1), (0, 0, -1)] {
                let (nx, ny, nz) = (x + dx, y + dy, z + dz);
                if !(0..SECTION_SIZE).contains(&nx)
                    || !(0..SECTION_SIZE).contains(&ny)
                    || !(0..SECTION_SIZE).contains(&nz)
                {
                    continue;
                }
                let neighbour = Self::index(nx, ny, nz);
                if self.blocks[neighbour].is_opaque() || self.block_light[neighbour] >= level - 1 {
                    continue;
                }
                self.block_light[neighbour] = level - 1;
                queue.push_back(neighbour);
            }
        }
    }

    /// Sky light levels leaving the bottom layer of the section, indexed `z * 16 + x`.
    pub fn bottom_sky_light(&self) -> Vec<u8> {
        let mut levels = Vec::with_capacity((SECTION_SIZE * SECTION_SIZE) as usize);
        for z in 0..SECTION_SIZE {
            for x in 0..SECTION_SIZE {
                levels.push(self.sky_light(x, 0, z));
            }
        }
        levels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_and_coordinates_agree() {
        for index in [0, 1, 15, 16, 255, 256, 4095] {
            let (x, y, z) = ChunkSection::coordinates(index);
            assert_eq!(ChunkSection::index(x, y, z), index);
        }
    }

    #[test]
    fn solid_array_tracks_air() {
        let mut section = ChunkSection::empty(Point3::new(0, 0, 0));
        assert!(section.is_empty());

        section.set_block(3, 4, 5, BlockType::STONE);
        assert!(!section.is_empty());
        assert_eq!(section.non_air_count(), 1);

        section.set_block(3, 4, 5, BlockType::AIR);
        assert!(section.is_empty());
    }

    #[test]
    fn sky_light_stops_at_opaque_blocks() {
        let mut section = ChunkSection::empty(Point3::new(0, 0, 0));
        section.set_block(2, 8, 2, BlockType::STONE);
        section.relight(&[]);

        assert_eq!(section.sky_light(2, 9, 2), MAX_LIGHT);
        assert_eq!(section.sky_light(2, 7, 2), 0);
        assert_eq!(section.sky_light(3, 7, 2), MAX_LIGHT);
    }

    #[test]
    fn block_light_falls_off_from_emitters() {
        let mut section = ChunkSection::empty(Point3::new(0, 0, 0));
        section.set_block(8, 8, 8, BlockType::LAMP);
        section.relight(&[]);

        assert_eq!(section.block_light(8, 8, 8), 15);
        assert_eq!(section.block_light(9, 8, 8), 14);
        assert_eq!(section.block_light(11, 8, 8), 12);
    }

    #[test]
    fn checkerboard_is_half_full() {
        let section = ChunkSection::checkerboard(Point3::new(0, 0, 0));
        assert_eq!(section.non_air_count(), SECTION_VOLUME / 2);
    }
}
