//! # Light Data
//!
//! Per-block light and occlusion properties packed into one `u32` word, and a
//! flat-array cache of those words covering a section plus a two-block halo.
//!
//! ## Word Layout
//!
//! ```text
//! | FC | FO | OP | EM | AO (16 bits, 12-bit precision) | LU | SL | BL |
//!   31   30   29   28   27                          12  11-8  7-4  3-0
//! ```
//!
//! * BL/SL - World block and sky light
//! * LU - Light emitted by the block
//! * AO - Shade brightness in `0.0..=1.0`
//! * EM - Rendered at full brightness
//! * OP - Blocks light
//! * FO - Opaque full cube
//! * FC - Full cube
//!
//! Lightmaps produced from words use a different layout, `block << 4 | sky << 20`,
//! matching the light coordinate stored in vertices.

use crate::core::position::SECTION_SIZE;
use crate::world::facing::ModelQuadFacing;
use crate::world::world_slice::WorldSlice;

/// Blocks of halo kept around the section.
pub const NEIGHBOR_BLOCK_RADIUS: i32 = 2;
/// Edge length of the cached volume.
pub const BLOCK_LENGTH: i32 = SECTION_SIZE + NEIGHBOR_BLOCK_RADIUS * 2;

#[inline]
pub fn pack_bl(block_light: u32) -> u32 {
    block_light & 0xF
}

#[inline]
pub fn unpack_bl(word: u32) -> u32 {
    word & 0xF
}

#[inline]
pub fn pack_sl(sky_light: u32) -> u32 {
    (sky_light & 0xF) << 4
}

#[inline]
pub fn unpack_sl(word: u32) -> u32 {
    (word >> 4) & 0xF
}

#[inline]
pub fn pack_lu(luminance: u32) -> u32 {
    (luminance & 0xF) << 8
}

#[inline]
pub fn unpack_lu(word: u32) -> u32 {
    (word >> 8) & 0xF
}

#[inline]
pub fn pack_ao(ao: f32) -> u32 {
    let aoi = (ao * 4096.0) as u32;
    (aoi & 0xFFFF) << 12
}

#[inline]
pub fn unpack_ao(word: u32) -> f32 {
    ((word >> 12) & 0xFFFF) as f32 * (1.0 / 4096.0)
}

#[inline]
pub fn pack_em(emissive: bool) -> u32 {
    (emissive as u32) << 28
}

#[inline]
pub fn unpack_em(word: u32) -> bool {
    (word >> 28) & 1 != 0
}

#[inline]
pub fn pack_op(opaque: bool) -> u32 {
    (opaque as u32) << 29
}

#[inline]
pub fn unpack_op(word: u32) -> bool {
    (word >> 29) & 1 != 0
}

#[inline]
pub fn pack_fo(opaque_full_cube: bool) -> u32 {
    (opaque_full_cube as u32) << 30
}

#[inline]
pub fn unpack_fo(word: u32) -> bool {
    (word >> 30) & 1 != 0
}

#[inline]
pub fn pack_fc(full_cube: bool) -> u32 {
    (full_cube as u32) << 31
}

#[inline]
pub fn unpack_fc(word: u32) -> bool {
    (word >> 31) & 1 != 0
}

/// Packs block and sky light levels into a lightmap.
#[inline]
pub const fn pack(block: u32, sky: u32) -> u32 {
    block << 4 | sky << 20
}

#[inline]
pub fn unpack_block(packed: u32) -> u32 {
    (packed & 0xFFFF) >> 4
}

#[inline]
pub fn unpack_sky(packed: u32) -> u32 {
    (packed >> 20) & 0xFFFF
}

/// Lightmap of full block and sky light.
pub const FULL_BRIGHT: u32 = pack(15, 15);

/// Lightmap of a word: the brighter of world block light and emission, plus sky light.
#[inline]
pub fn lightmap(word: u32) -> u32 {
    pack(unpack_bl(word).max(unpack_lu(word)), unpack_sl(word))
}

/// Like [`lightmap`], but full bright for emissive blocks.
#[inline]
pub fn emissive_lightmap(word: u32) -> u32 {
    if unpack_em(word) {
        FULL_BRIGHT
    } else {
        lightmap(word)
    }
}

/// Lazily computed light words of one section and its halo.
///
/// Coordinates are relative to the minimum block of the section being built,
/// the same space [`WorldSlice`] uses. A zero word means "not computed yet".
pub struct ArrayLightDataCache {
    words: Vec<u32>,
    slice: Option<WorldSlice>,
}

impl ArrayLightDataCache {
    pub fn new() -> Self {
        Self {
            words: vec![0; (BLOCK_LENGTH * BLOCK_LENGTH * BLOCK_LENGTH) as usize],
            slice: None,
        }
    }

    /// Switches the cache to a new slice and forgets every word.
    pub fn reset(&mut self, slice: WorldSlice) {
        self.words.fill(0);
        self.slice = Some(slice);
    }

    #[inline]
    fn index(x: i32, y: i32, z: i32) -> Option<usize> {
        let range = -NEIGHBOR_BLOCK_RADIUS..SECTION_SIZE + NEIGHBOR_BLOCK_RADIUS;
        if !range.contains(&x) || !range.contains(&y) || !range.contains(&z) {
            return None;
        }
        let (x, y, z) = (
            x + NEIGHBOR_BLOCK_RADIUS,
            y + NEIGHBOR_BLOCK_RADIUS,
            z + NEIGHBOR_BLOCK_RADIUS,
        );
        Some(((z * BLOCK_LENGTH * BLOCK_LENGTH) + (y * BLOCK_LENGTH) + x) as usize)
    }

    /// Light word of a block.
    pub fn get(&mut self, x: i32, y: i32, z: i32) -> u32 {
        let Some(index) = Self::index(x, y, z) else {
            return self.compute(x, y, z);
        };
        let word = self.words[index];
        if word != 0 {
            return word;
        }
        let word = self.compute(x, y, z);
        self.words[index] = word;
        word
    }

    /// Light word of the block one step from `(x, y, z)` towards `dir`.
    pub fn get_offset(&mut self, x: i32, y: i32, z: i32, dir: ModelQuadFacing) -> u32 {
        let step = dir.step();
        self.get(x + step.x, y + step.y, z + step.z)
    }

    /// Light word of the block one step towards `d1` and one towards `d2`.
    pub fn get_diagonal(&mut self, x: i32, y: i32, z: i32, d1: ModelQuadFacing, d2: ModelQuadFacing) -> u32 {
        let (s1, s2) = (d1.step(), d2.step());
        self.get(x + s1.x + s2.x, y + s1.y + s2.y, z + s1.z + s2.z)
    }

    fn compute(&self, x: i32, y: i32, z: i32) -> u32 {
        let Some(slice) = self.slice.as_ref() else {
            return pack_sl(15) | pack_ao(1.0);
        };
        let block = slice.get_block(x, y, z);

        let em = block.is_emissive();
        let op = block.is_opaque();
        let fo = block.is_opaque_full_cube();
        let fc = block.is_full_cube();
        let lu = block.light_emission() as u32;

        let (bl, sl) = if fo && lu == 0 {
            (0, 0)
        } else {
            (slice.block_light(x, y, z) as u32, slice.sky_light(x, y, z) as u32)
        };

        let ao = if lu == 0 && block.casts_ambient_occlusion() {
            0.2
        } else {
            1.0
        };

        pack_fc(fc) | pack_fo(fo) | pack_op(op) | pack_em(em) | pack_ao(ao) | pack_lu(lu) | pack_sl(sl) | pack_bl(bl)
    }
}

impl Default for ArrayLightDataCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::block::BlockType;
    use crate::world::cloned_section::ClonedSectionCache;
    use crate::world::{GenerationMethod, World};
    use cgmath::Point3;
    use std::time::Duration;

    #[test]
    fn full_bright_packs_both_channels() {
        assert_eq!(FULL_BRIGHT, 0x00F0_00F0);
        assert_eq!(unpack_block(FULL_BRIGHT), 15);
        assert_eq!(unpack_sky(FULL_BRIGHT), 15);
    }

    #[test]
    fn word_fields_do_not_overlap() {
        let word = pack_fc(true) | pack_em(true) | pack_ao(0.5) | pack_lu(9) | pack_sl(3) | pack_bl(7);
        assert_eq!(unpack_bl(word), 7);
        assert_eq!(unpack_sl(word), 3);
        assert_eq!(unpack_lu(word), 9);
        assert!((unpack_ao(word) - 0.5).abs() < 1.0 / 4096.0);
        assert!(unpack_em(word) && unpack_fc(word));
        assert!(!unpack_op(word) && !unpack_fo(word));

        assert_eq!(lightmap(word), pack(9, 3));
        assert_eq!(emissive_lightmap(word), FULL_BRIGHT);
    }

    #[test]
    fn cache_reads_blocks_through_the_slice() {
        let mut world = World::new(GenerationMethod::Empty, 0);
        world.add_section_at(Point3::new(0, 0, 0));
        world.set_block(4, 4, 4, BlockType::STONE);
        world.set_block(5, 4, 4, BlockType::LAMP);
        let mut snapshots = ClonedSectionCache::new(32, Duration::from_secs(60));
        let context = WorldSlice::prepare(&world, &mut snapshots, Point3::new(0, 0, 0)).unwrap();

        let mut cache = ArrayLightDataCache::new();
        cache.reset(context.slice);

        let stone = cache.get(4, 4, 4);
        assert!(unpack_fo(stone) && unpack_op(stone));
        assert_eq!(unpack_bl(stone), 0);
        assert!((unpack_ao(stone) - 0.2).abs() < 0.001);

        let lamp = cache.get_offset(4, 4, 4, ModelQuadFacing::PosX);
        assert_eq!(unpack_lu(lamp), 15);
        assert!(unpack_em(lamp));

        let outside = cache.get(40, 4, 4);
        assert!(!unpack_op(outside));
        assert_eq!(cache.get(4, 4, 4), stone);
    }
}
