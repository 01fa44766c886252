//! # Position Packing
//!
//! Helpers for converting between block, section and region coordinates and
//! for packing section coordinates into a single `u64` key.
//!
//! Section keys use 22 bits for X and Z and 20 bits for Y:
//!
//! ```text
//! | x (22 bits) | z (22 bits) | y (20 bits) |
//!   63       42   41       20   19        0
//! ```

use cgmath::Point3;

/// Edge length of a section in blocks.
pub const SECTION_SIZE: i32 = 16;
/// log2 of [`SECTION_SIZE`].
pub const SECTION_SHIFT: i32 = 4;
/// Number of blocks in one section.
pub const SECTION_VOLUME: usize = (SECTION_SIZE * SECTION_SIZE * SECTION_SIZE) as usize;

/// Packs section coordinates into a single sortable key.
pub fn pack_section(x: i32, y: i32, z: i32) -> u64 {
    (((x as i64) & 0x3F_FFFF) << 42 | ((y as i64) & 0xF_FFFF) | ((z as i64) & 0x3F_FFFF) << 20)
        as u64
}

/// Reverses [`pack_section`], restoring sign-extended coordinates.
pub fn unpack_section(packed: u64) -> Point3<i32> {
    let packed = packed as i64;
    Point3::new(
        (packed >> 42) as i32,
        ((packed << 44) >> 44) as i32,
        ((packed << 22) >> 42) as i32,
    )
}

/// Packs block coordinates using 26/12/26 bits for X/Y/Z.
pub fn pack_block(x: i32, y: i32, z: i32) -> u64 {
    (((x as i64) & 0x3FF_FFFF) << 38 | ((z as i64) & 0x3FF_FFFF) << 12 | ((y as i64) & 0xFFF))
        as u64
}

/// Converts a block coordinate to the coordinate of the section containing it.
#[inline]
pub fn block_to_section(coord: i32) -> i32 {
    coord >> SECTION_SHIFT
}

/// Converts a section coordinate to the coordinate of its minimum block.
#[inline]
pub fn section_to_block(coord: i32) -> i32 {
    coord << SECTION_SHIFT
}

/// Converts a world position to the section containing it.
pub fn world_to_section(position: Point3<f32>) -> Point3<i32> {
    Point3::new(
        block_to_section(position.x.floor() as i32),
        block_to_section(position.y.floor() as i32),
        block_to_section(position.z.floor() as i32),
    )
}

/// Returns the block-space origin of a section.
pub fn section_origin(section: Point3<i32>) -> Point3<i32> {
    Point3::new(
        section_to_block(section.x),
        section_to_block(section.y),
        section_to_block(section.z),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn section_packing_restores_negative_coordinates() {
        for (x, y, z) in [(0, 0, 0), (-1, -1, -1), (12345, -300, -98765), (-2_000_000, 500_000, 7)] {
            let packed = pack_section(x, y, z);
            assert_eq!(unpack_section(packed), Point3::new(x, y, z));
        }
    }

    #[test]
    fn block_to_section_floors_negative_coordinates() {
        assert_eq!(block_to_section(15), 0);
        assert_eq!(block_to_section(16), 1);
        assert_eq!(block_to_section(-1), -1);
        assert_eq!(block_to_section(-16), -1);
        assert_eq!(block_to_section(-17), -2);
    }

    #[test]
    fn distinct_sections_get_distinct_keys() {
        assert_ne!(pack_section(1, 0, 0), pack_section(0, 0, 1));
        assert_ne!(pack_section(0, 1, 0), pack_section(0, 0, 1));
        assert_ne!(pack_block(1, 0, 0), pack_block(0, 1, 0));
    }
}
