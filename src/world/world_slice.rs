//! # World Slice
//!
//! A read-only view over a section and its 26 neighbours, built from cloned
//! snapshots. Coordinates passed to a slice are relative to the minimum block
//! of the centre section, so valid positions range over `-16..32` on each axis.

use std::sync::Arc;

use cgmath::Point3;

use super::block::BlockType;
use super::cloned_section::{ClonedChunkSection, ClonedSectionCache};
use super::World;
use crate::core::position::SECTION_SIZE;

const NEIGHBOURHOOD: usize = 27;

/// A 3x3x3 neighbourhood of section snapshots.
#[derive(Clone)]
pub struct WorldSlice {
    origin: Point3<i32>,
    sections: [Option<Arc<ClonedChunkSection>>; NEIGHBOURHOOD],
}

/// Everything a build task needs to mesh one section.
#[derive(Clone)]
pub struct ChunkRenderContext {
    /// Section coordinates of the section being built.
    pub origin: Point3<i32>,
    /// Snapshot of the section and its neighbours.
    pub slice: WorldSlice,
}

impl WorldSlice {
    /// Collects snapshots around `origin` into a render context.
    ///
    /// # Returns
    /// `None` when the centre section is not loaded or holds only air, in which
    /// case there is nothing to mesh
    pub fn prepare(
        world: &World,
        cache: &mut ClonedSectionCache,
        origin: Point3<i32>,
    ) -> Option<ChunkRenderContext> {
        let centre = cache.acquire(world, origin)?;
        if centre.is_empty() {
            return None;
        }

        let mut sections: [Option<Arc<ClonedChunkSection>>; NEIGHBOURHOOD] = Default::default();
        for dy in -1..=1 {
            for dz in -1..=1 {
                for dx in -1..=1 {
                    let position = Point3::new(origin.x + dx, origin.y + dy, origin.z + dz);
                    sections[Self::slot(dx, dy, dz)] = if (dx, dy, dz) == (0, 0, 0) {
                        Some(centre.clone())
                    } else {
                        cache.acquire(world, position)
                    };
                }
            }
        }

        Some(ChunkRenderContext {
            origin,
            slice: WorldSlice { origin, sections },
        })
    }

    #[inline]
    fn slot(dx: i32, dy: i32, dz: i32) -> usize {
        ((dy + 1) * 9 + (dz + 1) * 3 + (dx + 1)) as usize
    }

    #[inline]
    fn locate(&self, x: i32, y: i32, z: i32) -> Option<(&ClonedChunkSection, i32, i32, i32)> {
        let (sx, sy, sz) = (
            x.div_euclid(SECTION_SIZE),
            y.div_euclid(SECTION_SIZE),
            z.div_euclid(SECTION_SIZE),
        );
        if !(-1..=1).contains(&sx) || !(-1..=1).contains(&sy) || !(-1..=1).contains(&sz) {
            return None;
        }
        let section = self.sections[Self::slot(sx, sy, sz)].as_deref()?;
        Some((
            section,
            x.rem_euclid(SECTION_SIZE),
            y.rem_euclid(SECTION_SIZE),
            z.rem_euclid(SECTION_SIZE),
        ))
    }

    /// Section coordinates of the centre section.
    pub fn origin(&self) -> Point3<i32> {
        self.origin
    }

    /// Block at slice-relative coordinates. Unloaded positions read as air.
    pub fn get_block(&self, x: i32, y: i32, z: i32) -> BlockType {
        self.locate(x, y, z)
            .map(|(section, lx, ly, lz)| section.get_block(lx, ly, lz))
            .unwrap_or(BlockType::AIR)
    }

    /// Block light at slice-relative coordinates. Unloaded positions are dark.
    pub fn block_light(&self, x: i32, y: i32, z: i32) -> u8 {
        self.locate(x, y, z)
            .map(|(section, lx, ly, lz)| section.block_light(lx, ly, lz))
            .unwrap_or(0)
    }

    /// Sky light at slice-relative coordinates. Unloaded positions see the sky.
    pub fn sky_light(&self, x: i32, y: i32, z: i32) -> u8 {
        self.locate(x, y, z)
            .map(|(section, lx, ly, lz)| section.sky_light(lx, ly, lz))
            .unwrap_or(15)
    }
}
