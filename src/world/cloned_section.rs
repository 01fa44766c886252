//! # Cloned Sections
//!
//! Immutable copies of world sections handed to background build jobs, and a
//! small LRU cache so neighbouring builds in the same frame share copies
//! instead of re-cloning the same halo sections.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use cgmath::Point3;
use lru::LruCache;
use web_time::Instant;

use super::block::BlockType;
use super::chunk_section::ChunkSection;
use super::World;

/// A read-only snapshot of one section's blocks and light.
pub struct ClonedChunkSection {
    position: Point3<i32>,
    blocks: Box<[BlockType]>,
    block_light: Box<[u8]>,
    sky_light: Box<[u8]>,
    empty: bool,
    created_at: Instant,
}

impl ClonedChunkSection {
    /// Copies the given section.
    pub fn new(section: &ChunkSection) -> Self {
        Self {
            position: section.position,
            blocks: section.blocks().into(),
            block_light: section.block_light_array().into(),
            sky_light: section.sky_light_array().into(),
            empty: section.is_empty(),
            created_at: Instant::now(),
        }
    }

    /// Section coordinates of the snapshot.
    pub fn position(&self) -> Point3<i32> {
        self.position
    }

    /// Whether the snapshot holds only air.
    pub fn is_empty(&self) -> bool {
        self.empty
    }

    /// Block at section-local coordinates.
    #[inline]
    pub fn get_block(&self, x: i32, y: i32, z: i32) -> BlockType {
        self.blocks[ChunkSection::index(x, y, z)]
    }

    /// Block light at section-local coordinates.
    #[inline]
    pub fn block_light(&self, x: i32, y: i32, z: i32) -> u8 {
        self.block_light[ChunkSection::index(x, y, z)]
    }

    /// Sky light at section-local coordinates.
    #[inline]
    pub fn sky_light(&self, x: i32, y: i32, z: i32) -> u8 {
        self.sky_light[ChunkSection::index(x, y, z)]
    }

    /// Time since the snapshot was taken.
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }
}

/// LRU cache of section snapshots keyed by section position.
///
/// Only the render thread touches the cache. Entries are dropped when the
/// world reports a change for their section, when they exceed the configured
/// age, or when capacity forces the least recently used one out.
pub struct ClonedSectionCache {
    cache: LruCache<Point3<i32>, Arc<ClonedChunkSection>>,
    max_age: Duration,
}

impl ClonedSectionCache {
    /// Creates a cache.
    ///
    /// # Arguments
    /// * `capacity` - Maximum number of cached snapshots (clamped to at least one)
    /// * `max_age` - Age after which `cleanup` discards a snapshot
    pub fn new(capacity: usize, max_age: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: LruCache::new(capacity),
            max_age,
        }
    }

    /// Returns a snapshot of the section, cloning it from the world on a miss.
    ///
    /// # Returns
    /// `None` if the world has no section at `position`
    pub fn acquire(&mut self, world: &World, position: Point3<i32>) -> Option<Arc<ClonedChunkSection>> {
        if let Some(cloned) = self.cache.get(&position) {
            return Some(cloned.clone());
        }

        let section = world.get_section_at(position)?;
        let cloned = Arc::new(ClonedChunkSection::new(&section.get()));
        self.cache.put(position, cloned.clone());
        Some(cloned)
    }

    /// Drops the cached snapshot of a section that changed.
    pub fn invalidate(&mut self, position: Point3<i32>) {
        self.cache.pop(&position);
    }

    /// Drops every snapshot older than the configured maximum age.
    ///
    /// # Returns
    /// The number of snapshots removed
    pub fn cleanup(&mut self) -> usize {
        let expired: Vec<Point3<i32>> = self
            .cache
            .iter()
            .filter(|(_, cloned)| cloned.age() > self.max_age)
            .map(|(position, _)| *position)
            .collect();

        for position in &expired {
            self.cache.pop(position);
        }
        expired.len()
    }

    /// Number of cached snapshots.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}
