use std::collections::VecDeque;

use cgmath::Point3;

use crate::rendering::section::ChunkUpdateType;

/// Sections waiting for work, one queue per update type.
#[derive(Clone, Debug, Default)]
pub struct ChunkRebuildLists {
    by_update_type: [VecDeque<Point3<i32>>; ChunkUpdateType::COUNT],
    queue_overflow_counts: [usize; ChunkUpdateType::COUNT],
    has_additional_updates: bool,
}

impl ChunkRebuildLists {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue of one update type, in traversal order.
    pub fn queue(&self, update: ChunkUpdateType) -> &VecDeque<Point3<i32>> {
        &self.by_update_type[update.index()]
    }

    pub fn queue_mut(&mut self, update: ChunkUpdateType) -> &mut VecDeque<Point3<i32>> {
        &mut self.by_update_type[update.index()]
    }

    /// Queues a section unless the queue already holds `limit` entries.
    ///
    /// # Returns
    /// `false` if the request overflowed
    pub fn offer(&mut self, update: ChunkUpdateType, section: Point3<i32>, limit: usize) -> bool {
        let queue = &mut self.by_update_type[update.index()];
        if queue.len() < limit {
            queue.push_back(section);
            true
        } else {
            self.queue_overflow_counts[update.index()] += 1;
            self.has_additional_updates = true;
            false
        }
    }

    pub fn update_count(&self, update: ChunkUpdateType) -> usize {
        self.by_update_type[update.index()].len()
    }

    /// Requests turned away because the queue was full.
    pub fn queue_overflow_count(&self, update: ChunkUpdateType) -> usize {
        self.queue_overflow_counts[update.index()]
    }

    /// Whether more sections need work than were queued.
    pub fn has_additional_updates(&self) -> bool {
        self.has_additional_updates
    }

    pub fn is_empty(&self) -> bool {
        self.by_update_type.iter().all(VecDeque::is_empty)
    }
}
