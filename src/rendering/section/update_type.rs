use crate::config::RebuildQueueLimits;

/// Kind of work a section is waiting for.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ChunkUpdateType {
    /// Re-sort translucent geometry for a new camera position.
    SortOnly,
    /// First build of a section that has never been meshed.
    InitialBuild,
    /// Rebuild after a block change, scheduled asynchronously.
    Rebuild,
    /// Rebuild the player is waiting on; completed before the next frame.
    ImportantRebuild,
}

impl ChunkUpdateType {
    /// Number of update types.
    pub const COUNT: usize = 4;

    /// All update types in queue order.
    pub fn all() -> [ChunkUpdateType; Self::COUNT] {
        [
            ChunkUpdateType::SortOnly,
            ChunkUpdateType::InitialBuild,
            ChunkUpdateType::Rebuild,
            ChunkUpdateType::ImportantRebuild,
        ]
    }

    /// Index into per-type tables.
    #[inline]
    pub fn index(self) -> usize {
        match self {
            ChunkUpdateType::SortOnly => 0,
            ChunkUpdateType::InitialBuild => 1,
            ChunkUpdateType::Rebuild => 2,
            ChunkUpdateType::ImportantRebuild => 3,
        }
    }

    /// Rank used when two requests for the same section meet. Higher wins.
    #[inline]
    pub fn priority(self) -> u8 {
        match self {
            ChunkUpdateType::SortOnly => 0,
            ChunkUpdateType::InitialBuild => 1,
            ChunkUpdateType::Rebuild => 2,
            ChunkUpdateType::ImportantRebuild => 3,
        }
    }

    /// Resolves a new request against the update already pending.
    ///
    /// # Returns
    /// The type to store, or `None` if the pending update already covers the
    /// request
    pub fn promote(current: Option<ChunkUpdateType>, requested: ChunkUpdateType) -> Option<ChunkUpdateType> {
        match current {
            None => Some(requested),
            Some(current) if requested.priority() > current.priority() => Some(requested),
            Some(_) => None,
        }
    }

    /// Whether the update must finish before the next frame is drawn.
    pub fn is_important(self) -> bool {
        self == ChunkUpdateType::ImportantRebuild
    }

    /// Whether the update only re-sorts existing geometry.
    pub fn is_sort(self) -> bool {
        self == ChunkUpdateType::SortOnly
    }

    /// Capacity of the per-frame queue for this update type.
    pub fn maximum_queue_size(self, limits: &RebuildQueueLimits) -> usize {
        match self {
            ChunkUpdateType::SortOnly => limits.sort_only,
            ChunkUpdateType::InitialBuild => limits.initial_build,
            ChunkUpdateType::Rebuild => limits.rebuild,
            ChunkUpdateType::ImportantRebuild => limits.important_rebuild,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn promotion_only_moves_upward() {
        use ChunkUpdateType::*;
        assert_eq!(ChunkUpdateType::promote(None, SortOnly), Some(SortOnly));
        assert_eq!(ChunkUpdateType::promote(Some(SortOnly), Rebuild), Some(Rebuild));
        assert_eq!(ChunkUpdateType::promote(Some(Rebuild), ImportantRebuild), Some(ImportantRebuild));
        assert_eq!(ChunkUpdateType::promote(Some(ImportantRebuild), Rebuild), None);
        assert_eq!(ChunkUpdateType::promote(Some(InitialBuild), SortOnly), None);
        assert_eq!(ChunkUpdateType::promote(Some(Rebuild), Rebuild), None);
    }

    #[test]
    fn queue_sizes_come_from_limits() {
        let limits = RebuildQueueLimits {
            sort_only: 1,
            initial_build: 2,
            rebuild: 3,
            important_rebuild: 4,
        };
        let sizes: Vec<usize> = ChunkUpdateType::all()
            .iter()
            .map(|update| update.maximum_queue_size(&limits))
            .collect();
        assert_eq!(sizes, vec![1, 2, 3, 4]);
    }
}
