use crate::rendering::region::RegionKey;

/// Sections of one region to draw this frame, in traversal order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChunkRenderList {
    region_key: RegionKey,
    region_id: u32,
    sections: Vec<u8>,
}

impl ChunkRenderList {
    pub fn new(region_key: RegionKey, region_id: u32) -> Self {
        Self {
            region_key,
            region_id,
            sections: Vec::new(),
        }
    }

    pub fn region_key(&self) -> RegionKey {
        self.region_key
    }

    pub fn region_id(&self) -> u32 {
        self.region_id
    }

    /// Appends a region-local section index.
    pub fn add(&mut self, section_index: usize) {
        debug_assert!(section_index <= u8::MAX as usize);
        self.sections.push(section_index as u8);
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn size(&self) -> usize {
        self.sections.len()
    }

    /// Section indices in traversal order.
    pub fn sections(&self) -> impl Iterator<Item = usize> + '_ {
        self.sections.iter().map(|&index| index as usize)
    }

    /// Section indices from farthest to nearest.
    pub fn sections_reversed(&self) -> impl Iterator<Item = usize> + '_ {
        self.sections.iter().rev().map(|&index| index as usize)
    }
}

/// Every region reached by a traversal, in the order it was first reached.
///
/// Regions without visible geometry keep their (empty) entry so the draw
/// order of the others does not shift from frame to frame.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SortedRenderLists {
    lists: Vec<ChunkRenderList>,
}

impl SortedRenderLists {
    /// No regions.
    pub const EMPTY: SortedRenderLists = SortedRenderLists { lists: Vec::new() };

    pub fn new(lists: Vec<ChunkRenderList>) -> Self {
        Self { lists }
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChunkRenderList> {
        self.lists.iter()
    }

    pub fn iter_reversed(&self) -> impl Iterator<Item = &ChunkRenderList> {
        self.lists.iter().rev()
    }

    /// Number of regions, including those with nothing to draw.
    pub fn len(&self) -> usize {
        self.lists.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lists.is_empty()
    }

    /// List of a region, if the traversal reached it.
    pub fn find(&self, region_key: RegionKey) -> Option<&ChunkRenderList> {
        self.lists.iter().find(|list| list.region_key == region_key)
    }

    /// Total number of sections to draw.
    pub fn section_count(&self) -> usize {
        self.lists.iter().map(ChunkRenderList::size).sum()
    }
}
