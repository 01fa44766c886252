//! CPU-side command arrays for base-vertex multidraw calls.

/// Parallel arrays of draw parameters, filled front to back.
///
/// The arrays are allocated at full capacity up front; emitters may write one
/// slot past `size` and only then decide whether to keep it.
pub struct MultiDrawBatch {
    element_pointer: Vec<u64>,
    element_count: Vec<u32>,
    base_vertex: Vec<i32>,
    size: usize,
}

impl MultiDrawBatch {
    /// Allocates a batch holding up to `capacity` commands.
    pub fn new(capacity: usize) -> Self {
        Self {
            element_pointer: vec![0; capacity],
            element_count: vec![0; capacity],
            base_vertex: vec![0; capacity],
            size: 0,
        }
    }

    /// Appends a command.
    pub fn push(&mut self, element_pointer: u64, element_count: u32, base_vertex: i32) {
        self.write(element_pointer, element_count, base_vertex, true);
    }

    /// Writes a command into the next slot, keeping it only if `keep` is set.
    #[inline]
    pub fn write(&mut self, element_pointer: u64, element_count: u32, base_vertex: i32, keep: bool) {
        let slot = self.size;
        self.element_pointer[slot] = element_pointer;
        self.element_count[slot] = element_count;
        self.base_vertex[slot] = base_vertex;
        self.size += keep as usize;
    }

    /// Number of commands kept.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn capacity(&self) -> usize {
        self.element_count.len()
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Byte offsets into the index buffer. Only the first `size` are valid.
    pub fn element_pointer(&self) -> &[u64] {
        &self.element_pointer
    }

    /// Index counts. Only the first `size` are valid.
    pub fn element_count(&self) -> &[u32] {
        &self.element_count
    }

    /// Base vertices. Only the first `size` are valid.
    pub fn base_vertex(&self) -> &[i32] {
        &self.base_vertex
    }

    /// Largest index count among kept commands.
    pub fn max_element_count(&self) -> u32 {
        self.element_count[..self.size].iter().copied().max().unwrap_or(0)
    }

    /// Forgets every command without freeing the arrays.
    pub fn clear(&mut self) {
        self.size = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discarded_writes_are_overwritten() {
        let mut batch = MultiDrawBatch::new(3);
        batch.write(0, 6, 0, false);
        batch.write(24, 12, 4, true);
        assert_eq!(batch.size(), 1);
        assert_eq!(batch.element_count()[0], 12);
        assert_eq!(batch.max_element_count(), 12);

        batch.clear();
        assert!(batch.is_empty());
        assert_eq!(batch.capacity(), 3);
    }
}
