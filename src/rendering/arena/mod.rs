//! # Buffer Arena
//!
//! Packs many small meshes into one device buffer. Space is handed out in
//! whole elements (vertices or indices) from a first-fit free list; freed
//! ranges are coalesced with their neighbours and reused.
//!
//! ## Growth
//!
//! When a batch of uploads does not fit, the arena allocates a larger buffer,
//! copies the old contents over with the device's copy strategy and reports
//! that its buffer changed. Callers must then rebuild anything that captured
//! the old handle (tessellations). Arenas never shrink.

mod pending_upload;

use std::collections::BTreeMap;

use log::debug;

use crate::error::RenderResult;
use crate::rendering::gpu::device_functions::BufferCopyFunctions;
use crate::rendering::gpu::staging_buffer::StagingBuffer;
use crate::rendering::gpu::{BufferUsage, CommandList, GpuBuffer};

pub use pending_upload::PendingUpload;

/// A contiguous range of arena elements.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct BufferSegment {
    offset: u32,
    length: u32,
}

impl BufferSegment {
    /// Creates a segment starting at element `offset`.
    pub const fn new(offset: u32, length: u32) -> Self {
        Self { offset, length }
    }

    /// First element.
    #[inline]
    pub fn offset(self) -> u32 {
        self.offset
    }

    /// Number of elements.
    #[inline]
    pub fn length(self) -> u32 {
        self.length
    }

    /// One past the last element.
    #[inline]
    pub fn end(self) -> u32 {
        self.offset + self.length
    }
}

/// Memory usage of an arena, in bytes.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ArenaStats {
    pub used: u64,
    pub allocated: u64,
}

/// Element-stride allocator over a single device buffer.
pub struct BufferArena {
    label: String,
    stride: u32,
    buffer: GpuBuffer,
    capacity: u32,
    used: u32,
    free: BTreeMap<u32, u32>,
    buffer_copy: BufferCopyFunctions,
}

impl BufferArena {
    /// Creates an arena with room for at least one element.
    ///
    /// # Arguments
    /// * `label` - Debug label of the device buffer
    /// * `stride` - Size of one element in bytes
    /// * `initial_bytes` - Requested initial capacity
    pub fn new(
        command_list: &mut dyn CommandList,
        label: &str,
        stride: u32,
        initial_bytes: u64,
    ) -> RenderResult<Self> {
        let capacity = (initial_bytes / stride as u64).max(1) as u32;
        let buffer = command_list.create_buffer(label, capacity as u64 * stride as u64, BufferUsage::StaticDraw)?;
        let mut free = BTreeMap::new();
        free.insert(0, capacity);

        Ok(Self {
            label: label.to_string(),
            stride,
            buffer,
            capacity,
            used: 0,
            free,
            buffer_copy: command_list.device_functions().buffer_copy,
        })
    }

    /// Device buffer currently backing the arena.
    pub fn buffer(&self) -> GpuBuffer {
        self.buffer
    }

    /// Element size in bytes.
    pub fn stride(&self) -> u32 {
        self.stride
    }

    /// Capacity in elements.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Whether no element is allocated.
    pub fn is_empty(&self) -> bool {
        self.used == 0
    }

    /// Memory usage in bytes.
    pub fn stats(&self) -> ArenaStats {
        ArenaStats {
            used: self.used as u64 * self.stride as u64,
            allocated: self.capacity as u64 * self.stride as u64,
        }
    }

    /// Places every upload in the arena, growing it if needed, and queues the
    /// bytes on the staging buffer.
    ///
    /// # Returns
    /// `true` if the backing buffer was replaced
    ///
    /// # Errors
    /// `RenderError::ResourceExhaustion` if growing the buffer fails
    pub fn upload(
        &mut self,
        command_list: &mut dyn CommandList,
        staging: &mut StagingBuffer,
        uploads: &mut [PendingUpload],
    ) -> RenderResult<bool> {
        let mut buffer_changed = false;
        let mut failed = Vec::new();

        for (index, upload) in uploads.iter_mut().enumerate() {
            let length = self.element_count(upload);
            match self.try_alloc(length) {
                Some(segment) => upload.set_result(segment),
                None => failed.push(index),
            }
        }

        if !failed.is_empty() {
            let required: u32 = failed.iter().map(|&index| self.element_count(&uploads[index])).sum();
            self.grow(command_list, staging, required)?;
            buffer_changed = true;

            for index in failed {
                let length = self.element_count(&uploads[index]);
                let segment = self
                    .try_alloc(length)
                    .unwrap_or_else(|| panic!("Arena '{}' has no room after growing", self.label));
                uploads[index].set_result(segment);
            }
        }

        for upload in uploads.iter() {
            if let Some(segment) = upload.result() {
                staging.enqueue_copy(
                    command_list,
                    &upload.data,
                    self.buffer,
                    segment.offset() as u64 * self.stride as u64,
                )?;
            }
        }

        Ok(buffer_changed)
    }

    /// Returns a segment to the free list.
    pub fn free(&mut self, segment: BufferSegment) {
        if segment.length == 0 {
            return;
        }
        self.used -= segment.length;

        let mut offset = segment.offset;
        let mut length = segment.length;

        if let Some((&prev_offset, &prev_length)) = self.free.range(..offset).next_back() {
            if prev_offset + prev_length == offset {
                self.free.remove(&prev_offset);
                offset = prev_offset;
                length += prev_length;
            }
        }
        if let Some(next_length) = self.free.remove(&(offset + length)) {
            length += next_length;
        }

        self.free.insert(offset, length);
    }

    /// Releases the device buffer.
    pub fn delete(&mut self, command_list: &mut dyn CommandList) {
        command_list.delete_buffer(self.buffer);
        self.free.clear();
        self.used = 0;
        self.capacity = 0;
    }

    fn element_count(&self, upload: &PendingUpload) -> u32 {
        (upload.data.len() / self.stride as usize) as u32
    }

    fn try_alloc(&mut self, length: u32) -> Option<BufferSegment> {
        if length == 0 {
            return Some(BufferSegment::new(0, 0));
        }

        let (&offset, &free_length) = self.free.iter().find(|(_, &free_length)| free_length >= length)?;
        self.free.remove(&offset);
        if free_length > length {
            self.free.insert(offset + length, free_length - length);
        }
        self.used += length;
        Some(BufferSegment::new(offset, length))
    }

    fn grow(
        &mut self,
        command_list: &mut dyn CommandList,
        staging: &mut StagingBuffer,
        required: u32,
    ) -> RenderResult<()> {
        // Writes already queued against the old buffer must land before it is copied.
        staging.flush(command_list);

        let old_capacity = self.capacity;
        let new_capacity = (old_capacity * 2).max(old_capacity + required);
        let stride = self.stride as u64;
        let buffer = command_list.create_buffer(&self.label, new_capacity as u64 * stride, BufferUsage::StaticDraw)?;

        if self.used > 0 {
            self.buffer_copy
                .copy(command_list, self.buffer, buffer, 0, 0, old_capacity as u64 * stride)?;
        }
        command_list.delete_buffer(self.buffer);

        debug!(
            "Grew arena '{}' from {} to {} elements",
            self.label, old_capacity, new_capacity
        );

        self.buffer = buffer;
        self.capacity = new_capacity;
        self.used += new_capacity - old_capacity;
        self.free(BufferSegment::new(old_capacity, new_capacity - old_capacity));
        Ok(())
    }
}
