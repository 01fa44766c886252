//! Staging of CPU data on its way into arena buffers.

use log::debug;

use crate::error::RenderResult;

use super::device_functions::{BufferMapRangeFunctions, DeviceFunctions};
use super::{BufferUsage, CommandList, GpuBuffer};

const INITIAL_STAGING_CAPACITY: u64 = 1024 * 1024;

#[derive(Debug, Clone, Copy)]
struct PendingCopy {
    dst: GpuBuffer,
    read_offset: u64,
    write_offset: u64,
    len: u64,
}

/// Writes into a persistent staging buffer and batches buffer-to-buffer
/// copies until [`MappedStagingBuffer::flush`].
pub struct MappedStagingBuffer {
    buffer: GpuBuffer,
    capacity: u64,
    cursor: u64,
    pending: Vec<PendingCopy>,
    bytes_this_frame: u64,
}

impl MappedStagingBuffer {
    fn new(command_list: &mut dyn CommandList) -> RenderResult<Self> {
        let buffer = command_list.create_buffer(
            "Section Staging Buffer",
            INITIAL_STAGING_CAPACITY,
            BufferUsage::StagingCopy,
        )?;
        Ok(Self {
            buffer,
            capacity: INITIAL_STAGING_CAPACITY,
            cursor: 0,
            pending: Vec::new(),
            bytes_this_frame: 0,
        })
    }

    fn enqueue_copy(
        &mut self,
        command_list: &mut dyn CommandList,
        data: &[u8],
        dst: GpuBuffer,
        write_offset: u64,
    ) -> RenderResult<()> {
        let len = data.len() as u64;
        let aligned = len.div_ceil(4) * 4;

        if self.cursor + aligned > self.capacity {
            self.flush(command_list);
        }
        if aligned > self.capacity {
            let capacity = aligned.next_power_of_two();
            let buffer = command_list.create_buffer("Section Staging Buffer", capacity, BufferUsage::StagingCopy)?;
            command_list.delete_buffer(self.buffer);
            debug!("Grew staging buffer from {} to {} bytes", self.capacity, capacity);
            self.buffer = buffer;
            self.capacity = capacity;
        }

        command_list.write_buffer(self.buffer, self.cursor, data);
        self.pending.push(PendingCopy {
            dst,
            read_offset: self.cursor,
            write_offset,
            len,
        });
        self.cursor += aligned;
        self.bytes_this_frame += len;
        Ok(())
    }

    fn flush(&mut self, command_list: &mut dyn CommandList) {
        for copy in self.pending.drain(..) {
            command_list.copy_buffer_sub_data(self.buffer, copy.dst, copy.read_offset, copy.write_offset, copy.len);
        }
        self.cursor = 0;
    }
}

/// Moves CPU data into device buffers.
///
/// The strategy is chosen once from the device's map-range support.
pub enum StagingBuffer {
    /// Batched writes through a persistent staging buffer.
    Mapped(MappedStagingBuffer),
    /// Direct writes into the destination.
    Fallback,
}

impl StagingBuffer {
    /// Creates the staging strategy best suited to the device.
    pub fn new(command_list: &mut dyn CommandList, functions: &DeviceFunctions) -> RenderResult<Self> {
        Ok(match functions.map_range {
            BufferMapRangeFunctions::Core => StagingBuffer::Mapped(MappedStagingBuffer::new(command_list)?),
            BufferMapRangeFunctions::MapFullAndSlice => StagingBuffer::Fallback,
        })
    }

    /// Queues `data` to be written into `dst` at `write_offset`.
    ///
    /// The write is only guaranteed to have landed after [`Self::flush`].
    pub fn enqueue_copy(
        &mut self,
        command_list: &mut dyn CommandList,
        data: &[u8],
        dst: GpuBuffer,
        write_offset: u64,
    ) -> RenderResult<()> {
        if data.is_empty() {
            return Ok(());
        }
        match self {
            StagingBuffer::Mapped(staging) => staging.enqueue_copy(command_list, data, dst, write_offset),
            StagingBuffer::Fallback => {
                command_list.write_buffer(dst, write_offset, data);
                Ok(())
            }
        }
    }

    /// Issues every queued copy.
    pub fn flush(&mut self, command_list: &mut dyn CommandList) {
        if let StagingBuffer::Mapped(staging) = self {
            staging.flush(command_list);
        }
    }

    /// Marks the start of a new frame.
    pub fn flip(&mut self) {
        if let StagingBuffer::Mapped(staging) = self {
            if staging.bytes_this_frame > 0 {
                debug!("Staged {} bytes last frame", staging.bytes_this_frame);
            }
            staging.bytes_this_frame = 0;
        }
    }

    /// Releases the staging buffer.
    pub fn delete(&mut self, command_list: &mut dyn CommandList) {
        if let StagingBuffer::Mapped(staging) = self {
            staging.pending.clear();
            command_list.delete_buffer(staging.buffer);
        }
        *self = StagingBuffer::Fallback;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rendering::gpu::recording::{RecordedCommand, RecordingCommandList};

    #[test]
    fn mapped_staging_defers_copies_until_flush() {
        let mut command_list = RecordingCommandList::new();
        let functions = command_list.device_functions();
        let mut staging = StagingBuffer::new(&mut command_list, &functions).unwrap();
        let dst = command_list.create_buffer("dst", 16, BufferUsage::StaticDraw).unwrap();

        staging.enqueue_copy(&mut command_list, &[7; 8], dst, 4).unwrap();
        assert_eq!(command_list.buffer_contents(dst).unwrap(), &[0; 16]);

        staging.flush(&mut command_list);
        assert_eq!(&command_list.buffer_contents(dst).unwrap()[4..12], &[7; 8]);
        assert!(command_list
            .commands()
            .iter()
            .any(|command| matches!(command, RecordedCommand::Copy { len: 8, .. })));
    }

    #[test]
    fn oversized_uploads_grow_the_staging_buffer() {
        let mut command_list = RecordingCommandList::new();
        let functions = command_list.device_functions();
        let mut staging = StagingBuffer::new(&mut command_list, &functions).unwrap();
        let size = (INITIAL_STAGING_CAPACITY * 2 + 4) as usize;
        let dst = command_list.create_buffer("dst", size as u64, BufferUsage::StaticDraw).unwrap();

        staging.enqueue_copy(&mut command_list, &vec![3; size], dst, 0).unwrap();
        staging.flush(&mut command_list);
        assert!(command_list.buffer_contents(dst).unwrap().iter().all(|&b| b == 3));
    }
}
