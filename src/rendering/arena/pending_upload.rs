use super::BufferSegment;

/// Bytes waiting to be placed in a [`super::BufferArena`].
#[derive(Debug)]
pub struct PendingUpload {
    /// Raw bytes, a whole number of arena elements.
    pub data: Vec<u8>,
    result: Option<BufferSegment>,
}

impl PendingUpload {
    /// Wraps bytes for upload.
    pub fn new(data: Vec<u8>) -> Self {
        Self { data, result: None }
    }

    /// Segment the data was placed in, once uploaded.
    pub fn result(&self) -> Option<BufferSegment> {
        self.result
    }

    /// Records where the data was placed.
    ///
    /// # Panics
    /// If a result was already recorded
    pub fn set_result(&mut self, segment: BufferSegment) {
        if self.result.is_some() {
            panic!("Result already provided for pending upload");
        }
        self.result = Some(segment);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[should_panic(expected = "already provided")]
    fn result_can_only_be_set_once() {
        let mut upload = PendingUpload::new(vec![0; 4]);
        upload.set_result(BufferSegment::new(0, 1));
        upload.set_result(BufferSegment::new(1, 1));
    }
}
