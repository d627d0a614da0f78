use bytes::Bytes;

/// One outbound chunk queued for injection.
///
/// Moved into the queue by the producer and consumed exactly once by the
/// send loop. `blocks` is the number of FEC blocks the chunk carries and
/// is what the send loop credits to `send_blocks`.
#[derive(Debug, PartialEq, Eq)]
pub struct Message {
    data: Bytes,
    blocks: u32,
}

impl Message {
    /// A chunk carrying a single block.
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self::with_blocks(data, 1)
    }

    pub fn with_blocks(data: impl Into<Bytes>, blocks: u32) -> Self {
        Message {
            data: data.into(),
            blocks,
        }
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn blocks(&self) -> u32 {
        self.blocks
    }

    pub fn into_bytes(self) -> Bytes {
        self.data
    }
}
