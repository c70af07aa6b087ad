use crate::{check_capacity, BlockBackend, Error};

/// An in-memory stand-in for [`MmapBlockStore`](crate::MmapBlockStore), used
/// by the `sdcard` test suite so protocol tests don't need a scratch file on
/// disk.
#[derive(Clone)]
pub struct InMemoryBlockStore {
    data: Vec<u8>,
}

impl InMemoryBlockStore {
    /// Creates a zero-filled store of `capacity` bytes.
    pub fn new(capacity: usize) -> Result<Self, Error> {
        check_capacity(capacity)?;
        Ok(Self { data: vec![0u8; capacity] })
    }

    /// Creates a store pre-populated with `data`.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self, Error> {
        check_capacity(data.len())?;
        Ok(Self { data })
    }

    /// Returns the raw contents, for test assertions.
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }
}

impl BlockBackend for InMemoryBlockStore {
    fn capacity(&self) -> usize {
        self.data.len()
    }

    fn read_at(&self, offset: usize, buf: &mut [u8]) {
        let end = offset + buf.len();
        buf.copy_from_slice(&self.data[offset..end]);
    }

    fn write_at(&mut self, offset: usize, buf: &[u8]) {
        let end = offset + buf.len();
        self.data[offset..end].copy_from_slice(buf);
    }
}
