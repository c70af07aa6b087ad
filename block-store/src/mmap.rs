use std::fs::OpenOptions;
use std::path::Path;

use memmap2::MmapMut;

use crate::fmt::debug;
use crate::{check_capacity, BlockBackend, Error};

/// A disk image, memory-mapped read/write.
///
/// Mirrors the historical C model's `sd_init`/`sd_free`: the file is opened,
/// its size becomes the card's `capacity`, and the whole thing is mapped
/// `MAP_SHARED` so writes land directly on disk. Dropping the store flushes
/// the mapping and releases the file handle, matching the implicit `msync`
/// that `munmap` performs in the original.
///
/// The caller is responsible for creating the image file at the desired
/// size beforehand (e.g. with a sparse `truncate`); this type never creates
/// or resizes the file itself.
pub struct MmapBlockStore {
    mmap: MmapMut,
}

impl MmapBlockStore {
    /// Opens `path` and maps its entire contents read/write.
    ///
    /// Fails if the file cannot be opened or mapped, or if its size is not a
    /// positive multiple of [`crate::BLOCK_SIZE`].
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let file = OpenOptions::new().read(true).write(true).open(path.as_ref())?;
        let capacity = file.metadata()?.len() as usize;
        check_capacity(capacity)?;

        // Safety: the file is exclusively owned by this store for as long as
        // the mapping lives; no other process is expected to truncate it
        // out from under us while the card is running.
        let mmap = unsafe { MmapMut::map_mut(&file)? };
        debug!("mapped {} bytes from {:?}", capacity, path.as_ref());

        Ok(Self { mmap })
    }

    /// Flushes pending writes to the backing file.
    pub fn flush(&self) -> std::io::Result<()> {
        self.mmap.flush()
    }
}

impl BlockBackend for MmapBlockStore {
    fn capacity(&self) -> usize {
        self.mmap.len()
    }

    fn read_at(&self, offset: usize, buf: &mut [u8]) {
        let end = offset + buf.len();
        buf.copy_from_slice(&self.mmap[offset..end]);
    }

    fn write_at(&mut self, offset: usize, buf: &[u8]) {
        let end = offset + buf.len();
        self.mmap[offset..end].copy_from_slice(buf);
    }
}

impl Drop for MmapBlockStore {
    fn drop(&mut self) {
        if let Err(e) = self.mmap.flush() {
            debug!("failed to flush mmap on drop: {}", e);
        }
    }
}
