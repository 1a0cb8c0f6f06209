//! Local cache store: a single pre-sized file backing fetched blocks.
//!
//! The file is created under the configured temporary directory with a
//! unique suffix and allocated to the full object size up front, so block
//! writes at any offset never extend it. It is deleted when the store is
//! dropped.

use std::fs::File;
use std::io;
use std::os::unix::fs::FileExt;
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::instrument;

use crate::error::Result;

#[derive(Debug)]
pub struct CacheStore {
    file: NamedTempFile,
    len: u64,
}

impl CacheStore {
    /// Create `<dir>/<base_name>.<unique>` and allocate `len` bytes for it.
    ///
    /// On allocation failure the partially created file is removed.
    #[instrument(level = "debug")]
    pub fn create(dir: &Path, base_name: &str, len: u64) -> Result<Self> {
        let file = tempfile::Builder::new()
            .prefix(&format!("{}.", base_name))
            .tempfile_in(dir)?;

        if let Err(e) = preallocate(file.as_file(), len) {
            let _ = file.close();
            return Err(e.into());
        }

        Ok(Self { file, len })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Size of the represented object; never changes after creation.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Write `data` at exactly `offset`.
    pub fn write_at(&self, offset: u64, data: &[u8]) -> io::Result<()> {
        self.file.as_file().write_all_at(data, offset)
    }

    /// Read up to `size` bytes from `offset`. Short only at end of file.
    pub fn read_at(&self, offset: u64, size: usize) -> io::Result<Vec<u8>> {
        let mut buf = vec![0u8; size];
        let mut filled = 0;
        while filled < size {
            match self
                .file
                .as_file()
                .read_at(&mut buf[filled..], offset + filled as u64)
            {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        buf.truncate(filled);
        Ok(buf)
    }

    /// Flush written data to stable storage.
    pub fn sync(&self) -> io::Result<()> {
        self.file.as_file().sync_data()
    }

    /// Delete the backing file now instead of on drop.
    pub fn remove(self) -> io::Result<()> {
        self.file.close()
    }
}

#[cfg(target_os = "linux")]
fn preallocate(file: &File, len: u64) -> io::Result<()> {
    use nix::fcntl::{fallocate, FallocateFlags};
    use std::os::unix::io::AsRawFd;

    if len == 0 {
        return Ok(());
    }
    let len = i64::try_from(len)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "object too large"))?;
    fallocate(file.as_raw_fd(), FallocateFlags::empty(), 0, len)?;
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn preallocate(file: &File, len: u64) -> io::Result<()> {
    file.set_len(len)
}
