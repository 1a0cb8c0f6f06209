//! Read coordinator: the single serialization point for reads.
//!
//! One mutex guards the whole read path, from block-range computation through
//! the final cache-store read. At most one block fetch is in flight at any
//! time, and overlapping reads never race on the bitmap or the cache file:
//! whoever comes second finds the blocks resident. A hung remote holds the
//! lock and stalls every other read; there is no timeout here.
//!
//! Progress counters are atomics, so [`ReadCoordinator::progress`] never
//! waits on the lock.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use vfetch_config::log_fetch_debug;

use crate::engine::{BlockGeometry, FetchEngine, FetchProgress};
use crate::error::{FetchError, Result};

pub struct ReadCoordinator {
    engine: Mutex<FetchEngine>,
    geometry: BlockGeometry,
    progress: Arc<FetchProgress>,
    cache_path: PathBuf,
    auth_token: String,
}

impl ReadCoordinator {
    pub fn new(engine: FetchEngine, auth_token: impl Into<String>) -> Self {
        Self {
            geometry: engine.geometry(),
            progress: engine.progress(),
            cache_path: engine.store().path().to_path_buf(),
            engine: Mutex::new(engine),
            auth_token: auth_token.into(),
        }
    }

    pub fn geometry(&self) -> BlockGeometry {
        self.geometry
    }

    pub fn total_size(&self) -> u64 {
        self.geometry.total_size()
    }

    pub fn block_size(&self) -> u64 {
        self.geometry.block_size()
    }

    /// Location of the cache-store file, fixed for the coordinator's lifetime.
    pub fn cache_path(&self) -> &Path {
        &self.cache_path
    }

    /// Read `size` bytes at `offset`, fetching whatever blocks are missing.
    ///
    /// `offset == total_size` is a clean EOF and yields no bytes; anything
    /// past it is [`FetchError::OutOfRange`]. `size` is clamped to the end of
    /// the object.
    pub fn read(&self, offset: u64, size: u64) -> Result<Vec<u8>> {
        let total = self.geometry.total_size();
        if offset > total {
            return Err(FetchError::OutOfRange {
                offset,
                size: total,
            });
        }
        let size = size.min(total - offset);
        if size == 0 {
            return Ok(Vec::new());
        }

        let mut engine = self
            .engine
            .lock()
            .map_err(|_| FetchError::Io(io::Error::new(io::ErrorKind::Other, "poisoned lock")))?;

        let blocks = self.geometry.covering_blocks(offset, size);
        log_fetch_debug!(
            "Read",
            offset = offset,
            size = size,
            first_block = *blocks.start(),
            last_block = *blocks.end(),
        );
        for idx in blocks {
            engine.ensure_block_resident(idx)?;
        }
        engine.read_cached(offset, size)
    }

    /// Whether block `idx` is resident. Takes the read lock.
    pub fn is_resident(&self, idx: u64) -> bool {
        self.engine
            .lock()
            .map(|engine| engine.bitmap().has(idx))
            .unwrap_or(false)
    }

    /// Point-in-time progress, without side effects.
    pub fn progress(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            pid: std::process::id(),
            block_count: self.geometry.block_count(),
            blocks_fetched: self.progress.blocks_fetched(),
            bytes_received: self.progress.bytes_received(),
            auth_token: self.auth_token.clone(),
        }
    }

    /// Tear down and delete the cache-store file.
    pub fn shutdown(self) -> Result<()> {
        let engine = self
            .engine
            .into_inner()
            .map_err(|_| FetchError::Io(io::Error::new(io::ErrorKind::Other, "poisoned lock")))?;
        engine.remove_cache()
    }
}

/// Progress as exposed through the `meta` file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub pid: u32,
    pub block_count: u64,
    pub blocks_fetched: u64,
    pub bytes_received: u64,
    pub auth_token: String,
}

impl fmt::Display for ProgressSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "pid: {}", self.pid)?;
        writeln!(f, "block_count: {}", self.block_count)?;
        writeln!(f, "blocks_fetched: {}", self.blocks_fetched)?;
        writeln!(f, "bytes_received: {}", self.bytes_received)?;
        writeln!(f, "token: {}", self.auth_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_format() {
        let snap = ProgressSnapshot {
            pid: 42,
            block_count: 3,
            blocks_fetched: 1,
            bytes_received: 8388608,
            auth_token: "abc".into(),
        };
        assert_eq!(
            snap.to_string(),
            "pid: 42\nblock_count: 3\nblocks_fetched: 1\nbytes_received: 8388608\ntoken: abc\n"
        );
    }
}
