//! Block fetch engine.
//!
//! Translates byte ranges into block ranges, fetches missing blocks through a
//! [`RangeSource`], decompresses and verifies them, writes them into the
//! [`CacheStore`] and records them in the [`BlockBitmap`].
//!
//! The engine has no internal locking. All `&mut self` methods are expected
//! to run under the single read lock held by
//! [`ReadCoordinator`](crate::ReadCoordinator).

use std::ops::RangeInclusive;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::instrument;
use vfetch_config::{log_fetch_debug, log_fetch_error, log_fetch_info, log_fetch_warn};

use crate::bitmap::BlockBitmap;
use crate::codec::decompress_block;
use crate::error::{FetchError, Result};
use crate::source::RangeSource;
use crate::store::CacheStore;

/// Block layout of the remote object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockGeometry {
    block_size: u64,
    total_size: u64,
    block_count: u64,
}

impl BlockGeometry {
    pub fn new(total_size: u64, block_size: u64) -> Result<Self> {
        if block_size == 0 {
            return Err(FetchError::InvalidBlockSize);
        }
        Ok(Self {
            block_size,
            total_size,
            block_count: total_size.div_ceil(block_size),
        })
    }

    pub fn block_size(&self) -> u64 {
        self.block_size
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn block_count(&self) -> u64 {
        self.block_count
    }

    /// Inclusive byte range `[start, end]` covered by block `idx`.
    ///
    /// The final block may be short. `idx` must be below `block_count`.
    pub fn block_bounds(&self, idx: u64) -> (u64, u64) {
        let start = idx * self.block_size;
        let end = (start + self.block_size - 1).min(self.total_size - 1);
        (start, end)
    }

    /// Blocks overlapping `[offset, offset + size)`. `size` must be non-zero.
    pub fn covering_blocks(&self, offset: u64, size: u64) -> RangeInclusive<u64> {
        let start = offset / self.block_size;
        let end = (offset + size - 1) / self.block_size;
        start..=end
    }
}

/// Attempt budget for a single block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: vfetch_config::DEFAULT_MAX_ATTEMPTS,
            backoff: Duration::ZERO,
        }
    }
}

/// Observability counters. Written only after a verified block write.
#[derive(Debug, Default)]
pub struct FetchProgress {
    bytes_received: AtomicU64,
    blocks_fetched: AtomicU64,
}

impl FetchProgress {
    pub fn bytes_received(&self) -> u64 {
        self.bytes_received.load(Ordering::Relaxed)
    }

    pub fn blocks_fetched(&self) -> u64 {
        self.blocks_fetched.load(Ordering::Relaxed)
    }

    fn record_block(&self, bytes: u64) {
        self.bytes_received.fetch_add(bytes, Ordering::Relaxed);
        self.blocks_fetched.fetch_add(1, Ordering::Relaxed);
    }
}

pub struct FetchEngine {
    source: Box<dyn RangeSource>,
    geometry: BlockGeometry,
    bitmap: BlockBitmap,
    store: CacheStore,
    progress: Arc<FetchProgress>,
    retry: RetryPolicy,
}

impl FetchEngine {
    /// Assemble an engine from an already-probed geometry and a sized store.
    pub fn new(
        source: Box<dyn RangeSource>,
        geometry: BlockGeometry,
        store: CacheStore,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            source,
            bitmap: BlockBitmap::new(geometry.block_count()),
            geometry,
            store,
            progress: Arc::new(FetchProgress::default()),
            retry,
        }
    }

    /// Probe the remote size, then create the cache store under `cache_dir`.
    ///
    /// Any failure here is fatal to startup: without a size there is nothing
    /// to size the bitmap or the cache file with.
    pub fn initialize(
        source: Box<dyn RangeSource>,
        cache_dir: &Path,
        block_size: u64,
        retry: RetryPolicy,
    ) -> Result<Self> {
        let total_size = source.probe_size()?;
        let geometry = BlockGeometry::new(total_size, block_size)?;
        let store = CacheStore::create(cache_dir, &source.base_name(), total_size)?;

        log_fetch_info!(
            "Cache store ready",
            total_size = total_size,
            block_size = block_size,
            block_count = geometry.block_count(),
            path = tracing::field::debug(store.path()),
        );

        Ok(Self::new(source, geometry, store, retry))
    }

    pub fn geometry(&self) -> BlockGeometry {
        self.geometry
    }

    pub fn bitmap(&self) -> &BlockBitmap {
        &self.bitmap
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    pub fn progress(&self) -> Arc<FetchProgress> {
        Arc::clone(&self.progress)
    }

    /// Make block `idx` resident, retrying up to the configured attempts.
    ///
    /// A block that is already resident never touches the network.
    pub fn ensure_block_resident(&mut self, idx: u64) -> Result<()> {
        if self.bitmap.has(idx) {
            return Ok(());
        }

        let attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.fetch_block(idx) {
                Ok(()) => return Ok(()),
                Err(err) if attempt >= attempts => {
                    log_fetch_error!(
                        "Block fetch gave up",
                        block = idx,
                        attempts = attempts,
                        error = tracing::field::display(&err),
                    );
                    return Err(err);
                }
                Err(err) => {
                    log_fetch_warn!(
                        "Block fetch failed",
                        block = idx,
                        attempt = attempt,
                        max_attempts = attempts,
                        error = tracing::field::display(&err),
                    );
                }
            }
            attempt += 1;
            if !self.retry.backoff.is_zero() {
                std::thread::sleep(self.retry.backoff);
            }
        }
    }

    /// Fetch, verify and store a single block.
    #[instrument(skip(self), level = "debug")]
    pub fn fetch_block(&mut self, idx: u64) -> Result<()> {
        if self.bitmap.has(idx) {
            return Ok(());
        }
        if idx >= self.geometry.block_count() {
            return Err(FetchError::BlockOutOfRange {
                block: idx,
                block_count: self.geometry.block_count(),
            });
        }

        let (start, end) = self.geometry.block_bounds(idx);
        let expected_len =
            usize::try_from(end - start + 1).map_err(|_| FetchError::InvalidBlockSize)?;
        let compressed = self.source.fetch_range(start, end)?;
        let data = decompress_block(idx, &compressed, expected_len)?;

        self.store.write_at(start, &data)?;

        if let Err(err) = self.store.sync() {
            log_fetch_warn!(
                "Cache store sync failed",
                block = idx,
                error = tracing::field::display(&err),
            );
        }

        self.bitmap.set(idx);
        self.progress.record_block(data.len() as u64);

        log_fetch_debug!(
            "Block resident",
            block = idx,
            start = start,
            end = end,
            compressed = compressed.len(),
        );
        Ok(())
    }

    /// Read cached bytes. The caller must have made the range resident.
    pub fn read_cached(&self, offset: u64, size: u64) -> Result<Vec<u8>> {
        let size = usize::try_from(size).map_err(|_| FetchError::OutOfRange {
            offset,
            size: self.geometry.total_size(),
        })?;
        Ok(self.store.read_at(offset, size)?)
    }

    /// Delete the cache store file.
    pub fn remove_cache(self) -> Result<()> {
        Ok(self.store.remove()?)
    }
}
