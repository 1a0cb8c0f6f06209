//! Shared fixtures: a request-counting in-memory range source.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use vfetch_cache::{compress_block, FetchError, RangeSource, Result};

pub const KIB: u64 = 1024;

/// Deterministic, non-repeating-ish payload.
pub fn payload(len: usize) -> Vec<u8> {
    (0..len)
        .map(|i| ((i as u64).wrapping_mul(2654435761) >> 13) as u8)
        .collect()
}

/// In-memory remote that counts requests per block start offset.
pub struct CountingSource {
    data: Vec<u8>,
    fail_next: AtomicUsize,
    delay: Duration,
    truncate: bool,
    requests: Mutex<HashMap<u64, usize>>,
    total: AtomicUsize,
}

impl CountingSource {
    pub fn new(data: Vec<u8>) -> Arc<Self> {
        Self::build(data, 0, Duration::ZERO, false)
    }

    /// Fail the next `failures` fetches with a 500.
    pub fn failing(data: Vec<u8>, failures: usize) -> Arc<Self> {
        Self::build(data, failures, Duration::ZERO, false)
    }

    /// Sleep `delay` inside every fetch to widen race windows.
    pub fn slow(data: Vec<u8>, delay: Duration) -> Arc<Self> {
        Self::build(data, 0, delay, false)
    }

    /// Serve every block one byte short of its declared range.
    pub fn truncating(data: Vec<u8>) -> Arc<Self> {
        Self::build(data, 0, Duration::ZERO, true)
    }

    fn build(data: Vec<u8>, failures: usize, delay: Duration, truncate: bool) -> Arc<Self> {
        Arc::new(Self {
            data,
            fail_next: AtomicUsize::new(failures),
            delay,
            truncate,
            requests: Mutex::new(HashMap::new()),
            total: AtomicUsize::new(0),
        })
    }

    pub fn total_requests(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }

    pub fn requests_for(&self, start: u64) -> usize {
        self.requests
            .lock()
            .unwrap()
            .get(&start)
            .copied()
            .unwrap_or(0)
    }

    pub fn max_requests_per_block(&self) -> usize {
        self.requests
            .lock()
            .unwrap()
            .values()
            .copied()
            .max()
            .unwrap_or(0)
    }
}

impl RangeSource for CountingSource {
    fn probe_size(&self) -> Result<u64> {
        Ok(self.data.len() as u64)
    }

    fn fetch_range(&self, start: u64, end: u64) -> Result<Vec<u8>> {
        self.total.fetch_add(1, Ordering::SeqCst);
        *self.requests.lock().unwrap().entry(start).or_insert(0) += 1;

        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }

        let failed = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(FetchError::HttpStatus {
                status: 500,
                body: "injected failure".into(),
            });
        }

        if self.truncate {
            return Ok(compress_block(&self.data[start as usize..end as usize]));
        }
        Ok(compress_block(&self.data[start as usize..=end as usize]))
    }

    fn base_name(&self) -> String {
        "counting.img".into()
    }
}
