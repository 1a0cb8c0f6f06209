//! Block presence bitmap.
//!
//! One bit per block index in `[0, block_count)`. A set bit means the block
//! has been fully written to the cache store. Indices outside that range are
//! ignored by every operation rather than reported, so the read path never
//! has to branch on a bitmap error.
//!
//! The bitmap carries no synchronization of its own; the engine only touches
//! it while holding the read lock.

#[derive(Debug, Clone)]
pub struct BlockBitmap {
    bits: Vec<u8>,
    block_count: u64,
}

impl BlockBitmap {
    /// Create a bitmap with every block marked absent.
    pub fn new(block_count: u64) -> Self {
        Self {
            bits: vec![0u8; block_count.div_ceil(8) as usize],
            block_count,
        }
    }

    pub fn block_count(&self) -> u64 {
        self.block_count
    }

    #[inline]
    fn locate(&self, idx: u64) -> Option<(usize, u8)> {
        if idx >= self.block_count {
            return None;
        }
        Some(((idx / 8) as usize, 1u8 << (idx % 8)))
    }

    /// Whether block `idx` is resident.
    #[inline]
    pub fn has(&self, idx: u64) -> bool {
        match self.locate(idx) {
            Some((byte, mask)) => self.bits[byte] & mask != 0,
            None => false,
        }
    }

    /// Mark block `idx` resident.
    #[inline]
    pub fn set(&mut self, idx: u64) {
        if let Some((byte, mask)) = self.locate(idx) {
            self.bits[byte] |= mask;
        }
    }

    /// Mark block `idx` absent.
    #[inline]
    pub fn clear(&mut self, idx: u64) {
        if let Some((byte, mask)) = self.locate(idx) {
            self.bits[byte] &= !mask;
        }
    }

    /// Number of resident blocks.
    pub fn resident_count(&self) -> u64 {
        self.bits.iter().map(|b| u64::from(b.count_ones())).sum()
    }
}
