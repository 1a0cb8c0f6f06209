//! Block payload decompression (LZ4 block format).

use crate::error::{FetchError, Result};

/// Decompress a fetched block and check it is exactly `expected_len` bytes.
pub fn decompress_block(block: u64, compressed: &[u8], expected_len: usize) -> Result<Vec<u8>> {
    let data = lz4_flex::block::decompress(compressed, expected_len).map_err(|e| {
        FetchError::Decompress {
            block,
            reason: e.to_string(),
        }
    })?;

    if data.len() != expected_len {
        return Err(FetchError::LengthMismatch {
            block,
            expected: expected_len as u64,
            actual: data.len() as u64,
        });
    }
    Ok(data)
}

/// Compress a block the way the remote serves it.
pub fn compress_block(data: &[u8]) -> Vec<u8> {
    lz4_flex::block::compress(data)
}
