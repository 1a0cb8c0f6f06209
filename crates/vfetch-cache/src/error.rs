use std::io;

use thiserror::Error;

/// Errors that can occur while probing, fetching or reading blocks
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("remote request failed: {0}")]
    Http(String),

    #[error("remote request failed with HTTP status {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("remote did not declare a Content-Length")]
    MissingContentLength,

    #[error("remote declared an invalid Content-Length: {0:?}")]
    InvalidContentLength(String),

    #[error("block {block}: decompression failed: {reason}")]
    Decompress { block: u64, reason: String },

    #[error("block {block}: length mismatch, expected {expected} got {actual}")]
    LengthMismatch {
        block: u64,
        expected: u64,
        actual: u64,
    },

    #[error("block {block} is outside the object ({block_count} blocks)")]
    BlockOutOfRange { block: u64, block_count: u64 },

    #[error("read at offset {offset} is beyond the object size {size}")]
    OutOfRange { offset: u64, size: u64 },

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("block size must be greater than zero")]
    InvalidBlockSize,
}

pub type Result<T> = std::result::Result<T, FetchError>;
