//! # vfetch-cache
//!
//! On-demand block fetch cache for Velo Fetch.
//!
//! A large remote object is exposed as a local file without downloading it
//! up front. Reads are translated into fixed-size blocks; missing blocks are
//! fetched from the remote with a ranged request, decompressed, verified and
//! written into a pre-sized local file. A bitmap tracks which blocks are
//! resident, so every block crosses the network at most once per process.
//!
//! ## Layout
//!
//! ```text
//! ReadCoordinator  (single lock, range checks)
//! └── FetchEngine  (block math, retry, decompress, store, bitmap, counters)
//!     ├── RangeSource  (HEAD size probe, GET Range per block)
//!     ├── CacheStore   (<tmp_dir>/<name>.<unique>, fallocated)
//!     └── BlockBitmap  (one bit per block)
//! ```

mod bitmap;
mod codec;
mod coordinator;
mod engine;
mod error;
mod source;
mod store;

pub use bitmap::BlockBitmap;
pub use codec::{compress_block, decompress_block};
pub use coordinator::{ProgressSnapshot, ReadCoordinator};
pub use engine::{BlockGeometry, FetchEngine, FetchProgress, RetryPolicy};
pub use error::{FetchError, Result};
pub use source::{HttpRangeSource, RangeSource, AUTH_TOKEN_HEADER};
pub use store::CacheStore;
