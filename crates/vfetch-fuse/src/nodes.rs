//! The three-node tree served by the mount, independent of the kernel binding.
//!
//! ```text
//! /          (ino 1, r-x)
//! ├── content (ino 2, r--)  the remote object, fetched block by block
//! └── meta    (ino 3, r--)  progress snapshot, regenerated on every read
//! ```

use std::sync::Arc;
use std::time::SystemTime;

use libc::{c_int, EINVAL, EIO, ENOENT, EROFS};
use vfetch_cache::{FetchError, ReadCoordinator};
use vfetch_config::{log_vfs_debug, log_vfs_warn};

pub const ROOT_INO: u64 = 1;
pub const CONTENT_INO: u64 = 2;
pub const META_INO: u64 = 3;

pub const CONTENT_NAME: &str = "content";
pub const META_NAME: &str = "meta";

const DIR_BLKSIZE: u32 = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Directory,
    File,
}

/// Attributes of a node, in the shape the kernel binding needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeAttr {
    pub ino: u64,
    pub kind: NodeKind,
    pub size: u64,
    pub perm: u16,
    pub nlink: u32,
    pub blksize: u32,
    pub mtime: SystemTime,
}

impl NodeAttr {
    /// Size in 512-byte units, as `st_blocks` reports it.
    pub fn blocks(&self) -> u64 {
        self.size.div_ceil(512)
    }
}

/// Per-open behaviour requested from the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenMode {
    /// Bypass the page cache so every read reaches us.
    pub direct_io: bool,
}

pub struct FetchNodes {
    reader: Arc<ReadCoordinator>,
    mounted_at: SystemTime,
}

impl FetchNodes {
    pub fn new(reader: Arc<ReadCoordinator>) -> Self {
        Self {
            reader,
            mounted_at: SystemTime::now(),
        }
    }

    pub fn reader(&self) -> &Arc<ReadCoordinator> {
        &self.reader
    }

    pub fn lookup(&self, parent: u64, name: &str) -> Option<NodeAttr> {
        if parent != ROOT_INO {
            return None;
        }
        match name {
            CONTENT_NAME => self.attr(CONTENT_INO),
            META_NAME => self.attr(META_INO),
            _ => None,
        }
    }

    pub fn attr(&self, ino: u64) -> Option<NodeAttr> {
        let attr = match ino {
            ROOT_INO => NodeAttr {
                ino,
                kind: NodeKind::Directory,
                size: 0,
                perm: 0o555,
                nlink: 2,
                blksize: DIR_BLKSIZE,
                mtime: self.mounted_at,
            },
            CONTENT_INO => NodeAttr {
                ino,
                kind: NodeKind::File,
                size: self.reader.total_size(),
                perm: 0o444,
                nlink: 1,
                blksize: u32::try_from(self.reader.block_size()).unwrap_or(u32::MAX),
                mtime: self.mounted_at,
            },
            META_INO => NodeAttr {
                ino,
                kind: NodeKind::File,
                size: self.meta_text().len() as u64,
                perm: 0o444,
                nlink: 1,
                blksize: DIR_BLKSIZE,
                mtime: SystemTime::now(),
            },
            _ => return None,
        };
        Some(attr)
    }

    /// Root listing including `.` and `..`.
    pub fn entries(&self, ino: u64) -> Option<Vec<(u64, NodeKind, &'static str)>> {
        (ino == ROOT_INO).then(|| {
            vec![
                (ROOT_INO, NodeKind::Directory, "."),
                (ROOT_INO, NodeKind::Directory, ".."),
                (CONTENT_INO, NodeKind::File, CONTENT_NAME),
                (META_INO, NodeKind::File, META_NAME),
            ]
        })
    }

    pub fn open(&self, ino: u64, flags: c_int) -> Result<OpenMode, c_int> {
        if !matches!(ino, ROOT_INO | CONTENT_INO | META_INO) {
            return Err(ENOENT);
        }
        if flags & libc::O_ACCMODE != libc::O_RDONLY {
            return Err(EROFS);
        }
        Ok(OpenMode {
            direct_io: ino == META_INO,
        })
    }

    pub fn read(&self, ino: u64, offset: i64, size: u32) -> Result<Vec<u8>, c_int> {
        let offset = u64::try_from(offset).map_err(|_| EINVAL)?;
        match ino {
            CONTENT_INO => self
                .reader
                .read(offset, u64::from(size))
                .map_err(|err| {
                    log_vfs_warn!(
                        "Content read failed",
                        offset = offset,
                        size = size,
                        error = tracing::field::display(&err),
                    );
                    errno_for(&err)
                }),
            META_INO => {
                let text = self.meta_text();
                log_vfs_debug!("Meta read", offset = offset, len = text.len());
                let bytes = text.as_bytes();
                let start = usize::try_from(offset).unwrap_or(usize::MAX).min(bytes.len());
                let end = start.saturating_add(size as usize).min(bytes.len());
                Ok(bytes[start..end].to_vec())
            }
            ROOT_INO => Err(libc::EISDIR),
            _ => Err(ENOENT),
        }
    }

    fn meta_text(&self) -> String {
        self.reader.progress().to_string()
    }
}

/// Map a read failure onto the errno handed back to the kernel.
pub fn errno_for(err: &FetchError) -> c_int {
    match err {
        FetchError::OutOfRange { .. } => EINVAL,
        _ => EIO,
    }
}
