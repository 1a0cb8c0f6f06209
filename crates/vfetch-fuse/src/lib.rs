//! # vfetch-fuse
//!
//! FUSE filesystem for Velo Fetch.
//!
//! Exposes a remote object as `<mount>/content`, backed by a
//! [`vfetch_cache::ReadCoordinator`], next to a `<mount>/meta` progress file.
//! - Inodes are fixed: 1 root, 2 content, 3 meta.
//! - The mount is read-only.
//! - Node behaviour lives in [`FetchNodes`]; this module only binds it to `fuser`.

mod nodes;

pub use nodes::{
    errno_for, FetchNodes, NodeAttr, NodeKind, OpenMode, CONTENT_INO, CONTENT_NAME, META_INO,
    META_NAME, ROOT_INO,
};

#[cfg(all(feature = "fuse", target_os = "linux"))]
mod imp {
    use std::ffi::OsStr;
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;

    use fuser::{
        FileAttr, FileType, Filesystem, ReplyAttr, ReplyData, ReplyDirectory, ReplyEntry,
        ReplyOpen, Request,
    };
    use libc::{c_int, ENOENT};
    use vfetch_cache::ReadCoordinator;
    use vfetch_config::{log_vfs_debug, log_vfs_info};

    use crate::nodes::{FetchNodes, NodeAttr, NodeKind, META_INO};

    const TTL: Duration = Duration::from_secs(60);

    pub struct FetchFs {
        nodes: FetchNodes,
    }

    impl FetchFs {
        pub fn new(reader: Arc<ReadCoordinator>) -> Self {
            Self {
                nodes: FetchNodes::new(reader),
            }
        }

        /// Mount at `mountpoint` and serve until unmounted (Ref: <https://docs.rs/fuser>)
        pub fn mount(self, mountpoint: &Path) -> anyhow::Result<()> {
            let opts = vec![
                fuser::MountOption::RO,
                fuser::MountOption::FSName("vfetch".to_string()),
            ];

            log_vfs_info!(
                "Mounting",
                mountpoint = tracing::field::display(mountpoint.display()),
            );
            fuser::mount2(self, mountpoint, &opts)?;
            Ok(())
        }

        fn file_type(kind: NodeKind) -> FileType {
            match kind {
                NodeKind::Directory => FileType::Directory,
                NodeKind::File => FileType::RegularFile,
            }
        }

        fn to_file_attr(attr: &NodeAttr) -> FileAttr {
            FileAttr {
                ino: attr.ino,
                size: attr.size,
                blocks: attr.blocks(),
                atime: attr.mtime,
                mtime: attr.mtime,
                ctime: attr.mtime,
                crtime: attr.mtime,
                kind: Self::file_type(attr.kind),
                perm: attr.perm,
                nlink: attr.nlink,
                uid: 0,
                gid: 0,
                rdev: 0,
                flags: 0,
                blksize: attr.blksize,
            }
        }

        fn attr_ttl(ino: u64) -> Duration {
            // meta changes with every fetched block
            if ino == META_INO {
                Duration::ZERO
            } else {
                TTL
            }
        }
    }

    impl Filesystem for FetchFs {
        fn lookup(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEntry) {
            match name.to_str().and_then(|name| self.nodes.lookup(parent, name)) {
                Some(attr) => reply.entry(
                    &Self::attr_ttl(attr.ino),
                    &Self::to_file_attr(&attr),
                    0,
                ),
                None => reply.error(ENOENT),
            }
        }

        fn getattr(&mut self, _req: &Request, ino: u64, reply: ReplyAttr) {
            match self.nodes.attr(ino) {
                Some(attr) => reply.attr(&Self::attr_ttl(ino), &Self::to_file_attr(&attr)),
                None => reply.error(ENOENT),
            }
        }

        fn open(&mut self, _req: &Request, ino: u64, flags: c_int, reply: ReplyOpen) {
            match self.nodes.open(ino, flags) {
                Ok(mode) => {
                    let open_flags = if mode.direct_io {
                        fuser::consts::FOPEN_DIRECT_IO
                    } else {
                        0
                    };
                    reply.opened(0, open_flags);
                }
                Err(errno) => reply.error(errno),
            }
        }

        fn read(
            &mut self,
            _req: &Request,
            ino: u64,
            _fh: u64,
            offset: i64,
            size: u32,
            _flags: c_int,
            _lock_owner: Option<u64>,
            reply: ReplyData,
        ) {
            log_vfs_debug!("Read", ino = ino, offset = offset, size = size);
            match self.nodes.read(ino, offset, size) {
                Ok(data) => reply.data(&data),
                Err(errno) => reply.error(errno),
            }
        }

        fn readdir(
            &mut self,
            _req: &Request,
            ino: u64,
            _fh: u64,
            offset: i64,
            mut reply: ReplyDirectory,
        ) {
            let Some(entries) = self.nodes.entries(ino) else {
                reply.error(ENOENT);
                return;
            };

            let skip = usize::try_from(offset).unwrap_or(0);
            for (i, (child_ino, kind, name)) in entries.into_iter().enumerate().skip(skip) {
                // offset of the next entry
                if reply.add(child_ino, (i + 1) as i64, Self::file_type(kind), name) {
                    break;
                }
            }
            reply.ok();
        }
    }
}

#[cfg(not(all(feature = "fuse", target_os = "linux")))]
mod imp {
    use std::sync::Arc;

    use vfetch_cache::ReadCoordinator;
    use vfetch_config::log_vfs_warn;

    /// Dummy FUSE filesystem for non-Linux or non-feature builds
    pub struct FetchFs;

    impl FetchFs {
        pub fn new(_reader: Arc<ReadCoordinator>) -> Self {
            #[cfg(not(target_os = "linux"))]
            log_vfs_warn!(
                "FUSE support is only available on Linux",
                os = std::env::consts::OS,
            );
            #[cfg(all(target_os = "linux", not(feature = "fuse")))]
            log_vfs_warn!("FetchFs is disabled. Compile with --features fuse to enable.");
            Self
        }

        pub fn mount(self, _mountpoint: &std::path::Path) -> anyhow::Result<()> {
            anyhow::bail!("FUSE not supported on this platform");
        }
    }
}

pub use imp::FetchFs;

/// Whether this build can actually mount.
pub const FUSE_ENABLED: bool = cfg!(all(feature = "fuse", target_os = "linux"));
