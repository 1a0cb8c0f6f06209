use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use tokio::signal::unix::{signal, SignalKind};
use vfetch_cache::{FetchEngine, ReadCoordinator};
use vfetch_config::{init_logging, log_cli_info, log_cli_warn, Config, LogLevel, Overrides};
use vfetch_fuse::FetchFs;

use crate::remote;

/// How long the mount loop gets to return after `fusermount -u`.
const UNMOUNT_GRACE: Duration = Duration::from_secs(5);

#[derive(Args, Debug)]
pub struct MountArgs {
    /// Remote object URL
    #[arg(long)]
    url: Option<String>,

    /// Directory receiving the cache-store file
    #[arg(long, value_name = "DIR")]
    tmp_dir: Option<PathBuf>,

    /// Auth token sent as X-Auth-Token
    #[arg(long)]
    token: Option<String>,

    /// Block size in MiB
    #[arg(long, value_name = "MIB")]
    blocksize: Option<u64>,

    /// Mount point directory
    #[arg(long, value_name = "DIR")]
    mount_point: Option<PathBuf>,

    /// Verbose logging
    #[arg(long)]
    debug: bool,
}

impl MountArgs {
    fn overrides(&self) -> Overrides {
        Overrides {
            url: self.url.clone(),
            token: self.token.clone(),
            tmp_dir: self.tmp_dir.clone(),
            block_size_mb: self.blocksize,
            mount_path: self.mount_point.clone(),
            debug: self.debug,
        }
    }
}

/// Execute the mount command
pub fn run(args: MountArgs, config_path: Option<&Path>) -> Result<()> {
    let config = crate::load_config(config_path, &args.overrides())?;
    config.validate()?;
    init_logging(LogLevel::from_debug_flag(config.log.debug));

    if !vfetch_fuse::FUSE_ENABLED {
        log_cli_warn!("FUSE support disabled. Recompile with --features fuse to enable.");
        log_cli_warn!("    cargo build -p vfetch-cli --features fuse");
        return Ok(());
    }

    let reader = prepare(&config)?;
    let mountpoint = config.mount.path.clone();

    log_cli_info!(
        "Mounting Velo Fetch",
        mountpoint = tracing::field::display(mountpoint.display()),
        cache = tracing::field::display(reader.cache_path().display()),
        size = reader.total_size(),
        block_size = reader.block_size(),
    );

    let outcome = serve(Arc::clone(&reader), &mountpoint);
    remove_cache(reader);
    outcome
}

/// Probe the remote, create the cache store, then the mountpoint.
///
/// Nothing is left on disk when any step fails.
fn prepare(config: &Config) -> Result<Arc<ReadCoordinator>> {
    let source = remote::http_source(config)?;
    let url = source.redacted_url();
    let engine = FetchEngine::initialize(
        Box::new(source),
        &config.cache.tmp_dir,
        config.block_size_bytes(),
        remote::retry_policy(config),
    )
    .with_context(|| format!("Failed to initialize cache for {url}"))?;

    let mountpoint = &config.mount.path;
    if !mountpoint.exists() {
        fs::create_dir_all(mountpoint)
            .with_context(|| format!("Failed to create mountpoint: {}", mountpoint.display()))?;
    }

    log_cli_info!("Remote probed", url = tracing::field::display(&url));
    Ok(Arc::new(ReadCoordinator::new(
        engine,
        config.remote.token.clone(),
    )))
}

/// Run the mount loop until it exits on its own or a signal arrives.
fn serve(reader: Arc<ReadCoordinator>, mountpoint: &Path) -> Result<()> {
    let rt = tokio::runtime::Runtime::new().context("Failed to start runtime")?;
    let result = rt.block_on(session(reader, mountpoint));

    // A mount loop that never returned must not keep the process alive.
    rt.shutdown_background();
    result
}

async fn session(reader: Arc<ReadCoordinator>, mountpoint: &Path) -> Result<()> {
    let fs = FetchFs::new(reader);
    let target = mountpoint.to_path_buf();
    let mut mount_loop = tokio::task::spawn_blocking(move || fs.mount(&target));
    let mut sigterm =
        signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;

    let received = tokio::select! {
        res = &mut mount_loop => {
            log_cli_info!("Filesystem unmounted");
            return res.context("Mount thread panicked")?;
        }
        _ = tokio::signal::ctrl_c() => "SIGINT",
        _ = sigterm.recv() => "SIGTERM",
    };

    log_cli_info!("Shutting down", signal = received);
    unmount(mountpoint).await;

    match tokio::time::timeout(UNMOUNT_GRACE, mount_loop).await {
        Ok(res) => res.context("Mount thread panicked")?,
        Err(_) => {
            log_cli_warn!(
                "Mount loop still running after unmount",
                mountpoint = tracing::field::display(mountpoint.display()),
            );
            Ok(())
        }
    }
}

/// Best-effort `fusermount -u`.
async fn unmount(mountpoint: &Path) {
    match tokio::process::Command::new("fusermount")
        .arg("-u")
        .arg(mountpoint)
        .status()
        .await
    {
        Ok(status) if status.success() => {
            log_cli_info!(
                "Unmounted",
                mountpoint = tracing::field::display(mountpoint.display()),
            );
        }
        Ok(status) => {
            log_cli_warn!(
                "fusermount -u failed",
                status = tracing::field::display(status),
            );
        }
        Err(err) => {
            log_cli_warn!(
                "Failed to run fusermount",
                error = tracing::field::display(err),
            );
        }
    }
}

/// Delete the cache-store file, whether or not the mount loop let go of it.
fn remove_cache(reader: Arc<ReadCoordinator>) {
    let path = reader.cache_path().to_path_buf();
    let removed = match Arc::try_unwrap(reader) {
        Ok(reader) => reader.shutdown().map_err(|e| e.to_string()),
        Err(reader) => {
            drop(reader);
            match fs::remove_file(&path) {
                Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err.to_string()),
                _ => Ok(()),
            }
        }
    };

    match removed {
        Ok(()) => log_cli_info!(
            "Cache store removed",
            path = tracing::field::display(path.display()),
        ),
        Err(err) => log_cli_warn!(
            "Failed to remove cache store",
            path = tracing::field::display(path.display()),
            error = err.as_str(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use vfetch_cache::{compress_block, RangeSource, RetryPolicy};

    struct Fixed(Vec<u8>);

    impl RangeSource for Fixed {
        fn probe_size(&self) -> vfetch_cache::Result<u64> {
            Ok(self.0.len() as u64)
        }

        fn fetch_range(&self, start: u64, end: u64) -> vfetch_cache::Result<Vec<u8>> {
            Ok(compress_block(&self.0[start as usize..=end as usize]))
        }
    }

    fn reader(dir: &Path) -> Arc<ReadCoordinator> {
        let engine = FetchEngine::initialize(
            Box::new(Fixed(vec![7u8; 3000])),
            dir,
            1024,
            RetryPolicy::default(),
        )
        .unwrap();
        Arc::new(ReadCoordinator::new(engine, ""))
    }

    #[test]
    fn test_overrides_carry_every_flag() {
        let args = MountArgs {
            url: Some("http://host/obj".into()),
            tmp_dir: Some("/var/tmp".into()),
            token: Some("t".into()),
            blocksize: Some(4),
            mount_point: Some("/mnt/obj".into()),
            debug: true,
        };
        let o = args.overrides();
        assert_eq!(o.url.as_deref(), Some("http://host/obj"));
        assert_eq!(o.tmp_dir, Some(PathBuf::from("/var/tmp")));
        assert_eq!(o.token.as_deref(), Some("t"));
        assert_eq!(o.block_size_mb, Some(4));
        assert_eq!(o.mount_path, Some(PathBuf::from("/mnt/obj")));
        assert!(o.debug);
    }

    #[test]
    fn test_unreachable_remote_leaves_nothing_behind() {
        let temp = tempfile::TempDir::new().unwrap();
        let cache_dir = temp.path().join("cache");
        fs::create_dir(&cache_dir).unwrap();

        let mut config = Config::default();
        // Port 9 (discard) is closed on test machines.
        config.remote.url = "http://127.0.0.1:9/disk.img".into();
        config.cache.tmp_dir = cache_dir.clone();
        config.mount.path = temp.path().join("mnt");

        assert!(prepare(&config).is_err());
        assert!(!config.mount.path.exists());
        assert_eq!(fs::read_dir(&cache_dir).unwrap().count(), 0);
    }

    #[test]
    fn test_remove_cache_sole_owner() {
        let temp = tempfile::TempDir::new().unwrap();
        let reader = reader(temp.path());
        let path = reader.cache_path().to_path_buf();
        assert!(path.exists());

        remove_cache(reader);
        assert!(!path.exists());
    }

    #[test]
    fn test_remove_cache_while_still_shared() {
        let temp = tempfile::TempDir::new().unwrap();
        let reader = reader(temp.path());
        let held = Arc::clone(&reader);
        let path = reader.cache_path().to_path_buf();

        remove_cache(reader);
        assert!(!path.exists());

        // The leftover handle's drop must not trip over the missing file.
        drop(held);
    }
}
