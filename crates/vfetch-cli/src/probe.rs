use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use vfetch_cache::{BlockGeometry, RangeSource};
use vfetch_config::{init_logging, LogLevel, Overrides};

use crate::remote;

#[derive(Args, Debug)]
pub struct ProbeArgs {
    /// Remote object URL
    #[arg(long)]
    url: Option<String>,

    /// Auth token sent as X-Auth-Token
    #[arg(long)]
    token: Option<String>,

    /// Block size in MiB
    #[arg(long, value_name = "MIB")]
    blocksize: Option<u64>,

    /// Verbose logging
    #[arg(long)]
    debug: bool,
}

impl ProbeArgs {
    fn overrides(&self) -> Overrides {
        Overrides {
            url: self.url.clone(),
            token: self.token.clone(),
            block_size_mb: self.blocksize,
            debug: self.debug,
            ..Overrides::default()
        }
    }
}

pub fn run(args: ProbeArgs, config_path: Option<&Path>) -> Result<()> {
    let config = crate::load_config(config_path, &args.overrides())?;
    if config.remote.url.is_empty() {
        anyhow::bail!("No remote URL given (use --url, VFETCH_URL or [remote] url)");
    }
    config.validate_fetch()?;
    init_logging(LogLevel::from_debug_flag(config.log.debug));

    let source = remote::http_source(&config)?;
    let total = source
        .probe_size()
        .with_context(|| format!("Failed to probe {}", source.redacted_url()))?;
    let geometry = BlockGeometry::new(total, config.block_size_bytes())?;

    println!("url:         {}", source.redacted_url());
    println!("size:        {}", geometry.total_size());
    println!("block_size:  {}", geometry.block_size());
    println!("block_count: {}", geometry.block_count());
    Ok(())
}
