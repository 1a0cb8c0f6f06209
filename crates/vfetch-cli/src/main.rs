//! # vfetch CLI
//!
//! Mounts a remote object as a lazily fetched local file.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use vfetch_config::{Config, Overrides};

mod mount;
mod probe;
mod remote;

/// Velo Fetch - on-demand block cache for remote objects
#[derive(Parser)]
#[command(name = "vfetch")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Config file layered over ~/.vfetch/config.toml
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Mount the remote object and serve it until unmounted
    Mount(mount::MountArgs),

    /// Print the remote object's size and block layout without mounting
    Probe(probe::ProbeArgs),

    /// Configuration management
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective configuration as TOML
    Show,
    /// Print the config file locations
    Path,
}

fn main() -> Result<()> {
    #[cfg(unix)]
    unsafe {
        let _ = nix::sys::signal::signal(
            nix::sys::signal::Signal::SIGPIPE,
            nix::sys::signal::SigHandler::SigDfl,
        );
    }

    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Mount(args) => mount::run(args, config_path),
        Commands::Probe(args) => probe::run(args, config_path),
        Commands::Config { command } => match command {
            ConfigCommands::Show => {
                let config = load_config(config_path, &Overrides::default())?;
                print!("{}", redact_token(config).to_toml());
                Ok(())
            }
            ConfigCommands::Path => {
                match Config::global_config_path() {
                    Some(path) => println!("Global:   {}", path.display()),
                    None => println!("Global:   (no home directory)"),
                }
                match config_path {
                    Some(path) => println!("Explicit: {}", path.display()),
                    None => println!("Explicit: (none)"),
                }
                Ok(())
            }
        },
    }
}

/// Layer files, environment and command-line flags into one config.
pub(crate) fn load_config(
    explicit: Option<&std::path::Path>,
    overrides: &Overrides,
) -> Result<Config> {
    let mut config = Config::load(explicit).with_context(|| match explicit {
        Some(path) => format!("Failed to load config from {}", path.display()),
        None => "Failed to load config".to_string(),
    })?;
    config.apply_overrides(overrides);
    Ok(config)
}

fn redact_token(mut config: Config) -> Config {
    if !config.remote.token.is_empty() {
        config.remote.token = "********".to_string();
    }
    config
}
