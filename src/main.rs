//! vpstun - Expose private TCP and UDP services through a public VPS
//!
//! One SSH session carries every reverse-forward; UDP rides inside it through
//! relay pairs on both ends.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use vpstun_bridge::SshSessionBuilder;
use vpstun_client::{spawn_signal_listener, SshLauncher, Supervisor};
use vpstun_process::require_binary;
use vpstun_proto::{TunnelConfig, DEFAULT_CONFIG_PATH};

/// vpstun - Reverse SSH tunnel with UDP support
#[derive(Parser, Debug)]
#[command(name = "vpstun")]
#[command(about = "Expose private TCP and UDP services through a public VPS over SSH")]
#[command(version = env!("VPSTUN_VERSION"))]
#[command(long_version = concat!(env!("VPSTUN_VERSION"), "\nCommit: ", env!("VPSTUN_GIT_HASH"), "\nBuilt: ", env!("VPSTUN_BUILD_TIME")))]
struct Cli {
    /// Enable verbose logging (same as --log-level debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log level or filter directive (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info", env = "VPSTUN_LOG")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the bridges and keep the SSH tunnel up until interrupted
    #[command(long_about = r#"
Start the local UDP bridges, check that they listen, then hold one SSH
session to the VPS open. The session is restarted after every disconnect
until SIGINT or SIGTERM is received.

EXAMPLES:
  # Run with the default config
  vpstun run

  # Run with an explicit config and debug logging
  vpstun -v run --config ./vpstun.yaml

ENVIRONMENT VARIABLES:
  VPSTUN_CONFIG   Config file path (default /etc/vpstun/config.yaml)
  VPSTUN_LOG      Log level or filter directive
    "#)]
    Run {
        /// Path to the YAML config file
        #[arg(short, long, env = "VPSTUN_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },

    /// Validate the config and print the SSH command and remote script
    Check {
        /// Path to the YAML config file
        #[arg(short, long, env = "VPSTUN_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },

    /// Write an example config file
    Init {
        /// Where to write the template
        #[arg(short, long, default_value = "vpstun.yaml")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Setup logging with the specified log level
fn setup_logging(verbose: bool, log_level: &str) {
    let log_level = if verbose { "debug" } else { log_level };

    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(false))
        .with(filter)
        .init();
}

fn load_config(path: &Path) -> Result<TunnelConfig> {
    TunnelConfig::load(path).with_context(|| format!("Failed to load config {}", path.display()))
}

/// Run the supervisor until a shutdown signal arrives
async fn run_tunnel(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    info!("vpstun {} starting", env!("VPSTUN_VERSION"));
    info!("VPS: {}:{}", config.vps.target(), config.vps.port);
    for forward in &config.tcp_forwards {
        info!("Forward: {}", forward);
    }
    for forward in &config.udp_forwards {
        info!("Forward: {}", forward);
    }

    let cancel = CancellationToken::new();
    let signals = spawn_signal_listener(cancel.clone());

    let launcher = SshLauncher::new(config.stop_grace());
    let mut supervisor = Supervisor::new(config, launcher);
    let result = supervisor.run(cancel).await;
    signals.abort();

    let report = result.context("Tunnel failed to start")?;
    info!(
        "vpstun stopped ({} SSH session(s) started)",
        report.session_launches
    );
    Ok(())
}

/// Print what `run` would execute, without starting anything
fn check_config(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;

    println!("Config OK: {}", config_path.display());
    for forward in &config.tcp_forwards {
        println!("  {}", forward);
    }
    for forward in &config.udp_forwards {
        println!("  {}", forward);
    }

    let mut binaries = vec![config.ssh_binary.as_str()];
    if !config.udp_forwards.is_empty() {
        binaries.push(config.relay_binary.as_str());
    }
    for binary in binaries {
        match require_binary(binary) {
            Ok(path) => println!("Found {} at {}", binary, path.display()),
            Err(e) => warn!("{}", e),
        }
    }

    let command = SshSessionBuilder::from_config(&config).build();

    println!();
    println!("SSH arguments:");
    println!("  {}", command.program.display());
    for arg in &command.args {
        println!("  {}", arg);
    }
    println!("  {}", command.target);

    println!();
    println!("Remote script:");
    print!("{}", command.remote_script);

    Ok(())
}

fn write_template(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            output.display()
        );
    }

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    std::fs::write(output, TunnelConfig::template())
        .with_context(|| format!("Failed to write {}", output.display()))?;

    println!("Wrote config template to {}", output.display());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, &cli.log_level);

    let result = match &cli.command {
        Commands::Run { config } => run_tunnel(config).await,
        Commands::Check { config } => check_config(config),
        Commands::Init { output, force } => write_template(output, *force),
    };

    if let Err(e) = &result {
        error!("{:#}", e);
    }
    result
}
