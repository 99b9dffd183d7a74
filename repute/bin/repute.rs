#![deny(clippy::pedantic, clippy::all, clippy::nursery)]
#![allow(clippy::must_use_candidate)]

#[cfg(not(any(target_os = "macos", unix)))]
compile_error!("Only macos and unix are currently supported");

use std::path::PathBuf;

use clap::Parser;
use repute::{
    config::{self, DEFAULT_PATHS},
    controller::Repute,
};
use repute_common::{internal, logging};

/// Reputation-aware email dispatch scheduler
#[derive(Parser, Debug)]
#[command(name = "repute")]
#[command(version)]
struct Cli {
    /// Configuration file. Without one, ./repute.config.ron then
    /// /etc/repute/repute.config.ron are tried
    #[arg(short, long, env = "REPUTE_CONFIG")]
    config: Option<PathBuf>,

    /// Validate the configuration and exit without dispatching
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init();

    let path = config::locate(cli.config, &DEFAULT_PATHS)?;
    let repute = Repute::from_file(&path)?;

    internal!(level = INFO, "Loaded {}: {}", path.display(), repute.summary());

    if cli.check {
        return Ok(());
    }

    repute.run().await
}
