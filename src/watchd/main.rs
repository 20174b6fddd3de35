// SPDX-FileCopyrightText: 2025-2026 TII (SSRC) and the Ghaf contributors
// SPDX-License-Identifier: Apache-2.0

mod daemon;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use daemon::Daemon;
use ghaf_clamav_watch::config::{Config, verify_config};
use ghaf_clamav_watch::util::init_logger;

#[derive(Parser)]
#[command(name = "clamav-watchd")]
#[command(about = "Real-time ClamAV scanning of a directory tree")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Parser)]
enum Commands {
    /// Start the daemon
    Run {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        debug: bool,
    },
    /// Verify configuration file without starting daemon
    Verify {
        #[arg(short, long)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config, debug } => {
            init_logger(debug)?;

            let config = Config::load(&config).with_context(|| {
                format!("Failed to load configuration from {}", config.display())
            })?;

            let daemon = Daemon::new(config);
            daemon.run().await.context("Daemon execution failed")?;

            Ok(())
        }
        Commands::Verify { config } => verify_config(&config)
            .with_context(|| format!("Failed to verify configuration file {}", config.display())),
    }
}
