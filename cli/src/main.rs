// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # nfsg
//!
//! The `nfsg` binary runs the NFS gateway daemon and talks to it.
//!
//! ## Commands
//!
//! - `nfsg serve` - Run the gateway: reload exports, serve the HTTP API
//! - `nfsg volume create|get|delete` - Volume operations against a running gateway
//! - `nfsg status` - Health check of a running gateway
//! - `nfsg config show|validate` - Configuration management

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use nfsg::commands::{self, ConfigCommand, VolumeCommand};
use nfsg::daemon::{self, ServeOverrides};

/// nfsg - NFS export gateway
#[derive(Parser)]
#[command(name = "nfsg")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "NFSG_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "NFSG_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the gateway daemon in the foreground
    #[command(name = "serve")]
    Serve {
        /// HTTP listen address
        #[arg(short = 'H', long, env = "NFSG_LISTEN_ADDR", value_name = "ADDR")]
        listen: Option<String>,

        /// Data root holding volumes.db and nfs/
        #[arg(long, env = "NFSG_ROOT", value_name = "DIR")]
        root: Option<PathBuf>,

        /// exportfs binary (default: looked up on PATH)
        #[arg(long, value_name = "FILE")]
        exportfs: Option<PathBuf>,

        /// Skip preparing the kernel NFS server
        #[arg(long)]
        no_bootstrap: bool,
    },

    /// Volume operations
    #[command(name = "volume")]
    Volume {
        /// Gateway address
        #[arg(long, global = true, env = "NFSG_ADDR", default_value = "127.0.0.1:80")]
        addr: String,

        #[command(subcommand)]
        command: VolumeCommand,
    },

    /// Check whether a gateway is running
    #[command(name = "status")]
    Status {
        /// Gateway address
        #[arg(long, env = "NFSG_ADDR", default_value = "127.0.0.1:80")]
        addr: String,
    },

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    init_logging(&cli.log_level)?;

    match cli.command {
        Commands::Serve {
            listen,
            root,
            exportfs,
            no_bootstrap,
        } => {
            let overrides = ServeOverrides {
                listen_addr: listen,
                root,
                exportfs_path: exportfs,
                no_bootstrap,
            };
            daemon::run_gateway(cli.config, overrides).await
        }
        Commands::Volume { addr, command } => commands::volume::handle_command(command, &addr).await,
        Commands::Status { addr } => commands::volume::status(&addr).await,
        Commands::Config { command } => commands::config::handle_command(command, cli.config).await,
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    Ok(())
}
