// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;

use crate::daemon::{GatewayClient, VolumeInfo};

#[derive(Subcommand)]
pub enum VolumeCommand {
    /// Create a volume and export it
    Create {
        /// Volume name
        #[arg(value_name = "NAME")]
        name: String,

        /// Host allowed to mount (repeatable)
        #[arg(long = "host", value_name = "HOST")]
        hosts: Vec<String>,

        /// exportfs options applied to every host, e.g. rw,sync
        #[arg(short, long)]
        options: Option<String>,
    },

    /// Show a volume
    Get {
        /// Volume name
        #[arg(value_name = "NAME")]
        name: String,
    },

    /// Unexport and delete a volume and its data
    Delete {
        /// Volume name
        #[arg(value_name = "NAME")]
        name: String,
    },
}

pub async fn handle_command(command: VolumeCommand, addr: &str) -> Result<()> {
    let client = GatewayClient::new(addr)?;

    match command {
        VolumeCommand::Create {
            name,
            hosts,
            options,
        } => create_volume(&client, &name, hosts, options).await,
        VolumeCommand::Get { name } => get_volume(&client, &name).await,
        VolumeCommand::Delete { name } => delete_volume(&client, &name).await,
    }
}

/// Report gateway health
pub async fn status(addr: &str) -> Result<()> {
    let client = GatewayClient::new(addr)?;

    match client.health().await {
        Ok(health) => {
            let uptime = health["uptime_seconds"].as_u64().unwrap_or(0);
            println!(
                "{}",
                format!("✓ Gateway is running at {} (uptime: {}s)", client.base_url(), uptime).green()
            );
            Ok(())
        }
        Err(e) => {
            println!("{}", format!("✗ Gateway is not running at {}", client.base_url()).red());
            Err(e)
        }
    }
}

async fn create_volume(
    client: &GatewayClient,
    name: &str,
    hosts: Vec<String>,
    options: Option<String>,
) -> Result<()> {
    if hosts.is_empty() {
        println!("{}", "⚠ No --host given; the volume will not be exported".yellow());
    }

    let volume = client.create_volume(name, hosts, options).await?;
    println!("{}", format!("✓ Volume created: {}", volume.name).green());
    print_volume(&volume);

    Ok(())
}

async fn get_volume(client: &GatewayClient, name: &str) -> Result<()> {
    match client.get_volume(name).await? {
        Some(volume) => {
            print_volume(&volume);
            Ok(())
        }
        None => anyhow::bail!("Volume '{}' not found", name),
    }
}

async fn delete_volume(client: &GatewayClient, name: &str) -> Result<()> {
    client.delete_volume(name).await?;
    println!("{}", format!("✓ Volume deleted: {}", name).green());
    Ok(())
}

fn print_volume(volume: &VolumeInfo) {
    println!("{:<6} {}", "NAME".bold(), volume.name);
    println!("{:<6} {}", "PATH".bold(), volume.path);
}
