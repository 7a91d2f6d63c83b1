//! Hearth game server node
//!
//! Boots one node of the given role from a layered configuration directory
//! and runs it until interrupted.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use hearth_core::{RoleType, ShardRole};
use hearth_login::LoginTokenComponent;
use hearth_node::{NodeConfig, ServerNode};

mod player;

#[derive(Debug, Parser)]
#[command(name = "hearth")]
#[command(about = "Hearth - game server node", long_about = None)]
struct Cli {
    /// Node role: gate, login, home or world
    #[arg(short, long)]
    role: RoleType,

    /// Directory holding base.toml and <role>.toml
    #[arg(short, long, default_value = "conf")]
    config_dir: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt().with_env_filter(log_level).init();

    let node = build_node(cli.role, cli.config_dir.clone())?;

    let quit = node.quit_handle();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("interrupt received, stopping node");
                quit.raise();
            }
            Err(err) => tracing::error!(%err, "cannot listen for interrupt"),
        }
    });

    let stats = node
        .run()
        .await
        .with_context(|| format!("{} node terminated (config from {})", cli.role, cli.config_dir.display()))?;
    tracing::info!(
        fired = stats.fired,
        skipped = stats.skipped,
        coalesced = stats.coalesced,
        "node exited"
    );
    Ok(())
}

/// Assemble the node: login tokens on every role, groups bound per configuration
fn build_node(role: RoleType, config_dir: PathBuf) -> Result<ServerNode> {
    Ok(ServerNode::builder(role)
        .with_config_dir(config_dir)
        .with_global(|config: &NodeConfig| LoginTokenComponent::with_ttl(config.login.ttl()))
        .offer_group(ShardRole::Player, player::group()?)
        .build())
}
