//! `tether` command line entry point.
//!
//! ```bash
//! tether --config tether.toml --profile production
//! tether --config tether.toml --check
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tether_runtime::TetherRuntime;
use tether_runtime::config::{ConfigLoader, validate_config};

#[derive(Parser, Debug)]
#[command(name = "tether")]
#[command(version)]
#[command(about = "Bridge OneBot v11 peers into request/response calls.", long_about = None)]
struct Cli {
    /// Configuration file (defaults to tether.toml in the working or config directory)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Configuration profile, e.g. `production`
    #[arg(short, long)]
    profile: Option<String>,

    /// Validate the configuration and exit
    #[arg(long)]
    check: bool,
}

impl Cli {
    fn loader(&self) -> ConfigLoader {
        let mut loader = ConfigLoader::new();
        if let Some(profile) = &self.profile {
            loader = loader.profile(profile);
        }
        if let Some(path) = &self.config {
            loader = loader.file(path);
        }
        loader
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = cli.loader().load().context("failed to load configuration")?;
    validate_config(&config).context("invalid configuration")?;

    if cli.check {
        println!(
            "Configuration OK: {} peer(s), inbound server {}",
            config.bridge.peer_addresses.len(),
            if config.server.enabled { "enabled" } else { "disabled" }
        );
        return Ok(());
    }

    let runtime = TetherRuntime::from_config(&config);
    runtime.run().await?;
    Ok(())
}
