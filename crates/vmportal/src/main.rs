// SPDX-FileCopyrightText: 2026 VmPortal Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! VmPortal - self-service VM portal.
//!
//! Binary entry point: the gateway server, a one-shot inventory sync, and
//! configuration checks.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod serve;
mod shutdown;
mod sync;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use vmportal_config::{ConfigError, PortalConfig};

/// VmPortal - self-service VM portal.
#[derive(Parser, Debug)]
#[command(name = "vmportal", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the default locations.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the gateway and background jobs.
    Serve,
    /// Run a single inventory reconciliation pass and exit.
    Sync,
    /// Inspect configuration.
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Validate the configuration and print the effective values.
    Check,
}

fn load_config(path: Option<&PathBuf>) -> Result<PortalConfig, Vec<ConfigError>> {
    match path {
        Some(path) => vmportal_config::load_and_validate_path(path),
        None => vmportal_config::load_and_validate(),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        println!("vmportal: use --help for available commands");
        return;
    };

    let config = match load_config(cli.config.as_ref()) {
        Ok(config) => config,
        Err(errors) => {
            vmportal_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    let result = match command {
        Commands::Serve => serve::run_serve(config).await,
        Commands::Sync => sync::run_sync(config).await,
        Commands::Config {
            action: ConfigCommands::Check,
        } => {
            // Debug output masks secrets.
            println!("{config:#?}");
            println!("vmportal: configuration is valid");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("vmportal: {e}");
        std::process::exit(1);
    }
}
