//! # pager
//!
//! CLI for the Beep Pager session layer.
//!
//! ## Commands
//!
//! - `sign-in`: Sign in, start syncing and keep the session alive
//!
//! ## Example
//!
//! ```bash
//! # Sign in against the local server (prompts for the secret key)
//! pager sign-in --user-token alice
//!
//! # Use another server and verbose logging
//! pager -v --endpoint ws://pager.example:5020/ws sign-in --user-token alice
//! ```

use anyhow::Result;
use beep_pager_client::WebSocketTransport;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod commands;
mod config;

use commands::sign_in;

/// CLI for the Beep Pager session layer.
#[derive(Parser, Debug)]
#[command(name = "pager")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Config file (default: platform config dir, pager.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Server endpoint, overrides the config file
    #[arg(long, global = true)]
    endpoint: Option<String>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Sign in and keep the session alive until Ctrl-C
    SignIn {
        /// User token
        #[arg(long, short)]
        user_token: String,

        /// Secret key (will prompt if not provided)
        #[arg(long, short)]
        secret_key: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "info".into()),
        1 => tracing_subscriber::EnvFilter::new("debug"),
        _ => tracing_subscriber::EnvFilter::new("trace"),
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = config::load(cli.config.as_deref(), cli.endpoint.as_deref())?;

    match cli.command {
        Commands::SignIn {
            user_token,
            secret_key,
        } => {
            let secret_key = commands::resolve_secret(secret_key.as_deref())?;
            sign_in::run(
                config,
                WebSocketTransport::new(),
                &user_token,
                &secret_key,
                async {
                    if let Err(error) = tokio::signal::ctrl_c().await {
                        tracing::warn!(%error, "failed to listen for Ctrl-C");
                        std::future::pending::<()>().await;
                    }
                },
            )
            .await?;
        }
    }

    Ok(())
}
