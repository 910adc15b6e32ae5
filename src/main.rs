//! notifeed CLI - terminal client for the real-time notification feed.
//!
//! This is the main binary entry point. See the `notifeed` library for the
//! core functionality.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mimalloc::MiMalloc;
use notifeed::{commands, Config, Identity, PermissionState};
use tokio_util::sync::CancellationToken;

/// Global allocator configured per M-MIMALLOC-APPS guideline.
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

// CLI
#[derive(Parser)]
#[command(name = "notifeed")]
#[command(version)]
#[command(about = "Real-time notification feed in your terminal")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect and print notifications as they arrive
    Listen {
        /// User to receive notifications for
        #[arg(long, env = "NOTIFEED_USER_ID")]
        user_id: String,
        /// Role of the user
        #[arg(long, env = "NOTIFEED_ROLE", default_value = "user")]
        role: String,
        /// Business managed by the user (repeatable)
        #[arg(long = "business-id")]
        business_ids: Vec<String>,
        /// Override the configured server URL
        #[arg(long)]
        server_url: Option<String>,
    },
    /// Print the effective configuration
    Config,
    /// Set the desktop notification permission
    Permission {
        /// granted, denied or default
        state: PermissionState,
    },
}

fn init_logging() -> Result<()> {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    builder.format_timestamp_secs();

    // Keep stdout for the feed; logs go to stderr or a file.
    if let Ok(path) = std::env::var("NOTIFEED_LOG_FILE") {
        let log_file = std::fs::File::create(&path)
            .with_context(|| format!("Failed to create log file at {path}"))?;
        builder.target(env_logger::Target::Pipe(Box::new(log_file)));
    } else {
        builder.target(env_logger::Target::Stderr);
    }

    builder.init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging()?;

    let cli = Cli::parse();

    match cli.command {
        Commands::Listen {
            user_id,
            role,
            business_ids,
            server_url,
        } => {
            let mut config = Config::load()?;
            if let Some(server_url) = server_url {
                config.server_url = server_url;
            }
            let identity = Identity::new(user_id, role).with_business_ids(business_ids);

            let shutdown = CancellationToken::new();
            let token = shutdown.clone();
            ctrlc::set_handler(move || token.cancel())
                .context("Failed to install Ctrl-C handler")?;

            commands::listen::run(config, identity, shutdown).await?;
        }
        Commands::Config => {
            commands::show_config()?;
        }
        Commands::Permission { state } => {
            commands::set_permission(state)?;
        }
    }

    Ok(())
}
