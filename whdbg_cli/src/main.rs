//! Whdbg CLI - Watch webhook requests as they arrive
//!
//! Usage:
//!   whdbg listen <LISTENER>     Stream requests sent to a listener
//!   whdbg codes                 List status codes a listener can answer with
//!   whdbg config                Show (or save) the configuration

mod commands;
mod config;
mod session;
mod tui;

#[cfg(test)]
mod test_support;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use config::Environment;
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "whdbg")]
#[command(author = "Whdbg Team")]
#[command(version)]
#[command(about = "Watch webhook requests as they arrive", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Backend deployment to use
    #[arg(long, global = true, env = "WHDBG_ENV", value_enum)]
    env: Option<Environment>,

    /// Backend URL, overrides --env
    #[arg(long, global = true, env = "WHDBG_SERVER_URL")]
    server_url: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream requests sent to a listener
    Listen {
        /// Listener name (the subdomain webhooks are sent to)
        listener: String,

        /// Status code to answer requests with
        #[arg(short = 'c', long)]
        status: Option<u16>,

        /// Body to answer requests with (empty echoes the request body)
        #[arg(short = 'r', long)]
        body: Option<String>,

        /// Print requests line by line instead of the full screen view
        #[arg(long)]
        plain: bool,

        /// Print each request as a JSON line
        #[arg(long)]
        json: bool,
    },

    /// List status codes a listener can answer with
    Codes,

    /// Show the configuration
    Config {
        /// Write the effective configuration to the config file
        #[arg(long)]
        save: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Ensure config directories exist
    config::ensure_dirs()?;

    let listen_opts = match &cli.command {
        Commands::Listen {
            listener,
            status,
            body,
            plain,
            json,
        } => Some(commands::listen::ListenOptions {
            listener: listener.clone(),
            status: *status,
            body: body.clone(),
            plain: *plain,
            json: *json,
        }),
        _ => None,
    };

    // Initialize logging
    let interactive = listen_opts.as_ref().is_some_and(|o| o.interactive());
    init_logging(cli.verbose, interactive)?;

    let config = config::Config::load()?.with_overrides(cli.env, cli.server_url);

    // Handle commands
    match cli.command {
        Commands::Listen { .. } => {
            if let Some(opts) = listen_opts {
                commands::listen::run(config, opts).await?;
            }
        }

        Commands::Codes => {
            commands::codes::run();
        }

        Commands::Config { save } => {
            commands::config::run(&config, save)?;
        }
    }

    Ok(())
}

/// Log to stderr, or to a file while the full screen view owns the terminal
fn init_logging(verbose: bool, interactive: bool) -> Result<()> {
    let log_level = if verbose { "debug" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("{},whdbg_cli=info", log_level).into());

    if interactive {
        let path = config::logs_dir().join("whdbg.log");
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open log file {}", path.display()))?;

        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .without_time()
                    .with_writer(std::io::stderr),
            )
            .init();
    }

    Ok(())
}
