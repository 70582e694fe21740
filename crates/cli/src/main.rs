//! VaultGate CLI — the main entry point.
//!
//! Commands:
//! - `serve`    — Start the HTTP gateway
//! - `verify`   — Verify a bearer token and print its claims
//! - `context`  — Build the context for a vault or server without calling the model
//! - `doctor`   — Diagnose configuration, authority and language model reachability
//! - `init`     — Write a starter config file

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "vaultgate",
    about = "VaultGate — token-verified chat over document vaults",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to ~/.vaultgate/config.toml)
    #[arg(short, long, global = true, env = "VAULTGATE_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Verify a bearer token and print the caller's claims
    Verify {
        /// The raw token (without the `Bearer ` prefix)
        token: String,
    },

    /// Assemble the context for a collection scope
    Context {
        /// Collection name: `vault` or `server`
        collection: String,

        /// Owner scope id (vault id or server id)
        scope: String,

        /// Caller's bearer token, forwarded to the document store
        #[arg(short, long, env = "VAULTGATE_TOKEN")]
        token: String,

        /// Character budget (defaults to the collection's configured budget)
        #[arg(long)]
        max_chars: Option<usize>,

        /// Omit per-file headers
        #[arg(long)]
        no_headers: bool,
    },

    /// Diagnose configuration and authority reachability
    Doctor,

    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .init();
    }

    let config_path = cli.config.unwrap_or_else(commands::default_config_path);

    match cli.command {
        Commands::Serve { port } => commands::serve::run(&config_path, port).await?,
        Commands::Verify { token } => commands::verify::run(&config_path, &token).await?,
        Commands::Context {
            collection,
            scope,
            token,
            max_chars,
            no_headers,
        } => commands::context::run(&config_path, &collection, &scope, &token, max_chars, !no_headers).await?,
        Commands::Doctor => commands::doctor::run(&config_path).await?,
        Commands::Init { force } => commands::init::run(&config_path, force)?,
    }

    Ok(())
}
