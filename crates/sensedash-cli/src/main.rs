//! sensedash - terminal front-end for the sensor monitoring dashboard.
//!
//! Drives the session policy of `sensedash-core` from the command line:
//! sign in with an issued token, navigate the dashboard's routes through the
//! session guard, and call the backend through the authorized client.

mod commands;

use std::io;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use commands::App;

/// Directory for an additional daily-rotated log file
const LOG_DIR_ENV: &str = "SENSEDASH_LOG_DIR";

#[derive(Parser)]
#[command(name = "sensedash", version, about = "Sensor monitoring dashboard client")]
struct Cli {
    /// Session file to use instead of the one in the cache directory
    #[arg(long, global = true)]
    session_file: Option<PathBuf>,

    /// Extra request header as `Name: value`; replaces a default of the same name
    #[arg(short = 'H', long = "header", global = true)]
    headers: Vec<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Store an issued credential and the user's display name
    Login {
        #[arg(long)]
        token: String,
        #[arg(long)]
        name: String,
    },
    /// Remove the stored credential and profile
    Logout,
    /// Show the stored session and whether it is still valid
    Status,
    /// List the dashboard routes
    Routes,
    /// Navigate to a dashboard path through the session guard
    Navigate { path: String },
    /// GET a backend path
    Get { url: String },
    /// POST a JSON body to a backend path
    Post { url: String, body: String },
    /// PUT a JSON body to a backend path
    Put { url: String, body: String },
    /// DELETE a backend path
    Delete { url: String },
}

/// Initialize the tracing subscriber for logging
fn init_tracing() -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match std::env::var_os(LOG_DIR_ENV) {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "sensedash.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let _log_guard = init_tracing();
    let cli = Cli::parse();

    let app = App::open(cli.session_file)?;
    info!("sensedash starting");

    match cli.command {
        Command::Login { token, name } => app.login(&token, &name),
        Command::Logout => app.logout(),
        Command::Status => app.status(),
        Command::Routes => app.routes(),
        Command::Navigate { path } => app.navigate(&path),
        Command::Get { url } => app.get(&url, &cli.headers).await,
        Command::Post { url, body } => app.post(&url, &body, &cli.headers).await,
        Command::Put { url, body } => app.put(&url, &body, &cli.headers).await,
        Command::Delete { url } => app.delete(&url, &cli.headers).await,
    }
}
