//! # CLI Layer
//!
//! One possible client for the notesync library. This is the only place that
//! knows about terminal I/O, exit codes and output formatting.
//!
//! ## Structure
//!
//! - `setup`: Argument parsing via clap
//! - `context`: Loads config, store snapshot and credentials into an `AppContext`
//! - `handlers`: Per-command handlers that drive the gateway and print results
//! - `print`: Output formatting (colors, note listings)

mod context;
mod handlers;
mod print;
pub mod setup;

use anyhow::Result;
use clap::Parser;
use context::{default_account, AppContext};
use setup::{Cli, Commands};

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let account = match &cli.command {
        Commands::Login { user: Some(user) } => user.clone(),
        _ => default_account(),
    };
    let ctx = AppContext::init(cli.config.as_deref(), &account)?;

    let result = match cli.command {
        Commands::Login { user } => handlers::handle_login(&ctx, user.as_deref()),
        Commands::Logout => handlers::handle_logout(&ctx),
        Commands::Whoami => handlers::handle_whoami(&ctx),
        Commands::Note(command) => handlers::handle_note(&ctx, command),
        Commands::Render { location } => handlers::handle_render(&ctx, &location),
    };
    finish(result, ctx.save())
}

/// The command's own error wins; a save failure behind it is only logged.
fn finish(result: Result<()>, saved: notesync::Result<()>) -> Result<()> {
    match (result, saved) {
        (result, Ok(())) => result,
        (Ok(()), Err(err)) => Err(anyhow::Error::new(err).context("Failed to save state")),
        (Err(err), Err(save_err)) => {
            tracing::error!(error = %save_err, "Failed to save state");
            Err(err)
        }
    }
}

fn init_tracing(verbose: u8) {
    use tracing_subscriber::EnvFilter;

    // RUST_LOG wins over -v
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        match verbose {
            0 => EnvFilter::new("warn"),
            1 => EnvFilter::new("info"),
            2 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}
