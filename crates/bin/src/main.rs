//! `positioning`: inspect, repair and reorder positioned columns from the
//! command line.

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

mod backend;
mod cli;
mod commands;
mod output;

use cli::{Cli, Commands};
use output::OutputFormat;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Logs go to stderr so JSON on stdout stays parseable.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("positioning=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!("Backend: {}", backend::backend_label(&cli.backend));
    let format = OutputFormat::from_flag(cli.json);

    let result = match &cli.command {
        Commands::Check(args) => commands::check::run(&cli.backend, args, format).await,
        Commands::Heal(args) => commands::heal::run(&cli.backend, args, format)
            .await
            .map(|()| true),
        Commands::Move(args) => commands::reposition::run(&cli.backend, args, format)
            .await
            .map(|()| true),
        Commands::List(args) => commands::list::run(&cli.backend, args, format)
            .await
            .map(|()| true),
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        // Only `check` reports false: some scope is not dense.
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(2)
        }
    }
}
