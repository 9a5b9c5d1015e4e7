//! zapp CLI - Build executable Python zip-apps

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use zapp::core::errors::exit_code_for;

mod cli;
mod commands;

use cli::{Cli, Commands};

fn main() {
    if let Err(e) = run() {
        eprintln!("error: {:#}", e);
        std::process::exit(exit_code_for(&e));
    }
}

fn run() -> Result<()> {
    // Parse CLI
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose {
        EnvFilter::new("zapp=debug")
    } else {
        EnvFilter::new("zapp=info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    // Execute command
    match cli.command {
        Commands::Compile(args) => commands::compile::execute(args, cli.verbose),
        Commands::Completions(args) => commands::completions::execute(args),
    }
}
