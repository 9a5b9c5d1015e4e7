//! zapp-run - Loader for zapp archives
//!
//! Named in the shebang of every zip-app: `zapp-run ARCHIVE [ARGS...]`.

use std::ffi::OsString;
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use zapp::core::errors::exit_code_for;
use zapp::runtime::{bootstrap, EntryRegistry, InterpreterRunner, Runtime};
use zapp::util::GlobalContext;

/// Run a zapp archive
#[derive(Parser)]
#[command(name = "zapp-run")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// The archive, or the `__main__.py` of an extracted one
    #[arg(value_name = "ARCHIVE")]
    archive: PathBuf,

    /// Arguments for the program
    #[arg(
        value_name = "ARGS",
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    args: Vec<OsString>,
}

fn main() {
    if let Err(e) = run() {
        eprintln!("error: {:#}", e);
        std::process::exit(exit_code_for(&e));
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    // Stay quiet unless asked; the program owns the terminal
    let filter = EnvFilter::try_from_env("ZAPP_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    let ctx = GlobalContext::new()?;
    let mut rt = Runtime::new(&cli.archive, cli.args, ctx.config().runtime.clone())?;

    let entry = bootstrap(
        &mut rt,
        &EntryRegistry::with_loader_ops(),
        &mut InterpreterRunner,
    )?;
    match entry.exec_replace()? {}
}
