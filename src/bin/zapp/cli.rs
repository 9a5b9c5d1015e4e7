//! CLI definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;

/// zapp - Build executable Python zip-apps
#[derive(Parser)]
#[command(name = "zapp")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Compile a manifest into an executable zip-app
    Compile(CompileArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Args)]
pub struct CompileArgs {
    /// Path of the archive to write
    #[arg(short, long = "out", value_name = "OUTPUT")]
    pub output: PathBuf,

    /// Print the final manifest to stderr
    #[arg(short, long)]
    pub debug: bool,

    /// Repack unpacked wheel trees into cached wheels
    #[arg(long)]
    pub use_wheels: bool,

    /// Call the function of `module:function` references instead of
    /// running the module
    #[arg(long)]
    pub call_entry_functions: bool,

    /// Path to the input manifest
    #[arg(value_name = "MANIFEST")]
    pub manifest: PathBuf,
}

#[derive(Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}
