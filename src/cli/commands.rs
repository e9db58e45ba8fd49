use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "ob", about = concat!("outline-bridge v", env!("CARGO_PKG_VERSION"), " - command queue and refresh coordination for outline clients"), version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Read engine settings from this file instead of ./outline-bridge.toml
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a script against an in-memory outline and report what the UI saw
    Replay(ReplayArgs),
    /// Print the effective configuration
    Config,
}

#[derive(Args)]
pub struct ReplayArgs {
    /// Script file (.toml or .json)
    pub script: PathBuf,

    /// Only print the final outline
    #[arg(long)]
    pub outline_only: bool,
}
