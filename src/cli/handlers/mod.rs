mod replay;
pub use replay::{ReplayError, run_replay};

use std::path::Path;

use crate::cli::commands::*;
use crate::cli::output::*;
use crate::io::config_io;
use crate::io::script_io;
use crate::model::config::EngineConfig;

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

pub fn dispatch(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let json = cli.json;
    let cwd = std::env::current_dir()?;
    let config = config_io::load_config(cli.config.as_deref(), &cwd)?;

    match cli.command {
        Commands::Replay(args) => cmd_replay(args, &config, json),
        Commands::Config => cmd_config(&config, json),
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn cmd_replay(
    args: ReplayArgs,
    config: &EngineConfig,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let script = script_io::read_script(&args.script)?;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()?;
    let mut report = runtime.block_on(run_replay(&script, config))?;
    report.script = display_path(&args.script);

    if args.outline_only {
        if json {
            println!("{}", serde_json::to_string_pretty(&report.outline)?);
        } else {
            for line in &report.outline {
                println!("{}", line);
            }
        }
        return Ok(());
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for line in format_replay(&report) {
            println!("{}", line);
        }
    }
    Ok(())
}

fn cmd_config(config: &EngineConfig, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    if json {
        println!("{}", serde_json::to_string_pretty(config)?);
    } else {
        print!("{}", config_io::render_config(config)?);
    }
    Ok(())
}

fn display_path(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
