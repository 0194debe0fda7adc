//! # shelf CLI
//!
//! Command-line interface for the shelf named value store.

use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use shelf_config::logging::init_logging;
use shelf_config::{log_cli_debug, Config, SwapStrategy};
use shelf_store::{Shelf, StoreOptions, SwapMode};

mod commands;
mod kind;

use kind::{parse_value, ValueKind};

/// shelf - crash-consistent named values on disk
#[derive(Parser, Debug)]
#[command(name = "shelf")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Store root directory
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Store capacity in MiB
    #[arg(long, global = true)]
    size_mb: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a default config file
    Init {
        /// Write ~/.shelf/config.toml instead of .shelf/config.toml
        #[arg(long)]
        global: bool,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Store a value, replacing the current one atomically
    Put {
        name: String,
        value: String,

        #[arg(long, value_enum, default_value_t = ValueKind::Int)]
        kind: ValueKind,
    },

    /// Print a value
    Get { name: String },

    /// List all values
    List,

    /// Remove a value
    Erase { name: String },

    /// Add to an integer and commit the result
    Add {
        name: String,
        #[arg(allow_hyphen_values = true)]
        delta: i64,
    },

    /// Show capacity and usage
    Stats,

    /// Reclaim leftovers from interrupted updates
    Sweep,
}

/// Merge command-line overrides into the loaded config
fn store_options(cli: &Cli, config: &Config) -> StoreOptions {
    let root = cli
        .root
        .clone()
        .unwrap_or_else(|| config.store.resolved_root());
    let swap_mode = match config.recovery.swap_strategy {
        SwapStrategy::Auto => SwapMode::Auto,
        SwapStrategy::Journaled => SwapMode::Journaled,
    };

    StoreOptions::new(root)
        .size_mb(cli.size_mb.unwrap_or(config.store.size_mb))
        .force_new(config.store.force_new)
        .sweep_on_open(config.recovery.sweep_on_open)
        .swap_mode(swap_mode)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load().context("Failed to load config")?;
    init_logging(config.log.level);
    log_cli_debug!("Parsed command line", command = format!("{:?}", cli.command).as_str());

    let mut out = io::stdout().lock();

    if let Commands::Init { global, force } = &cli.command {
        let path = if *global {
            Config::global_config_path().context("No home directory for the global config")?
        } else {
            Config::project_config_path()
        };
        return commands::init(&path, *force, &mut out);
    }

    let options = store_options(&cli, &config);
    let shelf = Shelf::open(&options)
        .with_context(|| format!("Failed to open store at {}", options.root.display()))?;

    match cli.command {
        Commands::Init { .. } => Ok(()),
        Commands::Put { name, value, kind } => {
            let value = parse_value(kind, &value)?;
            commands::put(&shelf, &name, value, &mut out)
        }
        Commands::Get { name } => commands::get(&shelf, &name, &mut out),
        Commands::List => commands::list(&shelf, &mut out),
        Commands::Erase { name } => commands::erase(&shelf, &name, &mut out),
        Commands::Add { name, delta } => commands::add(&shelf, &name, delta, &mut out),
        Commands::Stats => commands::stats(&shelf, &mut out),
        Commands::Sweep => commands::sweep(&shelf, &mut out),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_put_with_kind() {
        let cli = Cli::try_parse_from(["shelf", "--root", "/tmp/s", "put", "pi", "3.14", "--kind", "float"]).unwrap();
        assert_eq!(cli.root, Some(PathBuf::from("/tmp/s")));
        match cli.command {
            Commands::Put { name, value, kind } => {
                assert_eq!(name, "pi");
                assert_eq!(value, "3.14");
                assert_eq!(kind, ValueKind::Float);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_negative_delta() {
        let cli = Cli::try_parse_from(["shelf", "add", "counter", "-5"]).unwrap();
        assert!(matches!(cli.command, Commands::Add { delta: -5, .. }));
    }

    #[test]
    fn test_store_options_prefer_cli() {
        let cli = Cli::try_parse_from(["shelf", "--size-mb", "4", "stats"]).unwrap();
        let mut config = Config::default();
        config.store.root = PathBuf::from("/from/config");
        config.recovery.swap_strategy = SwapStrategy::Journaled;

        let options = store_options(&cli, &config);
        assert_eq!(options.root, PathBuf::from("/from/config"));
        assert_eq!(options.size_mb, 4);
        assert_eq!(options.swap_mode, SwapMode::Journaled);
        assert!(options.sweep_on_open);
    }
}
