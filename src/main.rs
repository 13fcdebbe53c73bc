//! diffarea - Line diffing and diff-area review from the command line
//!
//! Diffs two files, or replays a scripted review session against in-memory
//! documents and prints the resulting documents, areas and diffs.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use diffarea::config::Config;
use diffarea::diff::DiffAlgorithm;
use diffarea::export::{export_blocks, export_session, ExportFormat};
use diffarea::replay::{load_script, Session};

#[derive(Parser)]
#[command(name = "diffarea")]
#[command(about = "Line diffing and diff-area review for suggested edits")]
#[command(version)]
struct Cli {
    /// Log engine bookkeeping to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (default: ~/.diffarea/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Diff two files line by line
    Diff {
        /// Original file
        old: PathBuf,

        /// Current file
        new: PathBuf,

        /// Output format: markdown (md) or json
        #[arg(short, long)]
        format: Option<String>,

        /// Diff algorithm (overrides config)
        #[arg(short, long, value_enum)]
        algorithm: Option<DiffAlgorithm>,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Replay a JSON review script and print the final session
    Replay {
        /// Script file: a JSON array of steps
        script: PathBuf,

        /// Output format: markdown (md) or json
        #[arg(short, long)]
        format: Option<String>,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Write a default config file
    InitConfig {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config_path = cli.config.unwrap_or_else(Config::default_path);

    match cli.command {
        Commands::Diff {
            old,
            new,
            format,
            algorithm,
            output,
        } => {
            let config = load_config(&config_path, format.as_deref(), algorithm)?;
            cmd_diff(&config, &old, &new, output)?;
        }
        Commands::Replay {
            script,
            format,
            output,
        } => {
            let config = load_config(&config_path, format.as_deref(), None)?;
            cmd_replay(&config, &script, output)?;
        }
        Commands::InitConfig { force } => {
            cmd_init_config(&config_path, force)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    if verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.init();
}

fn load_config(path: &Path, format: Option<&str>, algorithm: Option<DiffAlgorithm>) -> Result<Config> {
    let format = format
        .map(|f| ExportFormat::from_str(f).context("Invalid format. Use: markdown (md) or json"))
        .transpose()?;
    Ok(Config::load_from(path)?.with_overrides(algorithm, format))
}

fn cmd_diff(config: &Config, old: &Path, new: &Path, output: Option<PathBuf>) -> Result<()> {
    let original = std::fs::read_to_string(old)
        .with_context(|| format!("Failed to read {}", old.display()))?;
    let current = std::fs::read_to_string(new)
        .with_context(|| format!("Failed to read {}", new.display()))?;

    let blocks = config.differ().diff(&original, &current);
    log::debug!(
        "{} blocks between {} and {} ({})",
        blocks.len(),
        old.display(),
        new.display(),
        config.algorithm.as_str()
    );

    let content = export_blocks(&blocks, config.output_format)?;
    write_output(&content, output)
}

fn cmd_replay(config: &Config, script: &Path, output: Option<PathBuf>) -> Result<()> {
    let steps = load_script(script)?;
    let mut session = Session::new(config);
    let summary = session.run(&steps)?;

    if summary.stale > 0 {
        eprintln!("{} steps referred to diffs or areas that no longer exist", summary.stale);
    }

    let content = export_session(&session.report(), config.output_format)?;
    write_output(&content, output)
}

fn cmd_init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        println!("Config already exists at {} (use --force to overwrite)", path.display());
        return Ok(());
    }
    Config::create_default(path)?;
    println!("Wrote default config to {}", path.display());
    Ok(())
}

fn write_output(content: &str, output: Option<PathBuf>) -> Result<()> {
    if let Some(path) = output {
        std::fs::write(&path, content)
            .with_context(|| format!("Failed to write to {}", path.display()))?;
        println!("Exported to {}", path.display());
    } else {
        print!("{}", content);
    }
    Ok(())
}
