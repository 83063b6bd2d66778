use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use colored::*;
use sheetlink_core::{Config, Processor};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

mod formatter;

#[derive(Parser)]
#[command(name = "sheetlink")]
#[command(about = "Validate a form workbook and link its cells with cross-sheet formulas", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the .xlsx workbook
    #[arg(value_name = "FILE")]
    file: PathBuf,

    /// Output file (defaults to processed_<FILE> next to the input)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Show the cells that would be rewritten without writing anything
    #[arg(long)]
    dry_run: bool,

    /// Path to configuration file (TOML)
    #[arg(short, long, value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Output format for --dry-run
    #[arg(short, long, value_enum, default_value = "human")]
    format: OutputFormat,

    /// Log pipeline steps to stderr
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Human-readable colored output
    Human,
    /// JSON output
    Json,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "sheetlink_core=debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    // Load configuration
    let config = if let Some(config_path) = &cli.config {
        Config::from_file(config_path)
            .with_context(|| format!("Failed to load config from {}", config_path.display()))?
    } else {
        let default_config_path = PathBuf::from("sheetlink.toml");
        if default_config_path.exists() {
            Config::from_file(&default_config_path).with_context(|| {
                format!("Failed to load config from {}", default_config_path.display())
            })?
        } else {
            Config::default()
        }
    };

    let processor = Processor::with_config(config.processor);
    let filename = cli
        .file
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .with_context(|| format!("Not a file path: {}", cli.file.display()))?;
    let bytes = fs::read(&cli.file)
        .with_context(|| format!("Failed to read {}", cli.file.display()))?;

    if cli.dry_run {
        let changes = processor
            .preview(&filename, &bytes)
            .with_context(|| format!("Failed to process {}", cli.file.display()))?;
        match cli.format {
            OutputFormat::Human => formatter::print_human(&cli.file, &changes),
            OutputFormat::Json => formatter::print_json(&cli.file, &changes)?,
        }
        return Ok(());
    }

    println!("Processing '{}'...", cli.file.display());
    let processed = processor
        .process(&filename, bytes)
        .with_context(|| format!("Failed to process {}", cli.file.display()))?;

    let output_path = cli
        .output
        .unwrap_or_else(|| default_output_path(&cli.file, &processed.filename));
    fs::write(&output_path, &processed.bytes)
        .with_context(|| format!("Failed to write {}", output_path.display()))?;

    println!("{}", "✓ Successfully linked workbook".green().bold());
    println!("Output: {}", output_path.display());

    Ok(())
}

fn default_output_path(input: &Path, output_name: &str) -> PathBuf {
    match input.parent() {
        Some(dir) => dir.join(output_name),
        None => PathBuf::from(output_name),
    }
}
