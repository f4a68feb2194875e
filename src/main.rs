use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};

mod config;
mod dates;
mod encoding;
mod error;
mod logging;
mod merge;
mod output;
mod records;

use config::Config;
use error::MergeError;
use merge::{merge_directory, MergeSummary};

#[derive(Parser)]
#[command(name = "call-merge")]
#[command(about = "Merge call-record CSV files into one JSON document")]
#[command(version)]
struct Cli {
    /// Settings file (defaults to call-merge.toml when present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory holding the CSV exports
    #[arg(long)]
    input_dir: Option<PathBuf>,

    /// Destination JSON file
    #[arg(long)]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    logging::init_logging();
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref()).context("loading configuration")?;
    if let Some(input_dir) = cli.input_dir {
        config.input_dir = input_dir;
    }
    if let Some(output) = cli.output {
        config.output_file = output;
    }

    run(&config)?;

    Ok(())
}

/// Merges the configured input directory and writes the document. Nothing
/// touches the output path unless the merge itself succeeded.
fn run(config: &Config) -> Result<MergeSummary> {
    info!("Starting CSV → JSON merge");

    let merged = match merge_directory(config) {
        Ok(merged) => merged,
        Err(e @ MergeError::SourceDirMissing(_)) => {
            error!("{}", e);
            return Err(e).context("nothing was written");
        }
        Err(e) => return Err(e).context("merging call records"),
    };

    output::write_document(&merged.document, &config.output_file)
        .with_context(|| format!("writing {}", config.output_file.display()))?;

    let summary = merged.summary;
    if summary.files_skipped > 0 {
        info!("Skipped {} unreadable files", summary.files_skipped);
    }
    info!(
        "DONE! {} calls merged from {} of {} files → {}",
        summary.records_merged,
        summary.files_merged,
        summary.files_found,
        config.output_file.display()
    );

    Ok(summary)
}
