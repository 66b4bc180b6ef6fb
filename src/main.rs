//! phytoscan CLI — classify one plant photo and print the result as JSON.

use std::path::PathBuf;

use clap::Parser;
use phytoscan_lib::{config, init_tracing, ClassificationPipeline, InMemoryCatalog};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "phytoscan")]
#[command(about = "Classify a plant photo: plant / healthy / diseased, with a catalog match")]
#[command(version)]
struct Cli {
    /// Path to the input image.
    image: PathBuf,

    /// Restrict catalog matches to this disease category.
    #[arg(long)]
    category: Option<String>,

    /// Catalog file: JSON array of { "id": ..., "category": ... } entries.
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Threshold override file (JSON). Defaults to $PHYTOSCAN_CONFIG.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Pretty-print the JSON result.
    #[arg(long)]
    pretty: bool,
}

fn main() {
    init_tracing();

    if let Err(e) = run(Cli::parse()) {
        tracing::error!("{e}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> CliResult<()> {
    tracing::debug!("{} v{}", config::APP_NAME, config::APP_VERSION);

    let classifier_config = config::load_classifier_config(cli.config)?;
    let pipeline = ClassificationPipeline::from_config(&classifier_config);

    let catalog = match &cli.catalog {
        Some(path) => InMemoryCatalog::from_json(&std::fs::read_to_string(path)?)?,
        None => InMemoryCatalog::default(),
    };
    if catalog.is_empty() {
        tracing::warn!("No catalog entries loaded; diseased results will carry no match");
    } else {
        tracing::debug!(entries = catalog.len(), "Catalog loaded");
    }

    let result = pipeline.classify_path(&cli.image, cli.category.as_deref(), &catalog);

    let json = if cli.pretty {
        serde_json::to_string_pretty(&result)?
    } else {
        serde_json::to_string(&result)?
    };
    println!("{json}");
    Ok(())
}
