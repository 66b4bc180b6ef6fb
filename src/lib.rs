pub mod config;
pub mod pipeline_config;
pub mod pipeline;

pub use pipeline::{
    CatalogEntry, CatalogError, CatalogId, CatalogStore, ClassificationPipeline,
    ClassificationResult, InMemoryCatalog, Label, Severity,
};
pub use pipeline_config::{ClassifierConfig, ConfigError};

use tracing_subscriber::EnvFilter;

/// Install the global `tracing` subscriber. `RUST_LOG` wins over the default filter.
///
/// Call once, from the binary. Libraries embedding the pipeline bring their own subscriber.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .with_writer(std::io::stderr)
        .init();
}
