// Data Pipeline - Core Library
// Raw text -> normalized record -> one of {SQLite store, spreadsheet, PDF}.
// Shared by the CLI runner, the API server and the tests.

pub mod config;
pub mod db;
pub mod error;
pub mod pdf;
pub mod pipeline;
pub mod schema;
pub mod sheets;
pub mod transform;

#[cfg(feature = "server")]
pub mod api;

// Re-export commonly used types
pub use config::{Config, SqlitePath};
pub use db::{count_records, get_record, setup_database, store_record, StoreSink};
pub use error::{ConfigError, PipelineError};
pub use pdf::{render_to_file, PdfSink};
pub use pipeline::{ExportedToSheets, PdfGenerated, Pipeline, Stored};
pub use schema::{NormalizedRecord, RawInput, SchemaValidator, StoredRecord, ValidationError};
pub use sheets::{ServiceAccountKey, SheetsSink};
pub use transform::{StubTransformer, Transformer};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Install the tracing subscriber used by both binaries. Logs go to stderr so
/// CLI output on stdout stays machine-readable. `RUST_LOG` overrides the filter.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,data_pipeline=debug".into()),
        )
        .with_writer(std::io::stderr)
        .try_init();
}
