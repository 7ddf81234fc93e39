// Request dispatcher - RawInput -> Transformer -> exactly one sink
//
// Each operation is stateless: validate, transform, hand the record to one
// sink, return a status descriptor. Sink errors propagate unchanged.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::config::Config;
use crate::db::StoreSink;
use crate::error::PipelineError;
use crate::pdf::PdfSink;
use crate::schema::{NormalizedRecord, RawInput, SchemaValidator};
use crate::sheets::SheetsSink;
use crate::transform::{StubTransformer, Transformer};

// ============================================================================
// STATUS DESCRIPTORS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename = "stored")]
pub struct Stored {
    pub id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename = "exported_to_sheets")]
pub struct ExportedToSheets {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename = "pdf_generated")]
pub struct PdfGenerated {
    pub path: PathBuf,
}

// ============================================================================
// PIPELINE
// ============================================================================

/// Shared by all requests; every field is cheap to clone.
#[derive(Clone)]
pub struct Pipeline {
    transformer: Arc<dyn Transformer>,
    validator: SchemaValidator,
    store: StoreSink,
    sheets: SheetsSink,
    pdf: PdfSink,
}

impl Pipeline {
    /// Wire the stub transformer and all three sinks from `config`.
    pub fn from_config(config: &Config) -> Result<Self, PipelineError> {
        let location = config
            .database_path()
            .map_err(|e| PipelineError::Persistence(e.to_string()))?;

        Ok(Pipeline::new(
            Arc::new(StubTransformer::new()),
            StoreSink::open(&location)?,
            SheetsSink::new(config)?,
            PdfSink::new(config.pdf_output_dir.clone()),
        ))
    }

    pub fn new(
        transformer: Arc<dyn Transformer>,
        store: StoreSink,
        sheets: SheetsSink,
        pdf: PdfSink,
    ) -> Self {
        Pipeline {
            transformer,
            validator: SchemaValidator::new(),
            store,
            sheets,
            pdf,
        }
    }

    pub fn store_sink(&self) -> &StoreSink {
        &self.store
    }

    pub fn validator(&self) -> &SchemaValidator {
        &self.validator
    }

    fn clean(&self, input: &RawInput) -> Result<NormalizedRecord, PipelineError> {
        let record = self.transformer.transform(&input.source, &input.text);
        self.validator
            .validate_record(&record)
            .map_err(PipelineError::Validation)?;
        Ok(record)
    }

    pub async fn clean_and_store(&self, input: &RawInput) -> Result<Stored, PipelineError> {
        let record = self.clean(input)?;

        match self.store.store(record).await {
            Ok(stored) => {
                info!(source = %input.source, id = stored.id, transformer = self.transformer.version(), "record stored");
                Ok(Stored { id: stored.id })
            }
            Err(e) => {
                warn!(source = %input.source, error = %e, "store failed");
                Err(e)
            }
        }
    }

    pub async fn clean_and_export_to_sheet(&self, input: &RawInput) -> Result<ExportedToSheets, PipelineError> {
        let record = self.clean(input)?;

        match self.sheets.export(&record).await {
            Ok(()) => {
                info!(source = %input.source, transformer = self.transformer.version(), "record exported to sheet");
                Ok(ExportedToSheets {})
            }
            Err(e) => {
                warn!(source = %input.source, error = %e, "sheet export failed");
                Err(e)
            }
        }
    }

    pub async fn clean_and_render_to_pdf(&self, input: &RawInput) -> Result<PdfGenerated, PipelineError> {
        let record = self.clean(input)?;

        match self.pdf.render(record).await {
            Ok(path) => {
                info!(source = %input.source, path = %path.display(), transformer = self.transformer.version(), "pdf generated");
                Ok(PdfGenerated { path })
            }
            Err(e) => {
                warn!(source = %input.source, error = %e, "pdf render failed");
                Err(e)
            }
        }
    }
}
