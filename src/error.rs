// Pipeline error kinds
// One variant per failure class a request can end in; none are retried.

use crate::schema::ValidationError;

/// Failure of a single pipeline invocation.
///
/// Every variant surfaces to the caller unchanged. The HTTP layer maps them to
/// 400 (validation) or 5xx (sink failures).
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// RawInput was missing a field, had a mistyped field, or was not JSON at all.
    #[error("invalid input: {}", join_fields(.0))]
    Validation(Vec<ValidationError>),

    /// The store transaction did not commit. No row was left behind.
    #[error("persistence failed: {0}")]
    Persistence(String),

    /// Authentication, spreadsheet lookup or append against the sheet service failed.
    #[error("export to sheet failed ({step}): {message}")]
    Export { step: &'static str, message: String },

    /// The PDF could not be written to its destination.
    #[error("render failed: {0}")]
    Render(String),
}

impl PipelineError {
    /// Stable snake_case name of the error kind, used in API error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Validation(_) => "validation_error",
            PipelineError::Persistence(_) => "persistence_error",
            PipelineError::Export { .. } => "export_error",
            PipelineError::Render(_) => "render_error",
        }
    }

    pub(crate) fn export(step: &'static str, message: impl std::fmt::Display) -> Self {
        PipelineError::Export {
            step,
            message: message.to_string(),
        }
    }
}

impl From<rusqlite::Error> for PipelineError {
    fn from(e: rusqlite::Error) -> Self {
        PipelineError::Persistence(e.to_string())
    }
}

fn join_fields(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Start-up configuration failure.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: &'static str, message: String },

    #[error("unsupported database url '{0}' (expected sqlite:// or a file path)")]
    UnsupportedDatabaseUrl(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names() {
        assert_eq!(PipelineError::Validation(vec![]).kind(), "validation_error");
        assert_eq!(PipelineError::Persistence("x".into()).kind(), "persistence_error");
        assert_eq!(PipelineError::export("auth", "denied").kind(), "export_error");
        assert_eq!(PipelineError::Render("x".into()).kind(), "render_error");
    }

    #[test]
    fn test_validation_message_lists_fields() {
        let err = PipelineError::Validation(vec![
            ValidationError::missing("source"),
            ValidationError::missing("text"),
        ]);
        let msg = err.to_string();
        assert!(msg.contains("source"));
        assert!(msg.contains("text"));
    }

    #[test]
    fn test_export_message_names_step() {
        let err = PipelineError::export("append", "HTTP 403");
        assert_eq!(err.to_string(), "export to sheet failed (append): HTTP 403");
    }
}
