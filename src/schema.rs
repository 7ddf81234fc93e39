// Record shapes shared by every sink, plus input validation

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// RECORD TYPES
// ============================================================================

/// Raw request payload: where the text came from and the text itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawInput {
    pub source: String,
    pub text: String,
}

impl RawInput {
    pub fn new(source: impl Into<String>, text: impl Into<String>) -> Self {
        RawInput {
            source: source.into(),
            text: text.into(),
        }
    }
}

/// Fixed-shape record produced by a transformer and consumed by exactly one sink.
///
/// Field order here is the order used by the sheet row and the PDF lines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub source: String,
    pub document_type: String,
    pub client: String,
    pub amount: f64,
    pub currency: String,
    pub document_date: NaiveDate,
}

impl NormalizedRecord {
    /// `(field_name, rendered_value)` pairs in declaration order.
    /// Dates render as ISO-8601 (`YYYY-MM-DD`).
    pub fn fields(&self) -> [(&'static str, String); 6] {
        [
            ("source", self.source.clone()),
            ("document_type", self.document_type.clone()),
            ("client", self.client.clone()),
            ("amount", self.amount.to_string()),
            ("currency", self.currency.clone()),
            ("document_date", self.document_date_iso()),
        ]
    }

    pub fn document_date_iso(&self) -> String {
        self.document_date.format("%Y-%m-%d").to_string()
    }
}

/// A record after the store sink committed it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: i64,
    #[serde(flatten)]
    pub record: NormalizedRecord,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// VALIDATION RESULT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
    #[serde(skip)]
    pub context: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>, context: &str) -> Self {
        ValidationError {
            field: field.to_string(),
            message: message.into(),
            context: context.to_string(),
        }
    }

    pub fn missing(field: &str) -> Self {
        ValidationError::new(field, "field required", "RawInput")
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.context, self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

pub type ValidationResult<T = ()> = Result<T, Vec<ValidationError>>;

// ============================================================================
// SCHEMA VALIDATOR
// ============================================================================

#[derive(Debug, Default, Clone, Copy)]
pub struct SchemaValidator;

impl SchemaValidator {
    pub fn new() -> Self {
        SchemaValidator
    }

    /// Parse a request body into a RawInput, collecting every field problem.
    pub fn parse_raw_input(&self, body: &[u8]) -> ValidationResult<RawInput> {
        let value: Value = serde_json::from_slice(body).map_err(|e| {
            vec![ValidationError::new(
                "body",
                format!("invalid JSON: {}", e),
                "RawInput",
            )]
        })?;

        self.validate_raw_input(&value)
    }

    /// Validate an already-decoded JSON value. Unknown keys are ignored.
    pub fn validate_raw_input(&self, value: &Value) -> ValidationResult<RawInput> {
        let obj = match value.as_object() {
            Some(obj) => obj,
            None => {
                return Err(vec![ValidationError::new(
                    "body",
                    "expected a JSON object",
                    "RawInput",
                )])
            }
        };

        let mut errors = Vec::new();
        let mut string_field = |name: &str| -> Option<String> {
            match obj.get(name) {
                None | Some(Value::Null) => {
                    errors.push(ValidationError::missing(name));
                    None
                }
                Some(Value::String(s)) => Some(s.clone()),
                Some(other) => {
                    errors.push(ValidationError::new(
                        name,
                        format!("expected a string, got {}", json_type_name(other)),
                        "RawInput",
                    ));
                    None
                }
            }
        };

        let source = string_field("source");
        let text = string_field("text");

        match (source, text) {
            (Some(source), Some(text)) if errors.is_empty() => Ok(RawInput { source, text }),
            _ => Err(errors),
        }
    }

    /// Check a transformer's output before it is handed to a sink.
    pub fn validate_record(&self, record: &NormalizedRecord) -> ValidationResult {
        let mut errors = Vec::new();

        if !record.amount.is_finite() {
            errors.push(ValidationError::new(
                "amount",
                format!("must be a finite number, got {}", record.amount),
                "NormalizedRecord",
            ));
        }

        let currency_ok = record.currency.len() == 3
            && record.currency.chars().all(|c| c.is_ascii_uppercase());
        if !currency_ok {
            errors.push(ValidationError::new(
                "currency",
                format!("expected a 3-letter code, got '{}'", record.currency),
                "NormalizedRecord",
            ));
        }

        if record.document_type.is_empty() {
            errors.push(ValidationError::new(
                "document_type",
                "Required field is empty",
                "NormalizedRecord",
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ============================================================================
// TESTS
// ============================================================================
