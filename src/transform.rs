// Transformer - raw text -> NormalizedRecord
//
// The dispatcher only sees the trait, so a real extraction engine can replace
// the stub without touching any sink or endpoint.

use chrono::{Local, NaiveDate};

use crate::schema::NormalizedRecord;

/// Turns free text from a named source into a normalized record.
///
/// Implementations must accept any string, including empty ones, and may not fail.
pub trait Transformer: Send + Sync {
    /// Transform using today's local date as the document date fallback.
    fn transform(&self, source: &str, text: &str) -> NormalizedRecord {
        self.transform_on(source, text, Local::now().date_naive())
    }

    /// Transform with an explicit "today". Pure with respect to `today`.
    fn transform_on(&self, source: &str, text: &str, today: NaiveDate) -> NormalizedRecord;

    /// Version string, logged with every transformed record.
    fn version(&self) -> &str {
        "1.0"
    }
}

/// Placeholder transformer: ignores the text and returns a fixed invoice.
///
/// Only `source` (echoed) and `document_date` (the call date) vary.
#[derive(Debug, Default, Clone, Copy)]
pub struct StubTransformer;

impl StubTransformer {
    pub const DOCUMENT_TYPE: &'static str = "invoice";
    pub const CLIENT: &'static str = "ACME GmbH";
    pub const AMOUNT: f64 = 1999.99;
    pub const CURRENCY: &'static str = "EUR";

    pub fn new() -> Self {
        StubTransformer
    }
}

impl Transformer for StubTransformer {
    fn transform_on(&self, source: &str, _text: &str, today: NaiveDate) -> NormalizedRecord {
        NormalizedRecord {
            source: source.to_string(),
            document_type: Self::DOCUMENT_TYPE.to_string(),
            client: Self::CLIENT.to_string(),
            amount: Self::AMOUNT,
            currency: Self::CURRENCY.to_string(),
            document_date: today,
        }
    }

    fn version(&self) -> &str {
        "stub-0.1"
    }
}
