// Sheet sink - append one NormalizedRecord as a row of a shared spreadsheet
//
// Flow per call: read service-account key -> signed JWT -> bearer token ->
// look up the first worksheet -> append. Nothing is cached between calls and
// nothing is retried.

use std::path::{Path, PathBuf};

use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::config::Config;
use crate::error::PipelineError;
use crate::schema::NormalizedRecord;

pub const SHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;

// ============================================================================
// SERVICE ACCOUNT AUTH
// ============================================================================

/// The fields of a service-account JSON key file this sink needs.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

/// JWT claims for the OAuth2 JWT-bearer grant.
#[derive(Debug, Serialize, Deserialize)]
pub struct AssertionClaims {
    pub iss: String,
    pub scope: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

impl ServiceAccountKey {
    pub async fn from_file(path: &Path) -> Result<Self, PipelineError> {
        let raw = tokio::fs::read(path).await.map_err(|e| {
            PipelineError::export("credentials", format!("cannot read {}: {}", path.display(), e))
        })?;

        serde_json::from_slice(&raw).map_err(|e| {
            PipelineError::export("credentials", format!("invalid key file {}: {}", path.display(), e))
        })
    }

    /// Signed RS256 assertion valid for one hour from `now` (unix seconds).
    pub fn assertion(&self, now: i64) -> Result<String, PipelineError> {
        let claims = AssertionClaims {
            iss: self.client_email.clone(),
            scope: SHEETS_SCOPE.to_string(),
            aud: self.token_uri.clone(),
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECS,
        };

        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.private_key_id.clone();

        let key = EncodingKey::from_rsa_pem(self.private_key.as_bytes())
            .map_err(|e| PipelineError::export("auth", format!("invalid private key: {}", e)))?;

        jsonwebtoken::encode(&header, &claims, &key)
            .map_err(|e| PipelineError::export("auth", format!("cannot sign assertion: {}", e)))
    }
}

// ============================================================================
// SHEETS SINK
// ============================================================================

/// Appends records to the first worksheet of the configured spreadsheet.
#[derive(Debug, Clone)]
pub struct SheetsSink {
    client: Client,
    api_base: String,
    spreadsheet_id: Option<String>,
    credentials_file: Option<PathBuf>,
}

impl SheetsSink {
    /// Build from config. Missing sheet settings are only reported when exporting.
    pub fn new(config: &Config) -> Result<Self, PipelineError> {
        let client = Client::builder()
            .timeout(config.http_timeout)
            .build()
            .map_err(|e| PipelineError::export("client", e))?;

        Ok(SheetsSink {
            client,
            api_base: config.sheets_api_base.trim_end_matches('/').to_string(),
            spreadsheet_id: config.google_sheets_id.clone(),
            credentials_file: config.google_service_account_file.clone(),
        })
    }

    pub async fn export(&self, record: &NormalizedRecord) -> Result<(), PipelineError> {
        let spreadsheet_id = self
            .spreadsheet_id
            .as_deref()
            .ok_or_else(|| PipelineError::export("config", "spreadsheet id is not configured"))?;
        let credentials_file = self
            .credentials_file
            .as_deref()
            .ok_or_else(|| PipelineError::export("config", "service account file is not configured"))?;

        let key = ServiceAccountKey::from_file(credentials_file).await?;
        let token = self.fetch_token(&key).await?;
        let worksheet = self.first_worksheet_title(&token, spreadsheet_id).await?;
        self.append_row(&token, spreadsheet_id, &worksheet, row_values(record))
            .await
    }

    async fn fetch_token(&self, key: &ServiceAccountKey) -> Result<String, PipelineError> {
        let assertion = key.assertion(Utc::now().timestamp())?;
        debug!(client_email = %key.client_email, token_uri = %key.token_uri, "requesting sheets access token");

        let response = self
            .client
            .post(&key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(|e| PipelineError::export("auth", e))?;
        let response = ensure_success("auth", response).await?;

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::export("auth", format!("bad token response: {}", e)))?;

        Ok(token.access_token)
    }

    /// "Open by key": resolve the spreadsheet and return its first worksheet title.
    async fn first_worksheet_title(&self, token: &str, spreadsheet_id: &str) -> Result<String, PipelineError> {
        let url = format!(
            "{}/spreadsheets/{}",
            self.api_base,
            urlencoding::encode(spreadsheet_id)
        );

        let response = self
            .client
            .get(&url)
            .query(&[("fields", "sheets.properties.title")])
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| PipelineError::export("open", e))?;
        let response = ensure_success("open", response).await?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| PipelineError::export("open", format!("bad spreadsheet metadata: {}", e)))?;

        body.pointer("/sheets/0/properties/title")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| PipelineError::export("open", "spreadsheet has no worksheets"))
    }

    async fn append_row(
        &self,
        token: &str,
        spreadsheet_id: &str,
        worksheet: &str,
        row: Vec<Value>,
    ) -> Result<(), PipelineError> {
        let range = worksheet_range(worksheet);
        let url = format!(
            "{}/spreadsheets/{}/values/{}:append",
            self.api_base,
            urlencoding::encode(spreadsheet_id),
            urlencoding::encode(&range)
        );

        let response = self
            .client
            .post(&url)
            .query(&[("valueInputOption", "RAW")])
            .bearer_auth(token)
            .json(&json!({ "values": [row] }))
            .send()
            .await
            .map_err(|e| PipelineError::export("append", e))?;
        ensure_success("append", response).await?;

        debug!(spreadsheet_id, worksheet, "row appended");
        Ok(())
    }
}

/// Column order: source, document_type, client, amount, currency, document_date.
/// Amount stays numeric; the date is an ISO-8601 string.
pub fn row_values(record: &NormalizedRecord) -> Vec<Value> {
    vec![
        json!(record.source),
        json!(record.document_type),
        json!(record.client),
        json!(record.amount),
        json!(record.currency),
        json!(record.document_date_iso()),
    ]
}

/// A1 range anchored at the top-left of `worksheet`; quotes in the title are doubled.
fn worksheet_range(worksheet: &str) -> String {
    format!("'{}'!A1", worksheet.replace('\'', "''"))
}

async fn ensure_success(step: &'static str, response: Response) -> Result<Response, PipelineError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(PipelineError::export(
        step,
        format!("HTTP {}: {}", status.as_u16(), body.trim()),
    ))
}
