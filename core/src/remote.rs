//! Remote gateway to the permit sheet.
//!
//! The remote authority is read-consistent but write-opaque:
//! - `GET <endpoint>?project=<key>` returns `{ "success": bool, "data": [row, ...] }`
//!   and is the only call whose answer is trusted.
//! - `POST <endpoint>` appends one record. The response is not read, so a
//!   successful publish proves the request was dispatched, nothing more.
//!
//! Every failure mode (transport, HTTP status, payload shape) collapses into
//! [`RemoteError`] so callers only ever branch on one error kind.

use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;

use crate::permit::Permit;

/// Errors from remote gateway operations.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    /// Request could not be sent or the response could not be received.
    #[error("network error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Remote answered with a non-success HTTP status.
    #[error("remote returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Remote answered but reported `success: false`.
    #[error("remote rejected the request: {message}")]
    Rejected { message: String },

    /// Response body was not the expected JSON envelope.
    #[error("unreadable remote response: {0}")]
    Parse(String),

    /// Record could not be encoded for publishing.
    #[error("failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),
}

/// What a successful publish actually proves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishReceipt {
    /// The request left the client; the remote may or may not have kept it.
    Dispatched,
    /// The remote answered `{ "success": true }` for this write.
    ConfirmedPersisted,
}

/// One sheet row: column heading → cell value, loosely typed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteRow(Map<String, Value>);

impl RemoteRow {
    /// Cell text for `column`. Absent and null cells read as empty; numbers
    /// and booleans are rendered as their JSON text.
    pub fn text(&self, column: &str) -> String {
        match self.0.get(column) {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        }
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0.get(column)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Canonical text of the whole row, keys sorted regardless of map order.
    pub(crate) fn fingerprint(&self) -> String {
        let sorted: BTreeMap<&String, &Value> = self.0.iter().collect();
        serde_json::to_string(&sorted).unwrap_or_default()
    }
}

impl From<Map<String, Value>> for RemoteRow {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Read/write access to the remote permit sheet.
#[async_trait]
pub trait RemoteGateway: Send + Sync {
    /// Read every row stored for `project`.
    async fn fetch_all(&self, project: &str) -> Result<Vec<RemoteRow>, RemoteError>;

    /// Append `permit` (which carries its own project key).
    async fn publish(&self, permit: &Permit) -> Result<PublishReceipt, RemoteError>;
}

/// Envelope returned by both the read and (when confirmed) the write call.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Option<Vec<RemoteRow>>,
    #[serde(default)]
    error: Option<Value>,
    #[serde(default)]
    message: Option<Value>,
}

impl Envelope {
    fn parse(body: &str) -> Result<Self, RemoteError> {
        serde_json::from_str(body).map_err(|e| RemoteError::Parse(e.to_string()))
    }

    fn rejection(&self) -> RemoteError {
        let message = self
            .error
            .as_ref()
            .or(self.message.as_ref())
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .unwrap_or_else(|| "success flag was false".to_string());
        RemoteError::Rejected { message }
    }
}

/// Parse a read response body into rows.
pub fn parse_fetch_body(body: &str) -> Result<Vec<RemoteRow>, RemoteError> {
    let envelope = Envelope::parse(body)?;
    if !envelope.success {
        return Err(envelope.rejection());
    }
    envelope
        .data
        .ok_or_else(|| RemoteError::Parse("response has no data array".to_string()))
}

/// Gateway backed by an HTTP endpoint (e.g. a spreadsheet web app).
#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: reqwest::Client,
    endpoint: Url,
    confirm_writes: bool,
}

impl HttpGateway {
    pub fn new(endpoint: Url) -> Self {
        Self::with_client(reqwest::Client::new(), endpoint)
    }

    /// Creates a gateway with a custom HTTP client (timeouts, proxies, tests).
    pub fn with_client(client: reqwest::Client, endpoint: Url) -> Self {
        Self {
            client,
            endpoint,
            confirm_writes: false,
        }
    }

    /// Read the publish response and report [`PublishReceipt::ConfirmedPersisted`]
    /// when the remote acknowledges the write.
    pub fn confirm_writes(mut self, confirm: bool) -> Self {
        self.confirm_writes = confirm;
        self
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn fetch_url(&self, project: &str) -> Url {
        let mut url = self.endpoint.clone();
        let pair = format!("project={}", urlencoding::encode(project));
        let query = match url.query() {
            Some(existing) if !existing.is_empty() => format!("{existing}&{pair}"),
            _ => pair,
        };
        url.set_query(Some(&query));
        url
    }
}

#[async_trait]
impl RemoteGateway for HttpGateway {
    async fn fetch_all(&self, project: &str) -> Result<Vec<RemoteRow>, RemoteError> {
        let url = self.fetch_url(project);
        tracing::debug!("Fetching permits for '{project}' from {}", self.endpoint);

        let response = self.client.get(url).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(RemoteError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let rows = parse_fetch_body(&body)?;
        tracing::debug!("Remote returned {} row(s) for '{project}'", rows.len());
        Ok(rows)
    }

    async fn publish(&self, permit: &Permit) -> Result<PublishReceipt, RemoteError> {
        let body = serde_json::to_string(permit)?;
        tracing::debug!("Publishing permit {} to {}", permit.id, self.endpoint);

        let response = self
            .client
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE, "text/plain")
            .body(body)
            .send()
            .await?;

        if !self.confirm_writes {
            return Ok(PublishReceipt::Dispatched);
        }

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(RemoteError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let envelope = Envelope::parse(&body)?;
        if envelope.success {
            Ok(PublishReceipt::ConfirmedPersisted)
        } else {
            Err(envelope.rejection())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn endpoint(raw: &str) -> Url {
        match Url::parse(raw) {
            Ok(url) => url,
            Err(err) => panic!("bad test url {raw}: {err}"),
        }
    }

    #[test]
    fn fetch_url_percent_encodes_project() {
        let gateway = HttpGateway::new(endpoint("https://example.com/macros/exec"));
        assert_eq!(
            gateway.fetch_url("TWS O-16123").as_str(),
            "https://example.com/macros/exec?project=TWS%20O-16123"
        );
    }

    #[test]
    fn fetch_url_keeps_existing_query() {
        let gateway = HttpGateway::new(endpoint("https://example.com/exec?key=abc"));
        assert_eq!(
            gateway.fetch_url("A&B").as_str(),
            "https://example.com/exec?key=abc&project=A%26B"
        );
    }

    #[test]
    fn fingerprint_ignores_key_order() {
        let row = |raw: &str| -> RemoteRow {
            serde_json::from_str(raw).unwrap_or_else(|err| panic!("bad row {raw}: {err}"))
        };
        let forward = row(r#"{"Date":"2024-03-01","Location":"Pit A"}"#);
        let backward = row(r#"{"Location":"Pit A","Date":"2024-03-01"}"#);
        assert_eq!(forward.fingerprint(), backward.fingerprint());
        assert_eq!(
            forward.fingerprint(),
            r#"{"Date":"2024-03-01","Location":"Pit A"}"#
        );
    }

    #[test]
    fn parses_successful_fetch_body() {
        let rows = match parse_fetch_body(
            r#"{"success":true,"data":[{"Date":"2024-03-01","Location":"Pit A"},{}]}"#,
        ) {
            Ok(rows) => rows,
            Err(err) => panic!("Expected rows: {err}"),
        };
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].text("Location"), "Pit A");
        assert!(rows[1].is_empty());
    }

    #[test]
    fn unsuccessful_envelope_is_rejected_with_message() {
        match parse_fetch_body(r#"{"success":false,"error":"Sheet not found"}"#) {
            Err(RemoteError::Rejected { message }) => assert_eq!(message, "Sheet not found"),
            other => panic!("Expected Rejected, got {other:?}"),
        }
    }

    #[test]
    fn missing_data_and_garbage_are_parse_errors() {
        assert!(matches!(
            parse_fetch_body(r#"{"success":true}"#),
            Err(RemoteError::Parse(_))
        ));
        assert!(matches!(
            parse_fetch_body("<html>login</html>"),
            Err(RemoteError::Parse(_))
        ));
        assert!(matches!(
            parse_fetch_body(r#"{"success":true,"data":[1,2]}"#),
            Err(RemoteError::Parse(_))
        ));
    }

    #[test]
    fn row_text_renders_scalars() {
        let row: RemoteRow = match serde_json::from_str(r#"{"a":"x","b":3,"c":true,"d":null}"#) {
            Ok(row) => row,
            Err(err) => panic!("row: {err}"),
        };
        assert_eq!(row.text("a"), "x");
        assert_eq!(row.text("b"), "3");
        assert_eq!(row.text("c"), "true");
        assert_eq!(row.text("d"), "");
        assert_eq!(row.text("missing"), "");
        assert_eq!(row.len(), 4);
    }
}
