//! Declarative schema gate for externally-sourced events.
//!
//! The relay publishes JSON Schema-like documents over HTTP; every inbound
//! event is checked against its document before any component trusts its
//! shape. Validation is deliberately shallow: required-field presence plus
//! primitive-type checks for declared `string` and `object` properties.
//! All other declared types pass unchecked — this is a boundary gate, not
//! a full JSON-Schema implementation.

use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::protocol::{RelayError, SchemaViolation};

/// Well-known schema paths on the relay's HTTP surface.
pub const METRICS_SCHEMA_PATH: &str = "/api/1.0.0/data-schema";
pub const PING_SCHEMA_PATH: &str = "/ping-schema";
pub const PING_RESPONSE_SCHEMA_PATH: &str = "/ping-response-schema";

/// One property declaration. Only `type` is interpreted.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PropertySchema {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
}

/// A schema document: required field names plus per-field declarations.
///
/// Immutable once fetched; one instance per event kind.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SchemaDocument {
    #[serde(default)]
    pub required: Vec<String>,
    #[serde(default)]
    pub properties: HashMap<String, PropertySchema>,
}

impl SchemaDocument {
    /// Decode a fetched document, tolerating the `data_schema` wrapper the
    /// metrics endpoint nests its schema under.
    pub fn from_value(value: &Value) -> Result<Self, RelayError> {
        let body = value.get("data_schema").unwrap_or(value);
        serde_json::from_value(body.clone()).map_err(|e| RelayError::MalformedFrame(e.to_string()))
    }
}

/// JSON runtime type name, as reported in [`SchemaViolation::TypeMismatch`].
fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Validate an event mapping against a schema document.
///
/// Pure; fails on the first violation encountered. The presence pass runs
/// in the schema's `required` order, the type pass in the event's own key
/// order.
pub fn validate(event: &Map<String, Value>, schema: &SchemaDocument) -> Result<(), SchemaViolation> {
    for field in &schema.required {
        if !event.contains_key(field) {
            return Err(SchemaViolation::MissingField(field.clone()));
        }
    }

    for (key, value) in event {
        let Some(declared) = schema.properties.get(key).and_then(|p| p.kind.as_deref()) else {
            continue;
        };
        let matches = match declared {
            "string" => value.is_string(),
            "object" => value.is_object(),
            // Shallow by design: other declared types pass unchecked.
            _ => true,
        };
        if !matches {
            return Err(SchemaViolation::TypeMismatch {
                field: key.clone(),
                expected: declared.to_owned(),
                actual: type_name(value).to_owned(),
            });
        }
    }

    Ok(())
}

/// The three schema documents the client needs before it may connect.
#[derive(Debug, Clone)]
pub struct SchemaSet {
    pub metrics: SchemaDocument,
    pub ping: SchemaDocument,
    pub ping_response: SchemaDocument,
}

impl SchemaSet {
    /// Fetch all schema documents from the relay's HTTP surface.
    ///
    /// Must resolve before the live connection opens — no event can be
    /// validated without its schema. Fetches run concurrently.
    pub async fn fetch(base_url: &str) -> Result<Self, RelayError> {
        let http = reqwest::Client::new();
        let (metrics, ping, ping_response) = tokio::try_join!(
            fetch_document(&http, base_url, METRICS_SCHEMA_PATH),
            fetch_document(&http, base_url, PING_SCHEMA_PATH),
            fetch_document(&http, base_url, PING_RESPONSE_SCHEMA_PATH),
        )?;
        Ok(Self {
            metrics,
            ping,
            ping_response,
        })
    }
}

async fn fetch_document(
    http: &reqwest::Client,
    base_url: &str,
    path: &str,
) -> Result<SchemaDocument, RelayError> {
    let url = format!("{}{}", base_url.trim_end_matches('/'), path);
    let value: Value = http
        .get(&url)
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .map_err(|e| RelayError::Transport(e.to_string()))?
        .json()
        .await
        .map_err(|e| RelayError::Transport(e.to_string()))?;
    log::debug!("fetched schema from {url}");
    SchemaDocument::from_value(&value)
}
