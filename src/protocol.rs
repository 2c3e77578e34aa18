//! JSON wire protocol for the telemetry relay.
//!
//! Every frame on the wire is a JSON object:
//!
//! ```text
//! { "event": <kind>, "client_id": <peer id>, "data": { "data": { ... } } }
//! ```
//!
//! Inbound frames are handled as untyped `serde_json` values so that a
//! single malformed field never poisons the whole session; outbound frames
//! are built through the typed constructors below.

use serde::{Deserialize, Serialize, Serializer};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

/// Role string sent in the announce frame.
pub const ANNOUNCE_ROLE: &str = "SERVER-STATS";

/// Event kinds recognized on the relay connection.
///
/// Unrecognized kinds map to [`EventKind::Unknown`] and are ignored by the
/// dispatcher, so new server-side events never break an old client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Outbound announce identifying this endpoint's role.
    Announce,
    /// Inbound identity ack carrying our assigned `client_id`.
    ConnectAck,
    /// Inbound telemetry sample.
    Metrics,
    /// Inbound peer roster replacement.
    PeersUpdated,
    /// Outbound round-trip probe.
    Ping,
    /// Inbound probe answer from the target peer.
    PingResponse,
    /// Anything else — forward-compatible no-op.
    Unknown,
}

impl EventKind {
    pub fn parse(s: &str) -> Self {
        match s {
            "CONNECT" => Self::Announce,
            "connect" => Self::ConnectAck,
            "data-request" => Self::Metrics,
            "py_clients_update" => Self::PeersUpdated,
            "ping" => Self::Ping,
            "ping_response" => Self::PingResponse,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Announce => "CONNECT",
            Self::ConnectAck => "connect",
            Self::Metrics => "data-request",
            Self::PeersUpdated => "py_clients_update",
            Self::Ping => "ping",
            Self::PingResponse => "ping_response",
            Self::Unknown => "unknown",
        }
    }
}

impl Serialize for EventKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An outbound frame.
#[derive(Debug, Clone, Serialize)]
pub struct RelayFrame {
    pub event: EventKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RelayFrame {
    /// Build a ping request from us (`self_id`) to `target`.
    pub fn ping(self_id: &str, target: &str) -> Self {
        Self {
            event: EventKind::Ping,
            client_id: Some(self_id.to_owned()),
            data: Some(json!({ "data": { "target_client_id": target } })),
        }
    }

    /// Serialize to wire text.
    pub fn encode(&self) -> Result<String, RelayError> {
        serde_json::to_string(self).map_err(|e| RelayError::MalformedFrame(e.to_string()))
    }
}

/// The announce frame sent right after the connection opens.
///
/// Carries a `client` role field instead of a `client_id` (none is
/// assigned yet at that point).
#[derive(Debug, Clone)]
pub struct AnnounceFrame;

impl AnnounceFrame {
    pub fn encode() -> Result<String, RelayError> {
        let frame = json!({ "event": EventKind::Announce, "client": ANNOUNCE_ROLE });
        serde_json::to_string(&frame).map_err(|e| RelayError::MalformedFrame(e.to_string()))
    }
}

/// Extract the inner payload mapping (`frame.data.data`) from a decoded frame.
pub fn payload_map(frame: &Map<String, Value>) -> Option<&Map<String, Value>> {
    frame.get("data")?.get("data")?.as_object()
}

fn nan() -> f64 {
    f64::NAN
}

/// One decoded telemetry sample.
///
/// Only the fields the fetched schema marks as required are guaranteed
/// present on the wire; everything else defaults. The four gauge fields
/// default to NaN so an absent value is visibly "no data" downstream
/// rather than a plausible zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    #[serde(default)]
    pub cpu_count: u32,
    #[serde(default = "nan")]
    pub cpu_usage: f64,
    #[serde(default)]
    pub cpu_frequency: CpuFrequency,
    #[serde(default)]
    pub ram_total: f64,
    #[serde(default)]
    pub ram_available: f64,
    #[serde(default = "nan")]
    pub ram_percentage: f64,
    #[serde(default)]
    pub disk_total: f64,
    #[serde(default = "nan")]
    pub disk_free: f64,
    #[serde(default = "nan")]
    pub disk_used: f64,
    #[serde(default)]
    pub disk_percentage: f64,
    #[serde(default)]
    pub core_temperatures: BTreeMap<String, f64>,
}

/// CPU clock readings, in GHz.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CpuFrequency {
    #[serde(default)]
    pub current_frequency: f64,
    #[serde(default)]
    pub max_frequency: f64,
}

impl MetricSample {
    /// Decode from a payload mapping that already passed the schema gate.
    pub fn from_payload(payload: &Map<String, Value>) -> Result<Self, RelayError> {
        serde_json::from_value(Value::Object(payload.clone()))
            .map_err(|e| RelayError::MalformedFrame(e.to_string()))
    }
}

/// A single schema rule breach, reported for the first violation found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaViolation {
    /// A `required` field is absent from the event.
    MissingField(String),
    /// A present field has the wrong runtime type.
    TypeMismatch {
        field: String,
        expected: String,
        actual: String,
    },
}

impl std::fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingField(name) => write!(f, "missing required field: {name}"),
            Self::TypeMismatch {
                field,
                expected,
                actual,
            } => write!(f, "{field} must be a {expected}, got {actual}"),
        }
    }
}

impl std::error::Error for SchemaViolation {}

/// Relay-level errors.
///
/// Frame-level failures (`Schema`, `MalformedFrame`) are contained at the
/// dispatch boundary — logged, frame dropped, session kept alive. Only
/// transport failures end the session.
#[derive(Debug)]
pub enum RelayError {
    Schema(SchemaViolation),
    MalformedFrame(String),
    Transport(String),
    UnknownPeer(String),
    NoIdentity,
    ConnectionClosed,
}

impl std::fmt::Display for RelayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Schema(v) => write!(f, "schema validation failed: {v}"),
            Self::MalformedFrame(e) => write!(f, "malformed frame: {e}"),
            Self::Transport(e) => write!(f, "transport error: {e}"),
            Self::UnknownPeer(id) => write!(f, "unknown peer: {id}"),
            Self::NoIdentity => write!(f, "no client id assigned yet"),
            Self::ConnectionClosed => write!(f, "connection closed"),
        }
    }
}

impl std::error::Error for RelayError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Schema(v) => Some(v),
            _ => None,
        }
    }
}

impl From<SchemaViolation> for RelayError {
    fn from(v: SchemaViolation) -> Self {
        Self::Schema(v)
    }
}
