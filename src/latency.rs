//! Round-trip latency probes against connected peers.
//!
//! State machine per target peer: `Idle → AwaitingResponse → Idle`. At
//! most one ping is outstanding per target; re-pinging the same target
//! overwrites the pending entry. A pending ping has no timeout in this
//! design — it lives until answered or overwritten (see DESIGN.md).

use serde_json::Value;
use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::protocol::{RelayError, RelayFrame};
use crate::registry::{PeerId, PeerRegistry};
use crate::schema::{self, SchemaDocument};

/// Gradient endpoint: round trips at or beyond this are fully red.
const GRADIENT_CEILING_MS: f64 = 1000.0;

/// Red↔green latency color on a linear gradient: 0 ms is pure green,
/// 1000 ms and above pure red.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GradientColor {
    pub red: u8,
    pub green: u8,
}

impl GradientColor {
    pub fn from_latency(latency: Duration) -> Self {
        let ratio = (latency.as_secs_f64() * 1000.0 / GRADIENT_CEILING_MS).min(1.0);
        Self {
            red: (255.0 * ratio).round() as u8,
            green: (255.0 * (1.0 - ratio)).round() as u8,
        }
    }
}

/// One completed latency measurement, handed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LatencyReport {
    pub peer: PeerId,
    pub latency: Duration,
    pub color: GradientColor,
}

/// Correlates outbound pings with their asynchronous responses.
#[derive(Debug, Default)]
pub struct LatencyCorrelator {
    pending: HashMap<PeerId, Instant>,
}

impl LatencyCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a validated ping frame for `target` and record the pending
    /// exchange.
    ///
    /// The frame is vetted against the published ping-request schema
    /// before any state is recorded: a validation failure aborts the send
    /// with nothing pending. Targets absent from the registry are
    /// rejected.
    pub fn ping_frame(
        &mut self,
        self_id: &str,
        target: &str,
        registry: &PeerRegistry,
        ping_schema: &SchemaDocument,
    ) -> Result<RelayFrame, RelayError> {
        if !registry.contains(target) {
            return Err(RelayError::UnknownPeer(target.to_owned()));
        }

        let frame = RelayFrame::ping(self_id, target);
        let value = serde_json::to_value(&frame)
            .map_err(|e| RelayError::MalformedFrame(e.to_string()))?;
        let object = value
            .as_object()
            .ok_or_else(|| RelayError::MalformedFrame("ping frame is not an object".into()))?;
        schema::validate(object, ping_schema)?;

        // Overwrite any prior pending entry for the same target.
        self.pending.insert(target.to_owned(), Instant::now());
        Ok(frame)
    }

    /// Handle an inbound ping response frame.
    ///
    /// Invalid frames are logged and discarded without touching pending
    /// state. Responses with no outstanding ping (or for an exchange
    /// already consumed) are silently ignored. A match consumes the
    /// pending entry — one report per exchange.
    pub fn on_ping_response(
        &mut self,
        frame: &serde_json::Map<String, Value>,
        response_schema: &SchemaDocument,
    ) -> Option<LatencyReport> {
        if let Err(violation) = schema::validate(frame, response_schema) {
            log::warn!("discarding ping response: {violation}");
            return None;
        }

        let origin = frame.get("client_id")?.as_str()?;
        let sent_at = self.pending.remove(origin)?;
        let latency = sent_at.elapsed();
        Some(LatencyReport {
            peer: origin.to_owned(),
            latency,
            color: GradientColor::from_latency(latency),
        })
    }

    /// Targets still awaiting a response. Exposed so a supervisor can
    /// implement expiry externally if it wants one.
    pub fn pending_targets(&self) -> impl Iterator<Item = &str> {
        self.pending.keys().map(String::as_str)
    }

    pub fn is_awaiting(&self, target: &str) -> bool {
        self.pending.contains_key(target)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}
