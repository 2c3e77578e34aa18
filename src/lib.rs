//! # pulse-relay — event-relay client for a realtime telemetry dashboard
//!
//! Connects to a relay that broadcasts periodic system-metric events and
//! peer-presence events, validates everything against the relay's
//! published schemas before trusting it, and keeps a bounded sliding
//! window of samples for visualization.
//!
//! ## Architecture
//!
//! ```text
//!                 HTTP (once, before connecting)
//!  SchemaSet  ◄───────────────────────────────── relay
//!      │
//!      ▼            WebSocket
//!  RelayClient ◄──────────────────────────────── relay
//!      │
//!      ▼ dispatch by event kind
//!  FrameRouter ──► schema gate ──┬─► MetricsHistory (CPU/RAM window + disk)
//!                                ├─► PeerRegistry   (wholesale roster)
//!                                └─► LatencyCorrelator (ping ↔ response)
//!      │
//!      ▼
//!  DashboardEvent channel ──► presentation layer
//! ```
//!
//! ## Modules
//!
//! - [`schema`] — declarative schema gate + schema fetch
//! - [`series`] — sliding-window series buffers and disk snapshot
//! - [`registry`] — live peer roster (wholesale replacement)
//! - [`latency`] — ping correlation and the red↔green latency gradient
//! - [`protocol`] — JSON wire frames, event kinds, error taxonomy
//! - [`client`] — transport ownership and frame dispatch
//!
//! Event loss is tolerated: this is a best-effort monitoring feed, not a
//! transactional protocol. A dropped or invalid frame simply doesn't
//! update the dashboard for that tick.

pub mod client;
pub mod latency;
pub mod protocol;
pub mod registry;
pub mod schema;
pub mod series;

// Re-exports for convenience
pub use client::{ConnectionState, DashboardEvent, FrameRouter, RelayClient};
pub use latency::{GradientColor, LatencyCorrelator, LatencyReport};
pub use protocol::{
    AnnounceFrame, CpuFrequency, EventKind, MetricSample, RelayError, RelayFrame, SchemaViolation,
};
pub use registry::{PeerId, PeerRegistry};
pub use schema::{validate, SchemaDocument, SchemaSet};
pub use series::{DiskSnapshot, MetricsHistory, SeriesBuffer, DEFAULT_WINDOW};
