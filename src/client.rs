//! WebSocket relay client: owns the transport, dispatches inbound frames.
//!
//! Lifecycle: schemas are fetched first (no event can be validated without
//! them), then the connection opens, the announce frame goes out, and a
//! single reader task dispatches frames strictly in arrival order. One
//! malformed frame never tears down the session — it is logged and
//! dropped, and the next frame is handled normally.
//!
//! The presentation layer consumes [`DashboardEvent`]s from the channel
//! returned by [`RelayClient::take_event_rx`].

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio_tungstenite::tungstenite::Message;

use crate::latency::{LatencyCorrelator, LatencyReport};
use crate::protocol::{
    payload_map, AnnounceFrame, EventKind, MetricSample, RelayError, RelayFrame,
};
use crate::registry::{PeerId, PeerRegistry};
use crate::schema::{self, SchemaSet};
use crate::series::{timestamp_label, MetricsHistory};

/// Connection lifecycle. Error and clean close both land in `Closed`;
/// there is no reconnect state — resilience is a supervisor's concern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Open,
    Closed,
}

/// Events handed to the presentation layer.
#[derive(Debug, Clone)]
pub enum DashboardEvent {
    /// The relay acknowledged us and assigned an identity.
    Connected { client_id: PeerId },
    /// The peer roster was replaced.
    PeersUpdated(Vec<PeerId>),
    /// A telemetry sample passed the schema gate and was recorded.
    Metrics { label: String, sample: MetricSample },
    /// A ping exchange completed.
    Latency(LatencyReport),
    /// The session ended (close or transport error). Terminal.
    Closed,
}

/// Frame dispatcher: routes decoded frames to the registry, series
/// history, and latency correlator.
///
/// All mutation happens through [`FrameRouter::handle_frame`], invoked
/// from the single reader task — the components themselves need no
/// locking.
pub struct FrameRouter {
    schemas: SchemaSet,
    self_id: Option<PeerId>,
    registry: PeerRegistry,
    history: MetricsHistory,
    correlator: LatencyCorrelator,
}

impl FrameRouter {
    pub fn new(schemas: SchemaSet) -> Self {
        Self {
            schemas,
            self_id: None,
            registry: PeerRegistry::new(),
            history: MetricsHistory::default(),
            correlator: LatencyCorrelator::new(),
        }
    }

    /// Dispatch one inbound frame. Returns the event to surface to the
    /// presentation layer, if any.
    ///
    /// Every failure path here is contained: parse errors and schema
    /// violations log a warning and drop the frame.
    pub fn handle_frame(&mut self, text: &str) -> Option<DashboardEvent> {
        let value: Value = match serde_json::from_str(text) {
            Ok(v) => v,
            Err(e) => {
                log::warn!("dropping malformed frame: {e}");
                return None;
            }
        };
        let Some(frame) = value.as_object() else {
            log::warn!("dropping non-object frame");
            return None;
        };

        let kind = frame
            .get("event")
            .and_then(Value::as_str)
            .map(EventKind::parse)
            .unwrap_or(EventKind::Unknown);

        match kind {
            EventKind::ConnectAck => self.on_connect_ack(frame),
            EventKind::PeersUpdated => self.on_peers_updated(frame),
            EventKind::Metrics => self.on_metrics(frame),
            EventKind::PingResponse => self
                .correlator
                .on_ping_response(frame, &self.schemas.ping_response)
                .map(DashboardEvent::Latency),
            EventKind::Announce | EventKind::Ping | EventKind::Unknown => {
                log::debug!("ignoring frame kind {kind}");
                None
            }
        }
    }

    fn on_connect_ack(&mut self, frame: &serde_json::Map<String, Value>) -> Option<DashboardEvent> {
        let Some(id) = frame.get("client_id").and_then(Value::as_str) else {
            log::warn!("connect ack without client_id, dropping");
            return None;
        };
        if self.self_id.is_some() {
            // Identity is set exactly once per connection.
            log::warn!("duplicate connect ack ignored (already {:?})", self.self_id);
            return None;
        }
        log::info!("assigned client id {id}");
        self.self_id = Some(id.to_owned());
        Some(DashboardEvent::Connected {
            client_id: id.to_owned(),
        })
    }

    fn on_peers_updated(
        &mut self,
        frame: &serde_json::Map<String, Value>,
    ) -> Option<DashboardEvent> {
        let Some(list) = payload_map(frame).and_then(|p| p.get("py_clients")?.as_array()) else {
            log::warn!("peer update without py_clients list, dropping");
            return None;
        };
        let peers: Vec<PeerId> = list
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_owned)
            .collect();
        self.registry.replace(peers.clone());
        Some(DashboardEvent::PeersUpdated(peers))
    }

    fn on_metrics(&mut self, frame: &serde_json::Map<String, Value>) -> Option<DashboardEvent> {
        let Some(payload) = payload_map(frame) else {
            log::warn!("metrics frame without payload, dropping");
            return None;
        };
        if let Err(violation) = schema::validate(payload, &self.schemas.metrics) {
            log::warn!("schema validation failed: {violation}");
            return None;
        }
        let sample = match MetricSample::from_payload(payload) {
            Ok(s) => s,
            Err(e) => {
                log::warn!("undecodable metrics payload: {e}");
                return None;
            }
        };

        let label = timestamp_label(chrono::Local::now());
        self.history.record(&label, &sample);
        Some(DashboardEvent::Metrics { label, sample })
    }

    /// Build a validated ping frame for `target`, recording the pending
    /// exchange. Requires our identity (the relay's connect ack).
    pub fn ping_frame(&mut self, target: &str) -> Result<RelayFrame, RelayError> {
        let self_id = self.self_id.as_deref().ok_or(RelayError::NoIdentity)?;
        self.correlator
            .ping_frame(self_id, target, &self.registry, &self.schemas.ping)
    }

    pub fn self_id(&self) -> Option<&str> {
        self.self_id.as_deref()
    }

    pub fn registry(&self) -> &PeerRegistry {
        &self.registry
    }

    pub fn history(&self) -> &MetricsHistory {
        &self.history
    }

    pub fn correlator(&self) -> &LatencyCorrelator {
        &self.correlator
    }
}

/// The relay client. Owns the transport connection and the router.
pub struct RelayClient {
    relay_url: String,
    state: Arc<RwLock<ConnectionState>>,
    router: Arc<Mutex<FrameRouter>>,
    outgoing_tx: Option<mpsc::Sender<String>>,
    event_rx: Option<mpsc::Receiver<DashboardEvent>>,
    event_tx: mpsc::Sender<DashboardEvent>,
}

impl RelayClient {
    /// Create a client from already-fetched schemas (see
    /// [`SchemaSet::fetch`]).
    pub fn new(schemas: SchemaSet, relay_url: impl Into<String>) -> Self {
        let (event_tx, event_rx) = mpsc::channel(256);
        Self {
            relay_url: relay_url.into(),
            state: Arc::new(RwLock::new(ConnectionState::Idle)),
            router: Arc::new(Mutex::new(FrameRouter::new(schemas))),
            outgoing_tx: None,
            event_rx: Some(event_rx),
            event_tx,
        }
    }

    /// Take the event receiver (can only be called once).
    pub fn take_event_rx(&mut self) -> Option<mpsc::Receiver<DashboardEvent>> {
        self.event_rx.take()
    }

    /// Open the relay connection, send the announce frame, and spawn the
    /// reader/writer tasks.
    pub async fn connect(&mut self) -> Result<(), RelayError> {
        *self.state.write().await = ConnectionState::Connecting;

        let (ws_stream, _) = match tokio_tungstenite::connect_async(&self.relay_url).await {
            Ok(conn) => conn,
            Err(e) => {
                *self.state.write().await = ConnectionState::Closed;
                return Err(RelayError::Transport(e.to_string()));
            }
        };
        let (mut ws_writer, mut ws_reader) = ws_stream.split();

        // Writer task: forward the outgoing channel to the socket.
        let (out_tx, mut out_rx) = mpsc::channel::<String>(256);
        self.outgoing_tx = Some(out_tx.clone());
        tokio::spawn(async move {
            while let Some(text) = out_rx.recv().await {
                if ws_writer.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
        });

        // Announce our role before anything else.
        let announce = AnnounceFrame::encode()?;
        out_tx
            .send(announce)
            .await
            .map_err(|_| RelayError::ConnectionClosed)?;

        *self.state.write().await = ConnectionState::Open;
        log::info!("relay connection open: {}", self.relay_url);

        // Reader task: frames are dispatched strictly in arrival order on
        // this one task.
        let router = self.router.clone();
        let state = self.state.clone();
        let event_tx = self.event_tx.clone();
        tokio::spawn(async move {
            while let Some(msg) = ws_reader.next().await {
                match msg {
                    Ok(Message::Text(text)) => {
                        let event = router.lock().await.handle_frame(text.as_str());
                        if let Some(event) = event {
                            let _ = event_tx.send(event).await;
                        }
                    }
                    Ok(Message::Close(_)) => break,
                    Err(e) => {
                        log::warn!("transport error: {e}");
                        break;
                    }
                    _ => {}
                }
            }

            // Terminal for the session; pending pings are abandoned.
            *state.write().await = ConnectionState::Closed;
            let _ = event_tx.send(DashboardEvent::Closed).await;
        });

        Ok(())
    }

    /// Request a round-trip measurement against `target`.
    ///
    /// Fails without sending anything if the target is unknown, the ping
    /// frame fails its schema, or no identity has been assigned yet.
    pub async fn send_ping(&self, target: &str) -> Result<(), RelayError> {
        let frame = self.router.lock().await.ping_frame(target)?;
        self.send_frame(&frame).await
    }

    /// Send an arbitrary outbound frame.
    pub async fn send_frame(&self, frame: &RelayFrame) -> Result<(), RelayError> {
        let text = frame.encode()?;
        match &self.outgoing_tx {
            Some(tx) => tx.send(text).await.map_err(|_| RelayError::ConnectionClosed),
            None => Err(RelayError::ConnectionClosed),
        }
    }

    pub async fn state(&self) -> ConnectionState {
        *self.state.read().await
    }

    /// Current peer roster snapshot.
    pub async fn peers(&self) -> Vec<PeerId> {
        self.router.lock().await.registry().snapshot().to_vec()
    }

    /// Our relay-assigned identity, once the connect ack has arrived.
    pub async fn client_id(&self) -> Option<PeerId> {
        self.router.lock().await.self_id().map(str::to_owned)
    }

    /// Shared router handle, for presentation layers that read the series
    /// history directly.
    pub fn router(&self) -> Arc<Mutex<FrameRouter>> {
        self.router.clone()
    }

    pub fn relay_url(&self) -> &str {
        &self.relay_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schemas() -> SchemaSet {
        let metrics = crate::schema::SchemaDocument::from_value(&json!({
            "required": ["cpu_usage", "ram_percentage"],
            "properties": {
                "cpu_usage": { "type": "number" },
                "ram_percentage": { "type": "number" },
                "cpu_frequency": { "type": "object" }
            }
        }))
        .unwrap();
        let ping = crate::schema::SchemaDocument::from_value(&json!({
            "required": ["event", "client_id", "data"],
            "properties": {
                "event": { "type": "string" },
                "client_id": { "type": "string" },
                "data": { "type": "object" }
            }
        }))
        .unwrap();
        let ping_response = crate::schema::SchemaDocument::from_value(&json!({
            "required": ["event", "client_id"],
            "properties": {
                "event": { "type": "string" },
                "client_id": { "type": "string" }
            }
        }))
        .unwrap();
        SchemaSet {
            metrics,
            ping,
            ping_response,
        }
    }

    fn metrics_frame(cpu: f64, ram: f64) -> String {
        json!({
            "event": "data-request",
            "data": { "data": {
                "cpu_usage": cpu,
                "ram_percentage": ram,
                "disk_used": 70.0,
                "disk_free": 30.0
            } }
        })
        .to_string()
    }

    fn peers_frame(peers: &[&str]) -> String {
        json!({
            "event": "py_clients_update",
            "data": { "data": { "py_clients": peers } }
        })
        .to_string()
    }

    #[test]
    fn test_connect_ack_sets_identity_once() {
        let mut router = FrameRouter::new(schemas());

        let event = router.handle_frame(r#"{ "event": "connect", "client_id": "me-1" }"#);
        assert!(matches!(
            event,
            Some(DashboardEvent::Connected { client_id }) if client_id == "me-1"
        ));
        assert_eq!(router.self_id(), Some("me-1"));

        // Read-only thereafter: a second ack is ignored.
        let event = router.handle_frame(r#"{ "event": "connect", "client_id": "me-2" }"#);
        assert!(event.is_none());
        assert_eq!(router.self_id(), Some("me-1"));
    }

    #[test]
    fn test_peers_updated_replaces_registry() {
        let mut router = FrameRouter::new(schemas());

        let event = router.handle_frame(&peers_frame(&["a", "b"]));
        assert!(matches!(
            event,
            Some(DashboardEvent::PeersUpdated(ref peers)) if peers == &["a", "b"]
        ));

        router.handle_frame(&peers_frame(&["c"]));
        assert_eq!(router.registry().snapshot(), ["c".to_string()]);
    }

    #[test]
    fn test_metrics_recorded_after_gate() {
        let mut router = FrameRouter::new(schemas());

        let event = router.handle_frame(&metrics_frame(12.5, 37.5));
        let Some(DashboardEvent::Metrics { sample, .. }) = event else {
            panic!("expected a metrics event");
        };
        assert_eq!(sample.cpu_usage, 12.5);
        assert_eq!(sample.ram_percentage, 37.5);

        let (_, cpu_values) = router.history().cpu().current_series();
        assert_eq!(cpu_values, vec![12.5]);
        assert_eq!(router.history().disk().used, 70.0);
    }

    #[test]
    fn test_metrics_failing_gate_are_dropped() {
        let mut router = FrameRouter::new(schemas());

        // ram_percentage required but absent.
        let frame = json!({
            "event": "data-request",
            "data": { "data": { "cpu_usage": 12.5 } }
        })
        .to_string();

        assert!(router.handle_frame(&frame).is_none());
        assert!(router.history().cpu().is_empty());
    }

    #[test]
    fn test_malformed_frame_does_not_poison_session() {
        let mut router = FrameRouter::new(schemas());

        assert!(router.handle_frame("{ not json").is_none());
        assert!(router.handle_frame("[1, 2, 3]").is_none());

        // The very next valid frame is handled normally.
        assert!(router.handle_frame(&metrics_frame(5.0, 10.0)).is_some());
    }

    #[test]
    fn test_unknown_event_kind_ignored() {
        let mut router = FrameRouter::new(schemas());
        assert!(router
            .handle_frame(r#"{ "event": "hologram-sync", "data": { "data": {} } }"#)
            .is_none());
        assert!(router.handle_frame(r#"{ "data": { "data": {} } }"#).is_none());
    }

    #[test]
    fn test_ping_requires_identity() {
        let mut router = FrameRouter::new(schemas());
        router.handle_frame(&peers_frame(&["abc"]));

        assert!(matches!(
            router.ping_frame("abc"),
            Err(RelayError::NoIdentity)
        ));
    }

    #[test]
    fn test_ping_response_roundtrip_through_router() {
        let mut router = FrameRouter::new(schemas());
        router.handle_frame(r#"{ "event": "connect", "client_id": "me" }"#);
        router.handle_frame(&peers_frame(&["abc"]));

        let frame = router.ping_frame("abc").unwrap();
        assert_eq!(frame.client_id.as_deref(), Some("me"));
        assert!(router.correlator().is_awaiting("abc"));

        let event =
            router.handle_frame(r#"{ "event": "ping_response", "client_id": "abc" }"#);
        let Some(DashboardEvent::Latency(report)) = event else {
            panic!("expected a latency report");
        };
        assert_eq!(report.peer, "abc");
        assert!(!router.correlator().is_awaiting("abc"));
    }

    #[test]
    fn test_window_eviction_through_dispatch() {
        let mut router = FrameRouter::new(schemas());
        for i in 0..130 {
            router.handle_frame(&metrics_frame(f64::from(i), 50.0));
        }

        // Default window is 120 samples; oldest values evicted FIFO.
        let (_, values) = router.history().cpu().current_series();
        assert_eq!(values.len(), 120);
        assert_eq!(values[0], 10.0);
        assert_eq!(values[119], 129.0);
    }

    #[tokio::test]
    async fn test_client_initial_state() {
        let client = RelayClient::new(schemas(), "ws://localhost:8000/api/1.0.0/ws/stats");
        assert_eq!(client.state().await, ConnectionState::Idle);
        assert!(client.peers().await.is_empty());
        assert!(client.client_id().await.is_none());
    }

    #[tokio::test]
    async fn test_take_event_rx_once() {
        let mut client = RelayClient::new(schemas(), "ws://localhost:8000/api/1.0.0/ws/stats");
        assert!(client.take_event_rx().is_some());
        assert!(client.take_event_rx().is_none());
    }

    #[tokio::test]
    async fn test_send_before_connect_fails() {
        let client = RelayClient::new(schemas(), "ws://localhost:8000/api/1.0.0/ws/stats");
        let frame = RelayFrame::ping("me", "abc");
        assert!(matches!(
            client.send_frame(&frame).await,
            Err(RelayError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_connect_refused_closes_session() {
        // Nothing listens on this port; connect must fail cleanly.
        let mut client = RelayClient::new(schemas(), "ws://127.0.0.1:1/ws");
        assert!(matches!(
            client.connect().await,
            Err(RelayError::Transport(_))
        ));
        assert_eq!(client.state().await, ConnectionState::Closed);
    }
}
