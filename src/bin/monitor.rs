//! Console telemetry monitor.
//!
//! A minimal presentation adapter: connects to the relay, logs every
//! dashboard event, and pings each peer once when it first appears on the
//! roster.
//!
//! ```text
//! monitor [http-base] [relay-url]
//! ```

use std::collections::HashSet;

use pulse_relay::{DashboardEvent, RelayClient, SchemaSet};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let http_base = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "http://localhost:8000".to_owned());
    let relay_url = std::env::args()
        .nth(2)
        .unwrap_or_else(|| "ws://localhost:8000/api/1.0.0/ws/stats".to_owned());

    log::info!("fetching schemas from {http_base}");
    let schemas = SchemaSet::fetch(&http_base).await?;

    let mut client = RelayClient::new(schemas, relay_url);
    let mut events = client
        .take_event_rx()
        .ok_or("event channel already taken")?;
    client.connect().await?;

    let mut pinged: HashSet<String> = HashSet::new();
    while let Some(event) = events.recv().await {
        match event {
            DashboardEvent::Connected { client_id } => {
                log::info!("connected as {client_id}");
            }
            DashboardEvent::PeersUpdated(peers) => {
                log::info!("{} peer(s) online: {peers:?}", peers.len());
                for peer in &peers {
                    if pinged.insert(peer.clone()) {
                        if let Err(e) = client.send_ping(peer).await {
                            log::warn!("ping to {peer} failed: {e}");
                        }
                    }
                }
            }
            DashboardEvent::Metrics { label, sample } => {
                log::info!(
                    "[{label}] cpu {:5.1}%  ram {:5.1}%  disk used {:5.1}",
                    sample.cpu_usage,
                    sample.ram_percentage,
                    sample.disk_used,
                );
            }
            DashboardEvent::Latency(report) => {
                log::info!(
                    "latency to {}: {} ms (rgb {},{},0)",
                    report.peer,
                    report.latency.as_millis(),
                    report.color.red,
                    report.color.green,
                );
            }
            DashboardEvent::Closed => {
                log::info!("session closed");
                break;
            }
        }
    }

    Ok(())
}
