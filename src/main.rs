//! Wardwatch console - entry point
//!
//! Wires the component graph, starts the push-channel session, and
//! feeds incoming alerts into the aggregator for the selected room.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wardwatch::state::{AppConfig, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wardwatch=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Wardwatch console v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::default();
    tracing::info!(
        api_url = %config.api_url,
        ws_url = %config.ws_url,
        reconnect_delay_secs = config.reconnect_delay.as_secs(),
        "Configuration loaded"
    );

    let state = AppState::new(config)?;
    for room in state.registry.snapshot() {
        tracing::info!(
            room_id = room.id,
            name = %room.name,
            patient = %room.patient,
            status = %room.status,
            "Room registered"
        );
    }

    if state.media_pipeline.health_check().await {
        tracing::info!("Analysis backend reachable");
    } else {
        tracing::warn!("Analysis backend not reachable yet; workflows will fail until it is");
    }

    let mut handle = state.stream_client().start();
    let mut connection_states = handle.state_watch();
    tracing::info!("Alert stream session started");

    let stop_reason = loop {
        tokio::select! {
            maybe_alert = handle.next_alert() => match maybe_alert {
                Some(alert) => {
                    let room_id = state.registry.selected();
                    match state.aggregator.ingest(alert.clone(), room_id) {
                        Ok(room_status) => {
                            let stats = state.aggregator.stats();
                            if alert.severity.is_escalating() {
                                // The audible tone itself is the renderer's job;
                                // the console records the escalation loudly
                                tracing::warn!(
                                    room_id,
                                    alert_type = %alert.alert_type,
                                    severity = %alert.severity,
                                    room_status = %room_status,
                                    message = %alert.message,
                                    "Escalating alert"
                                );
                            } else {
                                tracing::info!(
                                    room_id,
                                    alert_type = %alert.alert_type,
                                    severity = %alert.severity,
                                    time = %alert.timestamp.display(),
                                    message = %alert.message,
                                    "Alert received"
                                );
                            }
                            tracing::debug!(
                                total_alerts = stats.total_alerts,
                                "Stats updated"
                            );
                        }
                        Err(e) => {
                            tracing::error!(room_id, error = %e, "Failed to ingest alert");
                        }
                    }
                }
                None => break "alert stream session ended",
            },
            changed = connection_states.changed() => {
                if changed.is_err() {
                    break "alert stream session ended";
                }
                tracing::info!(
                    connection = %*connection_states.borrow(),
                    "Connection state changed"
                );
            }
            _ = tokio::signal::ctrl_c() => break "interrupted",
        }
    };

    tracing::info!(reason = stop_reason, "Console stopping");
    handle.shutdown().await;

    Ok(())
}
