//! AlertStreamClient - Push-Channel Client
//!
//! ## Responsibilities
//!
//! - Own the push-channel connection lifecycle (connect, receive,
//!   error, disconnect, reconnect after a fixed delay)
//! - Parse inbound frames into alerts and forward them in receipt order
//! - Surface connection-state transitions for display
//!
//! The client retries forever: there is no retry cap and no backoff
//! growth, trading politeness toward an unreachable server for
//! operator-free recovery from transient network loss. Explicit
//! shutdown is distinguished from remote closure; it cancels a pending
//! reconnect timer and never re-enters the connect loop.

use crate::models::Alert;
use futures::StreamExt;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Reconnect delay applied after every disconnect
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(3);

/// Connection state surfaced for display
///
/// `Error` is transient: it is always followed by the close sequence
/// and another connect attempt, never by a terminal stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnected,
    Error,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Connected => "Connected",
            ConnectionState::Disconnected => "Disconnected",
            ConnectionState::Error => "Error",
        };
        f.write_str(s)
    }
}

/// Handle to a running stream session
///
/// Dropping the handle (or calling [`StreamHandle::shutdown`]) stops
/// the session: no further alerts or state transitions are emitted and
/// any armed reconnect timer is cancelled.
pub struct StreamHandle {
    alerts: mpsc::UnboundedReceiver<Alert>,
    state: watch::Receiver<ConnectionState>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl StreamHandle {
    /// Receive the next alert, in channel order
    pub async fn next_alert(&mut self) -> Option<Alert> {
        self.alerts.recv().await
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Watch for connection-state transitions
    pub fn state_watch(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Stop the session: close an open connection without triggering
    /// the reconnect path and cancel any pending reconnect timer.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "Alert channel task join failed");
        }
    }
}

/// Push-channel client for live alerts
pub struct AlertStreamClient {
    url: String,
    reconnect_delay: Duration,
}

impl AlertStreamClient {
    /// Create a client for the given WebSocket endpoint
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }

    /// Override the reconnect delay
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Endpoint URL
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Start the session and return its handle
    pub fn start(&self) -> StreamHandle {
        let (alert_tx, alert_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let url = self.url.clone();
        let delay = self.reconnect_delay;
        let task = tokio::spawn(run_session(url, delay, alert_tx, state_tx, shutdown_rx));

        StreamHandle {
            alerts: alert_rx,
            state: state_rx,
            shutdown: shutdown_tx,
            task,
        }
    }
}

/// Connect/receive/reconnect loop. Runs until shutdown is signalled or
/// the handle is dropped.
async fn run_session(
    url: String,
    delay: Duration,
    alert_tx: mpsc::UnboundedSender<Alert>,
    state_tx: watch::Sender<ConnectionState>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        state_tx.send_replace(ConnectionState::Connecting);
        tracing::info!(url = %url, "Connecting to alert channel");

        tokio::select! {
            result = connect_async(url.as_str()) => match result {
                Ok((mut ws, _response)) => {
                    state_tx.send_replace(ConnectionState::Connected);
                    tracing::info!("Alert channel connected");

                    let shutting_down =
                        drain_session(&mut ws, &alert_tx, &state_tx, &mut shutdown_rx).await;
                    if shutting_down {
                        let _ = ws.close(None).await;
                        break;
                    }
                }
                Err(e) => {
                    // Construction failure is handled like a transport
                    // closure: transient error, then the reconnect path
                    state_tx.send_replace(ConnectionState::Error);
                    tracing::warn!(error = %e, "Alert channel connection failed");
                }
            },
            _ = shutdown_rx.changed() => break,
        }

        state_tx.send_replace(ConnectionState::Disconnected);
        tracing::info!(
            delay_ms = delay.as_millis() as u64,
            "Alert channel disconnected, scheduling reconnect"
        );

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown_rx.changed() => break,
        }
    }

    tracing::debug!("Alert channel session stopped");
}

/// Receive frames until the session ends. Returns true when it ended
/// because shutdown was signalled, false for any remote/transport end.
async fn drain_session(
    ws: &mut WsStream,
    alert_tx: &mpsc::UnboundedSender<Alert>,
    state_tx: &watch::Sender<ConnectionState>,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> bool {
    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => return true,
            frame = ws.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    // A malformed message fails the message, not the
                    // connection: drop it and keep receiving
                    match serde_json::from_str::<Alert>(&text) {
                        Ok(alert) => {
                            if alert_tx.send(alert).is_err() {
                                tracing::warn!("Alert receiver dropped, discarding alert");
                            }
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "Dropping malformed alert message");
                        }
                    }
                }
                Some(Ok(Message::Close(_))) => {
                    tracing::info!("Alert channel closed by server");
                    return false;
                }
                // Binary/ping/pong frames carry no alerts
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    state_tx.send_replace(ConnectionState::Error);
                    tracing::warn!(error = %e, "Alert channel error");
                    return false;
                }
                None => {
                    return false;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::SinkExt;
    use serde_json::json;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    fn alert_json(alert_type: &str, severity: &str, message: &str) -> String {
        json!({
            "type": alert_type,
            "severity": severity,
            "timestamp": 12.5,
            "message": message,
        })
        .to_string()
    }

    async fn recv_alert(handle: &mut StreamHandle) -> Alert {
        tokio::time::timeout(Duration::from_secs(5), handle.next_alert())
            .await
            .expect("timed out waiting for alert")
            .expect("alert channel closed")
    }

    #[test]
    fn test_connection_state_display() {
        assert_eq!(ConnectionState::Connecting.to_string(), "Connecting");
        assert_eq!(ConnectionState::Connected.to_string(), "Connected");
        assert_eq!(ConnectionState::Disconnected.to_string(), "Disconnected");
        assert_eq!(ConnectionState::Error.to_string(), "Error");
    }

    #[tokio::test]
    async fn test_alerts_delivered_in_order() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            for message in ["first", "second", "third"] {
                ws.send(Message::Text(alert_json("FALL", "HIGH", message)))
                    .await
                    .unwrap();
            }
            // Hold the connection open until the client disconnects
            while ws.next().await.is_some() {}
        });

        let client = AlertStreamClient::new(format!("ws://{addr}/ws/alerts"));
        let mut handle = client.start();

        for expected in ["first", "second", "third"] {
            let alert = recv_alert(&mut handle).await;
            assert_eq!(alert.message, expected);
        }
        assert_eq!(handle.state(), ConnectionState::Connected);

        handle.shutdown().await;
        server.abort();
    }

    #[tokio::test]
    async fn test_malformed_message_dropped_without_state_change() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            ws.send(Message::Text("{not json".to_string())).await.unwrap();
            ws.send(Message::Text(json!({"unexpected": true}).to_string()))
                .await
                .unwrap();
            ws.send(Message::Text(alert_json("SEIZURE", "CRITICAL", "real")))
                .await
                .unwrap();
            while ws.next().await.is_some() {}
        });

        let client = AlertStreamClient::new(format!("ws://{addr}/ws/alerts"));
        let mut handle = client.start();

        // Only the well-formed alert comes through, and the two bad
        // frames did not disturb the connection
        let alert = recv_alert(&mut handle).await;
        assert_eq!(alert.message, "real");
        assert_eq!(handle.state(), ConnectionState::Connected);

        handle.shutdown().await;
        server.abort();
    }

    #[tokio::test]
    async fn test_reconnects_indefinitely_after_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        // Five sessions: each delivers one alert and then drops the
        // connection, forcing a full disconnect/reconnect cycle
        let server = tokio::spawn(async move {
            for cycle in 0..5u32 {
                let (stream, _) = listener.accept().await.unwrap();
                let mut ws = accept_async(stream).await.unwrap();
                ws.send(Message::Text(alert_json(
                    "BED_EXIT",
                    "MEDIUM",
                    &format!("cycle {cycle}"),
                )))
                .await
                .unwrap();
                ws.close(None).await.ok();
            }
        });

        let client = AlertStreamClient::new(format!("ws://{addr}/ws/alerts"))
            .with_reconnect_delay(Duration::from_millis(10));
        let mut handle = client.start();

        for cycle in 0..5u32 {
            let alert = recv_alert(&mut handle).await;
            assert_eq!(alert.message, format!("cycle {cycle}"));
        }

        // The server is gone now; the client must keep cycling rather
        // than terminate. Give it a few failed attempts, then shut down
        // cleanly.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(matches!(
            handle.state(),
            ConnectionState::Connecting
                | ConnectionState::Disconnected
                | ConnectionState::Error
        ));

        tokio::time::timeout(Duration::from_secs(1), handle.shutdown())
            .await
            .expect("shutdown should resolve promptly");
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_cancels_pending_reconnect() {
        // Bind then drop to get a port with nothing listening
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = AlertStreamClient::new(format!("ws://{addr}/ws/alerts"))
            .with_reconnect_delay(Duration::from_secs(60));
        let handle = client.start();

        // Let the failed connect land us in the reconnect wait
        tokio::time::sleep(Duration::from_millis(200)).await;

        // Shutdown must cancel the 60s timer, not wait it out
        tokio::time::timeout(Duration::from_secs(1), handle.shutdown())
            .await
            .expect("shutdown should cancel the armed reconnect timer");
    }

    #[tokio::test]
    async fn test_reenters_connecting_after_remote_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        // One real session, then the listener stays bound but never
        // accepts again: the reconnect attempt's handshake stalls, so
        // the client parks in Connecting where the test can observe it
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            ws.send(Message::Text(alert_json("FALL", "LOW", "ping")))
                .await
                .unwrap();
            ws.close(None).await.ok();
            tokio::time::sleep(Duration::from_secs(60)).await;
            drop(listener);
        });

        let client = AlertStreamClient::new(format!("ws://{addr}/ws/alerts"))
            .with_reconnect_delay(Duration::from_millis(50));
        let mut handle = client.start();

        let alert = recv_alert(&mut handle).await;
        assert_eq!(alert.message, "ping");

        // After the remote close and the fixed delay the loop must be
        // back in Connecting
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while handle.state() != ConnectionState::Connecting {
            assert!(
                tokio::time::Instant::now() < deadline,
                "never re-entered Connecting, state: {}",
                handle.state()
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        // Shutdown must also cancel an in-flight connect attempt
        tokio::time::timeout(Duration::from_secs(1), handle.shutdown())
            .await
            .expect("shutdown should cancel the pending connect");
        server.abort();
    }
}
