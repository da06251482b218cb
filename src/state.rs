//! Application state
//!
//! Holds the configuration and the wired component graph. The state is
//! the single owner of the components; everything downstream receives
//! its collaborators by constructor injection.

use crate::alert_aggregator::AlertAggregator;
use crate::comparison_client::ComparisonClient;
use crate::error::Result;
use crate::media_pipeline::MediaPipelineClient;
use crate::room_registry::{Room, RoomRegistry};
use crate::stream_client::AlertStreamClient;
use std::sync::Arc;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Analysis backend base URL
    pub api_url: String,
    /// Push-channel endpoint
    pub ws_url: String,
    /// Delay between reconnect attempts
    pub reconnect_delay: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_url: std::env::var("API_URL")
                .unwrap_or_else(|_| "http://localhost:8000".to_string()),
            ws_url: std::env::var("WS_URL")
                .unwrap_or_else(|_| "ws://localhost:8000/ws/alerts".to_string()),
            reconnect_delay: std::env::var("RECONNECT_DELAY_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(Duration::from_secs(3)),
        }
    }
}

/// Application state shared across the console
#[derive(Clone)]
pub struct AppState {
    /// Application config
    pub config: AppConfig,
    /// RoomRegistry (room state, selection)
    pub registry: Arc<RoomRegistry>,
    /// AlertAggregator (alert log, counters)
    pub aggregator: Arc<AlertAggregator>,
    /// MediaPipelineClient (upload/process workflow)
    pub media_pipeline: Arc<MediaPipelineClient>,
    /// ComparisonClient (ward comparison workflow)
    pub comparison: Arc<ComparisonClient>,
}

impl AppState {
    /// Wire the component graph over the reference ward configuration
    pub fn new(config: AppConfig) -> Result<Self> {
        Self::with_rooms(config, RoomRegistry::with_default_wards())
    }

    /// Wire the component graph over a custom room registry
    pub fn with_rooms(config: AppConfig, registry: RoomRegistry) -> Result<Self> {
        let registry = Arc::new(registry);
        let aggregator = Arc::new(AlertAggregator::new(registry.clone()));
        let media_pipeline = Arc::new(MediaPipelineClient::new(
            config.api_url.clone(),
            aggregator.clone(),
            registry.clone(),
        )?);
        let comparison = Arc::new(ComparisonClient::new(config.api_url.clone())?);

        Ok(Self {
            config,
            registry,
            aggregator,
            media_pipeline,
            comparison,
        })
    }

    /// Build the push-channel client for this configuration. Starting
    /// it yields the session handle that feeds the aggregator.
    pub fn stream_client(&self) -> AlertStreamClient {
        AlertStreamClient::new(self.config.ws_url.clone())
            .with_reconnect_delay(self.config.reconnect_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::room_registry::RoomStatus;

    fn test_config() -> AppConfig {
        AppConfig {
            api_url: "http://localhost:8000".to_string(),
            ws_url: "ws://localhost:8000/ws/alerts".to_string(),
            reconnect_delay: Duration::from_secs(3),
        }
    }

    #[test]
    fn test_state_wiring() {
        let state = AppState::new(test_config()).unwrap();

        assert_eq!(state.registry.snapshot().len(), 4);
        assert_eq!(state.registry.selected(), 1);
        assert!(state.aggregator.is_empty());
    }

    #[test]
    fn test_custom_room_set() {
        let registry = RoomRegistry::new(vec![
            Room::new(10, "ICU 1", "Patient X", RoomStatus::Normal),
            Room::new(11, "ICU 2", "Patient Y", RoomStatus::Normal),
        ])
        .unwrap();

        let state = AppState::with_rooms(test_config(), registry).unwrap();
        assert_eq!(state.registry.snapshot().len(), 2);
        assert_eq!(state.registry.selected(), 10);
    }

    #[test]
    fn test_stream_client_uses_configured_endpoint() {
        let state = AppState::new(test_config()).unwrap();
        let client = state.stream_client();
        assert_eq!(client.url(), "ws://localhost:8000/ws/alerts");
    }
}
