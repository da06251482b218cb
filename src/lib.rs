//! Wardwatch - Ward Monitoring Console Core
//!
//! Client-side state synchronization and asynchronous workflows for a
//! multi-room patient monitoring console.
//!
//! ## Architecture (5 Components)
//!
//! 1. AlertStreamClient - push-channel lifecycle (connect, receive,
//!    reconnect forever)
//! 2. AlertAggregator - alert log, running counters, room escalation
//! 3. RoomRegistry - fixed room set, selection, status transitions
//! 4. MediaPipelineClient - upload -> process video workflow
//! 5. ComparisonClient - two-image missing-patient workflow
//!
//! ## Design Principles
//!
//! - Single writer per structure: only the aggregator mutates the
//!   log/counters, only the registry mutates room state
//! - Atomic ingest: log, counters, and room status move as one unit
//! - Failures return to a previously-valid state; nothing here is
//!   fatal to the process

pub mod alert_aggregator;
pub mod comparison_client;
pub mod error;
pub mod media_pipeline;
pub mod models;
pub mod room_registry;
pub mod state;
pub mod stream_client;

pub use error::{Error, Result};
pub use state::{AppConfig, AppState};
