//! RoomRegistry - Monitored Room State
//!
//! ## Responsibilities
//!
//! - Hold the fixed set of monitored rooms
//! - Track per-room mutable state (status, attached media, last alert)
//! - Track the locally selected room
//! - Apply the severity-driven status transitions
//!
//! Escalation is one-directional: once a room is `Warning` or `Alert`
//! it never decays back to `Normal`/`Monitoring` on its own. Attaching
//! media and clearing the displayed alert log both leave an escalated
//! status in place; only a fresh alert (or batch outcome) re-derives it.

use crate::error::{Error, Result};
use crate::models::{Alert, Severity};
use serde::{Deserialize, Serialize};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Stable room identifier
pub type RoomId = u32;

/// Room status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomStatus {
    /// Resting state, nothing attached, no alerts
    Normal,
    /// Media attached, no alerts yet
    Monitoring,
    /// Low/medium severity alert received
    Warning,
    /// High/critical severity alert received
    Alert,
}

impl RoomStatus {
    /// Warning and Alert are escalated states that media attachment
    /// must not downgrade
    pub fn is_escalated(&self) -> bool {
        matches!(self, RoomStatus::Warning | RoomStatus::Alert)
    }
}

impl std::fmt::Display for RoomStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RoomStatus::Normal => "normal",
            RoomStatus::Monitoring => "monitoring",
            RoomStatus::Warning => "warning",
            RoomStatus::Alert => "alert",
        };
        f.write_str(s)
    }
}

/// Opaque reference to attached media (a local path, an object URL...)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRef(pub String);

impl std::fmt::Display for MediaRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One monitored room
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Room {
    pub id: RoomId,
    pub name: String,
    /// Display label, not a patient-identity join
    pub patient: String,
    pub status: RoomStatus,
    pub video: Option<MediaRef>,
    pub last_alert: Option<Alert>,
}

impl Room {
    /// New room in the given resting status with nothing attached
    pub fn new(id: RoomId, name: &str, patient: &str, status: RoomStatus) -> Self {
        Self {
            id,
            name: name.to_string(),
            patient: patient.to_string(),
            status,
            video: None,
            last_alert: None,
        }
    }
}

struct RegistryInner {
    rooms: Vec<Room>,
    selected: RoomId,
}

/// RoomRegistry instance
///
/// The single writer for room state. Interior locking is synchronous so
/// that callers composing a room update with other bookkeeping have no
/// suspension point inside the critical section.
pub struct RoomRegistry {
    inner: RwLock<RegistryInner>,
}

impl RoomRegistry {
    /// Create a registry over a fixed, non-empty room set.
    /// The first room starts selected.
    pub fn new(rooms: Vec<Room>) -> Result<Self> {
        let first = rooms
            .first()
            .map(|r| r.id)
            .ok_or_else(|| Error::Validation("room set must not be empty".to_string()))?;

        for room in &rooms {
            let duplicates = rooms.iter().filter(|r| r.id == room.id).count();
            if duplicates > 1 {
                return Err(Error::Validation(format!(
                    "duplicate room id: {}",
                    room.id
                )));
            }
        }

        Ok(Self {
            inner: RwLock::new(RegistryInner {
                rooms,
                selected: first,
            }),
        })
    }

    /// Reference ward configuration: four rooms, Room 101 already under
    /// camera monitoring, the rest at rest.
    pub fn with_default_wards() -> Self {
        let rooms = vec![
            Room::new(1, "Room 101", "Patient A", RoomStatus::Monitoring),
            Room::new(2, "Room 102", "Patient B", RoomStatus::Normal),
            Room::new(3, "Room 103", "Patient C", RoomStatus::Normal),
            Room::new(4, "Room 104", "Patient D", RoomStatus::Normal),
        ];
        // Non-empty and duplicate-free by construction
        Self::new(rooms).expect("default ward configuration is valid")
    }

    fn read(&self) -> RwLockReadGuard<'_, RegistryInner> {
        self.inner.read().expect("room registry lock poisoned")
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryInner> {
        self.inner.write().expect("room registry lock poisoned")
    }

    /// Change the selection pointer. Touches nothing else.
    pub fn select(&self, id: RoomId) -> Result<()> {
        let mut inner = self.write();
        if !inner.rooms.iter().any(|r| r.id == id) {
            return Err(Error::RoomNotFound(id));
        }
        inner.selected = id;
        tracing::debug!(room_id = id, "Room selected");
        Ok(())
    }

    /// Currently selected room id
    pub fn selected(&self) -> RoomId {
        self.read().selected
    }

    /// Get one room by id
    pub fn get(&self, id: RoomId) -> Result<Room> {
        self.read()
            .rooms
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or(Error::RoomNotFound(id))
    }

    /// All rooms, in configuration order
    pub fn snapshot(&self) -> Vec<Room> {
        self.read().rooms.clone()
    }

    /// Attach a media reference to a room.
    ///
    /// Forces `Monitoring` unless the room is already escalated; an
    /// active `Warning`/`Alert` survives the attachment. Returns the
    /// resulting status.
    pub fn attach_media(&self, id: RoomId, media: MediaRef) -> Result<RoomStatus> {
        let mut inner = self.write();
        let room = inner
            .rooms
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(Error::RoomNotFound(id))?;

        room.video = Some(media);
        if !room.status.is_escalated() {
            room.status = RoomStatus::Monitoring;
        }

        tracing::info!(
            room_id = id,
            status = %room.status,
            "Media attached to room"
        );

        Ok(room.status)
    }

    /// Apply a live alert to a room: derive the status from severity
    /// (High/Critical escalate to `Alert`, anything else to `Warning`)
    /// and record the alert as the room's most recent. This is the only
    /// live path by which a room becomes `Warning` or `Alert`.
    pub fn apply_alert_status(
        &self,
        id: RoomId,
        severity: Severity,
        alert: Alert,
    ) -> Result<RoomStatus> {
        let new_status = if severity.is_escalating() {
            RoomStatus::Alert
        } else {
            RoomStatus::Warning
        };

        let mut inner = self.write();
        let room = inner
            .rooms
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(Error::RoomNotFound(id))?;

        let prev = room.status;
        room.status = new_status;
        room.last_alert = Some(alert);

        if prev != new_status {
            tracing::info!(
                room_id = id,
                prev_status = %prev,
                status = %new_status,
                severity = %severity,
                "Room status escalated"
            );
        }

        Ok(new_status)
    }

    /// Apply a processed-batch outcome to a room.
    ///
    /// A batch containing any HIGH alert forces `Alert`, otherwise
    /// `Warning`. Note this is narrower than the live rule, which also
    /// escalates on CRITICAL; the batch path keys on HIGH alone.
    pub fn apply_batch_outcome(&self, id: RoomId, has_high: bool) -> Result<RoomStatus> {
        let new_status = if has_high {
            RoomStatus::Alert
        } else {
            RoomStatus::Warning
        };

        let mut inner = self.write();
        let room = inner
            .rooms
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(Error::RoomNotFound(id))?;

        room.status = new_status;

        tracing::info!(
            room_id = id,
            status = %new_status,
            "Room status set from processed batch"
        );

        Ok(new_status)
    }
}
