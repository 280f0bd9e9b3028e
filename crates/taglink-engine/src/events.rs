//! Typed events the engine emits toward the host.
//!
//! Everything here is owned data: events are copied across the host
//! boundary, never referenced back into engine state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use taglink_core::{ConnectionState, ReaderMode};
use taglink_protocol::TagRecord;

use crate::locate::LocateUpdate;

/// Outward event stream of the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EngineEvent {
    /// One batch of tag observations from an inventory report.
    TagRead {
        tags: Vec<TagRecord>,
        timestamp: DateTime<Utc>,
    },

    /// Throttled signal-strength update while locating a tag.
    LocateUpdate(LocateUpdate),

    /// The operating mode changed.
    ModeChanged { mode: ReaderMode },

    /// The connection state changed.
    StateChanged { state: ConnectionState },

    /// Inventory parser scratch buffer crossed the pressure threshold.
    BufferWarning {
        utilization_percent: u8,
        used: usize,
        capacity: usize,
    },

    /// A payload failed to decode. The frame was dropped; processing
    /// continues.
    ParseError {
        message: String,
        event_code: u16,
        sequence: u8,
    },

    /// The transport dropped without a disconnect request. The owning
    /// coordinator should tear down and recreate the session.
    TransportDisconnected,

    /// A barcode was scanned.
    BarcodeScanned {
        data: String,
        timestamp: DateTime<Utc>,
    },

    /// The hardware trigger changed state.
    TriggerChanged { pressed: bool },

    /// Battery level report.
    BatteryLevel { percent: u8 },
}
