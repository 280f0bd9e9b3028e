//! Notification routing: which handler owns a frame.
//!
//! Routing is an exhaustive match over `(event code, mode)` rather than a
//! registry of handler objects: the handler set is closed, adding a handler
//! kind is a compile-time change, and the same event code can legitimately
//! resolve to different handlers depending on the current mode. A tag
//! report means "inventory batch" in inventory mode and "locate sample" in
//! locate mode.
//!
//! Exactly one handler is selected per frame. Frames with no handler for
//! the current mode are ignored without error; keepalives and status
//! notifications fall through here by design.

use taglink_core::{Error, ReaderMode, Result};
use taglink_protocol::EventCode;

/// The closed set of notification handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerKind {
    /// Tag report parsed as an inventory batch.
    InventoryReport,

    /// Tag report fed to the locate smoother.
    LocateReport,

    /// Barcode imager scan.
    BarcodeScan,

    /// Hardware trigger press/release.
    Trigger,

    /// Battery level report.
    Battery,
}

/// Select the single handler for a notification, if any.
pub fn select_handler(code: EventCode, mode: ReaderMode) -> Option<HandlerKind> {
    match (code, mode) {
        (EventCode::TagReport, ReaderMode::Inventory) => Some(HandlerKind::InventoryReport),
        (EventCode::TagReport, ReaderMode::Locate) => Some(HandlerKind::LocateReport),
        (EventCode::BarcodeReport, ReaderMode::Barcode) => Some(HandlerKind::BarcodeScan),
        (EventCode::TriggerEvent, _) => Some(HandlerKind::Trigger),
        (EventCode::BatteryReport, _) => Some(HandlerKind::Battery),
        _ => None,
    }
}

/// Decode a trigger payload: one byte, 0 released, 1 pressed.
pub fn decode_trigger(payload: &[u8]) -> Result<bool> {
    match payload {
        [0] => Ok(false),
        [1] => Ok(true),
        _ => Err(Error::InvalidPayload {
            event: "trigger-event",
            reason: format!("expected one 0/1 byte, got {payload:02X?}"),
        }),
    }
}

/// Decode a battery payload: one byte, 0-100 percent.
pub fn decode_battery(payload: &[u8]) -> Result<u8> {
    match payload {
        [percent] if *percent <= 100 => Ok(*percent),
        _ => Err(Error::InvalidPayload {
            event: "battery-report",
            reason: format!("expected one 0-100 byte, got {payload:02X?}"),
        }),
    }
}

/// Decode a barcode payload: non-empty ASCII data.
pub fn decode_barcode(payload: &[u8]) -> Result<String> {
    if payload.is_empty() {
        return Err(Error::InvalidPayload {
            event: "barcode-report",
            reason: "empty barcode".to_string(),
        });
    }
    if !payload.is_ascii() {
        return Err(Error::InvalidPayload {
            event: "barcode-report",
            reason: "barcode data must be ASCII".to_string(),
        });
    }
    // Checked ASCII above, so UTF-8 conversion cannot fail
    Ok(String::from_utf8_lossy(payload).into_owned())
}
