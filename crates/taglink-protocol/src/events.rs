//! Event code definitions and the static descriptor registry.
//!
//! Every operation on the wire is identified by a 16-bit event code. Codes
//! below 0x8000 are host-initiated commands (the reader answers each with a
//! response frame reusing the same code); codes at 0x8000 and above are
//! unsolicited notifications.
//!
//! The [`EventDescriptor`] registry is a static table mapping each code to a
//! human-readable name, its payload shape, and whether retrying the command
//! is appropriate when the reader reports an error. The registry is closed:
//! adding an event is a compile-time change, never a runtime registration.

use serde::{Deserialize, Serialize};
use std::fmt;
use taglink_core::{
    Error, Result,
    constants::{MODULE_BARCODE, MODULE_RFID, MODULE_SYSTEM},
};

/// Event codes understood by the engine.
///
/// # Wire Format
///
/// Codes are transmitted big-endian in bytes 6-7 of the frame header.
/// The top bit distinguishes notifications (set) from commands (clear).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum EventCode {
    // System commands
    SetIdle = 0x0001,
    GetBattery = 0x0002,
    SetPower = 0x0003,

    // Inventory commands
    SetInventoryParams = 0x0010,
    StartInventory = 0x0011,
    StopInventory = 0x0012,

    // Locate commands
    SetLocateMask = 0x0020,
    StartLocate = 0x0021,
    StopLocate = 0x0022,

    // Barcode commands
    StartBarcode = 0x0030,
    StopBarcode = 0x0031,

    // Notifications
    TagReport = 0x8001,
    BarcodeReport = 0x8002,
    TriggerEvent = 0x8003,
    BatteryReport = 0x8004,
    KeepAlive = 0x8005,
}

/// Payload shape carried by an event, as declared in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    /// No payload beyond the response status byte.
    Empty,

    /// Mode discriminator followed by tag records.
    TagBatch,

    /// ASCII barcode data.
    Barcode,

    /// Single byte: 0 released, 1 pressed.
    Trigger,

    /// Single byte: battery percentage.
    Battery,
}

/// Static registry entry for one event code.
///
/// Immutable, defined once at compile time. All consumers of parsed
/// payloads go through the payload kind declared here, never raw bytes.
#[derive(Debug, Clone, Copy)]
pub struct EventDescriptor {
    pub code: EventCode,
    pub name: &'static str,
    pub payload: PayloadKind,

    /// Whether resending is appropriate when the reader reports an error.
    ///
    /// Configuration writes are idempotent and safe to retry; start/stop
    /// commands are not, since a duplicate could double-toggle scanning.
    pub retry_on_error: bool,
}

/// The full descriptor registry, one entry per [`EventCode`] variant.
pub const EVENT_REGISTRY: &[EventDescriptor] = &[
    EventDescriptor {
        code: EventCode::SetIdle,
        name: "set-idle",
        payload: PayloadKind::Empty,
        retry_on_error: true,
    },
    EventDescriptor {
        code: EventCode::GetBattery,
        name: "get-battery",
        payload: PayloadKind::Battery,
        retry_on_error: true,
    },
    EventDescriptor {
        code: EventCode::SetPower,
        name: "set-power",
        payload: PayloadKind::Empty,
        retry_on_error: true,
    },
    EventDescriptor {
        code: EventCode::SetInventoryParams,
        name: "set-inventory-params",
        payload: PayloadKind::Empty,
        retry_on_error: true,
    },
    EventDescriptor {
        code: EventCode::StartInventory,
        name: "start-inventory",
        payload: PayloadKind::Empty,
        retry_on_error: false,
    },
    EventDescriptor {
        code: EventCode::StopInventory,
        name: "stop-inventory",
        payload: PayloadKind::Empty,
        retry_on_error: false,
    },
    EventDescriptor {
        code: EventCode::SetLocateMask,
        name: "set-locate-mask",
        payload: PayloadKind::Empty,
        retry_on_error: true,
    },
    EventDescriptor {
        code: EventCode::StartLocate,
        name: "start-locate",
        payload: PayloadKind::Empty,
        retry_on_error: false,
    },
    EventDescriptor {
        code: EventCode::StopLocate,
        name: "stop-locate",
        payload: PayloadKind::Empty,
        retry_on_error: false,
    },
    EventDescriptor {
        code: EventCode::StartBarcode,
        name: "start-barcode",
        payload: PayloadKind::Empty,
        retry_on_error: false,
    },
    EventDescriptor {
        code: EventCode::StopBarcode,
        name: "stop-barcode",
        payload: PayloadKind::Empty,
        retry_on_error: false,
    },
    EventDescriptor {
        code: EventCode::TagReport,
        name: "tag-report",
        payload: PayloadKind::TagBatch,
        retry_on_error: false,
    },
    EventDescriptor {
        code: EventCode::BarcodeReport,
        name: "barcode-report",
        payload: PayloadKind::Barcode,
        retry_on_error: false,
    },
    EventDescriptor {
        code: EventCode::TriggerEvent,
        name: "trigger-event",
        payload: PayloadKind::Trigger,
        retry_on_error: false,
    },
    EventDescriptor {
        code: EventCode::BatteryReport,
        name: "battery-report",
        payload: PayloadKind::Battery,
        retry_on_error: false,
    },
    EventDescriptor {
        code: EventCode::KeepAlive,
        name: "keep-alive",
        payload: PayloadKind::Empty,
        retry_on_error: false,
    },
];

impl EventCode {
    /// Parse an event code from its wire value.
    ///
    /// # Errors
    /// Returns `Error::UnknownEventCode` for codes not in the registry.
    pub fn from_u16(code: u16) -> Result<Self> {
        match code {
            0x0001 => Ok(EventCode::SetIdle),
            0x0002 => Ok(EventCode::GetBattery),
            0x0003 => Ok(EventCode::SetPower),
            0x0010 => Ok(EventCode::SetInventoryParams),
            0x0011 => Ok(EventCode::StartInventory),
            0x0012 => Ok(EventCode::StopInventory),
            0x0020 => Ok(EventCode::SetLocateMask),
            0x0021 => Ok(EventCode::StartLocate),
            0x0022 => Ok(EventCode::StopLocate),
            0x0030 => Ok(EventCode::StartBarcode),
            0x0031 => Ok(EventCode::StopBarcode),
            0x8001 => Ok(EventCode::TagReport),
            0x8002 => Ok(EventCode::BarcodeReport),
            0x8003 => Ok(EventCode::TriggerEvent),
            0x8004 => Ok(EventCode::BatteryReport),
            0x8005 => Ok(EventCode::KeepAlive),
            _ => Err(Error::UnknownEventCode { code }),
        }
    }

    /// Wire value of the event code.
    #[inline]
    #[must_use]
    pub fn to_u16(self) -> u16 {
        self as u16
    }

    /// Returns `true` for unsolicited reader-to-host notifications.
    #[inline]
    pub fn is_notification(&self) -> bool {
        self.to_u16() & 0x8000 != 0
    }

    /// Returns `true` for host-initiated commands.
    #[inline]
    pub fn is_command(&self) -> bool {
        !self.is_notification()
    }

    /// Module identifier byte used when framing this event.
    pub fn module(&self) -> u8 {
        match self {
            EventCode::SetIdle | EventCode::GetBattery | EventCode::SetPower => MODULE_SYSTEM,
            EventCode::SetInventoryParams
            | EventCode::StartInventory
            | EventCode::StopInventory
            | EventCode::SetLocateMask
            | EventCode::StartLocate
            | EventCode::StopLocate
            | EventCode::TagReport => MODULE_RFID,
            EventCode::StartBarcode | EventCode::StopBarcode | EventCode::BarcodeReport => {
                MODULE_BARCODE
            }
            EventCode::TriggerEvent | EventCode::BatteryReport | EventCode::KeepAlive => {
                MODULE_SYSTEM
            }
        }
    }

    /// Look up this event's registry entry.
    pub fn descriptor(&self) -> &'static EventDescriptor {
        // The registry is complete by construction; the unwrap is
        // guarded by test_registry_is_complete below.
        EVENT_REGISTRY
            .iter()
            .find(|d| d.code == *self)
            .expect("event registry covers every EventCode variant")
    }

    /// Human-readable name from the registry.
    pub fn name(&self) -> &'static str {
        self.descriptor().name
    }
}

impl fmt::Display for EventCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_event_codes() -> Vec<EventCode> {
        vec![
            EventCode::SetIdle,
            EventCode::GetBattery,
            EventCode::SetPower,
            EventCode::SetInventoryParams,
            EventCode::StartInventory,
            EventCode::StopInventory,
            EventCode::SetLocateMask,
            EventCode::StartLocate,
            EventCode::StopLocate,
            EventCode::StartBarcode,
            EventCode::StopBarcode,
            EventCode::TagReport,
            EventCode::BarcodeReport,
            EventCode::TriggerEvent,
            EventCode::BatteryReport,
            EventCode::KeepAlive,
        ]
    }

    #[test]
    fn test_wire_round_trip() {
        for code in all_event_codes() {
            assert_eq!(EventCode::from_u16(code.to_u16()).unwrap(), code);
        }
    }

    #[test]
    fn test_unknown_code_rejected() {
        assert!(matches!(
            EventCode::from_u16(0x7777),
            Err(Error::UnknownEventCode { code: 0x7777 })
        ));
    }

    #[test]
    fn test_registry_is_complete() {
        let codes = all_event_codes();
        assert_eq!(
            EVENT_REGISTRY.len(),
            codes.len(),
            "registry must have one entry per EventCode variant"
        );

        for code in codes {
            // descriptor() panics if an entry is missing
            let descriptor = code.descriptor();
            assert_eq!(descriptor.code, code);
            assert!(!descriptor.name.is_empty());
        }
    }

    #[test]
    fn test_notification_bit() {
        assert!(EventCode::TagReport.is_notification());
        assert!(EventCode::KeepAlive.is_notification());
        assert!(EventCode::StartInventory.is_command());
        assert!(EventCode::SetIdle.is_command());
    }

    #[test]
    fn test_retry_policy() {
        // Configuration writes are retryable
        assert!(EventCode::SetIdle.descriptor().retry_on_error);
        assert!(EventCode::SetPower.descriptor().retry_on_error);
        assert!(EventCode::SetInventoryParams.descriptor().retry_on_error);

        // Start/stop toggles are not
        assert!(!EventCode::StartInventory.descriptor().retry_on_error);
        assert!(!EventCode::StopInventory.descriptor().retry_on_error);
        assert!(!EventCode::StartLocate.descriptor().retry_on_error);
    }

    #[test]
    fn test_module_assignment() {
        assert_eq!(EventCode::SetIdle.module(), MODULE_SYSTEM);
        assert_eq!(EventCode::StartInventory.module(), MODULE_RFID);
        assert_eq!(EventCode::TagReport.module(), MODULE_RFID);
        assert_eq!(EventCode::BarcodeReport.module(), MODULE_BARCODE);
    }

    #[test]
    fn test_display_uses_registry_name() {
        assert_eq!(format!("{}", EventCode::TagReport), "tag-report");
        assert_eq!(format!("{}", EventCode::SetIdle), "set-idle");
    }
}
