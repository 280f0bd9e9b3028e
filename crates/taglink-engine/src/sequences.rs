//! Command sequences as data.
//!
//! Sequences are ordered command lists with no shared mutable state between
//! entries; new modes or settings profiles are added by composing new lists,
//! not by branching logic in the executor.
//!
//! Every mode transition passes through the idle configuration first, even
//! between two active modes. The hardware then always enters a mode from a
//! known-clean state instead of attempting delta-configuration from an
//! arbitrary prior mode.

use taglink_core::{Error, ReaderMode, ReaderSettings, Result};
use taglink_protocol::EventCode;

/// One outbound instruction: target event, payload, and retry policy.
///
/// The retry flag comes from the event's registry entry, where the
/// idempotent configuration writes are marked retryable and the start/stop
/// toggles are not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub event: EventCode,
    pub payload: Vec<u8>,
    pub retry_on_error: bool,
}

impl Command {
    /// Command with an empty payload and the registry's retry policy.
    pub fn new(event: EventCode) -> Self {
        Self::with_payload(event, Vec::new())
    }

    /// Command with a payload and the registry's retry policy.
    pub fn with_payload(event: EventCode, payload: Vec<u8>) -> Self {
        Self {
            event,
            payload,
            retry_on_error: event.descriptor().retry_on_error,
        }
    }
}

/// Commands that drive the reader to the idle waypoint.
pub fn idle_sequence() -> Vec<Command> {
    vec![Command::new(EventCode::SetIdle)]
}

/// Commands run while establishing a session: settle the reader into idle,
/// then confirm it answers queries.
pub fn connect_sequence() -> Vec<Command> {
    vec![
        Command::new(EventCode::SetIdle),
        Command::new(EventCode::GetBattery),
    ]
}

/// Configuration commands for one mode, idle step not included.
///
/// # Errors
/// Returns `Error::Config` when locate mode is requested without a target
/// EPC mask.
pub fn mode_config(mode: ReaderMode, settings: &ReaderSettings) -> Result<Vec<Command>> {
    let commands = match mode {
        ReaderMode::Idle => Vec::new(),
        ReaderMode::Inventory => vec![
            Command::with_payload(EventCode::SetPower, vec![settings.power_dbm]),
            Command::with_payload(
                EventCode::SetInventoryParams,
                vec![
                    settings.session.to_u8(),
                    settings.target.to_u8(),
                    settings.q,
                ],
            ),
        ],
        ReaderMode::Locate => {
            let mask = settings.locate_mask.as_ref().ok_or_else(|| {
                Error::Config("locate mode requires a target EPC mask".to_string())
            })?;
            vec![
                Command::with_payload(EventCode::SetPower, vec![settings.power_dbm]),
                Command::with_payload(EventCode::SetLocateMask, mask.to_bytes()),
            ]
        }
        // The imager needs no radio configuration
        ReaderMode::Barcode => Vec::new(),
    };
    Ok(commands)
}

/// Full transition sequence into a mode: the idle waypoint first, then the
/// target mode's configuration.
pub fn transition_sequence(target: ReaderMode, settings: &ReaderSettings) -> Result<Vec<Command>> {
    let mut commands = idle_sequence();
    commands.extend(mode_config(target, settings)?);
    Ok(commands)
}

/// Scan-start command for the given mode, if the mode scans.
pub fn start_scan_command(mode: ReaderMode) -> Option<Command> {
    match mode {
        ReaderMode::Idle => None,
        ReaderMode::Inventory => Some(Command::new(EventCode::StartInventory)),
        ReaderMode::Locate => Some(Command::new(EventCode::StartLocate)),
        ReaderMode::Barcode => Some(Command::new(EventCode::StartBarcode)),
    }
}

/// Scan-stop command for the given mode, if the mode scans.
pub fn stop_scan_command(mode: ReaderMode) -> Option<Command> {
    match mode {
        ReaderMode::Idle => None,
        ReaderMode::Inventory => Some(Command::new(EventCode::StopInventory)),
        ReaderMode::Locate => Some(Command::new(EventCode::StopLocate)),
        ReaderMode::Barcode => Some(Command::new(EventCode::StopBarcode)),
    }
}
