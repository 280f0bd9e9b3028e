//! Core constants for the reader wire protocol.
//!
//! This module defines all protocol-level constants used throughout the
//! taglink engine. These constants ensure consistent framing behavior and
//! provide centralized defaults for engine timing.
//!
//! # Frame Structure
//!
//! Every frame on the wire has the same layout:
//!
//! ```text
//! [2B prefix][1B length][1B module][1B reserve][1B direction][2B event code][payload][2B CRC]
//! ```
//!
//! Where:
//! - `prefix` - Fixed magic bytes (0xA5 0x5A) marking a frame start
//! - `length` - Event code plus payload length in bytes
//! - `module` - Hardware module the frame addresses (RFID, barcode, system)
//! - `reserve` - Sequence byte: correlates commands with responses, and
//!   counts inventory notifications
//! - `direction` - Command, response, or unsolicited notification
//! - `event code` - Big-endian operation identifier
//! - `CRC` - CRC-16/CCITT-FALSE over everything after the prefix
//!
//! The payload length invariant is `payload.len() == length - 2`.

// ============================================================================
// Frame Layout
// ============================================================================

/// Magic bytes marking the start of every frame.
///
/// The framer scans for this prefix when resynchronizing after lost
/// fragments; a valid header mid-stream restarts parsing at that point.
pub const FRAME_PREFIX: [u8; 2] = [0xA5, 0x5A];

/// Header length in bytes: prefix + length + module + reserve + direction
/// + event code.
pub const FRAME_HEADER_LEN: usize = 8;

/// Trailing CRC length in bytes.
pub const FRAME_CRC_LEN: usize = 2;

/// Total framing overhead: header plus CRC.
///
/// A frame carrying `n` payload bytes occupies `n + FRAME_OVERHEAD` bytes
/// on the wire.
pub const FRAME_OVERHEAD: usize = FRAME_HEADER_LEN + FRAME_CRC_LEN;

/// Event code length in bytes, counted inside the declared length field.
pub const EVENT_CODE_LEN: usize = 2;

/// Maximum payload length in bytes.
///
/// The length field is a single byte covering the event code and payload,
/// so the payload itself is bounded by `255 - EVENT_CODE_LEN`.
pub const MAX_PAYLOAD_LEN: usize = 255 - EVENT_CODE_LEN;

// ============================================================================
// Direction Flags
// ============================================================================

/// Host to reader command frame.
pub const DIR_COMMAND: u8 = 0x00;

/// Reader to host response frame. The reserve byte echoes the command's
/// sequence byte and the first payload byte is a status code.
pub const DIR_RESPONSE: u8 = 0x01;

/// Reader to host unsolicited notification frame.
pub const DIR_NOTIFICATION: u8 = 0x02;

/// Response status byte indicating success.
pub const STATUS_OK: u8 = 0x00;

// ============================================================================
// Module Identifiers
// ============================================================================

/// System module: power, battery, idle configuration.
pub const MODULE_SYSTEM: u8 = 0x00;

/// RFID module: inventory, locate, tag notifications.
pub const MODULE_RFID: u8 = 0x01;

/// Barcode module: imager scans.
pub const MODULE_BARCODE: u8 = 0x02;

// ============================================================================
// Timing Defaults
// ============================================================================

/// Default fragment reassembly timeout (milliseconds).
///
/// A partial frame pending longer than this with no further bytes is
/// discarded on the next ingest call. Wireless transports routinely drop
/// mid-frame fragments, so this is a recovery path, not an error.
pub const DEFAULT_FRAGMENT_TIMEOUT_MS: u64 = 200;

/// Default per-command response timeout (milliseconds).
pub const DEFAULT_RESPONSE_TIMEOUT_MS: u64 = 3000;

/// Default retry budget for commands flagged retry-on-error.
///
/// A flagged command is sent up to `1 + DEFAULT_COMMAND_RETRIES` times
/// before the owning sequence is declared failed.
pub const DEFAULT_COMMAND_RETRIES: u8 = 2;

/// Default minimum interval between locate updates (milliseconds).
///
/// Observations arriving faster update internal state but do not each emit
/// an outward event, keeping high tag-read rates from flooding consumers.
pub const DEFAULT_LOCATE_EMIT_INTERVAL_MS: u64 = 50;

// ============================================================================
// Signal Smoothing
// ============================================================================

/// Depth of the per-session RSSI history ring used by the locate smoother.
pub const DEFAULT_RSSI_HISTORY_DEPTH: usize = 10;

// ============================================================================
// Parser Buffer Health
// ============================================================================

/// Default number of parsed frames between scratch-buffer health checks.
pub const DEFAULT_HEALTH_CHECK_FRAMES: u32 = 100;

/// Default scratch-ring utilization (percent) above which a buffer-pressure
/// warning is raised.
pub const DEFAULT_PRESSURE_THRESHOLD_PERCENT: u8 = 80;

/// Default capacity of the inventory parser's scratch ring in bytes.
pub const DEFAULT_SCRATCH_CAPACITY: usize = 4096;

// ============================================================================
// Tag Constraints
// ============================================================================

/// Minimum EPC length in bytes.
pub const MIN_EPC_BYTES: usize = 2;

/// Maximum EPC length in bytes.
///
/// The PC word's EPC-length field is 5 bits of 16-bit words, so the longest
/// representable EPC is 31 words.
pub const MAX_EPC_BYTES: usize = 62;

// ============================================================================
// Radio Configuration Limits
// ============================================================================

/// Minimum antenna transmit power (dBm).
pub const MIN_TX_POWER_DBM: u8 = 5;

/// Maximum antenna transmit power (dBm).
pub const MAX_TX_POWER_DBM: u8 = 30;

/// Maximum Q value for the Gen2 anti-collision algorithm.
pub const MAX_Q_VALUE: u8 = 15;
