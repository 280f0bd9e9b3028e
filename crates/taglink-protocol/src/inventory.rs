//! Tag-record decoding for inventory notification payloads.
//!
//! A tag report payload starts with a mode discriminator byte and carries
//! one or more tag records in one of two wire sub-formats:
//!
//! ```text
//! compact (0x01): [2B PC][EPC][1B RSSI]
//! normal  (0x02): [2B PC][EPC][1B RSSI][1B antenna][2B phase][2B wideband RSSI]
//! ```
//!
//! A discriminator of 0x00 marks a status/keepalive sub-frame with no tag
//! data; hardware interleaves these with tag-bearing reports, so both must
//! decode within the same session.
//!
//! The EPC length is never assumed: it is derived from the PC word's
//! EPC-length field (bits 15-11, in 16-bit words) and validated against the
//! remaining payload before extraction. Signal strength is kept in its
//! native signed form; averaging belongs to the locate smoother, not the
//! parser.
//!
//! Payload bytes are staged through a fixed-capacity scratch ring whose
//! occupancy is reported via [`BufferHealth`]; callers poll it periodically
//! and raise a buffer-pressure signal when utilization crosses their
//! threshold.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use taglink_core::{Epc, Error, Result, constants::DEFAULT_SCRATCH_CAPACITY};

/// Wire sub-format that produced a tag record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportMode {
    /// Smaller per-tag record, used for high tag-density inventory.
    Compact,

    /// Larger record with antenna, phase, and wideband RSSI fields.
    Normal,
}

/// Payload discriminator values.
const DISCRIMINATOR_STATUS: u8 = 0x00;
const DISCRIMINATOR_COMPACT: u8 = 0x01;
const DISCRIMINATOR_NORMAL: u8 = 0x02;

/// One RFID tag observation decoded from a report payload.
///
/// Immutable once created; owned by the event that carries it outward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagRecord {
    /// Electronic Product Code.
    pub epc: Epc,

    /// Protocol-control word as read off the air.
    pub pc: u16,

    /// Narrowband signal strength in dBm; more negative is weaker.
    pub rssi_dbm: i8,

    /// Wideband signal strength, normal mode only.
    pub wideband_rssi: Option<i16>,

    /// Phase angle, normal mode only.
    pub phase: Option<u16>,

    /// Antenna index, normal mode only.
    pub antenna: Option<u8>,

    /// Sequence counter of the report frame that carried this record.
    pub sequence: u8,

    /// Capture timestamp.
    pub timestamp: DateTime<Utc>,

    /// Which wire sub-format produced this record.
    pub mode: ReportMode,
}

/// Scratch-ring occupancy snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferHealth {
    /// Ring capacity in bytes.
    pub capacity: usize,

    /// Bytes staged through the ring since the last health check, capped at
    /// capacity.
    pub used: usize,
}

impl BufferHealth {
    /// Utilization as a whole percentage (0-100).
    #[must_use]
    pub fn utilization_percent(&self) -> u8 {
        if self.capacity == 0 {
            return 0;
        }
        ((self.used * 100) / self.capacity).min(100) as u8
    }
}

/// Decoder for inventory notification payloads.
///
/// Holds the scratch ring payload bytes are staged through before record
/// extraction, and counts parsed frames so callers can pace health checks.
#[derive(Debug)]
pub struct InventoryParser {
    ring: Box<[u8]>,
    write_pos: usize,
    used_since_check: usize,
    frames_parsed: u64,
}

impl InventoryParser {
    /// Create a parser with the default scratch capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_SCRATCH_CAPACITY)
    }

    /// Create a parser with a custom scratch capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            ring: vec![0u8; capacity].into_boxed_slice(),
            write_pos: 0,
            used_since_check: 0,
            frames_parsed: 0,
        }
    }

    /// Decode all tag records from one report payload.
    ///
    /// `sequence` is the reserve byte of the carrying frame and is stamped
    /// onto every record. A status sub-frame yields an empty batch.
    ///
    /// # Errors
    /// Returns `Error::InvalidPayload` if the payload is empty, carries an
    /// unknown discriminator, or declares an EPC longer than the remaining
    /// bytes. The error covers this payload only; the parser stays usable.
    pub fn parse(&mut self, payload: &[u8], sequence: u8) -> Result<Vec<TagRecord>> {
        let staged = self.stage(payload)?;
        self.frames_parsed += 1;

        let (start, end) = staged;
        Self::decode_records(&self.ring[start..end], sequence, Utc::now())
    }

    /// Number of report frames parsed so far.
    pub fn frames_parsed(&self) -> u64 {
        self.frames_parsed
    }

    /// Current scratch-ring occupancy without resetting the watermark.
    pub fn buffer_health(&self) -> BufferHealth {
        BufferHealth {
            capacity: self.ring.len(),
            used: self.used_since_check,
        }
    }

    /// Read occupancy and reset the watermark for the next window.
    pub fn health_check(&mut self) -> BufferHealth {
        let health = self.buffer_health();
        self.used_since_check = 0;
        health
    }

    /// Copy a payload into the scratch ring, returning the staged region.
    ///
    /// A payload that does not fit at the tail wraps to the ring start so
    /// the staged bytes stay contiguous.
    fn stage(&mut self, payload: &[u8]) -> Result<(usize, usize)> {
        if payload.len() > self.ring.len() {
            return Err(Error::InvalidPayload {
                event: "tag-report",
                reason: format!(
                    "payload {} bytes exceeds scratch capacity {}",
                    payload.len(),
                    self.ring.len()
                ),
            });
        }

        if self.write_pos + payload.len() > self.ring.len() {
            self.write_pos = 0;
        }
        let start = self.write_pos;
        let end = start + payload.len();
        self.ring[start..end].copy_from_slice(payload);
        self.write_pos = end;

        self.used_since_check = (self.used_since_check + payload.len()).min(self.ring.len());
        Ok((start, end))
    }

    fn decode_records(
        bytes: &[u8],
        sequence: u8,
        timestamp: DateTime<Utc>,
    ) -> Result<Vec<TagRecord>> {
        let Some((&discriminator, mut rest)) = bytes.split_first() else {
            return Err(Error::InvalidPayload {
                event: "tag-report",
                reason: "empty payload".to_string(),
            });
        };

        let mode = match discriminator {
            DISCRIMINATOR_STATUS => return Ok(Vec::new()),
            DISCRIMINATOR_COMPACT => ReportMode::Compact,
            DISCRIMINATOR_NORMAL => ReportMode::Normal,
            other => {
                return Err(Error::InvalidPayload {
                    event: "tag-report",
                    reason: format!("unknown report discriminator {other:#04X}"),
                });
            }
        };

        let mut records = Vec::new();
        while !rest.is_empty() {
            let (record, consumed) = Self::decode_record(rest, mode, sequence, timestamp)?;
            records.push(record);
            rest = &rest[consumed..];
        }
        Ok(records)
    }

    fn decode_record(
        bytes: &[u8],
        mode: ReportMode,
        sequence: u8,
        timestamp: DateTime<Utc>,
    ) -> Result<(TagRecord, usize)> {
        if bytes.len() < 2 {
            return Err(Error::InvalidPayload {
                event: "tag-report",
                reason: format!("{} bytes left, PC word needs 2", bytes.len()),
            });
        }
        let pc = u16::from_be_bytes([bytes[0], bytes[1]]);

        // EPC length comes from the PC word, in 16-bit words
        let epc_len = ((pc >> 11) & 0x1F) as usize * 2;
        if epc_len == 0 {
            return Err(Error::InvalidPayload {
                event: "tag-report",
                reason: format!("PC word {pc:#06X} declares a zero-length EPC"),
            });
        }

        let trailer_len = match mode {
            ReportMode::Compact => 1,            // RSSI
            ReportMode::Normal => 1 + 1 + 2 + 2, // RSSI + antenna + phase + wideband
        };
        let record_len = 2 + epc_len + trailer_len;
        if bytes.len() < record_len {
            return Err(Error::InvalidPayload {
                event: "tag-report",
                reason: format!(
                    "PC word declares {epc_len}-byte EPC but only {} bytes remain",
                    bytes.len()
                ),
            });
        }

        let epc = Epc::from_bytes(&bytes[2..2 + epc_len])?;
        let rssi_dbm = bytes[2 + epc_len] as i8;

        let (wideband_rssi, phase, antenna) = match mode {
            ReportMode::Compact => (None, None, None),
            ReportMode::Normal => {
                let base = 2 + epc_len + 1;
                let antenna = bytes[base];
                let phase = u16::from_be_bytes([bytes[base + 1], bytes[base + 2]]);
                let wideband = i16::from_be_bytes([bytes[base + 3], bytes[base + 4]]);
                (Some(wideband), Some(phase), Some(antenna))
            }
        };

        Ok((
            TagRecord {
                epc,
                pc,
                rssi_dbm,
                wideband_rssi,
                phase,
                antenna,
                sequence,
                timestamp,
                mode,
            },
            record_len,
        ))
    }
}

impl Default for InventoryParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Build a compact-mode record for a payload under construction.
///
/// Test and simulator helper: encodes `[PC][EPC][RSSI]` with the PC word's
/// EPC-length field set from the EPC itself.
pub fn encode_compact_record(epc: &Epc, rssi_dbm: i8) -> Vec<u8> {
    let epc_bytes = epc.to_bytes();
    let pc = pc_for_epc(&epc_bytes);
    let mut out = pc.to_be_bytes().to_vec();
    out.extend_from_slice(&epc_bytes);
    out.push(rssi_dbm as u8);
    out
}

/// Build a normal-mode record for a payload under construction.
pub fn encode_normal_record(
    epc: &Epc,
    rssi_dbm: i8,
    antenna: u8,
    phase: u16,
    wideband_rssi: i16,
) -> Vec<u8> {
    let epc_bytes = epc.to_bytes();
    let pc = pc_for_epc(&epc_bytes);
    let mut out = pc.to_be_bytes().to_vec();
    out.extend_from_slice(&epc_bytes);
    out.push(rssi_dbm as u8);
    out.push(antenna);
    out.extend_from_slice(&phase.to_be_bytes());
    out.extend_from_slice(&wideband_rssi.to_be_bytes());
    out
}

/// PC word with the EPC-length field set for the given EPC bytes.
fn pc_for_epc(epc_bytes: &[u8]) -> u16 {
    ((epc_bytes.len() / 2) as u16) << 11
}
