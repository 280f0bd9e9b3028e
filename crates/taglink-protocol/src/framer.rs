//! Stateful frame reassembly for fragment-prone transports.
//!
//! Wireless transports deliver frames in arbitrary fragments: a single
//! inbound chunk may carry part of a frame, exactly one frame, several
//! frames, or garbage. The [`FrameAssembler`] accumulates chunks and yields
//! complete frames, owning the two recovery paths the wire format needs:
//!
//! - **Resynchronization**: if a chunk arrives that is itself a complete,
//!   CRC-valid frame while a partial frame is pending, the partial is a
//!   casualty of lost fragments. It is discarded and parsing restarts at the
//!   new frame. This is designed recovery, not an error.
//! - **Fragment timeout**: a partial frame pending longer than the timeout
//!   with no further bytes is discarded on the next ingest or tick.
//!
//! Checksum failures are reported per frame and never corrupt parsing of
//! subsequent frames.
//!
//! # Usage
//!
//! ```
//! use taglink_protocol::{Frame, FrameAssembler};
//! use taglink_core::constants::{DIR_COMMAND, MODULE_SYSTEM};
//!
//! let frame = Frame::new(MODULE_SYSTEM, 1, DIR_COMMAND, 0x0001, &[]).unwrap();
//! let wire = frame.encode();
//!
//! let mut assembler = FrameAssembler::new();
//! // Feed the frame in two fragments
//! assert!(assembler.ingest(&wire[..4]).is_empty());
//! let completed = assembler.ingest(&wire[4..]);
//! assert_eq!(completed.len(), 1);
//! ```

use bytes::BytesMut;
use std::time::{Duration, Instant};
use taglink_core::{
    Error, Result,
    constants::{
        DEFAULT_FRAGMENT_TIMEOUT_MS, EVENT_CODE_LEN, FRAME_HEADER_LEN, FRAME_OVERHEAD,
        FRAME_PREFIX,
    },
};
use tracing::{debug, trace};

use crate::frame::Frame;

/// Initial capacity for the accumulation buffer.
///
/// Sized for a handful of maximum-length frames so typical traffic never
/// reallocates. The buffer stays bounded without an explicit cap: the
/// length-bounded wire format caps a partial frame at 263 bytes and garbage
/// is dropped during the prefix scan.
const INITIAL_BUFFER_CAPACITY: usize = 1024;

/// Stateful reassembler turning transport fragments into complete frames.
///
/// At most one partial frame is in flight at a time; its arrival time is
/// tracked for the fragment timeout. The assembler makes no MTU assumptions
/// and reassembles regardless of fragment size.
#[derive(Debug)]
pub struct FrameAssembler {
    /// Accumulated bytes not yet consumed by a complete frame.
    buffer: BytesMut,

    /// When the pending partial frame last received bytes.
    partial_since: Option<Instant>,

    /// Fragment reassembly timeout.
    fragment_timeout: Duration,
}

impl FrameAssembler {
    /// Create an assembler with the default fragment timeout.
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_millis(DEFAULT_FRAGMENT_TIMEOUT_MS))
    }

    /// Create an assembler with a custom fragment timeout.
    pub fn with_timeout(fragment_timeout: Duration) -> Self {
        Self {
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            partial_since: None,
            fragment_timeout,
        }
    }

    /// Feed transport bytes and collect completed frames.
    ///
    /// Returns zero or more results per call: `Ok(Frame)` for each completed
    /// frame, `Err` for frames that failed checksum or length validation.
    /// An empty vector means the assembler is waiting for more bytes.
    pub fn ingest(&mut self, bytes: &[u8]) -> Vec<Result<Frame>> {
        self.ingest_at(bytes, Instant::now())
    }

    /// [`ingest`](Self::ingest) with an explicit clock, for deterministic
    /// timeout tests.
    pub fn ingest_at(&mut self, bytes: &[u8], now: Instant) -> Vec<Result<Frame>> {
        self.expire_stale_partial(now);

        // Resynchronization: a chunk that is itself a complete valid frame
        // while a partial is pending means the partial's tail was lost.
        if !self.buffer.is_empty() && Self::begins_with_complete_frame(bytes) {
            debug!(
                dropped = self.buffer.len(),
                "new frame header while partial pending, dropping orphaned partial"
            );
            self.buffer.clear();
        }

        self.buffer.extend_from_slice(bytes);

        let mut out = Vec::new();
        self.drain(&mut out);

        // The timeout clock restarts whenever the partial makes progress.
        self.partial_since = if self.buffer.is_empty() {
            None
        } else {
            Some(now)
        };

        out
    }

    /// Apply the fragment timeout without feeding bytes.
    ///
    /// Hosts without a steady byte stream call this periodically so a stale
    /// partial does not linger until the next chunk arrives.
    pub fn tick(&mut self) {
        self.tick_at(Instant::now());
    }

    /// [`tick`](Self::tick) with an explicit clock.
    pub fn tick_at(&mut self, now: Instant) {
        self.expire_stale_partial(now);
    }

    /// Returns `true` while a partial frame is pending.
    pub fn has_partial(&self) -> bool {
        !self.buffer.is_empty()
    }

    /// Bytes currently held for the pending partial frame.
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }

    /// Discard all buffered bytes and reset.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.partial_since = None;
    }

    fn expire_stale_partial(&mut self, now: Instant) {
        if let Some(since) = self.partial_since
            && now.duration_since(since) > self.fragment_timeout
        {
            debug!(
                dropped = self.buffer.len(),
                elapsed_ms = now.duration_since(since).as_millis() as u64,
                "discarding partial frame past fragment timeout"
            );
            self.buffer.clear();
            self.partial_since = None;
        }
    }

    /// Check whether a chunk starts with a complete, CRC-valid frame.
    ///
    /// The CRC check is what makes resynchronization safe: payload bytes may
    /// coincidentally contain the prefix, but will virtually never also
    /// carry a matching checksum at the declared length.
    fn begins_with_complete_frame(bytes: &[u8]) -> bool {
        if bytes.len() < FRAME_OVERHEAD || bytes[..2] != FRAME_PREFIX {
            return false;
        }
        let declared = bytes[2] as usize;
        if declared < EVENT_CODE_LEN {
            return false;
        }
        let total = declared + FRAME_OVERHEAD - EVENT_CODE_LEN;
        if bytes.len() < total {
            return false;
        }
        Frame::decode(&bytes[..total]).is_ok()
    }

    /// Extract every complete frame currently in the buffer.
    fn drain(&mut self, out: &mut Vec<Result<Frame>>) {
        loop {
            self.align_to_prefix();

            if self.buffer.len() < FRAME_HEADER_LEN {
                return;
            }

            let declared = self.buffer[2] as usize;
            if declared < EVENT_CODE_LEN {
                out.push(Err(Error::MalformedFrame(format!(
                    "declared length {declared} below event code size"
                ))));
                // Skip this prefix and rescan; the stream may recover at the
                // next header.
                let _ = self.buffer.split_to(FRAME_PREFIX.len());
                continue;
            }

            let total = declared + FRAME_OVERHEAD - EVENT_CODE_LEN;
            if self.buffer.len() < total {
                return;
            }

            let raw = self.buffer.split_to(total);
            out.push(Frame::decode(&raw));
        }
    }

    /// Drop bytes preceding the next frame prefix.
    ///
    /// A trailing prefix first-byte is retained: it may be a prefix split
    /// across chunks.
    fn align_to_prefix(&mut self) {
        let mut idx = 0;
        while idx < self.buffer.len() {
            if self.buffer[idx] == FRAME_PREFIX[0]
                && (idx + 1 == self.buffer.len() || self.buffer[idx + 1] == FRAME_PREFIX[1])
            {
                break;
            }
            idx += 1;
        }
        if idx > 0 {
            trace!(dropped = idx, "discarded garbage before frame prefix");
            let _ = self.buffer.split_to(idx);
        }
    }
}

impl Default for FrameAssembler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taglink_core::constants::{DIR_NOTIFICATION, MODULE_RFID};

    fn make_frame(seq: u8, payload: &[u8]) -> Frame {
        Frame::new(MODULE_RFID, seq, DIR_NOTIFICATION, 0x8001, payload).unwrap()
    }

    fn collect_ok(results: Vec<Result<Frame>>) -> Vec<Frame> {
        results.into_iter().map(|r| r.unwrap()).collect()
    }

    #[test]
    fn test_complete_frame_single_chunk() {
        let mut assembler = FrameAssembler::new();
        let frame = make_frame(1, &[0xDE, 0xAD]);

        let frames = collect_ok(assembler.ingest(&frame.encode()));
        assert_eq!(frames, vec![frame]);
        assert!(!assembler.has_partial());
    }

    #[test]
    fn test_frame_split_across_chunks() {
        let mut assembler = FrameAssembler::new();
        let frame = make_frame(2, &[1, 2, 3, 4, 5]);
        let wire = frame.encode();

        assert!(assembler.ingest(&wire[..3]).is_empty());
        assert!(assembler.has_partial());
        assert!(assembler.ingest(&wire[3..9]).is_empty());

        let frames = collect_ok(assembler.ingest(&wire[9..]));
        assert_eq!(frames, vec![frame]);
        assert!(!assembler.has_partial());
    }

    #[test]
    fn test_byte_by_byte_feeding() {
        let mut assembler = FrameAssembler::new();
        let frame = make_frame(3, &[0xAA; 16]);
        let wire = frame.encode();

        let mut frames = Vec::new();
        for &byte in wire.iter() {
            frames.extend(collect_ok(assembler.ingest(&[byte])));
        }

        assert_eq!(frames, vec![frame]);
    }

    #[test]
    fn test_multiple_frames_one_chunk() {
        let mut assembler = FrameAssembler::new();
        let a = make_frame(1, &[1]);
        let b = make_frame(2, &[2]);

        let mut wire = a.encode().to_vec();
        wire.extend_from_slice(&b.encode());

        let frames = collect_ok(assembler.ingest(&wire));
        assert_eq!(frames, vec![a, b]);
    }

    #[test]
    fn test_garbage_before_prefix_discarded() {
        let mut assembler = FrameAssembler::new();
        let frame = make_frame(4, &[9]);

        let mut wire = vec![0x00, 0x13, 0x37, 0xFF];
        wire.extend_from_slice(&frame.encode());

        let frames = collect_ok(assembler.ingest(&wire));
        assert_eq!(frames, vec![frame]);
    }

    #[test]
    fn test_prefix_split_across_chunks() {
        let mut assembler = FrameAssembler::new();
        let frame = make_frame(5, &[7, 7]);
        let wire = frame.encode();

        // Lone 0xA5 must be retained as a possible prefix start
        assert!(assembler.ingest(&wire[..1]).is_empty());
        let frames = collect_ok(assembler.ingest(&wire[1..]));
        assert_eq!(frames, vec![frame]);
    }

    #[test]
    fn test_checksum_error_does_not_corrupt_stream() {
        let mut assembler = FrameAssembler::new();
        let bad = make_frame(1, &[1, 2, 3]);
        let good = make_frame(2, &[4, 5, 6]);

        let mut wire = bad.encode().to_vec();
        let corrupt_at = wire.len() - 1;
        wire[corrupt_at] ^= 0xFF;
        wire.extend_from_slice(&good.encode());

        let results = assembler.ingest(&wire);
        assert_eq!(results.len(), 2);
        assert!(matches!(results[0], Err(Error::ChecksumMismatch { .. })));
        assert_eq!(results[1].as_ref().unwrap(), &good);
    }

    #[test]
    fn test_resync_discards_orphaned_partial() {
        let mut assembler = FrameAssembler::new();
        let orphan = make_frame(1, &[0x11; 20]);
        let fresh = make_frame(2, &[0x22; 4]);

        // Partial frame whose tail never arrives
        let orphan_wire = orphan.encode();
        assert!(assembler.ingest(&orphan_wire[..10]).is_empty());
        assert!(assembler.has_partial());

        // A complete frame arrives: exactly one frame out, no error
        let results = assembler.ingest(&fresh.encode());
        let frames = collect_ok(results);
        assert_eq!(frames, vec![fresh]);
        assert!(!assembler.has_partial());
    }

    #[test]
    fn test_timeout_discards_partial() {
        let mut assembler =
            FrameAssembler::with_timeout(Duration::from_millis(DEFAULT_FRAGMENT_TIMEOUT_MS));
        let orphan = make_frame(1, &[0x33; 8]);
        let fresh = make_frame(2, &[0x44]);

        let start = Instant::now();
        let orphan_wire = orphan.encode();
        assert!(assembler.ingest_at(&orphan_wire[..6], start).is_empty());

        // Past the timeout the partial is dropped, never merged
        let later = start + Duration::from_millis(DEFAULT_FRAGMENT_TIMEOUT_MS + 1);
        let frames = collect_ok(assembler.ingest_at(&fresh.encode(), later));
        assert_eq!(frames, vec![fresh]);
    }

    #[test]
    fn test_timeout_clock_restarts_on_progress() {
        let mut assembler = FrameAssembler::with_timeout(Duration::from_millis(200));
        let frame = make_frame(1, &[0x55; 12]);
        let wire = frame.encode();

        let t0 = Instant::now();
        assert!(assembler.ingest_at(&wire[..5], t0).is_empty());

        // More bytes arrive before the timeout: clock restarts
        let t1 = t0 + Duration::from_millis(150);
        assert!(assembler.ingest_at(&wire[5..10], t1).is_empty());

        // 150ms later again: still within timeout of the last progress
        let t2 = t1 + Duration::from_millis(150);
        let frames = collect_ok(assembler.ingest_at(&wire[10..], t2));
        assert_eq!(frames, vec![frame]);
    }

    #[test]
    fn test_tick_expires_partial() {
        let mut assembler = FrameAssembler::with_timeout(Duration::from_millis(200));
        let frame = make_frame(1, &[0x66; 8]);

        let t0 = Instant::now();
        let wire = frame.encode();
        assert!(assembler.ingest_at(&wire[..4], t0).is_empty());
        assert!(assembler.has_partial());

        assembler.tick_at(t0 + Duration::from_millis(201));
        assert!(!assembler.has_partial());
    }

    #[test]
    fn test_prefix_bytes_inside_payload() {
        let mut assembler = FrameAssembler::new();
        // Payload deliberately contains the frame prefix
        let frame = make_frame(6, &[0xA5, 0x5A, 0xA5, 0x5A, 0x01]);
        let wire = frame.encode();

        // Split right before the embedded prefix: the continuation chunk
        // starts with what looks like a header but fails the
        // complete-frame gate, so it is treated as payload
        let frames = collect_ok(assembler.ingest(&wire[..8]));
        assert!(frames.is_empty());
        let frames = collect_ok(assembler.ingest(&wire[8..]));
        assert_eq!(frames, vec![frame]);
    }

    #[test]
    fn test_garbage_flood_stays_bounded() {
        let mut assembler = FrameAssembler::new();

        // A stream that lost framing entirely: prefix-free filler is
        // discarded instead of accumulating
        for _ in 0..20 {
            assert!(assembler.ingest(&[0x42; 512]).is_empty());
            assert_eq!(assembler.pending_len(), 0);
        }

        let frame = make_frame(7, &[1, 2]);
        let frames = collect_ok(assembler.ingest(&frame.encode()));
        assert_eq!(frames, vec![frame]);
    }

    #[test]
    fn test_clear_resets_state() {
        let mut assembler = FrameAssembler::new();
        let frame = make_frame(8, &[9; 4]);
        let wire = frame.encode();

        assembler.ingest(&wire[..5]);
        assert!(assembler.has_partial());

        assembler.clear();
        assert!(!assembler.has_partial());
        assert_eq!(assembler.pending_len(), 0);

        let frames = collect_ok(assembler.ingest(&wire));
        assert_eq!(frames, vec![frame]);
    }

    #[test]
    fn test_empty_ingest_is_noop() {
        let mut assembler = FrameAssembler::new();
        assert!(assembler.ingest(&[]).is_empty());
        assert!(!assembler.has_partial());
    }
}
