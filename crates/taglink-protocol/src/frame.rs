use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;
use taglink_core::{Error, Result, constants::*};

/// Frame represents the byte-level wire format exchanged with the reader.
///
/// # Wire Format
///
/// ```text
/// [2B prefix][1B length][1B module][1B reserve][1B direction][2B event code][payload][2B CRC]
///  A5 5A      n+2        module     seq         dir           big-endian     n bytes  big-endian
/// ```
///
/// The length byte covers the event code and payload, so the invariant is
/// `payload.len() == length - 2`. The CRC is CRC-16/CCITT-FALSE computed
/// over every byte after the prefix, up to and excluding the CRC itself.
///
/// The reserve byte carries the sequence number: for commands and responses
/// it correlates a command with its eventual response; for tag notifications
/// it is a wrapping counter the reader increments per report.
///
/// # Basic Usage
///
/// ```
/// use taglink_protocol::Frame;
/// use taglink_core::constants::{DIR_COMMAND, MODULE_SYSTEM};
///
/// let frame = Frame::new(MODULE_SYSTEM, 7, DIR_COMMAND, 0x0002, &[]).unwrap();
/// let wire = frame.encode();
///
/// let decoded = Frame::decode(&wire).unwrap();
/// assert_eq!(decoded.event_code, 0x0002);
/// assert_eq!(decoded.reserve, 7);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Hardware module the frame addresses.
    pub module: u8,

    /// Sequence/reserve byte.
    pub reserve: u8,

    /// Direction flag: command, response, or notification.
    pub direction: u8,

    /// Big-endian event code.
    pub event_code: u16,

    /// Payload bytes, excluding the event code.
    payload: Bytes,
}

/// CRC-16/CCITT-FALSE: polynomial 0x1021, initial value 0xFFFF, no
/// reflection, no final XOR.
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &byte in data {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            if crc & 0x8000 != 0 {
                crc = (crc << 1) ^ 0x1021;
            } else {
                crc <<= 1;
            }
        }
    }
    crc
}

impl Frame {
    /// Create a new frame with validation.
    ///
    /// # Errors
    /// Returns `Error::FrameTooLarge` if the payload exceeds what the
    /// single-byte length field can declare.
    pub fn new(
        module: u8,
        reserve: u8,
        direction: u8,
        event_code: u16,
        payload: &[u8],
    ) -> Result<Self> {
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(Error::FrameTooLarge {
                size: payload.len(),
                max_size: MAX_PAYLOAD_LEN,
            });
        }
        Ok(Frame {
            module,
            reserve,
            direction,
            event_code,
            payload: Bytes::copy_from_slice(payload),
        })
    }

    /// Get the payload bytes.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Consume the frame, returning the payload.
    pub fn into_payload(self) -> Bytes {
        self.payload
    }

    /// Value of the declared-length field: event code plus payload bytes.
    pub fn declared_len(&self) -> u8 {
        (self.payload.len() + EVENT_CODE_LEN) as u8
    }

    /// Total size of the encoded frame on the wire.
    pub fn wire_len(&self) -> usize {
        self.payload.len() + FRAME_OVERHEAD
    }

    /// Returns `true` if this is a host-to-reader command frame.
    #[inline]
    pub fn is_command(&self) -> bool {
        self.direction == DIR_COMMAND
    }

    /// Returns `true` if this is a reader response to a command.
    #[inline]
    pub fn is_response(&self) -> bool {
        self.direction == DIR_RESPONSE
    }

    /// Returns `true` if this is an unsolicited notification.
    #[inline]
    pub fn is_notification(&self) -> bool {
        self.direction == DIR_NOTIFICATION
    }

    /// Status byte of a response frame.
    ///
    /// Responses carry their status as the first payload byte; returns
    /// `None` for non-response frames or empty payloads.
    pub fn status(&self) -> Option<u8> {
        if self.is_response() {
            self.payload.first().copied()
        } else {
            None
        }
    }

    /// Encode the frame to its full wire representation, CRC included.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.wire_len());
        buf.put_slice(&FRAME_PREFIX);
        buf.put_u8(self.declared_len());
        buf.put_u8(self.module);
        buf.put_u8(self.reserve);
        buf.put_u8(self.direction);
        buf.put_u16(self.event_code);
        buf.put_slice(&self.payload);

        // CRC over everything after the prefix
        let crc = crc16(&buf[FRAME_PREFIX.len()..]);
        buf.put_u16(crc);
        buf.freeze()
    }

    /// Decode a complete frame from wire bytes.
    ///
    /// The slice must contain exactly one frame: prefix through CRC.
    ///
    /// # Errors
    /// - `Error::MalformedFrame` if the prefix, declared length, or overall
    ///   size is wrong
    /// - `Error::ChecksumMismatch` if the CRC does not match
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < FRAME_OVERHEAD {
            return Err(Error::MalformedFrame(format!(
                "frame needs at least {FRAME_OVERHEAD} bytes, got {}",
                bytes.len()
            )));
        }
        if bytes[..2] != FRAME_PREFIX {
            return Err(Error::MalformedFrame(format!(
                "bad prefix: {:02X} {:02X}",
                bytes[0], bytes[1]
            )));
        }

        let declared = bytes[2] as usize;
        if declared < EVENT_CODE_LEN {
            return Err(Error::MalformedFrame(format!(
                "declared length {declared} below event code size"
            )));
        }
        let expected_total = declared + FRAME_OVERHEAD - EVENT_CODE_LEN;
        if bytes.len() != expected_total {
            return Err(Error::MalformedFrame(format!(
                "declared length {declared} implies {expected_total} bytes, got {}",
                bytes.len()
            )));
        }

        let crc_offset = bytes.len() - FRAME_CRC_LEN;
        let actual = u16::from_be_bytes([bytes[crc_offset], bytes[crc_offset + 1]]);
        let expected = crc16(&bytes[FRAME_PREFIX.len()..crc_offset]);
        if expected != actual {
            return Err(Error::ChecksumMismatch { expected, actual });
        }

        let event_code = u16::from_be_bytes([bytes[6], bytes[7]]);
        Ok(Frame {
            module: bytes[3],
            reserve: bytes[4],
            direction: bytes[5],
            event_code,
            payload: Bytes::copy_from_slice(&bytes[FRAME_HEADER_LEN..crc_offset]),
        })
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dir = match self.direction {
            DIR_COMMAND => "cmd",
            DIR_RESPONSE => "rsp",
            DIR_NOTIFICATION => "ntf",
            other => return write!(f, "Frame[dir={other:#04X}?]"),
        };
        write!(
            f,
            "Frame[{dir} event={:#06X} seq={} module={:#04X} payload={}B]",
            self.event_code,
            self.reserve,
            self.module,
            self.payload.len()
        )
    }
}
