//! Tokio codec adapter for byte-stream transports.
//!
//! The engine's own transports deliver discrete chunks straight into the
//! [`FrameAssembler`]. Readers bridged over a byte stream (TCP debug rigs,
//! serial adapters) instead use this codec with Tokio's `Framed` wrapper:
//!
//! ```text
//! byte stream -> Decoder -> Frame
//! Frame -> Encoder -> byte stream
//! ```
//!
//! The codec is a thin layer over the assembler: buffering, partial-frame
//! state, and resynchronization all live there.

use bytes::BytesMut;
use std::collections::VecDeque;
use tokio_util::codec::{Decoder, Encoder};

use crate::{frame::Frame, framer::FrameAssembler};
use taglink_core::{Error, Result};

/// Tokio codec for reader protocol frames.
///
/// # Example
///
/// ```
/// use bytes::BytesMut;
/// use tokio_util::codec::Decoder;
/// use taglink_protocol::{EventCode, FrameBuilder, ReaderCodec};
///
/// let wire = FrameBuilder::command(EventCode::GetBattery).encode().unwrap();
///
/// let mut codec = ReaderCodec::new();
/// let mut buffer = BytesMut::from(&wire[..]);
/// let frame = codec.decode(&mut buffer).unwrap().unwrap();
/// assert_eq!(frame.event_code, EventCode::GetBattery.to_u16());
/// ```
#[derive(Debug)]
pub struct ReaderCodec {
    assembler: FrameAssembler,

    /// Frames already completed but not yet handed to the caller.
    ready: VecDeque<Result<Frame>>,
}

impl ReaderCodec {
    /// Create a codec with a fresh assembler.
    pub fn new() -> Self {
        Self {
            assembler: FrameAssembler::new(),
            ready: VecDeque::new(),
        }
    }
}

impl Default for ReaderCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for ReaderCodec {
    type Item = Frame;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if !src.is_empty() {
            self.ready.extend(self.assembler.ingest(src));
            src.clear();
        }

        match self.ready.pop_front() {
            Some(Ok(frame)) => Ok(Some(frame)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }
}

impl Encoder<Frame> for ReaderCodec {
    type Error = Error;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<()> {
        // Frame construction already bounds the payload, so encoding is
        // infallible; the Result is the Encoder contract.
        dst.extend_from_slice(&item.encode());
        Ok(())
    }
}
