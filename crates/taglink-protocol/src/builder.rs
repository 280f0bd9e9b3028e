use bytes::Bytes;
use taglink_core::{
    Result,
    constants::{DIR_COMMAND, DIR_NOTIFICATION, DIR_RESPONSE},
};

use crate::{events::EventCode, frame::Frame};

/// Builder for constructing protocol frames with a fluent API.
///
/// The module byte is derived from the event code; the direction comes from
/// the chosen constructor. Commands default to sequence 0 until the caller
/// assigns one.
///
/// # Example
/// ```
/// use taglink_protocol::{EventCode, FrameBuilder};
///
/// let frame = FrameBuilder::command(EventCode::SetPower)
///     .sequence(3)
///     .payload(vec![26])
///     .build()
///     .unwrap();
///
/// assert!(frame.is_command());
/// assert_eq!(frame.reserve, 3);
/// ```
pub struct FrameBuilder {
    event: EventCode,
    direction: u8,
    sequence: u8,
    payload: Vec<u8>,
}

impl FrameBuilder {
    /// Start a host-to-reader command frame.
    pub fn command(event: EventCode) -> Self {
        Self::with_direction(event, DIR_COMMAND)
    }

    /// Start a reader-to-host response frame.
    ///
    /// Used by tests and reader simulators; real responses come off the
    /// wire.
    pub fn response(event: EventCode) -> Self {
        Self::with_direction(event, DIR_RESPONSE)
    }

    /// Start an unsolicited notification frame.
    pub fn notification(event: EventCode) -> Self {
        Self::with_direction(event, DIR_NOTIFICATION)
    }

    fn with_direction(event: EventCode, direction: u8) -> Self {
        Self {
            event,
            direction,
            sequence: 0,
            payload: Vec::new(),
        }
    }

    /// Set the sequence/reserve byte.
    pub fn sequence(mut self, sequence: u8) -> Self {
        self.sequence = sequence;
        self
    }

    /// Set the payload bytes.
    pub fn payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.payload = payload.into();
        self
    }

    /// Append a single payload byte.
    pub fn payload_byte(mut self, byte: u8) -> Self {
        self.payload.push(byte);
        self
    }

    /// Build the frame.
    ///
    /// # Errors
    /// Returns `Error::FrameTooLarge` if the payload exceeds the wire limit.
    pub fn build(self) -> Result<Frame> {
        Frame::new(
            self.event.module(),
            self.sequence,
            self.direction,
            self.event.to_u16(),
            &self.payload,
        )
    }

    /// Build and encode to wire bytes in one step.
    pub fn encode(self) -> Result<Bytes> {
        Ok(self.build()?.encode())
    }
}

/// Build the response frame a reader sends for a command.
///
/// Test and simulator helper: the response reuses the command's event code,
/// echoes its sequence byte, and leads the payload with the status byte.
pub fn status_response(event: EventCode, sequence: u8, status: u8) -> Frame {
    FrameBuilder::response(event)
        .sequence(sequence)
        .payload_byte(status)
        .build()
        .expect("single status byte always fits a frame")
}

#[cfg(test)]
mod tests {
    use super::*;
    use taglink_core::constants::{MODULE_RFID, MODULE_SYSTEM, STATUS_OK};

    #[test]
    fn test_command_frame() {
        let frame = FrameBuilder::command(EventCode::StartInventory)
            .sequence(7)
            .build()
            .unwrap();

        assert!(frame.is_command());
        assert_eq!(frame.event_code, EventCode::StartInventory.to_u16());
        assert_eq!(frame.module, MODULE_RFID);
        assert_eq!(frame.reserve, 7);
        assert!(frame.payload().is_empty());
    }

    #[test]
    fn test_module_follows_event() {
        let frame = FrameBuilder::command(EventCode::GetBattery).build().unwrap();
        assert_eq!(frame.module, MODULE_SYSTEM);
    }

    #[test]
    fn test_payload_byte_appends() {
        let frame = FrameBuilder::command(EventCode::SetInventoryParams)
            .payload(vec![1, 2])
            .payload_byte(3)
            .build()
            .unwrap();

        assert_eq!(frame.payload(), &[1, 2, 3]);
    }

    #[test]
    fn test_encode_round_trips() {
        let wire = FrameBuilder::notification(EventCode::TagReport)
            .sequence(42)
            .payload(vec![0x01])
            .encode()
            .unwrap();

        let frame = Frame::decode(&wire).unwrap();
        assert!(frame.is_notification());
        assert_eq!(frame.reserve, 42);
    }

    #[test]
    fn test_status_response_shape() {
        let response = status_response(EventCode::SetIdle, 5, STATUS_OK);

        assert!(response.is_response());
        assert_eq!(response.reserve, 5);
        assert_eq!(response.status(), Some(STATUS_OK));
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let result = FrameBuilder::command(EventCode::SetLocateMask)
            .payload(vec![0u8; 300])
            .build();
        assert!(result.is_err());
    }
}
