use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Frame errors
    #[error("checksum mismatch: expected {expected:#06X}, got {actual:#06X}")]
    ChecksumMismatch { expected: u16, actual: u16 },

    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    #[error("frame too large: {size} bytes (max {max_size})")]
    FrameTooLarge { size: usize, max_size: usize },

    // Parse errors
    #[error("invalid payload for {event}: {reason}")]
    InvalidPayload { event: &'static str, reason: String },

    #[error("unknown event code: {code:#06X}")]
    UnknownEventCode { code: u16 },

    #[error("invalid EPC: {0}")]
    InvalidEpc(String),

    // Command errors
    #[error("no response for {event} within {timeout_ms}ms")]
    ResponseTimeout { event: &'static str, timeout_ms: u64 },

    #[error("reader rejected {event}: status {status:#04X}")]
    CommandRejected { event: &'static str, status: u8 },

    #[error("command sequence cancelled")]
    SequenceCancelled,

    // Protocol-state errors
    #[error("no active reader session")]
    NoSession,

    #[error("a reader session is already active")]
    SessionActive,

    #[error("reader is not connected")]
    NotConnected,

    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    // Transport errors
    #[error("transport error: {0}")]
    Transport(String),

    #[error("transport channel closed")]
    ChannelClosed,

    // Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns `true` for errors that are fatal to the current session.
    ///
    /// Frame and parse errors are recovered locally; transport loss forces
    /// session teardown.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Transport(_) | Error::ChannelClosed)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
