use crate::{
    Result,
    constants::{MAX_EPC_BYTES, MAX_Q_VALUE, MAX_TX_POWER_DBM, MIN_EPC_BYTES, MIN_TX_POWER_DBM},
    error::Error,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Electronic Product Code read from an RFID tag.
///
/// Stored as an uppercase hex string with an even number of digits. EPC
/// length is variable: the PC word on the air interface declares it in
/// 16-bit words, so valid EPCs are 2-62 bytes (4-124 hex digits).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Epc(String);

impl Epc {
    /// Create an EPC from a hex string with validation.
    ///
    /// The input is normalized (trimmed and converted to uppercase) before
    /// validation.
    ///
    /// # Errors
    /// Returns `Error::InvalidEpc` if:
    /// - The digit count is odd or outside the 2-62 byte range
    /// - The string contains non-hex characters
    pub fn new(hex: &str) -> Result<Self> {
        let hex = hex.trim().to_uppercase();

        if hex.len() % 2 != 0 {
            return Err(Error::InvalidEpc(format!(
                "EPC hex length must be even, got {}",
                hex.len()
            )));
        }

        let bytes = hex.len() / 2;
        if !(MIN_EPC_BYTES..=MAX_EPC_BYTES).contains(&bytes) {
            return Err(Error::InvalidEpc(format!(
                "EPC must be {MIN_EPC_BYTES}-{MAX_EPC_BYTES} bytes, got {bytes}"
            )));
        }

        if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(Error::InvalidEpc("EPC must be hex digits".to_string()));
        }

        Ok(Epc(hex))
    }

    /// Create an EPC from raw bytes.
    ///
    /// # Errors
    /// Returns `Error::InvalidEpc` if the byte count is outside 2-62.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if !(MIN_EPC_BYTES..=MAX_EPC_BYTES).contains(&bytes.len()) {
            return Err(Error::InvalidEpc(format!(
                "EPC must be {MIN_EPC_BYTES}-{MAX_EPC_BYTES} bytes, got {}",
                bytes.len()
            )));
        }
        let hex: String = bytes.iter().map(|b| format!("{b:02X}")).collect();
        Ok(Epc(hex))
    }

    /// Get the EPC as an uppercase hex string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Get the EPC as raw bytes.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        self.0
            .as_bytes()
            .chunks(2)
            .map(|pair| {
                let hi = (pair[0] as char).to_digit(16).unwrap_or(0) as u8;
                let lo = (pair[1] as char).to_digit(16).unwrap_or(0) as u8;
                (hi << 4) | lo
            })
            .collect()
    }

    /// EPC length in bytes.
    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.0.len() / 2
    }
}

impl fmt::Display for Epc {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for Epc {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Epc::new(s)
    }
}

/// Reader connection state.
///
/// `Connecting` exists so a failed connect can be distinguished from a
/// session that was never started; every state can fall back to
/// `Disconnected` on error or explicit disconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    /// Check if transition to the target state is valid from this state.
    pub fn can_transition_to(&self, target: &ConnectionState) -> bool {
        matches!(
            (self, target),
            (ConnectionState::Disconnected, ConnectionState::Connecting)
                | (ConnectionState::Connecting, ConnectionState::Connected)
                | (ConnectionState::Connecting, ConnectionState::Disconnected)
                | (ConnectionState::Connected, ConnectionState::Disconnected)
        )
    }

    /// Returns `true` if the reader is connected.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "Disconnected",
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Connected => "Connected",
        };
        write!(f, "{s}")
    }
}

/// Reader operating mode while connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReaderMode {
    /// No RF activity; the known-clean waypoint every transition passes
    /// through.
    Idle,

    /// Bulk tag reading.
    Inventory,

    /// Single-tag directional search with RSSI feedback.
    Locate,

    /// Barcode imager active.
    Barcode,
}

impl ReaderMode {
    /// Returns `true` for modes that produce a scan data stream.
    #[inline]
    #[must_use]
    pub fn is_scanning_mode(&self) -> bool {
        !matches!(self, ReaderMode::Idle)
    }
}

impl fmt::Display for ReaderMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            ReaderMode::Idle => "Idle",
            ReaderMode::Inventory => "Inventory",
            ReaderMode::Locate => "Locate",
            ReaderMode::Barcode => "Barcode",
        };
        write!(f, "{s}")
    }
}

/// Gen2 session flag used during inventory rounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum SessionFlag {
    S0 = 0,
    S1 = 1,
    S2 = 2,
    S3 = 3,
}

impl SessionFlag {
    /// Create a session flag from a u8 value.
    ///
    /// # Errors
    /// Returns `Error::Config` if the value is not 0-3.
    #[inline]
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(SessionFlag::S0),
            1 => Ok(SessionFlag::S1),
            2 => Ok(SessionFlag::S2),
            3 => Ok(SessionFlag::S3),
            _ => Err(Error::Config(format!("invalid session flag: {value}"))),
        }
    }

    #[inline]
    #[must_use]
    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

/// Inventoried-flag target for Gen2 query rounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum Target {
    A = 0,
    B = 1,
}

impl Target {
    /// Create a target from a u8 value.
    ///
    /// # Errors
    /// Returns `Error::Config` if the value is not 0 or 1.
    #[inline]
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Target::A),
            1 => Ok(Target::B),
            _ => Err(Error::Config(format!("invalid target: {value}"))),
        }
    }

    #[inline]
    #[must_use]
    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

/// Radio and anti-collision settings applied when entering a mode.
///
/// The locate mask is only consulted in locate mode; inventory ignores it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReaderSettings {
    /// Gen2 session flag.
    pub session: SessionFlag,

    /// Inventoried-flag target.
    pub target: Target,

    /// Starting Q value for the anti-collision algorithm (0-15).
    pub q: u8,

    /// Antenna transmit power in dBm.
    pub power_dbm: u8,

    /// Target EPC mask for locate mode.
    pub locate_mask: Option<Epc>,
}

impl ReaderSettings {
    /// Validate settings against protocol limits.
    ///
    /// # Errors
    /// Returns `Error::Config` if Q or power is out of range.
    pub fn validate(&self) -> Result<()> {
        if self.q > MAX_Q_VALUE {
            return Err(Error::Config(format!(
                "Q must be 0-{MAX_Q_VALUE}, got {}",
                self.q
            )));
        }
        if !(MIN_TX_POWER_DBM..=MAX_TX_POWER_DBM).contains(&self.power_dbm) {
            return Err(Error::Config(format!(
                "power must be {MIN_TX_POWER_DBM}-{MAX_TX_POWER_DBM} dBm, got {}",
                self.power_dbm
            )));
        }
        Ok(())
    }
}

impl Default for ReaderSettings {
    fn default() -> Self {
        Self {
            session: SessionFlag::S0,
            target: Target::A,
            q: 4,
            power_dbm: 26,
            locate_mask: None,
        }
    }
}
