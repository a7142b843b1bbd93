//! Error types for the kettle session protocol
//!
//! Codec and handshake failures have their own enums so pure code can return
//! narrow errors; [`KettleError`] unifies them with transport and command
//! failures for the session layer.

use thiserror::Error;
use uuid::Uuid;

// ----------------------------------------------------------------------------
// Specific Error Types
// ----------------------------------------------------------------------------

/// Malformed codec input
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("Invalid length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("Status frame too short: need at least {min} bytes, got {actual}")]
    ShortFrame { min: usize, actual: usize },

    #[error("Mode segment index {index} out of range (0..{count})")]
    SegmentOutOfRange { index: usize, count: usize },
}

/// Violations of the login handshake
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandshakeError {
    #[error("Protocol mismatch on {characteristic}: expected {expected}, got [{actual}]")]
    ProtocolMismatch {
        characteristic: Uuid,
        expected: String,
        actual: String,
    },

    #[error("Device token verification failed")]
    AuthFailed,

    #[error("Device random value missing from notifications")]
    MissingRandom,

    #[error("Device random value already recorded for this login attempt")]
    RandomAlreadySet,

    #[error("Session keys requested before key derivation")]
    KeysNotDerived,

    #[error("Key derivation failed")]
    KeyDerivation,
}

impl HandshakeError {
    /// Build a protocol mismatch from the expected frame and the frames received
    pub fn mismatch(characteristic: Uuid, expected: &[u8], received: &[Vec<u8>]) -> Self {
        Self::ProtocolMismatch {
            characteristic,
            expected: hex::encode(expected),
            actual: hex_frames(received),
        }
    }
}

// ----------------------------------------------------------------------------
// Main Error Type
// ----------------------------------------------------------------------------

/// Errors surfaced by the kettle session
#[derive(Debug, Error)]
pub enum KettleError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Required service not found: {service}")]
    ServiceNotFound { service: Uuid },

    #[error("Required characteristic not found: {characteristic}")]
    CharacteristicNotFound { characteristic: Uuid },

    #[error("Handshake error: {0}")]
    Handshake(#[from] HandshakeError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Unexpected response on {characteristic}: expected {expected}, got [{received}]")]
    UnexpectedResponse {
        characteristic: Uuid,
        expected: String,
        received: String,
    },

    #[error("{kind} temperature {value} outside {min}..={max}")]
    InvalidSetpoint {
        kind: &'static str,
        value: i64,
        min: u8,
        max: u8,
    },

    #[error("Invalid configuration: {reason}")]
    InvalidConfiguration { reason: String },

    #[error("Unknown action: {name}")]
    UnknownAction { name: String },

    #[error("Unsupported device model: {name}")]
    UnsupportedModel { name: String },

    #[error("Session is not authenticated")]
    NotAuthenticated,

    #[error("No status has been received from the device yet")]
    StatusUnavailable,
}

impl KettleError {
    /// Build an unexpected-response error from the expected ack and the frames received
    pub fn unexpected_response(
        characteristic: Uuid,
        expected: &[u8],
        received: &[Vec<u8>],
    ) -> Self {
        Self::UnexpectedResponse {
            characteristic,
            expected: hex::encode(expected),
            received: hex_frames(received),
        }
    }

    /// Device firmware does not expose the expected GATT profile
    pub fn is_firmware_mismatch(&self) -> bool {
        matches!(
            self,
            KettleError::ServiceNotFound { .. } | KettleError::CharacteristicNotFound { .. }
        )
    }

    /// Errors after which the link must be torn down and re-established
    pub fn breaks_session(&self) -> bool {
        matches!(
            self,
            KettleError::Transport(_)
                | KettleError::ServiceNotFound { .. }
                | KettleError::CharacteristicNotFound { .. }
                | KettleError::Handshake(_)
        )
    }

    /// Status problems that skip one poll cycle without counting as a failure
    pub fn skips_cycle(&self) -> bool {
        matches!(
            self,
            KettleError::StatusUnavailable | KettleError::Codec(CodecError::ShortFrame { .. })
        )
    }
}

/// Result type for kettle operations
pub type Result<T> = core::result::Result<T, KettleError>;

fn hex_frames(frames: &[Vec<u8>]) -> String {
    frames.iter().map(hex::encode).collect::<Vec<_>>().join(", ")
}
