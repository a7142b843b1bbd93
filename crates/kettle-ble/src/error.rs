//! Error types for the BLE link

use kettle_core::KettleError;
use thiserror::Error;
use uuid::Uuid;

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

/// Errors raised by a [`KettleLink`](crate::link::KettleLink)
#[derive(Error, Debug)]
pub enum LinkError {
    #[error("BLE error: {0}")]
    Ble(#[from] btleplug::Error),

    #[error("BLE adapter not available")]
    AdapterNotAvailable,

    #[error("Invalid device address: {0}")]
    InvalidAddress(String),

    #[error("Device {address} not found on any adapter")]
    DeviceNotFound { address: String },

    #[error("Connection timeout")]
    ConnectionTimeout,

    #[error("Device not connected")]
    NotConnected,

    #[error("Characteristic not found: {0}")]
    CharacteristicNotFound(Uuid),

    #[error("Failed to get notifications stream: {0}")]
    NotificationStreamFailed(String),
}

impl From<LinkError> for KettleError {
    fn from(err: LinkError) -> Self {
        match err {
            LinkError::CharacteristicNotFound(characteristic) => {
                KettleError::CharacteristicNotFound { characteristic }
            }
            other => KettleError::Transport(other.to_string()),
        }
    }
}
