//! Protocol core for the Mi Kettle Pro BLE session
//!
//! Pure logic shared by the session driver: nothing here touches a radio or a
//! clock, so every piece is testable with plain byte vectors.
//!
//! ## Modules
//!
//! - [`protocol`] - Service/characteristic identifiers and wire opcodes
//! - [`codec`] - 10-byte mode configuration record
//! - [`status`] - Status notification parsing
//! - [`crypto`] - Login key derivation, tokens and fragment tagging
//! - [`command`] - Actions, setpoints and the setpoint source capability
//! - [`safety`] - Boil cutoff decision latch
//! - [`backoff`] - Reconnect backoff policy
//! - [`config`] - Session configuration
//! - [`error`] - Error taxonomy
//!
//! ## Usage
//!
//! ```rust
//! use kettle_core::{codec, parse_status, SetpointKind, HEAT_INDEX};
//!
//! let record = [0u8; 10];
//! let segment = SetpointKind::Heat.segment(95);
//! let updated = codec::replace_segment(&record, HEAT_INDEX, &segment).unwrap();
//! assert_eq!(&updated[8..], &[95, 0x18]);
//!
//! let frame = [1, 0, 0, 0, 4, 85, 1, 0x00, 0x78, 0, 0];
//! let status = parse_status(&frame, true).unwrap();
//! assert_eq!(status.current_temperature, 85);
//! ```

pub mod backoff;
pub mod codec;
pub mod command;
pub mod config;
pub mod crypto;
pub mod error;
pub mod protocol;
pub mod safety;
pub mod status;

pub use backoff::Backoff;
pub use codec::{encode_setpoint, read_segment, replace_segment, ModeSegment};
pub use command::{KettleAction, SetpointKind, SetpointSource, Setpoints, SharedSetpoints};
pub use config::KettleConfig;
pub use crypto::{
    derive_session_keys, reassemble_fragments, split_token, verify_device_confirmation,
    AuthContext, DeviceToken, SessionKeys,
};
pub use error::{CodecError, HandshakeError, KettleError, Result};
pub use protocol::*;
pub use safety::{SafetyMonitor, SafetyVerdict};
pub use status::{mode_description, parse_status, Activity, Flag, StatusSnapshot};
