//! Status notification parsing
//!
//! The warm-status characteristic pushes an 11+ byte frame describing what the
//! kettle is doing. [`parse_status`] turns the raw bytes into a
//! [`StatusSnapshot`].

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CodecError;
use crate::protocol::STATUS_FRAME_MIN_LEN;

// ----------------------------------------------------------------------------
// Lookup Tables
// ----------------------------------------------------------------------------

/// What the kettle is currently doing (status byte 0)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activity {
    Idle,
    Heating,
    KeepingWarm,
    Cooling,
    Unknown,
}

impl Activity {
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => Activity::Idle,
            // 2 = heat, then keep warm at the set temperature
            1 | 2 => Activity::Heating,
            3 => Activity::KeepingWarm,
            4 => Activity::Cooling,
            _ => Activity::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Activity::Idle => "idle",
            Activity::Heating => "heating",
            Activity::KeepingWarm => "keeping warm",
            Activity::Cooling => "cooling",
            Activity::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Activity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Boolean-ish status byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Flag {
    No,
    Yes,
    Unknown,
}

impl Flag {
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0 => Flag::No,
            1 => Flag::Yes,
            _ => Flag::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Flag::No => "no",
            Flag::Yes => "yes",
            Flag::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Description of a mode index
pub fn mode_description(mode: u8) -> &'static str {
    match mode {
        0 | 3 => "Warming",
        4 => "Heating",
        _ => "unknown",
    }
}

// ----------------------------------------------------------------------------
// Snapshot
// ----------------------------------------------------------------------------

/// Parsed status notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusSnapshot {
    pub action: Activity,
    /// Kettle is active and the session is authenticated
    pub is_control: bool,
    /// Mode index (0..=4 for known modes)
    pub mode: u8,
    pub mode_description: &'static str,
    /// Water temperature in °C
    pub current_temperature: u8,
    /// Raw warm-after-boil byte, echoed back in action opcodes
    pub warm_after_boil_raw: u8,
    pub warm_after_boil: Flag,
    pub warm_after_take_off: Flag,
    /// Keep-warm duration in seconds
    pub keep_warm_time: u16,
}

/// Parse a raw status frame
///
/// `authenticated` feeds `is_control`: control is only reported while the
/// kettle is active and the session holds a login.
pub fn parse_status(frame: &[u8], authenticated: bool) -> Result<StatusSnapshot, CodecError> {
    if frame.len() < STATUS_FRAME_MIN_LEN {
        return Err(CodecError::ShortFrame {
            min: STATUS_FRAME_MIN_LEN,
            actual: frame.len(),
        });
    }

    let action = Activity::from_code(frame[0]);
    let mode = frame[4];

    Ok(StatusSnapshot {
        action,
        is_control: action != Activity::Idle && authenticated,
        mode,
        mode_description: mode_description(mode),
        current_temperature: frame[5],
        warm_after_boil_raw: frame[6],
        warm_after_boil: Flag::from_byte(frame[6]),
        warm_after_take_off: Flag::from_byte(frame[10]),
        keep_warm_time: u16::from_be_bytes([frame[7], frame[8]]),
    })
}
