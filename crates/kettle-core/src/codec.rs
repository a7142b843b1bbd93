//! Mode configuration record codec
//!
//! The kettle stores its operating modes as a 10-byte record of five 2-byte
//! segments. The device only accepts whole-record writes, so every edit
//! produces a complete replacement record.

use serde::{Deserialize, Serialize};

use crate::error::CodecError;
use crate::protocol::{MODE_CONFIG_LEN, MODE_SEGMENT_COUNT, MODE_SEGMENT_LEN, SETPOINT_MARKER};

// ----------------------------------------------------------------------------
// Segment Functions
// ----------------------------------------------------------------------------

/// Replace one segment of a mode configuration record
///
/// Returns a new 10-byte record; the input is left untouched.
pub fn replace_segment(
    record: &[u8],
    index: usize,
    value: &[u8],
) -> Result<[u8; MODE_CONFIG_LEN], CodecError> {
    let mut out = check_record(record)?;
    if value.len() != MODE_SEGMENT_LEN {
        return Err(CodecError::InvalidLength {
            expected: MODE_SEGMENT_LEN,
            actual: value.len(),
        });
    }
    let start = segment_start(index)?;
    out[start..start + MODE_SEGMENT_LEN].copy_from_slice(value);

    tracing::debug!(
        index,
        segment = %hex::encode(value),
        record = %hex::encode(out),
        "Mode segment replaced"
    );
    Ok(out)
}

/// Read one segment of a mode configuration record
pub fn read_segment(record: &[u8], index: usize) -> Result<[u8; MODE_SEGMENT_LEN], CodecError> {
    let record = check_record(record)?;
    let start = segment_start(index)?;
    Ok([record[start], record[start + 1]])
}

/// Encode a setpoint segment: temperature byte followed by the fixed marker
pub fn encode_setpoint(temperature: u8) -> [u8; MODE_SEGMENT_LEN] {
    [temperature, SETPOINT_MARKER]
}

fn check_record(record: &[u8]) -> Result<[u8; MODE_CONFIG_LEN], CodecError> {
    record.try_into().map_err(|_| CodecError::InvalidLength {
        expected: MODE_CONFIG_LEN,
        actual: record.len(),
    })
}

fn segment_start(index: usize) -> Result<usize, CodecError> {
    if index >= MODE_SEGMENT_COUNT {
        return Err(CodecError::SegmentOutOfRange {
            index,
            count: MODE_SEGMENT_COUNT,
        });
    }
    Ok(index * MODE_SEGMENT_LEN)
}

// ----------------------------------------------------------------------------
// Decoded Segment
// ----------------------------------------------------------------------------

/// Decoded view of one mode segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeSegment {
    /// Target temperature in °C
    pub temperature: u8,
    /// Second segment byte; the setpoint marker for heat/warm segments
    pub keep_warm_duration: u8,
}

impl From<[u8; MODE_SEGMENT_LEN]> for ModeSegment {
    fn from(bytes: [u8; MODE_SEGMENT_LEN]) -> Self {
        Self {
            temperature: bytes[0],
            keep_warm_duration: bytes[1],
        }
    }
}
