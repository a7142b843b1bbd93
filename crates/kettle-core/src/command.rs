//! Action and setpoint command model
//!
//! Actions and setpoints are closed enums matched exhaustively; string names
//! coming from a host are parsed once at the edge.

use core::fmt;
use core::str::FromStr;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::codec::encode_setpoint;
use crate::error::{KettleError, Result};
use crate::protocol::{ACTION_HEAT, ACTION_WARM, HEAT_INDEX, MODE_SEGMENT_COUNT, WARM_INDEX};

// ----------------------------------------------------------------------------
// Actions
// ----------------------------------------------------------------------------

/// Commands written to the primary setting characteristic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KettleAction {
    Heat,
    Warm,
    TurnOffHeat,
    TurnOffKeepWarm,
}

impl KettleAction {
    pub const ALL: [KettleAction; 4] = [
        KettleAction::Heat,
        KettleAction::Warm,
        KettleAction::TurnOffHeat,
        KettleAction::TurnOffKeepWarm,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            KettleAction::Heat => "heat",
            KettleAction::Warm => "warm",
            KettleAction::TurnOffHeat => "turn_off_heat",
            KettleAction::TurnOffKeepWarm => "turn_off_keep_warm",
        }
    }

    /// Two-byte payload for this action
    ///
    /// `warm_after_boil_raw` is echoed from the latest status frame. For
    /// [`KettleAction::TurnOffKeepWarm`] the current `mode` must be a known
    /// mode index; `None` means there is nothing safe to write.
    pub fn payload(&self, warm_after_boil_raw: u8, mode: u8) -> Option<[u8; 2]> {
        match self {
            KettleAction::Heat => Some([ACTION_HEAT, warm_after_boil_raw]),
            KettleAction::Warm | KettleAction::TurnOffHeat => {
                Some([ACTION_WARM, warm_after_boil_raw])
            }
            KettleAction::TurnOffKeepWarm => {
                ((mode as usize) < MODE_SEGMENT_COUNT).then_some([mode, 0x00])
            }
        }
    }
}

impl FromStr for KettleAction {
    type Err = KettleError;

    fn from_str(name: &str) -> Result<Self> {
        match name {
            "heat" => Ok(KettleAction::Heat),
            "warm" => Ok(KettleAction::Warm),
            "turn_off_heat" | "turn_off_boil" => Ok(KettleAction::TurnOffHeat),
            "turn_off_keep_warm" | "turn_off_warm" => Ok(KettleAction::TurnOffKeepWarm),
            _ => Err(KettleError::UnknownAction {
                name: name.to_string(),
            }),
        }
    }
}

impl fmt::Display for KettleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ----------------------------------------------------------------------------
// Setpoints
// ----------------------------------------------------------------------------

/// The two user-adjustable temperatures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetpointKind {
    Heat,
    Warm,
}

impl SetpointKind {
    /// Mode configuration segment holding this setpoint
    pub fn segment_index(&self) -> usize {
        match self {
            SetpointKind::Heat => HEAT_INDEX,
            SetpointKind::Warm => WARM_INDEX,
        }
    }

    /// Accepted temperature range in °C
    pub fn range(&self) -> (u8, u8) {
        match self {
            SetpointKind::Heat => (50, 100),
            SetpointKind::Warm => (10, 90),
        }
    }

    pub fn default_temperature(&self) -> u8 {
        match self {
            SetpointKind::Heat => 90,
            SetpointKind::Warm => 20,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SetpointKind::Heat => "heat",
            SetpointKind::Warm => "warm",
        }
    }

    /// Check `value` against the range and narrow it to a byte
    pub fn validate(&self, value: i64) -> Result<u8> {
        let (min, max) = self.range();
        if value < i64::from(min) || value > i64::from(max) {
            return Err(KettleError::InvalidSetpoint {
                kind: self.as_str(),
                value,
                min,
                max,
            });
        }
        // In range, so it fits in a byte
        Ok(value as u8)
    }

    /// Encoded segment for a validated temperature
    pub fn segment(&self, temperature: u8) -> [u8; 2] {
        encode_setpoint(temperature)
    }
}

/// Heat and warm temperatures supplied at profile sync
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Setpoints {
    pub heat: u8,
    pub warm: u8,
}

impl Default for Setpoints {
    fn default() -> Self {
        Self {
            heat: SetpointKind::Heat.default_temperature(),
            warm: SetpointKind::Warm.default_temperature(),
        }
    }
}

impl Setpoints {
    pub fn get(&self, kind: SetpointKind) -> u8 {
        match kind {
            SetpointKind::Heat => self.heat,
            SetpointKind::Warm => self.warm,
        }
    }

    pub fn set(&mut self, kind: SetpointKind, temperature: u8) {
        match kind {
            SetpointKind::Heat => self.heat = temperature,
            SetpointKind::Warm => self.warm = temperature,
        }
    }
}

/// Source of the caller-owned setpoints, read at every profile sync
pub trait SetpointSource: Send + Sync {
    fn setpoints(&self) -> Setpoints;

    /// Record a setpoint the device has accepted
    fn store(&self, kind: SetpointKind, temperature: u8);
}

/// Cloneable setpoint handle shared between a host and the session
#[derive(Debug, Clone, Default)]
pub struct SharedSetpoints {
    inner: Arc<Mutex<Setpoints>>,
}

impl SharedSetpoints {
    pub fn new(setpoints: Setpoints) -> Self {
        Self {
            inner: Arc::new(Mutex::new(setpoints)),
        }
    }
}

impl SetpointSource for SharedSetpoints {
    fn setpoints(&self) -> Setpoints {
        match self.inner.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn store(&self, kind: SetpointKind, temperature: u8) {
        match self.inner.lock() {
            Ok(mut guard) => guard.set(kind, temperature),
            Err(poisoned) => poisoned.into_inner().set(kind, temperature),
        }
    }
}
