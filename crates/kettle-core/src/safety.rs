//! Client-side boil cutoff decision
//!
//! The session reads the heat target only while the kettle is in heat mode;
//! the monitor decides whether to issue a stop. A stop is issued once per
//! threshold crossing: the latch re-arms when the kettle leaves heat mode or
//! the water drops back below the target.

use crate::protocol::HEAT_INDEX;

/// Outcome of one safety evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SafetyVerdict {
    /// Not in heat mode; nothing to check
    Inactive,
    /// Below target, or already stopped for this crossing
    Hold,
    /// Target reached; issue the stop command now
    Stop,
}

#[derive(Debug, Default)]
pub struct SafetyMonitor {
    tripped: bool,
}

impl SafetyMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the heat target must be read for this mode
    ///
    /// Leaving heat mode re-arms the latch.
    pub fn watches(&mut self, mode: u8) -> bool {
        let heating = usize::from(mode) == HEAT_INDEX;
        if !heating {
            self.tripped = false;
        }
        heating
    }

    /// Compare the current temperature against the heat target
    pub fn evaluate(&mut self, mode: u8, current: u8, target: u8) -> SafetyVerdict {
        if !self.watches(mode) {
            return SafetyVerdict::Inactive;
        }
        if current < target {
            self.tripped = false;
            return SafetyVerdict::Hold;
        }
        if self.tripped {
            return SafetyVerdict::Hold;
        }
        self.tripped = true;
        SafetyVerdict::Stop
    }

    /// Forget any earlier stop, e.g. after a reconnect
    pub fn reset(&mut self) {
        self.tripped = false;
    }

    pub fn is_tripped(&self) -> bool {
        self.tripped
    }
}
