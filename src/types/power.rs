//! Device power level.

use serde::{Deserialize, Serialize};

/// Power level of the emulated bulb.
///
/// The protocol carries power as a u16, but only 0 and 65535 are defined.
/// Legacy queries read the same two-valued field as a "transition level".
#[repr(u16)]
#[derive(Debug, Default, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum PowerLevel {
    /// Light off, device idle
    #[default]
    Standby = 0,
    /// Light on at full power draw
    Enabled = 65535,
}

impl PowerLevel {
    /// Create a new PowerLevel from a wire-level u16.
    ///
    /// Returns `None` for anything other than 0 or 65535.
    ///
    /// # Examples
    ///
    /// ```
    /// use lifx_bulb_rs::PowerLevel;
    ///
    /// assert_eq!(PowerLevel::create(0), Some(PowerLevel::Standby));
    /// assert_eq!(PowerLevel::create(65535), Some(PowerLevel::Enabled));
    /// assert_eq!(PowerLevel::create(1), None);
    /// ```
    pub fn create(level: u16) -> Option<Self> {
        match level {
            0 => Some(PowerLevel::Standby),
            65535 => Some(PowerLevel::Enabled),
            _ => None,
        }
    }

    /// Get the wire-level u16 value.
    pub fn level(&self) -> u16 {
        *self as u16
    }

    /// Check whether the light is emitting.
    pub fn is_on(&self) -> bool {
        matches!(self, PowerLevel::Enabled)
    }
}
