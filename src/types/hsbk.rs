//! HSBK color representation.

use serde::{Deserialize, Serialize};

/// Bulb color as Hue-Saturation-Brightness-Kelvin, the protocol's native
/// color model.
///
/// All four components are full-range u16 on the wire. Hue maps 0..65535
/// onto 0..360 degrees. When saturation is zero the light shows white:
/// hue is ignored and kelvin selects the color temperature (conventionally
/// 2500K warm to 9000K cool). When saturation is non-zero, kelvin is
/// ignored.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct Hsbk {
    pub hue: u16,
    pub saturation: u16,
    pub brightness: u16,
    pub kelvin: u16,
}

impl Hsbk {
    /// Warm white at full brightness, the state a fresh bulb boots into.
    pub fn warm_white() -> Self {
        Hsbk {
            hue: 0,
            saturation: 0,
            brightness: 65535,
            kelvin: 2700,
        }
    }

    /// Check whether this color is on the white (color-temperature) path.
    pub fn is_white(&self) -> bool {
        self.saturation == 0
    }

    /// Brightness as a 0.0..=1.0 fraction.
    pub fn brightness_fraction(&self) -> f32 {
        self.brightness as f32 / 65535.0
    }

    /// Color temperature in mireds, the unit most lighting backends take.
    pub fn mireds(&self) -> u16 {
        (1_000_000 / self.kelvin.max(1) as u32) as u16
    }

    /// Convert hue/saturation to RGB fractions at full value.
    ///
    /// Brightness is handled as a separate channel dimmer, so value is
    /// pinned to 1.0 here.
    ///
    /// # Examples
    ///
    /// ```
    /// use lifx_bulb_rs::Hsbk;
    ///
    /// let red = Hsbk { hue: 0, saturation: 65535, brightness: 65535, kelvin: 3500 };
    /// assert_eq!(red.to_rgb(), (1.0, 0.0, 0.0));
    /// ```
    pub fn to_rgb(&self) -> (f32, f32, f32) {
        let h = (self.hue as f32 / 65535.0) * 360.0;
        let s = self.saturation as f32 / 65535.0;
        let v = 1.0;

        if s == 0.0 {
            return (v, v, v);
        }

        let h = h / 60.0;
        let i = h.floor() as i32;
        let f = h - i as f32;
        let p = v * (1.0 - s);
        let q = v * (1.0 - s * f);
        let t = v * (1.0 - s * (1.0 - f));

        match i % 6 {
            0 => (v, t, p),
            1 => (q, v, p),
            2 => (p, v, t),
            3 => (p, q, v),
            4 => (t, p, v),
            _ => (v, p, q),
        }
    }
}

impl Default for Hsbk {
    fn default() -> Self {
        Hsbk::warm_white()
    }
}
