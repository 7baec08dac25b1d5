//! Fixed-width device strings (labels, group and location names).

use std::fmt;

use log::warn;
use serde::{Deserialize, Serialize};

/// A protocol string: at most 32 bytes of UTF-8, null-padded on the wire.
///
/// Used for the device label and the group/location names. Construction
/// silently truncates to the field width (the truncation is logged); wire
/// decoding trims trailing nulls.
#[derive(Default, Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Label(String);

impl Label {
    /// Field width on the wire, in bytes.
    pub const WIDTH: usize = 32;

    /// Create a new Label, truncating to 32 encoded bytes if needed.
    ///
    /// Truncation lands on a character boundary so the stored string stays
    /// valid UTF-8.
    ///
    /// # Examples
    ///
    /// ```
    /// use lifx_bulb_rs::Label;
    ///
    /// assert_eq!(Label::new("Kitchen").as_str(), "Kitchen");
    /// assert_eq!(Label::new(&"x".repeat(40)).as_str().len(), 32);
    /// ```
    pub fn new(s: &str) -> Self {
        if s.len() <= Self::WIDTH {
            return Label(s.to_owned());
        }
        let mut end = Self::WIDTH;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        warn!("label {:?} exceeds {} bytes, truncating", s, Self::WIDTH);
        Label(s[..end].to_owned())
    }

    /// Get the label text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Encode as a fixed 32-byte null-padded field.
    pub fn to_wire(&self) -> [u8; Self::WIDTH] {
        let mut out = [0u8; Self::WIDTH];
        out[..self.0.len()].copy_from_slice(self.0.as_bytes());
        out
    }

    /// Decode from a fixed 32-byte field, trimming trailing nulls.
    ///
    /// Non-UTF-8 bytes are replaced rather than rejected; the store is a
    /// faithful record of what the hub sent, not a validator.
    pub fn from_wire(bytes: &[u8; Self::WIDTH]) -> Self {
        let end = bytes.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
        Label(String::from_utf8_lossy(&bytes[..end]).into_owned())
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::cmp::PartialEq<str> for Label {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_round_trip() {
        let label = Label::new("Bedroom Lamp");
        let wire = label.to_wire();
        assert_eq!(wire.len(), 32);
        assert_eq!(&wire[..12], b"Bedroom Lamp");
        assert!(wire[12..].iter().all(|&b| b == 0));
        assert_eq!(Label::from_wire(&wire), label);
    }

    #[test]
    fn test_truncates_on_char_boundary() {
        // 11 x 3-byte chars = 33 bytes; must truncate to 10 chars (30 bytes)
        let s = "\u{20AC}".repeat(11);
        let label = Label::new(&s);
        assert!(label.as_str().len() <= 32);
        assert_eq!(label.as_str().chars().count(), 10);
    }

    #[test]
    fn test_interior_nulls_preserved() {
        let mut wire = [0u8; 32];
        wire[0] = b'a';
        wire[2] = b'b';
        let label = Label::from_wire(&wire);
        assert_eq!(label.as_str().len(), 3);
    }
}
