//! Device identity derived from the hardware address.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The immutable identity of an emulated bulb: a 6-byte hardware address.
///
/// The wire protocol addresses devices by a 64-bit serial whose low six
/// bytes are the hardware address. Identity is stable across restarts as
/// long as the configured hardware address is stable.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct DeviceId([u8; 6]);

impl DeviceId {
    pub fn new(mac: [u8; 6]) -> Self {
        DeviceId(mac)
    }

    /// Get the raw hardware address bytes.
    pub fn mac(&self) -> [u8; 6] {
        self.0
    }

    /// The 64-bit serial used in the frame-address target field.
    ///
    /// # Examples
    ///
    /// ```
    /// use lifx_bulb_rs::DeviceId;
    ///
    /// let id = DeviceId::new([0xd0, 0x73, 0xd5, 0x02, 0x97, 0xde]);
    /// assert_eq!(id.serial(), 0x0000_de97_02d5_73d0);
    /// ```
    pub fn serial(&self) -> u64 {
        let [a, b, c, d, e, f] = self.0;
        u64::from_le_bytes([a, b, c, d, e, f, 0, 0])
    }

    /// Check whether a frame-address target selects this device.
    ///
    /// A zero target addresses all devices.
    pub fn matches_target(&self, target: u64) -> bool {
        target == 0 || target == self.serial()
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            m[0], m[1], m[2], m[3], m[4], m[5]
        )
    }
}
