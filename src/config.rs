//! Construction-time configuration for an emulated bulb.

use serde::{Deserialize, Serialize};
use uuid::{uuid, Uuid};

/// The conventional LIFX LAN discovery/control port.
pub const DEFAULT_PORT: u16 = 56700;

/// Everything an emulated bulb is told at construction.
///
/// The engine receives this struct immutably and never re-reads
/// configuration at runtime. Group/location timestamps of zero are
/// replaced with a clock-derived value at startup.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EmulatorConfig {
    /// Hardware address the device identity derives from. Keep it stable
    /// so hubs recognize the bulb across restarts.
    pub mac: [u8; 6],
    /// UDP port to bind and advertise in StateService replies.
    pub port: u16,
    pub label: String,
    pub group: String,
    pub group_guid: Uuid,
    /// Nanoseconds since epoch; 0 means "stamp at startup".
    pub group_updated_at: u64,
    pub location: String,
    pub location_guid: Uuid,
    /// Nanoseconds since epoch; 0 means "stamp at startup".
    pub location_updated_at: u64,
    /// Identity reported by StateVersion; hubs use vendor/product to look
    /// up capabilities, so pick a real color-bulb product id.
    pub vendor: u32,
    pub product: u32,
    pub hardware_version: u32,
    /// Reported by StateHostFirmware.
    pub firmware_build: u64,
    pub firmware_version_minor: u16,
    pub firmware_version_major: u16,
    /// Reported by StateWifiFirmware.
    pub wifi_firmware_build: u64,
    pub wifi_firmware_version_minor: u16,
    pub wifi_firmware_version_major: u16,
    /// Static signal strength (milliwatts) reported by StateWifiInfo.
    pub wifi_signal: f32,
    /// Coalescing window for actuator writes, in milliseconds.
    pub debounce_ms: u64,
    /// Broadcast an unsolicited LightState after material state changes so
    /// caching hubs refresh without polling. Best-effort.
    pub announce: bool,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        EmulatorConfig {
            mac: [0xd0, 0x73, 0xd5, 0x01, 0x02, 0x03],
            port: DEFAULT_PORT,
            label: "LIFX Bulb".to_string(),
            group: "Home".to_string(),
            group_guid: uuid!("bd93e53d-2014-496f-8cfd-b8886f766d7a"),
            group_updated_at: 0,
            location: "Home".to_string(),
            location_guid: uuid!("b49bed4d-77b0-05a3-9ec3-be93d9582f1f"),
            location_updated_at: 0,
            vendor: 1,
            // Color 1000: a plain color bulb with no multizone/tile extras
            product: 22,
            hardware_version: 0,
            firmware_build: 1_502_237_570_000_000_000,
            firmware_version_minor: 22,
            firmware_version_major: 1,
            wifi_firmware_build: 1_456_093_684_000_000_000,
            wifi_firmware_version_minor: 62,
            wifi_firmware_version_major: 101,
            // roughly -50 dBm
            wifi_signal: 1.0e-5,
            debounce_ms: 50,
            announce: false,
        }
    }
}
