//! The emulated device's identity and mutable state.
//!
//! One [`DeviceState`] per emulated bulb, constructed once from the
//! configuration and owned by the protocol engine — never a process-wide
//! singleton, so a test (or a host) can run several independent bulbs.

use std::sync::Arc;

use uuid::Uuid;

use crate::actuator::Clock;
use crate::config::EmulatorConfig;
use crate::types::{DeviceId, Hsbk, Label, PowerLevel};

/// Offset real firmware adds to its millisecond-derived nanosecond
/// timestamps; kept so our stamps look like a real bulb's.
const TIMESTAMP_MAGIC: u64 = 614_500;

/// Group or location membership: name, GUID and update timestamp.
///
/// The three fields always change together as one unit; a hub that updates
/// the GUID also supplies the matching name and timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Membership {
    pub guid: Uuid,
    pub label: Label,
    pub updated_at: u64,
}

/// Protocol-visible color state.
///
/// `hsbk` is what every wire message carries. `white_brightness` only
/// matters for the split-LED channel setup, where the white channel dims
/// independently of the color channel; combined setups ignore it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorState {
    pub hsbk: Hsbk,
    pub white_brightness: u16,
}

impl Default for ColorState {
    fn default() -> Self {
        ColorState {
            hsbk: Hsbk::warm_white(),
            white_brightness: 65535,
        }
    }
}

/// Mutable per-device state plus immutable identity.
///
/// A faithful record, not a validator: client-supplied GUIDs and
/// timestamps are stored verbatim (last writer wins, no ordering check);
/// the only massaging is fixed-width label truncation and the zero
/// timestamp default.
pub struct DeviceState {
    id: DeviceId,
    vendor: u32,
    product: u32,
    hardware_version: u32,
    label: Label,
    group: Membership,
    location: Membership,
    power: PowerLevel,
    color: ColorState,
    clock: Arc<dyn Clock>,
}

impl DeviceState {
    pub fn new(config: &EmulatorConfig, clock: Arc<dyn Clock>) -> Self {
        let startup = wire_timestamp(clock.as_ref());
        DeviceState {
            id: DeviceId::new(config.mac),
            vendor: config.vendor,
            product: config.product,
            hardware_version: config.hardware_version,
            label: Label::new(&config.label),
            group: Membership {
                guid: config.group_guid,
                label: Label::new(&config.group),
                updated_at: non_zero_or(config.group_updated_at, startup),
            },
            location: Membership {
                guid: config.location_guid,
                label: Label::new(&config.location),
                updated_at: non_zero_or(config.location_updated_at, startup),
            },
            power: PowerLevel::Enabled,
            color: ColorState::default(),
            clock,
        }
    }

    pub fn id(&self) -> DeviceId {
        self.id
    }

    pub fn vendor(&self) -> u32 {
        self.vendor
    }

    pub fn product(&self) -> u32 {
        self.product
    }

    pub fn hardware_version(&self) -> u32 {
        self.hardware_version
    }

    pub fn label(&self) -> &Label {
        &self.label
    }

    pub fn group(&self) -> &Membership {
        &self.group
    }

    pub fn location(&self) -> &Membership {
        &self.location
    }

    pub fn power(&self) -> PowerLevel {
        self.power
    }

    pub fn color(&self) -> ColorState {
        self.color
    }

    pub fn set_label(&mut self, label: Label) {
        self.label = label;
    }

    pub fn set_power(&mut self, power: PowerLevel) {
        self.power = power;
    }

    pub fn set_hsbk(&mut self, hsbk: Hsbk) {
        self.color.hsbk = hsbk;
    }

    /// Overwrite group membership with whatever the hub sent.
    ///
    /// A zero timestamp is replaced with the current wall clock, matching
    /// real-bulb behavior for hubs that leave the field blank.
    pub fn set_group(&mut self, guid: Uuid, label: Label, updated_at: u64) {
        let updated_at = non_zero_or(updated_at, wire_timestamp(self.clock.as_ref()));
        self.group = Membership {
            guid,
            label,
            updated_at,
        };
    }

    /// Overwrite location membership; same rules as [`set_group`](Self::set_group).
    pub fn set_location(&mut self, guid: Uuid, label: Label, updated_at: u64) {
        let updated_at = non_zero_or(updated_at, wire_timestamp(self.clock.as_ref()));
        self.location = Membership {
            guid,
            label,
            updated_at,
        };
    }

    /// Timestamp for reply headers, in the firmware's format.
    pub fn reply_timestamp(&self) -> u64 {
        wire_timestamp(self.clock.as_ref())
    }
}

fn non_zero_or(value: u64, fallback: u64) -> u64 {
    if value == 0 { fallback } else { value }
}

/// Millisecond-resolution nanosecond timestamp plus the firmware's magic
/// offset.
fn wire_timestamp(clock: &dyn Clock) -> u64 {
    (clock.now_nanos() / 1_000_000) * 1_000_000 + TIMESTAMP_MAGIC
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedClock(u64);

    impl Clock for FixedClock {
        fn now_nanos(&self) -> u64 {
            self.0
        }
    }

    fn state() -> DeviceState {
        DeviceState::new(
            &EmulatorConfig::default(),
            Arc::new(FixedClock(1_700_000_000_000_000_000)),
        )
    }

    #[test]
    fn test_zero_config_timestamps_get_stamped() {
        let state = state();
        assert_eq!(state.group().updated_at, 1_700_000_000_000_000_000 + 614_500);
        assert_eq!(state.location().updated_at, state.group().updated_at);
    }

    #[test]
    fn test_last_writer_wins_ignores_timestamp_order() {
        // Pure overwrite: an "older" timestamp still replaces a newer one.
        let mut state = state();
        let guid = Uuid::from_u128(7);
        state.set_group(guid, Label::new("first"), 2_000);
        state.set_group(guid, Label::new("second"), 1_000);
        assert_eq!(state.group().label, *"second");
        assert_eq!(state.group().updated_at, 1_000);
    }

    #[test]
    fn test_zero_timestamp_write_uses_clock() {
        let mut state = state();
        state.set_location(Uuid::from_u128(9), Label::new("Shed"), 0);
        assert_eq!(
            state.location().updated_at,
            1_700_000_000_000_000_000 + 614_500
        );
    }

    #[test]
    fn test_guid_and_label_change_together() {
        let mut state = state();
        let before = state.group().clone();
        state.set_group(Uuid::from_u128(1), Label::new("Attic"), 5);
        let after = state.group();
        assert_ne!(after.guid, before.guid);
        assert_ne!(after.label, before.label);
        assert_ne!(after.updated_at, before.updated_at);
    }
}
