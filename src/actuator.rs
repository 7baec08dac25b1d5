//! Collaborator seams: the external light actuator and the time source.
//!
//! The crate drives a light it does not implement. Hosts hand in one or two
//! [`LightActuator`] channels at construction (see
//! [`ChannelSetup`](crate::ChannelSetup)) and may swap the [`Clock`] for a
//! deterministic one in tests. Actuator calls must be non-blocking: an
//! unreachable backend returns [`Error::ActuatorUnavailable`] immediately
//! rather than stalling the message loop.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::errors::Error;

type Result<T> = std::result::Result<T, Error>;

/// Color content of a channel write.
///
/// Saturated colors go out as RGB fractions; whites as a color temperature
/// in mireds, the unit lighting backends take natively.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ChannelColor {
    Rgb { red: f32, green: f32, blue: f32 },
    Mireds(u16),
}

/// One write pushed to one actuator channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelWrite {
    pub on: bool,
    /// 0.0..=1.0
    pub brightness: f32,
    pub color: ChannelColor,
    /// Fade time in milliseconds.
    pub transition_ms: u32,
}

impl ChannelWrite {
    /// A plain power-off write, fading over `transition_ms`.
    pub fn off(transition_ms: u32) -> Self {
        ChannelWrite {
            on: false,
            brightness: 0.0,
            color: ChannelColor::Mireds(370),
            transition_ms,
        }
    }
}

/// What a channel currently shows, as reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelState {
    pub on: bool,
    /// 0.0..=1.0
    pub brightness: f32,
    pub color: ChannelColor,
}

/// The externally provided light backend for one channel set.
pub trait LightActuator: Send + Sync {
    /// Push a write to the channel. Must not block; an unreachable backend
    /// fails fast with [`Error::ActuatorUnavailable`].
    fn set(&self, write: &ChannelWrite) -> Result<()>;

    /// Read the channel's current state. Same non-blocking contract.
    fn get(&self) -> Result<ChannelState>;
}

/// Wall-clock source for metadata timestamps and reply header stamps.
pub trait Clock: Send + Sync {
    /// Nanoseconds since the Unix epoch.
    fn now_nanos(&self) -> u64;
}

/// The process wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_nanos(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0)
    }
}
