//! Bridges protocol color/power state onto the external light actuator.
//!
//! Hub traffic can carry dozens of SetColor messages per second (color
//! wheel drags), while real actuator updates are comparatively expensive.
//! The bridge therefore coalesces writes: [`LightBridge::apply`] only
//! records the latest target and a background flusher pushes it to the
//! hardware once the debounce window has passed. Reads never wait on the
//! hardware either: they serve a cache that every apply updates first.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, warn};
use tokio::time::Instant;

use crate::actuator::{ChannelColor, ChannelWrite, LightActuator};
use crate::device::ColorState;
use crate::errors::Error;
use crate::types::{Hsbk, PowerLevel};

type Result<T> = std::result::Result<T, Error>;

/// Which physical channels render the light.
///
/// Chosen once at construction; the two layouts are never mixed at
/// runtime.
#[derive(Clone)]
pub enum ChannelSetup {
    /// One RGBWW channel set renders both colors and whites.
    Combined(Arc<dyn LightActuator>),
    /// Separate color and white channel sets; at most one is lit at a
    /// time, selected by the saturation value.
    Split {
        color: Arc<dyn LightActuator>,
        white: Arc<dyn LightActuator>,
    },
}

struct PendingWrite {
    color: ColorState,
    power: PowerLevel,
    transition_ms: u32,
    deadline: Instant,
}

struct Shared {
    pending: Option<PendingWrite>,
    cached_color: ColorState,
    cached_power: PowerLevel,
}

/// Debounced two-way adapter between protocol state and the actuator.
pub struct LightBridge {
    setup: ChannelSetup,
    window: Duration,
    shared: Arc<Mutex<Shared>>,
}

impl LightBridge {
    pub fn new(setup: ChannelSetup, window: Duration) -> Self {
        LightBridge {
            setup,
            window,
            shared: Arc::new(Mutex::new(Shared {
                pending: None,
                cached_color: ColorState::default(),
                cached_power: PowerLevel::Enabled,
            })),
        }
    }

    /// Record a new target state; returns immediately.
    ///
    /// The first apply after an idle period opens the coalescing window;
    /// later applies inside the window replace the value without moving
    /// the deadline, so a burst flushes exactly once.
    pub fn apply(&self, color: ColorState, power: PowerLevel, transition_ms: u32) {
        let mut shared = self.lock();
        shared.cached_color = color;
        shared.cached_power = power;
        let deadline = match &shared.pending {
            Some(p) => p.deadline,
            None => Instant::now() + self.window,
        };
        shared.pending = Some(PendingWrite {
            color,
            power,
            transition_ms,
            deadline,
        });
    }

    /// Current state for query replies. Never blocks.
    ///
    /// While a write is pending the cache is the freshest truth. Otherwise
    /// the actuator is polled so externally toggled power shows up; an
    /// unavailable actuator degrades to the cache, never to an error.
    pub fn read(&self) -> (ColorState, PowerLevel) {
        let mut shared = self.lock();
        if shared.pending.is_none() {
            match self.query_channel(&shared.cached_color) {
                Ok(on) => {
                    shared.cached_power = if on {
                        PowerLevel::Enabled
                    } else {
                        PowerLevel::Standby
                    };
                }
                Err(err) => debug!("actuator read failed, serving cache: {}", err),
            }
        }
        (shared.cached_color, shared.cached_power)
    }

    /// Push any pending write to the actuator immediately.
    pub fn flush_now(&self) -> Result<()> {
        let taken = self.lock().pending.take();
        match taken {
            Some(p) => write_out(&self.setup, &p.color, p.power, p.transition_ms),
            None => Ok(()),
        }
    }

    /// Start the background flusher that pushes coalesced writes once
    /// their window elapses, independent of datagram arrival.
    pub fn spawn_flusher(&self) -> tokio::task::JoinHandle<()> {
        let setup = self.setup.clone();
        let shared = Arc::clone(&self.shared);
        let tick = (self.window / 4).max(Duration::from_millis(1));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let due = {
                    let mut shared = match shared.lock() {
                        Ok(guard) => guard,
                        Err(poisoned) => poisoned.into_inner(),
                    };
                    match &shared.pending {
                        Some(p) if Instant::now() >= p.deadline => shared.pending.take(),
                        _ => None,
                    }
                };
                if let Some(p) = due {
                    if let Err(err) = write_out(&setup, &p.color, p.power, p.transition_ms) {
                        warn!("dropping coalesced light write: {}", err);
                    }
                }
            }
        })
    }

    fn query_channel(&self, color: &ColorState) -> Result<bool> {
        let actuator = match &self.setup {
            ChannelSetup::Combined(led) => led,
            ChannelSetup::Split { color: c, white: w } => {
                if color.hsbk.is_white() {
                    w
                } else {
                    c
                }
            }
        };
        actuator.get().map(|state| state.on)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Shared> {
        match self.shared.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn channel_color(hsbk: &Hsbk) -> ChannelColor {
    if hsbk.is_white() {
        ChannelColor::Mireds(hsbk.mireds())
    } else {
        let (red, green, blue) = hsbk.to_rgb();
        ChannelColor::Rgb { red, green, blue }
    }
}

/// Perform the actual channel writes for one target state.
fn write_out(
    setup: &ChannelSetup,
    color: &ColorState,
    power: PowerLevel,
    transition_ms: u32,
) -> Result<()> {
    let hsbk = color.hsbk;
    let lit = power.is_on() && hsbk.brightness > 0;
    match setup {
        ChannelSetup::Combined(led) => {
            let write = if lit {
                ChannelWrite {
                    on: true,
                    brightness: hsbk.brightness_fraction(),
                    color: channel_color(&hsbk),
                    transition_ms,
                }
            } else {
                ChannelWrite::off(transition_ms)
            };
            led.set(&write)
        }
        ChannelSetup::Split { color: color_led, white: white_led } => {
            let (color_write, white_write) = if !lit {
                (ChannelWrite::off(transition_ms), ChannelWrite::off(transition_ms))
            } else if hsbk.is_white() {
                (
                    ChannelWrite::off(0),
                    ChannelWrite {
                        on: true,
                        brightness: color.white_brightness as f32 / 65535.0,
                        color: ChannelColor::Mireds(hsbk.mireds()),
                        transition_ms,
                    },
                )
            } else {
                (
                    ChannelWrite {
                        on: true,
                        brightness: hsbk.brightness_fraction(),
                        color: channel_color(&hsbk),
                        transition_ms,
                    },
                    ChannelWrite::off(0),
                )
            };
            // One logical transaction: attempt both channels even if the
            // first fails, then report a single availability error.
            let first = color_led.set(&color_write);
            let second = white_led.set(&white_write);
            first.and(second).map_err(|_| Error::ActuatorUnavailable)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::ChannelState;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Default)]
    struct FakeActuator {
        writes: Mutex<Vec<ChannelWrite>>,
        unavailable: AtomicBool,
        on: AtomicBool,
    }

    impl FakeActuator {
        fn writes(&self) -> Vec<ChannelWrite> {
            self.writes.lock().unwrap().clone()
        }
    }

    impl LightActuator for FakeActuator {
        fn set(&self, write: &ChannelWrite) -> Result<()> {
            if self.unavailable.load(Ordering::SeqCst) {
                return Err(Error::ActuatorUnavailable);
            }
            self.on.store(write.on, Ordering::SeqCst);
            self.writes.lock().unwrap().push(*write);
            Ok(())
        }

        fn get(&self) -> Result<ChannelState> {
            if self.unavailable.load(Ordering::SeqCst) {
                return Err(Error::ActuatorUnavailable);
            }
            Ok(ChannelState {
                on: self.on.load(Ordering::SeqCst),
                brightness: 1.0,
                color: ChannelColor::Mireds(370),
            })
        }
    }

    fn color(hue: u16, saturation: u16, brightness: u16) -> ColorState {
        ColorState {
            hsbk: Hsbk {
                hue,
                saturation,
                brightness,
                kelvin: 3500,
            },
            white_brightness: 30000,
        }
    }

    #[test]
    fn test_combined_white_uses_mireds() {
        let led = Arc::new(FakeActuator::default());
        let bridge = LightBridge::new(
            ChannelSetup::Combined(led.clone()),
            Duration::from_millis(10),
        );
        bridge.apply(ColorState::default(), PowerLevel::Enabled, 0);
        bridge.flush_now().unwrap();
        let writes = led.writes();
        assert_eq!(writes.len(), 1);
        assert!(writes[0].on);
        assert_eq!(writes[0].color, ChannelColor::Mireds(370));
    }

    #[test]
    fn test_split_color_path_turns_white_off() {
        let color_led = Arc::new(FakeActuator::default());
        let white_led = Arc::new(FakeActuator::default());
        let bridge = LightBridge::new(
            ChannelSetup::Split {
                color: color_led.clone(),
                white: white_led.clone(),
            },
            Duration::from_millis(10),
        );
        bridge.apply(color(21845, 65535, 65535), PowerLevel::Enabled, 100);
        bridge.flush_now().unwrap();
        assert!(color_led.writes()[0].on);
        assert!(!white_led.writes()[0].on);
    }

    #[test]
    fn test_split_white_path_uses_white_brightness() {
        let color_led = Arc::new(FakeActuator::default());
        let white_led = Arc::new(FakeActuator::default());
        let bridge = LightBridge::new(
            ChannelSetup::Split {
                color: color_led.clone(),
                white: white_led.clone(),
            },
            Duration::from_millis(10),
        );
        bridge.apply(color(0, 0, 65535), PowerLevel::Enabled, 0);
        bridge.flush_now().unwrap();
        let white_write = white_led.writes()[0];
        assert!(white_write.on);
        assert!((white_write.brightness - 30000.0 / 65535.0).abs() < 1e-4);
        assert!(!color_led.writes()[0].on);
    }

    #[test]
    fn test_split_transaction_attempts_both_and_reports_failure() {
        let color_led = Arc::new(FakeActuator::default());
        color_led.unavailable.store(true, Ordering::SeqCst);
        let white_led = Arc::new(FakeActuator::default());
        let bridge = LightBridge::new(
            ChannelSetup::Split {
                color: color_led.clone(),
                white: white_led.clone(),
            },
            Duration::from_millis(10),
        );
        bridge.apply(color(0, 0, 65535), PowerLevel::Enabled, 0);
        assert_eq!(bridge.flush_now(), Err(Error::ActuatorUnavailable));
        // The white channel was still attempted.
        assert_eq!(white_led.writes().len(), 1);
    }

    #[test]
    fn test_burst_coalesces_to_latest_value() {
        let led = Arc::new(FakeActuator::default());
        let bridge = LightBridge::new(
            ChannelSetup::Combined(led.clone()),
            Duration::from_millis(50),
        );
        bridge.apply(color(100, 65535, 1000), PowerLevel::Enabled, 0);
        bridge.apply(color(200, 65535, 2000), PowerLevel::Enabled, 0);
        bridge.apply(color(300, 65535, 3000), PowerLevel::Enabled, 0);
        bridge.flush_now().unwrap();
        let writes = led.writes();
        assert_eq!(writes.len(), 1);
        assert!((writes[0].brightness - 3000.0 / 65535.0).abs() < 1e-4);
        // Nothing left pending.
        bridge.flush_now().unwrap();
        assert_eq!(led.writes().len(), 1);
    }

    #[test]
    fn test_read_serves_cache_when_unavailable() {
        let led = Arc::new(FakeActuator::default());
        let bridge = LightBridge::new(
            ChannelSetup::Combined(led.clone()),
            Duration::from_millis(10),
        );
        bridge.apply(color(1, 2, 3), PowerLevel::Enabled, 0);
        bridge.flush_now().unwrap();
        led.unavailable.store(true, Ordering::SeqCst);
        let (cached, power) = bridge.read();
        assert_eq!(cached, color(1, 2, 3));
        assert_eq!(power, PowerLevel::Enabled);
    }

    #[test]
    fn test_read_reflects_pending_apply_before_flush() {
        let led = Arc::new(FakeActuator::default());
        let bridge = LightBridge::new(
            ChannelSetup::Combined(led.clone()),
            Duration::from_millis(1000),
        );
        bridge.apply(color(5, 6, 7), PowerLevel::Standby, 0);
        let (cached, power) = bridge.read();
        assert_eq!(cached, color(5, 6, 7));
        assert_eq!(power, PowerLevel::Standby);
        assert!(led.writes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_flusher_pushes_after_window() {
        let led = Arc::new(FakeActuator::default());
        let bridge = LightBridge::new(
            ChannelSetup::Combined(led.clone()),
            Duration::from_millis(40),
        );
        let flusher = bridge.spawn_flusher();
        bridge.apply(color(9, 65535, 9), PowerLevel::Enabled, 0);
        for _ in 0..20 {
            tokio::time::advance(Duration::from_millis(10)).await;
            tokio::task::yield_now().await;
            if !led.writes().is_empty() {
                break;
            }
        }
        assert_eq!(led.writes().len(), 1);
        flusher.abort();
    }
}
