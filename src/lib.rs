//! # lifx_bulb_rs
//!
//! An async Rust library that emulates a LIFX smart bulb on your local
//! network.
//!
//! Generic smart-home hubs speak the proprietary LIFX LAN protocol: binary
//! UDP datagrams for discovery, identity queries and power/color control.
//! This crate implements the bulb side of that protocol so a hub can
//! discover and control a "light" that is really any backend you plug in —
//! an LED driver, another protocol, a test double.
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use lifx_bulb_rs::{BulbEmulator, ChannelSetup, EmulatorConfig, SystemClock};
//!
//! async fn serve(rgbww: Arc<dyn lifx_bulb_rs::LightActuator>) -> Result<(), lifx_bulb_rs::Error> {
//!     let config = EmulatorConfig {
//!         label: "Desk Lamp".to_string(),
//!         ..EmulatorConfig::default()
//!     };
//!     let bulb = BulbEmulator::new(config, ChannelSetup::Combined(rgbww), Arc::new(SystemClock));
//!     bulb.run().await
//! }
//! ```
//!
//! ## Features
//!
//! - **Discovery**: answers broadcast `GetService` probes so hubs find the
//!   bulb on the standard port (56700)
//! - **Power and Color**: full HSBK color model via [`Hsbk`], two-valued
//!   power via [`PowerLevel`]
//! - **Identity**: label, group and location metadata with GUIDs and
//!   last-writer-wins timestamps, stable MAC-derived serial ([`DeviceId`])
//! - **Liveness**: echo probes, version/firmware/uptime queries, optional
//!   unsolicited state broadcasts
//! - **Actuator bridging**: [`ChannelSetup`] drives one combined RGBWW
//!   channel or a split color+white pair, with debounced writes
//!
//! ## Communication
//!
//! All traffic is UDP on the configured port (56700 by convention); the
//! engine accepts both unicast and broadcast datagrams. The wire format is
//! bit-exact with real bulbs: a fixed 36-byte little-endian header followed
//! by a typed payload (see [`wire`]).
//!
//! ## Collaborators
//!
//! The crate does not render light. Hosts supply the [`LightActuator`]
//! channel(s) and optionally a [`Clock`]; both are consumed through traits
//! fixed at construction time, so tests can run a bulb entirely in memory.

mod actuator;
mod bridge;
mod config;
mod device;
mod engine;
mod errors;
mod types;
pub mod wire;

// Re-export public API
pub use actuator::{ChannelColor, ChannelState, ChannelWrite, Clock, LightActuator, SystemClock};
pub use bridge::{ChannelSetup, LightBridge};
pub use config::{EmulatorConfig, DEFAULT_PORT};
pub use device::{ColorState, DeviceState, Membership};
pub use engine::BulbEmulator;
pub use errors::Error;
pub use types::{DeviceId, Hsbk, Label, PowerLevel};
pub use wire::{Message, MessageKind, RawFrame, Service};
