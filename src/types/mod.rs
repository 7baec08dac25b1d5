//! Value types for the emulated device state.

mod device_id;
mod hsbk;
mod label;
mod power;

pub use device_id::DeviceId;
pub use hsbk::Hsbk;
pub use label::Label;
pub use power::PowerLevel;
