//! Device addressing and per-device caches

pub mod address;
mod cache;

pub use address::{DeviceId, group};
pub use cache::{
    ADDRESS_IDLE_MS, Axis, Completion, DeviceCache, DeviceEntry, Positions, STUCK_DRIVE_MS,
};
