//! SMCP1 - client engine for the Sensapex micromanipulator control protocol
//!
//! This library talks to manipulators, microscope stages and pressure
//! controllers over UDP. It includes the SMCP1 frame codec, device
//! addressing, and a blocking session that handles acknowledgements,
//! retransmission and the per-device position and status caches.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use smcp::session::{Session, SessionConfig, TimeLimit};
//!
//! let mut session = Session::open(&SessionConfig::default())?;
//! for dev in session.get_device_list()? {
//!     let read = session.get_positions(dev, TimeLimit::Force)?;
//!     println!("{dev}: {:?}", read.positions);
//! }
//! # Ok::<(), smcp::Error>(())
//! ```
//!
//! # Features
//!
//! - **Zero-copy decoding** - sub-block payloads are `Bytes` slices of the datagram
//! - **Pluggable transport** - sessions run over UDP or a scripted mock
//! - **`serde`** - optional serialization of configuration and cache types

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod device;
pub mod protocol;
pub mod session;
pub mod transport;

pub use device::DeviceId;
pub use protocol::{Command, Frame, FrameError, FrameHeader, Options, SubBlock};
pub use session::{Error, ErrorKind, Result, Session, SessionConfig, TimeLimit};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default SMCP1 UDP port; group `n` uses this plus `n`
pub const DEFAULT_PORT: u16 = 55555;

/// Library version string
#[must_use]
pub const fn version() -> &'static str {
    VERSION
}
