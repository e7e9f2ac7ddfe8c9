//! SMCP1 protocol core
//!
//! This module provides the wire format, option/command codes, unit
//! conversions and the codec for SMCP1 frames.

mod codec;
mod error;
mod frame;
mod header;
mod types;
pub mod units;

pub use codec::{decode, encode, encode_into};
pub use error::{FrameError, Result};
pub use frame::{Frame, SubBlock};
pub use header::FrameHeader;
pub use types::{
    Command, DataType, DeviceStatus, DriveStatus, Options, ext_feature, feature, param,
};

/// Protocol version carried in the first header byte.
pub const PROTOCOL_VERSION: u8 = 0x10;

/// Header size in bytes.
pub const HEADER_SIZE: usize = 16;

/// Sub-block header size in bytes (element type + element count).
pub const SUB_BLOCK_HEADER_SIZE: usize = 4;

/// Maximum number of sub-blocks a frame may carry.
pub const MAX_SUB_BLOCKS: usize = 2;

/// Maximum datagram size accepted or produced by the codec.
pub const MAX_FRAME_SIZE: usize = 1502;

/// Maximum number of 32-bit elements that fit in a single-block frame.
pub const MAX_ELEMENTS: usize = (MAX_FRAME_SIZE - HEADER_SIZE - SUB_BLOCK_HEADER_SIZE) / 4;

/// Wire sentinel for an argument or axis value that is not specified.
pub const ARG_UNDEF: i32 = i32::MAX;
