//! SMCP1 codec error types

use thiserror::Error;

/// Errors raised while encoding or decoding a frame
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Buffer shorter than the structure being read or written
    #[error("buffer too small: need {needed} bytes, got {got}")]
    BufferTooSmall {
        /// Needed size
        needed: usize,
        /// Actual size
        got: usize,
    },

    /// Version byte differs from the protocol version
    #[error("invalid protocol version: expected 0x10, got {found:#04x}")]
    InvalidVersion {
        /// Found version byte
        found: u8,
    },

    /// Header declares more sub-blocks than the protocol allows
    #[error("too many sub-blocks: {count} (max {max})")]
    TooManySubBlocks {
        /// Declared count
        count: u16,
        /// Maximum allowed
        max: usize,
    },

    /// Declared element count runs past the end of the datagram
    #[error("sub-block {index} truncated: declares {declared} bytes, {available} available")]
    Truncated {
        /// Sub-block index (0 or 1)
        index: usize,
        /// Bytes declared by the sub-block header
        declared: usize,
        /// Bytes left in the datagram
        available: usize,
    },

    /// Encoded frame would not fit in a single datagram
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge {
        /// Encoded size
        size: usize,
        /// Maximum allowed
        max: usize,
    },
}

/// Result type alias
pub type Result<T> = std::result::Result<T, FrameError>;
