//! Session error types and their numeric codes

use std::io;

use thiserror::Error;

use crate::device::DeviceId;
use crate::protocol::FrameError;

/// Errors returned by session operations
#[derive(Error, Debug)]
pub enum Error {
    /// Socket or other operating system failure
    #[error("Operation system error: {0}")]
    Os(#[from] io::Error),

    /// The session has been closed
    #[error("Not opened")]
    NotOpen,

    /// No acknowledgement or response arrived in time
    #[error("Timeout")]
    Timeout,

    /// An argument failed validation before anything was sent
    #[error("Invalid argument: {0}")]
    InvalidArg(&'static str),

    /// Device id outside every identifier space, or a frame for someone else
    #[error("Invalid device id {0}")]
    InvalidDevice(DeviceId),

    /// A frame or response payload could not be used
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The peer flagged the request as failed
    #[error("Peer failure")]
    PeerError,
}

impl Error {
    /// Category of the error
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Os(_) => ErrorKind::Os,
            Self::NotOpen => ErrorKind::NotOpen,
            Self::Timeout => ErrorKind::Timeout,
            Self::InvalidArg(_) => ErrorKind::InvalidArg,
            Self::InvalidDevice(_) => ErrorKind::InvalidDevice,
            Self::InvalidResponse(_) => ErrorKind::InvalidResponse,
            Self::PeerError => ErrorKind::PeerError,
        }
    }

    /// Numeric error code, always negative
    #[must_use]
    pub const fn code(&self) -> i32 {
        self.kind().code()
    }

    /// Errors an exchange keeps waiting through
    pub(crate) const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::InvalidDevice(_) | Self::InvalidResponse(_)
        )
    }
}

impl From<FrameError> for Error {
    fn from(err: FrameError) -> Self {
        Self::InvalidResponse(err.to_string())
    }
}

/// Error categories with stable numeric codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Operating system error (-1)
    Os,
    /// Session not open (-2)
    NotOpen,
    /// Timed out (-3)
    Timeout,
    /// Invalid argument (-4)
    InvalidArg,
    /// Invalid device id (-5)
    InvalidDevice,
    /// Invalid response (-6)
    InvalidResponse,
    /// Peer failure (-7)
    PeerError,
}

impl ErrorKind {
    /// Numeric code
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::Os => -1,
            Self::NotOpen => -2,
            Self::Timeout => -3,
            Self::InvalidArg => -4,
            Self::InvalidDevice => -5,
            Self::InvalidResponse => -6,
            Self::PeerError => -7,
        }
    }

    /// Fixed description
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Os => "Operation system error",
            Self::NotOpen => "Not opened",
            Self::Timeout => "Timeout",
            Self::InvalidArg => "Invalid argument",
            Self::InvalidDevice => "Invalid device id",
            Self::InvalidResponse => "Invalid response",
            Self::PeerError => "Peer failure",
        }
    }

    /// Look up a numeric code
    #[must_use]
    pub const fn from_code(code: i32) -> Option<Self> {
        match code {
            -1 => Some(Self::Os),
            -2 => Some(Self::NotOpen),
            -3 => Some(Self::Timeout),
            -4 => Some(Self::InvalidArg),
            -5 => Some(Self::InvalidDevice),
            -6 => Some(Self::InvalidResponse),
            -7 => Some(Self::PeerError),
            _ => None,
        }
    }
}

/// Description of a numeric code; zero and positive values mean success
#[must_use]
pub const fn error_str(code: i32) -> &'static str {
    if code >= 0 {
        return "No error";
    }
    match ErrorKind::from_code(code) {
        Some(kind) => kind.as_str(),
        None => "Unknown error",
    }
}

/// Result alias for session operations
pub type Result<T> = std::result::Result<T, Error>;
