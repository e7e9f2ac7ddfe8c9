//! Session configuration

use crate::DEFAULT_PORT;

use super::error::{Error, Result};

/// Default broadcast target
pub const DEFAULT_TARGET: &str = "169.254.255.255";
/// Default per-exchange timeout in milliseconds
pub const DEFAULT_TIMEOUT_MS: u32 = 20;
/// Upper bound for any timeout or refresh limit
pub const MAX_TIMEOUT_MS: u32 = 60_000;
/// Default number of send attempts for acknowledged requests
pub const DEFAULT_RETRANSMIT_COUNT: u32 = 3;
/// Default position cache refresh limit in milliseconds
pub const DEFAULT_REFRESH_TIME_MS: u32 = 20;
/// Highest group number; groups map to consecutive ports
pub const MAX_GROUP: u16 = 10;

/// How old cached positions may be before the device is queried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TimeLimit {
    /// Always answer from the cache when it has anything
    CacheOnly,
    /// Always query the device
    Force,
    /// Query when the cache is at least this many milliseconds old
    Millis(u32),
}

impl TimeLimit {
    /// Convert the numeric form: 0 cache only, -1 force, otherwise milliseconds
    #[must_use]
    pub fn from_ms(ms: i32) -> Option<Self> {
        match ms {
            0 => Some(Self::CacheOnly),
            -1 => Some(Self::Force),
            ms => u32::try_from(ms)
                .ok()
                .filter(|ms| *ms <= MAX_TIMEOUT_MS)
                .map(Self::Millis),
        }
    }

    /// Numeric form of the limit
    #[must_use]
    pub fn as_ms(self) -> i32 {
        match self {
            Self::CacheOnly => 0,
            Self::Force => -1,
            Self::Millis(ms) => i32::try_from(ms).unwrap_or(i32::MAX),
        }
    }

    pub(crate) fn is_valid(self) -> bool {
        match self {
            Self::Millis(ms) => ms <= MAX_TIMEOUT_MS,
            _ => true,
        }
    }
}

impl Default for TimeLimit {
    fn default() -> Self {
        Self::Millis(DEFAULT_REFRESH_TIME_MS)
    }
}

/// Settings used when opening a session
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SessionConfig {
    /// Dotted IPv4 target: broadcast, multicast or unicast
    pub target: String,
    /// Per-exchange timeout in milliseconds
    pub timeout_ms: u32,
    /// Group number 0..=10, or an explicit port in the group port range
    pub group: u16,
    /// Send attempts for acknowledged requests
    pub retransmit_count: u32,
    /// Position cache refresh limit
    pub refresh_time_limit: TimeLimit,
    /// Log verbosity forwarded to the log callback
    pub verbose: u8,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            target: DEFAULT_TARGET.to_string(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            group: 0,
            retransmit_count: DEFAULT_RETRANSMIT_COUNT,
            refresh_time_limit: TimeLimit::default(),
            verbose: 0,
        }
    }
}

impl SessionConfig {
    /// Default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the target address
    #[must_use]
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    /// Set the exchange timeout
    #[must_use]
    pub const fn with_timeout_ms(mut self, timeout_ms: u32) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Set the group number or explicit port
    #[must_use]
    pub const fn with_group(mut self, group: u16) -> Self {
        self.group = group;
        self
    }

    /// Set the send attempt count for acknowledged requests
    #[must_use]
    pub const fn with_retransmit_count(mut self, count: u32) -> Self {
        self.retransmit_count = count;
        self
    }

    /// Set the position cache refresh limit
    #[must_use]
    pub const fn with_refresh_time_limit(mut self, limit: TimeLimit) -> Self {
        self.refresh_time_limit = limit;
        self
    }

    /// Set the log verbosity
    #[must_use]
    pub const fn with_verbose(mut self, verbose: u8) -> Self {
        self.verbose = verbose;
        self
    }

    /// UDP port the session talks on.
    ///
    /// Values below the default port are group numbers added to it.
    #[must_use]
    pub fn port(&self) -> u16 {
        if self.group < DEFAULT_PORT {
            DEFAULT_PORT.saturating_add(self.group)
        } else {
            self.group
        }
    }

    /// Check the ranges of every field except the target
    pub fn validate(&self) -> Result<()> {
        let port_range = DEFAULT_PORT..=DEFAULT_PORT + MAX_GROUP;
        if self.group < DEFAULT_PORT && self.group > MAX_GROUP {
            return Err(Error::InvalidArg("group out of range"));
        }
        if !port_range.contains(&self.port()) {
            return Err(Error::InvalidArg("port out of range"));
        }
        if self.timeout_ms > MAX_TIMEOUT_MS {
            return Err(Error::InvalidArg("timeout out of range"));
        }
        if !self.refresh_time_limit.is_valid() {
            return Err(Error::InvalidArg("refresh time limit out of range"));
        }
        Ok(())
    }
}
