//! Session log routing.
//!
//! Every message becomes a `tracing` event. Level 1 maps to info, 2 to debug
//! and anything higher to trace. An optional callback also receives messages
//! up to the session's verbosity.

use std::fmt;

use tracing::{debug, info, trace};

/// Log callback: verbosity level, originating function, message
pub type LogCallback = Box<dyn Fn(u8, &str, &str) + Send>;

pub(crate) struct Logger {
    verbose: u8,
    callback: Option<LogCallback>,
}

impl Logger {
    pub(crate) const fn new(verbose: u8) -> Self {
        Self {
            verbose,
            callback: None,
        }
    }

    pub(crate) const fn verbose(&self) -> u8 {
        self.verbose
    }

    pub(crate) fn set(&mut self, verbose: u8, callback: Option<LogCallback>) {
        self.verbose = verbose;
        self.callback = callback;
    }

    pub(crate) fn log(&self, level: u8, func: &str, message: fmt::Arguments<'_>) {
        match level {
            0 | 1 => info!(func, "{message}"),
            2 => debug!(func, "{message}"),
            _ => trace!(func, "{message}"),
        }
        if level <= self.verbose {
            if let Some(callback) = &self.callback {
                callback(level, func, &message.to_string());
            }
        }
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("verbose", &self.verbose)
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

/// Log through a session's logger
macro_rules! session_log {
    ($logger:expr, $level:expr, $func:expr, $($arg:tt)+) => {
        $logger.log($level, $func, format_args!($($arg)+))
    };
}

pub(crate) use session_log;
