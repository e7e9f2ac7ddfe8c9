//! Client session: one socket, one device cache, one exchange at a time.
//!
//! A [`Session`] owns its transport and all per-device state. Commands are
//! blocking request/acknowledge/response exchanges; notifications that
//! arrive meanwhile update the cache as a side effect.

mod commands;
mod config;
mod error;
mod exchange;
mod log;
mod pressure;
mod receive;
mod stage;

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use uuid::Uuid;

use crate::device::{DeviceCache, DeviceId, address, group};
use crate::protocol::{MAX_FRAME_SIZE, Options};
use crate::transport::{Transport, UdpTransport};

pub use commands::{PositionRead, UMA_REG_COUNT};
pub use config::{
    DEFAULT_REFRESH_TIME_MS, DEFAULT_RETRANSMIT_COUNT, DEFAULT_TARGET, DEFAULT_TIMEOUT_MS,
    MAX_GROUP, MAX_TIMEOUT_MS, SessionConfig, TimeLimit,
};
pub use error::{Error, ErrorKind, Result, error_str};
pub use exchange::Request;
pub use log::LogCallback;
pub use pressure::{MAX_CALIBRATION_DELAY_MS, MAX_PRESSURE_KPA, PRESSURE_CHANNELS};
pub use receive::Received;
pub use stage::{
    BowlCenter, BowlControl, MAX_BOWL_CENTERS, MAX_LENS_POSITION, MAX_MAGNIFICATION, ObjectiveConf,
};

use self::log::{Logger, session_log};

/// Microseconds since the Unix epoch
#[must_use]
pub fn timestamp_us() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| {
            u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX)
        })
}

/// Milliseconds since the Unix epoch
#[must_use]
pub fn timestamp_ms() -> u64 {
    timestamp_us() / 1000
}

/// SMCP1 client session
pub struct Session<T: Transport = UdpTransport> {
    transport: Option<T>,
    own_id: u16,
    message_id: u16,
    timeout_ms: u32,
    retransmit_count: u32,
    refresh_time_limit: TimeLimit,
    next_cmd_options: Options,
    cache: DeviceCache,
    port: u16,
    target: SocketAddr,
    last_error: Option<ErrorKind>,
    last_os_errno: Option<i32>,
    logger: Logger,
    recv_buf: Vec<u8>,
}

impl Session<UdpTransport> {
    /// Open a UDP session described by `config`.
    ///
    /// The target must be a dotted IPv4 address; anything else fails with an
    /// OS error of kind `InvalidInput`.
    pub fn open(config: &SessionConfig) -> Result<Self> {
        config.validate()?;
        let target = parse_target(&config.target, config.port())?;
        let transport = UdpTransport::open(target)?;
        Self::with_transport(transport, config)
    }
}

impl<T: Transport> Session<T> {
    /// Build a session on an already open transport
    pub fn with_transport(transport: T, config: &SessionConfig) -> Result<Self> {
        config.validate()?;
        let port = config.port();
        let target = parse_target(&config.target, port)?;

        let jitter = u16::try_from(Uuid::new_v4().as_u128() & 100).unwrap_or(0);
        let own_id = group::ALL_PCS - 100 - jitter;

        let session = Self {
            transport: Some(transport),
            own_id,
            message_id: 0,
            timeout_ms: config.timeout_ms,
            retransmit_count: config.retransmit_count,
            refresh_time_limit: config.refresh_time_limit,
            next_cmd_options: Options::new(),
            cache: DeviceCache::new(),
            port,
            target: SocketAddr::V4(target),
            last_error: None,
            last_os_errno: None,
            logger: Logger::new(config.verbose),
            recv_buf: vec![0; MAX_FRAME_SIZE],
        };
        session_log!(
            session.logger,
            1,
            "open",
            "target {}, own id {}, timeout {}ms",
            session.target,
            session.own_id,
            session.timeout_ms
        );
        Ok(session)
    }

    /// Release the transport; later operations fail with [`Error::NotOpen`]
    pub fn close(&mut self) {
        if self.transport.take().is_some() {
            session_log!(self.logger, 1, "close", "session closed");
        }
    }

    /// Whether the transport is still held
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.transport.is_some()
    }

    /// The id this session sends from
    #[must_use]
    pub const fn own_id(&self) -> u16 {
        self.own_id
    }

    /// UDP port in use
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Fallback destination for devices without a known address
    #[must_use]
    pub const fn target(&self) -> SocketAddr {
        self.target
    }

    /// Local address of the transport
    pub fn local_addr(&mut self) -> Result<SocketAddr> {
        let result = self.transport()?.local_addr();
        result.map_err(|err| self.fail(Error::Os(err)))
    }

    /// Id of the most recent request
    #[must_use]
    pub const fn message_id(&self) -> u16 {
        self.message_id
    }

    /// Per-exchange timeout in milliseconds
    #[must_use]
    pub const fn timeout_ms(&self) -> u32 {
        self.timeout_ms
    }

    /// Change the per-exchange timeout
    pub fn set_timeout(&mut self, timeout_ms: u32) -> Result<()> {
        self.ensure_open()?;
        if timeout_ms > MAX_TIMEOUT_MS {
            return Err(self.fail(Error::InvalidArg("timeout out of range")));
        }
        self.timeout_ms = timeout_ms;
        Ok(())
    }

    /// Position cache refresh limit
    #[must_use]
    pub const fn refresh_time_limit(&self) -> TimeLimit {
        self.refresh_time_limit
    }

    /// Change the position cache refresh limit
    pub fn set_refresh_time_limit(&mut self, limit: TimeLimit) -> Result<()> {
        self.ensure_open()?;
        if !limit.is_valid() {
            return Err(self.fail(Error::InvalidArg("refresh time limit out of range")));
        }
        self.refresh_time_limit = limit;
        Ok(())
    }

    /// Send attempts for acknowledged requests
    #[must_use]
    pub const fn retransmit_count(&self) -> u32 {
        self.retransmit_count
    }

    /// Change the send attempt count; zero behaves as one
    pub fn set_retransmit_count(&mut self, count: u32) -> Result<()> {
        self.ensure_open()?;
        self.retransmit_count = count;
        Ok(())
    }

    /// Install a log callback and verbosity; `None` removes the callback
    pub fn set_log_func(&mut self, verbose: u8, callback: Option<LogCallback>) -> Result<()> {
        self.ensure_open()?;
        self.logger.set(verbose, callback);
        Ok(())
    }

    /// Kind of the most recent failure
    #[must_use]
    pub const fn last_error(&self) -> Option<ErrorKind> {
        self.last_error
    }

    /// OS error number of the most recent OS failure
    #[must_use]
    pub const fn last_os_errno(&self) -> Option<i32> {
        self.last_os_errno
    }

    /// Description of the most recent failure
    #[must_use]
    pub fn last_error_str(&self) -> &'static str {
        self.last_error.map_or("No error", ErrorKind::as_str)
    }

    /// Read-only view of the device cache
    #[must_use]
    pub const fn cache(&self) -> &DeviceCache {
        &self.cache
    }

    /// Record `err` as the last error and hand it back
    fn fail(&mut self, err: Error) -> Error {
        if let Error::Os(io) = &err {
            self.last_os_errno = io.raw_os_error();
        }
        self.last_error = Some(err.kind());
        session_log!(self.logger, 2, "error", "{err}");
        err
    }

    fn ensure_open(&mut self) -> Result<()> {
        if self.transport.is_some() {
            Ok(())
        } else {
            Err(self.fail(Error::NotOpen))
        }
    }

    fn transport(&mut self) -> Result<&mut T> {
        self.ensure_open()?;
        self.transport.as_mut().ok_or(Error::NotOpen)
    }

    /// Validate a device id and resolve it to its wire form
    fn wire_id(&mut self, dev: DeviceId) -> Result<u16> {
        self.ensure_open()?;
        match address::wire_id(dev) {
            Some(id) => Ok(id),
            None => Err(self.fail(Error::InvalidDevice(dev))),
        }
    }

    fn timeout(&self) -> Duration {
        Duration::from_millis(u64::from(self.timeout_ms))
    }
}

impl<T: Transport> std::fmt::Debug for Session<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("open", &self.is_open())
            .field("own_id", &self.own_id)
            .field("target", &self.target)
            .field("timeout_ms", &self.timeout_ms)
            .field("logger", &self.logger)
            .finish_non_exhaustive()
    }
}

fn parse_target(target: &str, port: u16) -> Result<SocketAddrV4> {
    let ip: Ipv4Addr = target.parse().map_err(|_| {
        Error::Os(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("invalid target address {target:?}"),
        ))
    })?;
    Ok(SocketAddrV4::new(ip, port))
}
