//! Inbound frame processing.
//!
//! Every valid frame teaches the cache where its sender lives. Notifications
//! update positions, status and drive state; requests for an ACK are
//! answered before the frame is classified for the caller.

use std::time::{Duration, Instant};

use bytes::Bytes;

use crate::device::{ADDRESS_IDLE_MS, Completion, DeviceId, address, group};
use crate::protocol::{Command, DataType, DeviceStatus, Frame, FrameHeader, Options, decode, encode};
use crate::transport::Transport;

use super::error::{Error, Result};
use super::exchange::{Request, command_label};
use super::log::session_log;
use super::{Session, timestamp_ms, timestamp_us};

/// What a received frame turned out to be
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    /// Acknowledgement of the request in flight
    Ack(FrameHeader),
    /// Response to the request in flight
    Response(Frame),
    /// Notification; already applied to the cache
    Notification(FrameHeader),
    /// Sample data pushed by a uMa device
    Samples {
        /// Sending device
        sender: u16,
        /// Sample values
        values: Vec<i32>,
    },
    /// Frame for us that needs no further handling
    Ignored(FrameHeader),
}

impl<T: Transport> Session<T> {
    /// Wait up to `timeout` for one frame and process it.
    ///
    /// Fails with [`Error::Timeout`] when nothing arrives and with
    /// [`Error::InvalidDevice`] for frames addressed to someone else.
    pub fn receive_ext(&mut self, timeout: Duration) -> Result<Received> {
        match self.receive_frame(timeout) {
            Err(Error::Timeout) => Err(self.fail(Error::Timeout)),
            other => other,
        }
    }

    /// [`Self::receive_ext`] without recording a quiet socket as an error
    pub(super) fn receive_frame(&mut self, timeout: Duration) -> Result<Received> {
        self.ensure_open()?;
        let Some(transport) = self.transport.as_mut() else {
            return Err(Error::NotOpen);
        };
        let received = transport.recv_from(&mut self.recv_buf, timeout);
        let (len, from) = match received {
            Ok(Some(datagram)) => datagram,
            Ok(None) => return Err(Error::Timeout),
            Err(err) => return Err(self.fail(Error::Os(err))),
        };

        let frame = match decode(Bytes::copy_from_slice(&self.recv_buf[..len])) {
            Ok(frame) => frame,
            Err(err) => {
                session_log!(self.logger, 3, "recv", "dropping {len} bytes from {from}: {err}");
                return Err(self.fail(err.into()));
            }
        };
        let header = *frame.header();
        let sender = header.sender();
        let receiver = header.receiver();
        let options = header.options();
        session_log!(
            self.logger,
            3,
            "recv",
            "{} from {sender} at {from} to {receiver}, id {}, options {}",
            command_label(header.command()),
            header.message_id(),
            options
        );

        self.cache.set_address(sender, from);

        if !self.accepts(receiver) {
            return Err(self.fail(Error::InvalidDevice(DeviceId::from(receiver))));
        }

        let mut samples = None;
        if options.has(Options::NOTIFY) && address::is_valid(DeviceId::from(sender)) {
            samples = self.apply_notification(&frame);
        }

        if options.has(Options::REQ_ACK)
            && (receiver == self.own_id || receiver == group::ALL_CUS || receiver == group::ALL_PCS)
        {
            self.send_ack(&header);
        }

        if let Some(values) = samples {
            return Ok(Received::Samples { sender, values });
        }
        if options.has(Options::NOTIFY) {
            return Ok(Received::Notification(header));
        }
        if receiver != self.own_id {
            return Err(self.fail(Error::InvalidDevice(DeviceId::from(receiver))));
        }
        if options.has(Options::ACK) {
            if header.message_id() == self.message_id {
                return Ok(Received::Ack(header));
            }
            return Ok(Received::Ignored(header));
        }
        if !options.has(Options::REQ) {
            if header.message_id() == self.message_id {
                return Ok(Received::Response(frame));
            }
            return Ok(Received::Ignored(header));
        }
        session_log!(
            self.logger,
            1,
            "recv",
            "unsupported request {} from {sender}",
            command_label(header.command())
        );
        Ok(Received::Ignored(header))
    }

    /// Process incoming frames and prune idle device addresses.
    ///
    /// A zero limit drains whatever is already queued. Otherwise frames are
    /// processed until the limit elapses. Returns the number of frames taken
    /// off the socket.
    pub fn receive(&mut self, time_limit_ms: u32) -> Result<usize> {
        self.ensure_open()?;
        let start = Instant::now();
        let mut count = 0;

        if time_limit_ms == 0 {
            loop {
                match self.receive_frame(Duration::ZERO) {
                    Ok(_) | Err(Error::InvalidDevice(_)) => count += 1,
                    Err(Error::InvalidResponse(_)) => {}
                    Err(_) => break,
                }
            }
        } else {
            let limit = Duration::from_millis(u64::from(time_limit_ms));
            loop {
                let remaining = limit.saturating_sub(start.elapsed());
                if remaining.is_zero() {
                    break;
                }
                match self.receive_frame(remaining.min(self.timeout())) {
                    Ok(_) | Err(Error::InvalidDevice(_)) => count += 1,
                    Err(err) if err.is_transient() => {}
                    Err(err) => return Err(err),
                }
            }
        }

        self.prune_idle_addresses();
        Ok(count)
    }

    /// Ping devices that have not been talked to for a while; forget the
    /// address of any that does not answer.
    ///
    /// Staged options and the caller's last error are left alone.
    fn prune_idle_addresses(&mut self) {
        let idle = self.cache.idle_devices(timestamp_ms(), ADDRESS_IDLE_MS);
        if idle.is_empty() {
            return;
        }
        let last_error = (self.last_error, self.last_os_errno);
        for id in idle {
            let ping = Request::new(DeviceId::from(id), Command::Ping);
            if let Err(err) = self.exchange(&ping) {
                session_log!(self.logger, 2, "receive", "forgetting address of {id}: {err}");
                self.cache.forget(id);
            }
        }
        (self.last_error, self.last_os_errno) = last_error;
    }

    fn accepts(&self, receiver: u16) -> bool {
        receiver == self.own_id
            || receiver == group::ALL_CUS
            || receiver == group::ALL_PCS
            || receiver == group::ALL_CUS_OR_PCS
    }

    fn send_ack(&mut self, header: &FrameHeader) {
        let ack = header.ack_from(self.own_id);
        let bytes = match encode(&Frame::new(ack)) {
            Ok(bytes) => bytes,
            Err(err) => {
                session_log!(self.logger, 1, "ack", "cannot encode ack: {err}");
                return;
            }
        };
        if let Err(err) = self.transmit(header.sender(), &bytes, &ack) {
            session_log!(self.logger, 1, "ack", "ack to {} failed: {err}", header.sender());
        }
    }

    /// Apply a notification to the cache; returns sample data for uMa frames
    fn apply_notification(&mut self, frame: &Frame) -> Option<Vec<i32>> {
        let header = frame.header();
        let sender = header.sender();
        let block = frame.block(0)?;
        if !block.data_type().is_some_and(DataType::is_int32) {
            session_log!(
                self.logger,
                1,
                "notify",
                "{} from {sender} with data type {}",
                command_label(header.command()),
                block.raw_type()
            );
            return None;
        }
        let values: Vec<i32> = block.values().collect();
        let first = *values.first()?;

        match Command::from_u16(header.command()) {
            Some(Command::PositionChanged) => {
                let updated = self.cache.update_positions(sender, &values, timestamp_us());
                session_log!(self.logger, 3, "notify", "{sender} positions {values:?} ({updated} axes)");
            }
            Some(Command::StatusChanged) => {
                #[allow(clippy::cast_sign_loss)]
                let status = DeviceStatus::from_bits(first as u32);
                self.cache.set_status(sender, status);
                session_log!(self.logger, 3, "notify", "{sender} status {:#x}", status.bits());
            }
            Some(Command::GotoPosCompleted) => {
                match self
                    .cache
                    .record_drive_completion(sender, header.message_id(), first)
                {
                    Completion::Applied(status) => session_log!(
                        self.logger,
                        2,
                        "notify",
                        "{sender} drive done, result {first}, status {status:?}"
                    ),
                    Completion::Duplicate => session_log!(
                        self.logger,
                        3,
                        "notify",
                        "{sender} duplicate completion {}",
                        header.message_id()
                    ),
                }
            }
            Some(Command::PressureChanged) => {
                session_log!(self.logger, 2, "notify", "{sender} pressure {values:?}");
            }
            Some(Command::UmaSamples) => return Some(values),
            _ => session_log!(
                self.logger,
                2,
                "notify",
                "unsupported notification {} from {sender}",
                command_label(header.command())
            ),
        }
        None
    }
}
