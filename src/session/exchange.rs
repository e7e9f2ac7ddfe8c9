//! Request/acknowledge/response exchanges.
//!
//! Every request gets a fresh message id. Unicast requests ask for an ACK
//! and are resent up to the retransmit count until one arrives; the timeout
//! is split evenly between the send attempts. A request that wants a
//! response keeps waiting after the ACK until the whole timeout is used.

use std::mem;
use std::time::Instant;

use bytes::Bytes;

use crate::device::{DeviceId, address};
use crate::protocol::{Command, DataType, Frame, FrameHeader, Options, SubBlock, encode};
use crate::transport::Transport;

use super::error::{Error, Result};
use super::log::session_log;
use super::receive::Received;
use super::{Session, timestamp_ms};

/// One outgoing request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request<'a> {
    device: DeviceId,
    command: u16,
    args: &'a [i32],
    args2: &'a [i32],
    options: Options,
    response: bool,
}

impl<'a> Request<'a> {
    /// Request `command` from `device` without arguments
    #[must_use]
    pub fn new(device: DeviceId, command: impl Into<u16>) -> Self {
        Self {
            device,
            command: command.into(),
            args: &[],
            args2: &[],
            options: Options::new(),
            response: false,
        }
    }

    /// First argument block
    #[must_use]
    pub const fn args(mut self, args: &'a [i32]) -> Self {
        self.args = args;
        self
    }

    /// Second argument block; only sent when the first is not empty
    #[must_use]
    pub const fn args2(mut self, args2: &'a [i32]) -> Self {
        self.args2 = args2;
        self
    }

    /// Ask the device for a response
    #[must_use]
    pub const fn with_response(mut self) -> Self {
        self.response = true;
        self
    }

    /// Extra option bits, combined with the ones the session derives
    #[must_use]
    pub const fn options(mut self, bits: u32) -> Self {
        self.options = self.options.with(bits);
        self
    }

    /// Target device
    #[must_use]
    pub const fn device(&self) -> DeviceId {
        self.device
    }

    /// Command code
    #[must_use]
    pub const fn command(&self) -> u16 {
        self.command
    }

    /// Option bits for a request to `broadcast` or unicast
    fn wire_options(&self, broadcast: bool) -> Options {
        let mut options = self.options.with(Options::REQ);
        if !broadcast {
            options = options.with(Options::REQ_ACK);
        }
        if let Some(command) = Command::from_u16(self.command) {
            if command.requests_completion() {
                options = options.with(Options::REQ_NOTIFY);
            }
            if command.is_emulated_notification() {
                options = options.with(Options::NOTIFY);
            }
        }
        if self.response {
            options = options.with(Options::REQ_RESP);
        }
        options
    }
}

impl<T: Transport> Session<T> {
    /// Stage option bits for the next request only.
    ///
    /// Bits accumulate until a request consumes them; zero clears them.
    /// Staging `REQ_RESP` makes the next request wait for a response,
    /// staging `REQ_ACK` makes it wait for an ACK even when broadcast.
    /// Returns the staged bits.
    pub fn cmd_options(&mut self, bits: u32) -> Result<u32> {
        self.ensure_open()?;
        self.next_cmd_options = if bits == 0 {
            Options::new()
        } else {
            self.next_cmd_options.with(bits)
        };
        Ok(self.next_cmd_options.bits())
    }

    /// Send a request, consuming any staged option bits.
    ///
    /// Returns the first sub-block of the matching response when one was
    /// awaited, `None` otherwise.
    pub fn send_request(&mut self, request: &Request<'_>) -> Result<Option<SubBlock>> {
        self.ensure_open()?;
        let staged = mem::take(&mut self.next_cmd_options);
        let request = request.clone().options(staged.bits());
        self.exchange(&request)
    }

    /// Send `command` with `args` and wait only for the ACK (if any)
    pub fn cmd(&mut self, dev: DeviceId, command: impl Into<u16>, args: &[i32]) -> Result<()> {
        self.send_request(&Request::new(dev, command).args(args))
            .map(|_| ())
    }

    /// Send `command` with `args` and copy the response into `resp`.
    ///
    /// At most `resp.len()` values are copied; the count the device declared
    /// is returned. A string response is packed four bytes per value,
    /// big-endian, with the last value zero padded.
    pub fn cmd_ext(
        &mut self,
        dev: DeviceId,
        command: impl Into<u16>,
        args: &[i32],
        resp: &mut [i32],
    ) -> Result<usize> {
        let request = Request::new(dev, command).args(args).with_response();
        let Some(block) = self.send_request(&request)? else {
            return Ok(0);
        };
        if block.data_type() == Some(DataType::CharString) {
            for (slot, word) in resp.iter_mut().zip(block.packed_words()) {
                *slot = word;
            }
        } else {
            for (slot, value) in resp.iter_mut().zip(block.values()) {
                *slot = value;
            }
        }
        Ok(block.count())
    }

    /// Send a query and return its response values.
    ///
    /// `expected` bounds the number of values kept.
    pub(crate) fn query(
        &mut self,
        dev: DeviceId,
        command: Command,
        args: &[i32],
        expected: usize,
    ) -> Result<Vec<i32>> {
        let request = Request::new(dev, command).args(args).with_response();
        match self.send_request(&request)? {
            Some(block) => Ok(block.values().take(expected).collect()),
            None => Ok(Vec::new()),
        }
    }

    /// Query a keyed value: the response must echo `key` followed by the value
    pub(crate) fn query_keyed(&mut self, dev: DeviceId, command: Command, key: i32) -> Result<i32> {
        let args = [key];
        let request = Request::new(dev, command).args(&args).with_response();
        let block = self.send_request(&request)?;
        let reply = block
            .as_ref()
            .map(|block| (block.count(), block.value(0), block.value(1)));
        match reply {
            Some((2, Some(echo), Some(value))) if echo == key => Ok(value),
            _ => Err(self.fail(Error::InvalidResponse(format!(
                "{command} for {key} answered with {reply:?}"
            )))),
        }
    }

    /// Build, send and await one request; staged options are not touched
    pub(super) fn exchange(&mut self, request: &Request<'_>) -> Result<Option<SubBlock>> {
        let id = self.wire_id(request.device)?;
        let broadcast = address::is_broadcast(request.device);
        let options = request.wire_options(broadcast);

        self.message_id = self.message_id.wrapping_add(1);
        let header = FrameHeader::new(id, self.own_id, self.message_id, options, request.command);
        let mut frame = Frame::new(header);
        if !request.args.is_empty() {
            frame = frame.with_block(SubBlock::int32(request.args));
            if !request.args2.is_empty() {
                frame = frame.with_block(SubBlock::int32(request.args2));
            }
        }
        let bytes = match encode(&frame) {
            Ok(bytes) => bytes,
            Err(err) => {
                session_log!(self.logger, 1, "send_request", "cannot encode: {err}");
                return Err(self.fail(Error::InvalidArg("too many arguments")));
            }
        };

        let expect_ack = options.has(Options::REQ_ACK);
        let expect_resp = options.has(Options::REQ_RESP);
        if !expect_ack && !expect_resp {
            self.transmit(id, &bytes, &header)?;
            return Ok(None);
        }
        self.await_reply(id, &bytes, &header, expect_ack, expect_resp)
    }

    /// Resend loop for one request
    fn await_reply(
        &mut self,
        id: u16,
        bytes: &Bytes,
        header: &FrameHeader,
        expect_ack: bool,
        expect_resp: bool,
    ) -> Result<Option<SubBlock>> {
        let start = Instant::now();
        let timeout = self.timeout();
        let deadline = start + timeout;
        let cycles = if expect_ack {
            self.retransmit_count.max(1)
        } else {
            1
        };
        let mut sends = 0;
        let mut acked = false;

        loop {
            if !acked && sends < cycles {
                if sends > 0 {
                    session_log!(
                        self.logger,
                        2,
                        "send_request",
                        "resending {} to {id}, attempt {}",
                        header.message_id(),
                        sends + 1
                    );
                }
                self.transmit(id, bytes, header)?;
                sends += 1;
            }
            let wait_until = if acked || sends >= cycles {
                deadline
            } else {
                start + timeout * sends / cycles
            };

            // ends with a zero-wait poll, so queued replies are read even
            // when the window is already over
            loop {
                let remaining = wait_until.saturating_duration_since(Instant::now());
                match self.receive_frame(remaining) {
                    Ok(Received::Ack(ack)) if ack.command() == header.command() => {
                        if ack.options().has(Options::ERROR) {
                            return Err(self.fail(Error::PeerError));
                        }
                        if !expect_resp {
                            return Ok(None);
                        }
                        acked = true;
                        break;
                    }
                    Ok(Received::Response(frame))
                        if expect_resp && frame.header().command() == header.command() =>
                    {
                        return self.accept_response(&frame).map(Some);
                    }
                    Ok(_) => {}
                    Err(Error::Timeout) if remaining.is_zero() => break,
                    Err(err) if err.is_transient() => {}
                    Err(err) => return Err(err),
                }
            }

            if Instant::now() >= deadline {
                session_log!(
                    self.logger,
                    2,
                    "send_request",
                    "no reply to {} from {id} after {} sends",
                    header.message_id(),
                    sends
                );
                return Err(self.fail(Error::Timeout));
            }
        }
    }

    /// Check the payload of a matched response
    fn accept_response(&mut self, frame: &Frame) -> Result<SubBlock> {
        let Some(block) = frame.block(0) else {
            if frame.header().options().has(Options::ERROR) {
                return Err(self.fail(Error::PeerError));
            }
            return Err(self.fail(Error::InvalidResponse("empty response".to_string())));
        };
        match block.data_type() {
            Some(DataType::Uint32 | DataType::Int32 | DataType::CharString) => Ok(block.clone()),
            _ => Err(self.fail(Error::InvalidResponse(format!(
                "unsupported data type {}",
                block.raw_type()
            )))),
        }
    }

    /// Send an encoded frame to `id` and note the send time
    pub(crate) fn transmit(&mut self, id: u16, bytes: &[u8], header: &FrameHeader) -> Result<()> {
        let dest = address::resolve_destination(self.cache.address(id), id, self.port, self.target);
        let sent = self.transport()?.send_to(bytes, dest);
        match sent {
            Ok(_) => {
                self.cache.mark_sent(id, timestamp_ms());
                session_log!(
                    self.logger,
                    2,
                    "send",
                    "{} to {id} at {dest}, id {}, options {}",
                    command_label(header.command()),
                    header.message_id(),
                    header.options()
                );
                Ok(())
            }
            Err(err) => Err(self.fail(Error::Os(err))),
        }
    }
}

/// Name of a command code, or the number for unknown codes
pub(crate) fn command_label(code: u16) -> String {
    Command::from_u16(code).map_or_else(|| code.to_string(), |command| command.name().to_string())
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::time::Duration;

    use super::*;
    use crate::device::group;
    use crate::protocol::decode;
    use crate::session::SessionConfig;
    use crate::session::error::ErrorKind;
    use crate::transport::MockTransport;

    const DEV: DeviceId = 1;

    fn peer() -> SocketAddr {
        "169.254.0.1:55555".parse().unwrap()
    }

    fn reply(request: &[u8], options: u32, values: &[i32]) -> Vec<u8> {
        let header = *decode(Bytes::copy_from_slice(request)).unwrap().header();
        let out = FrameHeader::new(
            header.sender(),
            header.receiver(),
            header.message_id(),
            Options::from_bits(options),
            header.command(),
        );
        let mut frame = Frame::new(out);
        if !values.is_empty() {
            frame = frame.with_block(SubBlock::int32(values));
        }
        encode(&frame).unwrap().to_vec()
    }

    fn session_with(mock: &MockTransport, timeout_ms: u32) -> Session<MockTransport> {
        let config = SessionConfig::default().with_timeout_ms(timeout_ms);
        Session::with_transport(mock.clone(), &config).unwrap()
    }

    fn sent_header(mock: &MockTransport, index: usize) -> FrameHeader {
        let (bytes, _) = &mock.sent()[index];
        *decode(Bytes::copy_from_slice(bytes)).unwrap().header()
    }

    #[test]
    fn test_unicast_request_options() {
        let mock = MockTransport::with_responder(|data, _| {
            vec![(reply(data, Options::ACK, &[]), peer())]
        });
        let mut session = session_with(&mock, 50);
        session.cmd(DEV, Command::Stop, &[]).unwrap();

        let header = sent_header(&mock, 0);
        assert_eq!(header.receiver(), 1);
        assert_eq!(header.sender(), session.own_id());
        assert!(header.options().has(Options::REQ));
        assert!(header.options().has(Options::REQ_ACK));
        assert!(!header.options().has(Options::REQ_RESP));
        assert_eq!(mock.sent_count(), 1);
    }

    #[test]
    fn test_broadcast_is_fire_and_forget() {
        let mock = MockTransport::new();
        let mut session = session_with(&mock, 50);
        session
            .cmd(DeviceId::from(group::ALL_DEVICES), Command::Stop, &[])
            .unwrap();

        let header = sent_header(&mock, 0);
        assert!(!header.options().has(Options::REQ_ACK));
        assert_eq!(mock.empty_polls(), 0);
    }

    #[test]
    fn test_goto_requests_completion_notify() {
        let mock = MockTransport::with_responder(|data, _| {
            vec![(reply(data, Options::ACK, &[]), peer())]
        });
        let mut session = session_with(&mock, 50);
        session.cmd(DEV, Command::GotoPos, &[1000]).unwrap();
        assert!(sent_header(&mock, 0).options().has(Options::REQ_NOTIFY));
    }

    #[test]
    fn test_message_ids_increase() {
        let mock = MockTransport::with_responder(|data, _| {
            vec![(reply(data, Options::ACK, &[]), peer())]
        });
        let mut session = session_with(&mock, 50);
        session.cmd(DEV, Command::Ping, &[]).unwrap();
        session.cmd(DEV, Command::Ping, &[]).unwrap();
        let first = sent_header(&mock, 0).message_id();
        assert_eq!(sent_header(&mock, 1).message_id(), first.wrapping_add(1));
    }

    #[test]
    fn test_response_copied_and_count_returned() {
        let mock = MockTransport::with_responder(|data, _| {
            vec![
                (reply(data, Options::ACK, &[]), peer()),
                (reply(data, 0, &[7, 8, 9]), peer()),
            ]
        });
        let mut session = session_with(&mock, 50);
        let mut resp = [0; 2];
        let count = session
            .cmd_ext(DEV, Command::GetVersion, &[], &mut resp)
            .unwrap();
        assert_eq!(count, 3);
        assert_eq!(resp, [7, 8]);
    }

    fn block_reply(request: &[u8], block: SubBlock) -> Vec<u8> {
        let header = *decode(Bytes::copy_from_slice(request)).unwrap().header();
        let out = FrameHeader::new(
            header.sender(),
            header.receiver(),
            header.message_id(),
            Options::new(),
            header.command(),
        );
        encode(&Frame::new(out).with_block(block)).unwrap().to_vec()
    }

    #[test]
    fn test_string_response_keeps_tail() {
        let mock = MockTransport::with_responder(|data, _| {
            vec![
                (reply(data, Options::ACK, &[]), peer()),
                (block_reply(data, SubBlock::string("uMs-2 rev B")), peer()),
            ]
        });
        let mut session = session_with(&mock, 50);
        let mut resp = [0i32; 8];
        let count = session
            .cmd_ext(DEV, Command::GetInfoText, &[], &mut resp)
            .unwrap();
        assert_eq!(count, 11);

        let bytes: Vec<u8> = resp.iter().flat_map(|word| word.to_be_bytes()).collect();
        assert_eq!(&bytes[..11], b"uMs-2 rev B");
        assert_eq!(bytes[11], 0);
        assert_eq!(resp[3], 0);
    }

    #[test]
    fn test_narrow_integer_response_rejected() {
        let mock = MockTransport::with_responder(|data, _| {
            let block =
                SubBlock::from_parts(DataType::Int16.as_u16(), 1, Bytes::from_static(&[0, 0, 0, 5]));
            vec![
                (reply(data, Options::ACK, &[]), peer()),
                (block_reply(data, block), peer()),
            ]
        });
        let mut session = session_with(&mock, 50);
        let err = session
            .cmd_ext(DEV, Command::GetVersion, &[], &mut [0; 4])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidResponse);
    }

    #[test]
    fn test_zero_timeout_still_reads_queued_ack() {
        let mock = MockTransport::with_responder(|data, _| {
            vec![(reply(data, Options::ACK, &[]), peer())]
        });
        let mut session = session_with(&mock, 0);
        session.cmd(DEV, Command::Ping, &[]).unwrap();
        assert_eq!(mock.sent_count(), 1);
    }

    #[test]
    fn test_zero_timeout_without_reply() {
        let mock = MockTransport::new();
        let mut session = session_with(&mock, 0);
        let err = session.cmd(DEV, Command::Ping, &[]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert_eq!(mock.sent_count(), 1);
    }

    #[test]
    fn test_empty_response_with_error_is_peer_error() {
        let mock = MockTransport::with_responder(|data, _| {
            vec![(reply(data, Options::ERROR, &[]), peer())]
        });
        let mut session = session_with(&mock, 50);
        let err = session
            .cmd_ext(DEV, Command::GetVersion, &[], &mut [0; 4])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PeerError);
    }

    #[test]
    fn test_empty_response_is_invalid() {
        let mock = MockTransport::with_responder(|data, _| vec![(reply(data, 0, &[]), peer())]);
        let mut session = session_with(&mock, 50);
        let err = session
            .cmd_ext(DEV, Command::GetVersion, &[], &mut [0; 4])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidResponse);
        assert_eq!(session.last_error(), Some(ErrorKind::InvalidResponse));
    }

    #[test]
    fn test_ack_with_error_flag() {
        let mock = MockTransport::with_responder(|data, _| {
            vec![(reply(data, Options::ACK | Options::ERROR, &[]), peer())]
        });
        let mut session = session_with(&mock, 50);
        let err = session.cmd(DEV, Command::Stop, &[]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PeerError);
    }

    #[test]
    fn test_retransmit_bound() {
        let mock = MockTransport::new();
        let mut session = session_with(&mock, 60);
        let start = Instant::now();
        let err = session.cmd(DEV, Command::Ping, &[]).unwrap_err();
        let elapsed = start.elapsed();

        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert_eq!(mock.sent_count(), 3);
        assert!(elapsed >= Duration::from_millis(60));
        assert!(elapsed < Duration::from_millis(500), "took {elapsed:?}");
    }

    #[test]
    fn test_ack_stops_resends_while_waiting_for_response() {
        let mock = MockTransport::with_responder(|data, _| {
            vec![(reply(data, Options::ACK, &[]), peer())]
        });
        let mut session = session_with(&mock, 60);
        let err = session
            .cmd_ext(DEV, Command::GetVersion, &[], &mut [0; 4])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert_eq!(mock.sent_count(), 1);
    }

    #[test]
    fn test_staged_options_apply_once() {
        let mock = MockTransport::new();
        let mut session = session_with(&mock, 20);
        let broadcast = DeviceId::from(group::ALL_DEVICES);

        assert_eq!(session.cmd_options(Options::PRIORITY).unwrap(), Options::PRIORITY);
        session.cmd(broadcast, Command::Stop, &[]).unwrap();
        session.cmd(broadcast, Command::Stop, &[]).unwrap();

        assert!(sent_header(&mock, 0).options().has(Options::PRIORITY));
        assert!(!sent_header(&mock, 1).options().has(Options::PRIORITY));
        assert_eq!(session.cmd_options(0).unwrap(), 0);
    }

    #[test]
    fn test_invalid_device_not_sent() {
        let mock = MockTransport::new();
        let mut session = session_with(&mock, 20);
        let err = session.cmd(70_000, Command::Ping, &[]);
        assert_eq!(err.unwrap_err().kind(), ErrorKind::InvalidDevice);
        assert_eq!(mock.sent_count(), 0);
    }

    #[test]
    fn test_second_block_needs_first() {
        let mock = MockTransport::new();
        let mut session = session_with(&mock, 20);
        let request = Request::new(DeviceId::from(group::ALL_DEVICES), Command::GotoPos)
            .args(&[1, 2])
            .args2(&[3]);
        session.send_request(&request).unwrap();

        let (bytes, _) = &mock.sent()[0];
        let frame = decode(Bytes::copy_from_slice(bytes)).unwrap();
        assert_eq!(frame.blocks().len(), 2);
        assert_eq!(frame.block(1).unwrap().values().collect::<Vec<_>>(), vec![3]);
    }
}
