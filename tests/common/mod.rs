#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use smcp::device::group;
use smcp::protocol::{Command, Frame, FrameHeader, Options, SubBlock, decode, encode};
use smcp::session::{Session, SessionConfig};
use smcp::transport::MockTransport;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// One simulated device on the link
pub struct SimDevice {
    pub id: u16,
    pub addr: SocketAddr,
    pub positions: Vec<i32>,
    /// Keyed replies: (command, key) -> value, answered as `[key, value]`
    pub keyed: HashMap<(u16, i32), i32>,
    /// Plain replies by command
    pub replies: HashMap<u16, Vec<i32>>,
    /// Added to the echoed key of keyed replies
    pub echo_offset: i32,
    /// Swallow requests without answering
    pub silent: bool,
    pub requests: Vec<Frame>,
}

impl SimDevice {
    pub fn new(id: u16, addr: &str) -> Self {
        Self {
            id,
            addr: addr.parse().unwrap(),
            positions: Vec::new(),
            keyed: HashMap::new(),
            replies: HashMap::new(),
            echo_offset: 0,
            silent: false,
            requests: Vec::new(),
        }
    }

    fn addressed_by(&self, receiver: u16) -> bool {
        receiver == self.id || receiver == group::ALL_DEVICES || receiver == group::ALL
    }

    fn response_values(&self, frame: &Frame) -> Vec<i32> {
        let command = frame.header().command();
        if command == Command::GetPositions.as_u16() {
            return self.positions.clone();
        }
        if let Some(values) = self.replies.get(&command) {
            return values.clone();
        }
        let key = frame.block(0).and_then(|block| block.value(0)).unwrap_or(0);
        match self.keyed.get(&(command, key)) {
            Some(value) => vec![key + self.echo_offset, *value],
            None => vec![0],
        }
    }

    fn answer(&mut self, frame: &Frame) -> Vec<(Vec<u8>, SocketAddr)> {
        self.requests.push(frame.clone());
        if self.silent {
            return Vec::new();
        }
        let header = *frame.header();
        let mut replies = Vec::new();
        if header.options().has(Options::REQ_ACK) {
            let ack = Frame::new(header.ack_from(self.id));
            replies.push((encode(&ack).unwrap().to_vec(), self.addr));
        }
        if header.options().has(Options::REQ_RESP) {
            let reply = FrameHeader::new(
                header.sender(),
                self.id,
                header.message_id(),
                Options::new(),
                header.command(),
            );
            let values = self.response_values(frame);
            let resp = Frame::new(reply).with_block(SubBlock::int32(&values));
            replies.push((encode(&resp).unwrap().to_vec(), self.addr));
        }
        replies
    }
}

/// Devices sharing one mock link
#[derive(Clone, Default)]
pub struct SimNetwork {
    devices: Arc<Mutex<Vec<SimDevice>>>,
}

impl SimNetwork {
    pub fn new(devices: Vec<SimDevice>) -> Self {
        Self {
            devices: Arc::new(Mutex::new(devices)),
        }
    }

    pub fn transport(&self) -> MockTransport {
        let devices = Arc::clone(&self.devices);
        MockTransport::with_responder(move |data, _dest| {
            let Ok(frame) = decode(Bytes::copy_from_slice(data)) else {
                return Vec::new();
            };
            // ACKs from the session are not requests
            if !frame.header().options().has(Options::REQ) {
                return Vec::new();
            }
            let mut devices = devices.lock().unwrap();
            devices
                .iter_mut()
                .filter(|dev| dev.addressed_by(frame.header().receiver()))
                .flat_map(|dev| dev.answer(&frame))
                .collect()
        })
    }

    pub fn with_device<R>(&self, id: u16, f: impl FnOnce(&mut SimDevice) -> R) -> R {
        let mut devices = self.devices.lock().unwrap();
        let dev = devices.iter_mut().find(|dev| dev.id == id).unwrap();
        f(dev)
    }

    /// Every request device `id` has seen
    pub fn requests(&self, id: u16) -> Vec<Frame> {
        self.with_device(id, |dev| dev.requests.clone())
    }
}

pub fn session_on(transport: MockTransport, config: &SessionConfig) -> Session<MockTransport> {
    init_tracing();
    Session::with_transport(transport, config).unwrap()
}

pub fn args(frame: &Frame, block: usize) -> Vec<i32> {
    frame
        .block(block)
        .map(|block| block.values().collect())
        .unwrap_or_default()
}

pub fn notify(receiver: u16, sender: u16, msg_id: u16, command: Command, values: &[i32]) -> Vec<u8> {
    let header = FrameHeader::new(
        receiver,
        sender,
        msg_id,
        Options::from_bits(Options::NOTIFY),
        command.as_u16(),
    );
    encode(&Frame::new(header).with_block(SubBlock::int32(values)))
        .unwrap()
        .to_vec()
}
