//! SMCP1 frame header
//!
//! The header is 16 bytes, all fields big-endian.

use super::{FrameError, HEADER_SIZE, MAX_SUB_BLOCKS, Options, PROTOCOL_VERSION, Result};

/// SMCP1 frame header (16 bytes)
///
/// # Wire Format
///
/// ```text
/// 0                   1                   2                   3
/// 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |    Version    |   Reserved    |          Receiver ID          |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |           Sender ID           |          Message ID           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                          Options (4)                          |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |         Type (command)        |        Sub-block count        |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    version: u8,
    reserved: u8,
    receiver: u16,
    sender: u16,
    message_id: u16,
    options: Options,
    command: u16,
    sub_blocks: u16,
}

impl FrameHeader {
    /// Create a new header with no sub-blocks
    #[must_use]
    pub const fn new(
        receiver: u16,
        sender: u16,
        message_id: u16,
        options: Options,
        command: u16,
    ) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            reserved: 0,
            receiver,
            sender,
            message_id,
            options,
            command,
            sub_blocks: 0,
        }
    }

    /// Build the acknowledgement for this header.
    ///
    /// Type and message id are echoed, sender and receiver are swapped.
    #[must_use]
    pub const fn ack_from(&self, own_id: u16) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            reserved: 0,
            receiver: self.sender,
            sender: own_id,
            message_id: self.message_id,
            options: Options::from_bits(Options::ACK),
            command: self.command,
            sub_blocks: 0,
        }
    }

    /// Get version byte
    #[must_use]
    pub const fn version(&self) -> u8 {
        self.version
    }

    /// Get receiver id
    #[must_use]
    pub const fn receiver(&self) -> u16 {
        self.receiver
    }

    /// Get sender id
    #[must_use]
    pub const fn sender(&self) -> u16 {
        self.sender
    }

    /// Get message id
    #[must_use]
    pub const fn message_id(&self) -> u16 {
        self.message_id
    }

    /// Get options
    #[must_use]
    pub const fn options(&self) -> Options {
        self.options
    }

    /// Replace options
    pub fn set_options(&mut self, options: Options) {
        self.options = options;
    }

    /// Get raw command/type code
    #[must_use]
    pub const fn command(&self) -> u16 {
        self.command
    }

    /// Get declared sub-block count
    #[must_use]
    pub const fn sub_blocks(&self) -> u16 {
        self.sub_blocks
    }

    pub(crate) fn set_sub_blocks(&mut self, count: u16) {
        self.sub_blocks = count;
    }

    /// Validate header
    pub fn validate(&self) -> Result<()> {
        if self.version != PROTOCOL_VERSION {
            return Err(FrameError::InvalidVersion {
                found: self.version,
            });
        }
        if usize::from(self.sub_blocks) > MAX_SUB_BLOCKS {
            return Err(FrameError::TooManySubBlocks {
                count: self.sub_blocks,
                max: MAX_SUB_BLOCKS,
            });
        }
        Ok(())
    }

    /// Convert to bytes (network byte order)
    #[must_use]
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[0] = self.version;
        bytes[1] = self.reserved;
        bytes[2..4].copy_from_slice(&self.receiver.to_be_bytes());
        bytes[4..6].copy_from_slice(&self.sender.to_be_bytes());
        bytes[6..8].copy_from_slice(&self.message_id.to_be_bytes());
        bytes[8..12].copy_from_slice(&self.options.bits().to_be_bytes());
        bytes[12..14].copy_from_slice(&self.command.to_be_bytes());
        bytes[14..16].copy_from_slice(&self.sub_blocks.to_be_bytes());
        bytes
    }

    /// Parse from bytes
    ///
    /// Only the length is checked here; use [`FrameHeader::validate`] for the
    /// version and sub-block limits.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let Some(raw) = bytes.first_chunk::<HEADER_SIZE>() else {
            return Err(FrameError::BufferTooSmall {
                needed: HEADER_SIZE,
                got: bytes.len(),
            });
        };

        Ok(Self {
            version: raw[0],
            reserved: raw[1],
            receiver: u16::from_be_bytes([raw[2], raw[3]]),
            sender: u16::from_be_bytes([raw[4], raw[5]]),
            message_id: u16::from_be_bytes([raw[6], raw[7]]),
            options: Options::from_bits(u32::from_be_bytes([raw[8], raw[9], raw[10], raw[11]])),
            command: u16::from_be_bytes([raw[12], raw[13]]),
            sub_blocks: u16::from_be_bytes([raw[14], raw[15]]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_size() {
        let header = FrameHeader::new(1, 2, 3, Options::new(), 4);
        assert_eq!(header.to_bytes().len(), HEADER_SIZE);
    }

    #[test]
    fn test_header_wire_layout() {
        let header = FrameHeader::new(0x1234, 0x02ab, 0x0102, Options::from_bits(0x31), 14);
        let bytes = header.to_bytes();
        assert_eq!(
            bytes,
            [
                0x10, 0x00, 0x12, 0x34, 0x02, 0xab, 0x01, 0x02, 0x00, 0x00, 0x00, 0x31, 0x00, 0x0e,
                0x00, 0x00
            ]
        );
    }

    #[test]
    fn test_header_roundtrip() {
        let mut header = FrameHeader::new(7, 600, 65535, Options::from_bits(Options::REQ), 33);
        header.set_sub_blocks(2);
        let parsed = FrameHeader::from_bytes(&header.to_bytes()).unwrap();
        assert_eq!(parsed, header);
        assert!(parsed.validate().is_ok());
    }

    #[test]
    fn test_header_short_buffer() {
        let result = FrameHeader::from_bytes(&[0x10; 15]);
        assert_eq!(
            result,
            Err(FrameError::BufferTooSmall {
                needed: HEADER_SIZE,
                got: 15
            })
        );
    }

    #[test]
    fn test_header_wrong_version() {
        let mut bytes = FrameHeader::new(1, 2, 3, Options::new(), 0).to_bytes();
        bytes[0] = 0x11;
        let parsed = FrameHeader::from_bytes(&bytes).unwrap();
        assert_eq!(
            parsed.validate(),
            Err(FrameError::InvalidVersion { found: 0x11 })
        );
    }

    #[test]
    fn test_ack_echoes_type_and_id() {
        let request = FrameHeader::new(650, 0x1234, 42, Options::from_bits(Options::REQ_ACK), 102);
        let ack = request.ack_from(650);
        assert_eq!(ack.receiver(), 0x1234);
        assert_eq!(ack.sender(), 650);
        assert_eq!(ack.message_id(), 42);
        assert_eq!(ack.command(), 102);
        assert_eq!(ack.options().bits(), Options::ACK);
        assert_eq!(ack.sub_blocks(), 0);
    }
}
