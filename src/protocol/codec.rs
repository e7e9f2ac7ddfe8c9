//! SMCP1 frame codec (encode/decode)
//!
//! Decoding walks the datagram with a length-checked cursor and never reads
//! past the declared sub-block counts or the received length.

use bytes::{BufMut, Bytes, BytesMut};

use super::frame::element_bytes;
use super::{
    Frame, FrameError, FrameHeader, HEADER_SIZE, MAX_FRAME_SIZE, MAX_SUB_BLOCKS, Result,
    SUB_BLOCK_HEADER_SIZE, SubBlock,
};

/// Encode a frame to bytes
///
/// # Format
///
/// ```text
/// [HEADER (16 bytes)] ([TYPE u16][COUNT u16][ELEMENTS...]){0,2}
/// ```
///
/// # Errors
///
/// Returns an error if the frame has more than two sub-blocks or does not
/// fit in a single datagram.
pub fn encode(frame: &Frame) -> Result<Bytes> {
    let mut buf = BytesMut::with_capacity(frame.encoded_len());
    encode_into(frame, &mut buf)?;
    Ok(buf.freeze())
}

/// Encode a frame, appending to `buf`
pub fn encode_into(frame: &Frame, buf: &mut BytesMut) -> Result<()> {
    let blocks = frame.blocks();
    if blocks.len() > MAX_SUB_BLOCKS {
        return Err(FrameError::TooManySubBlocks {
            count: u16::try_from(blocks.len()).unwrap_or(u16::MAX),
            max: MAX_SUB_BLOCKS,
        });
    }
    let size = frame.encoded_len();
    if size > MAX_FRAME_SIZE {
        return Err(FrameError::FrameTooLarge {
            size,
            max: MAX_FRAME_SIZE,
        });
    }

    buf.reserve(size);
    buf.put_slice(&frame.header().to_bytes());
    for block in blocks {
        buf.put_u16(block.raw_type());
        buf.put_u16(u16::try_from(block.count()).unwrap_or(u16::MAX));
        buf.put_slice(block.data());
    }
    Ok(())
}

/// Decode a frame from bytes
///
/// # Errors
///
/// Returns an error if:
/// - Buffer is shorter than the header
/// - Version byte is wrong
/// - More than two sub-blocks are declared
/// - A sub-block runs past the end of the datagram
pub fn decode(bytes: Bytes) -> Result<Frame> {
    let header = FrameHeader::from_bytes(&bytes)?;
    header.validate()?;

    let mut offset = HEADER_SIZE;
    let mut blocks = Vec::with_capacity(usize::from(header.sub_blocks()));
    for index in 0..usize::from(header.sub_blocks()) {
        let available = bytes.len() - offset;
        if available < SUB_BLOCK_HEADER_SIZE {
            return Err(FrameError::Truncated {
                index,
                declared: SUB_BLOCK_HEADER_SIZE,
                available,
            });
        }
        let data_type = u16::from_be_bytes([bytes[offset], bytes[offset + 1]]);
        let count = u16::from_be_bytes([bytes[offset + 2], bytes[offset + 3]]);
        offset += SUB_BLOCK_HEADER_SIZE;

        let declared = element_bytes(data_type, usize::from(count));
        let available = bytes.len() - offset;
        if declared > available {
            return Err(FrameError::Truncated {
                index,
                declared,
                available,
            });
        }
        blocks.push(SubBlock::from_parts(
            data_type,
            count,
            bytes.slice(offset..offset + declared),
        ));
        offset += declared;
    }

    Ok(Frame::from_parts(header, blocks))
}
