//! SMCP1 frame and sub-block types

use bytes::{BufMut, Bytes, BytesMut};

use super::{DataType, FrameHeader, HEADER_SIZE, SUB_BLOCK_HEADER_SIZE};

/// Typed, counted array attached to a frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubBlock {
    data_type: u16,
    count: u16,
    data: Bytes,
}

impl SubBlock {
    /// Sub-block of signed 32-bit values
    ///
    /// Callers keep `values` within the frame element limit; the codec
    /// rejects anything that does not fit in one datagram.
    #[must_use]
    pub fn int32(values: &[i32]) -> Self {
        let mut data = BytesMut::with_capacity(values.len() * 4);
        for value in values {
            data.put_i32(*value);
        }
        Self {
            data_type: DataType::Int32.as_u16(),
            count: u16::try_from(values.len()).unwrap_or(u16::MAX),
            data: data.freeze(),
        }
    }

    /// Sub-block holding a character string
    #[must_use]
    pub fn string(text: &str) -> Self {
        let data = Bytes::copy_from_slice(text.as_bytes());
        Self {
            data_type: DataType::CharString.as_u16(),
            count: u16::try_from(data.len()).unwrap_or(u16::MAX),
            data,
        }
    }

    /// Assemble from decoded parts
    pub(crate) fn from_parts(data_type: u16, count: u16, data: Bytes) -> Self {
        Self {
            data_type,
            count,
            data,
        }
    }

    /// Raw element type code
    #[must_use]
    pub const fn raw_type(&self) -> u16 {
        self.data_type
    }

    /// Element type, if known
    #[must_use]
    pub const fn data_type(&self) -> Option<DataType> {
        DataType::from_u16(self.data_type)
    }

    /// Declared element count
    #[must_use]
    pub const fn count(&self) -> usize {
        self.count as usize
    }

    /// Raw element bytes
    #[must_use]
    pub const fn data(&self) -> &Bytes {
        &self.data
    }

    /// Iterate elements as 32-bit integers.
    ///
    /// Never yields more than the declared count.
    pub fn values(&self) -> impl Iterator<Item = i32> + '_ {
        self.data
            .chunks_exact(4)
            .take(self.count())
            .map(|chunk| i32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
    }

    /// Payload as 32-bit words, four bytes per word, big-endian.
    ///
    /// Unlike [`Self::values`] this keeps a trailing partial word, zero
    /// padded, so string payloads survive whole.
    pub fn packed_words(&self) -> impl Iterator<Item = i32> + '_ {
        let len = element_bytes(self.data_type, self.count()).min(self.data.len());
        self.data[..len].chunks(4).map(|chunk| {
            let mut word = [0u8; 4];
            word[..chunk.len()].copy_from_slice(chunk);
            i32::from_be_bytes(word)
        })
    }

    /// Element at `index` as a 32-bit integer
    #[must_use]
    pub fn value(&self, index: usize) -> Option<i32> {
        self.values().nth(index)
    }

    /// Contents as text, cut at the first NUL
    #[must_use]
    pub fn text(&self) -> String {
        let raw = &self.data[..];
        let end = raw.iter().position(|b| *b == 0).unwrap_or(raw.len());
        String::from_utf8_lossy(&raw[..end]).into_owned()
    }

    /// Encoded size including the sub-block header
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        SUB_BLOCK_HEADER_SIZE + self.data.len()
    }
}

/// Bytes occupied by `count` elements of a raw element type.
pub(crate) fn element_bytes(data_type: u16, count: usize) -> usize {
    DataType::from_u16(data_type).map_or(count * 4, |kind| kind.wire_len(count))
}

/// SMCP1 frame: header plus zero, one or two sub-blocks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    header: FrameHeader,
    blocks: Vec<SubBlock>,
}

impl Frame {
    /// Create a frame without sub-blocks
    #[must_use]
    pub fn new(header: FrameHeader) -> Self {
        let mut header = header;
        header.set_sub_blocks(0);
        Self {
            header,
            blocks: Vec::new(),
        }
    }

    /// Append a sub-block
    #[must_use]
    pub fn with_block(mut self, block: SubBlock) -> Self {
        self.blocks.push(block);
        self.header
            .set_sub_blocks(u16::try_from(self.blocks.len()).unwrap_or(u16::MAX));
        self
    }

    /// Assemble from decoded parts
    pub(crate) fn from_parts(header: FrameHeader, blocks: Vec<SubBlock>) -> Self {
        Self { header, blocks }
    }

    /// Get header
    #[must_use]
    pub const fn header(&self) -> &FrameHeader {
        &self.header
    }

    /// Sub-blocks in wire order
    #[must_use]
    pub fn blocks(&self) -> &[SubBlock] {
        &self.blocks
    }

    /// Sub-block at `index`
    #[must_use]
    pub fn block(&self, index: usize) -> Option<&SubBlock> {
        self.blocks.get(index)
    }

    /// Encoded size in bytes
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        HEADER_SIZE + self.blocks.iter().map(SubBlock::encoded_len).sum::<usize>()
    }
}
