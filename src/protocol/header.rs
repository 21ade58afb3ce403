use crate::protocol::codec::{FrameReader, FrameWriter};
use crate::protocol::error::CodecError;

pub const SCHEMA_ID: u16 = 4;
pub const SCHEMA_VERSION: u16 = 1;

/// Every message starts with this 8 byte header.
///
/// ```text
/// | 0 | 1 | 2 | 3 | 4 | 5 | 6 | 7 |
/// +---+---+---+---+---+---+---+---+
/// | BlockLen| Template| Schema  | Version |
/// +-------+-------+-------+-------+
/// ```
///
/// `BlockLen` is the length of the fixed block that follows. A newer schema version may append
/// fields to the fixed block; older decoders skip what they don't know.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MessageHeader {
    pub block_length: u16,
    pub template_id: u16,
    pub schema_id: u16,
    pub version: u16,
}

impl MessageHeader {
    pub const ENCODED_LENGTH: usize = 8;

    pub fn new(block_length: u16, template_id: u16) -> Self {
        MessageHeader {
            block_length,
            template_id,
            schema_id: SCHEMA_ID,
            version: SCHEMA_VERSION,
        }
    }

    pub(crate) fn write(&self, writer: &mut FrameWriter<'_>) {
        writer.put_u16(self.block_length);
        writer.put_u16(self.template_id);
        writer.put_u16(self.schema_id);
        writer.put_u16(self.version);
    }

    pub(crate) fn read(reader: &mut FrameReader<'_>) -> Result<Self, CodecError> {
        let header = MessageHeader {
            block_length: reader.u16("header.block_length")?,
            template_id: reader.u16("header.template_id")?,
            schema_id: reader.u16("header.schema_id")?,
            version: reader.u16("header.version")?,
        };

        if header.schema_id != SCHEMA_ID {
            return Err(CodecError::SchemaMismatch {
                expected: SCHEMA_ID,
                actual: header.schema_id,
            });
        }

        Ok(header)
    }

    /// Reads the template id of the frame starting at `offset` without consuming anything.
    pub fn peek_template_id(buffer: &[u8], offset: usize) -> Result<u16, CodecError> {
        let mut reader = FrameReader::new(buffer.get(offset..).unwrap_or_default());
        MessageHeader::read(&mut reader).map(|header| header.template_id)
    }

    pub(crate) fn expect(&self, template_id: u16, minimum_block_length: u16) -> Result<(), CodecError> {
        if self.template_id != template_id {
            return Err(CodecError::TemplateMismatch {
                expected: template_id,
                actual: self.template_id,
            });
        }
        if self.block_length < minimum_block_length {
            return Err(CodecError::BlockTooShort {
                minimum: minimum_block_length,
                actual: self.block_length,
            });
        }

        Ok(())
    }
}
