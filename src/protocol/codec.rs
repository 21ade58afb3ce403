//! Cursor helpers for the fixed layout. Writers assume the caller already checked the
//! destination against `encoded_length()`; readers check every access against what's left of the
//! frame and fail instead of panicking.

use crate::protocol::error::CodecError;
use bytes::{Buf, BufMut};

pub(crate) const VAR_DATA_HEADER_LENGTH: usize = 2;
pub(crate) const GROUP_HEADER_LENGTH: usize = 4;
pub(crate) const MAX_VAR_DATA_LENGTH: usize = u16::MAX as usize;

pub(crate) const BOOL_FALSE: u8 = 0;
pub(crate) const BOOL_TRUE: u8 = 1;
pub(crate) const BOOL_NULL: u8 = u8::MAX;

pub(crate) struct FrameWriter<'a> {
    buf: &'a mut [u8],
    written: usize,
}

impl<'a> FrameWriter<'a> {
    /// Fails early if `buffer[offset..]` can't hold `length` bytes, so the `put_*` calls below
    /// never have to.
    pub(crate) fn new(buffer: &'a mut [u8], offset: usize, length: usize) -> Result<Self, CodecError> {
        let capacity = buffer.len();
        if offset > capacity || capacity - offset < length {
            return Err(CodecError::BufferTooSmall {
                needed: length,
                offset,
                capacity,
            });
        }

        Ok(FrameWriter {
            buf: &mut buffer[offset..offset + length],
            written: 0,
        })
    }

    pub(crate) fn written(&self) -> usize {
        self.written
    }

    pub(crate) fn put_u8(&mut self, value: u8) {
        self.buf.put_u8(value);
        self.written += 1;
    }

    pub(crate) fn put_bool(&mut self, value: bool) {
        self.put_u8(if value { BOOL_TRUE } else { BOOL_FALSE });
    }

    pub(crate) fn put_u16(&mut self, value: u16) {
        self.buf.put_u16_le(value);
        self.written += 2;
    }

    pub(crate) fn put_i32(&mut self, value: i32) {
        self.buf.put_i32_le(value);
        self.written += 4;
    }

    pub(crate) fn put_i64(&mut self, value: i64) {
        self.buf.put_i64_le(value);
        self.written += 8;
    }

    pub(crate) fn put_raw(&mut self, bytes: &[u8]) {
        self.buf.put_slice(bytes);
        self.written += bytes.len();
    }

    /// u16 length prefix followed by the bytes. Length was validated by `var_data_length`.
    pub(crate) fn put_var_data(&mut self, bytes: &[u8]) {
        self.put_u16(bytes.len() as u16);
        self.put_raw(bytes);
    }

    pub(crate) fn put_group_header(&mut self, block_length: u16, num_in_group: u16) {
        self.put_u16(block_length);
        self.put_u16(num_in_group);
    }
}

pub(crate) struct FrameReader<'a> {
    buf: &'a [u8],
}

impl<'a> FrameReader<'a> {
    pub(crate) fn new(frame: &'a [u8]) -> Self {
        FrameReader { buf: frame }
    }

    /// Slices `buffer[offset..offset + length]`, the frame a message must consume exactly.
    pub(crate) fn for_frame(buffer: &'a [u8], offset: usize, length: usize) -> Result<Self, CodecError> {
        offset
            .checked_add(length)
            .and_then(|end| buffer.get(offset..end))
            .map(FrameReader::new)
            .ok_or(CodecError::Truncated {
                field: "frame",
                needed: length,
                remaining: buffer.len().saturating_sub(offset),
            })
    }

    pub(crate) fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    fn ensure(&self, field: &'static str, needed: usize) -> Result<(), CodecError> {
        if self.buf.remaining() < needed {
            return Err(CodecError::Truncated {
                field,
                needed,
                remaining: self.buf.remaining(),
            });
        }
        Ok(())
    }

    pub(crate) fn u8(&mut self, field: &'static str) -> Result<u8, CodecError> {
        self.ensure(field, 1)?;
        Ok(self.buf.get_u8())
    }

    pub(crate) fn bool(&mut self, field: &'static str) -> Result<bool, CodecError> {
        match self.u8(field)? {
            BOOL_TRUE => Ok(true),
            BOOL_FALSE | BOOL_NULL => Ok(false),
            value => Err(CodecError::InvalidEnumValue { field, value }),
        }
    }

    pub(crate) fn u16(&mut self, field: &'static str) -> Result<u16, CodecError> {
        self.ensure(field, 2)?;
        Ok(self.buf.get_u16_le())
    }

    pub(crate) fn i32(&mut self, field: &'static str) -> Result<i32, CodecError> {
        self.ensure(field, 4)?;
        Ok(self.buf.get_i32_le())
    }

    pub(crate) fn i64(&mut self, field: &'static str) -> Result<i64, CodecError> {
        self.ensure(field, 8)?;
        Ok(self.buf.get_i64_le())
    }

    /// Splits off a sub-reader over the next `length` bytes. Used for fixed blocks, so trailing
    /// fields from a newer schema version are skipped along with the block.
    pub(crate) fn block(&mut self, field: &'static str, length: usize) -> Result<FrameReader<'a>, CodecError> {
        self.ensure(field, length)?;
        let (block, rest) = self.buf.split_at(length);
        self.buf = rest;
        Ok(FrameReader::new(block))
    }

    pub(crate) fn var_data(&mut self, field: &'static str) -> Result<&'a [u8], CodecError> {
        let length = self.u16(field)? as usize;
        self.ensure(field, length)?;
        let (data, rest) = self.buf.split_at(length);
        self.buf = rest;
        Ok(data)
    }

    pub(crate) fn var_string(&mut self, field: &'static str) -> Result<String, CodecError> {
        let data = self.var_data(field)?;
        String::from_utf8(data.to_vec()).map_err(|_| CodecError::InvalidUtf8 { field })
    }

    pub(crate) fn group_header(&mut self, field: &'static str) -> Result<(u16, u16), CodecError> {
        Ok((self.u16(field)?, self.u16(field)?))
    }

    /// Everything left in the frame. Only the embedded log entry is encoded this way.
    pub(crate) fn rest(&mut self) -> &'a [u8] {
        std::mem::take(&mut self.buf)
    }

    /// A decoder must account for every byte of the frame it was handed.
    pub(crate) fn finish(&self, declared: usize) -> Result<(), CodecError> {
        if self.buf.is_empty() {
            Ok(())
        } else {
            Err(CodecError::LengthMismatch {
                declared,
                actual: declared - self.buf.len(),
            })
        }
    }
}

pub(crate) fn var_data_length(field: &'static str, data: &[u8]) -> Result<usize, CodecError> {
    if data.len() > MAX_VAR_DATA_LENGTH {
        return Err(CodecError::FieldTooLong {
            field,
            length: data.len(),
            max: MAX_VAR_DATA_LENGTH,
        });
    }
    Ok(VAR_DATA_HEADER_LENGTH + data.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reader_reports_truncation_instead_of_panicking() {
        let frame = [1u8, 0, 0];
        let mut reader = FrameReader::new(&frame);

        assert_eq!(reader.u16("a").unwrap(), 1);
        assert_eq!(
            reader.i32("b"),
            Err(CodecError::Truncated {
                field: "b",
                needed: 4,
                remaining: 1
            })
        );
    }

    #[test]
    fn writer_rejects_short_buffers() {
        let mut buffer = [0u8; 6];
        assert!(FrameWriter::new(&mut buffer, 2, 4).is_ok());
        assert_eq!(
            FrameWriter::new(&mut buffer, 4, 4).err(),
            Some(CodecError::BufferTooSmall {
                needed: 4,
                offset: 4,
                capacity: 6
            })
        );
    }

    #[test]
    fn var_data_is_length_prefixed() {
        let mut buffer = [0u8; 7];
        let mut writer = FrameWriter::new(&mut buffer, 0, 7).unwrap();
        writer.put_var_data(b"hello");
        assert_eq!(writer.written(), 7);

        let mut reader = FrameReader::new(&buffer);
        assert_eq!(reader.var_string("greeting").unwrap(), "hello");
        assert!(reader.finish(7).is_ok());
    }
}
