pub mod diagnostics;
pub mod encoder;
pub mod io_pins;

use crate::base::DecodeError;
use byteorder::{BigEndian, ByteOrder};

/// Bounds-checked big-endian cursor over an untrusted buffer.
///
/// Every read checks the remaining length first and fails with
/// `DecodeError::Truncated` instead of reading past the end.
#[derive(Debug, Clone)]
pub(crate) struct FieldReader<'a> {
    buf: &'a [u8],
    offset: usize,
}

impl<'a> FieldReader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> FieldReader<'a> {
        FieldReader { buf, offset: 0 }
    }

    pub(crate) fn offset(&self) -> usize {
        self.offset
    }

    pub(crate) fn remaining(&self) -> usize {
        self.buf.len() - self.offset
    }

    /// Takes the next `len` bytes.
    pub(crate) fn take(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        if self.remaining() < len {
            return Err(DecodeError::Truncated {
                offset: self.offset,
                needed: len,
                available: self.remaining(),
            });
        }
        let bytes = &self.buf[self.offset..self.offset + len];
        self.offset += len;
        Ok(bytes)
    }

    pub(crate) fn read_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    pub(crate) fn read_u16(&mut self) -> Result<u16, DecodeError> {
        Ok(BigEndian::read_u16(self.take(2)?))
    }

    pub(crate) fn read_i16(&mut self) -> Result<i16, DecodeError> {
        Ok(BigEndian::read_i16(self.take(2)?))
    }

    pub(crate) fn read_u32(&mut self) -> Result<u32, DecodeError> {
        Ok(BigEndian::read_u32(self.take(4)?))
    }

    pub(crate) fn read_f64(&mut self) -> Result<f64, DecodeError> {
        Ok(BigEndian::read_f64(self.take(8)?))
    }
}

/// Fails unless a fixed-size block payload has exactly the expected length.
pub(crate) fn check_payload_len(
    field: &'static str,
    payload: &[u8],
    expected: usize,
) -> Result<(), DecodeError> {
    if payload.len() != expected {
        return Err(DecodeError::InvalidFieldValue {
            field,
            description: format!("expected {} bytes, got {}", expected, payload.len()),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_big_endian_fields() {
        let bytes = [0x12, 0x34, 0xFF, 0xFE, 0x00, 0x00, 0x01, 0x00, 0x07];
        let mut reader = FieldReader::new(&bytes);
        assert_eq!(reader.read_u16().unwrap(), 0x1234);
        assert_eq!(reader.read_i16().unwrap(), -2);
        assert_eq!(reader.read_u32().unwrap(), 0x100);
        assert_eq!(reader.read_u8().unwrap(), 7);
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn short_read_is_truncated_and_does_not_advance() {
        let bytes = [0x01, 0x02, 0x03];
        let mut reader = FieldReader::new(&bytes);
        reader.read_u16().unwrap();
        assert_eq!(
            reader.read_u16(),
            Err(DecodeError::Truncated {
                offset: 2,
                needed: 2,
                available: 1
            })
        );
        assert_eq!(reader.offset(), 2);
    }
}
