//! Fixed-field binary codec
//!
//! Cursor types that write and read big-endian integers and fixed byte
//! arrays at explicit offsets. Layout never depends on compiler padding.

use crate::{ModlinkError, Result};

// ----------------------------------------------------------------------------
// Writer
// ----------------------------------------------------------------------------

/// Sequential writer over a caller-provided buffer
pub struct WireWriter<'a> {
    buf: &'a mut [u8],
    offset: usize,
}

impl<'a> WireWriter<'a> {
    /// Create a writer, failing if `buf` cannot hold `required` bytes
    pub fn new(buf: &'a mut [u8], required: usize) -> Result<Self> {
        if buf.len() < required {
            return Err(ModlinkError::buffer_too_small(required, buf.len()));
        }
        Ok(Self { buf, offset: 0 })
    }

    pub fn put_u8(&mut self, value: u8) {
        self.put_bytes(&[value]);
    }

    pub fn put_bool(&mut self, value: bool) {
        self.put_u8(value as u8);
    }

    pub fn put_u16(&mut self, value: u16) {
        self.put_bytes(&value.to_be_bytes());
    }

    pub fn put_i64(&mut self, value: i64) {
        self.put_bytes(&value.to_be_bytes());
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) {
        let end = self.offset + bytes.len();
        self.buf[self.offset..end].copy_from_slice(bytes);
        self.offset = end;
    }

    /// Bytes written so far
    pub fn position(&self) -> usize {
        self.offset
    }
}

// ----------------------------------------------------------------------------
// Reader
// ----------------------------------------------------------------------------

/// Sequential reader over a received datagram
pub struct WireReader<'a> {
    buf: &'a [u8],
    offset: usize,
}

impl<'a> WireReader<'a> {
    /// Create a reader, failing if `buf` holds fewer than `required` bytes
    pub fn new(buf: &'a [u8], required: usize) -> Result<Self> {
        if buf.len() < required {
            return Err(ModlinkError::buffer_too_small(required, buf.len()));
        }
        Ok(Self { buf, offset: 0 })
    }

    pub fn u8(&mut self) -> u8 {
        let value = self.buf[self.offset];
        self.offset += 1;
        value
    }

    pub fn bool(&mut self) -> bool {
        self.u8() != 0
    }

    pub fn u16(&mut self) -> u16 {
        u16::from_be_bytes(self.array::<2>())
    }

    pub fn i64(&mut self) -> i64 {
        i64::from_be_bytes(self.array::<8>())
    }

    pub fn array<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.buf[self.offset..self.offset + N]);
        self.offset += N;
        out
    }

    /// Bytes consumed so far
    pub fn position(&self) -> usize {
        self.offset
    }
}

// ----------------------------------------------------------------------------
// Fixed Buffer Helpers
// ----------------------------------------------------------------------------

/// Zero-fill `dest` and copy `src` into it, failing if `src` does not fit
pub fn fill_fixed(dest: &mut [u8], src: &[u8]) -> Result<()> {
    if src.len() > dest.len() {
        return Err(ModlinkError::bad_parameter(format!(
            "{} bytes do not fit a {}-byte field",
            src.len(),
            dest.len()
        )));
    }
    dest.fill(0);
    dest[..src.len()].copy_from_slice(src);
    Ok(())
}

/// Read a NUL-terminated string out of a fixed text field
pub fn fixed_str(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}

/// Store text in a fixed field, truncating on a character boundary
pub fn set_fixed_str(field: &mut [u8], text: &str) {
    let mut end = text.len().min(field.len());
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    field.fill(0);
    field[..end].copy_from_slice(&text.as_bytes()[..end]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writer_reader_sequence() {
        let mut buf = [0u8; 13];
        let mut writer = WireWriter::new(&mut buf, 13).unwrap();
        writer.put_u8(1);
        writer.put_u16(0xBEEF);
        writer.put_i64(-42);
        writer.put_bool(true);
        writer.put_u8(9);
        assert_eq!(writer.position(), 13);
        assert_eq!(&buf[1..3], &[0xBE, 0xEF]);

        let mut reader = WireReader::new(&buf, 13).unwrap();
        assert_eq!(reader.u8(), 1);
        assert_eq!(reader.u16(), 0xBEEF);
        assert_eq!(reader.i64(), -42);
        assert!(reader.bool());
        assert_eq!(reader.u8(), 9);
    }

    #[test]
    fn test_short_buffers_rejected() {
        let mut buf = [0u8; 4];
        assert!(WireWriter::new(&mut buf, 5).is_err());
        assert!(WireReader::new(&buf, 5).is_err());
    }

    #[test]
    fn test_fixed_str_truncates_on_char_boundary() {
        let mut field = [0u8; 4];
        set_fixed_str(&mut field, "abcé");
        assert_eq!(fixed_str(&field), "abc");

        set_fixed_str(&mut field, "ok");
        assert_eq!(field, [b'o', b'k', 0, 0]);
        assert_eq!(fixed_str(&field), "ok");
    }

    #[test]
    fn test_fill_fixed() {
        let mut field = [0xFFu8; 4];
        fill_fixed(&mut field, &[1, 2]).unwrap();
        assert_eq!(field, [1, 2, 0, 0]);
        assert!(fill_fixed(&mut field, &[0; 5]).is_err());
    }
}
