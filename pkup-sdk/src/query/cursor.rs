//! Bounds-checked little-endian reader over a response buffer.

use crate::error::DecodeError;

/// A view of the bytes not yet decoded. Every read consumes exactly the
/// width of its field or fails with [`DecodeError::Truncated`] and leaves
/// the cursor where it was.
#[derive(Debug, Clone)]
pub struct Cursor<'a> {
    buf: &'a [u8],
}

impl<'a> Cursor<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        if n > self.buf.len() {
            return Err(DecodeError::Truncated {
                needed: n,
                remaining: self.buf.len(),
            });
        }
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn skip(&mut self, n: usize) -> Result<(), DecodeError> {
        self.take(n).map(|_| ())
    }

    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.array::<1>()?[0])
    }

    pub fn read_u16_le(&mut self) -> Result<u16, DecodeError> {
        self.array().map(u16::from_le_bytes)
    }

    pub fn read_i32_le(&mut self) -> Result<i32, DecodeError> {
        self.array().map(i32::from_le_bytes)
    }

    pub fn read_f32_le(&mut self) -> Result<f32, DecodeError> {
        self.array().map(f32::from_le_bytes)
    }

    /// Read a NUL-terminated string. The terminator is consumed but not
    /// returned; invalid UTF-8 is replaced rather than rejected.
    pub fn read_cstr(&mut self) -> Result<String, DecodeError> {
        let Some(nul) = self.buf.iter().position(|&b| b == 0) else {
            return Err(DecodeError::Truncated {
                needed: self.buf.len() + 1,
                remaining: self.buf.len(),
            });
        };
        let bytes = self.take(nul + 1)?;
        Ok(String::from_utf8_lossy(&bytes[..nul]).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_advance_by_field_width() {
        let buf = [0x34, 0x12, 0xff, 0xfe, 0xff, 0xff, 0xff, b'h', b'i', 0, 0x00, 0x00, 0x80, 0x3f];
        let mut cur = Cursor::new(&buf);
        assert_eq!(cur.read_u16_le().unwrap(), 0x1234);
        assert_eq!(cur.read_u8().unwrap(), 0xff);
        assert_eq!(cur.read_i32_le().unwrap(), -2);
        assert_eq!(cur.remaining(), 7);
        assert_eq!(cur.read_cstr().unwrap(), "hi");
        assert_eq!(cur.read_f32_le().unwrap(), 1.0);
        assert!(cur.is_empty());
    }

    #[test]
    fn short_reads_fail_without_consuming() {
        let buf = [0x01];
        let mut cur = Cursor::new(&buf);
        assert_eq!(
            cur.read_u16_le(),
            Err(DecodeError::Truncated { needed: 2, remaining: 1 })
        );
        assert_eq!(cur.remaining(), 1);
        assert!(cur.skip(2).unwrap_err().is_truncation());
        assert_eq!(cur.read_u8().unwrap(), 1);
        assert!(cur.read_u8().unwrap_err().is_truncation());
        assert!(cur.read_i32_le().unwrap_err().is_truncation());
        assert!(cur.read_f32_le().unwrap_err().is_truncation());
    }

    #[test]
    fn unterminated_string_is_truncation() {
        let mut cur = Cursor::new(b"no terminator");
        assert!(cur.read_cstr().unwrap_err().is_truncation());
        assert_eq!(cur.remaining(), 13);
    }

    #[test]
    fn empty_string_consumes_terminator() {
        let mut cur = Cursor::new(b"\0\0x");
        assert_eq!(cur.read_cstr().unwrap(), "");
        assert_eq!(cur.read_cstr().unwrap(), "");
        assert_eq!(cur.remaining(), 1);
    }
}
