//! Descriptor codec.
//!
//! Configuration data arrives as one blob of variable-length records, each
//! starting with a `(bLength, bDescriptorType)` header. Everything here works
//! over an immutable byte slice with explicit bounds checks and little-endian
//! field reads; a malformed record can fail a parse but never walk out of the
//! buffer.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DescError {
    #[error("descriptor buffer truncated (need {needed} bytes at offset {offset})")]
    Truncated { offset: usize, needed: usize },

    #[error("descriptor type mismatch (expected {expected:#04x}, found {found:#04x})")]
    TypeMismatch { expected: u8, found: u8 },

    #[error("descriptor with zero length at offset {0}")]
    ZeroLength(usize),

    #[error("descriptor of type {0:#04x} not found")]
    NotFound(u8),
}

/// Decodes the 2-byte descriptor header at `offset`.
///
/// Returns `(kind, length)`. When `expected` is given, a differing type byte
/// is a hard format error; the length byte is never validated here (devices
/// routinely pad records, which callers tolerate with a warning).
pub fn decode_header(
    buf: &[u8],
    offset: usize,
    expected: Option<u8>,
) -> Result<(u8, u8), DescError> {
    if buf.len() < offset + 2 {
        return Err(DescError::Truncated { offset, needed: 2 });
    }
    let length = buf[offset];
    let kind = buf[offset + 1];
    if let Some(expected) = expected {
        if kind != expected {
            return Err(DescError::TypeMismatch {
                expected,
                found: kind,
            });
        }
    }
    Ok((kind, length))
}

/// Linearly scans `buf` for the next descriptor of type `kind`, following
/// each record's own length field.
///
/// Returns the byte offset of the matching record. A record claiming zero
/// length fails immediately (the scan would otherwise never advance), and
/// running off the end of the buffer reports the type as not found. The scan
/// therefore terminates within `buf.len() / 2` iterations.
pub fn find_next(buf: &[u8], kind: u8) -> Result<usize, DescError> {
    let mut offset = 0;
    while offset + 2 <= buf.len() {
        let (found, length) = decode_header(buf, offset, None)?;
        if length == 0 {
            return Err(DescError::ZeroLength(offset));
        }
        if found == kind {
            return Ok(offset);
        }
        offset += usize::from(length);
    }
    Err(DescError::NotFound(kind))
}

/// Bounds-checked reader over one descriptor record.
///
/// Multi-byte fields on the wire are little-endian and are composed
/// byte-by-byte, so the cursor works on any host.
#[derive(Clone, Copy)]
pub struct DescCursor<'a> {
    buf: &'a [u8],
    offset: usize,
    start: usize,
}

impl<'a> DescCursor<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            offset: 0,
            start: 0,
        }
    }

    /// Starts a cursor at `offset` within a larger configuration blob.
    pub fn at(buf: &'a [u8], offset: usize) -> Self {
        Self {
            buf,
            offset,
            start: offset,
        }
    }

    /// Bytes consumed since the cursor started.
    pub fn consumed(&self) -> usize {
        self.offset - self.start
    }

    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.offset)
    }

    pub fn read_u8(&mut self) -> Result<u8, DescError> {
        let b = *self.buf.get(self.offset).ok_or(DescError::Truncated {
            offset: self.offset,
            needed: 1,
        })?;
        self.offset += 1;
        Ok(b)
    }

    pub fn read_u16(&mut self) -> Result<u16, DescError> {
        // Check the whole field first so a failed read leaves the cursor
        // (and `consumed`) where it was.
        if self.remaining() < 2 {
            return Err(DescError::Truncated {
                offset: self.offset,
                needed: 2,
            });
        }
        let lo = self.read_u8()?;
        let hi = self.read_u8()?;
        Ok(u16::from(lo) | (u16::from(hi) << 8))
    }

    pub fn read_u32(&mut self) -> Result<u32, DescError> {
        if self.remaining() < 4 {
            return Err(DescError::Truncated {
                offset: self.offset,
                needed: 4,
            });
        }
        let lo = self.read_u16()?;
        let hi = self.read_u16()?;
        Ok(u32::from(lo) | (u32::from(hi) << 16))
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], DescError> {
        if self.remaining() < len {
            return Err(DescError::Truncated {
                offset: self.offset,
                needed: len,
            });
        }
        let bytes = &self.buf[self.offset..self.offset + len];
        self.offset += len;
        Ok(bytes)
    }

    pub fn skip(&mut self, len: usize) -> Result<(), DescError> {
        self.read_bytes(len).map(|_| ())
    }

    /// Checks the record header and leaves the cursor just past it.
    ///
    /// Returns the declared `bLength`. The type check is hard; callers
    /// compare `consumed()` against the returned length afterwards and only
    /// warn on a mismatch.
    pub fn expect_header(&mut self, kind: u8) -> Result<u8, DescError> {
        let (_, length) = decode_header(self.buf, self.offset, Some(kind))?;
        self.offset += 2;
        Ok(length)
    }
}

/// Warns when a structured decode consumed a different number of bytes than
/// the record declared. Minor non-compliance here is common and harmless.
pub(crate) fn check_consumed(what: &str, declared: u8, consumed: usize) {
    if usize::from(declared) != consumed {
        log::warn!(
            "{} descriptor declares {} bytes but {} were decoded",
            what,
            declared,
            consumed
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_decode_checks_type() {
        let buf = [18u8, 1, 0, 2];
        assert!(matches!(decode_header(&buf, 0, Some(1)), Ok((1, 18))));
        assert!(matches!(
            decode_header(&buf, 0, Some(2)),
            Err(DescError::TypeMismatch {
                expected: 2,
                found: 1
            })
        ));
    }

    #[test]
    fn header_decode_rejects_truncated() {
        let buf = [9u8];
        assert!(matches!(
            decode_header(&buf, 0, None),
            Err(DescError::Truncated { .. })
        ));
    }

    #[test]
    fn find_next_locates_later_record() {
        // config header (9 bytes), then an interface record (4 is Interface).
        let mut buf = vec![9u8, 2, 0, 0, 1, 1, 0, 0x80, 50];
        buf.extend_from_slice(&[9, 4, 0, 0, 2, 8, 6, 0x50, 0]);
        assert_eq!(find_next(&buf, 4).unwrap(), 9);
    }

    #[test]
    fn find_next_zero_length_fails() {
        let buf = [9u8, 2, 0, 0, 1, 1, 0, 0x80, 50, 0, 4];
        assert!(matches!(find_next(&buf, 4), Err(DescError::ZeroLength(9))));
    }

    #[test]
    fn find_next_reports_not_found() {
        let buf = [9u8, 2, 0, 0, 1, 1, 0, 0x80, 50];
        assert!(matches!(find_next(&buf, 5), Err(DescError::NotFound(5))));
    }

    #[test]
    fn find_next_terminates_on_adversarial_lengths() {
        // Records that always claim more than remains must still terminate.
        let buf = [2u8, 9, 0xFF, 9, 3, 9];
        assert!(find_next(&buf, 4).is_err());
    }

    #[test]
    fn cursor_little_endian_reads() {
        let buf = [0x12u8, 0x01, 0x10, 0x02, 0x78, 0x56, 0x34];
        let mut cur = DescCursor::new(&buf);
        assert_eq!(cur.read_u16().unwrap(), 0x0112);
        assert_eq!(cur.read_u16().unwrap(), 0x0210);
        assert!(cur.read_u32().is_err());
        assert_eq!(cur.consumed(), 4);
    }
}
