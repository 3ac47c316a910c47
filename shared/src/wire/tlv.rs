//! Tag/length/value walker for firmware configuration replies.
//!
//! FwConfig and HwConfig are TLV lists: `{tag: u32, length: u32,
//! value[length]}` back to back, lengths in bytes. Unknown tags are legal
//! and skipped by callers; a truncated value is a wire error.

use super::{ByteReader, WireError};

pub struct TlvIter<'a> {
    reader: ByteReader<'a>,
}

impl<'a> TlvIter<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            reader: ByteReader::new(buf),
        }
    }
}

impl<'a> Iterator for TlvIter<'a> {
    type Item = Result<(u32, &'a [u8]), WireError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.reader.remaining() == 0 {
            return None;
        }
        let tag = match self.reader.u32() {
            Ok(v) => v,
            Err(e) => return Some(Err(e)),
        };
        let length = match self.reader.u32() {
            Ok(v) => v,
            Err(e) => return Some(Err(e)),
        };
        match self.reader.bytes(length as usize) {
            Ok(value) => Some(Ok((tag, value))),
            Err(e) => Some(Err(e)),
        }
    }
}

/// Read a `u32` TLV value, rejecting other widths.
pub fn u32_value(tag: u32, value: &[u8]) -> Result<u32, WireError> {
    let bytes: [u8; 4] = value
        .try_into()
        .map_err(|_| WireError::Invalid(format!("tag {tag}: expected 4-byte value, got {}", value.len())))?;
    Ok(u32::from_le_bytes(bytes))
}
