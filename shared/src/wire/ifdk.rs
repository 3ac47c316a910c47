//! The fixed header that prefixes every streamed probe endpoint.
//!
//! Layout: magic `"IFDK"`, NUL-padded 16-byte system name, NUL-padded
//! 16-byte format name, `u32` major, `u32` minor. 44 bytes total.

use super::{ByteReader, ByteWriter, WireError};

pub const IFDK_MAGIC: [u8; 4] = *b"IFDK";
pub const IFDK_HEADER_BYTES: usize = 44;

const NAME_BYTES: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IfdkStreamHeader {
    pub system: String,
    pub format: String,
    pub major: u32,
    pub minor: u32,
}

impl IfdkStreamHeader {
    pub fn new(system: &str, format: &str, major: u32, minor: u32) -> Self {
        debug_assert!(system.len() <= NAME_BYTES && format.len() <= NAME_BYTES);
        Self {
            system: system.to_owned(),
            format: format.to_owned(),
            major,
            minor,
        }
    }

    /// The header of probe endpoint streams.
    pub fn probe() -> Self {
        Self::new("generic", "probe", 1, 0)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = ByteWriter::new();
        w.put_bytes(&IFDK_MAGIC);
        w.put_bytes(&padded_name(&self.system));
        w.put_bytes(&padded_name(&self.format));
        w.put_u32(self.major);
        w.put_u32(self.minor);
        debug_assert_eq!(w.len(), IFDK_HEADER_BYTES);
        w.into_bytes()
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self, WireError> {
        let mut r = ByteReader::new(buf);
        let magic = r.bytes(4)?;
        if magic != IFDK_MAGIC {
            return Err(WireError::Invalid(format!("bad stream magic {magic:?}")));
        }
        let system = name_str(r.bytes(NAME_BYTES)?)?;
        let format = name_str(r.bytes(NAME_BYTES)?)?;
        Ok(Self {
            system,
            format,
            major: r.u32()?,
            minor: r.u32()?,
        })
    }
}

fn padded_name(name: &str) -> [u8; NAME_BYTES] {
    let mut out = [0u8; NAME_BYTES];
    let bytes = name.as_bytes();
    out[..bytes.len()].copy_from_slice(bytes);
    out
}

fn name_str(bytes: &[u8]) -> Result<String, WireError> {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    std::str::from_utf8(&bytes[..end])
        .map(str::to_owned)
        .map_err(|_| WireError::Invalid("stream header name is not UTF-8".into()))
}
