//! Serialization of the driver and stream wire contracts.
//!
//! Everything the kernel contract fixes lives here: little-endian, fixed
//! field order, no implicit padding. The agent's typed layers build requests
//! and parse replies exclusively through this module so the mocked device
//! can match byte-exact buffers.

pub mod bytes;
pub mod ifdk;
pub mod module;
pub mod probe;
pub mod tlv;

pub use bytes::{ByteReader, ByteWriter, WireError};
