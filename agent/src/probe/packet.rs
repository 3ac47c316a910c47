//! Deframing of the extraction byte stream.
//!
//! The driver writes packets as `[probe_point_id: u32][payload_len: u32]
//! [payload]` but splits them across ring-buffer reads at arbitrary
//! boundaries. The decoder is a stateful sink: every byte fed in either
//! becomes part of a yielded packet or stays in the internal buffer; no
//! byte is ever dropped. A length above the firmware's fragmentation limit
//! means the stream lost sync, which is fatal for the session.

use shared::constants::MAX_PACKET_PAYLOAD;
use shared::errors::ProbeError;
use shared::wire::probe::PACKET_HEADER_BYTES;

/// One deframed extraction packet. The probe point id is kept raw: routing
/// only ever compares it against ids derived from the session
/// configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub point_raw: u32,
    pub payload: Vec<u8>,
}

#[derive(Default)]
pub struct PacketDecoder {
    buffer: Vec<u8>,
}

impl PacketDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes buffered waiting for the rest of a packet.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Feed a chunk and emit every whole packet it completes.
    ///
    /// # Errors
    /// [`ProbeError::Framing`] on an impossible payload length. The decoder
    /// is unusable afterwards; the session is expected to tear down.
    pub fn feed(
        &mut self,
        chunk: &[u8],
        mut sink: impl FnMut(Packet),
    ) -> Result<(), ProbeError> {
        self.buffer.extend_from_slice(chunk);

        let mut offset = 0;
        while self.buffer.len() - offset >= PACKET_HEADER_BYTES {
            let header = &self.buffer[offset..offset + PACKET_HEADER_BYTES];
            let point_raw = u32::from_le_bytes(header[..4].try_into().unwrap());
            let payload_len = u32::from_le_bytes(header[4..].try_into().unwrap()) as usize;

            if payload_len > MAX_PACKET_PAYLOAD {
                return Err(ProbeError::Framing(format!(
                    "impossible payload length {payload_len} for probe point {point_raw:#010x}"
                )));
            }
            if self.buffer.len() - offset - PACKET_HEADER_BYTES < payload_len {
                break; // partial tail, keep buffering
            }

            let start = offset + PACKET_HEADER_BYTES;
            sink(Packet {
                point_raw,
                payload: self.buffer[start..start + payload_len].to_vec(),
            });
            offset = start + payload_len;
        }

        self.buffer.drain(..offset);
        Ok(())
    }
}
