//! Probe feature wire structures.
//!
//! Probe point ids pack `{module_id:16, instance_id:8, type:2, index:6}`
//! into 32 bits, least significant field first; the layout is the kernel
//! contract and is preserved bit-exact. Connection tables are fixed-size:
//! the driver always receives and returns [`MAX_PROBE_COUNT`] entries.

use super::{ByteReader, ByteWriter, WireError};
use crate::constants::MAX_PROBE_COUNT;

/// Direction of the connection point inside the firmware audio graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProbeType {
    Input,
    Output,
    Internal,
}

impl ProbeType {
    pub fn to_wire(self) -> u32 {
        match self {
            ProbeType::Input => 0,
            ProbeType::Output => 1,
            ProbeType::Internal => 2,
        }
    }

    pub fn from_wire(v: u32) -> Result<Self, WireError> {
        match v {
            0 => Ok(ProbeType::Input),
            1 => Ok(ProbeType::Output),
            2 => Ok(ProbeType::Internal),
            other => Err(WireError::Invalid(format!("probe type {other}"))),
        }
    }
}

/// A connection point inside the running audio graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProbePointId {
    pub module_id: u16,
    pub instance_id: u8,
    pub ty: ProbeType,
    /// Pin index, 6 bits on the wire.
    pub index: u8,
}

impl ProbePointId {
    pub fn new(module_id: u16, instance_id: u8, ty: ProbeType, index: u8) -> Self {
        Self {
            module_id,
            instance_id,
            ty,
            index,
        }
    }

    pub fn to_raw(self) -> u32 {
        (self.module_id as u32)
            | ((self.instance_id as u32) << 16)
            | (self.ty.to_wire() << 24)
            | (((self.index & 0x3F) as u32) << 26)
    }

    pub fn from_raw(raw: u32) -> Result<Self, WireError> {
        Ok(Self {
            module_id: (raw & 0xFFFF) as u16,
            instance_id: ((raw >> 16) & 0xFF) as u8,
            ty: ProbeType::from_wire((raw >> 24) & 0x3)?,
            index: ((raw >> 26) & 0x3F) as u8,
        })
    }
}

impl std::fmt::Display for ProbePointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({}, {}, {:?}, {})",
            self.module_id, self.instance_id, self.ty, self.index
        )
    }
}

/// Probe service state as the driver sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ProbeState {
    Idle,
    Owned,
    Allocated,
    Active,
}

impl ProbeState {
    pub fn to_wire(self) -> u32 {
        match self {
            ProbeState::Idle => 0,
            ProbeState::Owned => 1,
            ProbeState::Allocated => 2,
            ProbeState::Active => 3,
        }
    }

    pub fn from_wire(v: u32) -> Result<Self, WireError> {
        match v {
            0 => Ok(ProbeState::Idle),
            1 => Ok(ProbeState::Owned),
            2 => Ok(ProbeState::Allocated),
            3 => Ok(ProbeState::Active),
            other => Err(WireError::Invalid(format!("probe state {other}"))),
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "Idle" => Some(ProbeState::Idle),
            "Owned" => Some(ProbeState::Owned),
            "Allocated" => Some(ProbeState::Allocated),
            "Active" => Some(ProbeState::Active),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ProbeState::Idle => "Idle",
            ProbeState::Owned => "Owned",
            ProbeState::Allocated => "Allocated",
            ProbeState::Active => "Active",
        }
    }
}

/// What an enabled endpoint does with its probe point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbePurpose {
    Extract,
    Inject,
    InjectReextract,
}

impl ProbePurpose {
    pub fn to_wire(self) -> u32 {
        match self {
            ProbePurpose::Extract => 0,
            ProbePurpose::Inject => 1,
            ProbePurpose::InjectReextract => 2,
        }
    }

    pub fn from_wire(v: u32) -> Result<Self, WireError> {
        match v {
            0 => Ok(ProbePurpose::Extract),
            1 => Ok(ProbePurpose::Inject),
            2 => Ok(ProbePurpose::InjectReextract),
            other => Err(WireError::Invalid(format!("probe purpose {other}"))),
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "Extract" => Some(ProbePurpose::Extract),
            "Inject" => Some(ProbePurpose::Inject),
            "InjectReextract" => Some(ProbePurpose::InjectReextract),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ProbePurpose::Extract => "Extract",
            ProbePurpose::Inject => "Inject",
            ProbePurpose::InjectReextract => "InjectReextract",
        }
    }

    /// Does data flow from the firmware to the host on this endpoint?
    pub fn extracts(self) -> bool {
        matches!(self, ProbePurpose::Extract | ProbePurpose::InjectReextract)
    }

    /// Does data flow from the host to the firmware on this endpoint?
    pub fn injects(self) -> bool {
        matches!(self, ProbePurpose::Inject | ProbePurpose::InjectReextract)
    }
}

/// One slot of the driver's probe connection table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbePointConnection {
    pub enabled: bool,
    pub point: ProbePointId,
    pub purpose: ProbePurpose,
    /// Wire id of the event handle the driver signals when it consumed
    /// injected bytes for this slot.
    pub injection_event_id: u64,
}

impl ProbePointConnection {
    pub fn write(&self, w: &mut ByteWriter) {
        w.put_u32(self.enabled as u32);
        w.put_u32(self.point.to_raw());
        w.put_u32(self.purpose.to_wire());
        w.put_u64(self.injection_event_id);
    }

    pub fn read(r: &mut ByteReader) -> Result<Self, WireError> {
        let enabled = match r.u32()? {
            0 => false,
            1 => true,
            other => return Err(WireError::Invalid(format!("bool {other}"))),
        };
        Ok(Self {
            enabled,
            point: ProbePointId::from_raw(r.u32()?)?,
            purpose: ProbePurpose::from_wire(r.u32()?)?,
            injection_event_id: r.u64()?,
        })
    }
}

/// The full probe configuration as programmed into the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbePointConfiguration {
    /// Wire id of the event handle signalled when extraction bytes arrive.
    pub extraction_event_id: u64,
    /// Always [`MAX_PROBE_COUNT`] entries.
    pub connections: Vec<ProbePointConnection>,
}

impl ProbePointConfiguration {
    pub fn to_wire(&self) -> Vec<u8> {
        debug_assert_eq!(self.connections.len(), MAX_PROBE_COUNT);
        let mut w = ByteWriter::new();
        w.put_u64(self.extraction_event_id);
        for connection in &self.connections {
            connection.write(&mut w);
        }
        w.into_bytes()
    }

    pub fn from_wire(buf: &[u8]) -> Result<Self, WireError> {
        let mut r = ByteReader::new(buf);
        let extraction_event_id = r.u64()?;
        let mut connections = Vec::with_capacity(MAX_PROBE_COUNT);
        for _ in 0..MAX_PROBE_COUNT {
            connections.push(ProbePointConnection::read(&mut r)?);
        }
        Ok(Self {
            extraction_event_id,
            connections,
        })
    }
}

/// Location of one ring buffer inside the device's shared mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingBufferDesc {
    pub offset: u64,
    pub size: u64,
}

impl RingBufferDesc {
    fn write(&self, w: &mut ByteWriter) {
        w.put_u64(self.offset);
        w.put_u64(self.size);
    }

    fn read(r: &mut ByteReader) -> Result<Self, WireError> {
        Ok(Self {
            offset: r.u64()?,
            size: r.u64()?,
        })
    }
}

/// Reply of the `PROBE_RING_BUFFERS` parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RingBuffersDescription {
    pub extraction: RingBufferDesc,
    /// Always [`MAX_PROBE_COUNT`] entries.
    pub injection: Vec<RingBufferDesc>,
}

impl RingBuffersDescription {
    pub fn to_wire(&self) -> Vec<u8> {
        debug_assert_eq!(self.injection.len(), MAX_PROBE_COUNT);
        let mut w = ByteWriter::new();
        self.extraction.write(&mut w);
        for desc in &self.injection {
            desc.write(&mut w);
        }
        w.into_bytes()
    }

    pub fn from_wire(buf: &[u8]) -> Result<Self, WireError> {
        let mut r = ByteReader::new(buf);
        let extraction = RingBufferDesc::read(&mut r)?;
        let mut injection = Vec::with_capacity(MAX_PROBE_COUNT);
        for _ in 0..MAX_PROBE_COUNT {
            injection.push(RingBufferDesc::read(&mut r)?);
        }
        Ok(Self {
            extraction,
            injection,
        })
    }
}

/// Wire size of a probe state value.
pub const PROBE_STATE_WIRE_BYTES: usize = 4;
/// Wire size of a linear ring position.
pub const POSITION_WIRE_BYTES: usize = 8;
/// Wire size of a full probe point configuration.
pub const CONFIG_WIRE_BYTES: usize = 8 + MAX_PROBE_COUNT * 20;
/// Wire size of the ring buffers description.
pub const RING_DESCRIPTION_WIRE_BYTES: usize = 16 * (MAX_PROBE_COUNT + 1);

/// Size of the extraction packet header: raw probe point id + payload length.
pub const PACKET_HEADER_BYTES: usize = 8;

/// Encode one extraction packet the way the firmware frames them.
pub fn encode_packet(point: ProbePointId, payload: &[u8]) -> Vec<u8> {
    let mut w = ByteWriter::new();
    w.put_u32(point.to_raw());
    w.put_u32(payload.len() as u32);
    w.put_bytes(payload);
    w.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_point_id_packs_fields() {
        let id = ProbePointId::new(0x1234, 0xAB, ProbeType::Internal, 0x3F);
        let raw = id.to_raw();
        assert_eq!(raw & 0xFFFF, 0x1234);
        assert_eq!((raw >> 16) & 0xFF, 0xAB);
        assert_eq!((raw >> 24) & 0x3, 2);
        assert_eq!(raw >> 26, 0x3F);
        assert_eq!(ProbePointId::from_raw(raw).unwrap(), id);
    }

    #[test]
    fn probe_point_id_rejects_invalid_type() {
        assert!(ProbePointId::from_raw(3 << 24).is_err());
    }

    #[test]
    fn state_and_purpose_round_trip() {
        for s in [
            ProbeState::Idle,
            ProbeState::Owned,
            ProbeState::Allocated,
            ProbeState::Active,
        ] {
            assert_eq!(ProbeState::from_wire(s.to_wire()).unwrap(), s);
            assert_eq!(ProbeState::parse(s.name()).unwrap(), s);
        }
        for p in [
            ProbePurpose::Extract,
            ProbePurpose::Inject,
            ProbePurpose::InjectReextract,
        ] {
            assert_eq!(ProbePurpose::from_wire(p.to_wire()).unwrap(), p);
        }
        assert!(ProbeState::from_wire(42).is_err());
        assert!(ProbePurpose::from_wire(3).is_err());
    }

    #[test]
    fn configuration_round_trip() {
        let connections: Vec<ProbePointConnection> = (0..MAX_PROBE_COUNT)
            .map(|i| ProbePointConnection {
                enabled: i % 2 == 0,
                point: ProbePointId::new(i as u16, 2, ProbeType::Output, 0),
                purpose: ProbePurpose::Extract,
                injection_event_id: 100 + i as u64,
            })
            .collect();
        let config = ProbePointConfiguration {
            extraction_event_id: 99,
            connections,
        };
        let wire = config.to_wire();
        assert_eq!(wire.len(), 8 + MAX_PROBE_COUNT * 20);
        assert_eq!(ProbePointConfiguration::from_wire(&wire).unwrap(), config);
    }

    #[test]
    fn ring_buffers_round_trip() {
        let desc = RingBuffersDescription {
            extraction: RingBufferDesc {
                offset: 0,
                size: 4096,
            },
            injection: (0..MAX_PROBE_COUNT)
                .map(|i| RingBufferDesc {
                    offset: 4096 * (i as u64 + 1),
                    size: 31,
                })
                .collect(),
        };
        assert_eq!(
            RingBuffersDescription::from_wire(&desc.to_wire()).unwrap(),
            desc
        );
    }
}
