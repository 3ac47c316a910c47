//! Typed helpers over the raw device boundary for the probe feature:
//! state, configuration, ring descriptors and linear positions.
//!
//! Each helper performs exactly one io control, so a session's driver
//! conversation is fully scripted by the mocked device in tests.

use crate::communications::Device;
use shared::constants::{
    IOCTL_ADSP_BIG_GET, IOCTL_ADSP_BIG_SET, IOCTL_ADSP_TINY_GET, IOCTL_ADSP_TINY_SET, param,
};
use shared::errors::DriverError;
use shared::wire::module::{decode_param_reply, encode_param_request, DRIVER_STATUS_SUCCESS};
use shared::wire::probe::{
    ProbePointConfiguration, ProbeState, RingBufferDesc, RingBuffersDescription,
    CONFIG_WIRE_BYTES, POSITION_WIRE_BYTES, PROBE_STATE_WIRE_BYTES, RING_DESCRIPTION_WIRE_BYTES,
};
use shared::wire::ByteReader;
use std::sync::Arc;

pub struct ProbeBackend {
    device: Arc<dyn Device>,
}

impl ProbeBackend {
    pub fn new(device: Arc<dyn Device>) -> Self {
        Self { device }
    }

    fn get_param(
        &self,
        code: u32,
        param_id: u32,
        placeholder: usize,
    ) -> Result<Vec<u8>, DriverError> {
        let mut buffer = encode_param_request(param_id, &vec![0u8; placeholder]);
        self.device.io_control(code, &mut buffer)?;
        let reply = decode_param_reply(&buffer).map_err(|e| DriverError::Reply(e.to_string()))?;
        if reply.status != DRIVER_STATUS_SUCCESS {
            return Err(DriverError::Status(reply.status));
        }
        if reply.param_id != param_id {
            return Err(DriverError::Reply(format!(
                "reply carries parameter {:#x}, expected {:#x}",
                reply.param_id, param_id
            )));
        }
        Ok(reply.payload.to_vec())
    }

    fn set_param(&self, code: u32, param_id: u32, payload: &[u8]) -> Result<(), DriverError> {
        let mut buffer = encode_param_request(param_id, payload);
        self.device.io_control(code, &mut buffer)?;
        let reply = decode_param_reply(&buffer).map_err(|e| DriverError::Reply(e.to_string()))?;
        if reply.status != DRIVER_STATUS_SUCCESS {
            return Err(DriverError::Status(reply.status));
        }
        Ok(())
    }

    pub fn get_state(&self) -> Result<ProbeState, DriverError> {
        let payload =
            self.get_param(IOCTL_ADSP_TINY_GET, param::PROBE_STATE, PROBE_STATE_WIRE_BYTES)?;
        let mut r = ByteReader::new(&payload);
        let raw = r.u32().map_err(|e| DriverError::Reply(e.to_string()))?;
        ProbeState::from_wire(raw).map_err(|e| DriverError::Reply(e.to_string()))
    }

    pub fn set_state(&self, state: ProbeState) -> Result<(), DriverError> {
        self.set_param(
            IOCTL_ADSP_TINY_SET,
            param::PROBE_STATE,
            &state.to_wire().to_le_bytes(),
        )
    }

    pub fn get_config(&self) -> Result<ProbePointConfiguration, DriverError> {
        let payload =
            self.get_param(IOCTL_ADSP_BIG_GET, param::PROBE_CONFIG, CONFIG_WIRE_BYTES)?;
        ProbePointConfiguration::from_wire(&payload).map_err(|e| DriverError::Reply(e.to_string()))
    }

    pub fn set_config(&self, config: &ProbePointConfiguration) -> Result<(), DriverError> {
        self.set_param(IOCTL_ADSP_BIG_SET, param::PROBE_CONFIG, &config.to_wire())
    }

    pub fn get_ring_buffers(&self) -> Result<RingBuffersDescription, DriverError> {
        let payload = self.get_param(
            IOCTL_ADSP_BIG_GET,
            param::PROBE_RING_BUFFERS,
            RING_DESCRIPTION_WIRE_BYTES,
        )?;
        RingBuffersDescription::from_wire(&payload).map_err(|e| DriverError::Reply(e.to_string()))
    }

    pub fn extraction_position(&self) -> Result<u64, DriverError> {
        let payload = self.get_param(
            IOCTL_ADSP_TINY_GET,
            param::PROBE_EXTRACTION_POS,
            POSITION_WIRE_BYTES,
        )?;
        read_u64(&payload)
    }

    pub fn injection_position(&self, probe_index: u32) -> Result<u64, DriverError> {
        let payload = self.get_param(
            IOCTL_ADSP_TINY_GET,
            param::PROBE_INJECTION_POS_BASE + probe_index,
            POSITION_WIRE_BYTES,
        )?;
        read_u64(&payload)
    }

    /// Turn a ring descriptor into a pointer into the device's shared
    /// mapping, rejecting descriptors that fall outside it.
    pub fn resolve_ring(&self, desc: &RingBufferDesc) -> Result<(*mut u8, usize), DriverError> {
        let memory = self.device.ring_memory();
        let end = desc
            .offset
            .checked_add(desc.size)
            .ok_or(DriverError::RingBounds {
                offset: desc.offset,
                size: desc.size,
                mapping: memory.len,
            })?;
        if desc.size == 0 || end > memory.len as u64 {
            return Err(DriverError::RingBounds {
                offset: desc.offset,
                size: desc.size,
                mapping: memory.len,
            });
        }
        // SAFETY: bounds checked against the mapping length just above.
        Ok((unsafe { memory.base.add(desc.offset as usize) }, desc.size as usize))
    }
}

fn read_u64(payload: &[u8]) -> Result<u64, DriverError> {
    let mut r = ByteReader::new(payload);
    r.u64().map_err(|e| DriverError::Reply(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::communications::{MockedDevice, MockedDeviceCommands};
    use shared::constants::MAX_PROBE_COUNT;
    use shared::wire::probe::{ProbePointConnection, ProbePointId, ProbePurpose, ProbeType};

    fn sample_config() -> ProbePointConfiguration {
        ProbePointConfiguration {
            extraction_event_id: 7,
            connections: (0..MAX_PROBE_COUNT)
                .map(|i| ProbePointConnection {
                    enabled: i == 0,
                    point: ProbePointId::new(1, 2, ProbeType::Input, 0),
                    purpose: ProbePurpose::Inject,
                    injection_event_id: 100 + i as u64,
                })
                .collect(),
        }
    }

    #[test]
    fn state_round_trip_through_the_driver() {
        let device = Arc::new(MockedDevice::new(0));
        let commands = MockedDeviceCommands::new(&device);
        for state in [ProbeState::Idle, ProbeState::Owned, ProbeState::Allocated] {
            commands.add_set_probe_state(true, 0, state);
            commands.add_get_probe_state(true, 0, state);
        }

        let backend = ProbeBackend::new(device.clone());
        for state in [ProbeState::Idle, ProbeState::Owned, ProbeState::Allocated] {
            backend.set_state(state).unwrap();
            assert_eq!(backend.get_state().unwrap(), state);
        }
        assert_eq!(device.unmet_expectations(), 0);
    }

    #[test]
    fn driver_status_failure_is_classified() {
        let device = Arc::new(MockedDevice::new(0));
        MockedDeviceCommands::new(&device).add_set_probe_state(true, -1073741676, ProbeState::Idle);

        let backend = ProbeBackend::new(device);
        let err = backend.set_state(ProbeState::Idle).unwrap_err();
        assert!(matches!(err, DriverError::Status(-1073741676)));
    }

    #[test]
    fn os_failure_is_classified() {
        let device = Arc::new(MockedDevice::new(0));
        MockedDeviceCommands::new(&device).add_set_probe_state(false, 0, ProbeState::Idle);

        let backend = ProbeBackend::new(device);
        assert!(matches!(
            backend.set_state(ProbeState::Idle).unwrap_err(),
            DriverError::Os { .. }
        ));
    }

    #[test]
    fn config_round_trip_through_the_driver() {
        let device = Arc::new(MockedDevice::new(0));
        let commands = MockedDeviceCommands::new(&device);
        let config = sample_config();
        commands.add_set_probe_config(true, 0, &config);
        commands.add_get_probe_config(true, 0, &config);

        let backend = ProbeBackend::new(device.clone());
        backend.set_config(&config).unwrap();
        assert_eq!(backend.get_config().unwrap(), config);
        assert_eq!(device.unmet_expectations(), 0);
    }

    #[test]
    fn positions_are_read_per_probe() {
        let device = Arc::new(MockedDevice::new(0));
        let commands = MockedDeviceCommands::new(&device);
        commands.add_get_extraction_position(true, 0, 42);
        commands.add_get_injection_position(true, 0, 3, 21);

        let backend = ProbeBackend::new(device);
        assert_eq!(backend.extraction_position().unwrap(), 42);
        assert_eq!(backend.injection_position(3).unwrap(), 21);
    }

    #[test]
    fn ring_descriptor_bounds_are_checked() {
        let device = Arc::new(MockedDevice::new(64));
        let backend = ProbeBackend::new(device);

        assert!(backend
            .resolve_ring(&RingBufferDesc { offset: 0, size: 64 })
            .is_ok());
        assert!(matches!(
            backend.resolve_ring(&RingBufferDesc { offset: 32, size: 64 }),
            Err(DriverError::RingBounds { .. })
        ));
        assert!(matches!(
            backend.resolve_ring(&RingBufferDesc { offset: 0, size: 0 }),
            Err(DriverError::RingBounds { .. })
        ));
    }
}
