//! Mocked device: the only mechanism by which the probe core is tested.
//!
//! Expectations are `(code, expected input, returned buffer, os status)`
//! tuples consumed strictly in order. Any deviation fails the exchange with
//! the expectation index and an expected-vs-actual diff, and the failure is
//! returned as [`DriverError::Mock`] so the calling layer surfaces it like
//! any other driver fault.
//!
//! The mock also owns an arena standing in for the driver's shared
//! ring-buffer mapping; tests write driver-produced bytes into it through
//! [`FakeRingBuffer`] and read back what injection workers wrote.

use crate::communications::{Device, RingMemory};
use parking_lot::Mutex;
use shared::constants::{
    IOCTL_ADSP_BIG_GET, IOCTL_ADSP_BIG_SET, IOCTL_ADSP_TINY_GET, IOCTL_ADSP_TINY_SET, param,
};
use shared::errors::DriverError;
use shared::wire::module::{
    encode_module_access, encode_module_access_reply, encode_module_entries, encode_param_reply,
    encode_param_request, FwConfig, GatewayProps, HwConfig, ModuleEntry, ModuleInstanceProps,
    PplProps, SchedulersInfo, encode_gateways, encode_pipeline_ids,
};
use shared::wire::probe::{
    ProbePointConfiguration, ProbeState, RingBuffersDescription, CONFIG_WIRE_BYTES,
    POSITION_WIRE_BYTES, PROBE_STATE_WIRE_BYTES, RING_DESCRIPTION_WIRE_BYTES,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

/// One scripted io control exchange.
pub struct IoctlExpectation {
    pub code: u32,
    pub expected_input: Vec<u8>,
    /// Reply buffer the device hands back; ignored when `os_success` is
    /// false (the syscall never completes).
    pub returned_buffer: Option<Vec<u8>>,
    pub os_success: bool,
}

pub struct MockedDevice {
    expectations: Mutex<VecDeque<IoctlExpectation>>,
    consumed: AtomicUsize,
    arena: Vec<u8>,
}

// Workers read and write the arena through raw pointers while tests inspect
// it, exactly like real driver-shared memory.
unsafe impl Send for MockedDevice {}
unsafe impl Sync for MockedDevice {}

impl MockedDevice {
    /// Create a mock whose ring arena is `ring_len` bytes of zeroes.
    pub fn new(ring_len: usize) -> Self {
        Self {
            expectations: Mutex::new(VecDeque::new()),
            consumed: AtomicUsize::new(0),
            arena: vec![0u8; ring_len],
        }
    }

    pub fn expect(&self, expectation: IoctlExpectation) {
        self.expectations.lock().push_back(expectation);
    }

    /// Expectations queued but not yet consumed. Tests assert this is zero
    /// before dropping the mock.
    pub fn unmet_expectations(&self) -> usize {
        self.expectations.lock().len()
    }
}

impl Device for MockedDevice {
    fn io_control(&self, code: u32, buffer: &mut Vec<u8>) -> Result<(), DriverError> {
        let expectation = self.expectations.lock().pop_front();
        let index = self.consumed.fetch_add(1, Ordering::Relaxed);

        let Some(expectation) = expectation else {
            return Err(DriverError::Mock(format!(
                "unexpected ioctl #{index} (code {code:#010x}): no expectation queued"
            )));
        };
        if code != expectation.code {
            return Err(DriverError::Mock(format!(
                "ioctl #{index}: code mismatch: expected {:#010x}, got {code:#010x}",
                expectation.code
            )));
        }
        if *buffer != expectation.expected_input {
            return Err(DriverError::Mock(diff_message(
                index,
                &expectation.expected_input,
                buffer,
            )));
        }
        if !expectation.os_success {
            return Err(DriverError::Os {
                source: std::io::Error::from_raw_os_error(libc_eio()),
            });
        }
        if let Some(reply) = expectation.returned_buffer {
            *buffer = reply;
        }
        Ok(())
    }

    fn ring_memory(&self) -> RingMemory {
        RingMemory {
            base: self.arena.as_ptr() as *mut u8,
            len: self.arena.len(),
        }
    }
}

// EIO without pulling libc into non-unix builds of the mock.
fn libc_eio() -> i32 {
    5
}

fn diff_message(index: usize, expected: &[u8], actual: &[u8]) -> String {
    if expected.len() != actual.len() {
        return format!(
            "ioctl #{index}: input length mismatch: expected {} bytes, got {}",
            expected.len(),
            actual.len()
        );
    }
    let byte = expected
        .iter()
        .zip(actual)
        .position(|(e, a)| e != a)
        .unwrap_or(0);
    format!(
        "ioctl #{index}: input mismatch at byte {byte}: expected {:#04x}, got {:#04x}",
        expected[byte], actual[byte]
    )
}

/// Typed builders producing the byte-exact expectations for every driver
/// operation the agent performs.
pub struct MockedDeviceCommands<'a> {
    device: &'a MockedDevice,
}

impl<'a> MockedDeviceCommands<'a> {
    pub fn new(device: &'a MockedDevice) -> Self {
        Self { device }
    }

    fn push(&self, code: u32, input: Vec<u8>, reply: Option<Vec<u8>>, os_success: bool) {
        self.device.expect(IoctlExpectation {
            code,
            expected_input: input,
            returned_buffer: reply,
            os_success,
        });
    }

    pub fn add_get_probe_state(&self, os_success: bool, status: i32, state: ProbeState) {
        self.push(
            IOCTL_ADSP_TINY_GET,
            encode_param_request(param::PROBE_STATE, &[0u8; PROBE_STATE_WIRE_BYTES]),
            Some(encode_param_reply(
                status,
                param::PROBE_STATE,
                &state.to_wire().to_le_bytes(),
            )),
            os_success,
        );
    }

    pub fn add_set_probe_state(&self, os_success: bool, status: i32, state: ProbeState) {
        self.push(
            IOCTL_ADSP_TINY_SET,
            encode_param_request(param::PROBE_STATE, &state.to_wire().to_le_bytes()),
            Some(encode_param_reply(status, param::PROBE_STATE, &[])),
            os_success,
        );
    }

    pub fn add_get_probe_config(
        &self,
        os_success: bool,
        status: i32,
        config: &ProbePointConfiguration,
    ) {
        self.push(
            IOCTL_ADSP_BIG_GET,
            encode_param_request(param::PROBE_CONFIG, &[0u8; CONFIG_WIRE_BYTES]),
            Some(encode_param_reply(status, param::PROBE_CONFIG, &config.to_wire())),
            os_success,
        );
    }

    pub fn add_set_probe_config(
        &self,
        os_success: bool,
        status: i32,
        config: &ProbePointConfiguration,
    ) {
        self.push(
            IOCTL_ADSP_BIG_SET,
            encode_param_request(param::PROBE_CONFIG, &config.to_wire()),
            Some(encode_param_reply(status, param::PROBE_CONFIG, &[])),
            os_success,
        );
    }

    pub fn add_get_ring_buffers(
        &self,
        os_success: bool,
        status: i32,
        description: &RingBuffersDescription,
    ) {
        self.push(
            IOCTL_ADSP_BIG_GET,
            encode_param_request(param::PROBE_RING_BUFFERS, &[0u8; RING_DESCRIPTION_WIRE_BYTES]),
            Some(encode_param_reply(
                status,
                param::PROBE_RING_BUFFERS,
                &description.to_wire(),
            )),
            os_success,
        );
    }

    pub fn add_get_extraction_position(&self, os_success: bool, status: i32, position: u64) {
        self.push(
            IOCTL_ADSP_TINY_GET,
            encode_param_request(param::PROBE_EXTRACTION_POS, &[0u8; POSITION_WIRE_BYTES]),
            Some(encode_param_reply(
                status,
                param::PROBE_EXTRACTION_POS,
                &position.to_le_bytes(),
            )),
            os_success,
        );
    }

    pub fn add_get_injection_position(
        &self,
        os_success: bool,
        status: i32,
        probe_index: u32,
        position: u64,
    ) {
        let param_id = param::PROBE_INJECTION_POS_BASE + probe_index;
        self.push(
            IOCTL_ADSP_TINY_GET,
            encode_param_request(param_id, &[0u8; POSITION_WIRE_BYTES]),
            Some(encode_param_reply(status, param_id, &position.to_le_bytes())),
            os_success,
        );
    }

    fn add_module_get(
        &self,
        os_success: bool,
        status: i32,
        fw_status: u32,
        module_id: u16,
        instance_id: u16,
        module_param_id: u32,
        request_data: &[u8],
        reply_data: &[u8],
    ) {
        self.push(
            IOCTL_ADSP_BIG_GET,
            encode_param_request(
                param::MODULE_ACCESS,
                &encode_module_access(module_id, instance_id, module_param_id, request_data),
            ),
            Some(encode_param_reply(
                status,
                param::MODULE_ACCESS,
                &encode_module_access_reply(
                    fw_status,
                    module_id,
                    instance_id,
                    module_param_id,
                    reply_data,
                ),
            )),
            os_success,
        );
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add_get_module_instance_props(
        &self,
        os_success: bool,
        status: i32,
        fw_status: u32,
        module_id: u16,
        instance_id: u16,
        props: &ModuleInstanceProps,
    ) {
        self.add_module_get(
            os_success,
            status,
            fw_status,
            module_id,
            instance_id,
            shared::constants::fw_param::MOD_INST_PROPS,
            &[],
            &props.to_wire(),
        );
    }

    pub fn add_get_module_entries(
        &self,
        os_success: bool,
        status: i32,
        fw_status: u32,
        entries: &[ModuleEntry],
    ) {
        self.add_module_get(
            os_success,
            status,
            fw_status,
            0,
            0,
            shared::constants::fw_param::MODULES_INFO,
            &[],
            &encode_module_entries(entries),
        );
    }

    pub fn add_get_fw_config(&self, os_success: bool, status: i32, fw_status: u32, config: &FwConfig) {
        self.add_module_get(
            os_success,
            status,
            fw_status,
            0,
            0,
            shared::constants::fw_param::FW_CONFIG,
            &[],
            &config.to_tlv(),
        );
    }

    pub fn add_get_hw_config(&self, os_success: bool, status: i32, fw_status: u32, config: &HwConfig) {
        self.add_module_get(
            os_success,
            status,
            fw_status,
            0,
            0,
            shared::constants::fw_param::HW_CONFIG,
            &[],
            &config.to_tlv(),
        );
    }

    pub fn add_get_pipeline_ids(&self, os_success: bool, status: i32, fw_status: u32, ids: &[u32]) {
        self.add_module_get(
            os_success,
            status,
            fw_status,
            0,
            0,
            shared::constants::fw_param::PIPELINE_LIST,
            &[],
            &encode_pipeline_ids(ids),
        );
    }

    pub fn add_get_pipeline_props(
        &self,
        os_success: bool,
        status: i32,
        fw_status: u32,
        pipeline_id: u32,
        props: &PplProps,
    ) {
        self.add_module_get(
            os_success,
            status,
            fw_status,
            0,
            0,
            shared::constants::fw_param::PIPELINE_PROPS,
            &pipeline_id.to_le_bytes(),
            &props.to_wire(),
        );
    }

    pub fn add_get_schedulers_info(
        &self,
        os_success: bool,
        status: i32,
        fw_status: u32,
        core_id: u32,
        info: &SchedulersInfo,
    ) {
        self.add_module_get(
            os_success,
            status,
            fw_status,
            0,
            0,
            shared::constants::fw_param::SCHEDULERS_INFO,
            &core_id.to_le_bytes(),
            &info.to_wire(),
        );
    }

    pub fn add_get_gateways(
        &self,
        os_success: bool,
        status: i32,
        fw_status: u32,
        gateways: &[GatewayProps],
    ) {
        self.add_module_get(
            os_success,
            status,
            fw_status,
            0,
            0,
            shared::constants::fw_param::GATEWAYS,
            &[],
            &encode_gateways(gateways),
        );
    }
}

/// Simulates the driver side of a ring buffer: writes with wrap-around and
/// tracks the linear producer position.
pub struct FakeRingBuffer {
    base: *mut u8,
    size: usize,
    linear: u64,
}

unsafe impl Send for FakeRingBuffer {}

impl FakeRingBuffer {
    /// `base` must point at `size` valid bytes (a slice of a mock arena).
    pub fn new(base: *mut u8, size: usize) -> Self {
        Self {
            base,
            size,
            linear: 0,
        }
    }

    /// Fill the whole buffer with a marker value.
    pub fn fill(&mut self, value: u8) {
        for i in 0..self.size {
            unsafe { self.base.add(i).write(value) };
        }
    }

    /// Write `content` at the current producer position, wrapping at the
    /// end of the buffer.
    pub fn write(&mut self, content: &[u8]) {
        assert!(content.len() <= self.size, "write larger than the ring");
        let offset = (self.linear % self.size as u64) as usize;
        let first = content.len().min(self.size - offset);
        unsafe {
            std::ptr::copy_nonoverlapping(content.as_ptr(), self.base.add(offset), first);
            std::ptr::copy_nonoverlapping(
                content[first..].as_ptr(),
                self.base,
                content.len() - first,
            );
        }
        self.linear += content.len() as u64;
    }

    pub fn producer_position(&self) -> u64 {
        self.linear
    }

    /// Copy of the whole backing buffer, in storage order.
    pub fn snapshot(&self) -> Vec<u8> {
        let mut out = vec![0u8; self.size];
        unsafe { std::ptr::copy_nonoverlapping(self.base, out.as_mut_ptr(), self.size) };
        out
    }
}
