//! End-to-end probe service scenarios over the mocked device: the full
//! state walk, extraction through the ring/framer/queue path, injection
//! with sample rounding and silence padding, exclusive streams, and the
//! fatal ring faults.

use agent::communications::{
    Device, EventHandles, FakeRingBuffer, MockedDevice, MockedDeviceCommands,
};
use agent::modules::ModuleHandler;
use agent::probe::backend::ProbeBackend;
use agent::probe::service::{EndpointConfig, ProbeService, QueueBudgets};
use agent::probe::ProbeId;
use shared::constants::{ADSP_IPC_SUCCESS, MAX_PROBE_COUNT};
use shared::errors::ProbeError;
use shared::wire::module::{
    AudioDataFormat, CompoundModuleId, ModuleInstanceProps, PinProps,
};
use shared::wire::probe::{
    encode_packet, ProbePointConfiguration, ProbePointConnection, ProbePointId, ProbePurpose,
    ProbeState, ProbeType, RingBufferDesc, RingBuffersDescription,
};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const RING_SIZE: usize = 31;
const SAMPLE_BYTE_SIZE: usize = 8; // 16-bit valid depth, 4 channels
const CONSUMER_DELTA: u64 = 21;

struct Fixture {
    device: Arc<MockedDevice>,
    events: Arc<EventHandles>,
    service: Arc<ProbeService>,
}

fn fixture(ring_arena: usize) -> Fixture {
    let device = Arc::new(MockedDevice::new(ring_arena));
    let events = Arc::new(EventHandles::create(MAX_PROBE_COUNT));
    let backend = Arc::new(ProbeBackend::new(device.clone() as Arc<dyn Device>));
    let modules = Arc::new(ModuleHandler::new(device.clone() as Arc<dyn Device>));
    let service = Arc::new(ProbeService::new(
        backend,
        modules,
        Arc::clone(&events),
        QueueBudgets::default(),
    ));
    Fixture {
        device,
        events,
        service,
    }
}

/// The driver-side configuration the service is expected to program, given
/// the endpoints that were enabled.
fn expected_driver_config(
    events: &EventHandles,
    enabled: &[(usize, EndpointConfig)],
) -> ProbePointConfiguration {
    let mut connections: Vec<ProbePointConnection> = (0..MAX_PROBE_COUNT)
        .map(|index| {
            let default = EndpointConfig::default();
            ProbePointConnection {
                enabled: default.enabled,
                point: default.point,
                purpose: default.purpose,
                injection_event_id: events.injection[index].wire_id(),
            }
        })
        .collect();
    for (index, endpoint) in enabled {
        connections[*index].enabled = endpoint.enabled;
        connections[*index].point = endpoint.point;
        connections[*index].purpose = endpoint.purpose;
    }
    ProbePointConfiguration {
        extraction_event_id: events.extraction.wire_id(),
        connections,
    }
}

fn ring_descriptions(extraction: Option<u64>, injection0: Option<u64>) -> RingBuffersDescription {
    let unused = RingBufferDesc { offset: 0, size: 0 };
    RingBuffersDescription {
        extraction: extraction
            .map(|offset| RingBufferDesc {
                offset,
                size: RING_SIZE as u64,
            })
            .unwrap_or(unused),
        injection: (0..MAX_PROBE_COUNT)
            .map(|index| {
                if index == 0 {
                    if let Some(offset) = injection0 {
                        return RingBufferDesc {
                            offset,
                            size: RING_SIZE as u64,
                        };
                    }
                }
                unused
            })
            .collect(),
    }
}

fn injection_module_props() -> ModuleInstanceProps {
    ModuleInstanceProps {
        id: CompoundModuleId {
            module_id: 1,
            instance_id: 2,
        },
        dp_queue_type: 0,
        queue_alignment: 4,
        cp_usage_mask: 0,
        stack_bytes: 0,
        bss_total_bytes: 0,
        bss_used_bytes: 0,
        ibs_bytes: 0,
        obs_bytes: 0,
        cpc: 0,
        cpc_peak: 0,
        input_pins: vec![PinProps {
            stream_type: 0,
            format: AudioDataFormat {
                sampling_frequency: 48_000,
                bit_depth: 16,
                channel_map: 0,
                channel_config: 0,
                interleaving_style: 0,
                number_of_channels: 4,
                valid_bit_depth: 16,
                sample_type: 0,
                reserved: 0,
            },
            phys_queue_id: 0,
        }],
        output_pins: vec![],
        input_gateway: u32::MAX,
        output_gateway: u32::MAX,
    }
}

fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(1));
    }
}

/// Split a buffer into chunks whose sizes cycle through `sizes`.
fn split_buffer(buffer: &[u8], sizes: &[usize]) -> Vec<Vec<u8>> {
    let mut chunks = Vec::new();
    let mut cursor = 0;
    let mut i = 0;
    while cursor < buffer.len() {
        let size = sizes[i % sizes.len()].min(buffer.len() - cursor);
        chunks.push(buffer[cursor..cursor + size].to_vec());
        cursor += size;
        i += 1;
    }
    chunks
}

#[test]
fn happy_extraction_delivers_every_payload_in_order() {
    let fx = fixture(RING_SIZE);
    let commands = MockedDeviceCommands::new(&fx.device);

    let point = ProbePointId::new(1, 2, ProbeType::Output, 0);
    let endpoint = EndpointConfig {
        enabled: true,
        point,
        purpose: ProbePurpose::Extract,
    };
    fx.service.set_endpoint(ProbeId(1), endpoint).unwrap();

    // 20 packets whose payload sizes are 0..19, concatenated, written to
    // the ring in chunks of cycling sizes {1, 10, 20, 30}.
    let mut content = Vec::new();
    for size in 0..20u8 {
        content.extend(encode_packet(point, &vec![size; size as usize]));
    }
    let blocks = split_buffer(&content, &[1, 10, 20, 30]);

    commands.add_set_probe_state(true, 0, ProbeState::Owned);
    commands.add_set_probe_config(
        true,
        0,
        &expected_driver_config(&fx.events, &[(1, endpoint)]),
    );
    commands.add_set_probe_state(true, 0, ProbeState::Allocated);
    commands.add_get_ring_buffers(true, 0, &ring_descriptions(Some(0), None));
    commands.add_set_probe_state(true, 0, ProbeState::Active);

    // One producer-position read per ring write, plus the final read of
    // the drain pass during teardown.
    let mut position = 0u64;
    for block in &blocks {
        position += block.len() as u64;
        commands.add_get_extraction_position(true, 0, position);
    }
    commands.add_get_extraction_position(true, 0, position);
    commands.add_set_probe_state(true, 0, ProbeState::Allocated);
    commands.add_set_probe_state(true, 0, ProbeState::Owned);
    commands.add_set_probe_state(true, 0, ProbeState::Idle);

    fx.service.set_state(ProbeState::Active).unwrap();

    let stream = fx.service.acquire_extract_stream(ProbeId(1)).unwrap();
    let consumer = thread::spawn(move || {
        let mut payloads = Vec::new();
        while payloads.len() < 20 {
            match stream.read_chunk() {
                Some(payload) => payloads.push(payload),
                None => break,
            }
        }
        payloads
    });

    // Drive the driver side: write a block, signal, and wait for the
    // worker to consume its position query before the next write.
    let memory = fx.device.ring_memory();
    let mut ring = FakeRingBuffer::new(memory.base, RING_SIZE);
    let mut remaining = fx.device.unmet_expectations();
    for block in &blocks {
        ring.write(block);
        fx.events.extraction.signal();
        remaining -= 1;
        wait_until("position query of this block", || {
            fx.device.unmet_expectations() <= remaining
        });
    }

    let payloads = consumer.join().unwrap();
    assert_eq!(payloads.len(), 20);
    for (size, payload) in payloads.iter().enumerate() {
        assert_eq!(payload, &vec![size as u8; size], "payload {size}");
    }
    assert_eq!(fx.service.dropped_packet_count(), 0);

    fx.service.set_state(ProbeState::Idle).unwrap();
    assert_eq!(fx.device.unmet_expectations(), 0);
}

#[test]
fn happy_injection_writes_whole_samples_with_silence_padding() {
    let fx = fixture(RING_SIZE);
    let commands = MockedDeviceCommands::new(&fx.device);

    let endpoint = EndpointConfig {
        enabled: true,
        point: ProbePointId::new(1, 2, ProbeType::Input, 0),
        purpose: ProbePurpose::Inject,
    };
    fx.service.set_endpoint(ProbeId(0), endpoint).unwrap();

    // 100 samples of client data, byte i = i % 256.
    let data: Vec<u8> = (0..100 * SAMPLE_BYTE_SIZE).map(|i| (i % 256) as u8).collect();

    // Model of the worker's pacing: one ring of silence up front, then one
    // whole-sample block per consumer advance, padded with silence when the
    // client data runs out.
    let mut expected_snapshots = Vec::new();
    let mut consumer_positions = Vec::new();
    {
        let mut model = vec![0xFFu8; RING_SIZE];
        let mut linear = 0u64;
        let mut write = |model: &mut Vec<u8>, linear: &mut u64, block: &[u8]| {
            for &byte in block {
                let offset = (*linear % RING_SIZE as u64) as usize;
                model[offset] = byte;
                *linear += 1;
            }
        };
        let prefill = (RING_SIZE / SAMPLE_BYTE_SIZE) * SAMPLE_BYTE_SIZE;
        write(&mut model, &mut linear, &vec![0u8; prefill]);
        expected_snapshots.push(model.clone());

        let mut consumer = 0u64;
        let mut cursor = 0;
        while cursor < data.len() {
            consumer += CONSUMER_DELTA;
            consumer_positions.push(consumer);
            let free = RING_SIZE - (linear - consumer) as usize;
            let writable = free - free % SAMPLE_BYTE_SIZE;
            let take = writable.min(data.len() - cursor);
            let mut block = data[cursor..cursor + take].to_vec();
            cursor += take;
            block.resize(writable, 0);
            write(&mut model, &mut linear, &block);
            expected_snapshots.push(model.clone());
        }
    }

    commands.add_set_probe_state(true, 0, ProbeState::Owned);
    commands.add_set_probe_config(
        true,
        0,
        &expected_driver_config(&fx.events, &[(0, endpoint)]),
    );
    commands.add_set_probe_state(true, 0, ProbeState::Allocated);
    commands.add_get_ring_buffers(true, 0, &ring_descriptions(None, Some(0)));
    commands.add_get_module_instance_props(
        true,
        0,
        ADSP_IPC_SUCCESS,
        1,
        2,
        &injection_module_props(),
    );
    commands.add_set_probe_state(true, 0, ProbeState::Active);
    for &position in &consumer_positions {
        commands.add_get_injection_position(true, 0, 0, position);
    }
    commands.add_set_probe_state(true, 0, ProbeState::Allocated);
    commands.add_set_probe_state(true, 0, ProbeState::Owned);
    commands.add_set_probe_state(true, 0, ProbeState::Idle);

    // The driver hands out fresh (never written) buffers; mark the arena
    // so silence is distinguishable from untouched memory.
    let memory = fx.device.ring_memory();
    let mut ring = FakeRingBuffer::new(memory.base, RING_SIZE);
    ring.fill(0xFF);

    fx.service.set_state(ProbeState::Active).unwrap();

    // Prefill happens without any driver query.
    wait_until("silence prefill", || ring.snapshot() == expected_snapshots[0]);

    let stream = fx.service.acquire_inject_stream(ProbeId(0)).unwrap();
    assert!(stream.write_bytes(&data));

    // Each driver consumption event produces exactly one whole-sample
    // write; snapshots must match the model after every iteration.
    for expected in &expected_snapshots[1..] {
        fx.events.injection[0].signal();
        wait_until("ring snapshot of this iteration", || {
            ring.snapshot() == *expected
        });
    }

    fx.service.set_state(ProbeState::Idle).unwrap();
    assert_eq!(fx.device.unmet_expectations(), 0);
}

#[test]
fn unmapped_extraction_packets_are_dropped_and_counted() {
    let fx = fixture(RING_SIZE);
    let commands = MockedDeviceCommands::new(&fx.device);

    let mapped = ProbePointId::new(1, 2, ProbeType::Output, 0);
    let unmapped = ProbePointId::new(9, 9, ProbeType::Output, 0);
    let endpoint = EndpointConfig {
        enabled: true,
        point: mapped,
        purpose: ProbePurpose::Extract,
    };
    fx.service.set_endpoint(ProbeId(1), endpoint).unwrap();

    let stray = encode_packet(unmapped, &[1, 2, 3]);

    commands.add_set_probe_state(true, 0, ProbeState::Owned);
    commands.add_set_probe_config(
        true,
        0,
        &expected_driver_config(&fx.events, &[(1, endpoint)]),
    );
    commands.add_set_probe_state(true, 0, ProbeState::Allocated);
    commands.add_get_ring_buffers(true, 0, &ring_descriptions(Some(0), None));
    commands.add_set_probe_state(true, 0, ProbeState::Active);
    commands.add_get_extraction_position(true, 0, stray.len() as u64);
    commands.add_get_extraction_position(true, 0, stray.len() as u64);
    commands.add_set_probe_state(true, 0, ProbeState::Allocated);
    commands.add_set_probe_state(true, 0, ProbeState::Owned);
    commands.add_set_probe_state(true, 0, ProbeState::Idle);

    fx.service.set_state(ProbeState::Active).unwrap();

    let memory = fx.device.ring_memory();
    let mut ring = FakeRingBuffer::new(memory.base, RING_SIZE);
    ring.write(&stray);
    fx.events.extraction.signal();

    wait_until("stray packet to be dropped", || {
        fx.service.dropped_packet_count() == 1
    });

    fx.service.set_state(ProbeState::Idle).unwrap();
    assert_eq!(fx.device.unmet_expectations(), 0);
}

#[test]
fn extraction_overflow_ends_the_stream_with_truncation() {
    let fx = fixture(RING_SIZE);
    let commands = MockedDeviceCommands::new(&fx.device);

    let endpoint = EndpointConfig {
        enabled: true,
        point: ProbePointId::new(1, 2, ProbeType::Output, 0),
        purpose: ProbePurpose::Extract,
    };
    fx.service.set_endpoint(ProbeId(1), endpoint).unwrap();

    commands.add_set_probe_state(true, 0, ProbeState::Owned);
    commands.add_set_probe_config(
        true,
        0,
        &expected_driver_config(&fx.events, &[(1, endpoint)]),
    );
    commands.add_set_probe_state(true, 0, ProbeState::Allocated);
    commands.add_get_ring_buffers(true, 0, &ring_descriptions(Some(0), None));
    commands.add_set_probe_state(true, 0, ProbeState::Active);
    // The driver claims to have written one byte more than the ring holds:
    // the worker must fault and close the stream.
    commands.add_get_extraction_position(true, 0, RING_SIZE as u64 + 1);
    commands.add_set_probe_state(true, 0, ProbeState::Allocated);
    commands.add_set_probe_state(true, 0, ProbeState::Owned);
    commands.add_set_probe_state(true, 0, ProbeState::Idle);

    fx.service.set_state(ProbeState::Active).unwrap();
    let stream = fx.service.acquire_extract_stream(ProbeId(1)).unwrap();

    fx.events.extraction.signal();
    // The client observes a truncated stream: EOF with no payload.
    assert_eq!(stream.read_chunk(), None);

    fx.service.set_state(ProbeState::Idle).unwrap();
    assert_eq!(fx.device.unmet_expectations(), 0);
}

#[test]
fn streams_are_exclusive_per_endpoint_and_direction() {
    let fx = fixture(0);

    let first = fx.service.acquire_extract_stream(ProbeId(1)).unwrap();
    assert!(matches!(
        fx.service.acquire_extract_stream(ProbeId(1)),
        Err(ProbeError::Busy {
            id: 1,
            direction: "extraction"
        })
    ));
    // The other direction and other endpoints are unaffected.
    let _inject = fx.service.acquire_inject_stream(ProbeId(1)).unwrap();
    let _other = fx.service.acquire_extract_stream(ProbeId(2)).unwrap();

    drop(first);
    assert!(fx.service.acquire_extract_stream(ProbeId(1)).is_ok());

    assert!(matches!(
        fx.service.acquire_extract_stream(ProbeId(99)),
        Err(ProbeError::InvalidProbeId { id: 99, .. })
    ));
}

#[test]
fn reconfiguration_during_an_active_session_is_refused() {
    let fx = fixture(RING_SIZE);
    let commands = MockedDeviceCommands::new(&fx.device);

    // No endpoints enabled: the session runs without workers.
    commands.add_set_probe_state(true, 0, ProbeState::Owned);
    commands.add_set_probe_config(true, 0, &expected_driver_config(&fx.events, &[]));
    commands.add_set_probe_state(true, 0, ProbeState::Allocated);
    commands.add_get_ring_buffers(true, 0, &ring_descriptions(None, None));
    commands.add_set_probe_state(true, 0, ProbeState::Active);

    fx.service.set_state(ProbeState::Active).unwrap();

    let attempted = EndpointConfig {
        enabled: true,
        point: ProbePointId::new(5, 5, ProbeType::Output, 0),
        purpose: ProbePurpose::Extract,
    };
    assert!(matches!(
        fx.service.set_endpoint(ProbeId(0), attempted),
        Err(ProbeError::WrongState { .. })
    ));

    // Service still Active with the original configuration.
    commands.add_get_probe_state(true, 0, ProbeState::Active);
    assert_eq!(fx.service.get_state().unwrap(), ProbeState::Active);
    assert_eq!(
        fx.service.get_endpoint(ProbeId(0)).unwrap(),
        EndpointConfig::default()
    );

    commands.add_set_probe_state(true, 0, ProbeState::Allocated);
    commands.add_set_probe_state(true, 0, ProbeState::Owned);
    commands.add_set_probe_state(true, 0, ProbeState::Idle);
    fx.service.set_state(ProbeState::Idle).unwrap();
    assert_eq!(fx.device.unmet_expectations(), 0);
}
