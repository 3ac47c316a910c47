//! The probe service: endpoint configuration, the
//! Idle/Owned/Allocated/Active state machine and the streaming session it
//! carries.
//!
//! `set_state` walks stepwise through every intermediate state, running the
//! entry and exit actions of each edge:
//!
//! - `Idle -> Owned`: snapshot the endpoint configuration into the session.
//! - `Owned -> Allocated`: program the configuration into the driver. On
//!   failure the service rolls back to Idle and surfaces the original
//!   error.
//! - `Allocated -> Active`: fetch the ring descriptors, resolve injection
//!   sample sizes through the module handler, check extraction probe-point
//!   uniqueness, open the queues and launch the workers, then tell the
//!   driver.
//! - `Active -> Allocated`: stop flag, signal every event, close the
//!   queues (this is what unblocks workers and HTTP handlers), join the
//!   workers.
//!
//! The service owns the queues and the worker threads; workers only hold
//! the typed handles given to them at spawn.

use crate::communications::EventHandles;
use crate::modules::ModuleHandler;
use crate::probe::backend::ProbeBackend;
use crate::probe::extractor::{self, ProbePointMap};
use crate::probe::injector;
use crate::probe::queue::{BlockingQueue, ByteQueue};
use crate::probe::resource::{ExtractionStream, InjectionStream, StreamLease};
use crate::probe::ring_buffer::{RingBufferReader, RingBufferWriter};
use crate::probe::ProbeId;
use log::{info, warn};
use parking_lot::Mutex;
use shared::constants::{DEFAULT_EXTRACTION_QUEUE_BYTES, DEFAULT_INJECTION_QUEUE_BYTES, MAX_PROBE_COUNT};
use shared::errors::ProbeError;
use shared::wire::probe::{
    ProbePointConfiguration, ProbePointConnection, ProbePointId, ProbePurpose, ProbeState,
    ProbeType,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Cached configuration of one endpoint slot. When disabled, point and
/// purpose are preserved but ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointConfig {
    pub enabled: bool,
    pub point: ProbePointId,
    pub purpose: ProbePurpose,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            point: ProbePointId::new(0, 0, ProbeType::Input, 0),
            purpose: ProbePurpose::Extract,
        }
    }
}

/// Byte budgets of the per-probe queues.
#[derive(Debug, Clone, Copy)]
pub struct QueueBudgets {
    pub extraction_bytes: usize,
    pub injection_bytes: usize,
}

impl Default for QueueBudgets {
    fn default() -> Self {
        Self {
            extraction_bytes: DEFAULT_EXTRACTION_QUEUE_BYTES,
            injection_bytes: DEFAULT_INJECTION_QUEUE_BYTES,
        }
    }
}

struct Session {
    snapshot: Vec<EndpointConfig>,
    stop: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,
    sample_byte_sizes: HashMap<u32, usize>,
}

struct Inner {
    state: ProbeState,
    endpoints: Vec<EndpointConfig>,
    session: Option<Session>,
}

pub struct ProbeService {
    backend: Arc<ProbeBackend>,
    modules: Arc<ModuleHandler>,
    events: Arc<EventHandles>,
    extraction_queues: Vec<Arc<BlockingQueue>>,
    injection_queues: Vec<Arc<ByteQueue>>,
    extraction_leases: Vec<Arc<StreamLease>>,
    injection_leases: Vec<Arc<StreamLease>>,
    dropped_packets: Arc<AtomicU64>,
    inner: Mutex<Inner>,
}

impl ProbeService {
    pub fn new(
        backend: Arc<ProbeBackend>,
        modules: Arc<ModuleHandler>,
        events: Arc<EventHandles>,
        budgets: QueueBudgets,
    ) -> Self {
        let count = MAX_PROBE_COUNT;
        Self {
            backend,
            modules,
            events,
            extraction_queues: (0..count)
                .map(|_| Arc::new(BlockingQueue::new(budgets.extraction_bytes)))
                .collect(),
            injection_queues: (0..count)
                .map(|_| Arc::new(ByteQueue::new(budgets.injection_bytes)))
                .collect(),
            extraction_leases: (0..count).map(|_| StreamLease::new()).collect(),
            injection_leases: (0..count).map(|_| StreamLease::new()).collect(),
            dropped_packets: Arc::new(AtomicU64::new(0)),
            inner: Mutex::new(Inner {
                state: ProbeState::Idle,
                endpoints: vec![EndpointConfig::default(); count],
                session: None,
            }),
        }
    }

    pub fn max_probe_count(&self) -> usize {
        self.extraction_queues.len()
    }

    /// Extraction packets dropped because their probe point was not mapped.
    pub fn dropped_packet_count(&self) -> u64 {
        self.dropped_packets.load(Ordering::Relaxed)
    }

    fn check_probe_id(&self, id: ProbeId) -> Result<(), ProbeError> {
        if id.index() >= self.max_probe_count() {
            return Err(ProbeError::InvalidProbeId {
                id: id.value(),
                max: self.max_probe_count() as u32,
            });
        }
        Ok(())
    }

    pub fn get_endpoint(&self, id: ProbeId) -> Result<EndpointConfig, ProbeError> {
        self.check_probe_id(id)?;
        Ok(self.inner.lock().endpoints[id.index()])
    }

    /// Reconfigure one endpoint slot. Only legal while the service is Idle,
    /// so no running session ever observes a reconfiguration.
    pub fn set_endpoint(&self, id: ProbeId, config: EndpointConfig) -> Result<(), ProbeError> {
        self.check_probe_id(id)?;
        let mut inner = self.inner.lock();
        if inner.state != ProbeState::Idle {
            return Err(ProbeError::WrongState {
                operation: "set_endpoint",
                required: ProbeState::Idle,
                actual: inner.state,
            });
        }
        inner.endpoints[id.index()] = config;
        Ok(())
    }

    /// All endpoint configurations, in slot order.
    pub fn endpoints(&self) -> Vec<EndpointConfig> {
        self.inner.lock().endpoints.clone()
    }

    /// Cached state, without a driver round trip. Diagnostic use only.
    pub fn cached_state(&self) -> ProbeState {
        self.inner.lock().state
    }

    /// Current state, cross-checked against the driver. A disagreement is
    /// reported, never repaired.
    pub fn get_state(&self) -> Result<ProbeState, ProbeError> {
        let inner = self.inner.lock();
        let driver = self.backend.get_state()?;
        if driver != inner.state {
            return Err(ProbeError::Inconsistent {
                cached: inner.state,
                driver,
            });
        }
        Ok(driver)
    }

    /// Walk the state machine to `target`, running every edge's actions.
    pub fn set_state(&self, target: ProbeState) -> Result<(), ProbeError> {
        let mut inner = self.inner.lock();
        while inner.state != target {
            let next = if target > inner.state {
                step_up(inner.state)
            } else {
                step_down(inner.state)
            };
            self.transition(&mut inner, next)?;
        }
        Ok(())
    }

    fn transition(&self, inner: &mut Inner, next: ProbeState) -> Result<(), ProbeError> {
        use ProbeState::*;
        match (inner.state, next) {
            (Idle, Owned) => self.enter_owned(inner),
            (Owned, Allocated) => match self.enter_allocated(inner) {
                Ok(()) => Ok(()),
                Err(original) => {
                    self.roll_back_to_idle(inner);
                    Err(original)
                }
            },
            (Allocated, Active) => self.enter_active(inner),
            (Active, Allocated) => self.leave_active(inner),
            (Allocated, Owned) => {
                self.backend.set_state(Owned)?;
                inner.state = Owned;
                Ok(())
            }
            (Owned, Idle) => {
                self.backend.set_state(Idle)?;
                inner.state = Idle;
                inner.session = None;
                Ok(())
            }
            (from, to) => Err(ProbeError::IllegalTransition { from, to }),
        }
    }

    fn enter_owned(&self, inner: &mut Inner) -> Result<(), ProbeError> {
        self.backend.set_state(ProbeState::Owned)?;
        inner.session = Some(Session {
            snapshot: inner.endpoints.clone(),
            stop: Arc::new(AtomicBool::new(false)),
            workers: Vec::new(),
            sample_byte_sizes: HashMap::new(),
        });
        inner.state = ProbeState::Owned;
        Ok(())
    }

    fn enter_allocated(&self, inner: &mut Inner) -> Result<(), ProbeError> {
        let snapshot = inner
            .session
            .as_ref()
            .map(|s| s.snapshot.clone())
            .unwrap_or_default();
        let config = self.driver_configuration(&snapshot);
        self.backend.set_config(&config)?;
        self.backend.set_state(ProbeState::Allocated)?;
        inner.state = ProbeState::Allocated;
        Ok(())
    }

    /// Best-effort return to Idle after a failed allocation. The driver is
    /// still Owned at this point, one legal edge away from Idle.
    fn roll_back_to_idle(&self, inner: &mut Inner) {
        if let Err(e) = self.backend.set_state(ProbeState::Idle) {
            warn!("Rollback to Idle failed, driver state now unknown: {e}");
        }
        inner.state = ProbeState::Idle;
        inner.session = None;
    }

    fn enter_active(&self, inner: &mut Inner) -> Result<(), ProbeError> {
        self.start_streaming(inner)?;
        if let Err(e) = self.backend.set_state(ProbeState::Active) {
            self.stop_streaming(inner);
            return Err(e.into());
        }
        inner.state = ProbeState::Active;
        info!("Probe service active");
        Ok(())
    }

    fn leave_active(&self, inner: &mut Inner) -> Result<(), ProbeError> {
        self.stop_streaming(inner);
        self.backend.set_state(ProbeState::Allocated)?;
        inner.state = ProbeState::Allocated;
        Ok(())
    }

    fn driver_configuration(&self, snapshot: &[EndpointConfig]) -> ProbePointConfiguration {
        ProbePointConfiguration {
            extraction_event_id: self.events.extraction.wire_id(),
            connections: snapshot
                .iter()
                .enumerate()
                .map(|(index, endpoint)| ProbePointConnection {
                    enabled: endpoint.enabled,
                    point: endpoint.point,
                    purpose: endpoint.purpose,
                    injection_event_id: self.events.injection[index].wire_id(),
                })
                .collect(),
        }
    }

    /// Build the session runtime: routes, ring views, sample sizes, queues
    /// and worker threads. Fully unwound on any failure.
    fn start_streaming(&self, inner: &mut Inner) -> Result<(), ProbeError> {
        let snapshot = inner
            .session
            .as_ref()
            .map(|s| s.snapshot.clone())
            .unwrap_or_default();

        // Extraction subset: uniqueness check and routing table.
        let mut routes: ProbePointMap = HashMap::new();
        let mut extraction_ids = Vec::new();
        for (index, endpoint) in snapshot.iter().enumerate() {
            if endpoint.enabled && endpoint.purpose.extracts() {
                let raw = endpoint.point.to_raw();
                if routes.contains_key(&raw) {
                    return Err(ProbeError::InvalidConfig(format!(
                        "two active extraction probes share probe point {}",
                        endpoint.point
                    )));
                }
                routes.insert(
                    raw,
                    (
                        ProbeId(index as u32),
                        Arc::clone(&self.extraction_queues[index]),
                    ),
                );
                extraction_ids.push(index);
            }
        }
        let injection_ids: Vec<usize> = snapshot
            .iter()
            .enumerate()
            .filter(|(_, e)| e.enabled && e.purpose.injects())
            .map(|(index, _)| index)
            .collect();

        let rings = self.backend.get_ring_buffers()?;

        // Injection sample byte sizes from the input pin 0 format.
        let mut sample_byte_sizes = HashMap::new();
        for &index in &injection_ids {
            let point = snapshot[index].point;
            let size = self.resolve_sample_byte_size(index as u32, point)?;
            sample_byte_sizes.insert(index as u32, size);
        }

        let stop = Arc::new(AtomicBool::new(false));
        let mut workers: Vec<JoinHandle<()>> = Vec::new();

        let result = (|| -> Result<(), ProbeError> {
            if !extraction_ids.is_empty() {
                for &index in &extraction_ids {
                    self.extraction_queues[index].open();
                }
                let (base, size) = self.backend.resolve_ring(&rings.extraction)?;
                let backend = Arc::clone(&self.backend);
                let reader = RingBufferReader::new(
                    base,
                    size,
                    Box::new(move || backend.extraction_position().map_err(Into::into)),
                );
                workers.push(
                    extractor::spawn(
                        reader,
                        Arc::clone(&self.events.extraction),
                        Arc::clone(&stop),
                        routes,
                        Arc::clone(&self.dropped_packets),
                    )
                    .map_err(|e| ProbeError::WorkerSpawn(e.to_string()))?,
                );
            }

            for &index in &injection_ids {
                self.injection_queues[index].open();
                let (base, size) = self.backend.resolve_ring(&rings.injection[index])?;
                let backend = Arc::clone(&self.backend);
                let probe_index = index as u32;
                let writer = RingBufferWriter::new(
                    base,
                    size,
                    Box::new(move || backend.injection_position(probe_index).map_err(Into::into)),
                );
                workers.push(
                    injector::spawn(
                        ProbeId(probe_index),
                        writer,
                        Arc::clone(&self.events.injection[index]),
                        Arc::clone(&stop),
                        Arc::clone(&self.injection_queues[index]),
                        sample_byte_sizes[&probe_index],
                    )
                    .map_err(|e| ProbeError::WorkerSpawn(e.to_string()))?,
                );
            }
            Ok(())
        })();

        if let Err(original) = result {
            // Unwind whatever was started before the failure.
            stop.store(true, Ordering::Release);
            self.signal_all_events();
            self.close_all_queues();
            for handle in workers {
                let _ = handle.join();
            }
            return Err(original);
        }

        if let Some(session) = inner.session.as_mut() {
            session.stop = stop;
            session.workers = workers;
            session.sample_byte_sizes = sample_byte_sizes;
        }
        Ok(())
    }

    fn resolve_sample_byte_size(
        &self,
        probe_index: u32,
        point: ProbePointId,
    ) -> Result<usize, ProbeError> {
        let props = self
            .modules
            .get_module_instance_props(point.module_id, point.instance_id as u16)?;
        let pin = props
            .input_pins
            .first()
            .ok_or_else(|| ProbeError::SampleSize {
                id: probe_index,
                reason: "module instance reports no input pin".into(),
            })?;
        let valid_bit_depth = pin.format.valid_bit_depth as usize;
        if valid_bit_depth == 0 || valid_bit_depth % 8 != 0 {
            return Err(ProbeError::SampleSize {
                id: probe_index,
                reason: format!("valid bit depth {valid_bit_depth} is not a whole byte count"),
            });
        }
        let size = (valid_bit_depth / 8) * pin.format.number_of_channels as usize;
        if size == 0 {
            return Err(ProbeError::SampleSize {
                id: probe_index,
                reason: "module instance reports zero channels".into(),
            });
        }
        Ok(size)
    }

    /// Tear the streaming session down: stop flag, wake every worker,
    /// close the queues (unblocking workers and HTTP handlers), join.
    fn stop_streaming(&self, inner: &mut Inner) {
        let Some(session) = inner.session.as_mut() else {
            return;
        };
        session.stop.store(true, Ordering::Release);
        self.signal_all_events();
        self.close_all_queues();
        for handle in session.workers.drain(..) {
            let _ = handle.join();
        }
        session.sample_byte_sizes.clear();
    }

    fn signal_all_events(&self) {
        self.events.extraction.signal();
        for event in &self.events.injection {
            event.signal();
        }
    }

    fn close_all_queues(&self) {
        for queue in &self.extraction_queues {
            queue.close();
        }
        for queue in &self.injection_queues {
            queue.close();
        }
    }

    /// Exclusive extraction stream of one endpoint.
    pub fn acquire_extract_stream(&self, id: ProbeId) -> Result<ExtractionStream, ProbeError> {
        self.check_probe_id(id)?;
        let guard = self.extraction_leases[id.index()]
            .try_acquire()
            .ok_or(ProbeError::Busy {
                id: id.value(),
                direction: "extraction",
            })?;
        Ok(ExtractionStream::new(
            guard,
            Arc::clone(&self.extraction_queues[id.index()]),
        ))
    }

    /// Exclusive injection stream of one endpoint.
    pub fn acquire_inject_stream(&self, id: ProbeId) -> Result<InjectionStream, ProbeError> {
        self.check_probe_id(id)?;
        let guard = self.injection_leases[id.index()]
            .try_acquire()
            .ok_or(ProbeError::Busy {
                id: id.value(),
                direction: "injection",
            })?;
        Ok(InjectionStream::new(
            guard,
            Arc::clone(&self.injection_queues[id.index()]),
        ))
    }
}

fn step_up(state: ProbeState) -> ProbeState {
    match state {
        ProbeState::Idle => ProbeState::Owned,
        ProbeState::Owned => ProbeState::Allocated,
        ProbeState::Allocated | ProbeState::Active => ProbeState::Active,
    }
}

fn step_down(state: ProbeState) -> ProbeState {
    match state {
        ProbeState::Active => ProbeState::Allocated,
        ProbeState::Allocated => ProbeState::Owned,
        ProbeState::Owned | ProbeState::Idle => ProbeState::Idle,
    }
}
