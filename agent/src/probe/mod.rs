//! The probe subsystem: extraction and injection of audio bytes at chosen
//! points of the running firmware graph.
//!
//! Data plane: the driver fills the extraction ring buffer and signals an
//! event; the extraction worker drains it, deframes packets and routes each
//! payload to its endpoint queue, where an HTTP handler streams it out.
//! Injection runs the other way: handlers push client bytes into per-probe
//! queues, and one worker per enabled injection endpoint paces whole
//! samples into the driver's ring, padding with silence on underflow.
//!
//! Control plane: [`service::ProbeService`] owns the endpoint
//! configuration, the Idle/Owned/Allocated/Active state machine, the
//! queues and the worker threads. Workers receive typed handles at spawn
//! and never reach back into the service; shutdown is a shared atomic flag
//! plus a signal on the events the workers wait on.

pub mod backend;
pub mod extractor;
pub mod injector;
pub mod packet;
pub mod queue;
pub mod resource;
pub mod ring_buffer;
pub mod service;

/// Index of a probe endpoint slot, `0 <= id < max_probe_count`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProbeId(pub u32);

impl ProbeId {
    pub fn value(self) -> u32 {
        self.0
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for ProbeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
