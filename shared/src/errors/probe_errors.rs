use super::{DriverError, ModuleHandlerError};
use crate::wire::probe::ProbeState;
use thiserror::Error;

/// All errors that can occur in the probe subsystem.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// Caller named a probe endpoint slot outside `0..max`
    #[error("Invalid probe index: {id} (max {max})")]
    InvalidProbeId { id: u32, max: u32 },

    /// The operation is not legal in the current service state
    #[error("Operation `{operation}` requires state {required:?}, service is {actual:?}")]
    WrongState {
        operation: &'static str,
        required: ProbeState,
        actual: ProbeState,
    },

    /// The state machine refused a non-adjacent edge
    #[error("Illegal state transition: {from:?} -> {to:?}")]
    IllegalTransition { from: ProbeState, to: ProbeState },

    /// The driver reports a state that disagrees with the cached one
    #[error("Inconsistent probe service state: cached {cached:?}, driver reports {driver:?}")]
    Inconsistent {
        cached: ProbeState,
        driver: ProbeState,
    },

    /// The cached endpoint configuration cannot start a session
    #[error("Invalid probe configuration: {0}")]
    InvalidConfig(String),

    /// An injection endpoint's sample byte size cannot be computed
    #[error("Invalid sample byte size for probe {id}: {reason}")]
    SampleSize { id: u32, reason: String },

    /// Another client already holds this endpoint's stream
    #[error("Probe {id} {direction} stream is already held by another client")]
    Busy { id: u32, direction: &'static str },

    /// The shared ring buffer violated its invariants; fatal for the session
    #[error("Ring buffer fault: {0}")]
    RingFault(String),

    /// The extraction byte stream does not frame into packets
    #[error("Packet framing fault: {0}")]
    Framing(String),

    /// A streaming worker thread could not be started
    #[error("Failed to spawn worker thread: {0}")]
    WorkerSpawn(String),

    /// Driver boundary failure
    #[error(transparent)]
    Driver(#[from] DriverError),

    /// Module RPC failure while resolving sample byte sizes
    #[error(transparent)]
    Module(#[from] ModuleHandlerError),
}
