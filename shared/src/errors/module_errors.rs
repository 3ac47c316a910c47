use super::DriverError;
use thiserror::Error;

/// Errors of the typed module RPC layer.
#[derive(Debug, Error)]
pub enum ModuleHandlerError {
    /// OS-level or driver-level failure underneath the RPC
    #[error(transparent)]
    Driver(#[from] DriverError),

    /// The driver call succeeded but the firmware refused the request
    #[error("Firmware returns invalid status: {0}")]
    Firmware(u32),

    /// The firmware reply payload does not parse as the expected structure
    #[error("Malformed firmware reply for parameter {param_id:#x}: {reason}")]
    Reply { param_id: u32, reason: String },
}
