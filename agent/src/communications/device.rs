//! The capability set the probe core requires from a driver.
//!
//! One synchronous buffered exchange plus access to the shared ring-buffer
//! mapping. Everything typed (probe state, configurations, module
//! parameters) is built on top of `io_control` by the probe backend and the
//! module handler, which keeps the whole driver conversation expressible as
//! byte-exact expectations in tests.

use shared::errors::DriverError;

/// Base and length of the memory region the ring-buffer descriptors index
/// into. For the Linux device this is an mmap of the character device; the
/// mocked device backs it with an owned allocation.
#[derive(Debug, Clone, Copy)]
pub struct RingMemory {
    pub base: *mut u8,
    pub len: usize,
}

// The region is shared with the kernel by construction; the pointers stay
// valid for the lifetime of the owning device.
unsafe impl Send for RingMemory {}
unsafe impl Sync for RingMemory {}

pub trait Device: Send + Sync {
    /// Perform one io control exchange.
    ///
    /// `buffer` carries the serialized request on entry and is replaced by
    /// the driver's reply on success (the buffered-call convention: one
    /// buffer, overwritten in place).
    ///
    /// # Errors
    /// [`DriverError::Os`] when the syscall itself fails. Driver-level and
    /// firmware-level statuses travel inside the reply buffer and are
    /// classified by the typed layers.
    fn io_control(&self, code: u32, buffer: &mut Vec<u8>) -> Result<(), DriverError>;

    /// The shared mapping that ring-buffer descriptors point into.
    fn ring_memory(&self) -> RingMemory;
}
