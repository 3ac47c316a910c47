use thiserror::Error;

/// Errors raised at the driver boundary, before any firmware semantics.
///
/// Failures are classified by layer: `Os` is the ioctl syscall failing,
/// `Status` is the driver completing the call with a non-success status.
/// The firmware-level IXC status lives one level up, in
/// [`super::ModuleHandlerError`].
#[derive(Debug, Error)]
pub enum DriverError {
    /// The OS refused or aborted the io control call
    #[error("OS says that io control has failed: {source}")]
    Os {
        #[source]
        source: std::io::Error,
    },

    /// The call went through but the driver reported a non-success status
    #[error("Driver returns invalid status: {0}")]
    Status(i32),

    /// The reply buffer does not match the wire contract
    #[error("Malformed driver reply: {0}")]
    Reply(String),

    /// A ring buffer descriptor points outside the shared mapping
    #[error("Ring descriptor out of bounds: offset {offset}, size {size}, mapping {mapping}")]
    RingBounds {
        offset: u64,
        size: u64,
        mapping: usize,
    },

    /// A mocked device expectation was violated (test-only path)
    #[error("Mocked device: {0}")]
    Mock(String),
}
