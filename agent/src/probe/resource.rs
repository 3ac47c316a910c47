//! Exclusive stream leases: at most one holder of each probe endpoint's
//! extraction or injection stream.
//!
//! A lease is a compare-and-swap on an atomic flag with RAII release, so a
//! guard survives panics and can cross the HTTP layer's await points. The
//! guard's lifetime is exactly how long the client keeps the stream open.

use crate::probe::queue::{BlockingQueue, ByteQueue};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Default)]
pub struct StreamLease {
    held: AtomicBool,
}

impl StreamLease {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Take the lease, or `None` if another client holds it.
    pub fn try_acquire(self: &Arc<Self>) -> Option<LeaseGuard> {
        self.held
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| LeaseGuard {
                lease: Arc::clone(self),
            })
    }

    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }
}

pub struct LeaseGuard {
    lease: Arc<StreamLease>,
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        self.lease.held.store(false, Ordering::Release);
    }
}

/// Exclusive read handle over one endpoint's extraction queue.
pub struct ExtractionStream {
    _guard: LeaseGuard,
    queue: Arc<BlockingQueue>,
}

impl ExtractionStream {
    pub(crate) fn new(guard: LeaseGuard, queue: Arc<BlockingQueue>) -> Self {
        Self {
            _guard: guard,
            queue,
        }
    }

    /// Next framed payload; blocks while the queue is empty and open,
    /// `None` once the session closed the queue and it drained.
    pub fn read_chunk(&self) -> Option<Vec<u8>> {
        self.queue.read()
    }
}

/// Exclusive write handle over one endpoint's injection queue.
pub struct InjectionStream {
    _guard: LeaseGuard,
    queue: Arc<ByteQueue>,
}

impl InjectionStream {
    pub(crate) fn new(guard: LeaseGuard, queue: Arc<ByteQueue>) -> Self {
        Self {
            _guard: guard,
            queue,
        }
    }

    /// Enqueue client bytes; blocks while the queue is full. False means
    /// the session tore down mid-write (short write).
    pub fn write_bytes(&self, bytes: &[u8]) -> bool {
        self.queue.write(bytes)
    }
}
