//! Bounds-checked access to the shared-memory ring buffers.
//!
//! The opposite end of each ring is owned by the driver, which publishes a
//! 64-bit monotonically increasing linear position (modulo the ring size
//! gives the in-buffer offset). The reader owns the consumer position of
//! the extraction ring; the writer owns the producer position of an
//! injection ring.
//!
//! Invariants at steady state: `producer >= consumer` and
//! `producer - consumer <= size`. A violation means the driver lost
//! pacing; it is surfaced as a fault and ends the streaming session.
//!
//! The position query happens-before the byte copies of the same iteration
//! (acquire fence after reading the opposite position, release fence after
//! publishing bytes).

use shared::errors::ProbeError;
use std::sync::atomic::{fence, Ordering};

/// Queries the driver for the opposite side's linear position.
pub type PositionFn = Box<dyn FnMut() -> Result<u64, ProbeError> + Send>;

/// Read side of the extraction ring buffer.
pub struct RingBufferReader {
    base: *const u8,
    size: usize,
    producer_position: PositionFn,
    consumer_position: u64,
}

// The mapping outlives the session that owns the reader.
unsafe impl Send for RingBufferReader {}

impl RingBufferReader {
    /// `base` must point at `size` bytes of the shared extraction region.
    pub fn new(base: *const u8, size: usize, producer_position: PositionFn) -> Self {
        Self {
            base,
            size,
            producer_position,
            consumer_position: 0,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Query the producer position once and append every available byte to
    /// `out`, handling wrap-around with at most two copies.
    ///
    /// Returns the number of bytes appended; zero when the producer has not
    /// advanced (the same position may legally be observed twice).
    ///
    /// # Errors
    /// [`ProbeError::RingFault`] when the producer position went backwards
    /// or ran more than `size` bytes ahead of the consumer.
    pub fn read_available(&mut self, out: &mut Vec<u8>) -> Result<usize, ProbeError> {
        let producer = (self.producer_position)()?;
        if producer < self.consumer_position {
            return Err(ProbeError::RingFault(format!(
                "producer position went backwards: {producer} < {}",
                self.consumer_position
            )));
        }

        let available = producer - self.consumer_position;
        if available == 0 {
            return Ok(0);
        }
        if available > self.size as u64 {
            return Err(ProbeError::RingFault(format!(
                "producer has written over the consumer position ({available} > {} available)",
                self.size
            )));
        }
        let available = available as usize;

        // The position read above must happen before the byte reads below.
        fence(Ordering::Acquire);

        let offset = (self.consumer_position % self.size as u64) as usize;
        let first = available.min(self.size - offset);
        out.reserve(available);
        unsafe {
            copy_into(out, self.base.add(offset), first);
            copy_into(out, self.base, available - first);
        }

        self.consumer_position += available as u64;
        Ok(available)
    }
}

/// Write side of one injection ring buffer.
pub struct RingBufferWriter {
    base: *mut u8,
    size: usize,
    consumer_position: PositionFn,
    consumer_cache: u64,
    producer_position: u64,
}

unsafe impl Send for RingBufferWriter {}

impl RingBufferWriter {
    /// `base` must point at `size` bytes of the shared injection region.
    pub fn new(base: *mut u8, size: usize, consumer_position: PositionFn) -> Self {
        Self {
            base,
            size,
            consumer_position,
            consumer_cache: 0,
            producer_position: 0,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Query the driver's consumer position once and return the free byte
    /// count. The position is cached for the next [`write`](Self::write).
    ///
    /// # Errors
    /// [`ProbeError::RingFault`] when the consumer position went backwards,
    /// overtook the producer, or lags more than `size` bytes behind.
    pub fn available(&mut self) -> Result<usize, ProbeError> {
        let consumer = (self.consumer_position)()?;
        if consumer < self.consumer_cache {
            return Err(ProbeError::RingFault(format!(
                "consumer position went backwards: {consumer} < {}",
                self.consumer_cache
            )));
        }
        if consumer > self.producer_position {
            return Err(ProbeError::RingFault(format!(
                "consumer position {consumer} ahead of producer {}",
                self.producer_position
            )));
        }
        let used = self.producer_position - consumer;
        if used > self.size as u64 {
            return Err(ProbeError::RingFault(format!(
                "producer ran {used} bytes ahead of consumer ({} ring)",
                self.size
            )));
        }
        self.consumer_cache = consumer;
        Ok(self.size - used as usize)
    }

    /// Write `bytes` at the producer position, wrapping at the end of the
    /// ring, never past `consumer + size`. Bytes beyond the free window are
    /// dropped here; the caller has already sized its block. Returns the
    /// count actually written.
    pub fn write(&mut self, bytes: &[u8]) -> usize {
        let free = self.size - (self.producer_position - self.consumer_cache) as usize;
        let count = bytes.len().min(free);
        if count == 0 {
            return 0;
        }

        let offset = (self.producer_position % self.size as u64) as usize;
        let first = count.min(self.size - offset);
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), self.base.add(offset), first);
            std::ptr::copy_nonoverlapping(bytes[first..].as_ptr(), self.base, count - first);
        }

        // Publish the bytes before any later position read observes them.
        fence(Ordering::Release);
        self.producer_position += count as u64;
        count
    }
}

unsafe fn copy_into(out: &mut Vec<u8>, src: *const u8, count: usize) {
    if count == 0 {
        return;
    }
    let old_len = out.len();
    // SAFETY: reserve() above guarantees capacity; src points at `count`
    // readable bytes of the shared region.
    unsafe {
        std::ptr::copy_nonoverlapping(src, out.as_mut_ptr().add(old_len), count);
        out.set_len(old_len + count);
    }
}
