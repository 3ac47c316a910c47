//! Event handles the driver signals to wake the streaming workers.
//!
//! Each handle is an auto-reset latch: `signal` marks it pending and wakes
//! one waiter, `wait` blocks until pending and consumes the mark. Multiple
//! signals before a wait coalesce, which is correct here because a wake only
//! means "look at the ring positions again".
//!
//! Handles carry an opaque wire id. The id is what travels inside the probe
//! point configuration so the driver knows which handle belongs to which
//! slot; on Linux the event pump translates the driver's event mask back to
//! these handles.

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_WIRE_ID: AtomicU64 = AtomicU64::new(1);

pub struct ProbeEvent {
    wire_id: u64,
    pending: Mutex<bool>,
    cond: Condvar,
}

impl ProbeEvent {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            wire_id: NEXT_WIRE_ID.fetch_add(1, Ordering::Relaxed),
            pending: Mutex::new(false),
            cond: Condvar::new(),
        })
    }

    pub fn wire_id(&self) -> u64 {
        self.wire_id
    }

    /// Mark the event pending and wake one waiter.
    pub fn signal(&self) {
        let mut pending = self.pending.lock();
        *pending = true;
        self.cond.notify_one();
    }

    /// Block until the event is pending, then consume it.
    pub fn wait(&self) {
        let mut pending = self.pending.lock();
        while !*pending {
            self.cond.wait(&mut pending);
        }
        *pending = false;
    }
}

/// The N+1 handles of one probe session: one for extraction, one per
/// injection-capable slot.
pub struct EventHandles {
    pub extraction: Arc<ProbeEvent>,
    pub injection: Vec<Arc<ProbeEvent>>,
}

impl EventHandles {
    pub fn create(probe_count: usize) -> Self {
        Self {
            extraction: ProbeEvent::new(),
            injection: (0..probe_count).map(|_| ProbeEvent::new()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn wire_ids_are_unique() {
        let handles = EventHandles::create(8);
        let mut ids: Vec<u64> = handles.injection.iter().map(|e| e.wire_id()).collect();
        ids.push(handles.extraction.wire_id());
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 9);
    }

    #[test]
    fn signal_wakes_waiter_and_resets() {
        let event = EventHandles::create(0).extraction;
        let waiter = {
            let event = Arc::clone(&event);
            thread::spawn(move || event.wait())
        };
        thread::sleep(Duration::from_millis(20));
        event.signal();
        waiter.join().unwrap();

        // Consumed: a second wait must block again until signalled.
        let waiter = {
            let event = Arc::clone(&event);
            thread::spawn(move || event.wait())
        };
        thread::sleep(Duration::from_millis(20));
        assert!(!waiter.is_finished());
        event.signal();
        waiter.join().unwrap();
    }

    #[test]
    fn signals_coalesce() {
        let event = EventHandles::create(0).extraction;
        event.signal();
        event.signal();
        event.wait();
        // Second wait would block: the two signals collapsed into one.
        let waiter = {
            let event = Arc::clone(&event);
            thread::spawn(move || event.wait())
        };
        thread::sleep(Duration::from_millis(20));
        assert!(!waiter.is_finished());
        event.signal();
        waiter.join().unwrap();
    }
}
