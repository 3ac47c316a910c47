//! Injection worker: one thread per enabled injection endpoint.
//!
//! On start the worker fills the ring with one buffer's worth of silence so
//! the driver never consumes uninitialized memory before the first client
//! byte. Afterwards each driver event (the driver consumed some bytes)
//! triggers one iteration: compute the free window from the driver's
//! consumer position, round it down to whole samples, pull that many bytes
//! from the client queue without blocking and pad the remainder with
//! silence. The driver must only ever see whole samples; a client that
//! pauses and resumes therefore never splits a sample.

use crate::communications::ProbeEvent;
use crate::probe::queue::ByteQueue;
use crate::probe::ring_buffer::RingBufferWriter;
use crate::probe::ProbeId;
use log::{error, info};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

pub fn spawn(
    probe_id: ProbeId,
    ring: RingBufferWriter,
    event: Arc<ProbeEvent>,
    stop: Arc<AtomicBool>,
    queue: Arc<ByteQueue>,
    sample_byte_size: usize,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("probe-inject-{probe_id}"))
        .spawn(move || run(probe_id, ring, event, stop, queue, sample_byte_size))
}

fn run(
    probe_id: ProbeId,
    mut ring: RingBufferWriter,
    event: Arc<ProbeEvent>,
    stop: Arc<AtomicBool>,
    queue: Arc<ByteQueue>,
    sample_byte_size: usize,
) {
    // Prefill with silence: as many whole samples as the ring holds. The
    // ring is fresh at this point (consumer position 0 by contract), so no
    // driver query is needed before the first event.
    let whole_samples = (ring.size() / sample_byte_size) * sample_byte_size;
    ring.write(&vec![0u8; whole_samples]);

    loop {
        if stop.load(Ordering::Acquire) {
            break;
        }
        event.wait();
        if stop.load(Ordering::Acquire) {
            break;
        }

        let free = match ring.available() {
            Ok(free) => free,
            Err(e) => {
                error!("Injection ring fault on probe {probe_id}: {e}");
                break;
            }
        };
        let writable = free - free % sample_byte_size;
        if writable == 0 {
            continue;
        }

        let (mut block, closed) = queue.take_up_to(writable);
        if block.is_empty() && closed {
            break;
        }
        // Pad the partial tail with silence so exactly `writable` whole
        // samples land in the ring.
        block.resize(writable, 0);
        ring.write(&block);
    }

    queue.close();
    info!("Injection worker of probe {probe_id} finished");
}
