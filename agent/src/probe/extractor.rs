//! Extraction worker: one thread per active session.
//!
//! Loop: wait for the driver's extraction event (or the shutdown signal),
//! drain the ring, deframe, route each packet's payload to its endpoint
//! queue by probe point id. Packets whose probe point is not in the session
//! map are dropped and counted. Enqueueing blocks when a queue is full:
//! extraction deliberately backpressures the driver by not draining
//! further.
//!
//! Any ring or framing fault closes every routed queue and ends the
//! thread; downstream readers observe EOF after the buffered data.

use crate::communications::ProbeEvent;
use crate::probe::packet::PacketDecoder;
use crate::probe::queue::BlockingQueue;
use crate::probe::ring_buffer::RingBufferReader;
use crate::probe::ProbeId;
use log::{debug, error, info};
use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Routing table of one session: raw probe point id to endpoint queue.
pub type ProbePointMap = HashMap<u32, (ProbeId, Arc<BlockingQueue>)>;

pub fn spawn(
    ring: RingBufferReader,
    event: Arc<ProbeEvent>,
    stop: Arc<AtomicBool>,
    routes: ProbePointMap,
    dropped_packets: Arc<AtomicU64>,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("probe-extract".into())
        .spawn(move || run(ring, event, stop, routes, dropped_packets))
}

fn run(
    mut ring: RingBufferReader,
    event: Arc<ProbeEvent>,
    stop: Arc<AtomicBool>,
    routes: ProbePointMap,
    dropped_packets: Arc<AtomicU64>,
) {
    let mut decoder = PacketDecoder::new();
    let mut local = Vec::with_capacity(ring.size());

    loop {
        if !stop.load(Ordering::Acquire) {
            event.wait();
        }

        local.clear();
        let read = match ring.read_available(&mut local) {
            Ok(read) => read,
            Err(e) => {
                error!("Extraction ring fault: {e}");
                close_all(&routes);
                return;
            }
        };

        if read == 0 {
            if stop.load(Ordering::Acquire) {
                if decoder.pending() > 0 {
                    debug!(
                        "Extraction stopping with {} unframed bytes pending",
                        decoder.pending()
                    );
                }
                close_all(&routes);
                info!("Extraction worker drained and finished");
                return;
            }
            continue; // same producer position observed twice
        }

        let result = decoder.feed(&local, |packet| {
            match routes.get(&packet.point_raw) {
                Some((probe_id, queue)) => {
                    // Blocks while the queue is full; returns false only
                    // when the session is already tearing down.
                    if !queue.write(packet.payload) {
                        debug!("Extraction queue of probe {probe_id} closed, payload dropped");
                    }
                }
                None => {
                    dropped_packets.fetch_add(1, Ordering::Relaxed);
                }
            }
        });
        if let Err(e) = result {
            error!("Extraction framing fault: {e}");
            close_all(&routes);
            return;
        }
    }
}

fn close_all(routes: &ProbePointMap) {
    for (_, queue) in routes.values() {
        queue.close();
    }
}
