//! Blocking bounded hand-off queues between the streaming workers and the
//! HTTP handlers.
//!
//! Two shapes: [`BlockingQueue`] holds whole byte buffers (extraction, one
//! entry per framed payload, bounded by total payload bytes) and
//! [`ByteQueue`] holds a byte FIFO with arbitrary chunking (injection,
//! bounded by bytes).
//!
//! Lifecycle: a queue starts closed. `open` empties and opens it, `close`
//! closes it and wakes every blocked reader and writer; close is
//! idempotent and reopening is allowed. Reads keep draining buffered data
//! after close; the sentinel (`None` / empty-and-closed) only appears once
//! the queue is empty.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;

struct ChunkShared {
    chunks: VecDeque<Vec<u8>>,
    bytes: usize,
    open: bool,
}

/// Bounded FIFO of whole buffers. One producer (the extraction worker),
/// one consumer (the HTTP handler of the endpoint).
pub struct BlockingQueue {
    max_bytes: usize,
    shared: Mutex<ChunkShared>,
    readable: Condvar,
    writable: Condvar,
}

impl BlockingQueue {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            max_bytes,
            shared: Mutex::new(ChunkShared {
                chunks: VecDeque::new(),
                bytes: 0,
                open: false,
            }),
            readable: Condvar::new(),
            writable: Condvar::new(),
        }
    }

    /// Empty the queue and accept traffic again.
    pub fn open(&self) {
        let mut shared = self.shared.lock();
        shared.chunks.clear();
        shared.bytes = 0;
        shared.open = true;
    }

    pub fn close(&self) {
        let mut shared = self.shared.lock();
        shared.open = false;
        self.readable.notify_all();
        self.writable.notify_all();
    }

    pub fn is_open(&self) -> bool {
        self.shared.lock().open
    }

    /// Enqueue one buffer. Blocks while the queue is full and open; returns
    /// false if the queue is (or becomes) closed.
    ///
    /// A buffer larger than the whole budget is accepted alone into an
    /// empty queue, otherwise nothing could ever deliver it.
    pub fn write(&self, chunk: Vec<u8>) -> bool {
        let mut shared = self.shared.lock();
        loop {
            if !shared.open {
                return false;
            }
            if shared.bytes + chunk.len() <= self.max_bytes || shared.chunks.is_empty() {
                shared.bytes += chunk.len();
                shared.chunks.push_back(chunk);
                self.readable.notify_one();
                return true;
            }
            self.writable.wait(&mut shared);
        }
    }

    /// Dequeue the oldest buffer. Blocks while the queue is empty and open;
    /// returns `None` once the queue is empty and closed.
    pub fn read(&self) -> Option<Vec<u8>> {
        let mut shared = self.shared.lock();
        loop {
            if let Some(chunk) = shared.chunks.pop_front() {
                shared.bytes -= chunk.len();
                self.writable.notify_one();
                return Some(chunk);
            }
            if !shared.open {
                return None;
            }
            self.readable.wait(&mut shared);
        }
    }
}

struct ByteShared {
    bytes: VecDeque<u8>,
    open: bool,
}

/// Bounded byte FIFO. The HTTP handler pushes arbitrary chunks, the
/// injection worker pulls whatever fits the ring's free window.
pub struct ByteQueue {
    max_bytes: usize,
    shared: Mutex<ByteShared>,
    readable: Condvar,
    writable: Condvar,
}

impl ByteQueue {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            max_bytes,
            shared: Mutex::new(ByteShared {
                bytes: VecDeque::new(),
                open: false,
            }),
            readable: Condvar::new(),
            writable: Condvar::new(),
        }
    }

    pub fn open(&self) {
        let mut shared = self.shared.lock();
        shared.bytes.clear();
        shared.open = true;
    }

    pub fn close(&self) {
        let mut shared = self.shared.lock();
        shared.open = false;
        self.readable.notify_all();
        self.writable.notify_all();
    }

    pub fn is_open(&self) -> bool {
        self.shared.lock().open
    }

    /// Enqueue every byte of `data`, blocking while the queue is full and
    /// open. Returns false on a short write caused by a close.
    pub fn write(&self, data: &[u8]) -> bool {
        let mut remaining = data;
        let mut shared = self.shared.lock();
        loop {
            if !shared.open {
                return false;
            }
            let space = self.max_bytes - shared.bytes.len();
            let count = remaining.len().min(space);
            if count > 0 {
                shared.bytes.extend(remaining[..count].iter().copied());
                remaining = &remaining[count..];
                self.readable.notify_one();
            }
            if remaining.is_empty() {
                return true;
            }
            self.writable.wait(&mut shared);
        }
    }

    /// Dequeue up to `max` bytes without blocking. Returns the bytes (may
    /// be empty) and whether the queue is closed.
    pub fn take_up_to(&self, max: usize) -> (Vec<u8>, bool) {
        let mut shared = self.shared.lock();
        let count = shared.bytes.len().min(max);
        let out: Vec<u8> = shared.bytes.drain(..count).collect();
        if count > 0 {
            self.writable.notify_all();
        }
        (out, !shared.open)
    }

    /// Buffered byte count.
    pub fn len(&self) -> usize {
        self.shared.lock().bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn chunk_queue_is_fifo() {
        let queue = BlockingQueue::new(1024);
        queue.open();
        assert!(queue.write(vec![1]));
        assert!(queue.write(vec![2, 2]));
        assert_eq!(queue.read(), Some(vec![1]));
        assert_eq!(queue.read(), Some(vec![2, 2]));
    }

    #[test]
    fn chunk_queue_write_blocks_until_read() {
        let queue = Arc::new(BlockingQueue::new(4));
        queue.open();
        assert!(queue.write(vec![0; 3]));

        let writer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.write(vec![0; 3]))
        };
        thread::sleep(Duration::from_millis(20));
        assert!(!writer.is_finished());

        assert_eq!(queue.read(), Some(vec![0; 3]));
        assert!(writer.join().unwrap());
    }

    #[test]
    fn chunk_queue_close_unblocks_and_drains() {
        let queue = Arc::new(BlockingQueue::new(1024));
        queue.open();
        queue.write(vec![7]);

        let reader = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || (queue.read(), queue.read(), queue.read()))
        };
        thread::sleep(Duration::from_millis(20));
        queue.close();
        let (first, second, third) = reader.join().unwrap();
        // Buffered data survives the close; then the sentinel.
        assert_eq!(first, Some(vec![7]));
        assert_eq!(second, None);
        assert_eq!(third, None);

        // Closed queue refuses writes, reopening clears it.
        assert!(!queue.write(vec![9]));
        queue.open();
        assert!(queue.write(vec![9]));
        assert_eq!(queue.read(), Some(vec![9]));
    }

    #[test]
    fn chunk_queue_accepts_oversize_buffer_when_empty() {
        let queue = BlockingQueue::new(4);
        queue.open();
        assert!(queue.write(vec![0; 64]));
        assert_eq!(queue.read().unwrap().len(), 64);
    }

    #[test]
    fn byte_queue_chunking_is_arbitrary() {
        let queue = ByteQueue::new(1024);
        queue.open();
        assert!(queue.write(&[1, 2, 3]));
        assert!(queue.write(&[4, 5]));
        let (head, closed) = queue.take_up_to(4);
        assert_eq!(head, vec![1, 2, 3, 4]);
        assert!(!closed);
        let (tail, _) = queue.take_up_to(100);
        assert_eq!(tail, vec![5]);
        let (empty, _) = queue.take_up_to(100);
        assert!(empty.is_empty());
    }

    #[test]
    fn byte_queue_write_blocks_until_space() {
        let queue = Arc::new(ByteQueue::new(4));
        queue.open();
        let writer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.write(&[0; 6]))
        };
        thread::sleep(Duration::from_millis(20));
        assert!(!writer.is_finished());
        assert_eq!(queue.take_up_to(4).0.len(), 4);
        assert!(writer.join().unwrap());
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn byte_queue_close_causes_short_write() {
        let queue = Arc::new(ByteQueue::new(4));
        queue.open();
        let writer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.write(&[0; 8]))
        };
        thread::sleep(Duration::from_millis(20));
        queue.close();
        assert!(!writer.join().unwrap());
        // Whatever was buffered stays readable with the closed marker.
        let (data, closed) = queue.take_up_to(100);
        assert_eq!(data.len(), 4);
        assert!(closed);
    }
}
