//! Concrete Linux device: a character device driven through `ioctl(2)` plus
//! an mmap of the driver's ring-buffer region.
//!
//! Exchange convention: every io control passes a fixed 16-byte descriptor
//! `{ptr, len}` pointing at the `[header][body]` buffer, which the driver
//! overwrites in place with its reply.
//!
//! Event delivery: the driver completes a blocking `WAIT_EVENTS` ioctl with
//! a bit mask of fired probe events (bit 0 extraction, bit 1+i injection
//! probe i); the wait also completes with an empty mask on the driver's
//! internal timeout so the pump can observe shutdown. A dedicated pump
//! thread turns the mask into [`ProbeEvent`] signals. The pump issues its
//! wait on a duplicated descriptor and outside the io lock, so command
//! traffic keeps flowing while a wait is parked in the kernel.

use crate::communications::{Device, EventHandles, RingMemory};
use log::{debug, error, info, warn};
use memmap2::{MmapMut, MmapOptions};
use parking_lot::Mutex;
use shared::constants::IOCTL_ADSP_WAIT_EVENTS;
use shared::errors::DriverError;
use shared::wire::{ByteReader, ByteWriter};
use std::fs::{File, OpenOptions};
use std::os::fd::AsRawFd;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

/// Fixed exchange descriptor passed to every ioctl.
#[repr(C)]
struct IoctlXfer {
    ptr: u64,
    len: u64,
}

pub struct LinuxDevice {
    file: File,
    io_lock: Mutex<()>,
    /// Keeps the ring mapping alive; `ring_base` points into it.
    _map: MmapMut,
    ring_base: *mut u8,
    ring_len: usize,
    pump_stop: Arc<AtomicBool>,
}

unsafe impl Send for LinuxDevice {}
unsafe impl Sync for LinuxDevice {}

impl LinuxDevice {
    /// Open the device, map its ring-buffer region and start the event pump.
    ///
    /// # Errors
    /// Returns [`DriverError::Os`] if the device cannot be opened, mapped,
    /// or the pump thread cannot be spawned.
    pub fn open(
        path: &Path,
        ring_mmap_bytes: usize,
        events: Arc<EventHandles>,
    ) -> Result<Arc<Self>, DriverError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|source| DriverError::Os { source })?;

        let map = unsafe {
            MmapOptions::new()
                .len(ring_mmap_bytes)
                .map_mut(&file)
                .map_err(|source| DriverError::Os { source })?
        };
        let ring_base = map.as_ptr() as *mut u8;
        info!("Device opened: {} (ring mapping {} bytes)", path.display(), ring_mmap_bytes);

        let pump_stop = Arc::new(AtomicBool::new(false));
        let pump_file = file
            .try_clone()
            .map_err(|source| DriverError::Os { source })?;
        spawn_event_pump(pump_file, events, Arc::clone(&pump_stop))?;

        Ok(Arc::new(Self {
            file,
            io_lock: Mutex::new(()),
            _map: map,
            ring_base,
            ring_len: ring_mmap_bytes,
            pump_stop,
        }))
    }
}

impl Drop for LinuxDevice {
    fn drop(&mut self) {
        // The pump notices on its next wait completion and exits.
        self.pump_stop.store(true, Ordering::Release);
        debug!("Device closing, event pump asked to stop");
    }
}

impl Device for LinuxDevice {
    fn io_control(&self, code: u32, buffer: &mut Vec<u8>) -> Result<(), DriverError> {
        let _serialized = self.io_lock.lock();
        raw_ioctl(&self.file, code, buffer)
    }

    fn ring_memory(&self) -> RingMemory {
        RingMemory {
            base: self.ring_base,
            len: self.ring_len,
        }
    }
}

fn raw_ioctl(file: &File, code: u32, buffer: &mut Vec<u8>) -> Result<(), DriverError> {
    let mut xfer = IoctlXfer {
        ptr: buffer.as_mut_ptr() as u64,
        len: buffer.len() as u64,
    };
    // SAFETY: `xfer` points at a live buffer for the duration of the call;
    // the driver writes at most `len` bytes back. The request type differs
    // between libc flavors, hence the inferred cast.
    let ret = unsafe { libc::ioctl(file.as_raw_fd(), code as _, &mut xfer) };
    if ret < 0 {
        return Err(DriverError::Os {
            source: std::io::Error::last_os_error(),
        });
    }
    Ok(())
}

fn spawn_event_pump(
    file: File,
    events: Arc<EventHandles>,
    stop: Arc<AtomicBool>,
) -> Result<(), DriverError> {
    thread::Builder::new()
        .name("probe-event-pump".into())
        .spawn(move || pump_loop(file, events, stop))
        .map(|_handle| ())
        .map_err(|source| DriverError::Os { source })
}

fn pump_loop(file: File, events: Arc<EventHandles>, stop: Arc<AtomicBool>) {
    loop {
        if stop.load(Ordering::Acquire) {
            debug!("Event pump stopping");
            return;
        }

        // [header(status=0, size=8)][mask placeholder]
        let mut w = ByteWriter::new();
        w.put_i32(0);
        w.put_u32(8);
        w.put_u64(0);
        let mut buffer = w.into_bytes();

        if let Err(e) = raw_ioctl(&file, IOCTL_ADSP_WAIT_EVENTS, &mut buffer) {
            if !stop.load(Ordering::Acquire) {
                error!("Event wait failed, pump exiting: {e}");
            }
            return;
        }

        let mask = match parse_wait_reply(&buffer) {
            Ok(mask) => mask,
            Err(e) => {
                warn!("Malformed event wait reply: {e}");
                continue;
            }
        };

        if mask & 1 != 0 {
            events.extraction.signal();
        }
        for (index, event) in events.injection.iter().enumerate() {
            if mask & (1u64 << (index + 1)) != 0 {
                event.signal();
            }
        }
    }
}

fn parse_wait_reply(buffer: &[u8]) -> Result<u64, DriverError> {
    let mut r = ByteReader::new(buffer);
    let status = r.i32().map_err(|e| DriverError::Reply(e.to_string()))?;
    if status != 0 {
        return Err(DriverError::Status(status));
    }
    let _size = r.u32().map_err(|e| DriverError::Reply(e.to_string()))?;
    r.u64().map_err(|e| DriverError::Reply(e.to_string()))
}
