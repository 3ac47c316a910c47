//! Constants of the driver contract: device paths, ioctl codes, parameter
//! ids and the fixed limits the firmware reports for the current hardware
//! generation.

/// Character device exposed by the audio DSP debug driver.
pub const DEFAULT_DEVICE_PATH: &str = "/dev/adsp-dbg";

/// Subsystem name used in REST instance paths (`/instance/adsp.probe/...`).
pub const SUBSYSTEM_NAME: &str = "adsp";

/// Number of probe endpoint slots the firmware exposes.
///
/// The firmware also reports this value through the `MAX_PROBE_COUNT`
/// FwConfig TLV; the constant is the contract value for the current
/// generation and sizes the fixed-layout driver structures.
pub const MAX_PROBE_COUNT: usize = 8;

/// Upper bound accepted for a single extraction packet payload. A length
/// field above this value means the stream is corrupt, since the firmware
/// fragments larger captures itself.
pub const MAX_PACKET_PAYLOAD: usize = 16 * 1024 * 1024;

/// Default byte budget of one per-probe extraction queue.
pub const DEFAULT_EXTRACTION_QUEUE_BYTES: usize = 4 * 1024 * 1024;

/// Default byte budget of one per-probe injection queue.
pub const DEFAULT_INJECTION_QUEUE_BYTES: usize = 4 * 1024 * 1024;

const IOC_NONE: u32 = 0;
const IOC_WRITE: u32 = 1;
const IOC_READ: u32 = 2;

/// Linux `_IOC(dir, type, nr, size)`
/// = (dir << 30) | (size << 16) | (type << 8) | nr
macro_rules! ioc {
    ($dir:expr, $ty:expr, $nr:expr, $size:expr) => {
        ($dir << 30) | ($size << 16) | ($ty << 8) | $nr
    };
}

/// ioctl `type` byte claimed by the debug driver.
pub const ADSP_IOC_MAGIC: u32 = b'A' as u32;

/// Every ioctl transfers the same fixed exchange descriptor; the actual
/// parameter buffer is reached through it (see `IoctlXfer` in the agent's
/// Linux device).
pub const IOCTL_XFER_SIZE: u32 = 16;

/// Small parameter read, buffered copy in and out.
///
/// The exchanged buffer is `[header][param body]`; the driver overwrites it
/// in place with the reply.
pub const IOCTL_ADSP_TINY_GET: u32 = ioc!(IOC_READ | IOC_WRITE, ADSP_IOC_MAGIC, 0x01, IOCTL_XFER_SIZE);

/// Small parameter write, buffered copy in.
pub const IOCTL_ADSP_TINY_SET: u32 = ioc!(IOC_WRITE, ADSP_IOC_MAGIC, 0x02, IOCTL_XFER_SIZE);

/// Large parameter read. Same buffer convention as TinyGet; the driver may
/// use shared pages internally for the payload but that is invisible here.
pub const IOCTL_ADSP_BIG_GET: u32 = ioc!(IOC_READ | IOC_WRITE, ADSP_IOC_MAGIC, 0x03, IOCTL_XFER_SIZE);

/// Large parameter write.
pub const IOCTL_ADSP_BIG_SET: u32 = ioc!(IOC_WRITE, ADSP_IOC_MAGIC, 0x04, IOCTL_XFER_SIZE);

/// Blocks until at least one probe event fires, then returns the pending
/// event mask (bit 0 = extraction, bit 1+i = injection probe i). Only the
/// concrete Linux device issues this call; the core waits on the event
/// handles the pump thread signals from it.
pub const IOCTL_ADSP_WAIT_EVENTS: u32 = ioc!(IOC_READ, ADSP_IOC_MAGIC, 0x05, IOCTL_XFER_SIZE);

/// Driver parameter ids, carried as `param_id` in the exchange body.
pub mod param {
    /// Probe service state (`TinyGet`/`TinySet`, u32 body).
    pub const PROBE_STATE: u32 = 0x20;
    /// Probe point configuration (`BigGet`/`BigSet`).
    pub const PROBE_CONFIG: u32 = 0x21;
    /// Ring buffer descriptors (`BigGet`).
    pub const PROBE_RING_BUFFERS: u32 = 0x22;
    /// Extraction ring producer linear position (`TinyGet`, u64 body).
    pub const PROBE_EXTRACTION_POS: u32 = 0x23;
    /// Injection ring consumer linear position of probe 0 (`TinyGet`, u64
    /// body). Probe `i` uses `PROBE_INJECTION_POS_BASE + i`.
    pub const PROBE_INJECTION_POS_BASE: u32 = 0x24;
    /// Module parameter tunnel to the firmware (`BigGet`/`BigSet`).
    pub const MODULE_ACCESS: u32 = 0x40;
}

/// Firmware module parameter ids (the `module_param_id` of a tunneled
/// module access).
pub mod fw_param {
    /// Base firmware configuration TLV list (module 0).
    pub const FW_CONFIG: u32 = 7;
    /// Hardware configuration TLV list (module 0).
    pub const HW_CONFIG: u32 = 8;
    /// Module entry table (module 0).
    pub const MODULES_INFO: u32 = 9;
    /// Instantiated pipeline id list (module 0).
    pub const PIPELINE_LIST: u32 = 10;
    /// Properties of one pipeline, selected by id (module 0).
    pub const PIPELINE_PROPS: u32 = 11;
    /// Scheduler tasks of one core, selected by core id (module 0).
    pub const SCHEDULERS_INFO: u32 = 12;
    /// Gateway table (module 0).
    pub const GATEWAYS: u32 = 13;
    /// Instance properties of any module instance.
    pub const MOD_INST_PROPS: u32 = 0xFE;
}

/// Firmware IXC status carried in tunneled module replies. Zero is the only
/// success value; everything else is surfaced as a firmware error.
pub const ADSP_IPC_SUCCESS: u32 = 0;
