//! Driver parameter-access framing and the typed firmware structures the
//! module RPC layer exchanges through it.
//!
//! Every ioctl buffer is `[header][body]` with an 8-byte header
//! `{status: i32, size: u32}` where `size` counts the body bytes. A
//! parameter access body is `{param_id: u32, param_size: u32, payload}`.
//! Module parameters tunnel one level deeper through
//! `{fw_status, module_id, instance_id, module_param_id, data_size, data}`.
//!
//! Structures carry both `write` and `read` so the mocked device command
//! builders can produce byte-exact reply buffers.

use super::tlv::{self, TlvIter};
use super::{ByteReader, ByteWriter, WireError};

/// Bytes of the `{status, size}` ioctl header.
pub const IOCTL_HEADER_BYTES: usize = 8;

/// Driver completion status meaning success.
pub const DRIVER_STATUS_SUCCESS: i32 = 0;

/// Build the full ioctl buffer for a parameter access request.
///
/// The request header always carries status 0; the driver overwrites it in
/// the reply.
pub fn encode_param_request(param_id: u32, payload: &[u8]) -> Vec<u8> {
    let mut w = ByteWriter::new();
    w.put_i32(0);
    w.put_u32((8 + payload.len()) as u32);
    w.put_u32(param_id);
    w.put_u32(payload.len() as u32);
    w.put_bytes(payload);
    w.into_bytes()
}

/// A parsed parameter access reply. The payload borrows the reply buffer.
pub struct ParamReply<'a> {
    pub status: i32,
    pub param_id: u32,
    pub payload: &'a [u8],
}

pub fn decode_param_reply(buf: &[u8]) -> Result<ParamReply<'_>, WireError> {
    let mut r = ByteReader::new(buf);
    let status = r.i32()?;
    let size = r.u32()? as usize;
    if size > r.remaining() {
        return Err(WireError::UnexpectedEnd {
            needed: size,
            remaining: r.remaining(),
        });
    }
    let param_id = r.u32()?;
    let param_size = r.u32()? as usize;
    let payload = r.bytes(param_size)?;
    Ok(ParamReply {
        status,
        param_id,
        payload,
    })
}

/// Build a reply buffer the way the driver does. Test and mock support.
pub fn encode_param_reply(status: i32, param_id: u32, payload: &[u8]) -> Vec<u8> {
    let mut w = ByteWriter::new();
    w.put_i32(status);
    w.put_u32((8 + payload.len()) as u32);
    w.put_u32(param_id);
    w.put_u32(payload.len() as u32);
    w.put_bytes(payload);
    w.into_bytes()
}

/// Build the tunneled payload of a module parameter access.
pub fn encode_module_access(
    module_id: u16,
    instance_id: u16,
    module_param_id: u32,
    data: &[u8],
) -> Vec<u8> {
    let mut w = ByteWriter::new();
    w.put_u32(0); // fw_status, filled by the firmware on reply
    w.put_u16(module_id);
    w.put_u16(instance_id);
    w.put_u32(module_param_id);
    w.put_u32(data.len() as u32);
    w.put_bytes(data);
    w.into_bytes()
}

/// A parsed tunneled module reply.
pub struct ModuleAccessReply<'a> {
    pub fw_status: u32,
    pub module_id: u16,
    pub instance_id: u16,
    pub module_param_id: u32,
    pub data: &'a [u8],
}

pub fn decode_module_access(payload: &[u8]) -> Result<ModuleAccessReply<'_>, WireError> {
    let mut r = ByteReader::new(payload);
    let fw_status = r.u32()?;
    let module_id = r.u16()?;
    let instance_id = r.u16()?;
    let module_param_id = r.u32()?;
    let data_size = r.u32()? as usize;
    let data = r.bytes(data_size)?;
    Ok(ModuleAccessReply {
        fw_status,
        module_id,
        instance_id,
        module_param_id,
        data,
    })
}

/// Build a tunneled module reply payload. Test and mock support.
pub fn encode_module_access_reply(
    fw_status: u32,
    module_id: u16,
    instance_id: u16,
    module_param_id: u32,
    data: &[u8],
) -> Vec<u8> {
    let mut w = ByteWriter::new();
    w.put_u32(fw_status);
    w.put_u16(module_id);
    w.put_u16(instance_id);
    w.put_u32(module_param_id);
    w.put_u32(data.len() as u32);
    w.put_bytes(data);
    w.into_bytes()
}

/// `{module_id, instance_id}` packed into one 32-bit word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CompoundModuleId {
    pub module_id: u16,
    pub instance_id: u16,
}

impl CompoundModuleId {
    pub fn write(&self, w: &mut ByteWriter) {
        w.put_u16(self.module_id);
        w.put_u16(self.instance_id);
    }

    pub fn read(r: &mut ByteReader) -> Result<Self, WireError> {
        Ok(Self {
            module_id: r.u16()?,
            instance_id: r.u16()?,
        })
    }
}

/// Stream format of one module pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioDataFormat {
    pub sampling_frequency: u32,
    pub bit_depth: u32,
    pub channel_map: u32,
    pub channel_config: u32,
    pub interleaving_style: u32,
    pub number_of_channels: u8,
    pub valid_bit_depth: u8,
    pub sample_type: u8,
    pub reserved: u8,
}

impl AudioDataFormat {
    pub fn write(&self, w: &mut ByteWriter) {
        w.put_u32(self.sampling_frequency);
        w.put_u32(self.bit_depth);
        w.put_u32(self.channel_map);
        w.put_u32(self.channel_config);
        w.put_u32(self.interleaving_style);
        w.put_u8(self.number_of_channels);
        w.put_u8(self.valid_bit_depth);
        w.put_u8(self.sample_type);
        w.put_u8(self.reserved);
    }

    pub fn read(r: &mut ByteReader) -> Result<Self, WireError> {
        Ok(Self {
            sampling_frequency: r.u32()?,
            bit_depth: r.u32()?,
            channel_map: r.u32()?,
            channel_config: r.u32()?,
            interleaving_style: r.u32()?,
            number_of_channels: r.u8()?,
            valid_bit_depth: r.u8()?,
            sample_type: r.u8()?,
            reserved: r.u8()?,
        })
    }
}

/// One input or output pin of a module instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinProps {
    pub stream_type: u32,
    pub format: AudioDataFormat,
    pub phys_queue_id: u32,
}

impl PinProps {
    pub fn write(&self, w: &mut ByteWriter) {
        w.put_u32(self.stream_type);
        self.format.write(w);
        w.put_u32(self.phys_queue_id);
    }

    pub fn read(r: &mut ByteReader) -> Result<Self, WireError> {
        Ok(Self {
            stream_type: r.u32()?,
            format: AudioDataFormat::read(r)?,
            phys_queue_id: r.u32()?,
        })
    }
}

fn write_pin_list(pins: &[PinProps], w: &mut ByteWriter) {
    w.put_u32(pins.len() as u32);
    for pin in pins {
        pin.write(w);
    }
}

fn read_pin_list(r: &mut ByteReader) -> Result<Vec<PinProps>, WireError> {
    let count = r.u32()? as usize;
    let mut pins = Vec::with_capacity(count);
    for _ in 0..count {
        pins.push(PinProps::read(r)?);
    }
    Ok(pins)
}

/// Runtime properties of one module instance (`MOD_INST_PROPS`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleInstanceProps {
    pub id: CompoundModuleId,
    pub dp_queue_type: u32,
    pub queue_alignment: u32,
    pub cp_usage_mask: u32,
    pub stack_bytes: u32,
    pub bss_total_bytes: u32,
    pub bss_used_bytes: u32,
    pub ibs_bytes: u32,
    pub obs_bytes: u32,
    pub cpc: u32,
    pub cpc_peak: u32,
    pub input_pins: Vec<PinProps>,
    pub output_pins: Vec<PinProps>,
    pub input_gateway: u32,
    pub output_gateway: u32,
}

impl ModuleInstanceProps {
    pub fn to_wire(&self) -> Vec<u8> {
        let mut w = ByteWriter::new();
        self.id.write(&mut w);
        w.put_u32(self.dp_queue_type);
        w.put_u32(self.queue_alignment);
        w.put_u32(self.cp_usage_mask);
        w.put_u32(self.stack_bytes);
        w.put_u32(self.bss_total_bytes);
        w.put_u32(self.bss_used_bytes);
        w.put_u32(self.ibs_bytes);
        w.put_u32(self.obs_bytes);
        w.put_u32(self.cpc);
        w.put_u32(self.cpc_peak);
        write_pin_list(&self.input_pins, &mut w);
        write_pin_list(&self.output_pins, &mut w);
        w.put_u32(self.input_gateway);
        w.put_u32(self.output_gateway);
        w.into_bytes()
    }

    pub fn from_wire(buf: &[u8]) -> Result<Self, WireError> {
        let mut r = ByteReader::new(buf);
        Ok(Self {
            id: CompoundModuleId::read(&mut r)?,
            dp_queue_type: r.u32()?,
            queue_alignment: r.u32()?,
            cp_usage_mask: r.u32()?,
            stack_bytes: r.u32()?,
            bss_total_bytes: r.u32()?,
            bss_used_bytes: r.u32()?,
            ibs_bytes: r.u32()?,
            obs_bytes: r.u32()?,
            cpc: r.u32()?,
            cpc_peak: r.u32()?,
            input_pins: read_pin_list(&mut r)?,
            output_pins: read_pin_list(&mut r)?,
            input_gateway: r.u32()?,
            output_gateway: r.u32()?,
        })
    }
}

/// One row of the firmware's module table (`MODULES_INFO`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleEntry {
    pub module_id: u16,
    pub state_flags: u16,
    /// NUL-padded short name.
    pub name: [u8; 8],
    pub uuid: [u8; 16],
    pub affinity_mask: u32,
    pub instance_max_count: u16,
    pub instance_stack_size: u16,
}

impl ModuleEntry {
    pub fn name_str(&self) -> &str {
        let end = self.name.iter().position(|&b| b == 0).unwrap_or(8);
        std::str::from_utf8(&self.name[..end]).unwrap_or("")
    }

    pub fn write(&self, w: &mut ByteWriter) {
        w.put_u16(self.module_id);
        w.put_u16(self.state_flags);
        w.put_bytes(&self.name);
        w.put_bytes(&self.uuid);
        w.put_u32(self.affinity_mask);
        w.put_u16(self.instance_max_count);
        w.put_u16(self.instance_stack_size);
    }

    pub fn read(r: &mut ByteReader) -> Result<Self, WireError> {
        Ok(Self {
            module_id: r.u16()?,
            state_flags: r.u16()?,
            name: r.bytes(8)?.try_into().unwrap(),
            uuid: r.bytes(16)?.try_into().unwrap(),
            affinity_mask: r.u32()?,
            instance_max_count: r.u16()?,
            instance_stack_size: r.u16()?,
        })
    }
}

pub fn encode_module_entries(entries: &[ModuleEntry]) -> Vec<u8> {
    let mut w = ByteWriter::new();
    w.put_u32(entries.len() as u32);
    for entry in entries {
        entry.write(&mut w);
    }
    w.into_bytes()
}

pub fn decode_module_entries(buf: &[u8]) -> Result<Vec<ModuleEntry>, WireError> {
    let mut r = ByteReader::new(buf);
    let count = r.u32()? as usize;
    let mut entries = Vec::with_capacity(count);
    for _ in 0..count {
        entries.push(ModuleEntry::read(&mut r)?);
    }
    Ok(entries)
}

/// FwConfig TLV tags.
pub mod fw_config_tag {
    pub const FW_VERSION: u32 = 0;
    pub const MEMORY_RECLAIMED: u32 = 1;
    pub const SLOW_CLOCK_FREQ_HZ: u32 = 2;
    pub const FAST_CLOCK_FREQ_HZ: u32 = 3;
    pub const MODULES_COUNT: u32 = 4;
    pub const MAX_PPL_COUNT: u32 = 5;
    pub const MAX_PROBE_COUNT: u32 = 6;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FwVersion {
    pub major: u16,
    pub minor: u16,
    pub hotfix: u16,
    pub build: u16,
}

/// Base firmware configuration (`FW_CONFIG` TLV list).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FwConfig {
    pub fw_version: FwVersion,
    pub memory_reclaimed: u32,
    pub slow_clock_freq_hz: u32,
    pub fast_clock_freq_hz: u32,
    pub modules_count: u32,
    pub max_ppl_count: u32,
    pub max_probe_count: u32,
}

impl FwConfig {
    pub fn to_tlv(&self) -> Vec<u8> {
        let mut w = ByteWriter::new();
        w.put_u32(fw_config_tag::FW_VERSION);
        w.put_u32(8);
        w.put_u16(self.fw_version.major);
        w.put_u16(self.fw_version.minor);
        w.put_u16(self.fw_version.hotfix);
        w.put_u16(self.fw_version.build);
        for (tag, value) in [
            (fw_config_tag::MEMORY_RECLAIMED, self.memory_reclaimed),
            (fw_config_tag::SLOW_CLOCK_FREQ_HZ, self.slow_clock_freq_hz),
            (fw_config_tag::FAST_CLOCK_FREQ_HZ, self.fast_clock_freq_hz),
            (fw_config_tag::MODULES_COUNT, self.modules_count),
            (fw_config_tag::MAX_PPL_COUNT, self.max_ppl_count),
            (fw_config_tag::MAX_PROBE_COUNT, self.max_probe_count),
        ] {
            w.put_u32(tag);
            w.put_u32(4);
            w.put_u32(value);
        }
        w.into_bytes()
    }

    pub fn from_tlv(buf: &[u8]) -> Result<Self, WireError> {
        let mut fw_version = None;
        let mut memory_reclaimed = None;
        let mut slow_clock_freq_hz = None;
        let mut fast_clock_freq_hz = None;
        let mut modules_count = None;
        let mut max_ppl_count = None;
        let mut max_probe_count = None;

        for entry in TlvIter::new(buf) {
            let (tag, value) = entry?;
            match tag {
                fw_config_tag::FW_VERSION => {
                    let mut r = ByteReader::new(value);
                    fw_version = Some(FwVersion {
                        major: r.u16()?,
                        minor: r.u16()?,
                        hotfix: r.u16()?,
                        build: r.u16()?,
                    });
                }
                fw_config_tag::MEMORY_RECLAIMED => {
                    memory_reclaimed = Some(tlv::u32_value(tag, value)?)
                }
                fw_config_tag::SLOW_CLOCK_FREQ_HZ => {
                    slow_clock_freq_hz = Some(tlv::u32_value(tag, value)?)
                }
                fw_config_tag::FAST_CLOCK_FREQ_HZ => {
                    fast_clock_freq_hz = Some(tlv::u32_value(tag, value)?)
                }
                fw_config_tag::MODULES_COUNT => modules_count = Some(tlv::u32_value(tag, value)?),
                fw_config_tag::MAX_PPL_COUNT => max_ppl_count = Some(tlv::u32_value(tag, value)?),
                fw_config_tag::MAX_PROBE_COUNT => {
                    max_probe_count = Some(tlv::u32_value(tag, value)?)
                }
                _ => {} // unknown tags are legal
            }
        }

        let missing = |name: &str| WireError::Invalid(format!("FwConfig misses tag {name}"));
        Ok(Self {
            fw_version: fw_version.ok_or_else(|| missing("FW_VERSION"))?,
            memory_reclaimed: memory_reclaimed.ok_or_else(|| missing("MEMORY_RECLAIMED"))?,
            slow_clock_freq_hz: slow_clock_freq_hz.ok_or_else(|| missing("SLOW_CLOCK_FREQ_HZ"))?,
            fast_clock_freq_hz: fast_clock_freq_hz.ok_or_else(|| missing("FAST_CLOCK_FREQ_HZ"))?,
            modules_count: modules_count.ok_or_else(|| missing("MODULES_COUNT"))?,
            max_ppl_count: max_ppl_count.ok_or_else(|| missing("MAX_PPL_COUNT"))?,
            max_probe_count: max_probe_count.ok_or_else(|| missing("MAX_PROBE_COUNT"))?,
        })
    }
}

/// HwConfig TLV tags.
pub mod hw_config_tag {
    pub const DSP_VERSION: u32 = 0;
    pub const DSP_CORE_COUNT: u32 = 1;
    pub const MEM_PAGE_BYTES: u32 = 2;
    pub const TOTAL_PHYS_MEM_PAGES: u32 = 3;
}

/// Hardware configuration (`HW_CONFIG` TLV list).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HwConfig {
    pub dsp_version: u32,
    pub dsp_core_count: u32,
    pub mem_page_bytes: u32,
    pub total_phys_mem_pages: u32,
}

impl HwConfig {
    pub fn to_tlv(&self) -> Vec<u8> {
        let mut w = ByteWriter::new();
        for (tag, value) in [
            (hw_config_tag::DSP_VERSION, self.dsp_version),
            (hw_config_tag::DSP_CORE_COUNT, self.dsp_core_count),
            (hw_config_tag::MEM_PAGE_BYTES, self.mem_page_bytes),
            (hw_config_tag::TOTAL_PHYS_MEM_PAGES, self.total_phys_mem_pages),
        ] {
            w.put_u32(tag);
            w.put_u32(4);
            w.put_u32(value);
        }
        w.into_bytes()
    }

    pub fn from_tlv(buf: &[u8]) -> Result<Self, WireError> {
        let mut dsp_version = None;
        let mut dsp_core_count = None;
        let mut mem_page_bytes = None;
        let mut total_phys_mem_pages = None;

        for entry in TlvIter::new(buf) {
            let (tag, value) = entry?;
            match tag {
                hw_config_tag::DSP_VERSION => dsp_version = Some(tlv::u32_value(tag, value)?),
                hw_config_tag::DSP_CORE_COUNT => dsp_core_count = Some(tlv::u32_value(tag, value)?),
                hw_config_tag::MEM_PAGE_BYTES => mem_page_bytes = Some(tlv::u32_value(tag, value)?),
                hw_config_tag::TOTAL_PHYS_MEM_PAGES => {
                    total_phys_mem_pages = Some(tlv::u32_value(tag, value)?)
                }
                _ => {}
            }
        }

        let missing = |name: &str| WireError::Invalid(format!("HwConfig misses tag {name}"));
        Ok(Self {
            dsp_version: dsp_version.ok_or_else(|| missing("DSP_VERSION"))?,
            dsp_core_count: dsp_core_count.ok_or_else(|| missing("DSP_CORE_COUNT"))?,
            mem_page_bytes: mem_page_bytes.ok_or_else(|| missing("MEM_PAGE_BYTES"))?,
            total_phys_mem_pages: total_phys_mem_pages
                .ok_or_else(|| missing("TOTAL_PHYS_MEM_PAGES"))?,
        })
    }
}

pub fn encode_pipeline_ids(ids: &[u32]) -> Vec<u8> {
    let mut w = ByteWriter::new();
    w.put_u32(ids.len() as u32);
    for &id in ids {
        w.put_u32(id);
    }
    w.into_bytes()
}

pub fn decode_pipeline_ids(buf: &[u8]) -> Result<Vec<u32>, WireError> {
    let mut r = ByteReader::new(buf);
    let count = r.u32()? as usize;
    let mut ids = Vec::with_capacity(count);
    for _ in 0..count {
        ids.push(r.u32()?);
    }
    Ok(ids)
}

/// Properties of one pipeline (`PIPELINE_PROPS`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PplProps {
    pub id: u32,
    pub priority: u32,
    pub state: u32,
    pub total_memory_bytes: u32,
    pub used_memory_bytes: u32,
    pub module_instances: Vec<CompoundModuleId>,
}

impl PplProps {
    pub fn to_wire(&self) -> Vec<u8> {
        let mut w = ByteWriter::new();
        w.put_u32(self.id);
        w.put_u32(self.priority);
        w.put_u32(self.state);
        w.put_u32(self.total_memory_bytes);
        w.put_u32(self.used_memory_bytes);
        w.put_u32(self.module_instances.len() as u32);
        for instance in &self.module_instances {
            instance.write(&mut w);
        }
        w.into_bytes()
    }

    pub fn from_wire(buf: &[u8]) -> Result<Self, WireError> {
        let mut r = ByteReader::new(buf);
        let id = r.u32()?;
        let priority = r.u32()?;
        let state = r.u32()?;
        let total_memory_bytes = r.u32()?;
        let used_memory_bytes = r.u32()?;
        let count = r.u32()? as usize;
        let mut module_instances = Vec::with_capacity(count);
        for _ in 0..count {
            module_instances.push(CompoundModuleId::read(&mut r)?);
        }
        Ok(Self {
            id,
            priority,
            state,
            total_memory_bytes,
            used_memory_bytes,
            module_instances,
        })
    }
}

/// One low-latency or data-processing task of a scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskProps {
    pub task_id: u32,
    pub module_instance_ids: Vec<CompoundModuleId>,
}

/// One scheduler of a core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerProps {
    pub core_id: u32,
    pub processing_domain: u32,
    pub tasks: Vec<TaskProps>,
}

/// Schedulers of one core (`SCHEDULERS_INFO`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulersInfo {
    pub schedulers: Vec<SchedulerProps>,
}

impl SchedulersInfo {
    pub fn to_wire(&self) -> Vec<u8> {
        let mut w = ByteWriter::new();
        w.put_u32(self.schedulers.len() as u32);
        for scheduler in &self.schedulers {
            w.put_u32(scheduler.core_id);
            w.put_u32(scheduler.processing_domain);
            w.put_u32(scheduler.tasks.len() as u32);
            for task in &scheduler.tasks {
                w.put_u32(task.task_id);
                w.put_u32(task.module_instance_ids.len() as u32);
                for instance in &task.module_instance_ids {
                    instance.write(&mut w);
                }
            }
        }
        w.into_bytes()
    }

    pub fn from_wire(buf: &[u8]) -> Result<Self, WireError> {
        let mut r = ByteReader::new(buf);
        let scheduler_count = r.u32()? as usize;
        let mut schedulers = Vec::with_capacity(scheduler_count);
        for _ in 0..scheduler_count {
            let core_id = r.u32()?;
            let processing_domain = r.u32()?;
            let task_count = r.u32()? as usize;
            let mut tasks = Vec::with_capacity(task_count);
            for _ in 0..task_count {
                let task_id = r.u32()?;
                let instance_count = r.u32()? as usize;
                let mut module_instance_ids = Vec::with_capacity(instance_count);
                for _ in 0..instance_count {
                    module_instance_ids.push(CompoundModuleId::read(&mut r)?);
                }
                tasks.push(TaskProps {
                    task_id,
                    module_instance_ids,
                });
            }
            schedulers.push(SchedulerProps {
                core_id,
                processing_domain,
                tasks,
            });
        }
        Ok(Self { schedulers })
    }
}

/// One gateway of the firmware (`GATEWAYS`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatewayProps {
    pub id: u32,
    pub attributes: u32,
}

pub fn encode_gateways(gateways: &[GatewayProps]) -> Vec<u8> {
    let mut w = ByteWriter::new();
    w.put_u32(gateways.len() as u32);
    for gateway in gateways {
        w.put_u32(gateway.id);
        w.put_u32(gateway.attributes);
    }
    w.into_bytes()
}

pub fn decode_gateways(buf: &[u8]) -> Result<Vec<GatewayProps>, WireError> {
    let mut r = ByteReader::new(buf);
    let count = r.u32()? as usize;
    let mut gateways = Vec::with_capacity(count);
    for _ in 0..count {
        gateways.push(GatewayProps {
            id: r.u32()?,
            attributes: r.u32()?,
        });
    }
    Ok(gateways)
}
