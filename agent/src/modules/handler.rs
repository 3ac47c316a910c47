//! Typed RPC to the firmware through the driver's module parameter tunnel.
//!
//! Each operation serializes one request, performs one driver call and
//! parses the reply. Failures are classified in three layers: the OS
//! refusing the ioctl, the driver completing it with a non-success status,
//! and the firmware answering with a non-success IXC status — each carried
//! as its own error kind.

use crate::communications::Device;
use shared::constants::{fw_param, param, ADSP_IPC_SUCCESS, IOCTL_ADSP_BIG_GET};
use shared::errors::ModuleHandlerError;
use shared::wire::module::{
    decode_gateways, decode_module_access, decode_module_entries, decode_param_reply,
    decode_pipeline_ids, encode_module_access, encode_param_request, FwConfig, GatewayProps,
    HwConfig, ModuleEntry, ModuleInstanceProps, PplProps, SchedulersInfo, DRIVER_STATUS_SUCCESS,
};
use std::sync::Arc;

/// Module id and instance of the base firmware, the target of all global
/// queries.
const BASE_FW: (u16, u16) = (0, 0);

pub struct ModuleHandler {
    device: Arc<dyn Device>,
}

impl ModuleHandler {
    pub fn new(device: Arc<dyn Device>) -> Self {
        Self { device }
    }

    /// One tunneled module parameter read.
    fn module_get(
        &self,
        module_id: u16,
        instance_id: u16,
        module_param_id: u32,
        request_data: &[u8],
    ) -> Result<Vec<u8>, ModuleHandlerError> {
        let access = encode_module_access(module_id, instance_id, module_param_id, request_data);
        let mut buffer = encode_param_request(param::MODULE_ACCESS, &access);
        self.device.io_control(IOCTL_ADSP_BIG_GET, &mut buffer)?;

        let reply = decode_param_reply(&buffer).map_err(|e| ModuleHandlerError::Reply {
            param_id: module_param_id,
            reason: e.to_string(),
        })?;
        if reply.status != DRIVER_STATUS_SUCCESS {
            return Err(shared::errors::DriverError::Status(reply.status).into());
        }

        let access = decode_module_access(reply.payload).map_err(|e| ModuleHandlerError::Reply {
            param_id: module_param_id,
            reason: e.to_string(),
        })?;
        if access.fw_status != ADSP_IPC_SUCCESS {
            return Err(ModuleHandlerError::Firmware(access.fw_status));
        }
        if access.module_id != module_id
            || access.instance_id != instance_id
            || access.module_param_id != module_param_id
        {
            return Err(ModuleHandlerError::Reply {
                param_id: module_param_id,
                reason: format!(
                    "reply addressed to ({}, {}, {:#x})",
                    access.module_id, access.instance_id, access.module_param_id
                ),
            });
        }
        Ok(access.data.to_vec())
    }

    fn reply_error(param_id: u32) -> impl Fn(shared::wire::WireError) -> ModuleHandlerError {
        move |e| ModuleHandlerError::Reply {
            param_id,
            reason: e.to_string(),
        }
    }

    /// Instance properties, the source of injection sample byte sizes.
    pub fn get_module_instance_props(
        &self,
        module_id: u16,
        instance_id: u16,
    ) -> Result<ModuleInstanceProps, ModuleHandlerError> {
        let data = self.module_get(module_id, instance_id, fw_param::MOD_INST_PROPS, &[])?;
        ModuleInstanceProps::from_wire(&data).map_err(Self::reply_error(fw_param::MOD_INST_PROPS))
    }

    pub fn get_module_entries(&self) -> Result<Vec<ModuleEntry>, ModuleHandlerError> {
        let data = self.module_get(BASE_FW.0, BASE_FW.1, fw_param::MODULES_INFO, &[])?;
        decode_module_entries(&data).map_err(Self::reply_error(fw_param::MODULES_INFO))
    }

    pub fn get_fw_config(&self) -> Result<FwConfig, ModuleHandlerError> {
        let data = self.module_get(BASE_FW.0, BASE_FW.1, fw_param::FW_CONFIG, &[])?;
        FwConfig::from_tlv(&data).map_err(Self::reply_error(fw_param::FW_CONFIG))
    }

    pub fn get_hw_config(&self) -> Result<HwConfig, ModuleHandlerError> {
        let data = self.module_get(BASE_FW.0, BASE_FW.1, fw_param::HW_CONFIG, &[])?;
        HwConfig::from_tlv(&data).map_err(Self::reply_error(fw_param::HW_CONFIG))
    }

    pub fn get_pipeline_ids(&self) -> Result<Vec<u32>, ModuleHandlerError> {
        let data = self.module_get(BASE_FW.0, BASE_FW.1, fw_param::PIPELINE_LIST, &[])?;
        decode_pipeline_ids(&data).map_err(Self::reply_error(fw_param::PIPELINE_LIST))
    }

    pub fn get_pipeline_props(&self, pipeline_id: u32) -> Result<PplProps, ModuleHandlerError> {
        let data = self.module_get(
            BASE_FW.0,
            BASE_FW.1,
            fw_param::PIPELINE_PROPS,
            &pipeline_id.to_le_bytes(),
        )?;
        PplProps::from_wire(&data).map_err(Self::reply_error(fw_param::PIPELINE_PROPS))
    }

    pub fn get_schedulers_info(&self, core_id: u32) -> Result<SchedulersInfo, ModuleHandlerError> {
        let data = self.module_get(
            BASE_FW.0,
            BASE_FW.1,
            fw_param::SCHEDULERS_INFO,
            &core_id.to_le_bytes(),
        )?;
        SchedulersInfo::from_wire(&data).map_err(Self::reply_error(fw_param::SCHEDULERS_INFO))
    }

    pub fn get_gateways(&self) -> Result<Vec<GatewayProps>, ModuleHandlerError> {
        let data = self.module_get(BASE_FW.0, BASE_FW.1, fw_param::GATEWAYS, &[])?;
        decode_gateways(&data).map_err(Self::reply_error(fw_param::GATEWAYS))
    }
}
