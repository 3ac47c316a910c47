//! Entry point of the debug agent.
//!
//! Initializes logging and configuration, opens the driver device, builds
//! the probe service and module handler, and serves the REST façade until
//! ctrl-c. On shutdown the probe service is walked back to Idle so the
//! driver is left clean.

use agent::communications::{Device, EventHandles, LinuxDevice};
use agent::config::Config;
use agent::logger;
use agent::modules::ModuleHandler;
use agent::probe::backend::ProbeBackend;
use agent::probe::service::{ProbeService, QueueBudgets};
use agent::rest::{self, AppState};
use log::{info, warn};
use shared::constants::MAX_PROBE_COUNT;
use shared::wire::probe::ProbeState;
use std::path::PathBuf;
use std::sync::Arc;
use std::env;

fn main() -> anyhow::Result<()> {
    let config = Config::load_or_default(&find_config_file())?;

    // Keep logger alive for the duration of the process.
    let _logger = logger::init_logger(config.server.verbose)
        .map_err(|e| anyhow::anyhow!("logger init failed: {e}"))?;
    info!("Configuration loaded");

    let events = Arc::new(EventHandles::create(MAX_PROBE_COUNT));
    let device: Arc<dyn Device> = LinuxDevice::open(
        &config.driver.device_path,
        config.driver.ring_mmap_bytes,
        Arc::clone(&events),
    )?;

    let backend = Arc::new(ProbeBackend::new(Arc::clone(&device)));
    let modules = Arc::new(ModuleHandler::new(Arc::clone(&device)));

    // The compiled probe contract must match what the firmware reports.
    match modules.get_fw_config() {
        Ok(fw) => {
            info!(
                "Firmware {}.{}.{}.{}, {} probes",
                fw.fw_version.major,
                fw.fw_version.minor,
                fw.fw_version.hotfix,
                fw.fw_version.build,
                fw.max_probe_count
            );
            if fw.max_probe_count as usize != MAX_PROBE_COUNT {
                anyhow::bail!(
                    "firmware reports {} probes, this agent is built for {}",
                    fw.max_probe_count,
                    MAX_PROBE_COUNT
                );
            }
        }
        Err(e) => warn!("Could not read FwConfig at startup: {e}"),
    }

    let service = Arc::new(ProbeService::new(
        backend,
        Arc::clone(&modules),
        events,
        QueueBudgets {
            extraction_bytes: config.probe.extraction_queue_bytes,
            injection_bytes: config.probe.injection_queue_bytes,
        },
    ));
    let state = AppState {
        service: Arc::clone(&service),
        modules,
    };

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(rest::serve(state, config.server.port))?;

    // Leave the driver in a clean state whatever the clients were doing.
    if let Err(e) = service.set_state(ProbeState::Idle) {
        warn!("Could not return the probe service to Idle on shutdown: {e}");
    }
    info!("Agent stopped");
    Ok(())
}

/// Find the configuration file: an override environment variable first,
/// falling back to a file next to the running executable.
fn find_config_file() -> PathBuf {
    if let Some(path) = env::var_os("ADSP_AGENT_CONFIG") {
        return PathBuf::from(path);
    }

    let mut exe_path = env::current_exe().unwrap_or_else(|_| PathBuf::from("."));
    exe_path.pop();
    exe_path.push("agent.toml");
    exe_path
}
