mod config_errors;
mod driver_errors;
mod module_errors;
mod probe_errors;

pub use config_errors::ConfigError;
pub use driver_errors::DriverError;
pub use module_errors::ModuleHandlerError;
pub use probe_errors::ProbeError;
