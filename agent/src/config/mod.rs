mod config;

pub use config::{Config, DriverConfig, ProbeConfig, ServerConfig};
