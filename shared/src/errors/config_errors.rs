use std::path::PathBuf;
use thiserror::Error;

/// All errors that can occur while loading the agent configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failure to read the configuration file
    #[error("I/O error on `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failure during TOML parsing
    #[error(transparent)]
    Parse(#[from] toml::de::Error),

    /// The file parsed but a value is out of range or inconsistent
    #[error("Invalid configuration: {0}")]
    Validation(String),
}
