use thiserror::Error;

/// Failure reported while driving the actuator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Fault {
    #[error("actuator unavailable")]
    Unavailable,

    #[error("actuator driver failed: {0}")]
    Driver(String),

    /// The driver panicked; the panic was contained at the call site.
    #[error("actuator driver panicked: {0}")]
    Panicked(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
