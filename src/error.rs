use crate::{config::ConfigError, network::TransportError, script::ScriptError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Transport operation failed: {0}")]
    Transport(#[from] TransportError),

    #[error("Action script failed: {0}")]
    Script(#[from] ScriptError),

    #[cfg(feature = "health-check")]
    #[error("Health-check processing failed: {0}")]
    HealthCheck(#[from] crate::ihc::HealthCheckError),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Dispatch task terminated: {0}")]
    Critical(String),
}
