//! IPoE health-check integration
//!
//! This module contains:
//! - Handling of echo results reported by the health checker
//! - The messenger that reports WAN connection changes back to it

pub mod handler;
pub mod messenger;

use crate::{network::TransportError, store::StoreError};
use thiserror::Error;

pub use handler::HealthCheckHandler;
pub use messenger::HealthCheckMessenger;

#[derive(Error, Debug)]
pub enum HealthCheckError {
    #[error("Unable to get {0} from the event store")]
    ValueAbsent(String),

    #[error("Invalid IPv6 prefix '{0}'")]
    InvalidPrefix(String),

    #[error("Unexpected health-check message type {0:?}")]
    UnexpectedType(crate::ipc::IhcMessageType),

    #[error("Interface status update failed: {0}")]
    Store(#[from] StoreError),

    #[error("Failed to reach the health checker: {0}")]
    Transport(#[from] TransportError),
}
