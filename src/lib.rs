//! # Wanrelay - WAN Manager Event Relay
//!
//! Wanrelay is the inter-process event relay of a WAN connection manager. It
//! listens for fixed-size event records pushed by the DHCP clients and the
//! IPoE health checker, and reacts to each one:
//!
//! - DHCPv4 lease bound: runs the configured action script with the lease in
//!   its environment
//! - DHCPv6 state change: acknowledged
//! - Health-check echo results: DHCP client renew/stop signals, interface
//!   status and connection state updates
//!
//! It can also report WAN connection changes back to the health checker.
//!
//! ## Example
//!
//! ```rust,no_run
//! use wanrelay::{start_ipc_server, RelayConfig};
//! use std::path::PathBuf;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RelayConfig::new(Some(PathBuf::from("/etc/wanrelay/lease.sh")));
//!     let task = start_ipc_server(&config)?;
//!     task.await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod daemon;
pub mod dhcp_client;
pub mod error;
#[cfg(feature = "health-check")]
pub mod ihc;
pub mod ipc;
pub mod network;
pub mod script;
pub mod server;
pub mod store;

pub use config::{Args, RelayConfig};
pub use error::RelayError;
pub use ipc::{Dhcpv4Lease, Event, IhcMessage, IhcMessageType};
pub use script::{ActionExecutor, ApplyOutcome};
pub use server::{start_ipc_server, DispatchOutcome, Dispatcher};
