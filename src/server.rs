//! Event dispatch loop
//!
//! This module contains the IPC server that:
//! - Owns the listening socket
//! - Decodes one event record at a time
//! - Routes each event to the action executor or the health-check handler

#[cfg(feature = "health-check")]
use crate::{
    dhcp_client::ProcessDhcpClients,
    ihc::HealthCheckHandler,
    store::{MemoryEventStore, MemoryInterfaceStore},
};
use crate::{
    config::RelayConfig,
    error::RelayError,
    ipc::{CodecError, Dhcpv6Lease, Event, IhcMessage, MessageType, RECORD_SIZE},
    network::{self, TransportError},
    script::{ActionExecutor, ApplyOutcome},
};
#[cfg(feature = "health-check")]
use std::sync::Arc;
use std::time::Duration;
use tokio::{net::UnixDatagram, task::JoinHandle, time};

/// Pause after a failed receive before listening again.
const RECV_RETRY_DELAY: Duration = Duration::from_millis(100);

/// What happened to a single received datagram.
#[derive(Debug)]
pub enum DispatchOutcome {
    /// The event was handed to its handler successfully.
    Handled,
    /// A DHCPv4 event arrived but no action script is configured.
    Skipped,
    /// The datagram was dropped without being acted upon.
    Discarded(CodecError),
    /// The handler reported an error; the event is dropped.
    Failed(RelayError),
}

pub struct Dispatcher {
    socket: UnixDatagram,
    executor: ActionExecutor,
    #[cfg(feature = "health-check")]
    health_check: Option<HealthCheckHandler>,
}

impl Dispatcher {
    pub fn new(socket: UnixDatagram, executor: ActionExecutor) -> Self {
        Self {
            socket,
            executor,
            #[cfg(feature = "health-check")]
            health_check: None,
        }
    }

    /// Binds the listening endpoint from `config`. A bind failure is fatal
    /// for the caller.
    pub fn bind(config: &RelayConfig, executor: ActionExecutor) -> Result<Self, TransportError> {
        let socket = network::bind_pull_socket(&config.listen_addr, config.recv_buffer_size)?;
        tracing::info!("IPC server listening on {}", config.listen_addr);
        Ok(Self::new(socket, executor))
    }

    /// Routes health-check events to `handler`. Without a handler they are discarded.
    #[cfg(feature = "health-check")]
    pub fn with_health_check(mut self, handler: HealthCheckHandler) -> Self {
        self.health_check = Some(handler);
        self
    }

    /// Starts the dispatch loop as a background task.
    pub fn spawn(self) -> JoinHandle<()> {
        tracing::info!("IPC dispatch task started");
        tokio::spawn(self.run())
    }

    /// Receives and dispatches events forever.
    pub async fn run(self) {
        // One extra byte so that oversized datagrams show up as a size mismatch.
        let mut buf = [0u8; RECORD_SIZE + 1];
        loop {
            tracing::trace!("Waiting for next event");
            match self.socket.recv(&mut buf).await {
                Ok(len) => {
                    tracing::debug!("Received {} bytes", len);
                    let outcome = self.dispatch(&buf[..len]).await;
                    log_outcome(&outcome);
                }
                Err(e) => {
                    tracing::error!("Socket receive error: {}", e);
                    time::sleep(RECV_RETRY_DELAY).await;
                }
            }
        }
    }

    /// Decodes one datagram and routes it to its handler.
    pub async fn dispatch(&self, datagram: &[u8]) -> DispatchOutcome {
        let event = match Event::decode(datagram) {
            Ok(event) => event,
            Err(e) => return DispatchOutcome::Discarded(e),
        };

        match event {
            Event::DhcpV4(lease) => {
                tracing::info!("DHCPv4 state changed on {}", lease.interface);
                match self.executor.apply(&lease).await {
                    Ok(ApplyOutcome::Skipped) => DispatchOutcome::Skipped,
                    Ok(ApplyOutcome::Completed(status)) => {
                        if !status.success() {
                            tracing::warn!(
                                "Action script for {} exited with {}",
                                lease.interface,
                                status
                            );
                        }
                        DispatchOutcome::Handled
                    }
                    Err(e) => DispatchOutcome::Failed(e.into()),
                }
            }
            Event::DhcpV6(lease) => {
                self.handle_dhcpv6(&lease);
                DispatchOutcome::Handled
            }
            Event::HealthCheck(msg) => self.handle_health_check(&msg),
        }
    }

    #[cfg(feature = "health-check")]
    fn handle_health_check(&self, msg: &IhcMessage) -> DispatchOutcome {
        let Some(handler) = &self.health_check else {
            return health_check_unsupported();
        };
        match handler.handle(msg) {
            Ok(()) => DispatchOutcome::Handled,
            Err(e) => DispatchOutcome::Failed(e.into()),
        }
    }

    #[cfg(not(feature = "health-check"))]
    fn handle_health_check(&self, _msg: &IhcMessage) -> DispatchOutcome {
        health_check_unsupported()
    }

    // DHCPv6 leases are owned by the WAN data model; the relay only acknowledges them.
    fn handle_dhcpv6(&self, lease: &Dhcpv6Lease) {
        tracing::info!(
            "DHCPv6 state changed on {} (address={}, prefix={})",
            lease.interface,
            lease.address,
            lease.prefix
        );
    }
}

/// Binds the listening endpoint and starts the dispatch task.
///
/// The collaborator stores are in-memory; the WAN interfaces named in
/// `config` are registered so that status requests for them succeed.
pub fn start_ipc_server(config: &RelayConfig) -> Result<JoinHandle<()>, RelayError> {
    let executor = ActionExecutor::new(config.script.clone(), config.script_timeout);
    match executor.script() {
        Some(script) => tracing::info!("Action script: {}", script.display()),
        None => tracing::info!("No action script configured"),
    }

    let dispatcher = Dispatcher::bind(config, executor)?;
    #[cfg(feature = "health-check")]
    let dispatcher = dispatcher.with_health_check(HealthCheckHandler::new(
        Arc::new(MemoryInterfaceStore::new(config.wan_interfaces.iter().cloned())),
        Arc::new(MemoryEventStore::new()),
        Arc::new(ProcessDhcpClients::new(
            config.dhcpv4_client.as_str(),
            config.dhcpv6_client.as_str(),
        )),
    ));
    Ok(dispatcher.spawn())
}

fn health_check_unsupported() -> DispatchOutcome {
    DispatchOutcome::Discarded(CodecError::UnknownMessageType(
        MessageType::HealthCheckStateChanged as u32,
    ))
}

fn log_outcome(outcome: &DispatchOutcome) {
    match outcome {
        DispatchOutcome::Handled => tracing::debug!("Event handled"),
        DispatchOutcome::Skipped => tracing::debug!("Event skipped, no action script configured"),
        DispatchOutcome::Discarded(CodecError::Malformed { expected, actual }) => {
            tracing::error!("Message size unexpected: {} bytes, expected {}", actual, expected)
        }
        DispatchOutcome::Discarded(e) => tracing::error!("Invalid message sent to relay: {}", e),
        DispatchOutcome::Failed(e) => tracing::error!("Failed to process event: {}", e),
    }
}
