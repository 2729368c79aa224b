//! Reports WAN connection changes to the IPoE health checker.

use super::HealthCheckError;
use crate::{
    ipc::{IhcMessage, IhcMessageType},
    network::{self, IpcEndpoint},
    store::{keys, EventStore},
};
use std::sync::Arc;

pub struct HealthCheckMessenger {
    peer: IpcEndpoint,
    events: Arc<dyn EventStore>,
}

impl HealthCheckMessenger {
    pub fn new(peer: IpcEndpoint, events: Arc<dyn EventStore>) -> Self {
        Self { peer, events }
    }

    /// Sends one `msg_type` notification for `if_name` to the health checker.
    ///
    /// Link-up notifications carry the current WAN address; if it cannot be
    /// determined nothing is sent. Every call uses its own connection.
    pub async fn notify(&self, msg_type: IhcMessageType, if_name: &str) -> Result<(), HealthCheckError> {
        let msg = self.build_message(msg_type, if_name)?;
        tracing::info!(
            "Sending {:?} for interface {} to {}",
            msg_type,
            if_name,
            self.peer
        );

        let sent = network::push_once(&self.peer, &msg.encode()).await?;
        tracing::debug!("Sent {} bytes to health checker", sent);
        Ok(())
    }

    /// Builds the record for `msg_type`, looking up the WAN address when needed.
    pub fn build_message(
        &self,
        msg_type: IhcMessageType,
        if_name: &str,
    ) -> Result<IhcMessage, HealthCheckError> {
        let mut msg = IhcMessage::new(msg_type, if_name);
        match msg_type {
            IhcMessageType::WanConnectionIpv6Up => {
                let prefix = self.lookup(keys::IPV6_PREFIX)?;
                msg.ipv6_address = global_address(&prefix)?;
                tracing::info!("IPv6 up message carries address {}", msg.ipv6_address);
            }
            IhcMessageType::WanConnectionUp => {
                msg.ipv4_address = self.lookup(&keys::ipv4_address(if_name))?;
                tracing::info!("IPv4 up message carries address {}", msg.ipv4_address);
            }
            _ => {}
        }
        Ok(msg)
    }

    fn lookup(&self, key: &str) -> Result<String, HealthCheckError> {
        match self.events.get(key) {
            Some(value) if !value.is_empty() && !value.starts_with(keys::NULL_PLACEHOLDER) => {
                Ok(value)
            }
            _ => Err(HealthCheckError::ValueAbsent(key.to_string())),
        }
    }
}

/// Forms the `::1` host address of a delegated prefix,
/// e.g. `2001:db8:1::/64` becomes `2001:db8:1::1`.
fn global_address(prefix: &str) -> Result<String, HealthCheckError> {
    let (network, _) = prefix
        .split_once('/')
        .ok_or_else(|| HealthCheckError::InvalidPrefix(prefix.to_string()))?;
    Ok(format!("{}1", network))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ipc::IHC_RECORD_SIZE,
        network::{bind_pull_socket, TransportError},
        store::MemoryEventStore,
    };
    use tempfile::TempDir;
    use tokio::net::UnixDatagram;

    fn peer(dir: &TempDir) -> (IpcEndpoint, UnixDatagram) {
        let endpoint = IpcEndpoint::from_path(dir.path().join("ihc.ipc"));
        let socket = bind_pull_socket(&endpoint, 64 * 1024).unwrap();
        (endpoint, socket)
    }

    async fn recv(socket: &UnixDatagram) -> IhcMessage {
        let mut buf = [0u8; IHC_RECORD_SIZE + 1];
        let n = socket.recv(&mut buf).await.unwrap();
        IhcMessage::decode(&buf[..n]).unwrap()
    }

    #[test]
    fn test_global_address() {
        assert_eq!(global_address("2001:db8:1::/64").unwrap(), "2001:db8:1::1");
        assert!(matches!(
            global_address("2001:db8:1::"),
            Err(HealthCheckError::InvalidPrefix(_))
        ));
    }

    #[tokio::test]
    async fn test_ipv6_up_carries_global_address() {
        let dir = tempfile::tempdir().unwrap();
        let (endpoint, socket) = peer(&dir);
        let events = Arc::new(MemoryEventStore::new());
        events.set(keys::IPV6_PREFIX, "2001:db8:1::/56");

        let messenger = HealthCheckMessenger::new(endpoint, events);
        messenger
            .notify(IhcMessageType::WanConnectionIpv6Up, "erouter0")
            .await
            .unwrap();

        let msg = recv(&socket).await;
        assert_eq!(msg.msg_type, IhcMessageType::WanConnectionIpv6Up);
        assert_eq!(msg.if_name, "erouter0");
        assert_eq!(msg.ipv6_address, "2001:db8:1::1");
        assert_eq!(msg.ipv4_address, "");
    }

    #[tokio::test]
    async fn test_ipv6_up_with_placeholder_prefix_sends_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let (endpoint, socket) = peer(&dir);
        let events = Arc::new(MemoryEventStore::new());
        events.set(keys::IPV6_PREFIX, keys::NULL_PLACEHOLDER);

        let messenger = HealthCheckMessenger::new(endpoint, events);
        let result = messenger
            .notify(IhcMessageType::WanConnectionIpv6Up, "erouter0")
            .await;
        assert!(matches!(result, Err(HealthCheckError::ValueAbsent(_))));

        let mut buf = [0u8; IHC_RECORD_SIZE];
        assert_eq!(
            socket.try_recv(&mut buf).unwrap_err().kind(),
            std::io::ErrorKind::WouldBlock
        );
    }

    #[tokio::test]
    async fn test_ipv4_up_reads_interface_address() {
        let dir = tempfile::tempdir().unwrap();
        let (endpoint, socket) = peer(&dir);
        let events = Arc::new(MemoryEventStore::new());
        events.set(&keys::ipv4_address("erouter0"), "10.0.0.5");

        let messenger = HealthCheckMessenger::new(endpoint, events);
        messenger
            .notify(IhcMessageType::WanConnectionUp, "erouter0")
            .await
            .unwrap();

        let msg = recv(&socket).await;
        assert_eq!(msg.msg_type, IhcMessageType::WanConnectionUp);
        assert_eq!(msg.ipv4_address, "10.0.0.5");
    }

    #[test]
    fn test_ipv4_up_without_address_fails() {
        let messenger = HealthCheckMessenger::new(
            IpcEndpoint::from_path("/nonexistent/ihc.ipc"),
            Arc::new(MemoryEventStore::new()),
        );
        let result = messenger.build_message(IhcMessageType::WanConnectionUp, "erouter0");
        assert!(matches!(
            result,
            Err(HealthCheckError::ValueAbsent(key)) if key == "ipv4_erouter0_ipaddr"
        ));
    }

    #[tokio::test]
    async fn test_down_needs_no_lookup_but_needs_a_peer() {
        let dir = tempfile::tempdir().unwrap();
        let messenger = HealthCheckMessenger::new(
            IpcEndpoint::from_path(dir.path().join("absent.ipc")),
            Arc::new(MemoryEventStore::new()),
        );

        let msg = messenger
            .build_message(IhcMessageType::WanConnectionDown, "erouter0")
            .unwrap();
        assert_eq!(msg.ipv4_address, "");
        assert_eq!(msg.ipv6_address, "");

        let result = messenger
            .notify(IhcMessageType::WanConnectionDown, "erouter0")
            .await;
        assert!(matches!(
            result,
            Err(HealthCheckError::Transport(TransportError::Connect { .. }))
        ));
    }
}
