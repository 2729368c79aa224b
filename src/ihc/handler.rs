//! Reactions to echo results from the IPoE health checker.

use super::HealthCheckError;
use crate::{
    dhcp_client::{DhcpClientControl, IpFamily},
    ipc::{IhcMessage, IhcMessageType},
    store::{self, keys, EventStore, InterfaceStatus, InterfaceStore},
};
use std::sync::Arc;

pub struct HealthCheckHandler {
    interfaces: Arc<dyn InterfaceStore>,
    events: Arc<dyn EventStore>,
    dhcp_clients: Arc<dyn DhcpClientControl>,
}

impl HealthCheckHandler {
    pub fn new(
        interfaces: Arc<dyn InterfaceStore>,
        events: Arc<dyn EventStore>,
        dhcp_clients: Arc<dyn DhcpClientControl>,
    ) -> Self {
        Self {
            interfaces,
            events,
            dhcp_clients,
        }
    }

    pub fn handle(&self, msg: &IhcMessage) -> Result<(), HealthCheckError> {
        tracing::info!(
            "Received {:?} from health checker for {}",
            msg.msg_type,
            msg.if_name
        );
        match msg.msg_type {
            IhcMessageType::EchoRenewIpv4 => self.force_renew(IpFamily::V4, &msg.if_name),
            IhcMessageType::EchoRenewIpv6 => self.force_renew(IpFamily::V6, &msg.if_name),
            IhcMessageType::EchoIpv4Up => {
                self.connection_up(keys::IPV4_CONNECTION_STATE);
                Ok(())
            }
            IhcMessageType::EchoIpv6Up => {
                self.connection_up(keys::IPV6_CONNECTION_STATE);
                Ok(())
            }
            IhcMessageType::EchoFailIpv4 => self.stop_client(IpFamily::V4, &msg.if_name),
            IhcMessageType::EchoFailIpv6 => self.stop_client(IpFamily::V6, &msg.if_name),
            other => Err(HealthCheckError::UnexpectedType(other)),
        }
    }

    // 续租请求失败不影响状态更新
    fn force_renew(&self, family: IpFamily, if_name: &str) -> Result<(), HealthCheckError> {
        if let Err(e) = self.dhcp_clients.force_renew(family) {
            tracing::warn!("Failed to trigger {} renew: {}", family, e);
        }
        self.set_status(if_name, down_status(family))
    }

    fn stop_client(&self, family: IpFamily, if_name: &str) -> Result<(), HealthCheckError> {
        if let Err(e) = self.dhcp_clients.stop(family) {
            tracing::warn!("Failed to stop {} client: {}", family, e);
        }
        self.set_status(if_name, down_status(family))
    }

    fn connection_up(&self, key: &str) {
        if store::mark_connection_up(self.events.as_ref(), key) {
            tracing::info!("Setting {} to {}", key, keys::STATUS_UP);
        } else {
            tracing::debug!("{} is not {}, leaving it unchanged", key, keys::STATUS_DOWN);
        }
    }

    fn set_status(&self, if_name: &str, status: InterfaceStatus) -> Result<(), HealthCheckError> {
        store::set_interface_status(self.interfaces.as_ref(), if_name, status)?;
        Ok(())
    }
}

fn down_status(family: IpFamily) -> InterfaceStatus {
    match family {
        IpFamily::V4 => InterfaceStatus::ConnectionDown,
        IpFamily::V6 => InterfaceStatus::Ipv6ConnectionDown,
    }
}
