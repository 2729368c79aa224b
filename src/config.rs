use crate::network::{IpcEndpoint, TransportError};
use clap::Parser;
use std::{env, path::PathBuf, time::Duration};
use thiserror::Error;

/// Socket path producers push DHCP and health-check events to.
pub const DEFAULT_LISTEN_PATH: &str = "/tmp/wan_manager.ipc";
/// Socket path of the IPoE health checker.
pub const DEFAULT_HEALTH_CHECK_PATH: &str = "/tmp/ipoe_health_check.ipc";

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Detach from the terminal and run in the background
    #[arg(short = 'd')]
    pub detach: bool,

    /// Action script run with `bound` when a DHCPv4 lease is obtained
    #[arg(short = 's', value_name = "SCRIPT")]
    pub script: Option<PathBuf>,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{name}: {source}")]
    Endpoint {
        name: &'static str,
        #[source]
        source: TransportError,
    },

    #[error("{name}: invalid value '{value}'")]
    InvalidValue { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub listen_addr: IpcEndpoint,
    pub health_check_addr: IpcEndpoint,
    pub recv_buffer_size: usize,
    pub script: Option<PathBuf>,
    pub script_timeout: Duration,
    pub wan_interfaces: Vec<String>,
    pub dhcpv4_client: String,
    pub dhcpv6_client: String,
}

impl RelayConfig {
    pub fn new(script: Option<PathBuf>) -> Self {
        Self {
            listen_addr: IpcEndpoint::from_path(DEFAULT_LISTEN_PATH),
            health_check_addr: IpcEndpoint::from_path(DEFAULT_HEALTH_CHECK_PATH),
            recv_buffer_size: 256 * 1024,
            script,
            script_timeout: Duration::from_secs(30),
            wan_interfaces: vec!["erouter0".to_string()],
            dhcpv4_client: "udhcpc".to_string(),
            dhcpv6_client: "dibbler-client".to_string(),
        }
    }

    pub fn from_args(args: &Args) -> Self {
        Self::new(args.script.clone())
    }

    /// Applies `WANRELAY_*` environment overrides.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|name| env::var(name).ok())
    }

    fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        if let Some(value) = lookup("WANRELAY_LISTEN_ADDR") {
            self.listen_addr = parse_endpoint("WANRELAY_LISTEN_ADDR", &value)?;
        }
        if let Some(value) = lookup("WANRELAY_IHC_ADDR") {
            self.health_check_addr = parse_endpoint("WANRELAY_IHC_ADDR", &value)?;
        }
        if let Some(value) = lookup("WANRELAY_SCRIPT_TIMEOUT_SECS") {
            let secs = value
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .ok_or(ConfigError::InvalidValue {
                    name: "WANRELAY_SCRIPT_TIMEOUT_SECS",
                    value: value.clone(),
                })?;
            self.script_timeout = Duration::from_secs(secs);
        }
        if let Some(value) = lookup("WANRELAY_WAN_INTERFACES") {
            self.wan_interfaces = value
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(value) = lookup("WANRELAY_DHCPV4_CLIENT") {
            self.dhcpv4_client = value;
        }
        if let Some(value) = lookup("WANRELAY_DHCPV6_CLIENT") {
            self.dhcpv6_client = value;
        }
        Ok(self)
    }
}

fn parse_endpoint(name: &'static str, value: &str) -> Result<IpcEndpoint, ConfigError> {
    value
        .parse()
        .map_err(|source| ConfigError::Endpoint { name, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_match_well_known_addresses() {
        let config = RelayConfig::new(None);
        assert_eq!(config.listen_addr.to_string(), "ipc:///tmp/wan_manager.ipc");
        assert_eq!(
            config.health_check_addr.to_string(),
            "ipc:///tmp/ipoe_health_check.ipc"
        );
        assert_eq!(config.script_timeout, Duration::from_secs(30));
        assert_eq!(config.wan_interfaces, vec!["erouter0"]);
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("WANRELAY_LISTEN_ADDR", "ipc:///run/wanrelay.ipc"),
            ("WANRELAY_SCRIPT_TIMEOUT_SECS", "5"),
            ("WANRELAY_WAN_INTERFACES", "erouter0, wan1,"),
        ]);
        let config = RelayConfig::new(None)
            .with_overrides(|name| vars.get(name).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.listen_addr.to_string(), "ipc:///run/wanrelay.ipc");
        assert_eq!(config.script_timeout, Duration::from_secs(5));
        assert_eq!(config.wan_interfaces, vec!["erouter0", "wan1"]);
        assert_eq!(config.dhcpv4_client, "udhcpc");
    }

    #[test]
    fn test_invalid_overrides() {
        let bad_addr = RelayConfig::new(None)
            .with_overrides(|name| (name == "WANRELAY_IHC_ADDR").then(|| "tcp://127.0.0.1:1".into()));
        assert!(matches!(bad_addr, Err(ConfigError::Endpoint { .. })));

        let bad_timeout = RelayConfig::new(None)
            .with_overrides(|name| (name == "WANRELAY_SCRIPT_TIMEOUT_SECS").then(|| "0".into()));
        assert!(matches!(bad_timeout, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_args_parsing() {
        let args = Args::try_parse_from(["wanrelay", "-d", "-s", "/usr/bin/lease.sh"]).unwrap();
        assert!(args.detach);
        assert_eq!(args.script, Some(PathBuf::from("/usr/bin/lease.sh")));

        let args = Args::try_parse_from(["wanrelay"]).unwrap();
        assert!(!args.detach);
        assert!(args.script.is_none());

        assert!(Args::try_parse_from(["wanrelay", "-x"]).is_err());
    }
}
