//! Control of the local DHCP client processes
//!
//! Renew and release requests are delivered as signals to the running client,
//! found by its process name.

use std::{fmt, fs, io};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpFamily {
    V4,
    V6,
}

impl fmt::Display for IpFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IpFamily::V4 => f.write_str("DHCPv4"),
            IpFamily::V6 => f.write_str("DHCPv6"),
        }
    }
}

#[derive(Error, Debug)]
pub enum DhcpClientError {
    #[error("{family} client '{name}' is not running")]
    NotRunning { family: IpFamily, name: String },

    #[error("Failed to signal {name}[pid={pid}]")]
    Signal {
        name: String,
        pid: i32,
        #[source]
        source: io::Error,
    },
}

pub trait DhcpClientControl: Send + Sync {
    /// Asks the running client to send a renew request. A client that is not
    /// running is not an error.
    fn force_renew(&self, family: IpFamily) -> Result<(), DhcpClientError>;

    /// Stops the running client.
    fn stop(&self, family: IpFamily) -> Result<(), DhcpClientError>;
}

/// Signals DHCP client processes found through `/proc`.
#[derive(Debug, Clone)]
pub struct ProcessDhcpClients {
    v4_name: String,
    v6_name: String,
}

impl ProcessDhcpClients {
    pub fn new(v4_name: impl Into<String>, v6_name: impl Into<String>) -> Self {
        Self {
            v4_name: v4_name.into(),
            v6_name: v6_name.into(),
        }
    }

    fn name(&self, family: IpFamily) -> &str {
        match family {
            IpFamily::V4 => &self.v4_name,
            IpFamily::V6 => &self.v6_name,
        }
    }

    fn signal(&self, name: &str, pid: i32, signal: libc::c_int) -> Result<(), DhcpClientError> {
        // SAFETY: kill(2) has no memory-safety requirements.
        let ret = unsafe { libc::kill(pid, signal) };
        if ret < 0 {
            return Err(DhcpClientError::Signal {
                name: name.to_string(),
                pid,
                source: io::Error::last_os_error(),
            });
        }
        Ok(())
    }
}

impl DhcpClientControl for ProcessDhcpClients {
    fn force_renew(&self, family: IpFamily) -> Result<(), DhcpClientError> {
        let name = self.name(family);
        let Some(pid) = find_pid_by_name(name) else {
            tracing::debug!("{} client {} not running, nothing to renew", family, name);
            return Ok(());
        };
        // udhcpc renews on SIGUSR1, the DHCPv6 client on SIGUSR2.
        let signal = match family {
            IpFamily::V4 => libc::SIGUSR1,
            IpFamily::V6 => libc::SIGUSR2,
        };
        tracing::info!("Sending renew signal {} to {}[pid={}]", signal, name, pid);
        self.signal(name, pid, signal)
    }

    fn stop(&self, family: IpFamily) -> Result<(), DhcpClientError> {
        let name = self.name(family);
        let pid = find_pid_by_name(name).ok_or_else(|| DhcpClientError::NotRunning {
            family,
            name: name.to_string(),
        })?;
        tracing::info!("Stopping {}[pid={}]", name, pid);
        self.signal(name, pid, libc::SIGTERM)
    }
}

/// Returns the pid of the first process whose `comm` equals `name`.
pub fn find_pid_by_name(name: &str) -> Option<i32> {
    let entries = fs::read_dir("/proc").ok()?;
    entries
        .filter_map(Result::ok)
        .filter_map(|entry| entry.file_name().to_str()?.parse::<i32>().ok())
        .find(|pid| {
            fs::read_to_string(format!("/proc/{}/comm", pid))
                .map(|comm| comm.trim_end() == name)
                .unwrap_or(false)
        })
}
