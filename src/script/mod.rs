//! Action script invocation for bound DHCPv4 leases
//!
//! The lease is handed to the script through its environment. The variables
//! are set on the child process only, so nothing from one lease leaks into
//! the relay's own environment or into the next invocation.

use crate::ipc::Dhcpv4Lease;
use std::{
    ffi::CString,
    io,
    os::unix::ffi::OsStrExt as _,
    path::{Path, PathBuf},
    process::{ExitStatus, Stdio},
    time::Duration,
};
use thiserror::Error;
use tokio::{process::Command, time};

/// The single argument passed to the script.
pub const BOUND_ARG: &str = "bound";

#[derive(Error, Debug)]
pub enum ScriptError {
    #[error("Script '{0}' not found or not executable")]
    NotExecutable(PathBuf),

    #[error("Failed to spawn script '{path}'")]
    Spawn {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed waiting for script '{path}'")]
    Wait {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Script '{path}' did not finish within {timeout:?} and was killed")]
    TimedOut { path: PathBuf, timeout: Duration },
}

#[derive(Debug)]
pub enum ApplyOutcome {
    /// No script is configured.
    Skipped,
    /// The script ran to completion; its exit status is informational.
    Completed(ExitStatus),
}

pub struct ActionExecutor {
    script: Option<PathBuf>,
    timeout: Duration,
}

impl ActionExecutor {
    pub fn new(script: Option<PathBuf>, timeout: Duration) -> Self {
        Self { script, timeout }
    }

    pub fn script(&self) -> Option<&Path> {
        self.script.as_deref()
    }

    /// Runs the configured script for `lease` and waits for it to exit.
    pub async fn apply(&self, lease: &Dhcpv4Lease) -> Result<ApplyOutcome, ScriptError> {
        let Some(script) = self.script.as_deref() else {
            tracing::debug!("No action script configured, skipping lease for {}", lease.interface);
            return Ok(ApplyOutcome::Skipped);
        };

        if !is_executable(script) {
            return Err(ScriptError::NotExecutable(script.to_path_buf()));
        }

        tracing::info!(
            "Running {} {} for {} (ip={})",
            script.display(),
            BOUND_ARG,
            lease.interface,
            lease.ip
        );

        let mut child = Command::new(script)
            .arg(BOUND_ARG)
            .envs(lease_environment(lease))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ScriptError::Spawn {
                path: script.to_path_buf(),
                source,
            })?;

        match time::timeout(self.timeout, child.wait()).await {
            Ok(Ok(status)) => {
                tracing::debug!("Script {} exited with {}", script.display(), status);
                Ok(ApplyOutcome::Completed(status))
            }
            Ok(Err(source)) => Err(ScriptError::Wait {
                path: script.to_path_buf(),
                source,
            }),
            Err(_) => {
                if let Err(e) = child.kill().await {
                    tracing::warn!("Failed to kill script {}: {}", script.display(), e);
                }
                Err(ScriptError::TimedOut {
                    path: script.to_path_buf(),
                    timeout: self.timeout,
                })
            }
        }
    }
}

/// The environment bindings the script receives for `lease`.
pub fn lease_environment(lease: &Dhcpv4Lease) -> [(&'static str, &str); 7] {
    [
        ("interface", lease.interface.as_str()),
        ("ip", lease.ip.as_str()),
        ("mask", lease.mask.as_str()),
        ("router", lease.gateway.as_str()),
        ("dns", lease.dns_server.as_str()),
        ("ntpserver", lease.ntp_server.as_str()),
        ("domain", lease.domain_name.as_str()),
    ]
}

fn is_executable(path: &Path) -> bool {
    let Ok(c_path) = CString::new(path.as_os_str().as_bytes()) else {
        return false;
    };
    // SAFETY: `c_path` is a valid NUL-terminated string for the duration of the call.
    unsafe { libc::access(c_path.as_ptr(), libc::X_OK) == 0 }
}
