//! Detaching the relay from its controlling terminal.

use std::{ffi::CStr, io};
use thiserror::Error;

const ROOT_DIR: &CStr = c"/";
const DEV_NULL: &CStr = c"/dev/null";

#[derive(Error, Debug)]
pub enum DaemonError {
    #[error("fork failed: {0}")]
    Fork(#[source] io::Error),

    #[error("setsid failed: {0}")]
    NewSession(#[source] io::Error),

    #[error("chdir to / failed: {0}")]
    ChangeDir(#[source] io::Error),

    #[error("closing standard streams failed: {0}")]
    CloseStdio(#[source] io::Error),
}

/// Turns the current process into a background daemon.
///
/// The parent exits with status 0 inside this call; only the child returns.
/// Must run before any threads (including the async runtime) are started.
pub fn daemonize() -> Result<(), DaemonError> {
    // SAFETY: the process is still single-threaded here.
    match unsafe { libc::fork() } {
        -1 => return Err(DaemonError::Fork(io::Error::last_os_error())),
        0 => {}
        _ => std::process::exit(0),
    }

    // SAFETY: plain syscalls without pointer arguments, or with static C strings.
    unsafe {
        libc::umask(0);

        if libc::setsid() < 0 {
            return Err(DaemonError::NewSession(io::Error::last_os_error()));
        }

        if libc::chdir(ROOT_DIR.as_ptr()) < 0 {
            return Err(DaemonError::ChangeDir(io::Error::last_os_error()));
        }
    }

    close_stdio()
}

/// Closes stdin, stdout and stderr.
///
/// The descriptors are pointed at /dev/null instead of being left free, so a
/// later socket can never be handed fd 0-2 and receive stray log output.
fn close_stdio() -> Result<(), DaemonError> {
    // SAFETY: DEV_NULL is a valid C string; the fds are owned by this process.
    unsafe {
        let null_fd = libc::open(DEV_NULL.as_ptr(), libc::O_RDWR);
        if null_fd < 0 {
            return Err(DaemonError::CloseStdio(io::Error::last_os_error()));
        }
        for fd in [libc::STDIN_FILENO, libc::STDOUT_FILENO, libc::STDERR_FILENO] {
            if libc::dup2(null_fd, fd) < 0 {
                return Err(DaemonError::CloseStdio(io::Error::last_os_error()));
            }
        }
        if null_fd > libc::STDERR_FILENO {
            libc::close(null_fd);
        }
    }
    Ok(())
}
