use std::{
    fmt, io,
    os::{
        fd::OwnedFd,
        unix::{fs::FileTypeExt, net::UnixDatagram as StdUnixDatagram},
    },
    path::{Path, PathBuf},
    str::FromStr,
};
use thiserror::Error;
use tokio::net::UnixDatagram as TokioUnixDatagram;

const IPC_SCHEME: &str = "ipc://";

/// Defines all possible errors for transport operations.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Invalid IPC address '{0}', expected ipc://<path>")]
    InvalidAddress(String),

    #[error("Failed to create a new socket")]
    CreateSocket(#[source] io::Error),

    #[error("Failed to remove stale socket file '{path}'")]
    RemoveStale {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to bind socket to '{path}'")]
    BindSocket {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to connect to '{path}'")]
    Connect {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to set socket to non-blocking mode")]
    SetNonBlocking(#[source] io::Error),

    #[error("Failed to convert socket to TokioUnixDatagram")]
    ConvertToTokio(#[source] io::Error),

    #[error("Failed to receive message")]
    Receive(#[source] io::Error),

    #[error("Failed to send message")]
    Send(#[source] io::Error),

    #[error("Short send: {sent} of {expected} bytes")]
    ShortSend { sent: usize, expected: usize },
}

/// A message endpoint written as `ipc://<path>`.
///
/// Each endpoint is backed by a Unix datagram socket, so every send is
/// delivered as one whole message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpcEndpoint {
    path: PathBuf,
}

impl IpcEndpoint {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FromStr for IpcEndpoint {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.strip_prefix(IPC_SCHEME) {
            Some(path) if !path.is_empty() => Ok(Self::from_path(path)),
            _ => Err(TransportError::InvalidAddress(s.to_string())),
        }
    }
}

impl fmt::Display for IpcEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", IPC_SCHEME, self.path.display())
    }
}

/// Creates the listening (pull) socket for inbound event messages.
///
/// A socket file left behind by a previous run is removed before binding.
/// The bind fails with `AddrInUse` while another listener still owns the
/// path, and anything at the path that is not a socket is left untouched.
///
/// # Arguments
/// * `endpoint` - The endpoint to bind to.
/// * `recv_buffer` - Requested kernel receive buffer size in bytes.
pub fn bind_pull_socket(
    endpoint: &IpcEndpoint,
    recv_buffer: usize,
) -> Result<TokioUnixDatagram, TransportError> {
    use socket2::{Domain, SockAddr, Socket, Type};

    let path = endpoint.path();
    remove_stale_socket(path)?;

    // Create a socket2 socket, which allows setting options before binding.
    let socket2 =
        Socket::new(Domain::UNIX, Type::DGRAM, None).map_err(TransportError::CreateSocket)?;

    // A small buffer only drops bursts; the kernel may round the value.
    if let Err(e) = socket2.set_recv_buffer_size(recv_buffer) {
        tracing::warn!("Failed to set receive buffer to {} bytes: {}", recv_buffer, e);
    }

    let bind_err = |source: io::Error| TransportError::BindSocket {
        path: path.to_path_buf(),
        source,
    };
    let addr = SockAddr::unix(path).map_err(bind_err)?;
    socket2.bind(&addr).map_err(bind_err)?;

    // Convert to a standard socket, then into a Tokio socket.
    let std_socket = StdUnixDatagram::from(OwnedFd::from(socket2));
    std_socket
        .set_nonblocking(true)
        .map_err(TransportError::SetNonBlocking)?;
    TokioUnixDatagram::from_std(std_socket).map_err(TransportError::ConvertToTokio)
}

fn remove_stale_socket(path: &Path) -> Result<(), TransportError> {
    let bind_err = |source: io::Error| TransportError::BindSocket {
        path: path.to_path_buf(),
        source,
    };

    let meta = match std::fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(bind_err(e)),
    };
    if !meta.file_type().is_socket() {
        return Err(bind_err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            "path exists and is not a socket",
        )));
    }

    // Only a socket nobody is listening on refuses the connection.
    let live = StdUnixDatagram::unbound()
        .and_then(|client| client.connect(path))
        .is_ok();
    if live {
        return Err(bind_err(io::Error::from(io::ErrorKind::AddrInUse)));
    }

    tracing::debug!("Removing stale socket file {}", path.display());
    std::fs::remove_file(path).map_err(|source| TransportError::RemoveStale {
        path: path.to_path_buf(),
        source,
    })
}

/// Opens a one-shot push connection to `endpoint`, sends `message` as a
/// single datagram and closes the connection again.
pub async fn push_once(endpoint: &IpcEndpoint, message: &[u8]) -> Result<usize, TransportError> {
    let socket = TokioUnixDatagram::unbound().map_err(TransportError::CreateSocket)?;
    socket
        .connect(endpoint.path())
        .map_err(|source| TransportError::Connect {
            path: endpoint.path().to_path_buf(),
            source,
        })?;

    let sent = socket.send(message).await.map_err(TransportError::Send)?;
    if sent != message.len() {
        return Err(TransportError::ShortSend {
            sent,
            expected: message.len(),
        });
    }
    Ok(sent)
}
