use std::path::PathBuf;
use std::time::Duration;

/// Errors that can occur in socket transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to bind to the specified address.
    #[error("failed to bind to {path}: {source}")]
    Bind {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to connect to the specified address.
    #[error("failed to connect to {path}: {source}")]
    Connect {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to accept an incoming connection.
    #[error("failed to accept connection: {0}")]
    Accept(std::io::Error),

    /// An I/O error occurred on the socket.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The socket path is too long for the platform.
    #[error("socket path too long ({len} bytes, max {max}): {path}")]
    PathTooLong {
        path: PathBuf,
        len: usize,
        max: usize,
    },

    /// The peer closed the connection before any byte of the message arrived.
    #[error("peer closed the connection")]
    Shutdown,

    /// The kernel had more control data than the receive buffer could hold.
    #[error("ancillary data truncated")]
    ControlTruncated,

    /// More descriptors than fit in a single control message.
    #[error("too many descriptors ({count}, max {max})")]
    TooManyDescriptors { count: usize, max: usize },

    /// The endpoint did not become connectable in time.
    #[error("endpoint {path} not available after {timeout:?}")]
    DeadlineExceeded { path: PathBuf, timeout: Duration },
}

impl TransportError {
    /// OS-style error code for callers that branch on errno values.
    pub fn os_error_code(&self) -> i32 {
        match self {
            TransportError::Bind { source, .. }
            | TransportError::Connect { source, .. }
            | TransportError::Accept(source)
            | TransportError::Io(source) => source.raw_os_error().unwrap_or(libc::EIO),
            TransportError::PathTooLong { .. } => libc::ENAMETOOLONG,
            TransportError::Shutdown => libc::ESHUTDOWN,
            TransportError::ControlTruncated => libc::EIO,
            TransportError::TooManyDescriptors { .. } => libc::EINVAL,
            TransportError::DeadlineExceeded { .. } => libc::ETIMEDOUT,
        }
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
