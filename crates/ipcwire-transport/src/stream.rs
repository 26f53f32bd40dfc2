use std::io::{Read, Write};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd, RawFd};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::time::Duration;

use tracing::debug;

use crate::credentials::Credentials;
use crate::error::{Result, TransportError};
use crate::msg::set_pass_credentials;
use crate::retry::retry_eintr;

/// A connected Unix stream socket.
///
/// Implements `Read + Write` for plain byte traffic and `AsFd` so the
/// payload layer can drive `sendmsg`/`recvmsg` on it directly.
pub struct IpcStream {
    inner: UnixStream,
}

impl IpcStream {
    /// Connect to a listening endpoint (blocking).
    pub fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let stream =
            retry_eintr(|| UnixStream::connect(path)).map_err(|e| TransportError::Connect {
                path: path.to_path_buf(),
                source: e,
            })?;
        debug!(?path, "connected to unix domain socket");
        Ok(Self::from_unix(stream))
    }

    /// A connected pair, mostly useful for tests and in-process plumbing.
    pub fn pair() -> Result<(Self, Self)> {
        let (a, b) = UnixStream::pair()?;
        Ok((Self::from_unix(a), Self::from_unix(b)))
    }

    pub fn from_unix(stream: UnixStream) -> Self {
        Self { inner: stream }
    }

    pub fn into_unix(self) -> UnixStream {
        self.inner
    }

    /// Set read timeout on the underlying stream.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.inner.set_read_timeout(timeout).map_err(Into::into)
    }

    /// Set write timeout on the underlying stream.
    pub fn set_write_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.inner.set_write_timeout(timeout).map_err(Into::into)
    }

    /// Try to clone this stream (creates a new file descriptor).
    pub fn try_clone(&self) -> Result<Self> {
        Ok(Self::from_unix(self.inner.try_clone()?))
    }

    /// Ask the kernel to attach sender credentials to received messages.
    pub fn set_pass_credentials(&self, enabled: bool) -> Result<()> {
        set_pass_credentials(&self.inner, enabled)
    }

    /// Credentials of the connected peer, captured at connect time (Linux `SO_PEERCRED`).
    #[cfg(target_os = "linux")]
    pub fn peer_credentials(&self) -> Option<Credentials> {
        let mut cred = libc::ucred {
            pid: 0,
            uid: 0,
            gid: 0,
        };
        let mut len = std::mem::size_of::<libc::ucred>() as libc::socklen_t;

        // SAFETY: `cred` and `len` are valid writable pointers for the provided sizes,
        // and the descriptor is an open Unix socket owned by this stream.
        let rc = unsafe {
            libc::getsockopt(
                self.inner.as_raw_fd(),
                libc::SOL_SOCKET,
                libc::SO_PEERCRED,
                (&mut cred as *mut libc::ucred).cast::<libc::c_void>(),
                &mut len,
            )
        };

        if rc == 0 && len as usize == std::mem::size_of::<libc::ucred>() {
            Some(Credentials::from_ucred(cred))
        } else {
            None
        }
    }

    /// Peer credentials are not exposed on this platform.
    #[cfg(not(target_os = "linux"))]
    pub fn peer_credentials(&self) -> Option<Credentials> {
        None
    }
}

impl Read for IpcStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Write for IpcStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

impl AsFd for IpcStream {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.inner.as_fd()
    }
}

impl AsRawFd for IpcStream {
    fn as_raw_fd(&self) -> RawFd {
        self.inner.as_raw_fd()
    }
}

impl From<IpcStream> for OwnedFd {
    fn from(stream: IpcStream) -> Self {
        stream.inner.into()
    }
}

impl From<OwnedFd> for IpcStream {
    fn from(fd: OwnedFd) -> Self {
        Self::from_unix(UnixStream::from(fd))
    }
}

impl std::fmt::Debug for IpcStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IpcStream")
            .field("fd", &self.inner.as_raw_fd())
            .finish()
    }
}
