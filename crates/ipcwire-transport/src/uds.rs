use std::os::unix::fs::{FileTypeExt, MetadataExt, PermissionsExt};
use std::os::unix::net::UnixListener;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::retry::retry_eintr;
use crate::stream::IpcStream;

/// Default permission mode for created socket paths.
pub const DEFAULT_SOCKET_MODE: u32 = 0o600;

/// Maximum socket path length (`sockaddr_un.sun_path`).
#[cfg(target_os = "linux")]
const MAX_PATH_LEN: usize = 108;
#[cfg(not(target_os = "linux"))]
const MAX_PATH_LEN: usize = 104;

/// A listening filesystem endpoint that clients reach with [`IpcStream::connect`]
/// or [`crate::wait_for_endpoint`].
///
/// The socket file is removed on drop, but only if the path still refers to
/// the inode this listener created.
pub struct EndpointListener {
    listener: UnixListener,
    path: PathBuf,
    created_inode: (u64, u64),
    pass_credentials: bool,
}

impl EndpointListener {
    /// Bind with [`DEFAULT_SOCKET_MODE`].
    ///
    /// A stale socket at `path` is replaced; any other kind of file is left
    /// alone and the bind fails.
    pub fn bind(path: impl AsRef<Path>) -> Result<Self> {
        Self::bind_with_mode(path, DEFAULT_SOCKET_MODE)
    }

    pub fn bind_with_mode(path: impl AsRef<Path>, mode: u32) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let len = path.as_os_str().len();
        if len >= MAX_PATH_LEN {
            return Err(TransportError::PathTooLong {
                path,
                len,
                max: MAX_PATH_LEN,
            });
        }

        let bind_err = |source: std::io::Error| TransportError::Bind {
            path: path.clone(),
            source,
        };

        match std::fs::symlink_metadata(&path) {
            Ok(metadata) if metadata.file_type().is_socket() => {
                debug!(?path, "removing stale socket");
                std::fs::remove_file(&path).map_err(bind_err)?;
            }
            Ok(_) => {
                return Err(bind_err(std::io::Error::new(
                    std::io::ErrorKind::AlreadyExists,
                    "existing path is not a unix socket",
                )));
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(bind_err(err)),
        }

        let listener = UnixListener::bind(&path).map_err(bind_err)?;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode))
            .map_err(bind_err)?;
        let created = std::fs::symlink_metadata(&path).map_err(bind_err)?;

        info!(?path, mode = %format!("{mode:o}"), "listening on endpoint");

        Ok(Self {
            listener,
            path,
            created_inode: (created.dev(), created.ino()),
            pass_credentials: false,
        })
    }

    /// Enable `SO_PASSCRED` on every accepted stream.
    pub fn with_pass_credentials(mut self, enabled: bool) -> Self {
        self.pass_credentials = enabled;
        self
    }

    /// Accept an incoming connection (blocking).
    pub fn accept(&self) -> Result<IpcStream> {
        let (stream, _addr) =
            retry_eintr(|| self.listener.accept()).map_err(TransportError::Accept)?;
        let stream = IpcStream::from_unix(stream);
        if self.pass_credentials {
            stream.set_pass_credentials(true)?;
        }
        debug!(path = ?self.path, "accepted connection");
        Ok(stream)
    }

    /// The path this endpoint is bound to.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for EndpointListener {
    fn drop(&mut self) {
        let Ok(metadata) = std::fs::symlink_metadata(&self.path) else {
            return;
        };
        if metadata.file_type().is_socket()
            && (metadata.dev(), metadata.ino()) == self.created_inode
        {
            debug!(path = ?self.path, "removing endpoint socket");
            let _ = std::fs::remove_file(&self.path);
        } else {
            debug!(path = ?self.path, "endpoint path replaced; leaving it");
        }
    }
}
