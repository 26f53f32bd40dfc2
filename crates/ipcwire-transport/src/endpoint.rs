//! Connect-with-retry for clients that may start before their server.

use std::io::ErrorKind;
use std::path::Path;
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::error::{Result, TransportError};
use crate::stream::IpcStream;

/// Backoff schedule for [`wait_for_endpoint_with_config`].
#[derive(Debug, Clone)]
pub struct EndpointWaitConfig {
    /// Delay after the first failed attempt.
    pub initial_backoff: Duration,
    /// Cap for the doubling delay; also the worst-case overshoot past the deadline.
    pub max_backoff: Duration,
}

impl Default for EndpointWaitConfig {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(5),
            max_backoff: Duration::from_millis(50),
        }
    }
}

/// Connect to `path`, retrying while it does not exist or refuses connections.
pub fn wait_for_endpoint(path: impl AsRef<Path>, timeout: Duration) -> Result<IpcStream> {
    wait_for_endpoint_with_config(path, timeout, &EndpointWaitConfig::default())
}

/// [`wait_for_endpoint`] with an explicit backoff schedule.
///
/// `ENOENT` and `ECONNREFUSED` are retried until `timeout` elapses, which is
/// reported as [`TransportError::DeadlineExceeded`]. Any other failure is
/// returned immediately as [`TransportError::Connect`].
pub fn wait_for_endpoint_with_config(
    path: impl AsRef<Path>,
    timeout: Duration,
    config: &EndpointWaitConfig,
) -> Result<IpcStream> {
    let path = path.as_ref();
    if path.as_os_str().is_empty() {
        return Err(TransportError::Connect {
            path: path.to_path_buf(),
            source: std::io::Error::new(ErrorKind::InvalidInput, "empty endpoint path"),
        });
    }

    let deadline = Instant::now() + timeout;
    let mut backoff = config.initial_backoff;
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        match IpcStream::connect(path) {
            Ok(stream) => {
                debug!(?path, attempts, "endpoint available");
                return Ok(stream);
            }
            Err(TransportError::Connect { source, .. }) if is_not_ready(&source) => {
                let now = Instant::now();
                if now >= deadline {
                    debug!(?path, attempts, ?timeout, "endpoint wait timed out");
                    return Err(TransportError::DeadlineExceeded {
                        path: path.to_path_buf(),
                        timeout,
                    });
                }
                let delay = backoff.min(deadline - now);
                trace!(?path, attempts, ?delay, error = %source, "endpoint not ready");
                std::thread::sleep(delay);
                backoff = (backoff * 2).min(config.max_backoff);
            }
            Err(err) => return Err(err),
        }
    }
}

fn is_not_ready(err: &std::io::Error) -> bool {
    matches!(err.kind(), ErrorKind::NotFound | ErrorKind::ConnectionRefused)
}
