//! Unix socket transport with descriptor and credential passing.
//!
//! This is the lowest layer of ipcwire. It owns every system call the codec
//! makes: `sendmsg`/`recvmsg` with `SCM_RIGHTS` and `SCM_CREDENTIALS`
//! control data, connect and accept on filesystem endpoints, and the
//! interrupt-retry wrapper applied to all of them.
//!
//! Handle types live here too, since their ownership rules are what the
//! ancillary-data layer has to get right.

#![cfg(unix)]

pub mod ancillary;
pub mod credentials;
pub mod endpoint;
pub mod error;
pub mod handle;
pub mod msg;
pub mod retry;
pub mod stream;
pub mod uds;

pub use ancillary::MAX_FDS_PER_MESSAGE;
pub use credentials::Credentials;
pub use endpoint::{wait_for_endpoint, wait_for_endpoint_with_config, EndpointWaitConfig};
pub use error::{Result, TransportError};
pub use handle::{ChannelHandle, FileHandle};
pub use msg::{recv_msg, send_msg, set_pass_credentials, ReceivedMessage};
pub use retry::{retry_eintr, retry_while};
pub use stream::IpcStream;
pub use uds::{EndpointListener, DEFAULT_SOCKET_MODE};
