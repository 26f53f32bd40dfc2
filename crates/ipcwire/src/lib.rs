//! Typed messages with descriptor and credential passing over Unix sockets.
//!
//! ipcwire encodes request/response envelopes into byte streams and moves
//! open file descriptors, paired channel descriptors and sender credentials
//! alongside the bytes as socket ancillary data.
//!
//! # Crate Structure
//!
//! - [`transport`]: socket I/O with descriptor and credential passing
//! - [`payload`]: message encoding and the request/response envelopes

/// Re-export transport types.
pub mod transport {
    pub use ipcwire_transport::*;
}

/// Re-export payload types.
pub mod payload {
    pub use ipcwire_payload::*;
}

pub use ipcwire_payload::wire_struct;
