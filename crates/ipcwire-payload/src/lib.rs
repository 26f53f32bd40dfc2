//! Typed message payloads with out-of-band descriptor references.
//!
//! A message is a byte body plus a list of descriptors. Encoders write
//! scalars into the body and push handles into the descriptor list, getting
//! back a small integer reference to embed in the bytes. On the receiving
//! side the same references index into the descriptors the kernel delivered.
//!
//! Every payload message is framed by an 8-byte preamble:
//! - A 4-byte little-endian magic (`0x7564736d`)
//! - A 4-byte little-endian body length
//!
//! Descriptors and credentials ride on the preamble's `sendmsg`.

#![cfg(unix)]

pub mod buffer;
pub mod envelope;
pub mod error;
pub mod io;
pub mod mapper;
pub mod payload;
pub mod wire;

pub use buffer::ByteBuffer;
pub use envelope::{init_request, ChannelInfo, RequestHeader, ResponseHeader, IMPULSE_PAYLOAD_SIZE};
pub use error::{DecodeError, PayloadError, Result};
pub use io::{
    count_vector_size, receive_bytes, receive_data, receive_data_with_config,
    receive_request_body, receive_vectored, send_bytes, send_data, send_request, send_vectored,
};
pub use ipcwire_transport::Credentials;
pub use mapper::{
    remote_id, remote_reference, ChannelReference, FileReference, InputResourceMapper,
    OutputResourceMapper,
};
pub use payload::{
    PayloadConfig, ReceivePayload, SendPayload, DEFAULT_MAX_MESSAGE_SIZE, PREAMBLE_MAGIC,
    PREAMBLE_SIZE,
};
pub use wire::{MessageReader, MessageWriter, WireDecode, WireEncode};
