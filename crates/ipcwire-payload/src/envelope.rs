//! Request and response envelopes.
//!
//! Both are generic over the handle type: `FileHandle` when descriptors are
//! moved with the message, `i32` when only the raw references are wanted.

use ipcwire_transport::Credentials;

use crate::error::{PayloadError, Result};
use crate::wire_struct;

/// Size of the inline impulse slot in a request.
pub const IMPULSE_PAYLOAD_SIZE: usize = 32;

/// One channel endpoint carried in an envelope.
#[derive(Debug, Default)]
pub struct ChannelInfo<H> {
    pub data_fd: H,
    pub event_fd: H,
}

wire_struct! {
    ChannelInfo<H> { data_fd, event_fd }
}

#[derive(Debug)]
pub struct RequestHeader<H> {
    pub op: i32,
    /// Sender identity; carried as socket ancillary data, not in the body.
    pub cred: Option<Credentials>,
    pub send_len: u32,
    pub max_recv_len: u32,
    pub file_descriptors: Vec<H>,
    pub channels: Vec<ChannelInfo<H>>,
    pub impulse_payload: [u8; IMPULSE_PAYLOAD_SIZE],
    pub is_impulse: bool,
}

wire_struct! {
    RequestHeader<H> {
        op,
        send_len,
        max_recv_len,
        file_descriptors,
        channels,
        impulse_payload,
        is_impulse,
    }
    credentials: cred
}

impl<H> Default for RequestHeader<H> {
    fn default() -> Self {
        Self {
            op: 0,
            cred: None,
            send_len: 0,
            max_recv_len: 0,
            file_descriptors: Vec::new(),
            channels: Vec::new(),
            impulse_payload: [0; IMPULSE_PAYLOAD_SIZE],
            is_impulse: false,
        }
    }
}

impl<H> RequestHeader<H> {
    /// Copy `body` into the inline slot and mark the request as an impulse.
    pub fn set_impulse_body(&mut self, body: &[u8]) -> Result<()> {
        if body.len() > IMPULSE_PAYLOAD_SIZE {
            return Err(PayloadError::ImpulseTooLarge {
                size: body.len(),
                max: IMPULSE_PAYLOAD_SIZE,
            });
        }
        self.impulse_payload = [0; IMPULSE_PAYLOAD_SIZE];
        self.impulse_payload[..body.len()].copy_from_slice(body);
        self.send_len = body.len() as u32;
        self.is_impulse = true;
        Ok(())
    }

    /// The inline body, or `None` if this is not an impulse request.
    pub fn impulse_body(&self) -> Result<Option<&[u8]>> {
        if !self.is_impulse {
            return Ok(None);
        }
        let len = self.send_len as usize;
        if len > IMPULSE_PAYLOAD_SIZE {
            return Err(PayloadError::ImpulseTooLarge {
                size: len,
                max: IMPULSE_PAYLOAD_SIZE,
            });
        }
        Ok(Some(&self.impulse_payload[..len]))
    }
}

#[derive(Debug)]
pub struct ResponseHeader<H> {
    pub ret_code: i32,
    pub recv_len: u32,
    pub file_descriptors: Vec<H>,
    pub channels: Vec<ChannelInfo<H>>,
}

wire_struct! {
    ResponseHeader<H> { ret_code, recv_len, file_descriptors, channels }
}

impl<H> Default for ResponseHeader<H> {
    fn default() -> Self {
        Self {
            ret_code: 0,
            recv_len: 0,
            file_descriptors: Vec::new(),
            channels: Vec::new(),
        }
    }
}

/// Fill the scalar fields of a request and stamp it with our credentials.
///
/// Descriptor and channel lists are left for the caller.
pub fn init_request<H>(
    header: &mut RequestHeader<H>,
    op: i32,
    send_len: u32,
    max_recv_len: u32,
    is_impulse: bool,
) -> Result<()> {
    if is_impulse && send_len as usize > IMPULSE_PAYLOAD_SIZE {
        return Err(PayloadError::ImpulseTooLarge {
            size: send_len as usize,
            max: IMPULSE_PAYLOAD_SIZE,
        });
    }
    header.op = op;
    header.cred = Some(Credentials::current());
    header.send_len = send_len;
    header.max_recv_len = max_recv_len;
    header.is_impulse = is_impulse;
    Ok(())
}
