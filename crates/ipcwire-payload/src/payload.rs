use std::io::{IoSlice, IoSliceMut};
use std::os::fd::{AsFd, OwnedFd, RawFd};

use bytes::{Buf, BufMut, BytesMut};
use ipcwire_transport::{
    recv_msg, send_msg, ChannelHandle, Credentials, FileHandle, TransportError,
    MAX_FDS_PER_MESSAGE,
};
use tracing::debug;

use crate::buffer::ByteBuffer;
use crate::error::{DecodeError, PayloadError, Result};
use crate::mapper::{
    remote_reference, ChannelReference, FileReference, InputResourceMapper, OutputResourceMapper,
};
use crate::wire::{MessageReader, MessageWriter};

/// Preamble: magic (4) + body length (4) = 8 bytes.
pub const PREAMBLE_SIZE: usize = 8;

/// Preamble magic, little-endian on the wire.
pub const PREAMBLE_MAGIC: u32 = 0x7564_736d;

/// Default maximum body size accepted on receive: 16 MiB.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Limits applied when receiving a payload.
#[derive(Debug, Clone)]
pub struct PayloadConfig {
    /// Largest body accepted. Default: 16 MiB.
    pub max_message_size: usize,
    /// Descriptors accepted per message; more truncates the control data
    /// and fails the receive. Default: 253.
    pub max_file_descriptors: usize,
}

impl Default for PayloadConfig {
    fn default() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            max_file_descriptors: MAX_FDS_PER_MESSAGE,
        }
    }
}

/// An outgoing message: body bytes plus the descriptors they reference.
///
/// Pushed descriptors are recorded by number only. The handles they came
/// from stay with the caller, who closes them whether or not the send
/// succeeds.
#[derive(Debug, Default)]
pub struct SendPayload {
    buffer: ByteBuffer,
    fds: Vec<RawFd>,
}

impl SendPayload {
    pub fn new() -> Self {
        Self {
            buffer: ByteBuffer::new(),
            fds: Vec::new(),
        }
    }

    /// Body bytes written so far.
    pub fn data(&self) -> &[u8] {
        self.buffer.data()
    }

    /// Descriptors queued for transfer, in reference order.
    pub fn file_descriptors(&self) -> &[RawFd] {
        &self.fds
    }

    /// Write preamble, body and descriptors to `socket`.
    pub fn send<S: AsFd + ?Sized>(&self, socket: &S) -> Result<()> {
        self.send_with_credentials(socket, None)
    }

    /// [`send`](Self::send), also attaching `credentials` as `SCM_CREDENTIALS`.
    pub fn send_with_credentials<S: AsFd + ?Sized>(
        &self,
        socket: &S,
        credentials: Option<&Credentials>,
    ) -> Result<()> {
        let size = self.buffer.len();
        let data_size = u32::try_from(size).map_err(|_| PayloadError::MessageTooLarge {
            size,
            max: u32::MAX as usize,
        })?;

        let mut preamble = BytesMut::with_capacity(PREAMBLE_SIZE);
        preamble.put_u32_le(PREAMBLE_MAGIC);
        preamble.put_u32_le(data_size);

        send_msg(
            socket,
            &[IoSlice::new(&preamble), IoSlice::new(self.buffer.data())],
            &self.fds,
            credentials,
        )?;

        debug!(
            bytes = size,
            fds = self.fds.len(),
            credentials = credentials.is_some(),
            "payload sent"
        );
        Ok(())
    }
}

impl MessageWriter for SendPayload {
    fn reserve(&mut self, size: usize) -> &mut [u8] {
        self.buffer.reserve(size)
    }

    fn output_mapper(&mut self) -> &mut dyn OutputResourceMapper {
        self
    }
}

impl OutputResourceMapper for SendPayload {
    fn push_file_handle(&mut self, handle: &FileHandle) -> FileReference {
        match handle {
            FileHandle::Local(_) | FileHandle::Borrowed(_) => {
                let reference = self.fds.len() as FileReference;
                self.fds.extend(handle.transferable_fd());
                reference
            }
            FileHandle::Remote(id) => remote_reference(*id).unwrap_or(*id),
        }
    }

    fn push_channel_handle(&mut self, handle: &ChannelHandle) -> ChannelReference {
        if let ChannelHandle::Remote(id) = handle {
            return remote_reference(*id).unwrap_or(*id);
        }
        let reference = self.fds.len() as ChannelReference;
        if let Some((data, event)) = handle.transferable_fds() {
            self.fds.push(data);
            self.fds.push(event);
        }
        reference
    }
}

/// An incoming message: body bytes plus the descriptors that arrived with it.
///
/// Descriptors are owned here until retrieved through the
/// [`InputResourceMapper`]; whatever is still held on drop is closed.
#[derive(Debug, Default)]
pub struct ReceivePayload {
    config: PayloadConfig,
    body: BytesMut,
    pos: usize,
    fds: Vec<Option<OwnedFd>>,
    credentials: Option<Credentials>,
}

impl ReceivePayload {
    pub fn new() -> Self {
        Self::with_config(PayloadConfig::default())
    }

    pub fn with_config(config: PayloadConfig) -> Self {
        Self {
            config,
            body: BytesMut::new(),
            pos: 0,
            fds: Vec::new(),
            credentials: None,
        }
    }

    /// Read one message from `socket`, replacing anything held before.
    ///
    /// Blocks until the preamble and the full body have arrived.
    pub fn receive<S: AsFd + ?Sized>(&mut self, socket: &S) -> Result<()> {
        self.reset();

        let mut preamble = [0u8; PREAMBLE_SIZE];
        let head = recv_msg(
            socket,
            &mut [IoSliceMut::new(&mut preamble)],
            self.config.max_file_descriptors,
        )?;
        self.fds.extend(head.fds.into_iter().map(Some));
        self.credentials = head.credentials;

        let mut header = &preamble[..];
        let magic = header.get_u32_le();
        let size = header.get_u32_le() as usize;
        if magic != PREAMBLE_MAGIC {
            return Err(PayloadError::InvalidPreamble { magic });
        }
        if size > self.config.max_message_size {
            return Err(PayloadError::MessageTooLarge {
                size,
                max: self.config.max_message_size,
            });
        }

        self.body.resize(size, 0);
        if size > 0 {
            let rest = recv_msg(
                socket,
                &mut [IoSliceMut::new(&mut self.body)],
                self.config.max_file_descriptors,
            )
            .map_err(|err| match err {
                TransportError::Shutdown => TransportError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!("peer closed before {size}-byte body"),
                )),
                other => other,
            })?;
            self.fds.extend(rest.fds.into_iter().map(Some));
            if self.credentials.is_none() {
                self.credentials = rest.credentials;
            }
        }

        debug!(
            bytes = size,
            fds = self.fds.len(),
            credentials = self.credentials.is_some(),
            "payload received"
        );
        Ok(())
    }

    /// Sender credentials delivered with the message, if the socket passes them.
    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    /// The whole body, independent of how much has been consumed.
    pub fn data(&self) -> &[u8] {
        &self.body
    }

    /// Descriptors received and not yet retrieved.
    pub fn pending_file_descriptors(&self) -> usize {
        self.fds.iter().filter(|fd| fd.is_some()).count()
    }

    /// Check that decoding consumed the entire body.
    pub fn finish(&self) -> std::result::Result<(), DecodeError> {
        match self.body.len() - self.pos {
            0 => Ok(()),
            trailing => Err(DecodeError::TrailingBytes(trailing)),
        }
    }

    fn reset(&mut self) {
        self.close_unretrieved();
        self.body.clear();
        self.pos = 0;
        self.credentials = None;
    }

    fn close_unretrieved(&mut self) {
        let pending = self.pending_file_descriptors();
        if pending > 0 {
            debug!(pending, "closing unretrieved descriptors");
        }
        self.fds.clear();
    }
}

impl Drop for ReceivePayload {
    fn drop(&mut self) {
        self.close_unretrieved();
    }
}

impl MessageReader for ReceivePayload {
    fn next_read_section(&self) -> &[u8] {
        &self.body[self.pos..]
    }

    fn consume(&mut self, count: usize) {
        self.pos = (self.pos + count).min(self.body.len());
    }

    fn input_mapper(&mut self) -> &mut dyn InputResourceMapper {
        self
    }
}

impl InputResourceMapper for ReceivePayload {
    fn get_file_handle(&mut self, reference: FileReference) -> Option<OwnedFd> {
        let index = usize::try_from(reference).ok()?;
        self.fds.get_mut(index)?.take()
    }

    fn get_channel_handle(&mut self, reference: ChannelReference) -> Option<ChannelHandle> {
        let data = usize::try_from(reference).ok()?;
        let event = data.checked_add(1)?;
        let both_present = matches!(
            (self.fds.get(data), self.fds.get(event)),
            (Some(Some(_)), Some(Some(_)))
        );
        if !both_present {
            return None;
        }
        Some(ChannelHandle::Local {
            data: self.fds[data].take()?,
            event: self.fds[event].take()?,
        })
    }
}
