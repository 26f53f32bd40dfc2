//! One-call send and receive entry points.

use std::io::{IoSlice, IoSliceMut};
use std::os::fd::AsFd;

use ipcwire_transport::{recv_msg, send_msg};
use tracing::trace;

use crate::envelope::{RequestHeader, IMPULSE_PAYLOAD_SIZE};
use crate::error::{PayloadError, Result};
use crate::payload::{PayloadConfig, ReceivePayload, SendPayload};
use crate::wire::{WireDecode, WireEncode};

/// Encode `value` into a fresh payload and send it.
///
/// Credentials reported by [`WireEncode::credentials`] go out as ancillary data.
pub fn send_data<T: WireEncode + ?Sized>(socket: &(impl AsFd + ?Sized), value: &T) -> Result<()> {
    let mut payload = SendPayload::new();
    value.encode(&mut payload)?;
    payload.send_with_credentials(socket, value.credentials())
}

/// Receive one payload and decode it as `T`.
///
/// Fails with [`PayloadError::Decode`] if the body does not decode or has
/// bytes left over. Descriptors the decoder did not claim are closed.
pub fn receive_data<T: WireDecode>(socket: &(impl AsFd + ?Sized)) -> Result<T> {
    receive_data_with_config(socket, PayloadConfig::default())
}

pub fn receive_data_with_config<T: WireDecode>(
    socket: &(impl AsFd + ?Sized),
    config: PayloadConfig,
) -> Result<T> {
    let mut payload = ReceivePayload::with_config(config);
    payload.receive(socket)?;
    let mut value = T::decode(&mut payload)?;
    payload.finish()?;
    value.accept_credentials(payload.credentials().copied());
    Ok(value)
}

/// Send `bytes` exactly, with no preamble and no descriptors.
pub fn send_bytes(socket: &(impl AsFd + ?Sized), bytes: &[u8]) -> Result<()> {
    send_vectored(socket, &[IoSlice::new(bytes)]).map(|_| ())
}

/// Send every byte of `bufs` in order, with no preamble and no descriptors.
pub fn send_vectored(socket: &(impl AsFd + ?Sized), bufs: &[IoSlice<'_>]) -> Result<usize> {
    let sent = send_msg(socket, bufs, &[], None)?;
    trace!(bytes = sent, "raw bytes sent");
    Ok(sent)
}

/// Fill `buf` exactly from the socket.
pub fn receive_bytes(socket: &(impl AsFd + ?Sized), buf: &mut [u8]) -> Result<()> {
    receive_vectored(socket, &mut [IoSliceMut::new(buf)]).map(|_| ())
}

/// Fill every buffer in `bufs` exactly, in order.
pub fn receive_vectored(
    socket: &(impl AsFd + ?Sized),
    bufs: &mut [IoSliceMut<'_>],
) -> Result<usize> {
    let message = recv_msg(socket, bufs, 0)?;
    trace!(bytes = message.len, "raw bytes received");
    Ok(message.len)
}

/// Total length of a scatter/gather list.
pub fn count_vector_size(bufs: &[IoSlice<'_>]) -> usize {
    bufs.iter().map(|buf| buf.len()).sum()
}

/// Send a request header and its body.
///
/// `send_len` is set from `body`. An impulse request carries the body in its
/// inline slot and nothing else is written; otherwise the body follows the
/// header as raw bytes.
pub fn send_request<H: WireEncode>(
    socket: &(impl AsFd + ?Sized),
    header: &mut RequestHeader<H>,
    body: &[IoSlice<'_>],
) -> Result<()> {
    let size = count_vector_size(body);

    if header.is_impulse {
        if size > IMPULSE_PAYLOAD_SIZE {
            return Err(PayloadError::ImpulseTooLarge {
                size,
                max: IMPULSE_PAYLOAD_SIZE,
            });
        }
        let mut inline = [0u8; IMPULSE_PAYLOAD_SIZE];
        let mut offset = 0;
        for buf in body {
            inline[offset..offset + buf.len()].copy_from_slice(buf);
            offset += buf.len();
        }
        header.set_impulse_body(&inline[..size])?;
        return send_data(socket, &*header);
    }

    header.send_len = u32::try_from(size).map_err(|_| PayloadError::MessageTooLarge {
        size,
        max: u32::MAX as usize,
    })?;
    send_data(socket, &*header)?;
    if size > 0 {
        send_vectored(socket, body)?;
    }
    Ok(())
}

/// Read the body announced by `header` into `buf`, returning its length.
///
/// Impulse bodies are copied from the header's inline slot and the socket
/// is not touched.
pub fn receive_request_body<H>(
    socket: &(impl AsFd + ?Sized),
    header: &RequestHeader<H>,
    buf: &mut [u8],
) -> Result<usize> {
    let len = header.send_len as usize;
    if len > buf.len() {
        return Err(PayloadError::MessageTooLarge {
            size: len,
            max: buf.len(),
        });
    }

    if let Some(inline) = header.impulse_body()? {
        buf[..len].copy_from_slice(inline);
        return Ok(len);
    }

    receive_bytes(socket, &mut buf[..len])?;
    Ok(len)
}

#[cfg(test)]
mod tests {
    use std::fs::File;
    use std::io::{ErrorKind, Read};
    use std::os::fd::{AsRawFd, OwnedFd};
    use std::os::unix::fs::MetadataExt;
    use std::os::unix::net::UnixStream;

    use ipcwire_transport::{ChannelHandle, Credentials, FileHandle, TransportError};

    use super::*;
    use crate::envelope::{init_request, ChannelInfo, ResponseHeader};
    use crate::error::DecodeError;

    fn identity(fd: &impl AsFd) -> (u64, u64) {
        let file = File::from(fd.as_fd().try_clone_to_owned().unwrap());
        let meta = file.metadata().unwrap();
        (meta.dev(), meta.ino())
    }

    fn assert_nothing_pending(socket: &UnixStream) {
        socket.set_nonblocking(true).unwrap();
        let mut byte = [0u8; 1];
        let err = (&*socket).read(&mut byte).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::WouldBlock);
        socket.set_nonblocking(false).unwrap();
    }

    #[test]
    fn request_with_handles_round_trips() {
        let (left, right) = UnixStream::pair().unwrap();
        let (file_a, _a_peer) = UnixStream::pair().unwrap();
        let (data, event) = UnixStream::pair().unwrap();
        let ids = (identity(&file_a), identity(&data), identity(&event));
        let file_a_raw = file_a.as_raw_fd();

        let mut header = RequestHeader::<FileHandle> {
            file_descriptors: vec![FileHandle::Local(OwnedFd::from(file_a)), FileHandle::Remote(12)],
            channels: vec![ChannelInfo {
                data_fd: FileHandle::Borrowed(data.as_raw_fd()),
                event_fd: FileHandle::Borrowed(event.as_raw_fd()),
            }],
            ..Default::default()
        };
        init_request(&mut header, 3, 0, 64, false).unwrap();
        send_data(&left, &header).unwrap();

        // The sender still owns its Local descriptor after the send.
        assert_eq!(header.file_descriptors[0].transferable_fd(), Some(file_a_raw));

        let decoded: RequestHeader<FileHandle> = receive_data(&right).unwrap();
        assert_eq!(decoded.op, 3);
        assert_eq!(decoded.max_recv_len, 64);

        let fd0 = match &decoded.file_descriptors[0] {
            FileHandle::Local(fd) => fd,
            other => panic!("expected local handle, got {other:?}"),
        };
        assert_eq!(identity(fd0), ids.0);
        assert!(matches!(decoded.file_descriptors[1], FileHandle::Remote(12)));

        let channel = &decoded.channels[0];
        match (&channel.data_fd, &channel.event_fd) {
            (FileHandle::Local(d), FileHandle::Local(e)) => {
                assert_eq!(identity(d), ids.1);
                assert_eq!(identity(e), ids.2);
            }
            other => panic!("expected local pair, got {other:?}"),
        }
    }

    #[test]
    fn channel_handles_round_trip() {
        struct Open {
            channel: ChannelHandle,
        }
        crate::wire_struct! { Open { channel } }

        let (left, right) = UnixStream::pair().unwrap();
        let (data, event) = UnixStream::pair().unwrap();
        let expected = (identity(&data), identity(&event));

        let message = Open {
            channel: ChannelHandle::Local {
                data: data.into(),
                event: event.into(),
            },
        };
        send_data(&left, &message).unwrap();

        let decoded: Open = receive_data(&right).unwrap();
        match decoded.channel {
            ChannelHandle::Local { data, event } => {
                assert_eq!((identity(&data), identity(&event)), expected);
            }
            _ => panic!("expected local channel"),
        }
    }

    #[test]
    fn empty_tables_round_trip() {
        let (left, right) = UnixStream::pair().unwrap();
        let response = ResponseHeader::<FileHandle> {
            ret_code: 0,
            recv_len: 0,
            ..Default::default()
        };
        send_data(&left, &response).unwrap();

        let decoded: ResponseHeader<FileHandle> = receive_data(&right).unwrap();
        assert!(decoded.file_descriptors.is_empty());
        assert!(decoded.channels.is_empty());
    }

    #[test]
    fn impulse_needs_no_second_transfer() {
        let (left, right) = UnixStream::pair().unwrap();
        let mut header = RequestHeader::<i32>::default();
        init_request(&mut header, 9, 5, 0, true).unwrap();
        send_request(
            &left,
            &mut header,
            &[IoSlice::new(b"he"), IoSlice::new(b"llo")],
        )
        .unwrap();

        let decoded: RequestHeader<i32> = receive_data(&right).unwrap();
        assert!(decoded.is_impulse);
        assert_nothing_pending(&right);

        let mut body = [0u8; 64];
        let len = receive_request_body(&right, &decoded, &mut body).unwrap();
        assert_eq!(&body[..len], b"hello");
    }

    #[test]
    fn impulse_body_over_limit_is_rejected_unsent() {
        let (left, right) = UnixStream::pair().unwrap();
        let mut header = RequestHeader::<i32>::default();
        init_request(&mut header, 9, 0, 0, true).unwrap();

        let body = [7u8; IMPULSE_PAYLOAD_SIZE + 1];
        let err = send_request(&left, &mut header, &[IoSlice::new(&body)]).unwrap_err();
        assert!(matches!(err, PayloadError::ImpulseTooLarge { size: 33, max: 32 }));
        assert_nothing_pending(&right);
    }

    #[test]
    fn impulse_at_limit_is_accepted() {
        let (left, right) = UnixStream::pair().unwrap();
        let mut header = RequestHeader::<i32>::default();
        init_request(&mut header, 9, 0, 0, true).unwrap();

        let body = [7u8; IMPULSE_PAYLOAD_SIZE];
        send_request(&left, &mut header, &[IoSlice::new(&body)]).unwrap();

        let decoded: RequestHeader<i32> = receive_data(&right).unwrap();
        let mut out = [0u8; IMPULSE_PAYLOAD_SIZE];
        assert_eq!(receive_request_body(&right, &decoded, &mut out).unwrap(), 32);
        assert_eq!(out, body);
    }

    #[test]
    fn regular_request_body_follows_header() {
        let (left, right) = UnixStream::pair().unwrap();
        let mut header = RequestHeader::<i32>::default();
        init_request(&mut header, 1, 0, 0, false).unwrap();
        let body = vec![0xA5u8; 1000];
        send_request(&left, &mut header, &[IoSlice::new(&body)]).unwrap();
        send_bytes(&left, b"next").unwrap();

        let decoded: RequestHeader<i32> = receive_data(&right).unwrap();
        assert_eq!(decoded.send_len, 1000);

        let mut buf = vec![0u8; 2048];
        let len = receive_request_body(&right, &decoded, &mut buf).unwrap();
        assert_eq!(&buf[..len], body.as_slice());

        let mut next = [0u8; 4];
        receive_bytes(&right, &mut next).unwrap();
        assert_eq!(&next, b"next");
    }

    #[test]
    fn request_body_larger_than_buffer_is_rejected() {
        let (_left, right) = UnixStream::pair().unwrap();
        let header = RequestHeader::<i32> {
            send_len: 10,
            ..Default::default()
        };
        let mut buf = [0u8; 4];
        let err = receive_request_body(&right, &header, &mut buf).unwrap_err();
        assert!(matches!(err, PayloadError::MessageTooLarge { size: 10, max: 4 }));
    }

    #[test]
    fn undecodable_body_is_eio() {
        let (left, right) = UnixStream::pair().unwrap();
        send_data(&left, &[1u8, 2, 3]).unwrap();

        let err = receive_data::<ResponseHeader<i32>>(&right).unwrap_err();
        assert!(matches!(
            err,
            PayloadError::Decode(DecodeError::Truncated { .. })
        ));
        assert_eq!(err.os_error_code(), libc::EIO);
    }

    #[test]
    fn leftover_bytes_fail_decode() {
        let (left, right) = UnixStream::pair().unwrap();
        send_data(&left, &7u32).unwrap();

        let err = receive_data::<u8>(&right).unwrap_err();
        assert!(matches!(
            err,
            PayloadError::Decode(DecodeError::TrailingBytes(3))
        ));
    }

    #[test]
    fn closed_peer_is_transport_error() {
        let (left, right) = UnixStream::pair().unwrap();
        drop(left);
        let err = receive_data::<u32>(&right).unwrap_err();
        assert!(matches!(
            err,
            PayloadError::Transport(TransportError::Shutdown)
        ));
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn request_credentials_travel_out_of_band() {
        let (left, right) = UnixStream::pair().unwrap();
        ipcwire_transport::set_pass_credentials(&right, true).unwrap();

        let mut header = RequestHeader::<i32>::default();
        init_request(&mut header, 1, 0, 0, false).unwrap();
        send_data(&left, &header).unwrap();

        let decoded: RequestHeader<i32> = receive_data(&right).unwrap();
        assert_eq!(decoded.cred, Some(Credentials::current()));
    }

    #[test]
    fn vectored_transfer_is_exact() {
        let (left, right) = UnixStream::pair().unwrap();
        let parts = [IoSlice::new(b"ab"), IoSlice::new(b""), IoSlice::new(b"cde")];
        assert_eq!(count_vector_size(&parts), 5);
        assert_eq!(send_vectored(&left, &parts).unwrap(), 5);

        let mut first = [0u8; 3];
        let mut second = [0u8; 2];
        let got = receive_vectored(
            &right,
            &mut [IoSliceMut::new(&mut first), IoSliceMut::new(&mut second)],
        )
        .unwrap();
        assert_eq!(got, 5);
        assert_eq!((&first, &second), (b"abc", b"de"));
    }
}
