//! `sendmsg`/`recvmsg` loops with descriptor and credential transfer.
//!
//! Both directions move an exact byte count: short transfers are resumed
//! from where they stopped and `EINTR` is retried. Control data rides on the
//! first `sendmsg` only, so the kernel attaches it to the first byte of the
//! message and the receiver sees it with the first `recvmsg` that touches
//! that byte.

use std::io::{self, IoSlice, IoSliceMut};
use std::mem;
use std::os::fd::{AsFd, AsRawFd, OwnedFd, RawFd};

use tracing::trace;

use crate::ancillary::{parse_control, ControlBuffer, MAX_FDS_PER_MESSAGE};
use crate::credentials::Credentials;
use crate::error::{Result, TransportError};
use crate::retry::{cvt, retry_eintr};

#[cfg(target_os = "linux")]
const SEND_FLAGS: libc::c_int = libc::MSG_NOSIGNAL;
#[cfg(not(target_os = "linux"))]
const SEND_FLAGS: libc::c_int = 0;

#[cfg(target_os = "linux")]
const RECV_FLAGS: libc::c_int = libc::MSG_WAITALL | libc::MSG_CMSG_CLOEXEC;
#[cfg(not(target_os = "linux"))]
const RECV_FLAGS: libc::c_int = libc::MSG_WAITALL;

/// Everything one [`recv_msg`] call collected.
#[derive(Debug, Default)]
pub struct ReceivedMessage {
    /// Bytes written into the caller's buffers.
    pub len: usize,
    /// Descriptors delivered alongside the bytes, in kernel order.
    pub fds: Vec<OwnedFd>,
    /// Sender credentials, when the socket delivers them.
    pub credentials: Option<Credentials>,
}

/// Send every byte of `bufs`, attaching `fds` and `credentials` to the first byte.
///
/// The descriptors are only borrowed: the kernel duplicates them into the
/// message, and the caller stays responsible for closing its own copies.
pub fn send_msg<S: AsFd + ?Sized>(
    socket: &S,
    bufs: &[IoSlice<'_>],
    fds: &[RawFd],
    credentials: Option<&Credentials>,
) -> Result<usize> {
    if fds.len() > MAX_FDS_PER_MESSAGE {
        return Err(TransportError::TooManyDescriptors {
            count: fds.len(),
            max: MAX_FDS_PER_MESSAGE,
        });
    }

    let fd = socket.as_fd().as_raw_fd();
    let total: usize = bufs.iter().map(|buf| buf.len()).sum();
    let mut control = ControlBuffer::for_send(fds, credentials);
    if total == 0 {
        if control.len() == 0 {
            return Ok(0);
        }
        // A stream socket drops control data that has no byte to ride on.
        return Err(io::Error::from_raw_os_error(libc::EINVAL).into());
    }

    let mut slices = bufs.to_vec();
    let mut remaining: &mut [IoSlice<'_>] = &mut slices;
    IoSlice::advance_slices(&mut remaining, 0);

    let mut sent = 0usize;
    loop {
        // SAFETY: all-zero is a valid empty msghdr.
        let mut msg: libc::msghdr = unsafe { mem::zeroed() };
        // IoSlice is guaranteed ABI-compatible with iovec on Unix.
        msg.msg_iov = remaining.as_ptr() as *mut libc::iovec;
        msg.msg_iovlen = remaining.len() as _;
        if sent == 0 {
            msg.msg_control = control.as_mut_ptr();
            msg.msg_controllen = control.len() as _;
        }

        // SAFETY: msg points at live iovecs and control data for the
        // duration of the call.
        let n = retry_eintr(|| cvt(unsafe { libc::sendmsg(fd, &msg, SEND_FLAGS) }))?;
        if n == 0 && total > 0 {
            return Err(io::Error::new(io::ErrorKind::WriteZero, "sendmsg wrote 0 bytes").into());
        }

        sent += n;
        trace!(fd, sent, total, fds = fds.len(), "sendmsg");
        if sent >= total {
            return Ok(sent);
        }
        IoSlice::advance_slices(&mut remaining, n);
    }
}

/// Fill every byte of `bufs`, collecting up to `max_fds` descriptors and any credentials.
///
/// Returns [`TransportError::Shutdown`] if the peer closed before the first
/// byte, and `UnexpectedEof` if it closed part way through. The slices in
/// `bufs` are advanced in place as data arrives.
pub fn recv_msg<S: AsFd + ?Sized>(
    socket: &S,
    bufs: &mut [IoSliceMut<'_>],
    max_fds: usize,
) -> Result<ReceivedMessage> {
    let fd = socket.as_fd().as_raw_fd();
    let total: usize = bufs.iter().map(|buf| buf.len()).sum();
    let mut control = ControlBuffer::for_receive(max_fds);
    let mut message = ReceivedMessage::default();

    let mut remaining: &mut [IoSliceMut<'_>] = bufs;
    IoSliceMut::advance_slices(&mut remaining, 0);

    while message.len < total {
        // SAFETY: all-zero is a valid empty msghdr.
        let mut msg: libc::msghdr = unsafe { mem::zeroed() };
        // IoSliceMut is guaranteed ABI-compatible with iovec on Unix.
        msg.msg_iov = remaining.as_mut_ptr() as *mut libc::iovec;
        msg.msg_iovlen = remaining.len() as _;
        msg.msg_control = control.as_mut_ptr();
        msg.msg_controllen = control.len() as _;

        // SAFETY: msg points at live, writable iovecs and control storage.
        let n = retry_eintr(|| cvt(unsafe { libc::recvmsg(fd, &mut msg, RECV_FLAGS) }))?;

        parse_control(&msg, &mut message.fds, &mut message.credentials);
        if msg.msg_flags & libc::MSG_CTRUNC != 0 {
            // Whatever did arrive is dropped (and closed) with `message`.
            return Err(TransportError::ControlTruncated);
        }

        if n == 0 {
            if message.len == 0 {
                return Err(TransportError::Shutdown);
            }
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("peer closed after {} of {} bytes", message.len, total),
            )
            .into());
        }

        message.len += n;
        trace!(fd, received = message.len, total, fds = message.fds.len(), "recvmsg");
        IoSliceMut::advance_slices(&mut remaining, n);
    }

    Ok(message)
}

/// Ask the kernel to attach sender credentials to every message received on `socket`.
#[cfg(target_os = "linux")]
pub fn set_pass_credentials<S: AsFd + ?Sized>(socket: &S, enabled: bool) -> Result<()> {
    let fd = socket.as_fd().as_raw_fd();
    let value: libc::c_int = enabled.into();
    // SAFETY: `value` is a live c_int and the length matches it.
    retry_eintr(|| {
        crate::retry::cvt_int(unsafe {
            libc::setsockopt(
                fd,
                libc::SOL_SOCKET,
                libc::SO_PASSCRED,
                (&value as *const libc::c_int).cast::<libc::c_void>(),
                mem::size_of::<libc::c_int>() as libc::socklen_t,
            )
        })
    })?;
    Ok(())
}

/// Credential passing is only implemented for Linux `SO_PASSCRED`.
#[cfg(not(target_os = "linux"))]
pub fn set_pass_credentials<S: AsFd + ?Sized>(_socket: &S, _enabled: bool) -> Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "credential passing requires SO_PASSCRED (Linux)",
    )
    .into())
}

#[cfg(test)]
mod tests {
    use std::fs::File;
    use std::io::{Read, Write};
    use std::os::unix::fs::MetadataExt;
    use std::os::unix::net::UnixStream;

    use super::*;

    fn identity(fd: &impl AsFd) -> (u64, u64) {
        let file = File::from(fd.as_fd().try_clone_to_owned().unwrap());
        let meta = file.metadata().unwrap();
        (meta.dev(), meta.ino())
    }

    #[test]
    fn bytes_and_descriptors_arrive_together() {
        let (left, right) = UnixStream::pair().unwrap();
        let (p1, _p1_peer) = UnixStream::pair().unwrap();
        let (p2, _p2_peer) = UnixStream::pair().unwrap();

        let sent = send_msg(
            &left,
            &[IoSlice::new(b"head"), IoSlice::new(b"-tail")],
            &[p1.as_raw_fd(), p2.as_raw_fd()],
            None,
        )
        .unwrap();
        assert_eq!(sent, 9);

        let mut buf = [0u8; 9];
        let msg = recv_msg(&right, &mut [IoSliceMut::new(&mut buf)], MAX_FDS_PER_MESSAGE).unwrap();

        assert_eq!(msg.len, 9);
        assert_eq!(&buf, b"head-tail");
        assert_eq!(msg.fds.len(), 2);
        assert_eq!(identity(&msg.fds[0]), identity(&p1));
        assert_eq!(identity(&msg.fds[1]), identity(&p2));
    }

    #[test]
    fn receive_across_split_buffers() {
        let (left, right) = UnixStream::pair().unwrap();
        send_msg(&left, &[IoSlice::new(b"abcdef")], &[], None).unwrap();

        let mut first = [0u8; 2];
        let mut second = [0u8; 4];
        let msg = recv_msg(
            &right,
            &mut [IoSliceMut::new(&mut first), IoSliceMut::new(&mut second)],
            0,
        )
        .unwrap();

        assert_eq!(msg.len, 6);
        assert_eq!(&first, b"ab");
        assert_eq!(&second, b"cdef");
    }

    #[test]
    fn large_message_survives_short_writes() {
        let (left, mut right) = UnixStream::pair().unwrap();
        let payload = vec![0x5Au8; 4 * 1024 * 1024];

        let reader = std::thread::spawn(move || {
            let mut received = Vec::new();
            right.read_to_end(&mut received).unwrap();
            received
        });

        send_msg(&left, &[IoSlice::new(&payload)], &[], None).unwrap();
        drop(left);

        let received = reader.join().unwrap();
        assert_eq!(received.len(), payload.len());
        assert!(received.iter().all(|b| *b == 0x5A));
    }

    #[test]
    fn peer_close_before_data_is_shutdown() {
        let (left, right) = UnixStream::pair().unwrap();
        drop(left);

        let mut buf = [0u8; 4];
        let err = recv_msg(&right, &mut [IoSliceMut::new(&mut buf)], 0).unwrap_err();
        assert!(matches!(err, TransportError::Shutdown));
        assert_eq!(err.os_error_code(), libc::ESHUTDOWN);
    }

    #[test]
    fn peer_close_mid_message_is_unexpected_eof() {
        let (mut left, right) = UnixStream::pair().unwrap();
        left.write_all(b"ab").unwrap();
        drop(left);

        let mut buf = [0u8; 4];
        let err = recv_msg(&right, &mut [IoSliceMut::new(&mut buf)], 0).unwrap_err();
        assert!(
            matches!(&err, TransportError::Io(e) if e.kind() == io::ErrorKind::UnexpectedEof)
        );
    }

    #[test]
    fn too_many_descriptors_rejected_before_sending() {
        let (left, _right) = UnixStream::pair().unwrap();
        let fds = vec![left.as_raw_fd(); MAX_FDS_PER_MESSAGE + 1];

        let err = send_msg(&left, &[IoSlice::new(b"x")], &fds, None).unwrap_err();
        assert!(matches!(
            err,
            TransportError::TooManyDescriptors { count, max }
                if count == MAX_FDS_PER_MESSAGE + 1 && max == MAX_FDS_PER_MESSAGE
        ));
    }

    #[test]
    fn invalid_descriptor_is_os_error() {
        let (left, _right) = UnixStream::pair().unwrap();
        let err = send_msg(&left, &[IoSlice::new(b"x")], &[-1], None).unwrap_err();
        assert_eq!(err.os_error_code(), libc::EBADF);
    }

    #[test]
    fn surplus_descriptors_truncate_control() {
        let (left, right) = UnixStream::pair().unwrap();
        let (a, _a_peer) = UnixStream::pair().unwrap();
        let fds = vec![a.as_raw_fd(); 64];
        send_msg(&left, &[IoSlice::new(b"x")], &fds, None).unwrap();

        let mut buf = [0u8; 1];
        let err = recv_msg(&right, &mut [IoSliceMut::new(&mut buf)], 1).unwrap_err();
        assert!(matches!(err, TransportError::ControlTruncated));
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn credentials_delivered_when_enabled() {
        let (left, right) = UnixStream::pair().unwrap();
        set_pass_credentials(&right, true).unwrap();

        let cred = Credentials::current();
        send_msg(&left, &[IoSlice::new(b"c")], &[], Some(&cred)).unwrap();

        let mut buf = [0u8; 1];
        let msg = recv_msg(&right, &mut [IoSliceMut::new(&mut buf)], 0).unwrap();
        assert_eq!(msg.credentials, Some(cred));
    }

    #[test]
    fn empty_send_without_control_is_noop() {
        let (left, _right) = UnixStream::pair().unwrap();
        assert_eq!(send_msg(&left, &[], &[], None).unwrap(), 0);
    }

    #[test]
    fn descriptors_without_bytes_are_rejected() {
        let (left, right) = UnixStream::pair().unwrap();
        let (a, _a_peer) = UnixStream::pair().unwrap();

        let err = send_msg(&left, &[], &[a.as_raw_fd()], None).unwrap_err();
        assert_eq!(err.os_error_code(), libc::EINVAL);
        #[cfg(target_os = "linux")]
        {
            let cred = Credentials::current();
            let err = send_msg(&left, &[IoSlice::new(b"")], &[], Some(&cred)).unwrap_err();
            assert_eq!(err.os_error_code(), libc::EINVAL);
        }

        // Nothing reached the peer, so the next message is intact.
        send_msg(&left, &[IoSlice::new(b"z")], &[a.as_raw_fd()], None).unwrap();
        let mut buf = [0u8; 1];
        let msg = recv_msg(&right, &mut [IoSliceMut::new(&mut buf)], 4).unwrap();
        assert_eq!(&buf, b"z");
        assert_eq!(msg.fds.len(), 1);
    }
}
