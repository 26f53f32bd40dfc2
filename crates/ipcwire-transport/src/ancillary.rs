//! Socket control-message buffers (`SCM_RIGHTS`, `SCM_CREDENTIALS`).

use std::mem::size_of;
use std::os::fd::{FromRawFd, OwnedFd, RawFd};
use std::ptr;

use crate::credentials::Credentials;

/// Linux caps a single `SCM_RIGHTS` message at this many descriptors (`SCM_MAX_FD`).
pub const MAX_FDS_PER_MESSAGE: usize = 253;

/// An aligned, zero-initialised control buffer for `msghdr::msg_control`.
pub(crate) struct ControlBuffer {
    words: Vec<u64>,
    len: usize,
}

impl ControlBuffer {
    fn zeroed(len: usize) -> Self {
        Self {
            words: vec![0u64; len.div_ceil(size_of::<u64>())],
            len,
        }
    }

    /// Control data for an outgoing message.
    pub(crate) fn for_send(fds: &[RawFd], credentials: Option<&Credentials>) -> Self {
        let mut space = 0;
        if !fds.is_empty() {
            space += cmsg_space(size_of_val(fds));
        }
        #[cfg(target_os = "linux")]
        if credentials.is_some() {
            space += cmsg_space(size_of::<libc::ucred>());
        }

        let mut buffer = Self::zeroed(space);
        let mut offset = 0;
        if !fds.is_empty() {
            let bytes: Vec<u8> = fds.iter().flat_map(|fd| fd.to_ne_bytes()).collect();
            offset = buffer.write_cmsg(offset, libc::SCM_RIGHTS, &bytes);
        }
        #[cfg(target_os = "linux")]
        if let Some(cred) = credentials {
            let ucred = cred.to_ucred();
            let mut bytes = Vec::with_capacity(size_of::<libc::ucred>());
            bytes.extend_from_slice(&ucred.pid.to_ne_bytes());
            bytes.extend_from_slice(&ucred.uid.to_ne_bytes());
            bytes.extend_from_slice(&ucred.gid.to_ne_bytes());
            offset = buffer.write_cmsg(offset, libc::SCM_CREDENTIALS, &bytes);
        }
        #[cfg(not(target_os = "linux"))]
        let _ = credentials;

        debug_assert!(offset <= buffer.len);
        buffer
    }

    /// Room for up to `max_fds` descriptors plus one credential block.
    pub(crate) fn for_receive(max_fds: usize) -> Self {
        let mut space = 0;
        if max_fds > 0 {
            space += cmsg_space(max_fds * size_of::<RawFd>());
        }
        #[cfg(target_os = "linux")]
        {
            space += cmsg_space(size_of::<libc::ucred>());
        }
        Self::zeroed(space)
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Pointer suitable for `msg_control`; null when there is no control data.
    pub(crate) fn as_mut_ptr(&mut self) -> *mut libc::c_void {
        if self.len == 0 {
            ptr::null_mut()
        } else {
            self.words.as_mut_ptr().cast()
        }
    }

    fn write_cmsg(&mut self, offset: usize, cmsg_type: libc::c_int, payload: &[u8]) -> usize {
        let next = offset + cmsg_space(payload.len());
        debug_assert!(next <= self.len, "control buffer sized too small");
        if next > self.len {
            self.words.resize(next.div_ceil(size_of::<u64>()), 0);
            self.len = next;
        }

        let base = self.words.as_mut_ptr().cast::<u8>();
        // SAFETY: `offset..next` lies inside the zeroed allocation (grown
        // above if needed), and `offset` is a sum of CMSG_SPACE values so the header is
        // aligned for `cmsghdr` on top of the u64-aligned base.
        unsafe {
            let cmsg = base.add(offset).cast::<libc::cmsghdr>();
            (*cmsg).cmsg_level = libc::SOL_SOCKET;
            (*cmsg).cmsg_type = cmsg_type;
            (*cmsg).cmsg_len = cmsg_len(payload.len()) as _;
            ptr::copy_nonoverlapping(payload.as_ptr(), libc::CMSG_DATA(cmsg), payload.len());
        }
        next
    }
}

/// Collect descriptors and credentials from a `msghdr` filled by `recvmsg`.
///
/// Every descriptor found is wrapped in an `OwnedFd` immediately, so none can
/// leak even if the caller bails out afterwards.
pub(crate) fn parse_control(
    msg: &libc::msghdr,
    fds: &mut Vec<OwnedFd>,
    credentials: &mut Option<Credentials>,
) {
    let header_len = cmsg_len(0);

    // SAFETY: `msg` was populated by a successful recvmsg, so msg_control
    // and msg_controllen describe initialised control data in our buffer.
    let mut cmsg = unsafe { libc::CMSG_FIRSTHDR(msg) };
    while !cmsg.is_null() {
        // SAFETY: CMSG_FIRSTHDR/CMSG_NXTHDR only return headers that fit in
        // the control buffer.
        let (level, kind, len, data) = unsafe {
            (
                (*cmsg).cmsg_level,
                (*cmsg).cmsg_type,
                (*cmsg).cmsg_len as usize,
                libc::CMSG_DATA(cmsg),
            )
        };
        let payload_len = len.saturating_sub(header_len);

        if level == libc::SOL_SOCKET && kind == libc::SCM_RIGHTS {
            for i in 0..payload_len / size_of::<RawFd>() {
                // SAFETY: the entry is within this header's payload.
                let raw = unsafe { ptr::read_unaligned(data.cast::<RawFd>().add(i)) };
                // SAFETY: the kernel installed this descriptor for us while
                // delivering the message; nothing else refers to it yet.
                fds.push(unsafe { OwnedFd::from_raw_fd(raw) });
            }
        }

        #[cfg(target_os = "linux")]
        if level == libc::SOL_SOCKET
            && kind == libc::SCM_CREDENTIALS
            && payload_len >= size_of::<libc::ucred>()
        {
            // SAFETY: payload holds a full ucred (length checked above).
            let ucred = unsafe { ptr::read_unaligned(data.cast::<libc::ucred>()) };
            *credentials = Some(Credentials::from_ucred(ucred));
        }

        // SAFETY: same buffer, `cmsg` is a valid header inside it.
        cmsg = unsafe { libc::CMSG_NXTHDR(msg, cmsg) };
    }

    #[cfg(not(target_os = "linux"))]
    let _ = credentials;
}

fn cmsg_space(len: usize) -> usize {
    // SAFETY: pure arithmetic macro.
    unsafe { libc::CMSG_SPACE(len as libc::c_uint) as usize }
}

fn cmsg_len(len: usize) -> usize {
    // SAFETY: pure arithmetic macro.
    unsafe { libc::CMSG_LEN(len as libc::c_uint) as usize }
}
