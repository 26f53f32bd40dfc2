//! Descriptor handle variants.
//!
//! Ownership is part of the tag: a `Local` handle closes its descriptor on
//! drop, a `Borrowed` one never does, and a `Remote` one is just a number in
//! the peer's namespace that cannot be opened here.

use std::os::fd::{AsRawFd, OwnedFd, RawFd};

/// A single descriptor in one of the three ownership variants.
#[derive(Debug)]
pub enum FileHandle {
    /// Exclusively owned; closed on drop unless moved out.
    Local(OwnedFd),
    /// Owned elsewhere; the holder must not close it.
    Borrowed(RawFd),
    /// Identifier meaningful only to the peer process.
    Remote(i32),
}

impl FileHandle {
    /// Descriptor number to hand to the kernel, if this handle has one here.
    pub fn transferable_fd(&self) -> Option<RawFd> {
        match self {
            FileHandle::Local(fd) => Some(fd.as_raw_fd()),
            FileHandle::Borrowed(fd) => Some(*fd),
            FileHandle::Remote(_) => None,
        }
    }

    /// Non-owning view of this handle.
    pub fn borrow(&self) -> FileHandle {
        match self {
            FileHandle::Local(fd) => FileHandle::Borrowed(fd.as_raw_fd()),
            FileHandle::Borrowed(fd) => FileHandle::Borrowed(*fd),
            FileHandle::Remote(id) => FileHandle::Remote(*id),
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, FileHandle::Local(_))
    }

    /// Take the owned descriptor, if this is a `Local` handle.
    pub fn into_owned(self) -> Option<OwnedFd> {
        match self {
            FileHandle::Local(fd) => Some(fd),
            _ => None,
        }
    }
}

impl From<OwnedFd> for FileHandle {
    fn from(fd: OwnedFd) -> Self {
        FileHandle::Local(fd)
    }
}

/// A `(data, event)` descriptor pair forming one channel endpoint.
///
/// Both halves always share an ownership variant. A remote channel is a
/// single id in the peer's channel namespace.
#[derive(Debug)]
pub enum ChannelHandle {
    Local { data: OwnedFd, event: OwnedFd },
    Borrowed { data: RawFd, event: RawFd },
    Remote(i32),
}

impl ChannelHandle {
    /// `(data, event)` descriptor numbers to transfer, if any.
    pub fn transferable_fds(&self) -> Option<(RawFd, RawFd)> {
        match self {
            ChannelHandle::Local { data, event } => Some((data.as_raw_fd(), event.as_raw_fd())),
            ChannelHandle::Borrowed { data, event } => Some((*data, *event)),
            ChannelHandle::Remote(_) => None,
        }
    }

    pub fn borrow(&self) -> ChannelHandle {
        match self {
            ChannelHandle::Local { data, event } => ChannelHandle::Borrowed {
                data: data.as_raw_fd(),
                event: event.as_raw_fd(),
            },
            ChannelHandle::Borrowed { data, event } => ChannelHandle::Borrowed {
                data: *data,
                event: *event,
            },
            ChannelHandle::Remote(id) => ChannelHandle::Remote(*id),
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, ChannelHandle::Local { .. })
    }
}
