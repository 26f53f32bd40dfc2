//! Translation between handles and the integer references stored in message bytes.

use std::os::fd::OwnedFd;

use ipcwire_transport::{ChannelHandle, FileHandle};

/// Index of a descriptor within one payload's descriptor list.
pub type FileReference = i32;

/// Index of a channel's `data` slot within one payload's descriptor list.
pub type ChannelReference = i32;

/// Wire reference for a peer-side id.
///
/// Slot indices are non-negative, so remote ids are stored bitwise inverted
/// in the negative range and the two can never collide. Only non-negative
/// ids have a reference.
pub fn remote_reference(id: i32) -> Option<i32> {
    (id >= 0).then_some(!id)
}

/// Peer-side id carried by `reference`, if it is not a slot index.
pub fn remote_id(reference: i32) -> Option<i32> {
    (reference < 0).then_some(!reference)
}

/// Send side: record handles for transfer and hand back their references.
pub trait OutputResourceMapper {
    /// Queue a descriptor for transfer.
    ///
    /// `Local` and `Borrowed` handles get the next dense slot, starting at 0.
    /// Pushing the same descriptor twice uses two slots. A `Remote` handle
    /// is not transferred and maps to its negative [`remote_reference`]; a
    /// negative remote id has none and is the caller's to reject.
    fn push_file_handle(&mut self, handle: &FileHandle) -> FileReference;

    /// Queue a channel as two adjacent slots, `data` then `event`.
    fn push_channel_handle(&mut self, handle: &ChannelHandle) -> ChannelReference;
}

/// Receive side: claim descriptors by reference.
pub trait InputResourceMapper {
    /// Take ownership of the descriptor in slot `reference`.
    ///
    /// Returns `None` for negative or out-of-range references and for slots
    /// already taken. A failed lookup leaves every other slot untouched.
    fn get_file_handle(&mut self, reference: FileReference) -> Option<OwnedFd>;

    /// Take the `data`/`event` pair starting at slot `reference`.
    ///
    /// Neither slot is taken unless both are available.
    fn get_channel_handle(&mut self, reference: ChannelReference) -> Option<ChannelHandle>;
}
