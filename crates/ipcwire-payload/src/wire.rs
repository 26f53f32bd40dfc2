//! Byte-level encoding traits and the `wire_struct!` schema macro.
//!
//! Scalars are little-endian. A table is a `u32` entry count followed by the
//! entries. A `bool` is a single byte, 0 or 1, with no padding. Handles are
//! pushed into the payload's mapper and encoded as their `i32` reference: a
//! slot index when non-negative, an inverted remote id when negative.

use ipcwire_transport::{ChannelHandle, Credentials, FileHandle};

use crate::error::{DecodeError, PayloadError, Result};
use crate::mapper::{remote_id, InputResourceMapper, OutputResourceMapper};

/// Byte sink with a descriptor side channel.
pub trait MessageWriter {
    /// Append `size` zeroed bytes and return them for writing.
    fn reserve(&mut self, size: usize) -> &mut [u8];

    fn output_mapper(&mut self) -> &mut dyn OutputResourceMapper;
}

/// Byte source with a descriptor side channel.
pub trait MessageReader {
    /// The unread remainder of the body.
    fn next_read_section(&self) -> &[u8];

    /// Mark `count` bytes of the current section as read.
    fn consume(&mut self, count: usize);

    fn input_mapper(&mut self) -> &mut dyn InputResourceMapper;
}

pub trait WireEncode {
    fn encode<W: MessageWriter + ?Sized>(&self, writer: &mut W) -> Result<()>;

    /// Credentials to attach out of band when this value is sent.
    fn credentials(&self) -> Option<&Credentials> {
        None
    }
}

pub trait WireDecode: Sized {
    fn decode<R: MessageReader + ?Sized>(reader: &mut R) -> std::result::Result<Self, DecodeError>;

    /// Receive the credentials that arrived with the message, if any.
    fn accept_credentials(&mut self, _credentials: Option<Credentials>) {}
}

fn take<const N: usize, R: MessageReader + ?Sized>(
    reader: &mut R,
) -> std::result::Result<[u8; N], DecodeError> {
    let section = reader.next_read_section();
    if section.len() < N {
        return Err(DecodeError::Truncated {
            needed: N,
            available: section.len(),
        });
    }
    let mut out = [0u8; N];
    out.copy_from_slice(&section[..N]);
    reader.consume(N);
    Ok(out)
}

macro_rules! impl_wire_scalar {
    ($($ty:ty => $size:literal),* $(,)?) => {
        $(
            impl WireEncode for $ty {
                fn encode<W: MessageWriter + ?Sized>(&self, writer: &mut W) -> Result<()> {
                    writer
                        .reserve($size)
                        .copy_from_slice(&self.to_le_bytes());
                    Ok(())
                }
            }

            impl WireDecode for $ty {
                fn decode<R: MessageReader + ?Sized>(
                    reader: &mut R,
                ) -> std::result::Result<Self, DecodeError> {
                    take::<$size, R>(reader).map(<$ty>::from_le_bytes)
                }
            }
        )*
    };
}

impl_wire_scalar!(u8 => 1, u16 => 2, u32 => 4, u64 => 8, i32 => 4, i64 => 8);

impl WireEncode for bool {
    fn encode<W: MessageWriter + ?Sized>(&self, writer: &mut W) -> Result<()> {
        u8::from(*self).encode(writer)
    }
}

impl WireDecode for bool {
    fn decode<R: MessageReader + ?Sized>(reader: &mut R) -> std::result::Result<Self, DecodeError> {
        match u8::decode(reader)? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(DecodeError::InvalidBool(other)),
        }
    }
}

impl<const N: usize> WireEncode for [u8; N] {
    fn encode<W: MessageWriter + ?Sized>(&self, writer: &mut W) -> Result<()> {
        writer.reserve(N).copy_from_slice(self);
        Ok(())
    }
}

impl<const N: usize> WireDecode for [u8; N] {
    fn decode<R: MessageReader + ?Sized>(reader: &mut R) -> std::result::Result<Self, DecodeError> {
        take::<N, R>(reader)
    }
}

impl<T: WireEncode> WireEncode for Vec<T> {
    fn encode<W: MessageWriter + ?Sized>(&self, writer: &mut W) -> Result<()> {
        let count = u32::try_from(self.len()).map_err(|_| PayloadError::MessageTooLarge {
            size: self.len(),
            max: u32::MAX as usize,
        })?;
        count.encode(writer)?;
        for item in self {
            item.encode(writer)?;
        }
        Ok(())
    }
}

impl<T: WireDecode> WireDecode for Vec<T> {
    fn decode<R: MessageReader + ?Sized>(reader: &mut R) -> std::result::Result<Self, DecodeError> {
        let declared = u32::decode(reader)? as usize;
        // Every entry type on the wire is at least one byte long.
        let remaining = reader.next_read_section().len();
        if declared > remaining {
            return Err(DecodeError::LengthOverflow {
                declared,
                remaining,
            });
        }

        let mut items = Vec::with_capacity(declared);
        for _ in 0..declared {
            items.push(T::decode(reader)?);
        }
        Ok(items)
    }
}

impl WireEncode for FileHandle {
    fn encode<W: MessageWriter + ?Sized>(&self, writer: &mut W) -> Result<()> {
        if let FileHandle::Remote(id) = self {
            if *id < 0 {
                return Err(PayloadError::InvalidRemoteId(*id));
            }
        }
        let reference = writer.output_mapper().push_file_handle(self);
        reference.encode(writer)
    }
}

impl WireDecode for FileHandle {
    fn decode<R: MessageReader + ?Sized>(reader: &mut R) -> std::result::Result<Self, DecodeError> {
        let reference = i32::decode(reader)?;
        if let Some(id) = remote_id(reference) {
            return Ok(FileHandle::Remote(id));
        }
        reader
            .input_mapper()
            .get_file_handle(reference)
            .map(FileHandle::Local)
            .ok_or(DecodeError::MissingDescriptor(reference))
    }
}

impl WireEncode for ChannelHandle {
    fn encode<W: MessageWriter + ?Sized>(&self, writer: &mut W) -> Result<()> {
        if let ChannelHandle::Remote(id) = self {
            if *id < 0 {
                return Err(PayloadError::InvalidRemoteId(*id));
            }
        }
        let reference = writer.output_mapper().push_channel_handle(self);
        reference.encode(writer)
    }
}

impl WireDecode for ChannelHandle {
    /// Both slots of a local channel must have arrived.
    fn decode<R: MessageReader + ?Sized>(reader: &mut R) -> std::result::Result<Self, DecodeError> {
        let reference = i32::decode(reader)?;
        if let Some(id) = remote_id(reference) {
            return Ok(ChannelHandle::Remote(id));
        }
        reader
            .input_mapper()
            .get_channel_handle(reference)
            .ok_or(DecodeError::MissingDescriptor(reference))
    }
}

/// Declare the wire layout of a struct once.
///
/// Fields are encoded and decoded in the listed order. A field named in the
/// optional `credentials:` clause must be an `Option<Credentials>`; it stays
/// off the wire and travels as socket ancillary data instead. Every other
/// field of the struct must be listed.
///
/// ```ignore
/// wire_struct! {
///     Ping<H> { seq, handle }
///     credentials: sender
/// }
/// ```
#[macro_export]
macro_rules! wire_struct {
    (
        $name:ident $(<$($gen:ident),+>)? { $($field:ident),* $(,)? }
        $(credentials: $cred:ident)?
    ) => {
        impl $(<$($gen),+>)? $name $(<$($gen),+>)? {
            /// Wire fields in encoding order.
            pub const WIRE_FIELDS: &'static [&'static str] = &[$(stringify!($field)),*];
        }

        impl $(<$($gen: $crate::WireEncode),+>)? $crate::WireEncode for $name $(<$($gen),+>)? {
            fn encode<W: $crate::MessageWriter + ?Sized>(
                &self,
                writer: &mut W,
            ) -> $crate::Result<()> {
                $( $crate::WireEncode::encode(&self.$field, writer)?; )*
                Ok(())
            }

            $(
                fn credentials(&self) -> Option<&$crate::Credentials> {
                    self.$cred.as_ref()
                }
            )?
        }

        impl $(<$($gen: $crate::WireDecode),+>)? $crate::WireDecode for $name $(<$($gen),+>)? {
            fn decode<R: $crate::MessageReader + ?Sized>(
                reader: &mut R,
            ) -> ::std::result::Result<Self, $crate::DecodeError> {
                $( let $field = $crate::WireDecode::decode(reader)?; )*
                Ok(Self {
                    $($field,)*
                    $($cred: None,)?
                })
            }

            $(
                fn accept_credentials(&mut self, credentials: Option<$crate::Credentials>) {
                    self.$cred = credentials;
                }
            )?
        }
    };
}
