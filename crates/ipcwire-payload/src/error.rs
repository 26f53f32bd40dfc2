use ipcwire_transport::TransportError;

/// Malformed message body.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DecodeError {
    /// The body ended before a field was complete.
    #[error("message truncated (needed {needed} bytes, {available} available)")]
    Truncated { needed: usize, available: usize },

    /// A table declared more entries than the remaining bytes could hold.
    #[error("table length {declared} exceeds remaining {remaining} bytes")]
    LengthOverflow { declared: usize, remaining: usize },

    /// A boolean byte other than 0 or 1.
    #[error("invalid boolean byte {0:#04x}")]
    InvalidBool(u8),

    /// A slot reference with no received descriptor behind it.
    #[error("no descriptor received for reference {0}")]
    MissingDescriptor(i32),

    /// The decoder finished with body bytes left over.
    #[error("{0} trailing bytes after message")]
    TrailingBytes(usize),
}

/// Errors that can occur while sending or receiving payloads.
#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    /// The socket layer failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The body could not be decoded into the requested type.
    #[error("decode failed: {0}")]
    Decode(#[from] DecodeError),

    /// The stream is not positioned at a payload preamble.
    #[error("invalid payload preamble (magic {magic:#010x})")]
    InvalidPreamble { magic: u32 },

    /// The body exceeds the configured or wire-format maximum.
    #[error("message too large ({size} bytes, max {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// Remote ids must be non-negative to stay clear of slot indices.
    #[error("remote handle id {0} is negative")]
    InvalidRemoteId(i32),

    /// The request body does not fit the inline impulse slot.
    #[error("impulse body too large ({size} bytes, max {max})")]
    ImpulseTooLarge { size: usize, max: usize },
}

impl PayloadError {
    /// OS-style error code for callers that branch on errno values.
    pub fn os_error_code(&self) -> i32 {
        match self {
            PayloadError::Transport(err) => err.os_error_code(),
            PayloadError::Decode(_) | PayloadError::InvalidPreamble { .. } => libc::EIO,
            PayloadError::MessageTooLarge { .. } => libc::EMSGSIZE,
            PayloadError::ImpulseTooLarge { .. } => libc::E2BIG,
            PayloadError::InvalidRemoteId(_) => libc::EINVAL,
        }
    }
}

impl From<std::io::Error> for PayloadError {
    fn from(err: std::io::Error) -> Self {
        PayloadError::Transport(TransportError::Io(err))
    }
}

pub type Result<T> = std::result::Result<T, PayloadError>;
