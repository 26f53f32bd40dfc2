//! Retry-while-interrupted combinator.
//!
//! Every blocking call in this workspace goes through [`retry_eintr`], so a
//! signal landing mid-call is never visible to the caller.

use std::io::{self, ErrorKind};

/// Run `op` until it returns something `is_interrupted` does not match.
///
/// The returned value is the first non-interrupted result, success or error.
pub fn retry_while<T, E, F, P>(mut op: F, mut is_interrupted: P) -> Result<T, E>
where
    F: FnMut() -> Result<T, E>,
    P: FnMut(&E) -> bool,
{
    loop {
        match op() {
            Err(err) if is_interrupted(&err) => continue,
            other => return other,
        }
    }
}

/// [`retry_while`] for `io::Result`, retrying on `ErrorKind::Interrupted`.
pub fn retry_eintr<T, F>(op: F) -> io::Result<T>
where
    F: FnMut() -> io::Result<T>,
{
    retry_while(op, |err: &io::Error| err.kind() == ErrorKind::Interrupted)
}

/// Convert a `-1`-on-error syscall return into `io::Result`.
pub(crate) fn cvt(ret: libc::ssize_t) -> io::Result<usize> {
    if ret < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(ret as usize)
    }
}

/// Same as [`cvt`] for calls returning `c_int`.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
pub(crate) fn cvt_int(ret: libc::c_int) -> io::Result<()> {
    if ret < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}
