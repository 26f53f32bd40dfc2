/// OS identity of a process, as carried by `SCM_CREDENTIALS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Credentials {
    pub pid: i32,
    pub uid: u32,
    pub gid: u32,
}

impl Credentials {
    /// Credentials of the calling process (pid, effective uid, effective gid).
    ///
    /// These are the only values an unprivileged sender may attach; the
    /// kernel rejects anything else with `EPERM`.
    pub fn current() -> Self {
        // SAFETY: getpid/geteuid/getegid take no arguments and cannot fail.
        let (pid, uid, gid) = unsafe { (libc::getpid(), libc::geteuid(), libc::getegid()) };
        Self { pid, uid, gid }
    }

    #[cfg(target_os = "linux")]
    pub(crate) fn to_ucred(self) -> libc::ucred {
        libc::ucred {
            pid: self.pid,
            uid: self.uid,
            gid: self.gid,
        }
    }

    #[cfg(target_os = "linux")]
    pub(crate) fn from_ucred(cred: libc::ucred) -> Self {
        Self {
            pid: cred.pid,
            uid: cred.uid,
            gid: cred.gid,
        }
    }
}
