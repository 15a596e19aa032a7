//! Error taxonomy for the a1fs core.
//!
//! The driver adapter needs a bare negative errno to hand back to the
//! bridge; everything else in the core works with [`FsError`] so call
//! sites read like normal Rust.

use thiserror::Error;

/// A POSIX errno value, always positive (the sign flip happens at the
/// bridge boundary, not here).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Errno(pub i32);

impl Errno {
    pub const ENOENT: Errno = Errno(libc::ENOENT);
    pub const ENOTDIR: Errno = Errno(libc::ENOTDIR);
    pub const ENAMETOOLONG: Errno = Errno(libc::ENAMETOOLONG);
    pub const ENOSPC: Errno = Errno(libc::ENOSPC);
    pub const ENOMEM: Errno = Errno(libc::ENOMEM);
    pub const ENOTEMPTY: Errno = Errno(libc::ENOTEMPTY);
    pub const EFAULT: Errno = Errno(libc::EFAULT);
    pub const EEXIST: Errno = Errno(libc::EEXIST);
    pub const EISDIR: Errno = Errno(libc::EISDIR);

    pub fn raw(self) -> i32 {
        self.0
    }
}

impl From<Errno> for i32 {
    fn from(e: Errno) -> i32 {
        e.raw()
    }
}

impl From<FsError> for i32 {
    fn from(e: FsError) -> i32 {
        e.errno().raw()
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    #[error("no such file or directory")]
    NotFound,
    #[error("not a directory")]
    NotADirectory,
    #[error("is a directory")]
    IsADirectory,
    #[error("name too long")]
    NameTooLong,
    #[error("no space left on device")]
    NoSpace,
    #[error("out of memory")]
    OutOfMemory,
    #[error("directory not empty")]
    NotEmpty,
    #[error("bad address")]
    BadAddress,
    #[error("file already exists")]
    AlreadyExists,
}

impl FsError {
    pub fn errno(self) -> Errno {
        match self {
            FsError::NotFound => Errno::ENOENT,
            FsError::NotADirectory => Errno::ENOTDIR,
            FsError::IsADirectory => Errno::EISDIR,
            FsError::NameTooLong => Errno::ENAMETOOLONG,
            FsError::NoSpace => Errno::ENOSPC,
            FsError::OutOfMemory => Errno::ENOMEM,
            FsError::NotEmpty => Errno::ENOTEMPTY,
            FsError::BadAddress => Errno::EFAULT,
            FsError::AlreadyExists => Errno::EEXIST,
        }
    }
}

pub type FsResult<T> = Result<T, FsError>;
