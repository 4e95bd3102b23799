//! Errno-shaped error type shared by the core and the FUSE adapter.

use thiserror::Error;

/// A core-level failure, carrying the errno it maps to at the FUSE boundary.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CoreError {
    /// A path component does not resolve to an existing entry.
    #[error("no such file or directory")]
    NotFound,
    /// A file was required but the target is a directory.
    #[error("is a directory")]
    IsDirectory,
    /// A directory was required but the target is not one.
    #[error("not a directory")]
    NotDirectory,
    /// `rmdir` on a directory that still has children.
    #[error("directory not empty")]
    NotEmpty,
    /// `create`/`mkdir` on a name that already exists.
    #[error("file exists")]
    AlreadyExists,
    /// The requested access mode is incompatible with how the file was opened.
    #[error("permission denied")]
    AccessDenied,
    /// The inode table or a directory's capacity is exhausted.
    #[error("permission denied (capacity exhausted)")]
    CapacityExhausted,
    /// Data-block allocation failed because the image ran out of free blocks.
    #[error("disk quota exceeded")]
    OutOfSpace,
    /// `truncate`/growth failed because the image ran out of free blocks.
    #[error("file too large")]
    TooLarge,
    /// A path component exceeds `NAME_MAX`.
    #[error("file name too long")]
    NameTooLong,
    /// An internal invariant was violated.
    #[error("internal consistency failure")]
    Fault,
}

impl CoreError {
    /// Maps this error to the raw errno value `fuser` expects from a `reply.error(..)` call.
    pub fn to_errno(self) -> i32 {
        match self {
            Self::NotFound => libc::ENOENT,
            Self::IsDirectory => libc::EISDIR,
            Self::NotDirectory => libc::ENOTDIR,
            Self::NotEmpty => libc::ENOTEMPTY,
            Self::AlreadyExists => libc::EEXIST,
            Self::AccessDenied => libc::EACCES,
            Self::CapacityExhausted => libc::EACCES,
            Self::OutOfSpace => libc::EDQUOT,
            Self::TooLarge => libc::EFBIG,
            Self::NameTooLong => libc::ENAMETOOLONG,
            Self::Fault => libc::EFAULT,
        }
    }
}

/// Result type used throughout the core.
pub type CoreResult<T> = Result<T, CoreError>;
