//! VFS error types.

use std::io;
use thiserror::Error;

use super::types::{MountResult, UnmountResult};

/// VFS error type.
///
/// Dispatch-level failures carry the namespace path and the operation that
/// failed. Backend-level failures carry the backend-relative path.
#[derive(Debug, Error)]
pub enum VfsError {
    /// A mount request named a backend that does not exist.
    #[error("no backend supplied for mount point {path}: {reason}")]
    MissingBackend { path: String, reason: String },

    /// Mount points must be absolute.
    #[error("invalid mount point {0}: mount points must be absolute")]
    InvalidMountPoint(String),

    /// Something is already mounted at exactly this path.
    #[error("mount point already in use: {0}")]
    MountPointOccupied(String),

    /// The backend declined the mount.
    #[error("backend refused mount at {path}: {code}")]
    MountRefused { path: String, code: MountResult },

    /// The backend declined the unmount.
    #[error("backend refused unmount at {path}: {code}")]
    UnmountRefused { path: String, code: UnmountResult },

    /// No mounted backend owns the path.
    #[error("{operation}: no backend found for {path}")]
    BackendNotFound { path: String, operation: &'static str },

    /// The owning backend is read-only.
    #[error("{operation}: backend for {path} is read-only")]
    ReadOnly { path: String, operation: &'static str },

    /// A cross-backend transfer wrote a different number of bytes than the
    /// source reported.
    #[error("transfer of {path} wrote {actual} bytes, source reported {expected}")]
    LengthMismatch { path: String, expected: u64, actual: u64 },

    /// A cross-backend move copied the content but could not delete the
    /// source. Both copies may now exist.
    #[error(
        "move {source_path} -> {destination} is inconsistent: content was copied but \
         the source could not be deleted, so it may now exist at both ends: {cause}"
    )]
    Inconsistent {
        source_path: String,
        destination: String,
        #[source]
        cause: Box<VfsError>,
    },

    /// The backend at the path is not of the requested concrete type.
    #[error("backend for {path} is {actual}, not {expected}")]
    TypeMismatch {
        path: String,
        expected: &'static str,
        actual: String,
    },

    /// File or directory not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Path already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Expected a directory.
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// Expected a file.
    #[error("is a directory: {0}")]
    IsADirectory(String),

    /// Directory not empty.
    #[error("directory not empty: {0}")]
    DirectoryNotEmpty(String),

    /// Path escapes root (security violation).
    #[error("path escapes root: {0}")]
    PathEscapesRoot(String),

    /// Invalid path.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl VfsError {
    /// Create a NotFound error.
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    /// Create an AlreadyExists error.
    pub fn already_exists(path: impl Into<String>) -> Self {
        Self::AlreadyExists(path.into())
    }

    /// Create a NotADirectory error.
    pub fn not_a_directory(path: impl Into<String>) -> Self {
        Self::NotADirectory(path.into())
    }

    /// Create an IsADirectory error.
    pub fn is_a_directory(path: impl Into<String>) -> Self {
        Self::IsADirectory(path.into())
    }

    /// Create a DirectoryNotEmpty error.
    pub fn directory_not_empty(path: impl Into<String>) -> Self {
        Self::DirectoryNotEmpty(path.into())
    }

    /// Create a PathEscapesRoot error.
    pub fn path_escapes_root(path: impl Into<String>) -> Self {
        Self::PathEscapesRoot(path.into())
    }

    /// Create an InvalidPath error.
    pub fn invalid_path(path: impl Into<String>) -> Self {
        Self::InvalidPath(path.into())
    }

    /// Create a BackendNotFound error.
    pub fn backend_not_found(path: impl Into<String>, operation: &'static str) -> Self {
        Self::BackendNotFound {
            path: path.into(),
            operation,
        }
    }

    /// Create a ReadOnly error.
    pub fn read_only(path: impl Into<String>, operation: &'static str) -> Self {
        Self::ReadOnly {
            path: path.into(),
            operation,
        }
    }

    /// Create an Other error.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// True for the move-left-both-copies escalation.
    pub fn is_inconsistent(&self) -> bool {
        matches!(self, Self::Inconsistent { .. })
    }
}

/// Convert VfsError to std::io::Error for compatibility.
impl From<VfsError> for io::Error {
    fn from(e: VfsError) -> Self {
        match e {
            VfsError::NotFound(msg) => io::Error::new(io::ErrorKind::NotFound, msg),
            VfsError::AlreadyExists(msg) => io::Error::new(io::ErrorKind::AlreadyExists, msg),
            VfsError::NotADirectory(msg) => io::Error::new(io::ErrorKind::NotADirectory, msg),
            VfsError::IsADirectory(msg) => io::Error::new(io::ErrorKind::IsADirectory, msg),
            VfsError::DirectoryNotEmpty(msg) => {
                io::Error::new(io::ErrorKind::DirectoryNotEmpty, msg)
            }
            VfsError::PathEscapesRoot(msg) => {
                io::Error::new(io::ErrorKind::PermissionDenied, msg)
            }
            VfsError::InvalidPath(msg) => io::Error::new(io::ErrorKind::InvalidInput, msg),
            e @ VfsError::ReadOnly { .. } => io::Error::new(io::ErrorKind::ReadOnlyFilesystem, e),
            e @ VfsError::BackendNotFound { .. } => io::Error::new(io::ErrorKind::NotFound, e),
            e @ (VfsError::InvalidMountPoint(_) | VfsError::MissingBackend { .. }) => {
                io::Error::new(io::ErrorKind::InvalidInput, e)
            }
            e @ VfsError::MountPointOccupied(_) => io::Error::new(io::ErrorKind::AlreadyExists, e),
            e @ VfsError::LengthMismatch { .. } => io::Error::new(io::ErrorKind::UnexpectedEof, e),
            VfsError::Io(e) => e,
            other => io::Error::other(other),
        }
    }
}

/// VFS result type.
pub type VfsResult<T> = Result<T, VfsError>;
