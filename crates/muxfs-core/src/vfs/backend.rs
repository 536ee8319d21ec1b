//! The backend contract.
//!
//! Every storage engine plugs into the namespace by implementing
//! [`Backend`]. Dispatch treats all backends polymorphically through this
//! trait and never looks at backend-specific state.
//!
//! Paths handed to a backend are backend-relative: the mount point has
//! already been stripped, so the backend's own root is `/`. A backend may
//! also receive a relative path (no leading `/`) and must treat it as
//! relative to its root.

use std::any::Any;
use std::fmt;
use std::io::{self, Read, Write};
use std::path::PathBuf;

use super::path::VfsPath;
use super::types::{Capabilities, DirEntry, MountResult, OpenMode, UnmountResult};
use super::VfsResult;

/// A readable stream together with the length its backend reports.
///
/// Transfers compare the bytes actually read against [`len`](Self::len) to
/// catch silent truncation.
pub struct ReadHandle {
    inner: Box<dyn Read + Send>,
    len: u64,
}

impl ReadHandle {
    pub fn new(inner: impl Read + Send + 'static, len: u64) -> Self {
        Self {
            inner: Box::new(inner),
            len,
        }
    }

    /// Length reported by the backend when the stream was opened.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Read for ReadHandle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl fmt::Debug for ReadHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadHandle").field("len", &self.len).finish()
    }
}

/// A writable stream. Content is only guaranteed to be visible after
/// `flush()` returns.
pub type WriteHandle = Box<dyn Write + Send>;

/// Core backend trait.
///
/// Thread-safety of a backend's internal state is the backend's own
/// responsibility: dispatch may call into one backend from many threads at
/// once and never serializes those calls.
pub trait Backend: Any + Send + Sync {
    // ========================================================================
    // Identity and lifecycle
    // ========================================================================

    /// Human-readable backend name, reported in descriptors.
    fn name(&self) -> &str;

    /// Capability flags.
    fn capabilities(&self) -> Capabilities;

    /// Upcast for the typed escape hatch in dispatch.
    fn as_any(&self) -> &dyn Any;

    /// Called with the table lock held, before the backend becomes
    /// reachable. Must not call back into the mount table.
    fn on_mount(&self, _point: &VfsPath) -> MountResult {
        MountResult::Accepted
    }

    /// Called with the table lock held, before the backend is detached.
    fn on_unmount(&self) -> UnmountResult {
        UnmountResult::Accepted
    }

    /// Make buffered changes durable. Only meaningful with
    /// [`Capabilities::REQUIRES_COMMIT`].
    fn commit(&self) -> VfsResult<()> {
        Ok(())
    }

    /// Drop buffered changes.
    fn discard(&self) -> VfsResult<()> {
        Ok(())
    }

    /// Real OS path behind a backend path, for backends advertising
    /// [`Capabilities::PHYSICAL_PATHS`].
    fn physical_path(&self, _path: &VfsPath) -> Option<PathBuf> {
        None
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Check if a path exists.
    fn exists(&self, path: &VfsPath) -> bool {
        self.metadata(path).is_ok()
    }

    /// Describe one file or directory.
    fn metadata(&self, path: &VfsPath) -> VfsResult<DirEntry>;

    /// Direct children of a directory.
    fn list_directory(&self, path: &VfsPath) -> VfsResult<Vec<DirEntry>>;

    // ========================================================================
    // Files
    // ========================================================================

    /// Create an empty file. With `overwrite`, an existing file is truncated.
    fn create_file(&self, path: &VfsPath, overwrite: bool) -> VfsResult<()>;

    fn delete_file(&self, path: &VfsPath) -> VfsResult<()>;

    fn move_file(&self, from: &VfsPath, to: &VfsPath, overwrite: bool) -> VfsResult<()>;

    fn copy_file(&self, from: &VfsPath, to: &VfsPath, overwrite: bool) -> VfsResult<()>;

    // ========================================================================
    // Streams
    // ========================================================================

    fn open_read(&self, path: &VfsPath) -> VfsResult<ReadHandle>;

    fn open_write(&self, path: &VfsPath, mode: OpenMode) -> VfsResult<WriteHandle>;

    // ========================================================================
    // Directories
    // ========================================================================

    /// Create a directory and any missing parents.
    fn create_directory(&self, path: &VfsPath) -> VfsResult<()>;

    fn delete_directory(&self, path: &VfsPath, recursive: bool) -> VfsResult<()>;

    fn move_directory(&self, from: &VfsPath, to: &VfsPath) -> VfsResult<()>;

    fn copy_directory(&self, from: &VfsPath, to: &VfsPath) -> VfsResult<()>;
}

/// Reference identity of two backend handles.
///
/// Compares data pointers only; two `Arc<dyn Backend>` to the same instance
/// may carry different vtable pointers.
pub fn same_backend(a: &dyn Backend, b: &dyn Backend) -> bool {
    std::ptr::eq(
        a as *const dyn Backend as *const (),
        b as *const dyn Backend as *const (),
    )
}
