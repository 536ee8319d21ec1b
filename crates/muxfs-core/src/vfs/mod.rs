//! Virtual filesystem multiplexer.
//!
//! One namespace assembled from independently implemented backends, each
//! mounted at a path prefix. Key components:
//!
//! - [`VfsPath`] - Normalized, immutable path value
//! - [`Backend`] - The contract every storage engine implements
//! - [`MountTable`] - Maps paths to backends by longest mount point
//! - [`Vfs`] - The facade clients call
//! - [`TransferEngine`] - Streams content between two backends
//!
//! ## Design Decisions
//!
//! - **Longest-prefix routing**: the most specific mount point that matches
//!   on a segment boundary wins; ties break lexicographically. A root mount
//!   catches every path nothing else claims.
//! - **Negotiated mounts**: backends may refuse a mount or unmount; callers
//!   can override with `force`.
//! - **No silent half-moves**: a cross-backend move that copied but could
//!   not delete its source fails with [`VfsError::Inconsistent`].

pub mod backend;
pub mod backends;
mod dispatch;
mod error;
mod mount;
pub mod path;
#[cfg(test)]
pub(crate) mod testing;
mod transfer;
mod types;

pub use backend::{Backend, ReadHandle, WriteHandle, same_backend};
pub use backends::{LocalBackend, MemoryBackend};
pub use dispatch::Vfs;
pub use error::{VfsError, VfsResult};
pub use mount::{MountInfo, MountTable, Resolution};
pub use path::VfsPath;
pub use transfer::{CHUNK_SIZE, Endpoint, TransferEngine, TransferReport};
pub use types::{
    Capabilities, DirEntry, EntryKind, EntryProperties, MountResult, OpenMode, UnmountResult,
};
