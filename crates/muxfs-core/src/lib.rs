//! # muxfs-core
//!
//! A virtual filesystem that stitches several storage backends into one
//! namespace.
//!
//! ```no_run
//! use muxfs_core::{MemoryBackend, Vfs};
//!
//! let vfs = Vfs::new();
//! vfs.mount("/", MemoryBackend::new(), false)?;
//! vfs.mount("/scratch", MemoryBackend::new(), false)?;
//! vfs.write_all("/scratch/notes.txt", b"hello", false)?;
//! vfs.move_file("/scratch/notes.txt", "/notes.txt", false)?;
//! # Ok::<(), muxfs_core::VfsError>(())
//! ```

pub mod config;
pub mod vfs;

pub use config::{BackendSpec, ConfigError, MountSpec, VfsConfig};
pub use vfs::{
    Backend, Capabilities, DirEntry, EntryKind, LocalBackend, MemoryBackend, MountInfo,
    MountResult, MountTable, OpenMode, TransferEngine, UnmountResult, Vfs, VfsError, VfsPath,
    VfsResult,
};
