//! VFS backends.
//!
//! Backends implement [`Backend`](crate::vfs::Backend) for different
//! storage types.

mod local;
mod memory;

pub use local::LocalBackend;
pub use memory::MemoryBackend;
