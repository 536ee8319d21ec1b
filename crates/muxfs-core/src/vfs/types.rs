//! Core VFS types.
//!
//! Descriptors, capability flags and the negotiation result codes shared by
//! the dispatch core and every backend.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::SystemTime;
use strum::{AsRefStr, Display, EnumString};

use super::path::VfsPath;

bitflags! {
    /// What a backend can and cannot do.
    ///
    /// Dispatch reads these to decide whether an operation is legal and
    /// whether a transfer must be followed by `commit()`.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct Capabilities: u32 {
        /// Mutating operations are rejected.
        const READ_ONLY       = 1 << 0;
        /// Changes are buffered until `commit()`.
        const REQUIRES_COMMIT = 1 << 1;
        /// Content does not survive the backend instance.
        const TRANSIENT       = 1 << 2;
        /// `physical_path()` returns real OS paths.
        const PHYSICAL_PATHS  = 1 << 3;
        /// No real hierarchy; directories are implied by names.
        const FLAT            = 1 << 4;
        /// Reads may be served from a cache.
        const CACHED          = 1 << 5;
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::empty()
    }
}

impl Capabilities {
    pub fn is_read_only(&self) -> bool {
        self.contains(Self::READ_ONLY)
    }

    pub fn requires_commit(&self) -> bool {
        self.contains(Self::REQUIRES_COMMIT)
    }
}

impl fmt::Display for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "(none)");
        }
        let mut first = true;
        for (name, _) in self.iter_names() {
            if !first {
                write!(f, "|")?;
            }
            write!(f, "{}", name)?;
            first = false;
        }
        Ok(())
    }
}

bitflags! {
    /// Descriptor properties.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct EntryProperties: u8 {
        const READONLY = 1 << 0;
        const HIDDEN   = 1 << 1;
        /// Synthesized by dispatch, not stored by any backend.
        const VIRTUAL  = 1 << 2;
    }
}

/// Entry type enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum EntryKind {
    /// Regular file.
    File,
    /// Directory.
    Directory,
    /// Another backend's mount point.
    MountPoint,
}

impl EntryKind {
    /// Returns true if this is a regular file.
    pub fn is_file(&self) -> bool {
        matches!(self, EntryKind::File)
    }

    /// Returns true for directories and mount points.
    pub fn is_dir(&self) -> bool {
        matches!(self, EntryKind::Directory | EntryKind::MountPoint)
    }
}

/// Read-only snapshot of one file, directory or mount point.
///
/// Backends produce these with backend-relative paths; dispatch re-roots
/// them under the mount point before handing them to callers.
#[derive(Debug, Clone)]
pub struct DirEntry {
    pub path: VfsPath,
    pub kind: EntryKind,
    pub properties: EntryProperties,
    /// Size in bytes (zero for directories).
    pub size: u64,
    /// Last modification time, if the backend tracks one.
    pub modified: Option<SystemTime>,
    /// Name of the owning backend.
    pub backend: String,
    pub description: String,
}

impl DirEntry {
    /// Create a file descriptor.
    pub fn file(path: VfsPath, size: u64, backend: impl Into<String>) -> Self {
        Self::new(path, EntryKind::File, size, backend)
    }

    /// Create a directory descriptor.
    pub fn directory(path: VfsPath, backend: impl Into<String>) -> Self {
        Self::new(path, EntryKind::Directory, 0, backend)
    }

    /// Synthesize a mount point descriptor.
    pub fn mount_point(path: VfsPath, backend: impl Into<String>) -> Self {
        let mut entry = Self::new(path, EntryKind::MountPoint, 0, backend);
        entry.properties |= EntryProperties::VIRTUAL;
        entry.description = "mount point".to_string();
        entry
    }

    fn new(path: VfsPath, kind: EntryKind, size: u64, backend: impl Into<String>) -> Self {
        let properties = if path.is_hidden() {
            EntryProperties::HIDDEN
        } else {
            EntryProperties::empty()
        };
        Self {
            path,
            kind,
            properties,
            size,
            modified: None,
            backend: backend.into(),
            description: String::new(),
        }
    }

    /// Set the modification time.
    pub fn with_modified(mut self, modified: SystemTime) -> Self {
        self.modified = Some(modified);
        self
    }

    /// Add properties.
    pub fn with_properties(mut self, properties: EntryProperties) -> Self {
        self.properties |= properties;
        self
    }

    /// The final path segment.
    pub fn name(&self) -> &str {
        self.path.leaf()
    }

    pub fn is_file(&self) -> bool {
        self.kind.is_file()
    }

    pub fn is_dir(&self) -> bool {
        self.kind.is_dir()
    }
}

/// Backend answer to `on_mount`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr)]
pub enum MountResult {
    Accepted,
    Refused,
    NotInitialized,
    ResourceUnavailable,
    AuthenticationFailure,
    PathRefused,
    RootPathRefused,
    NotRootPath,
}

impl MountResult {
    pub fn is_accepted(&self) -> bool {
        matches!(self, MountResult::Accepted)
    }
}

/// Backend answer to `on_unmount`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr)]
pub enum UnmountResult {
    Accepted,
    Refused,
    InUse,
    PendingWrites,
    ResourceFailure,
    UncommittedChanges,
}

impl UnmountResult {
    pub fn is_accepted(&self) -> bool {
        matches!(self, UnmountResult::Accepted)
    }
}

/// How a write stream treats an existing file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpenMode {
    /// Create a new file; fail if it already exists.
    CreateNew,
    /// Create the file, truncating any existing content.
    #[default]
    Create,
    /// Open an existing file and truncate it; fail if missing.
    Open,
    /// Append to the file, creating it if missing.
    Append,
}

impl OpenMode {
    /// Mode used by transfers: truncate-and-create when overwriting,
    /// fail-if-exists otherwise.
    pub fn for_overwrite(overwrite: bool) -> Self {
        if overwrite {
            OpenMode::Create
        } else {
            OpenMode::CreateNew
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_entry_kind() {
        assert!(EntryKind::File.is_file());
        assert!(!EntryKind::File.is_dir());
        assert!(EntryKind::Directory.is_dir());
        assert!(EntryKind::MountPoint.is_dir());
    }

    #[test]
    fn test_dir_entry_constructors() {
        let file = DirEntry::file(VfsPath::from("/a/test.txt"), 12, "mem");
        assert!(file.is_file());
        assert_eq!(file.name(), "test.txt");
        assert_eq!(file.size, 12);
        assert_eq!(file.backend, "mem");

        let hidden = DirEntry::directory(VfsPath::from("/a/.git"), "mem");
        assert!(hidden.properties.contains(EntryProperties::HIDDEN));

        let mount = DirEntry::mount_point(VfsPath::from("/mnt"), "usb");
        assert_eq!(mount.kind, EntryKind::MountPoint);
        assert!(mount.properties.contains(EntryProperties::VIRTUAL));
    }

    #[test]
    fn test_capabilities_display() {
        assert_eq!(Capabilities::empty().to_string(), "(none)");
        let caps = Capabilities::READ_ONLY | Capabilities::TRANSIENT;
        assert_eq!(caps.to_string(), "READ_ONLY|TRANSIENT");
        assert!(caps.is_read_only());
        assert!(!caps.requires_commit());
    }

    #[test]
    fn test_result_codes_round_trip_names() {
        assert_eq!(MountResult::PathRefused.to_string(), "PathRefused");
        assert_eq!(
            UnmountResult::from_str("UncommittedChanges").unwrap(),
            UnmountResult::UncommittedChanges
        );
        assert!(MountResult::Accepted.is_accepted());
        assert!(!UnmountResult::InUse.is_accepted());
    }

    #[test]
    fn test_open_mode_for_overwrite() {
        assert_eq!(OpenMode::for_overwrite(true), OpenMode::Create);
        assert_eq!(OpenMode::for_overwrite(false), OpenMode::CreateNew);
    }
}
