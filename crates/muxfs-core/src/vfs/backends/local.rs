//! Local filesystem backend.
//!
//! Provides access to real filesystem paths, with path security
//! to prevent escaping the root directory.

use std::any::Any;
use std::fs;
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};

use crate::vfs::backend::{Backend, ReadHandle, WriteHandle};
use crate::vfs::error::{VfsError, VfsResult};
use crate::vfs::path::VfsPath;
use crate::vfs::types::{Capabilities, DirEntry, EntryProperties, MountResult, OpenMode};

/// Local filesystem backend.
///
/// All operations are relative to `root`. For example, if `root` is
/// `/home/amy/project`, then `open_read("/src/main.rs")` reads
/// `/home/amy/project/src/main.rs`.
///
/// Path security is enforced: attempts to escape via `..` or symlinks are
/// blocked.
#[derive(Debug, Clone)]
pub struct LocalBackend {
    name: String,
    root: PathBuf,
    read_only: bool,
}

impl LocalBackend {
    /// Create a new local filesystem rooted at the given path.
    ///
    /// The root is canonicalized at construction time to handle symlinks
    /// (e.g. macOS `/tmp` → `/private/tmp`).
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root: PathBuf = root.into();
        let root = dunce::canonicalize(&root).unwrap_or(root);
        Self {
            name: "local".to_string(),
            root,
            read_only: false,
        }
    }

    /// Create a read-only local filesystem.
    pub fn read_only(root: impl Into<PathBuf>) -> Self {
        let mut backend = Self::new(root);
        backend.read_only = true;
        backend
    }

    /// Set the name reported in descriptors.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set whether this filesystem is read-only.
    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    /// Get the root path.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a backend path to an OS path within the root.
    fn resolve(&self, path: &VfsPath) -> VfsResult<PathBuf> {
        let rel = path.as_str().trim_start_matches('/');
        if rel.is_empty() {
            return Ok(self.root.clone());
        }

        let rel = Path::new(rel);
        if rel
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)))
        {
            return Err(VfsError::path_escapes_root(path.as_str()));
        }
        let full = self.root.join(rel);

        // Symlinks can still point outside; check the deepest existing
        // ancestor.
        let mut probe = full.as_path();
        while !probe.exists() {
            match probe.parent() {
                Some(parent) => probe = parent,
                None => break,
            }
        }
        if let Ok(canonical) = dunce::canonicalize(probe) {
            if !canonical.starts_with(&self.root) {
                return Err(VfsError::path_escapes_root(format!(
                    "{} is not under {}",
                    canonical.display(),
                    self.root.display()
                )));
            }
        }

        Ok(full)
    }

    /// Check if write operations are allowed.
    fn check_writable(&self, path: &VfsPath, operation: &'static str) -> VfsResult<()> {
        if self.read_only {
            Err(VfsError::read_only(path.as_str(), operation))
        } else {
            Ok(())
        }
    }

    fn describe(&self, path: VfsPath, meta: &fs::Metadata) -> DirEntry {
        let entry = if meta.is_dir() {
            DirEntry::directory(path, &self.name)
        } else {
            DirEntry::file(path, meta.len(), &self.name)
        };
        let entry = match meta.modified() {
            Ok(modified) => entry.with_modified(modified),
            Err(_) => entry,
        };
        if self.read_only || meta.permissions().readonly() {
            entry.with_properties(EntryProperties::READONLY)
        } else {
            entry
        }
    }

    fn ensure_parent(full: &Path) -> VfsResult<()> {
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(())
    }
}

/// Recursively copy `from` into the not-yet-existing `to`.
fn copy_tree(from: &Path, to: &Path) -> io::Result<()> {
    let mut pending = vec![(from.to_path_buf(), to.to_path_buf())];
    while let Some((src, dest)) = pending.pop() {
        fs::create_dir(&dest)?;
        for entry in fs::read_dir(&src)? {
            let entry = entry?;
            let target = dest.join(entry.file_name());
            if entry.file_type()?.is_dir() {
                pending.push((entry.path(), target));
            } else {
                fs::copy(entry.path(), target)?;
            }
        }
    }
    Ok(())
}

/// Keep "not found" distinguishable from other I/O failures.
fn io_error(path: &VfsPath, err: io::Error) -> VfsError {
    match err.kind() {
        io::ErrorKind::NotFound => VfsError::not_found(path.as_str()),
        io::ErrorKind::AlreadyExists => VfsError::already_exists(path.as_str()),
        _ => VfsError::Io(err),
    }
}

fn canonical(path: &VfsPath) -> VfsPath {
    if path.is_absolute() {
        path.clone()
    } else {
        VfsPath::root().append(path)
    }
}

impl Backend for LocalBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> Capabilities {
        if self.read_only {
            Capabilities::PHYSICAL_PATHS | Capabilities::READ_ONLY
        } else {
            Capabilities::PHYSICAL_PATHS
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn on_mount(&self, point: &VfsPath) -> MountResult {
        if self.root.is_dir() {
            MountResult::Accepted
        } else {
            tracing::warn!(%point, root = %self.root.display(), "local root is not a directory");
            MountResult::ResourceUnavailable
        }
    }

    fn physical_path(&self, path: &VfsPath) -> Option<PathBuf> {
        let full = self.resolve(path).ok()?;
        // Use dunce for clean canonical paths (no \\?\ on Windows)
        Some(dunce::canonicalize(&full).unwrap_or(full))
    }

    fn exists(&self, path: &VfsPath) -> bool {
        self.resolve(path).map(|p| p.exists()).unwrap_or(false)
    }

    fn metadata(&self, path: &VfsPath) -> VfsResult<DirEntry> {
        let full = self.resolve(path)?;
        let meta = fs::metadata(&full).map_err(|e| io_error(path, e))?;
        Ok(self.describe(canonical(path), &meta))
    }

    fn list_directory(&self, path: &VfsPath) -> VfsResult<Vec<DirEntry>> {
        let full = self.resolve(path)?;
        if !full.exists() {
            return Err(VfsError::not_found(path.as_str()));
        }
        if !full.is_dir() {
            return Err(VfsError::not_a_directory(path.as_str()));
        }
        let base = canonical(path);
        let mut entries = Vec::new();
        for entry in fs::read_dir(&full)? {
            let entry = entry?;
            let meta = entry.metadata()?;
            let name = entry.file_name().to_string_lossy().into_owned();
            entries.push(self.describe(base.join(&name), &meta));
        }

        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    fn create_file(&self, path: &VfsPath, overwrite: bool) -> VfsResult<()> {
        self.check_writable(path, "create_file")?;
        let full = self.resolve(path)?;
        if full.is_dir() {
            return Err(VfsError::is_a_directory(path.as_str()));
        }
        Self::ensure_parent(&full)?;
        let mut options = fs::OpenOptions::new();
        options.write(true);
        if overwrite {
            options.create(true).truncate(true);
        } else {
            options.create_new(true);
        }
        options.open(&full).map_err(|e| io_error(path, e))?;
        Ok(())
    }

    fn delete_file(&self, path: &VfsPath) -> VfsResult<()> {
        self.check_writable(path, "delete_file")?;
        let full = self.resolve(path)?;
        if full.is_dir() {
            return Err(VfsError::is_a_directory(path.as_str()));
        }
        fs::remove_file(&full).map_err(|e| io_error(path, e))?;
        Ok(())
    }

    fn move_file(&self, from: &VfsPath, to: &VfsPath, overwrite: bool) -> VfsResult<()> {
        self.check_writable(from, "move_file")?;
        let from_full = self.resolve(from)?;
        let to_full = self.resolve(to)?;
        if from_full.is_dir() {
            return Err(VfsError::is_a_directory(from.as_str()));
        }
        if to_full.exists() && !overwrite {
            return Err(VfsError::already_exists(to.as_str()));
        }
        Self::ensure_parent(&to_full)?;
        fs::rename(&from_full, &to_full)?;
        Ok(())
    }

    fn copy_file(&self, from: &VfsPath, to: &VfsPath, overwrite: bool) -> VfsResult<()> {
        self.check_writable(to, "copy_file")?;
        let from_full = self.resolve(from)?;
        let to_full = self.resolve(to)?;
        if from_full.is_dir() {
            return Err(VfsError::is_a_directory(from.as_str()));
        }
        if to_full.exists() && !overwrite {
            return Err(VfsError::already_exists(to.as_str()));
        }
        Self::ensure_parent(&to_full)?;
        fs::copy(&from_full, &to_full)?;
        Ok(())
    }

    fn open_read(&self, path: &VfsPath) -> VfsResult<ReadHandle> {
        let full = self.resolve(path)?;
        let file = fs::File::open(&full).map_err(|e| io_error(path, e))?;
        let meta = file.metadata()?;
        if meta.is_dir() {
            return Err(VfsError::is_a_directory(path.as_str()));
        }
        Ok(ReadHandle::new(file, meta.len()))
    }

    fn open_write(&self, path: &VfsPath, mode: OpenMode) -> VfsResult<WriteHandle> {
        self.check_writable(path, "open_write")?;
        let full = self.resolve(path)?;
        if full.is_dir() {
            return Err(VfsError::is_a_directory(path.as_str()));
        }
        if mode != OpenMode::Open {
            Self::ensure_parent(&full)?;
        }
        let mut options = fs::OpenOptions::new();
        match mode {
            OpenMode::CreateNew => options.write(true).create_new(true),
            OpenMode::Create => options.write(true).create(true).truncate(true),
            OpenMode::Open => options.write(true).truncate(true),
            OpenMode::Append => options.append(true).create(true),
        };
        let file = options.open(&full).map_err(|e| io_error(path, e))?;
        Ok(Box::new(io::BufWriter::new(file)) as Box<dyn Write + Send>)
    }

    fn create_directory(&self, path: &VfsPath) -> VfsResult<()> {
        self.check_writable(path, "create_directory")?;
        let full = self.resolve(path)?;
        if full.is_file() {
            return Err(VfsError::already_exists(path.as_str()));
        }
        fs::create_dir_all(&full)?;
        Ok(())
    }

    fn delete_directory(&self, path: &VfsPath, recursive: bool) -> VfsResult<()> {
        self.check_writable(path, "delete_directory")?;
        let full = self.resolve(path)?;
        if full == self.root {
            return Err(VfsError::invalid_path(path.as_str()));
        }
        if !full.is_dir() {
            return Err(if full.exists() {
                VfsError::not_a_directory(path.as_str())
            } else {
                VfsError::not_found(path.as_str())
            });
        }
        if recursive {
            fs::remove_dir_all(&full)?;
        } else {
            if fs::read_dir(&full)?.next().is_some() {
                return Err(VfsError::directory_not_empty(path.as_str()));
            }
            fs::remove_dir(&full)?;
        }
        Ok(())
    }

    fn move_directory(&self, from: &VfsPath, to: &VfsPath) -> VfsResult<()> {
        self.check_writable(from, "move_directory")?;
        let from_full = self.resolve(from)?;
        let to_full = self.resolve(to)?;
        if !from_full.is_dir() {
            return Err(VfsError::not_a_directory(from.as_str()));
        }
        if to_full.exists() {
            return Err(VfsError::already_exists(to.as_str()));
        }
        if to_full.starts_with(&from_full) {
            return Err(VfsError::invalid_path(format!("{} is inside {}", to, from)));
        }
        Self::ensure_parent(&to_full)?;
        fs::rename(&from_full, &to_full)?;
        Ok(())
    }

    fn copy_directory(&self, from: &VfsPath, to: &VfsPath) -> VfsResult<()> {
        self.check_writable(to, "copy_directory")?;
        let from_full = self.resolve(from)?;
        let to_full = self.resolve(to)?;
        if !from_full.is_dir() {
            return Err(VfsError::not_a_directory(from.as_str()));
        }
        if to_full.exists() {
            return Err(VfsError::already_exists(to.as_str()));
        }
        if to_full.starts_with(&from_full) {
            return Err(VfsError::invalid_path(format!("{} is inside {}", to, from)));
        }
        Self::ensure_parent(&to_full)?;
        copy_tree(&from_full, &to_full)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::TempDir;

    fn setup() -> (LocalBackend, TempDir) {
        let dir = TempDir::new().unwrap();
        let backend = LocalBackend::new(dir.path());
        (backend, dir)
    }

    fn p(raw: &str) -> VfsPath {
        VfsPath::from(raw)
    }

    #[test]
    fn test_write_and_read() {
        let (backend, _dir) = setup();

        let mut w = backend.open_write(&p("/test.txt"), OpenMode::CreateNew).unwrap();
        w.write_all(b"hello world").unwrap();
        w.flush().unwrap();
        drop(w);

        let mut handle = backend.open_read(&p("/test.txt")).unwrap();
        assert_eq!(handle.len(), 11);
        let mut data = Vec::new();
        handle.read_to_end(&mut data).unwrap();
        assert_eq!(data, b"hello world");
    }

    #[test]
    fn test_mkdir_and_list() {
        let (backend, _dir) = setup();

        backend.create_directory(&p("subdir")).unwrap();
        backend.create_file(&p("subdir/file.txt"), false).unwrap();
        backend.create_file(&p("root.txt"), false).unwrap();

        let entries = backend.list_directory(&VfsPath::root()).unwrap();
        let paths: Vec<_> = entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["/root.txt", "/subdir"]);
        assert!(entries[1].is_dir());
    }

    #[test]
    fn test_create_file_respects_overwrite() {
        let (backend, dir) = setup();
        std::fs::write(dir.path().join("a.txt"), "content").unwrap();

        let result = backend.create_file(&p("/a.txt"), false);
        assert!(matches!(result, Err(VfsError::AlreadyExists(_))));

        let result = backend.open_write(&p("/a.txt"), OpenMode::CreateNew);
        assert!(matches!(result, Err(VfsError::AlreadyExists(_))));

        backend.create_file(&p("/a.txt"), true).unwrap();
        assert_eq!(backend.metadata(&p("/a.txt")).unwrap().size, 0);
    }

    #[test]
    fn test_read_only() {
        let (mut backend, _dir) = setup();
        backend.set_read_only(true);
        assert!(backend.capabilities().is_read_only());

        let result = backend.create_file(&p("test.txt"), false);
        assert!(matches!(result, Err(VfsError::ReadOnly { .. })));
    }

    #[test]
    fn test_path_escape_blocked() {
        let (backend, _dir) = setup();

        let result = backend.open_read(&p("../../../etc/passwd"));
        assert!(matches!(result, Err(VfsError::PathEscapesRoot(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_escape_blocked() {
        let (backend, dir) = setup();
        let outside = TempDir::new().unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("link")).unwrap();

        let result = backend.create_file(&p("/link/evil.txt"), false);
        assert!(matches!(result, Err(VfsError::PathEscapesRoot(_))));
    }

    #[test]
    fn test_move_and_copy_directory() {
        let (backend, dir) = setup();
        std::fs::create_dir_all(dir.path().join("src/nested")).unwrap();
        std::fs::write(dir.path().join("src/nested/f.txt"), "x").unwrap();

        backend.copy_directory(&p("/src"), &p("/copy")).unwrap();
        assert!(dir.path().join("copy/nested/f.txt").is_file());

        backend.move_directory(&p("/src"), &p("/moved")).unwrap();
        assert!(!dir.path().join("src").exists());
        assert!(dir.path().join("moved/nested/f.txt").is_file());

        let result = backend.copy_directory(&p("/moved"), &p("/moved/inner"));
        assert!(matches!(result, Err(VfsError::InvalidPath(_))));
    }

    #[test]
    fn test_delete_directory_not_empty() {
        let (backend, dir) = setup();
        std::fs::create_dir(dir.path().join("full")).unwrap();
        std::fs::write(dir.path().join("full/f"), "x").unwrap();

        let result = backend.delete_directory(&p("/full"), false);
        assert!(matches!(result, Err(VfsError::DirectoryNotEmpty(_))));
        backend.delete_directory(&p("/full"), true).unwrap();
        assert!(!dir.path().join("full").exists());
    }

    #[test]
    fn test_physical_path() {
        let (backend, dir) = setup();
        std::fs::write(dir.path().join("test.txt"), "hello").unwrap();

        let real = backend.physical_path(&p("/test.txt")).unwrap();
        assert!(real.is_absolute());
        assert!(real.ends_with("test.txt"));
        assert!(backend.physical_path(&p("../etc/passwd")).is_none());
    }

    #[test]
    fn test_on_mount_requires_root() {
        let (backend, _dir) = setup();
        assert_eq!(backend.on_mount(&p("/data")), MountResult::Accepted);

        let missing = LocalBackend::new("/definitely/not/a/real/root");
        assert_eq!(missing.on_mount(&p("/data")), MountResult::ResourceUnavailable);
    }
}
