//! The namespace facade.
//!
//! [`Vfs`] is the single entry point clients use. Every call resolves its
//! path through the [`MountTable`], then either forwards to the owning
//! backend or, for moves and copies spanning two backends, drives the
//! [`TransferEngine`].

use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::Arc;

use tracing::Span;

use super::backend::{Backend, ReadHandle, WriteHandle, same_backend};
use super::error::{VfsError, VfsResult};
use super::mount::{MountInfo, MountTable, Resolution};
use super::path::VfsPath;
use super::transfer::{Endpoint, TransferEngine};
use super::types::{DirEntry, OpenMode};

/// A unified namespace over mounted backends.
pub struct Vfs {
    mounts: MountTable,
    transfer: TransferEngine,
    span: Span,
}

impl std::fmt::Debug for Vfs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vfs")
            .field("mounts", &self.mounts)
            .field("transfer", &self.transfer)
            .finish()
    }
}

impl Default for Vfs {
    fn default() -> Self {
        Self::new()
    }
}

/// Backend path for file and directory CRUD. A mount's own root is sent as
/// the caller's full path.
fn crud_path(res: &Resolution, original: &VfsPath) -> VfsPath {
    if res.relative.is_root() && !original.is_root() {
        original.clone()
    } else {
        res.relative.clone()
    }
}

fn check_writable(res: &Resolution, path: &VfsPath, operation: &'static str) -> VfsResult<()> {
    if res.backend.capabilities().is_read_only() {
        tracing::warn!(%path, operation, backend = res.backend.name(), "rejected write to read-only backend");
        return Err(VfsError::read_only(path.as_str(), operation));
    }
    Ok(())
}

impl Vfs {
    /// An empty namespace whose events have no parent span.
    pub fn new() -> Self {
        Self::with_span(Span::none())
    }

    /// An empty namespace whose operations run under `span`.
    pub fn with_span(span: Span) -> Self {
        Self {
            mounts: MountTable::new(),
            transfer: TransferEngine::new(),
            span,
        }
    }

    /// Replace the engine used for cross-backend moves and copies.
    pub fn with_transfer_engine(mut self, transfer: TransferEngine) -> Self {
        self.transfer = transfer;
        self
    }

    /// The span every operation is parented to.
    pub fn span(&self) -> &Span {
        &self.span
    }

    // ========================================================================
    // Mount management
    // ========================================================================

    /// Mount a backend at `point`.
    pub fn mount(&self, point: impl Into<VfsPath>, backend: impl Backend, force: bool) -> VfsResult<()> {
        self.mount_arc(point, Arc::new(backend), force)
    }

    /// Mount a backend (already wrapped in Arc) at `point`.
    pub fn mount_arc(&self, point: impl Into<VfsPath>, backend: Arc<dyn Backend>, force: bool) -> VfsResult<()> {
        let _enter = self.span.enter();
        self.mounts.mount(&point.into(), backend, force)
    }

    /// Unmount whatever is mounted at exactly `point` and return it.
    pub fn unmount(&self, point: impl Into<VfsPath>, force: bool) -> VfsResult<Arc<dyn Backend>> {
        let _enter = self.span.enter();
        self.mounts.unmount(&point.into(), force)
    }

    pub fn is_mounted(&self, point: impl Into<VfsPath>) -> bool {
        self.mounts.is_mounted(&point.into())
    }

    /// Resolve without failing; `None` when no backend owns the path.
    pub fn try_resolve_backend(&self, path: impl Into<VfsPath>) -> Option<Resolution> {
        self.mounts.resolve(&path.into())
    }

    /// All mounts, sorted by path.
    pub fn list_mount_points(&self) -> Vec<MountInfo> {
        self.mounts.list_mounts()
    }

    /// Where `backend` is mounted, by reference identity.
    pub fn mount_point_of(&self, backend: &dyn Backend) -> Option<VfsPath> {
        self.mounts.mount_point_of(backend)
    }

    /// Run `f` against the backend owning `path` as its concrete type.
    ///
    /// `f` receives the backend-relative path.
    pub fn execute_as<B, R>(&self, path: impl Into<VfsPath>, f: impl FnOnce(&B, &VfsPath) -> R) -> VfsResult<R>
    where
        B: Backend,
    {
        let path = path.into();
        let res = self.resolve(&path, "execute_as")?;
        match res.backend.as_any().downcast_ref::<B>() {
            Some(backend) => Ok(f(backend, &res.relative)),
            None => Err(VfsError::TypeMismatch {
                path: path.to_string(),
                expected: std::any::type_name::<B>(),
                actual: res.backend.name().to_string(),
            }),
        }
    }

    /// Commit the backend mounted at exactly `point`.
    #[tracing::instrument(parent = &self.span, level = "debug", skip_all, name = "vfs.commit")]
    pub fn commit(&self, point: impl Into<VfsPath>) -> VfsResult<()> {
        let point = point.into();
        let backend = self
            .mounts
            .get(&point)
            .ok_or_else(|| VfsError::backend_not_found(point.as_str(), "commit"))?;
        backend.commit()?;
        tracing::debug!(%point, backend = backend.name(), "committed");
        Ok(())
    }

    /// Discard buffered changes of the backend mounted at exactly `point`.
    #[tracing::instrument(parent = &self.span, level = "debug", skip_all, name = "vfs.discard")]
    pub fn discard(&self, point: impl Into<VfsPath>) -> VfsResult<()> {
        let point = point.into();
        let backend = self
            .mounts
            .get(&point)
            .ok_or_else(|| VfsError::backend_not_found(point.as_str(), "discard"))?;
        backend.discard()?;
        tracing::debug!(%point, backend = backend.name(), "discarded");
        Ok(())
    }

    fn resolve(&self, path: &VfsPath, operation: &'static str) -> VfsResult<Resolution> {
        match self.mounts.resolve(path) {
            Some(res) => {
                tracing::trace!(
                    %path,
                    operation,
                    mount = %res.mount_point,
                    relative = %res.relative,
                    "resolved"
                );
                Ok(res)
            }
            None => {
                tracing::debug!(%path, operation, "no backend owns path");
                Err(VfsError::backend_not_found(path.as_str(), operation))
            }
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Whether `path` exists. Resolution failures report `false`.
    pub fn exists(&self, path: impl Into<VfsPath>) -> bool {
        let path = path.into();
        match self.mounts.resolve(&path) {
            Some(res) => res.backend.exists(&res.relative),
            None => false,
        }
    }

    /// Describe one entry, with its namespace path.
    #[tracing::instrument(parent = &self.span, level = "debug", skip_all, name = "vfs.metadata")]
    pub fn metadata(&self, path: impl Into<VfsPath>) -> VfsResult<DirEntry> {
        let path = path.into();
        let res = self.resolve(&path, "metadata")?;
        let mut entry = res.backend.metadata(&res.relative)?;
        entry.path = path;
        Ok(entry)
    }

    /// Direct children of `path`, merged with mount points below it.
    ///
    /// Mount points shadow native entries with the same path. When nothing
    /// owns `path` but mounts exist, the mount table itself is listed.
    #[tracing::instrument(parent = &self.span, level = "debug", skip_all, name = "vfs.list_directory")]
    pub fn list_directory(&self, path: impl Into<VfsPath>) -> VfsResult<Vec<DirEntry>> {
        let path = path.into();
        let nested = self.mounts.descendants_of(&path);

        let Some(res) = self.mounts.resolve(&path) else {
            if self.mounts.is_empty() {
                return Err(VfsError::backend_not_found(path.as_str(), "list_directory"));
            }
            tracing::debug!(%path, "no owner; listing mount table");
            return Ok(self
                .mounts
                .list_mounts()
                .into_iter()
                .map(|m| DirEntry::mount_point(m.path, m.backend))
                .collect());
        };

        let native = match res.backend.list_directory(&res.relative) {
            Ok(entries) => entries,
            // A directory that only exists as the parent of a mount.
            Err(VfsError::NotFound(_)) if !nested.is_empty() => Vec::new(),
            Err(e) => return Err(e),
        };

        let mut merged = BTreeMap::new();
        for mut entry in native {
            entry.path = res.mount_point.append(&entry.path);
            merged.insert(entry.path.clone(), entry);
        }
        for mount in nested {
            merged.insert(mount.path.clone(), DirEntry::mount_point(mount.path, mount.backend));
        }
        tracing::debug!(%path, entries = merged.len(), "listed");
        Ok(merged.into_values().collect())
    }

    /// Real OS path behind `path`, if its backend exposes one.
    pub fn physical_path(&self, path: impl Into<VfsPath>) -> VfsResult<Option<PathBuf>> {
        let path = path.into();
        let res = self.resolve(&path, "physical_path")?;
        Ok(res.backend.physical_path(&res.relative))
    }

    // ========================================================================
    // Streams
    // ========================================================================

    #[tracing::instrument(parent = &self.span, level = "debug", skip_all, name = "vfs.open_read")]
    pub fn open_read(&self, path: impl Into<VfsPath>) -> VfsResult<ReadHandle> {
        let path = path.into();
        let res = self.resolve(&path, "open_read")?;
        res.backend.open_read(&res.relative)
    }

    #[tracing::instrument(parent = &self.span, level = "debug", skip_all, name = "vfs.open_write")]
    pub fn open_write(&self, path: impl Into<VfsPath>, mode: OpenMode) -> VfsResult<WriteHandle> {
        let path = path.into();
        let res = self.resolve(&path, "open_write")?;
        check_writable(&res, &path, "open_write")?;
        res.backend.open_write(&res.relative, mode)
    }

    /// Read a whole file.
    pub fn read_all(&self, path: impl Into<VfsPath>) -> VfsResult<Vec<u8>> {
        let mut handle = self.open_read(path)?;
        let mut data = Vec::with_capacity(handle.len() as usize);
        handle.read_to_end(&mut data)?;
        Ok(data)
    }

    /// Write a whole file, creating parents as the backend allows.
    pub fn write_all(&self, path: impl Into<VfsPath>, data: &[u8], overwrite: bool) -> VfsResult<()> {
        let mut handle = self.open_write(path, OpenMode::for_overwrite(overwrite))?;
        handle.write_all(data)?;
        handle.flush()?;
        Ok(())
    }

    // ========================================================================
    // Files
    // ========================================================================

    #[tracing::instrument(parent = &self.span, level = "debug", skip_all, name = "vfs.create_file")]
    pub fn create_file(&self, path: impl Into<VfsPath>, overwrite: bool) -> VfsResult<()> {
        let path = path.into();
        let res = self.resolve(&path, "create_file")?;
        check_writable(&res, &path, "create_file")?;
        res.backend.create_file(&crud_path(&res, &path), overwrite)
    }

    #[tracing::instrument(parent = &self.span, level = "debug", skip_all, name = "vfs.delete_file")]
    pub fn delete_file(&self, path: impl Into<VfsPath>) -> VfsResult<()> {
        let path = path.into();
        let res = self.resolve(&path, "delete_file")?;
        check_writable(&res, &path, "delete_file")?;
        res.backend.delete_file(&crud_path(&res, &path))
    }

    /// Move a file, streaming it when the ends live on different backends.
    #[tracing::instrument(parent = &self.span, level = "debug", skip_all, name = "vfs.move_file")]
    pub fn move_file(&self, from: impl Into<VfsPath>, to: impl Into<VfsPath>, overwrite: bool) -> VfsResult<()> {
        let (from, to) = (from.into(), to.into());
        let src = self.resolve(&from, "move_file")?;
        let dst = self.resolve(&to, "move_file")?;
        if same_backend(src.backend.as_ref(), dst.backend.as_ref()) {
            check_writable(&src, &from, "move_file")?;
            return src
                .backend
                .move_file(&crud_path(&src, &from), &crud_path(&dst, &to), overwrite);
        }
        self.transfer.move_file(
            Endpoint::new(src.backend.as_ref(), &src.relative, &from),
            Endpoint::new(dst.backend.as_ref(), &dst.relative, &to),
            overwrite,
        )?;
        Ok(())
    }

    /// Copy a file, streaming it when the ends live on different backends.
    #[tracing::instrument(parent = &self.span, level = "debug", skip_all, name = "vfs.copy_file")]
    pub fn copy_file(&self, from: impl Into<VfsPath>, to: impl Into<VfsPath>, overwrite: bool) -> VfsResult<()> {
        let (from, to) = (from.into(), to.into());
        let src = self.resolve(&from, "copy_file")?;
        let dst = self.resolve(&to, "copy_file")?;
        if same_backend(src.backend.as_ref(), dst.backend.as_ref()) {
            check_writable(&dst, &to, "copy_file")?;
            return src
                .backend
                .copy_file(&crud_path(&src, &from), &crud_path(&dst, &to), overwrite);
        }
        self.transfer.copy_file(
            Endpoint::new(src.backend.as_ref(), &src.relative, &from),
            Endpoint::new(dst.backend.as_ref(), &dst.relative, &to),
            overwrite,
        )?;
        Ok(())
    }

    // ========================================================================
    // Directories
    // ========================================================================

    #[tracing::instrument(parent = &self.span, level = "debug", skip_all, name = "vfs.create_directory")]
    pub fn create_directory(&self, path: impl Into<VfsPath>) -> VfsResult<()> {
        let path = path.into();
        let res = self.resolve(&path, "create_directory")?;
        check_writable(&res, &path, "create_directory")?;
        res.backend.create_directory(&crud_path(&res, &path))
    }

    #[tracing::instrument(parent = &self.span, level = "debug", skip_all, name = "vfs.delete_directory")]
    pub fn delete_directory(&self, path: impl Into<VfsPath>, recursive: bool) -> VfsResult<()> {
        let path = path.into();
        let res = self.resolve(&path, "delete_directory")?;
        check_writable(&res, &path, "delete_directory")?;
        res.backend
            .delete_directory(&crud_path(&res, &path), recursive)
    }

    #[tracing::instrument(parent = &self.span, level = "debug", skip_all, name = "vfs.move_directory")]
    pub fn move_directory(&self, from: impl Into<VfsPath>, to: impl Into<VfsPath>) -> VfsResult<()> {
        let (from, to) = (from.into(), to.into());
        let src = self.resolve(&from, "move_directory")?;
        let dst = self.resolve(&to, "move_directory")?;
        if same_backend(src.backend.as_ref(), dst.backend.as_ref()) {
            check_writable(&src, &from, "move_directory")?;
            return src
                .backend
                .move_directory(&crud_path(&src, &from), &crud_path(&dst, &to));
        }
        self.transfer.move_directory(
            Endpoint::new(src.backend.as_ref(), &src.relative, &from),
            Endpoint::new(dst.backend.as_ref(), &dst.relative, &to),
        )?;
        Ok(())
    }

    #[tracing::instrument(parent = &self.span, level = "debug", skip_all, name = "vfs.copy_directory")]
    pub fn copy_directory(&self, from: impl Into<VfsPath>, to: impl Into<VfsPath>) -> VfsResult<()> {
        let (from, to) = (from.into(), to.into());
        let src = self.resolve(&from, "copy_directory")?;
        let dst = self.resolve(&to, "copy_directory")?;
        if same_backend(src.backend.as_ref(), dst.backend.as_ref()) {
            check_writable(&dst, &to, "copy_directory")?;
            return src
                .backend
                .copy_directory(&crud_path(&src, &from), &crud_path(&dst, &to));
        }
        self.transfer.copy_directory(
            Endpoint::new(src.backend.as_ref(), &src.relative, &from),
            Endpoint::new(dst.backend.as_ref(), &dst.relative, &to),
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::backends::MemoryBackend;
    use crate::vfs::testing::Scripted;
    use crate::vfs::types::{EntryKind, MountResult};

    fn two_mounts() -> (Vfs, MemoryBackend, MemoryBackend) {
        let a = MemoryBackend::new().named("a");
        let b = MemoryBackend::new().named("b");
        let vfs = Vfs::new();
        vfs.mount("/", a.clone(), false).unwrap();
        vfs.mount("/sub", b.clone(), false).unwrap();
        (vfs, a, b)
    }

    #[test]
    fn test_read_write_through_mounts() {
        let (vfs, a, b) = two_mounts();
        vfs.write_all("/top.txt", b"on a", false).unwrap();
        vfs.write_all("/sub/inner.txt", b"on b", false).unwrap();

        assert!(a.exists(&VfsPath::from("/top.txt")));
        assert!(b.exists(&VfsPath::from("/inner.txt")));
        assert_eq!(vfs.read_all("/sub/inner.txt").unwrap(), b"on b");
    }

    #[test]
    fn test_unresolved_path_names_operation() {
        let vfs = Vfs::new();
        vfs.mount("/only", MemoryBackend::new(), false).unwrap();

        let err = vfs.read_all("/elsewhere/x").unwrap_err();
        match err {
            VfsError::BackendNotFound { path, operation } => {
                assert_eq!(path, "/elsewhere/x");
                assert_eq!(operation, "open_read");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!vfs.exists("/elsewhere/x"));
    }

    #[test]
    fn test_listing_merges_mount_points() {
        let (vfs, a, b) = two_mounts();
        a.insert_file("/readme.md", "hi").unwrap();
        b.insert_file("/inside.txt", "b").unwrap();

        let root = vfs.list_directory("/").unwrap();
        let names: Vec<_> = root.iter().map(|e| (e.path.as_str(), e.kind)).collect();
        assert_eq!(
            names,
            vec![("/readme.md", EntryKind::File), ("/sub", EntryKind::MountPoint)]
        );

        let sub = vfs.list_directory("/sub").unwrap();
        let paths: Vec<_> = sub.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["/sub/inside.txt"]);
    }

    #[test]
    fn test_mount_point_shadows_native_entry() {
        let (vfs, a, _b) = two_mounts();
        a.create_directory(&VfsPath::from("/sub")).unwrap();

        let root = vfs.list_directory("/").unwrap();
        assert_eq!(root.len(), 1);
        assert_eq!(root[0].kind, EntryKind::MountPoint);
        assert_eq!(root[0].backend, "b");
    }

    #[test]
    fn test_listing_parent_of_nested_mount() {
        let vfs = Vfs::new();
        vfs.mount("/", MemoryBackend::new(), false).unwrap();
        vfs.mount("/mnt/usb", MemoryBackend::new(), false).unwrap();

        let entries = vfs.list_directory("/mnt").unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].path.as_str(), "/mnt/usb");
    }

    #[test]
    fn test_listing_without_owner_lists_mounts() {
        let vfs = Vfs::new();
        assert!(matches!(
            vfs.list_directory("/"),
            Err(VfsError::BackendNotFound { .. })
        ));

        vfs.mount("/x", MemoryBackend::new(), false).unwrap();
        vfs.mount("/y", MemoryBackend::new(), false).unwrap();
        let entries = vfs.list_directory("/nowhere").unwrap();
        let paths: Vec<_> = entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["/x", "/y"]);
    }

    #[test]
    fn test_read_only_backend_rejects_mutation() {
        let vfs = Vfs::new();
        let frozen = MemoryBackend::new();
        frozen.insert_file("/keep.txt", "x").unwrap();
        frozen.set_read_only(true);
        vfs.mount("/ro", frozen, false).unwrap();

        for result in [
            vfs.create_file("/ro/new.txt", false),
            vfs.delete_file("/ro/keep.txt"),
            vfs.create_directory("/ro/dir"),
            vfs.write_all("/ro/keep.txt", b"y", true),
        ] {
            assert!(matches!(result, Err(VfsError::ReadOnly { .. })));
        }
        assert_eq!(vfs.read_all("/ro/keep.txt").unwrap(), b"x");
    }

    #[test]
    fn test_same_backend_move_is_native() {
        let vfs = Vfs::new();
        let mem = MemoryBackend::new();
        vfs.mount("/a", mem.clone(), false).unwrap();
        vfs.mount("/b", mem.clone(), false).unwrap();
        vfs.write_all("/a/f.txt", b"data", false).unwrap();

        // Both points route to one instance, so paths stay backend-relative.
        vfs.move_file("/a/f.txt", "/b/g.txt", false).unwrap();
        assert!(mem.exists(&VfsPath::from("/g.txt")));
        assert!(!mem.exists(&VfsPath::from("/f.txt")));
    }

    #[test]
    fn test_cross_backend_directory_move() {
        let (vfs, a, b) = two_mounts();
        a.insert_file("/docs/one.txt", "1").unwrap();
        a.insert_file("/docs/deep/two.txt", "22").unwrap();

        vfs.move_directory("/docs", "/sub/docs").unwrap();
        assert!(!vfs.exists("/docs"));
        assert_eq!(vfs.read_all("/sub/docs/deep/two.txt").unwrap(), b"22");
        assert!(b.exists(&VfsPath::from("/docs/one.txt")));
    }

    #[test]
    fn test_execute_as_checks_type() {
        let (vfs, _a, _b) = two_mounts();
        let name = vfs
            .execute_as("/sub/x", |mem: &MemoryBackend, rel| {
                format!("{}:{}", mem.name(), rel)
            })
            .unwrap();
        assert_eq!(name, "b:/x");

        let wrong = vfs.execute_as("/sub/x", |_: &Scripted, _| ());
        assert!(matches!(wrong, Err(VfsError::TypeMismatch { .. })));
    }

    #[test]
    fn test_forced_mount_is_visible() {
        let vfs = Vfs::new();
        let stubborn = Scripted::new().refuse_mount(MountResult::NotInitialized);
        assert!(vfs.mount("/s", Scripted::new().refuse_mount(MountResult::NotInitialized), false).is_err());
        vfs.mount("/s", stubborn, true).unwrap();
        assert!(vfs.is_mounted("/s"));
        assert!(vfs.try_resolve_backend("/s/file").is_some());
    }

    #[test]
    fn test_commit_and_discard_by_mount_point() {
        let vfs = Vfs::new();
        let staged = MemoryBackend::with_commit();
        vfs.mount("/stage", staged.clone(), false).unwrap();

        vfs.write_all("/stage/a", b"1", false).unwrap();
        vfs.commit("/stage").unwrap();
        vfs.write_all("/stage/b", b"2", false).unwrap();
        vfs.discard("/stage").unwrap();

        assert!(vfs.exists("/stage/a"));
        assert!(!vfs.exists("/stage/b"));
        assert!(matches!(vfs.commit("/nope"), Err(VfsError::BackendNotFound { .. })));
    }

    #[test]
    fn test_crud_on_mount_root_forwards_full_path() {
        let vfs = Vfs::new();
        vfs.mount("/", MemoryBackend::new(), false).unwrap();
        let recorder = Arc::new(Scripted::new());
        vfs.mount_arc("/sub", recorder.clone(), false).unwrap();

        vfs.create_directory("/sub").unwrap();
        vfs.create_directory("/sub/inner").unwrap();
        vfs.create_file("/sub", true).unwrap_err();
        vfs.delete_file("/sub").unwrap_err();
        vfs.delete_directory("/sub/inner", false).unwrap();

        assert_eq!(
            recorder.calls(),
            vec![
                ("create_directory", "/sub".to_string()),
                ("create_directory", "/inner".to_string()),
                ("create_file", "/sub".to_string()),
                ("delete_file", "/sub".to_string()),
                ("delete_directory", "/inner".to_string()),
            ]
        );
    }

    #[test]
    fn test_mount_point_of_through_facade() {
        let vfs = Vfs::new();
        let shared: Arc<dyn Backend> = Arc::new(MemoryBackend::new());
        vfs.mount_arc("/m", Arc::clone(&shared), false).unwrap();
        assert_eq!(vfs.mount_point_of(shared.as_ref()), Some(VfsPath::from("/m")));

        let back = vfs.unmount("/m", false).unwrap();
        assert!(same_backend(back.as_ref(), shared.as_ref()));
        assert!(vfs.mount_point_of(shared.as_ref()).is_none());
    }
}
