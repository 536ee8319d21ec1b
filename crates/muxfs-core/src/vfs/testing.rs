//! Scriptable backend for negotiation and failure-path tests.

use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use super::backend::{Backend, ReadHandle, WriteHandle};
use super::backends::MemoryBackend;
use super::error::{VfsError, VfsResult};
use super::path::VfsPath;
use super::types::{Capabilities, DirEntry, MountResult, OpenMode, UnmountResult};

/// A [`MemoryBackend`] whose answers can be overridden.
#[derive(Debug, Default)]
pub(crate) struct Scripted {
    pub inner: MemoryBackend,
    mount_code: Option<MountResult>,
    unmount_code: Option<UnmountResult>,
    fail_delete: bool,
    length_lie: u64,
    extra_caps: Option<Capabilities>,
    commits: AtomicUsize,
    calls: Mutex<Vec<(&'static str, VfsPath)>>,
}

impl Scripted {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn refuse_mount(mut self, code: MountResult) -> Self {
        self.mount_code = Some(code);
        self
    }

    pub fn refuse_unmount(mut self, code: UnmountResult) -> Self {
        self.unmount_code = Some(code);
        self
    }

    /// Every delete fails.
    pub fn failing_delete(mut self) -> Self {
        self.fail_delete = true;
        self
    }

    /// Read handles report `extra` more bytes than they deliver.
    pub fn lying_length(mut self, extra: u64) -> Self {
        self.length_lie = extra;
        self
    }

    pub fn with_capabilities(mut self, caps: Capabilities) -> Self {
        self.extra_caps = Some(caps);
        self
    }

    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    /// CRUD calls received so far, with the path the backend was handed.
    pub fn calls(&self) -> Vec<(&'static str, String)> {
        self.calls
            .lock()
            .iter()
            .map(|(op, path)| (*op, path.to_string()))
            .collect()
    }

    fn record(&self, op: &'static str, path: &VfsPath) {
        self.calls.lock().push((op, path.clone()));
    }
}

impl Backend for Scripted {
    fn name(&self) -> &str {
        "scripted"
    }

    fn capabilities(&self) -> Capabilities {
        self.inner.capabilities() | self.extra_caps.unwrap_or_default()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn on_mount(&self, _point: &VfsPath) -> MountResult {
        self.mount_code.unwrap_or(MountResult::Accepted)
    }

    fn on_unmount(&self) -> UnmountResult {
        self.unmount_code.unwrap_or(UnmountResult::Accepted)
    }

    fn commit(&self) -> VfsResult<()> {
        self.commits.fetch_add(1, Ordering::SeqCst);
        self.inner.commit()
    }

    fn metadata(&self, path: &VfsPath) -> VfsResult<DirEntry> {
        self.inner.metadata(path)
    }

    fn list_directory(&self, path: &VfsPath) -> VfsResult<Vec<DirEntry>> {
        self.inner.list_directory(path)
    }

    fn create_file(&self, path: &VfsPath, overwrite: bool) -> VfsResult<()> {
        self.record("create_file", path);
        self.inner.create_file(path, overwrite)
    }

    fn delete_file(&self, path: &VfsPath) -> VfsResult<()> {
        self.record("delete_file", path);
        if self.fail_delete {
            return Err(VfsError::other(format!("scripted delete failure: {path}")));
        }
        self.inner.delete_file(path)
    }

    fn move_file(&self, from: &VfsPath, to: &VfsPath, overwrite: bool) -> VfsResult<()> {
        self.inner.move_file(from, to, overwrite)
    }

    fn copy_file(&self, from: &VfsPath, to: &VfsPath, overwrite: bool) -> VfsResult<()> {
        self.inner.copy_file(from, to, overwrite)
    }

    fn open_read(&self, path: &VfsPath) -> VfsResult<ReadHandle> {
        let handle = self.inner.open_read(path)?;
        if self.length_lie == 0 {
            return Ok(handle);
        }
        let len = handle.len() + self.length_lie;
        Ok(ReadHandle::new(handle, len))
    }

    fn open_write(&self, path: &VfsPath, mode: OpenMode) -> VfsResult<WriteHandle> {
        self.inner.open_write(path, mode)
    }

    fn create_directory(&self, path: &VfsPath) -> VfsResult<()> {
        self.record("create_directory", path);
        self.inner.create_directory(path)
    }

    fn delete_directory(&self, path: &VfsPath, recursive: bool) -> VfsResult<()> {
        self.record("delete_directory", path);
        if self.fail_delete {
            return Err(VfsError::other(format!("scripted delete failure: {path}")));
        }
        self.inner.delete_directory(path, recursive)
    }

    fn move_directory(&self, from: &VfsPath, to: &VfsPath) -> VfsResult<()> {
        self.inner.move_directory(from, to)
    }

    fn copy_directory(&self, from: &VfsPath, to: &VfsPath) -> VfsResult<()> {
        self.inner.copy_directory(from, to)
    }
}
