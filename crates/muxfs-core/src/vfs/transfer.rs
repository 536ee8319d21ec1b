//! Cross-backend transfers.
//!
//! When a move or copy spans two backend instances there is no native
//! operation to call, so the content is streamed: a read on the source, a
//! write on the destination, a byte-count check, an optional commit and, for
//! moves, a delete of the source.

use std::io::{self, Read, Write};

use super::backend::Backend;
use super::error::{VfsError, VfsResult};
use super::path::VfsPath;
use super::types::{EntryKind, OpenMode};

/// Bytes moved per read/write round trip.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// One side of a transfer.
#[derive(Clone, Copy)]
pub struct Endpoint<'a> {
    pub backend: &'a dyn Backend,
    /// Path handed to the backend.
    pub path: &'a VfsPath,
    /// Namespace path, used in errors and logs.
    pub display: &'a VfsPath,
}

impl<'a> Endpoint<'a> {
    pub fn new(backend: &'a dyn Backend, path: &'a VfsPath, display: &'a VfsPath) -> Self {
        Self {
            backend,
            path,
            display,
        }
    }
}

/// What a directory transfer touched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferReport {
    /// Source namespace paths, in replay order.
    pub entries: Vec<VfsPath>,
    pub directories: usize,
    pub files: usize,
    pub bytes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Copy,
    Move,
}

impl Mode {
    fn operation(self) -> &'static str {
        match self {
            Mode::Copy => "copy",
            Mode::Move => "move",
        }
    }
}

/// A descendant found while enumerating a source directory.
struct Pending {
    kind: EntryKind,
    depth: usize,
    relative: VfsPath,
}

/// Streams content between two distinct backends.
#[derive(Debug, Clone)]
pub struct TransferEngine {
    chunk_size: usize,
}

impl Default for TransferEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TransferEngine {
    pub fn new() -> Self {
        Self {
            chunk_size: CHUNK_SIZE,
        }
    }

    /// Override the chunk size. Zero is bumped to one byte.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Copy one file. Returns the number of bytes written.
    pub fn copy_file(&self, src: Endpoint<'_>, dst: Endpoint<'_>, overwrite: bool) -> VfsResult<u64> {
        self.transfer_file(src, dst, overwrite, Mode::Copy)
    }

    /// Move one file: copy, then delete the source.
    pub fn move_file(&self, src: Endpoint<'_>, dst: Endpoint<'_>, overwrite: bool) -> VfsResult<u64> {
        self.transfer_file(src, dst, overwrite, Mode::Move)
    }

    /// Replay a directory tree onto another backend.
    pub fn copy_directory(&self, src: Endpoint<'_>, dst: Endpoint<'_>) -> VfsResult<TransferReport> {
        self.transfer_directory(src, dst, Mode::Copy)
    }

    /// Replay a directory tree, then delete the source tree.
    pub fn move_directory(&self, src: Endpoint<'_>, dst: Endpoint<'_>) -> VfsResult<TransferReport> {
        self.transfer_directory(src, dst, Mode::Move)
    }

    fn check_writable(&self, src: Endpoint<'_>, dst: Endpoint<'_>, mode: Mode) -> VfsResult<()> {
        if dst.backend.capabilities().is_read_only() {
            return Err(VfsError::read_only(dst.display.as_str(), mode.operation()));
        }
        if mode == Mode::Move && src.backend.capabilities().is_read_only() {
            return Err(VfsError::read_only(src.display.as_str(), mode.operation()));
        }
        Ok(())
    }

    fn transfer_file(&self, src: Endpoint<'_>, dst: Endpoint<'_>, overwrite: bool, mode: Mode) -> VfsResult<u64> {
        self.check_writable(src, dst, mode)?;
        let copied = self.stream(src, dst, overwrite)?;

        if mode == Mode::Move {
            if let Err(cause) = src.backend.delete_file(src.path) {
                return Err(inconsistent(src, dst, cause));
            }
            commit_source(src, dst)?;
        }

        tracing::debug!(
            from = %src.display,
            to = %dst.display,
            bytes = copied,
            op = mode.operation(),
            "cross-backend file transfer complete"
        );
        Ok(copied)
    }

    /// Steps shared by every file: open, pump, verify, commit.
    fn stream(&self, src: Endpoint<'_>, dst: Endpoint<'_>, overwrite: bool) -> VfsResult<u64> {
        let mut reader = src.backend.open_read(src.path)?;
        let expected = reader.len();
        let mut writer = dst.backend.open_write(dst.path, OpenMode::for_overwrite(overwrite))?;

        let mut buf = vec![0u8; self.chunk_size.min(expected.max(1) as usize)];
        let mut copied: u64 = 0;
        loop {
            let n = match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            writer.write_all(&buf[..n])?;
            copied += n as u64;
            tracing::trace!(path = %src.display, chunk = n, copied, "chunk");
        }
        writer.flush()?;

        if copied != expected {
            return Err(VfsError::LengthMismatch {
                path: src.display.to_string(),
                expected,
                actual: copied,
            });
        }

        // Streams must be closed before the destination commits.
        drop(reader);
        drop(writer);
        if dst.backend.capabilities().requires_commit() {
            dst.backend.commit()?;
        }
        Ok(copied)
    }

    fn transfer_directory(&self, src: Endpoint<'_>, dst: Endpoint<'_>, mode: Mode) -> VfsResult<TransferReport> {
        self.check_writable(src, dst, mode)?;
        dst.backend.create_directory(dst.path)?;

        let root = src.backend.metadata(src.path)?;
        if !root.is_dir() {
            return Err(VfsError::not_a_directory(src.display.as_str()));
        }

        let mut report = TransferReport::default();
        let pending = enumerate(src)?;
        if pending.is_empty() {
            report.entries.push(src.display.clone());
        }

        for entry in &pending {
            let from = src.path.append(&entry.relative);
            let to = dst.path.append(&entry.relative);
            let from_display = src.display.append(&entry.relative);
            let to_display = dst.display.append(&entry.relative);
            match entry.kind {
                EntryKind::File => {
                    report.bytes += self.stream(
                        Endpoint::new(src.backend, &from, &from_display),
                        Endpoint::new(dst.backend, &to, &to_display),
                        true,
                    )?;
                    report.files += 1;
                }
                EntryKind::Directory | EntryKind::MountPoint => {
                    dst.backend.create_directory(&to)?;
                    report.directories += 1;
                }
            }
            report.entries.push(from_display);
        }

        if dst.backend.capabilities().requires_commit() {
            dst.backend.commit()?;
        }

        if mode == Mode::Move {
            if let Err(cause) = src.backend.delete_directory(src.path, true) {
                return Err(inconsistent(src, dst, cause));
            }
            commit_source(src, dst)?;
        }

        tracing::debug!(
            from = %src.display,
            to = %dst.display,
            files = report.files,
            directories = report.directories,
            bytes = report.bytes,
            op = mode.operation(),
            "cross-backend directory transfer complete"
        );
        Ok(report)
    }
}

/// Breadth-first walk of everything below `src`, ordered directories
/// first, then shallower before deeper, then by path.
fn enumerate(src: Endpoint<'_>) -> VfsResult<Vec<Pending>> {
    let mut found = Vec::new();
    let mut queue = std::collections::VecDeque::from([(VfsPath::empty(), 0usize)]);
    while let Some((relative, depth)) = queue.pop_front() {
        let listing = src.backend.list_directory(&src.path.append(&relative))?;
        for entry in listing {
            let child = relative.join(entry.name());
            if entry.is_dir() {
                queue.push_back((child.clone(), depth + 1));
            }
            found.push(Pending {
                kind: if entry.is_dir() {
                    EntryKind::Directory
                } else {
                    EntryKind::File
                },
                depth: depth + 1,
                relative: child,
            });
        }
    }
    found.sort_by(|a, b| {
        b.kind
            .is_dir()
            .cmp(&a.kind.is_dir())
            .then(a.depth.cmp(&b.depth))
            .then_with(|| a.relative.cmp(&b.relative))
    });
    Ok(found)
}

fn inconsistent(src: Endpoint<'_>, dst: Endpoint<'_>, cause: VfsError) -> VfsError {
    tracing::warn!(
        from = %src.display,
        to = %dst.display,
        error = %cause,
        "source delete failed after copy; content may exist at both ends"
    );
    VfsError::Inconsistent {
        source_path: src.display.to_string(),
        destination: dst.display.to_string(),
        cause: Box::new(cause),
    }
}

/// Make the source delete durable. A failure leaves both copies alive.
fn commit_source(src: Endpoint<'_>, dst: Endpoint<'_>) -> VfsResult<()> {
    if src.backend.capabilities().requires_commit() {
        src.backend
            .commit()
            .map_err(|cause| inconsistent(src, dst, cause))?;
    }
    Ok(())
}
