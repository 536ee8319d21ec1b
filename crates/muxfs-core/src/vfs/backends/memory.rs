//! In-memory filesystem backend.
//!
//! The tree is an arena of nodes addressed by index. Children are held by
//! handle in their parent's name map and each node records its parent's
//! handle, so moves are a detach/attach of one handle and recursive deletes
//! walk the arena without any reference cycles to break. Freed slots are
//! reused.
//!
//! With [`MemoryBackend::with_commit`] the backend advertises
//! `REQUIRES_COMMIT`: changes are visible immediately, `commit()` makes the
//! current tree the durable one, and `discard()` rolls back to it.

use std::any::Any;
use std::collections::BTreeMap;
use std::io::{self, Cursor, Write};
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::RwLock;

use crate::vfs::backend::{Backend, ReadHandle, WriteHandle};
use crate::vfs::error::{VfsError, VfsResult};
use crate::vfs::path::VfsPath;
use crate::vfs::types::{Capabilities, DirEntry, EntryProperties, OpenMode, UnmountResult};

type NodeId = usize;

const ROOT: NodeId = 0;

#[derive(Debug, Clone)]
enum NodeKind {
    File { data: Vec<u8> },
    Directory { children: BTreeMap<String, NodeId> },
}

#[derive(Debug, Clone)]
struct Node {
    name: String,
    parent: Option<NodeId>,
    kind: NodeKind,
    modified: SystemTime,
}

impl Node {
    fn file(data: Vec<u8>) -> Self {
        Self {
            name: String::new(),
            parent: None,
            kind: NodeKind::File { data },
            modified: SystemTime::now(),
        }
    }

    fn directory() -> Self {
        Self {
            name: String::new(),
            parent: None,
            kind: NodeKind::Directory {
                children: BTreeMap::new(),
            },
            modified: SystemTime::now(),
        }
    }

    fn is_dir(&self) -> bool {
        matches!(self.kind, NodeKind::Directory { .. })
    }
}

/// Arena of nodes. Slot 0 is always the root directory.
#[derive(Debug, Clone)]
struct Tree {
    nodes: Vec<Option<Node>>,
    free: Vec<NodeId>,
}

impl Tree {
    fn new() -> Self {
        Self {
            nodes: vec![Some(Node::directory())],
            free: Vec::new(),
        }
    }

    fn node(&self, id: NodeId) -> &Node {
        self.nodes[id].as_ref().expect("stale memory node handle")
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        self.nodes[id].as_mut().expect("stale memory node handle")
    }

    fn alloc(&mut self, node: Node) -> NodeId {
        match self.free.pop() {
            Some(id) => {
                self.nodes[id] = Some(node);
                id
            }
            None => {
                self.nodes.push(Some(node));
                self.nodes.len() - 1
            }
        }
    }

    fn children(&self, id: NodeId) -> Option<&BTreeMap<String, NodeId>> {
        match &self.node(id).kind {
            NodeKind::Directory { children } => Some(children),
            NodeKind::File { .. } => None,
        }
    }

    fn lookup(&self, path: &VfsPath) -> Option<NodeId> {
        let mut current = ROOT;
        for segment in path.segments() {
            current = *self.children(current)?.get(segment)?;
        }
        Some(current)
    }

    /// Walk to `path`, creating missing directories.
    fn ensure_dir(&mut self, path: &VfsPath) -> VfsResult<NodeId> {
        let mut current = ROOT;
        for segment in path.segments() {
            let next = match &self.node(current).kind {
                NodeKind::Directory { children } => children.get(segment).copied(),
                NodeKind::File { .. } => return Err(VfsError::not_a_directory(path.as_str())),
            };
            current = match next {
                Some(id) => id,
                None => {
                    let id = self.alloc(Node::directory());
                    self.attach(current, segment, id);
                    id
                }
            };
        }
        if !self.node(current).is_dir() {
            return Err(VfsError::not_a_directory(path.as_str()));
        }
        Ok(current)
    }

    fn attach(&mut self, parent: NodeId, name: &str, id: NodeId) {
        {
            let node = self.node_mut(id);
            node.name = name.to_string();
            node.parent = Some(parent);
        }
        let parent_node = self.node_mut(parent);
        parent_node.modified = SystemTime::now();
        if let NodeKind::Directory { children } = &mut parent_node.kind {
            children.insert(name.to_string(), id);
        }
    }

    fn detach(&mut self, id: NodeId) {
        let (parent, name) = {
            let node = self.node_mut(id);
            (node.parent.take(), std::mem::take(&mut node.name))
        };
        if let Some(parent) = parent {
            let parent_node = self.node_mut(parent);
            parent_node.modified = SystemTime::now();
            if let NodeKind::Directory { children } = &mut parent_node.kind {
                children.remove(&name);
            }
        }
    }

    fn free_subtree(&mut self, id: NodeId) {
        self.detach(id);
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            if let Some(node) = self.nodes[next].take() {
                if let NodeKind::Directory { children } = node.kind {
                    stack.extend(children.into_values());
                }
                self.free.push(next);
            }
        }
    }

    /// Copy the subtree at `src` under `dest_parent` as `name`.
    fn copy_subtree(&mut self, src: NodeId, dest_parent: NodeId, name: &str) {
        let mut pending = vec![(src, dest_parent, name.to_string())];
        while let Some((from, parent, name)) = pending.pop() {
            // Snapshot children before attaching, so a copy placed inside its
            // own source is never revisited.
            let (copy, children) = match &self.node(from).kind {
                NodeKind::File { data } => (Node::file(data.clone()), Vec::new()),
                NodeKind::Directory { children } => (
                    Node::directory(),
                    children
                        .iter()
                        .map(|(child_name, &child)| (child, child_name.clone()))
                        .collect(),
                ),
            };
            let id = self.alloc(copy);
            self.attach(parent, &name, id);
            pending.extend(children.into_iter().map(|(child, child_name)| (child, id, child_name)));
        }
    }

    fn describe(&self, id: NodeId, path: VfsPath, backend: &str, read_only: bool) -> DirEntry {
        let node = self.node(id);
        let entry = match &node.kind {
            NodeKind::File { data } => DirEntry::file(path, data.len() as u64, backend),
            NodeKind::Directory { .. } => DirEntry::directory(path, backend),
        };
        let entry = entry.with_modified(node.modified);
        if read_only {
            entry.with_properties(EntryProperties::READONLY)
        } else {
            entry
        }
    }
}

#[derive(Debug)]
struct State {
    working: Tree,
    /// Last committed tree; `Some` only in commit mode.
    committed: Option<Tree>,
    dirty: bool,
    read_only: bool,
}

/// In-memory filesystem backend.
///
/// Thread-safe via an internal `RwLock`. All data is lost when dropped.
#[derive(Debug, Clone)]
pub struct MemoryBackend {
    name: String,
    state: Arc<RwLock<State>>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// Create a new empty in-memory filesystem.
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Create a backend whose changes must be committed.
    pub fn with_commit() -> Self {
        Self::build(Some(Tree::new()))
    }

    fn build(committed: Option<Tree>) -> Self {
        Self {
            name: "memory".to_string(),
            state: Arc::new(RwLock::new(State {
                working: Tree::new(),
                committed,
                dirty: false,
                read_only: false,
            })),
        }
    }

    /// Set the name reported in descriptors.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Freeze or unfreeze the tree.
    pub fn set_read_only(&self, read_only: bool) {
        self.state.write().read_only = read_only;
    }

    /// True when changes were made since the last commit or discard.
    pub fn is_dirty(&self) -> bool {
        self.state.read().dirty
    }

    /// Seed a file, creating parent directories. Ignores the read-only flag.
    pub fn insert_file(&self, path: impl Into<VfsPath>, data: impl Into<Vec<u8>>) -> VfsResult<()> {
        let path = path.into();
        validate(&path)?;
        let mut state = self.state.write();
        let tree = &mut state.working;
        let parent = tree.ensure_dir(&path.directory())?;
        put_file(tree, parent, &path, data.into(), true)?;
        state.dirty = true;
        Ok(())
    }

    fn check_writable(state: &State, path: &VfsPath, operation: &'static str) -> VfsResult<()> {
        if state.read_only {
            Err(VfsError::read_only(path.as_str(), operation))
        } else {
            Ok(())
        }
    }

    /// Run a mutation against the working tree, marking it dirty on success.
    fn mutate<T>(
        &self,
        path: &VfsPath,
        operation: &'static str,
        f: impl FnOnce(&mut Tree) -> VfsResult<T>,
    ) -> VfsResult<T> {
        validate(path)?;
        let mut state = self.state.write();
        Self::check_writable(&state, path, operation)?;
        let out = f(&mut state.working)?;
        state.dirty = true;
        Ok(out)
    }
}

/// Reject `.` and `..` segments; the arena has no notion of them.
fn validate(path: &VfsPath) -> VfsResult<()> {
    if path.segments().any(|s| s == "." || s == "..") {
        return Err(VfsError::invalid_path(path.as_str()));
    }
    Ok(())
}

/// Backend paths are reported absolute.
fn canonical(path: &VfsPath) -> VfsPath {
    if path.is_absolute() {
        path.clone()
    } else {
        VfsPath::root().append(path)
    }
}

/// A directory cannot be moved or copied into itself.
fn reject_nested(from: &VfsPath, to: &VfsPath) -> VfsResult<()> {
    if canonical(to).is_under(&canonical(from)) {
        return Err(VfsError::invalid_path(format!("{} is inside {}", to, from)));
    }
    Ok(())
}

/// The last segment, or an error for the root.
fn leaf_name(path: &VfsPath) -> VfsResult<&str> {
    match path.segments().last() {
        Some(name) => Ok(name),
        None => Err(VfsError::invalid_path(path.as_str())),
    }
}

/// Place file content at `path` under `parent`.
fn put_file(tree: &mut Tree, parent: NodeId, path: &VfsPath, data: Vec<u8>, overwrite: bool) -> VfsResult<()> {
    let name = leaf_name(path)?;
    let existing = tree.children(parent).and_then(|c| c.get(name).copied());
    match existing {
        Some(id) => {
            let node = tree.node_mut(id);
            match &mut node.kind {
                NodeKind::Directory { .. } => Err(VfsError::is_a_directory(path.as_str())),
                NodeKind::File { .. } if !overwrite => Err(VfsError::already_exists(path.as_str())),
                NodeKind::File { data: existing } => {
                    *existing = data;
                    node.modified = SystemTime::now();
                    Ok(())
                }
            }
        }
        None => {
            let id = tree.alloc(Node::file(data));
            tree.attach(parent, name, id);
            Ok(())
        }
    }
}

fn file_node(tree: &Tree, path: &VfsPath) -> VfsResult<NodeId> {
    let id = tree
        .lookup(path)
        .ok_or_else(|| VfsError::not_found(path.as_str()))?;
    if tree.node(id).is_dir() {
        return Err(VfsError::is_a_directory(path.as_str()));
    }
    Ok(id)
}

fn dir_node(tree: &Tree, path: &VfsPath) -> VfsResult<NodeId> {
    let id = tree
        .lookup(path)
        .ok_or_else(|| VfsError::not_found(path.as_str()))?;
    if !tree.node(id).is_dir() {
        return Err(VfsError::not_a_directory(path.as_str()));
    }
    Ok(id)
}

/// Buffers writes and publishes the whole content on flush.
struct MemoryWriter {
    state: Arc<RwLock<State>>,
    path: VfsPath,
    buf: Vec<u8>,
    pending: bool,
}

impl MemoryWriter {
    fn publish(&mut self) -> VfsResult<()> {
        let mut state = self.state.write();
        let tree = &mut state.working;
        let id = file_node(tree, &self.path)?;
        let node = tree.node_mut(id);
        if let NodeKind::File { data } = &mut node.kind {
            data.clone_from(&self.buf);
        }
        node.modified = SystemTime::now();
        state.dirty = true;
        self.pending = false;
        Ok(())
    }
}

impl Write for MemoryWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(buf);
        self.pending = true;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.pending {
            self.publish()?;
        }
        Ok(())
    }
}

impl Drop for MemoryWriter {
    fn drop(&mut self) {
        if self.pending {
            if let Err(e) = self.publish() {
                tracing::warn!(path = %self.path, error = %e, "dropped memory writer could not publish");
            }
        }
    }
}

impl Backend for MemoryBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> Capabilities {
        let state = self.state.read();
        let mut caps = Capabilities::TRANSIENT;
        if state.committed.is_some() {
            caps |= Capabilities::REQUIRES_COMMIT;
        }
        if state.read_only {
            caps |= Capabilities::READ_ONLY;
        }
        caps
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn on_unmount(&self) -> UnmountResult {
        let state = self.state.read();
        if state.committed.is_some() && state.dirty {
            UnmountResult::UncommittedChanges
        } else {
            UnmountResult::Accepted
        }
    }

    fn commit(&self) -> VfsResult<()> {
        let mut state = self.state.write();
        if state.committed.is_some() {
            state.committed = Some(state.working.clone());
            state.dirty = false;
            tracing::debug!(backend = %self.name, "memory backend committed");
        }
        Ok(())
    }

    fn discard(&self) -> VfsResult<()> {
        let mut state = self.state.write();
        if let Some(committed) = state.committed.clone() {
            state.working = committed;
            state.dirty = false;
            tracing::debug!(backend = %self.name, "memory backend discarded changes");
        }
        Ok(())
    }

    fn exists(&self, path: &VfsPath) -> bool {
        self.state.read().working.lookup(path).is_some()
    }

    fn metadata(&self, path: &VfsPath) -> VfsResult<DirEntry> {
        validate(path)?;
        let state = self.state.read();
        let id = state
            .working
            .lookup(path)
            .ok_or_else(|| VfsError::not_found(path.as_str()))?;
        Ok(state
            .working
            .describe(id, canonical(path), &self.name, state.read_only))
    }

    fn list_directory(&self, path: &VfsPath) -> VfsResult<Vec<DirEntry>> {
        validate(path)?;
        let state = self.state.read();
        let tree = &state.working;
        let id = dir_node(tree, path)?;
        let base = canonical(path);
        let mut entries = Vec::new();
        if let Some(children) = tree.children(id) {
            for (name, &child) in children {
                entries.push(tree.describe(child, base.join(name), &self.name, state.read_only));
            }
        }
        Ok(entries)
    }

    fn create_file(&self, path: &VfsPath, overwrite: bool) -> VfsResult<()> {
        self.mutate(path, "create_file", |tree| {
            let parent = tree.ensure_dir(&path.directory())?;
            put_file(tree, parent, path, Vec::new(), overwrite)
        })
    }

    fn delete_file(&self, path: &VfsPath) -> VfsResult<()> {
        self.mutate(path, "delete_file", |tree| {
            let id = file_node(tree, path)?;
            tree.free_subtree(id);
            Ok(())
        })
    }

    fn move_file(&self, from: &VfsPath, to: &VfsPath, overwrite: bool) -> VfsResult<()> {
        validate(to)?;
        self.mutate(from, "move_file", |tree| {
            let src = file_node(tree, from)?;
            if tree.lookup(to) == Some(src) {
                return Ok(());
            }
            let name = leaf_name(to)?;
            let parent = tree.ensure_dir(&to.directory())?;
            if let Some(existing) = tree.children(parent).and_then(|c| c.get(name).copied()) {
                if tree.node(existing).is_dir() {
                    return Err(VfsError::is_a_directory(to.as_str()));
                }
                if !overwrite {
                    return Err(VfsError::already_exists(to.as_str()));
                }
                tree.free_subtree(existing);
            }
            tree.detach(src);
            tree.attach(parent, name, src);
            Ok(())
        })
    }

    fn copy_file(&self, from: &VfsPath, to: &VfsPath, overwrite: bool) -> VfsResult<()> {
        validate(to)?;
        self.mutate(from, "copy_file", |tree| {
            let src = file_node(tree, from)?;
            let data = match &tree.node(src).kind {
                NodeKind::File { data } => data.clone(),
                NodeKind::Directory { .. } => return Err(VfsError::is_a_directory(from.as_str())),
            };
            let parent = tree.ensure_dir(&to.directory())?;
            put_file(tree, parent, to, data, overwrite)
        })
    }

    fn open_read(&self, path: &VfsPath) -> VfsResult<ReadHandle> {
        validate(path)?;
        let state = self.state.read();
        let id = file_node(&state.working, path)?;
        match &state.working.node(id).kind {
            NodeKind::File { data } => {
                let len = data.len() as u64;
                Ok(ReadHandle::new(Cursor::new(data.clone()), len))
            }
            NodeKind::Directory { .. } => Err(VfsError::is_a_directory(path.as_str())),
        }
    }

    fn open_write(&self, path: &VfsPath, mode: OpenMode) -> VfsResult<WriteHandle> {
        let initial = self.mutate(path, "open_write", |tree| {
            let existing = tree.lookup(path);
            if let Some(id) = existing {
                if tree.node(id).is_dir() {
                    return Err(VfsError::is_a_directory(path.as_str()));
                }
            }
            match (mode, existing) {
                (OpenMode::CreateNew, Some(_)) => Err(VfsError::already_exists(path.as_str())),
                (OpenMode::Open, None) => Err(VfsError::not_found(path.as_str())),
                (OpenMode::Append, Some(id)) => match &tree.node(id).kind {
                    NodeKind::File { data } => Ok(data.clone()),
                    NodeKind::Directory { .. } => Err(VfsError::is_a_directory(path.as_str())),
                },
                _ => {
                    let parent = tree.ensure_dir(&path.directory())?;
                    put_file(tree, parent, path, Vec::new(), true)?;
                    Ok(Vec::new())
                }
            }
        })?;
        Ok(Box::new(MemoryWriter {
            state: Arc::clone(&self.state),
            path: path.clone(),
            buf: initial,
            pending: false,
        }))
    }

    fn create_directory(&self, path: &VfsPath) -> VfsResult<()> {
        self.mutate(path, "create_directory", |tree| {
            if let Some(id) = tree.lookup(path) {
                if !tree.node(id).is_dir() {
                    return Err(VfsError::already_exists(path.as_str()));
                }
            }
            tree.ensure_dir(path).map(|_| ())
        })
    }

    fn delete_directory(&self, path: &VfsPath, recursive: bool) -> VfsResult<()> {
        self.mutate(path, "delete_directory", |tree| {
            let id = dir_node(tree, path)?;
            if id == ROOT {
                return Err(VfsError::invalid_path(path.as_str()));
            }
            let empty = tree.children(id).is_none_or(|c| c.is_empty());
            if !empty && !recursive {
                return Err(VfsError::directory_not_empty(path.as_str()));
            }
            tree.free_subtree(id);
            Ok(())
        })
    }

    fn move_directory(&self, from: &VfsPath, to: &VfsPath) -> VfsResult<()> {
        validate(to)?;
        reject_nested(from, to)?;
        self.mutate(from, "move_directory", |tree| {
            let src = dir_node(tree, from)?;
            if src == ROOT {
                return Err(VfsError::invalid_path(from.as_str()));
            }
            if tree.lookup(to).is_some() {
                return Err(VfsError::already_exists(to.as_str()));
            }
            let name = leaf_name(to)?;
            let parent = tree.ensure_dir(&to.directory())?;
            tree.detach(src);
            tree.attach(parent, name, src);
            Ok(())
        })
    }

    fn copy_directory(&self, from: &VfsPath, to: &VfsPath) -> VfsResult<()> {
        validate(to)?;
        reject_nested(from, to)?;
        self.mutate(from, "copy_directory", |tree| {
            let src = dir_node(tree, from)?;
            if tree.lookup(to).is_some() {
                return Err(VfsError::already_exists(to.as_str()));
            }
            let name = leaf_name(to)?;
            let parent = tree.ensure_dir(&to.directory())?;
            tree.copy_subtree(src, parent, name);
            Ok(())
        })
    }
}
