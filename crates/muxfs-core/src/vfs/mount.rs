//! VFS mount table with longest-prefix routing.
//!
//! Routes namespace paths to the appropriate backend. Mutation is serialized
//! by one lock; exact-match lookups go through a concurrent snapshot and
//! never take it.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;

use super::backend::{Backend, same_backend};
use super::error::{VfsError, VfsResult};
use super::path::VfsPath;
use super::types::Capabilities;

/// Information about a mount point.
#[derive(Debug, Clone)]
pub struct MountInfo {
    /// The mount path (e.g., "/mnt/project").
    pub path: VfsPath,
    /// Name reported by the backend.
    pub backend: String,
    /// Backend capability flags at the time of listing.
    pub capabilities: Capabilities,
}

/// Outcome of resolving a namespace path.
#[derive(Clone)]
pub struct Resolution {
    pub backend: Arc<dyn Backend>,
    /// Mount point that matched.
    pub mount_point: VfsPath,
    /// Path handed to the backend.
    pub relative: VfsPath,
}

impl fmt::Debug for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolution")
            .field("backend", &self.backend.name())
            .field("mount_point", &self.mount_point)
            .field("relative", &self.relative)
            .finish()
    }
}

struct MountEntry {
    point: VfsPath,
    backend: Arc<dyn Backend>,
}

/// Scan order for overlapping mounts: longest first, then lexicographic.
fn scan_order(a: &VfsPath, b: &VfsPath) -> std::cmp::Ordering {
    b.len().cmp(&a.len()).then_with(|| a.cmp(b))
}

/// Routes namespace paths to mounted backends.
///
/// Mount points are matched by longest prefix. For example, if `/mnt` and
/// `/mnt/project` are both mounted, a path like `/mnt/project/src/main.rs`
/// will be routed to the `/mnt/project` mount. Paths no mount claims fall
/// back to a root mount when one exists.
pub struct MountTable {
    /// Every mount, keyed by exact normalized point.
    exact: DashMap<VfsPath, Arc<dyn Backend>>,
    /// Non-root mounts in scan order. Its lock serializes all mutation.
    ordered: Mutex<Vec<MountEntry>>,
}

impl fmt::Debug for MountTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MountTable")
            .field("mounts", &self.exact.len())
            .finish()
    }
}

impl Default for MountTable {
    fn default() -> Self {
        Self::new()
    }
}

impl MountTable {
    /// Create a new empty mount table.
    pub fn new() -> Self {
        Self {
            exact: DashMap::new(),
            ordered: Mutex::new(Vec::new()),
        }
    }

    /// Attach `backend` at `point` after negotiating with it.
    ///
    /// With `force`, a refusal from `on_mount` is logged and overridden. A
    /// directory marker on `point` is dropped, so `/mnt/` and `/mnt` name the
    /// same mount.
    pub fn mount(&self, point: &VfsPath, backend: Arc<dyn Backend>, force: bool) -> VfsResult<()> {
        let point = &point.strip_marker();
        if !point.is_absolute() {
            return Err(VfsError::InvalidMountPoint(point.to_string()));
        }

        let mut ordered = self.ordered.lock();
        if self.exact.contains_key(point) {
            return Err(VfsError::MountPointOccupied(point.to_string()));
        }

        let code = backend.on_mount(point);
        if !code.is_accepted() {
            if !force {
                tracing::warn!(%point, backend = backend.name(), %code, "mount refused");
                return Err(VfsError::MountRefused {
                    path: point.to_string(),
                    code,
                });
            }
            tracing::info!(%point, backend = backend.name(), %code, "forcing mount over refusal");
        }

        match self.exact.entry(point.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(Arc::clone(&backend));
            }
            // Checked above under the same lock.
            Entry::Occupied(_) => panic!("mount table corrupted: {point} appeared while locked"),
        }
        if !point.is_root() {
            let at = ordered.partition_point(|e| scan_order(&e.point, point).is_lt());
            ordered.insert(
                at,
                MountEntry {
                    point: point.clone(),
                    backend: Arc::clone(&backend),
                },
            );
        }

        tracing::info!(%point, backend = backend.name(), caps = %backend.capabilities(), "mounted");
        Ok(())
    }

    /// Detach the backend at exactly `point` and hand it back.
    pub fn unmount(&self, point: &VfsPath, force: bool) -> VfsResult<Arc<dyn Backend>> {
        let point = &point.strip_marker();
        let mut ordered = self.ordered.lock();
        let backend = match self.exact.get(point) {
            Some(backend) => Arc::clone(backend.value()),
            None => return Err(VfsError::backend_not_found(point.as_str(), "unmount")),
        };

        let code = backend.on_unmount();
        if !code.is_accepted() {
            if !force {
                tracing::warn!(%point, backend = backend.name(), %code, "unmount refused");
                return Err(VfsError::UnmountRefused {
                    path: point.to_string(),
                    code,
                });
            }
            tracing::info!(%point, backend = backend.name(), %code, "forcing unmount over refusal");
        }

        self.exact.remove(point);
        ordered.retain(|e| &e.point != point);
        tracing::info!(%point, backend = backend.name(), "unmounted");
        Ok(backend)
    }

    /// Whether something is mounted at exactly `point`.
    pub fn is_mounted(&self, point: &VfsPath) -> bool {
        self.exact.contains_key(&point.strip_marker())
    }

    /// The backend mounted at exactly `point`.
    pub fn get(&self, point: &VfsPath) -> Option<Arc<dyn Backend>> {
        self.exact
            .get(&point.strip_marker())
            .map(|b| Arc::clone(b.value()))
    }

    pub fn len(&self) -> usize {
        self.exact.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exact.is_empty()
    }

    /// Map a namespace path to its owning backend and backend-relative path.
    pub fn resolve(&self, path: &VfsPath) -> Option<Resolution> {
        let path = &path.strip_marker();
        if let Some(backend) = self.exact.get(path) {
            return Some(Resolution {
                backend: Arc::clone(backend.value()),
                mount_point: path.clone(),
                relative: VfsPath::root(),
            });
        }

        {
            let ordered = self.ordered.lock();
            for entry in ordered.iter() {
                let mp = entry.point.as_str();
                let Some(rest) = path.as_str().strip_prefix(mp) else {
                    continue;
                };
                // Guards /mnt from claiming /mnt2/file.
                if rest.is_empty() || rest.starts_with('/') {
                    return Some(Resolution {
                        backend: Arc::clone(&entry.backend),
                        mount_point: entry.point.clone(),
                        relative: path.reduce_start(mp, 0),
                    });
                }
            }
        }

        // Root catches everything else, including never-mounted prefixes.
        let root = VfsPath::root();
        self.exact.get(&root).map(|backend| Resolution {
            backend: Arc::clone(backend.value()),
            mount_point: root,
            relative: path.clone(),
        })
    }

    /// Reverse lookup by reference identity.
    ///
    /// A backend mounted at several points yields the lexicographically
    /// smallest of them.
    pub fn mount_point_of(&self, backend: &dyn Backend) -> Option<VfsPath> {
        self.exact
            .iter()
            .filter(|e| same_backend(e.value().as_ref(), backend))
            .map(|e| e.key().clone())
            .min()
    }

    /// All current mounts, sorted by path.
    pub fn list_mounts(&self) -> Vec<MountInfo> {
        let mut mounts: Vec<_> = self
            .exact
            .iter()
            .map(|e| MountInfo {
                path: e.key().clone(),
                backend: e.value().name().to_string(),
                capabilities: e.value().capabilities(),
            })
            .collect();
        mounts.sort_by(|a, b| a.path.cmp(&b.path));
        mounts
    }

    /// Mounts strictly below `path`, never including root.
    pub fn descendants_of(&self, path: &VfsPath) -> Vec<MountInfo> {
        let path = &path.strip_marker();
        self.list_mounts()
            .into_iter()
            .filter(|m| !m.path.is_root() && m.path != *path && m.path.is_under(path))
            .collect()
    }
}
