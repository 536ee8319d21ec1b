//! Mount manifests.
//!
//! A manifest names backends and lists where to mount them:
//!
//! ```ron
//! (
//!     backends: {
//!         "scratch": Memory(),
//!         "staging": Memory(commit: true),
//!         "assets": Local(root: "/srv/assets", read_only: true),
//!     },
//!     mounts: [
//!         (point: "/", backend: "scratch"),
//!         (point: "/assets", backend: "assets"),
//!     ],
//! )
//! ```
//!
//! Mounts are applied in order through the regular negotiation. A backend
//! named by several mounts is one shared instance.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::Span;

use crate::vfs::{Backend, LocalBackend, MemoryBackend, Vfs, VfsError, VfsPath};

/// Error type for manifest loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON parse error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("mount failed: {0}")]
    Vfs(#[from] VfsError),
}

/// How to construct one backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendSpec {
    Memory {
        #[serde(default)]
        commit: bool,
        #[serde(default)]
        read_only: bool,
    },
    Local {
        root: PathBuf,
        #[serde(default)]
        read_only: bool,
    },
}

impl BackendSpec {
    fn instantiate(&self, name: &str) -> Arc<dyn Backend> {
        match self {
            BackendSpec::Memory { commit, read_only } => {
                let backend = if *commit {
                    MemoryBackend::with_commit()
                } else {
                    MemoryBackend::new()
                };
                backend.set_read_only(*read_only);
                Arc::new(backend.named(name))
            }
            BackendSpec::Local { root, read_only } => {
                let backend = if *read_only {
                    LocalBackend::read_only(root)
                } else {
                    LocalBackend::new(root)
                };
                Arc::new(backend.named(name))
            }
        }
    }
}

/// One mount instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountSpec {
    pub point: VfsPath,
    pub backend: String,
    /// Override a refusal from the backend.
    #[serde(default)]
    pub force: bool,
}

/// A parsed mount manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VfsConfig {
    #[serde(default)]
    pub backends: BTreeMap<String, BackendSpec>,
    #[serde(default)]
    pub mounts: Vec<MountSpec>,
}

impl VfsConfig {
    /// Parse a manifest from RON text.
    pub fn from_ron_str(text: &str) -> Result<Self, ConfigError> {
        Ok(ron::from_str(text)?)
    }

    /// Read and parse a manifest file.
    ///
    /// Relative `Local` roots are taken relative to the manifest's directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let mut config = Self::from_ron_str(&text)?;
        if let Some(base) = path.parent() {
            for spec in config.backends.values_mut() {
                if let BackendSpec::Local { root, .. } = spec {
                    if root.is_relative() {
                        *root = base.join(&*root);
                    }
                }
            }
        }
        tracing::debug!(
            path = %path.display(),
            backends = config.backends.len(),
            mounts = config.mounts.len(),
            "loaded mount manifest"
        );
        Ok(config)
    }

    /// Build a namespace with no parent span.
    pub fn build(&self) -> Result<Vfs, ConfigError> {
        self.build_with_span(Span::none())
    }

    /// Instantiate every backend once and apply the mounts in order.
    pub fn build_with_span(&self, span: Span) -> Result<Vfs, ConfigError> {
        let instances: BTreeMap<&str, Arc<dyn Backend>> = self
            .backends
            .iter()
            .map(|(name, spec)| (name.as_str(), spec.instantiate(name)))
            .collect();

        let vfs = Vfs::with_span(span);
        for mount in &self.mounts {
            let backend = instances.get(mount.backend.as_str()).ok_or_else(|| {
                VfsError::MissingBackend {
                    path: mount.point.to_string(),
                    reason: format!("backend {:?} is not defined", mount.backend),
                }
            })?;
            vfs.mount_arc(&mount.point, Arc::clone(backend), mount.force)?;
        }
        Ok(vfs)
    }
}
