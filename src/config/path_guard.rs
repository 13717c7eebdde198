//! Root-contained path resolution.
//!
//! # Responsibilities
//! - Join an untrusted relative (or absolute) path onto a trusted root
//! - Normalize `.`, `..` and symlink indirection
//! - Prove the result is the root or a descendant of it
//!
//! # Design Decisions
//! - Containment is checked per path component (`Path::starts_with`), never
//!   by string prefix, so `/a/bc` is not inside `/a/b`
//! - Existing components are canonicalized one at a time so a symlink
//!   followed by `..` resolves the way the OS would resolve it
//! - The non-existent tail is normalized lexically; callers that need the
//!   target to exist check that separately
//! - `ResolvedPath` can only be built here

use std::fmt;
use std::io;
use std::ops::Deref;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;

/// Errors produced while resolving a path against the trusted root.
#[derive(Debug, Error)]
pub enum PathGuardError {
    #[error("project root {root} cannot be resolved: {source}")]
    RootUnavailable {
        root: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("path {path} resolves outside project root {root}")]
    Escape { path: PathBuf, root: PathBuf },

    #[error("failed to resolve {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// An absolute, normalized path proven to live under the trusted root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResolvedPath(PathBuf);

impl ResolvedPath {
    pub fn as_path(&self) -> &Path {
        &self.0
    }

    pub fn into_path_buf(self) -> PathBuf {
        self.0
    }

    /// Whether the resolved location currently exists as a directory.
    pub fn is_dir(&self) -> bool {
        self.0.is_dir()
    }
}

impl Deref for ResolvedPath {
    type Target = Path;

    fn deref(&self) -> &Path {
        &self.0
    }
}

impl AsRef<Path> for ResolvedPath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

impl fmt::Display for ResolvedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// Resolves untrusted paths against one trusted root.
#[derive(Debug, Clone)]
pub struct PathGuard {
    root: PathBuf,
}

impl PathGuard {
    /// Canonicalize `root` and build a guard for it.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, PathGuardError> {
        let root = root.as_ref();
        let canonical = root
            .canonicalize()
            .map_err(|source| PathGuardError::RootUnavailable {
                root: root.to_path_buf(),
                source,
            })?;
        Ok(Self { root: canonical })
    }

    /// The canonical root every resolved path is contained in.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The root itself, as a resolved path.
    pub fn root_path(&self) -> ResolvedPath {
        ResolvedPath(self.root.clone())
    }

    /// Resolve `relative` under the root and prove containment.
    pub fn resolve(&self, relative: impl AsRef<Path>) -> Result<ResolvedPath, PathGuardError> {
        let relative = relative.as_ref();
        let normalized = normalize(&self.root, relative)?;

        if !is_contained(&self.root, &normalized) {
            tracing::warn!(
                root = %self.root.display(),
                requested = %relative.display(),
                resolved = %normalized.display(),
                "Rejected path outside project root"
            );
            return Err(PathGuardError::Escape {
                path: normalized,
                root: self.root.clone(),
            });
        }

        Ok(ResolvedPath(normalized))
    }
}

/// Component-wise containment: `candidate == root` or `candidate` continues
/// `root` with a separator.
pub fn is_contained(root: &Path, candidate: &Path) -> bool {
    candidate.starts_with(root)
}

fn normalize(root: &Path, relative: &Path) -> Result<PathBuf, PathGuardError> {
    let mut current = if relative.is_absolute() {
        PathBuf::new()
    } else {
        root.to_path_buf()
    };

    for component in relative.components() {
        match component {
            Component::Prefix(prefix) => {
                current = PathBuf::from(prefix.as_os_str());
            }
            Component::RootDir => {
                current.push(Component::RootDir.as_os_str());
            }
            Component::CurDir => {}
            Component::ParentDir => {
                current.pop();
            }
            Component::Normal(part) => {
                current.push(part);
                // Checked on every component: a `..` after a missing name can
                // lead back onto disk, where symlinks must be followed again.
                match current.symlink_metadata() {
                    Ok(_) => {
                        current = current.canonicalize().map_err(|source| PathGuardError::Io {
                            path: current.clone(),
                            source,
                        })?;
                    }
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(source) => {
                        return Err(PathGuardError::Io {
                            path: current,
                            source,
                        })
                    }
                }
            }
        }
    }

    Ok(current)
}
