//! Composition error taxonomy.
//!
//! Every variant is fatal: selector, path, manifest and profile errors mean
//! a broken deployment, and extension errors only surface here for the
//! steps whose policy is fatal. Nothing is retried.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::compose::ComposeStage;
use crate::config::manifest::{AssetKind, ManifestError};
use crate::config::path_guard::PathGuardError;
use crate::config::profile::ProfileError;
use crate::config::selector::SelectorError;
use crate::extensions::registry::{ExtensionError, ExtensionKind, FatalExtensionError};
use crate::modules::ModuleError;
use crate::observability::logging::LoggerError;

/// Process exit status for any startup failure.
pub const STARTUP_FAILURE_EXIT_CODE: i32 = 1;

#[derive(Debug, Error)]
pub enum ComposeError {
    #[error(transparent)]
    SelectorInvalid(#[from] SelectorError),

    #[error("path {path} resolves outside project root {root}")]
    PathEscape { path: PathBuf, root: PathBuf },

    #[error("project root {root} cannot be resolved: {source}")]
    RootUnavailable {
        root: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to resolve {path}: {source}")]
    PathUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("configuration module `{selector}` not found at {path}")]
    ConfigModuleMissing { selector: String, path: PathBuf },

    #[error("manifest not found at {0}")]
    ManifestNotFound(PathBuf),

    #[error("manifest {path} is malformed: {reason}")]
    ManifestMalformed { path: PathBuf, reason: String },

    #[error("{kind} directory not found: {path}")]
    AssetPathMissing { kind: AssetKind, path: PathBuf },

    #[error("unknown profile `{name}` (available: {available})")]
    ProfileUnknown { name: String, available: String },

    #[error("profile catalog {path} is invalid: {reason}")]
    ProfileInvalid { path: PathBuf, reason: String },

    #[error("extension `{step}` is misconfigured: {source}")]
    ExtensionConfigMissing {
        step: ExtensionKind,
        #[source]
        source: ExtensionError,
    },

    #[error(transparent)]
    ModuleResolutionFailed(#[from] ModuleError),

    #[error(transparent)]
    LoggerInit(#[from] LoggerError),
}

impl ComposeError {
    /// Stable name of the variant, used as the `cause` log field.
    pub fn cause(&self) -> &'static str {
        match self {
            ComposeError::SelectorInvalid(_) => "SelectorInvalid",
            ComposeError::PathEscape { .. } => "PathEscape",
            ComposeError::RootUnavailable { .. } => "RootUnavailable",
            ComposeError::PathUnreadable { .. } => "PathUnreadable",
            ComposeError::ConfigModuleMissing { .. } => "ConfigModuleMissing",
            ComposeError::ManifestNotFound(_) => "ManifestNotFound",
            ComposeError::ManifestMalformed { .. } => "ManifestMalformed",
            ComposeError::AssetPathMissing { .. } => "AssetPathMissing",
            ComposeError::ProfileUnknown { .. } => "ProfileUnknown",
            ComposeError::ProfileInvalid { .. } => "ProfileInvalid",
            ComposeError::ExtensionConfigMissing { .. } => "ExtensionConfigMissing",
            ComposeError::ModuleResolutionFailed(_) => "ModuleResolutionFailed",
            ComposeError::LoggerInit(_) => "LoggerInit",
        }
    }
}

impl From<PathGuardError> for ComposeError {
    fn from(err: PathGuardError) -> Self {
        match err {
            PathGuardError::Escape { path, root } => ComposeError::PathEscape { path, root },
            PathGuardError::RootUnavailable { root, source } => {
                ComposeError::RootUnavailable { root, source }
            }
            PathGuardError::Io { path, source } => ComposeError::PathUnreadable { path, source },
        }
    }
}

impl From<ManifestError> for ComposeError {
    fn from(err: ManifestError) -> Self {
        match err {
            ManifestError::NotFound(path) => ComposeError::ManifestNotFound(path),
            ManifestError::Io { path, source } => ComposeError::ManifestMalformed {
                path,
                reason: source.to_string(),
            },
            ManifestError::Malformed { path, reason } => {
                ComposeError::ManifestMalformed { path, reason }
            }
            ManifestError::AssetPathMissing { kind, path } => {
                ComposeError::AssetPathMissing { kind, path }
            }
            ManifestError::Path(err) => err.into(),
        }
    }
}

impl From<ProfileError> for ComposeError {
    fn from(err: ProfileError) -> Self {
        match err {
            ProfileError::Unknown { name, available } => {
                ComposeError::ProfileUnknown { name, available }
            }
            ProfileError::Invalid { path, reason } => ComposeError::ProfileInvalid { path, reason },
        }
    }
}

impl From<FatalExtensionError> for ComposeError {
    fn from(err: FatalExtensionError) -> Self {
        ComposeError::ExtensionConfigMissing {
            step: err.kind,
            source: err.source,
        }
    }
}

/// A composition that halted at `stage`.
#[derive(Debug, Error)]
#[error("composition halted after {stage}: {error}")]
pub struct ComposeFailure {
    /// Last stage reached before the failing step.
    pub stage: ComposeStage,
    #[source]
    pub error: ComposeError,
}

impl ComposeFailure {
    pub fn exit_code(&self) -> i32 {
        STARTUP_FAILURE_EXIT_CODE
    }
}
