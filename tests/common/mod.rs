//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use axum::{routing::get, routing::post, Router};
use tempfile::TempDir;

use mio::compose::{ComposeRequest, Composer};
use mio::config::env::Environment;
use mio::modules::ModuleRegistry;
use mio::observability::logging::LoggerKind;

pub const MINIMAL_MANIFEST: &str = r#"
[config]
"#;

/// A throwaway project tree under a temporary root.
pub struct Project {
    dir: TempDir,
}

impl Project {
    /// Root with `config/`, `web/static` and `web/template`, but no manifest.
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("config")).unwrap();
        fs::create_dir_all(dir.path().join("web/static")).unwrap();
        fs::create_dir_all(dir.path().join("web/template")).unwrap();
        Self { dir }
    }

    /// Root with a manifest at `config/config.toml`.
    pub fn with_manifest(manifest: &str) -> Self {
        let project = Self::new();
        project.write("config/config.toml", manifest);
        project
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.dir.path().join(relative)
    }

    pub fn write(&self, relative: &str, content: &str) -> &Self {
        let path = self.path(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
        self
    }

    pub fn profiles(&self, content: &str) -> &Self {
        self.write("config/profiles.toml", content)
    }

    pub fn request(&self) -> ComposeRequest {
        ComposeRequest::new(self.root()).logger_kind(LoggerKind::Console)
    }
}

/// Builtins plus a `web.api` module exporting the `api` group.
pub fn registry() -> ModuleRegistry {
    let mut registry = ModuleRegistry::with_builtins();
    registry.register("web.api", "api", |_ctx| {
        Router::new()
            .route("/ping", get(|| async { "pong" }))
            .route("/echo", post(|body: String| async move { body }))
    });
    registry
}

/// Composer with an empty environment.
pub fn composer() -> Composer {
    Composer::new(registry()).with_environment(Environment::default())
}

pub fn composer_with_env<K, V, I>(pairs: I) -> Composer
where
    K: Into<String>,
    V: Into<String>,
    I: IntoIterator<Item = (K, V)>,
{
    Composer::new(registry()).with_environment(Environment::from_pairs(pairs))
}
