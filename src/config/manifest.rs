//! Deployment manifest (`config.toml`) loading.
//!
//! # Format
//! ```toml
//! [config]
//! static_folder = "{root_path}/web/static"
//! template_folder = "{root_path}/web/template"
//!
//! [config.csrf]
//! enable = true
//!
//! [[blueprint]]
//! [blueprint.main]
//! class = "web.main"
//! url_prefix = "/api"     # optional
//! ```
//!
//! # Responsibilities
//! - Parse the manifest and require the top-level `config` table
//! - Derive the static and template directories through the path guard
//! - Collect route module entries in declaration order
//!
//! # Design Decisions
//! - Route entry names are unique; a duplicate is a malformed manifest
//! - The manifest is read once and never mutated afterwards

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::config::env::value_is_enabled;
use crate::config::path_guard::{PathGuard, PathGuardError, ResolvedPath};

/// File name of the manifest inside the selector directory.
pub const MANIFEST_FILE: &str = "config.toml";

/// Placeholder substituted with the project root in folder templates.
pub const ROOT_PLACEHOLDER: &str = "{root_path}";

pub const DEFAULT_STATIC_FOLDER: &str = "{root_path}/web/static";
pub const DEFAULT_TEMPLATE_FOLDER: &str = "{root_path}/web/template";

/// URL prefix the static directory is served under; no route group may claim it.
pub const STATIC_URL_PATH: &str = "/static";

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("manifest not found at {0}")]
    NotFound(PathBuf),

    #[error("failed to read manifest {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("manifest {path} is malformed: {reason}")]
    Malformed { path: PathBuf, reason: String },

    #[error("{kind} directory not found: {path}")]
    AssetPathMissing { kind: AssetKind, path: PathBuf },

    #[error(transparent)]
    Path(#[from] PathGuardError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Static,
    Template,
}

impl std::fmt::Display for AssetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssetKind::Static => f.write_str("static"),
            AssetKind::Template => f.write_str("template"),
        }
    }
}

/// The `[config]` table, kept as parsed data.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BaseSettings(toml::Table);

impl BaseSettings {
    pub fn new(table: toml::Table) -> Self {
        Self(table)
    }

    pub fn get(&self, key: &str) -> Option<&toml::Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(toml::Value::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `csrf.enable` from the manifest; absent means disabled.
    pub fn csrf_enabled(&self) -> bool {
        self.get("csrf")
            .and_then(toml::Value::as_table)
            .and_then(|csrf| csrf.get("enable"))
            .map(value_is_enabled)
            .unwrap_or(false)
    }

    pub fn static_folder_template(&self) -> &str {
        self.get_str("static_folder").unwrap_or(DEFAULT_STATIC_FOLDER)
    }

    pub fn template_folder_template(&self) -> &str {
        self.get_str("template_folder")
            .unwrap_or(DEFAULT_TEMPLATE_FOLDER)
    }
}

/// One `[[blueprint]]` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteModuleEntry {
    /// Exported route group name, also the entry's unique key.
    pub name: String,
    /// Registered module path, e.g. `web.main`.
    pub module_path: String,
    pub url_prefix: Option<String>,
}

/// Parsed and validated manifest.
#[derive(Debug, Clone)]
pub struct Manifest {
    pub base: BaseSettings,
    pub blueprints: Vec<RouteModuleEntry>,
    pub static_dir: ResolvedPath,
    pub template_dir: ResolvedPath,
}

#[derive(Debug, Deserialize)]
struct RawManifest {
    config: Option<toml::Table>,
    #[serde(default)]
    blueprint: Vec<BTreeMap<String, RawRouteEntry>>,
}

#[derive(Debug, Deserialize)]
struct RawRouteEntry {
    class: String,
    url_prefix: Option<String>,
}

/// Load `config.toml` from the selector directory.
pub fn load_manifest(guard: &PathGuard, config_dir: &ResolvedPath) -> Result<Manifest, ManifestError> {
    let path = guard.resolve(config_dir.join(MANIFEST_FILE))?;
    if !path.is_file() {
        return Err(ManifestError::NotFound(path.into_path_buf()));
    }
    let content = fs::read_to_string(&path).map_err(|source| ManifestError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let manifest = parse_manifest(guard, &path, &content)?;

    tracing::info!(
        path = %path,
        static_dir = %manifest.static_dir,
        template_dir = %manifest.template_dir,
        blueprints = manifest.blueprints.len(),
        csrf = manifest.base.csrf_enabled(),
        "Manifest loaded"
    );
    Ok(manifest)
}

fn parse_manifest(guard: &PathGuard, path: &Path, content: &str) -> Result<Manifest, ManifestError> {
    let malformed = |reason: String| ManifestError::Malformed {
        path: path.to_path_buf(),
        reason,
    };

    let raw: RawManifest = toml::from_str(content).map_err(|e| malformed(e.to_string()))?;
    let base = BaseSettings::new(
        raw.config
            .ok_or_else(|| malformed("missing top-level `config` table".to_string()))?,
    );

    let blueprints = route_entries(raw.blueprint).map_err(malformed)?;

    let static_dir = asset_dir(guard, base.static_folder_template(), AssetKind::Static)?;
    let template_dir = asset_dir(guard, base.template_folder_template(), AssetKind::Template)?;

    Ok(Manifest {
        base,
        blueprints,
        static_dir,
        template_dir,
    })
}

fn route_entries(raw: Vec<BTreeMap<String, RawRouteEntry>>) -> Result<Vec<RouteModuleEntry>, String> {
    let mut seen = HashSet::new();
    let mut prefixes = HashSet::new();
    let mut entries = Vec::with_capacity(raw.len());

    for (index, table) in raw.into_iter().enumerate() {
        if table.len() != 1 {
            return Err(format!(
                "blueprint #{index} must have exactly one key, found {}",
                table.len()
            ));
        }
        for (name, entry) in table {
            if !seen.insert(name.clone()) {
                return Err(format!("duplicate blueprint name `{name}`"));
            }
            if entry.class.trim().is_empty() {
                return Err(format!("blueprint `{name}` has an empty class"));
            }
            if let Some(prefix) = &entry.url_prefix {
                check_prefix(prefix).map_err(|reason| {
                    format!("blueprint `{name}` url_prefix `{prefix}` {reason}")
                })?;
                let normalized = prefix.trim().trim_end_matches('/');
                if !normalized.is_empty() && !prefixes.insert(normalized.to_string()) {
                    return Err(format!(
                        "blueprint `{name}` reuses url_prefix `{normalized}`"
                    ));
                }
            }
            let url_prefix = entry.url_prefix;
            entries.push(RouteModuleEntry {
                name,
                module_path: entry.class.trim().to_string(),
                url_prefix,
            });
        }
    }

    Ok(entries)
}

/// A prefix must be a literal absolute path outside the static mount.
fn check_prefix(prefix: &str) -> Result<(), &'static str> {
    let prefix = prefix.trim();
    if !prefix.starts_with('/') {
        return Err("must start with `/`");
    }
    if prefix.contains(['{', '}', '*']) {
        return Err("must not contain path parameters or wildcards");
    }
    if prefix.contains("//") {
        return Err("must not contain empty segments");
    }
    if Path::new(prefix.trim_end_matches('/')).starts_with(STATIC_URL_PATH) {
        return Err("is reserved for static files");
    }
    Ok(())
}

fn asset_dir(guard: &PathGuard, template: &str, kind: AssetKind) -> Result<ResolvedPath, ManifestError> {
    let root = guard.root().to_string_lossy();
    let expanded = template.replace(ROOT_PLACEHOLDER, &root);
    let dir = guard.resolve(&expanded)?;
    if !dir.is_dir() {
        tracing::error!(kind = %kind, path = %dir, "Asset directory not found");
        return Err(ManifestError::AssetPathMissing {
            kind,
            path: dir.into_path_buf(),
        });
    }
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project() -> (tempfile::TempDir, PathGuard, ResolvedPath) {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("config")).unwrap();
        fs::create_dir_all(dir.path().join("web/static")).unwrap();
        fs::create_dir_all(dir.path().join("web/template")).unwrap();
        let guard = PathGuard::new(dir.path()).unwrap();
        let config_dir = guard.resolve("config").unwrap();
        (dir, guard, config_dir)
    }

    fn write(config_dir: &ResolvedPath, body: &str) {
        fs::write(config_dir.join(MANIFEST_FILE), body).unwrap();
    }

    #[test]
    fn test_defaults_and_entries() {
        let (_dir, guard, config_dir) = project();
        write(
            &config_dir,
            r#"
[config]
[config.csrf]
enable = true

[[blueprint]]
[blueprint.main]
class = "web.main"

[[blueprint]]
[blueprint.api]
class = "web.api"
url_prefix = "/api"
"#,
        );

        let manifest = load_manifest(&guard, &config_dir).unwrap();
        assert!(manifest.base.csrf_enabled());
        assert_eq!(manifest.static_dir.as_path(), guard.root().join("web/static"));
        assert_eq!(manifest.template_dir.as_path(), guard.root().join("web/template"));
        assert_eq!(
            manifest.blueprints,
            vec![
                RouteModuleEntry {
                    name: "main".into(),
                    module_path: "web.main".into(),
                    url_prefix: None,
                },
                RouteModuleEntry {
                    name: "api".into(),
                    module_path: "web.api".into(),
                    url_prefix: Some("/api".into()),
                },
            ]
        );
    }

    #[test]
    fn test_missing_file() {
        let (_dir, guard, config_dir) = project();
        assert!(matches!(
            load_manifest(&guard, &config_dir),
            Err(ManifestError::NotFound(_))
        ));
    }

    #[test]
    fn test_missing_config_table() {
        let (_dir, guard, config_dir) = project();
        write(&config_dir, "[server]\nport = 1\n");
        assert!(matches!(
            load_manifest(&guard, &config_dir),
            Err(ManifestError::Malformed { .. })
        ));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let (_dir, guard, config_dir) = project();
        write(
            &config_dir,
            r#"
[config]
[[blueprint]]
[blueprint.main]
class = "web.main"
[[blueprint]]
[blueprint.main]
class = "web.other"
"#,
        );
        let err = load_manifest(&guard, &config_dir).unwrap_err();
        assert!(err.to_string().contains("duplicate blueprint name"));
    }

    #[test]
    fn test_static_folder_missing() {
        let (_dir, guard, config_dir) = project();
        write(
            &config_dir,
            "[config]\nstatic_folder = \"{root_path}/public\"\n",
        );
        assert!(matches!(
            load_manifest(&guard, &config_dir),
            Err(ManifestError::AssetPathMissing {
                kind: AssetKind::Static,
                ..
            })
        ));
    }

    #[test]
    fn test_asset_folder_cannot_escape() {
        let (_dir, guard, config_dir) = project();
        write(
            &config_dir,
            "[config]\ntemplate_folder = \"{root_path}/../templates\"\n",
        );
        assert!(matches!(
            load_manifest(&guard, &config_dir),
            Err(ManifestError::Path(PathGuardError::Escape { .. }))
        ));
    }

    #[test]
    fn test_prefix_must_be_absolute() {
        let (_dir, guard, config_dir) = project();
        write(
            &config_dir,
            "[config]\n[[blueprint]]\n[blueprint.main]\nclass = \"web.main\"\nurl_prefix = \"api\"\n",
        );
        assert!(matches!(
            load_manifest(&guard, &config_dir),
            Err(ManifestError::Malformed { .. })
        ));
    }

    #[test]
    fn test_prefix_must_be_literal_and_unreserved() {
        let (_dir, guard, config_dir) = project();
        for prefix in ["/{*rest}", "/api/{id}", "/static", "/static/js", "/a//b"] {
            write(
                &config_dir,
                &format!("[config]\n[[blueprint]]\n[blueprint.main]\nclass = \"web.main\"\nurl_prefix = \"{prefix}\"\n"),
            );
            assert!(
                matches!(load_manifest(&guard, &config_dir), Err(ManifestError::Malformed { .. })),
                "{prefix}"
            );
        }

        write(
            &config_dir,
            "[config]\n[[blueprint]]\n[blueprint.main]\nclass = \"web.main\"\nurl_prefix = \"/statics\"\n",
        );
        assert!(load_manifest(&guard, &config_dir).is_ok());
    }

    #[test]
    fn test_reused_prefix_rejected() {
        let (_dir, guard, config_dir) = project();
        write(
            &config_dir,
            r#"
[config]

[[blueprint]]
[blueprint.v1]
class = "web.api"
url_prefix = "/api"

[[blueprint]]
[blueprint.v2]
class = "web.api"
url_prefix = "/api/"
"#,
        );
        match load_manifest(&guard, &config_dir) {
            Err(ManifestError::Malformed { reason, .. }) => assert!(reason.contains("reuses")),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
