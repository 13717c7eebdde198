//! Route module resolution.
//!
//! # Data Flow
//! ```text
//! manifest [[blueprint]] entry { name, class, url_prefix? }
//!     → ModuleRegistry::resolve (class → module, name → exported group)
//!     → factory(ModuleContext) → axum Router
//!     → nested under url_prefix, or merged at the root
//!     → RegisteredRoute recorded on the service handle
//! ```
//!
//! # Trust Boundary
//! A module registered here is trusted code: naming it in a manifest makes
//! it run inside the service with full privileges. The manifest is a
//! deployment artifact, not user input, and selects only among modules
//! compiled into the binary and registered explicitly. Nothing is loaded
//! from disk by name.

use std::collections::BTreeMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use serde::Serialize;
use thiserror::Error;

use crate::config::manifest::RouteModuleEntry;
use crate::config::profile::ConfigProfile;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModuleError {
    #[error("route module `{module}` is not registered")]
    ModuleNotFound { module: String },

    #[error("route module `{module}` has no route group `{export}`")]
    ExportNotFound { module: String, export: String },

    #[error("route group `{group}` cannot be bound: {reason}")]
    RouteConflict { group: String, reason: String },
}

/// What a route group factory gets to build its router.
#[derive(Debug, Clone)]
pub struct ModuleContext {
    pub profile: Arc<ConfigProfile>,
    pub static_dir: Option<PathBuf>,
    pub template_dir: Option<PathBuf>,
}

/// Builds one route group.
pub type RouteGroupFactory = Arc<dyn Fn(&ModuleContext) -> Router + Send + Sync>;

/// A route group bound into the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegisteredRoute {
    pub name: String,
    pub module_path: String,
    pub url_prefix: Option<String>,
}

/// Explicitly registered route modules, keyed by module path then export.
#[derive(Clone, Default)]
pub struct ModuleRegistry {
    modules: BTreeMap<String, BTreeMap<String, RouteGroupFactory>>,
}

impl fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let exports: BTreeMap<&str, Vec<&str>> = self
            .modules
            .iter()
            .map(|(m, e)| (m.as_str(), e.keys().map(String::as_str).collect()))
            .collect();
        f.debug_struct("ModuleRegistry")
            .field("modules", &exports)
            .finish()
    }
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the modules shipped in this crate.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::web::register(&mut registry);
        registry
    }

    /// Register `export` of `module_path`. Re-registering replaces the factory.
    pub fn register<F>(&mut self, module_path: &str, export: &str, factory: F) -> &mut Self
    where
        F: Fn(&ModuleContext) -> Router + Send + Sync + 'static,
    {
        self.modules
            .entry(module_path.to_string())
            .or_default()
            .insert(export.to_string(), Arc::new(factory));
        self
    }

    pub fn contains(&self, module_path: &str, export: &str) -> bool {
        self.modules
            .get(module_path)
            .is_some_and(|exports| exports.contains_key(export))
    }

    /// Look up the factory named by `entry`.
    pub fn resolve(&self, entry: &RouteModuleEntry) -> Result<&RouteGroupFactory, ModuleError> {
        let exports = self
            .modules
            .get(&entry.module_path)
            .ok_or_else(|| ModuleError::ModuleNotFound {
                module: entry.module_path.clone(),
            })?;
        exports
            .get(&entry.name)
            .ok_or_else(|| ModuleError::ExportNotFound {
                module: entry.module_path.clone(),
                export: entry.name.clone(),
            })
    }

    /// Resolve `entry`, build its group, and bind it into `routes`.
    pub fn load(
        &self,
        entry: &RouteModuleEntry,
        ctx: &ModuleContext,
        routes: &mut Router,
    ) -> Result<RegisteredRoute, ModuleError> {
        let factory = self.resolve(entry)?;
        let group = factory(ctx);
        let prefix = entry.url_prefix.as_deref().and_then(normalize_prefix);

        let nest_at = prefix.clone();
        bind_routes(routes, &entry.name, move |current| match nest_at {
            Some(prefix) => current.nest(&prefix, group),
            None => current.merge(group),
        })?;

        tracing::info!(
            blueprint = %entry.name,
            module = %entry.module_path,
            url_prefix = prefix.as_deref().unwrap_or("/"),
            "Route group registered"
        );

        Ok(RegisteredRoute {
            name: entry.name.clone(),
            module_path: entry.module_path.clone(),
            url_prefix: prefix,
        })
    }
}

/// Apply `bind` to `routes`, turning a route table the router rejects
/// (overlapping paths, invalid patterns) into an error instead of a panic.
/// On error `routes` is left empty.
pub fn bind_routes<F>(routes: &mut Router, group: &str, bind: F) -> Result<(), ModuleError>
where
    F: FnOnce(Router) -> Router,
{
    let current = std::mem::take(routes);
    match panic::catch_unwind(AssertUnwindSafe(move || bind(current))) {
        Ok(bound) => {
            *routes = bound;
            Ok(())
        }
        Err(payload) => {
            let reason = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "route table rejected the group".to_string());
            Err(ModuleError::RouteConflict {
                group: group.to_string(),
                reason,
            })
        }
    }
}

/// Strip trailing slashes; the bare root means "no prefix".
fn normalize_prefix(prefix: &str) -> Option<String> {
    let trimmed = prefix.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
