//! Bootstrap sequence.
//!
//! # Stages
//! ```text
//! Uninitialized
//!   → SelectorValidated   selector grammar
//!   → PathResolved        selector dir under root
//!   → ManifestLoaded      config.toml + asset dirs (no-op in tooling mode)
//!   → ProfileBound        profile catalog + environment
//!   → ExtensionsWired     fixed-order extension steps
//!   → RoutesRegistered    manifest route groups + /static (no-op in tooling mode)
//!   → Ready
//! ```
//!
//! # Design Decisions
//! - Strictly linear; every stage is entered, none is skipped
//! - Synchronous and single-threaded; runs before any runtime starts
//! - A failing step halts at the last stage reached, nothing is rolled back

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use serde::Serialize;
use tower_http::services::ServeDir;
use uuid::Uuid;

use crate::compose::handle::ServiceHandle;
use crate::config::env::Environment;
use crate::config::manifest::{load_manifest, BaseSettings, Manifest, STATIC_URL_PATH};
use crate::config::path_guard::PathGuard;
use crate::config::profile::ProfileCatalog;
use crate::config::selector::Selector;
use crate::error::{ComposeError, ComposeFailure};
use crate::extensions::registry::{ExtensionRegistry, WiringContext};
use crate::extensions::subsystems::Subsystems;
use crate::http::response::SERVER_BANNER;
use crate::modules::{bind_routes, ModuleContext, ModuleRegistry};
use crate::observability::logging::{LogLevel, LogSettings, Logger, LoggerKind};

/// Name of the log sink (and log file stem).
pub const LOGGER_NAME: &str = "Mio";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum ComposeStage {
    Uninitialized,
    SelectorValidated,
    PathResolved,
    ManifestLoaded,
    ProfileBound,
    ExtensionsWired,
    RoutesRegistered,
    Ready,
}

impl ComposeStage {
    /// The only stage reachable from this one.
    pub fn next(self) -> Option<Self> {
        match self {
            ComposeStage::Uninitialized => Some(ComposeStage::SelectorValidated),
            ComposeStage::SelectorValidated => Some(ComposeStage::PathResolved),
            ComposeStage::PathResolved => Some(ComposeStage::ManifestLoaded),
            ComposeStage::ManifestLoaded => Some(ComposeStage::ProfileBound),
            ComposeStage::ProfileBound => Some(ComposeStage::ExtensionsWired),
            ComposeStage::ExtensionsWired => Some(ComposeStage::RoutesRegistered),
            ComposeStage::RoutesRegistered => Some(ComposeStage::Ready),
            ComposeStage::Ready => None,
        }
    }
}

impl fmt::Display for ComposeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Inputs of one composition.
#[derive(Debug, Clone)]
pub struct ComposeRequest {
    /// Profile to bind; `None` means `default`.
    pub profile_name: Option<String>,
    /// Trusted project root.
    pub root: PathBuf,
    /// Configuration selector; `None` falls back to `MIO_CONFIG`, then `config`.
    pub selector: Option<String>,
    /// Skip the manifest, asset checks and route registration.
    pub tooling_mode: bool,
    pub log_level: Option<LogLevel>,
    pub logger_kind: Option<LoggerKind>,
}

impl ComposeRequest {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            profile_name: None,
            root: root.into(),
            selector: None,
            tooling_mode: false,
            log_level: None,
            logger_kind: None,
        }
    }

    pub fn profile(mut self, name: impl Into<String>) -> Self {
        self.profile_name = Some(name.into());
        self
    }

    pub fn selector(mut self, selector: impl Into<String>) -> Self {
        self.selector = Some(selector.into());
        self
    }

    pub fn tooling(mut self, tooling_mode: bool) -> Self {
        self.tooling_mode = tooling_mode;
        self
    }

    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.log_level = Some(level);
        self
    }

    pub fn logger_kind(mut self, kind: LoggerKind) -> Self {
        self.logger_kind = Some(kind);
        self
    }
}

struct Progress {
    stage: ComposeStage,
}

impl Progress {
    fn advance(&mut self, to: ComposeStage) {
        debug_assert_eq!(self.stage.next(), Some(to), "composition stages are linear");
        self.stage = to;
        tracing::debug!(stage = %to, "Composition stage reached");
    }

    fn fail(&self, error: impl Into<ComposeError>) -> ComposeFailure {
        let error = error.into();
        tracing::error!(stage = %self.stage, cause = error.cause(), error = %error, "Composition failed");
        ComposeFailure {
            stage: self.stage,
            error,
        }
    }
}

/// Turns a profile, selector and manifest into a [`ServiceHandle`].
#[derive(Debug, Clone)]
pub struct Composer {
    modules: ModuleRegistry,
    extensions: ExtensionRegistry,
    env: Environment,
}

impl Composer {
    /// Composer over `modules`, reading the process environment.
    pub fn new(modules: ModuleRegistry) -> Self {
        Self {
            modules,
            extensions: ExtensionRegistry::standard(),
            env: Environment::from_process(),
        }
    }

    pub fn with_environment(mut self, env: Environment) -> Self {
        self.env = env;
        self
    }

    pub fn with_extensions(mut self, extensions: ExtensionRegistry) -> Self {
        self.extensions = extensions;
        self
    }

    pub fn environment(&self) -> &Environment {
        &self.env
    }

    /// Run the full bootstrap sequence.
    pub fn compose(&self, request: ComposeRequest) -> Result<(ServiceHandle, Logger), ComposeFailure> {
        let profile_hint = request.profile_name.as_deref().unwrap_or("default");
        let defaults = LogSettings::for_profile(profile_hint, &self.env);
        let logger = Logger::new(
            LOGGER_NAME,
            request.log_level.unwrap_or(defaults.level),
            request.logger_kind.unwrap_or(defaults.kind),
            &request.root,
        )
        .map_err(|e| ComposeFailure {
            stage: ComposeStage::Uninitialized,
            error: e.into(),
        })?;

        let instance_id = Uuid::new_v4();
        let handle = logger.in_scope(|| {
            let span = tracing::info_span!("compose", instance = %instance_id);
            let _entered = span.enter();
            self.run(instance_id, request)
        })?;
        Ok((handle, logger))
    }

    fn run(&self, instance_id: Uuid, request: ComposeRequest) -> Result<ServiceHandle, ComposeFailure> {
        let mut progress = Progress {
            stage: ComposeStage::Uninitialized,
        };
        tracing::info!(
            profile = request.profile_name.as_deref().unwrap_or("default"),
            version = SERVER_BANNER,
            tooling_mode = request.tooling_mode,
            "Initializing the system"
        );

        let raw_selector = request
            .selector
            .as_deref()
            .unwrap_or_else(|| self.env.selector());
        let selector = Selector::validate(raw_selector).map_err(|e| progress.fail(e))?;
        progress.advance(ComposeStage::SelectorValidated);

        let guard = PathGuard::new(&request.root).map_err(|e| progress.fail(e))?;
        let config_dir = selector.locate(&guard).map_err(|e| progress.fail(e))?;
        if !config_dir.is_dir() {
            return Err(progress.fail(ComposeError::ConfigModuleMissing {
                selector: selector.to_string(),
                path: config_dir.into_path_buf(),
            }));
        }
        progress.advance(ComposeStage::PathResolved);

        let manifest: Option<Manifest> = if request.tooling_mode {
            tracing::debug!("Tooling mode, manifest skipped");
            None
        } else {
            Some(load_manifest(&guard, &config_dir).map_err(|e| progress.fail(e))?)
        };
        progress.advance(ComposeStage::ManifestLoaded);

        let catalog = ProfileCatalog::load(&guard, &config_dir).map_err(|e| progress.fail(e))?;
        let profile = catalog
            .bind(request.profile_name.as_deref(), &self.env)
            .map_err(|e| progress.fail(e))?;
        let profile = Arc::new(profile);
        tracing::info!(profile = %profile.name, resolved = %profile.resolved, "Profile bound");
        progress.advance(ComposeStage::ProfileBound);

        let base = manifest
            .as_ref()
            .map(|m| m.base.clone())
            .unwrap_or_else(BaseSettings::default);
        let mut subsystems = Subsystems::default();
        let ctx = WiringContext {
            profile: &profile,
            base: &base,
        };
        let report = self
            .extensions
            .run(&ctx, &mut subsystems)
            .map_err(|e| progress.fail(e))?;
        progress.advance(ComposeStage::ExtensionsWired);

        let mut route_groups = Router::new();
        let mut routes = Vec::new();
        if let Some(manifest) = &manifest {
            let module_ctx = ModuleContext {
                profile: Arc::clone(&profile),
                static_dir: Some(manifest.static_dir.to_path_buf()),
                template_dir: Some(manifest.template_dir.to_path_buf()),
            };
            for entry in &manifest.blueprints {
                let registered = self
                    .modules
                    .load(entry, &module_ctx, &mut route_groups)
                    .map_err(|e| progress.fail(e))?;
                routes.push(registered);
            }
            let static_dir = manifest.static_dir.to_path_buf();
            bind_routes(&mut route_groups, STATIC_URL_PATH, |r| {
                r.nest_service(STATIC_URL_PATH, ServeDir::new(static_dir))
            })
            .map_err(|e| progress.fail(e))?;
        }
        progress.advance(ComposeStage::RoutesRegistered);

        let (static_dir, template_dir) = match manifest {
            Some(m) => (Some(m.static_dir), Some(m.template_dir)),
            None => (None, None),
        };
        let handle = ServiceHandle {
            instance_id,
            selector,
            root: guard.root_path(),
            config_dir,
            tooling_mode: request.tooling_mode,
            profile,
            base,
            static_dir,
            template_dir,
            subsystems,
            report,
            routes,
            route_groups,
            max_body_size: self.env.max_body_size(),
        };
        progress.advance(ComposeStage::Ready);

        tracing::info!(
            extensions = ?handle.enabled_extensions(),
            degraded = handle.degraded().len(),
            routes = handle.routes().len(),
            "Composition ready"
        );
        Ok(handle)
    }
}
