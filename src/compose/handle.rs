//! The assembled service.

use std::collections::BTreeSet;
use std::sync::Arc;

use axum::Router;
use serde::Serialize;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use uuid::Uuid;

use crate::config::manifest::BaseSettings;
use crate::config::path_guard::ResolvedPath;
use crate::config::profile::ConfigProfile;
use crate::config::selector::Selector;
use crate::extensions::cors::CorsPolicy;
use crate::extensions::registry::{enabled_kinds, DegradedExtension, ExtensionKind, WiringReport};
use crate::extensions::subsystems::{
    CsrfGuard, DocumentStore, KeyedStore, Locale, Mailer, RelationalStore, ResponseCache,
    Subsystems, TaskQueue,
};
use crate::http::response::banner_layer;
use crate::modules::RegisteredRoute;

pub use crate::config::manifest::STATIC_URL_PATH;

/// Fully wired result of composition. Owns every subsystem handle.
#[derive(Debug, Clone)]
pub struct ServiceHandle {
    pub(crate) instance_id: Uuid,
    pub(crate) selector: Selector,
    pub(crate) root: ResolvedPath,
    pub(crate) config_dir: ResolvedPath,
    pub(crate) tooling_mode: bool,
    pub(crate) profile: Arc<ConfigProfile>,
    pub(crate) base: BaseSettings,
    pub(crate) static_dir: Option<ResolvedPath>,
    pub(crate) template_dir: Option<ResolvedPath>,
    pub(crate) subsystems: Subsystems,
    pub(crate) report: WiringReport,
    pub(crate) routes: Vec<RegisteredRoute>,
    pub(crate) route_groups: Router,
    pub(crate) max_body_size: Option<usize>,
}

/// Serializable overview of a handle, for tooling output.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceSummary {
    pub instance_id: Uuid,
    pub selector: String,
    pub profile: String,
    pub resolved_profile: String,
    pub tooling_mode: bool,
    pub root: String,
    pub config_dir: String,
    pub static_dir: Option<String>,
    pub template_dir: Option<String>,
    pub wired: Vec<ExtensionKind>,
    pub degraded: Vec<DegradedExtension>,
    pub routes: Vec<RegisteredRoute>,
}

impl ServiceHandle {
    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    pub fn root(&self) -> &ResolvedPath {
        &self.root
    }

    pub fn config_dir(&self) -> &ResolvedPath {
        &self.config_dir
    }

    pub fn is_tooling_mode(&self) -> bool {
        self.tooling_mode
    }

    pub fn profile(&self) -> &ConfigProfile {
        &self.profile
    }

    /// Manifest `[config]` table; empty in tooling mode.
    pub fn base_settings(&self) -> &BaseSettings {
        &self.base
    }

    pub fn static_dir(&self) -> Option<&ResolvedPath> {
        self.static_dir.as_ref()
    }

    pub fn template_dir(&self) -> Option<&ResolvedPath> {
        self.template_dir.as_ref()
    }

    pub fn is_enabled(&self, kind: ExtensionKind) -> bool {
        enabled_kinds(&self.subsystems)
            .get(&kind)
            .copied()
            .unwrap_or(false)
    }

    /// Every subsystem present on this handle.
    pub fn enabled_extensions(&self) -> BTreeSet<ExtensionKind> {
        enabled_kinds(&self.subsystems)
            .into_iter()
            .filter_map(|(kind, on)| on.then_some(kind))
            .collect()
    }

    /// Enabled steps that failed and were left out.
    pub fn degraded(&self) -> &[DegradedExtension] {
        &self.report.degraded
    }

    /// Steps that wired successfully, in wiring order.
    pub fn wiring_order(&self) -> &[ExtensionKind] {
        &self.report.wired
    }

    pub fn locale(&self) -> Option<&Locale> {
        self.subsystems.locale.as_ref()
    }

    pub fn csrf(&self) -> Option<&CsrfGuard> {
        self.subsystems.csrf.as_ref()
    }

    pub fn mail(&self) -> Option<&Mailer> {
        self.subsystems.mail.as_ref()
    }

    pub fn document_store(&self) -> Option<&DocumentStore> {
        self.subsystems.document_store.as_ref()
    }

    pub fn relational_store(&self) -> Option<&RelationalStore> {
        self.subsystems.relational.as_ref()
    }

    pub fn task_queue(&self) -> Option<&TaskQueue> {
        self.subsystems.task_queue.as_ref()
    }

    pub fn keyed_store(&self) -> Option<&KeyedStore> {
        self.subsystems.keyed_store.as_ref()
    }

    pub fn cors(&self) -> Option<&CorsPolicy> {
        self.subsystems.cors.as_ref()
    }

    pub fn cache(&self) -> Option<&ResponseCache> {
        self.subsystems.cache.as_ref()
    }

    /// Route groups bound from the manifest, in manifest order.
    pub fn routes(&self) -> &[RegisteredRoute] {
        &self.routes
    }

    pub fn summary(&self) -> ServiceSummary {
        ServiceSummary {
            instance_id: self.instance_id,
            selector: self.selector.to_string(),
            profile: self.profile.name.clone(),
            resolved_profile: self.profile.resolved.clone(),
            tooling_mode: self.tooling_mode,
            root: self.root.to_string(),
            config_dir: self.config_dir.to_string(),
            static_dir: self.static_dir.as_ref().map(ToString::to_string),
            template_dir: self.template_dir.as_ref().map(ToString::to_string),
            wired: self.report.wired.clone(),
            degraded: self.report.degraded.clone(),
            routes: self.routes.clone(),
        }
    }

    /// Build the HTTP router: route groups and static files (bound during
    /// composition), then the middleware stack with the product banner
    /// outermost.
    pub fn router(&self) -> Router {
        let mut app = self.route_groups.clone();

        if let Some(policy) = &self.subsystems.cors {
            app = app.layer(policy.layer());
        }

        if let Some(limit) = self.max_body_size {
            app = app.layer(RequestBodyLimitLayer::new(limit));
        }

        app.layer(TraceLayer::new_for_http())
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(banner_layer())
    }
}
