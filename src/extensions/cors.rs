//! Cross-origin resource sharing policy.
//!
//! # Responsibilities
//! - Compile the profile's resource → origins mapping once at startup
//! - Build the `tower_http` CORS layer that consults it per request
//!
//! # Design Decisions
//! - Resource keys are regular expressions anchored at the start of the path
//! - Longer (more specific) patterns are tried first
//! - The configured mapping is kept verbatim for inspection
//! - Allowed origins are mirrored back; requests without `Origin` pass through

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use axum::http::{request::Parts, HeaderValue, Method};
use regex::Regex;
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};

use crate::config::profile::{CorsResource, Origins};
use crate::extensions::registry::ExtensionError;

/// How long browsers may cache a preflight answer.
pub const PREFLIGHT_MAX_AGE: Duration = Duration::from_secs(600);

/// Compiled CORS policy.
#[derive(Debug, Clone)]
pub struct CorsPolicy {
    resources: BTreeMap<String, CorsResource>,
    compiled: Vec<(Regex, Origins)>,
}

impl CorsPolicy {
    pub fn new(resources: BTreeMap<String, CorsResource>) -> Result<Self, ExtensionError> {
        let mut compiled = Vec::with_capacity(resources.len());
        for (pattern, resource) in &resources {
            let regex = Regex::new(&format!("^(?:{pattern})")).map_err(|e| ExtensionError::Invalid {
                setting: "cors.resources",
                reason: format!("pattern `{pattern}`: {e}"),
            })?;
            compiled.push((regex, resource.origins.clone()));
        }
        compiled.sort_by(|a, b| b.0.as_str().len().cmp(&a.0.as_str().len()));
        Ok(Self { resources, compiled })
    }

    /// The mapping exactly as configured.
    pub fn resources(&self) -> &BTreeMap<String, CorsResource> {
        &self.resources
    }

    /// Whether `origin` may access `path`. The most specific matching
    /// resource decides.
    pub fn allows(&self, path: &str, origin: &str) -> bool {
        self.compiled
            .iter()
            .find(|(re, _)| re.is_match(path))
            .is_some_and(|(_, origins)| origins.allows(origin))
    }

    /// CORS layer answering preflights and tagging responses per resource.
    pub fn layer(&self) -> CorsLayer {
        let policy = Arc::new(self.clone());
        CorsLayer::new()
            .allow_origin(AllowOrigin::predicate(move |origin: &HeaderValue, parts: &Parts| {
                origin
                    .to_str()
                    .is_ok_and(|origin| policy.allows(parts.uri.path(), origin))
            }))
            .allow_methods([
                Method::GET,
                Method::HEAD,
                Method::POST,
                Method::OPTIONS,
                Method::PUT,
                Method::PATCH,
                Method::DELETE,
            ])
            .allow_headers(AllowHeaders::mirror_request())
            .max_age(PREFLIGHT_MAX_AGE)
    }
}
