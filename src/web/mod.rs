//! Built-in route modules.
//!
//! `web.main` exports the `main` group: a landing page and the favicon.

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};

use crate::http::response::SERVER_BANNER;
use crate::modules::{ModuleContext, ModuleRegistry};

pub const MAIN_MODULE: &str = "web.main";
pub const MAIN_GROUP: &str = "main";

/// Register every built-in module.
pub fn register(registry: &mut ModuleRegistry) {
    registry.register(MAIN_MODULE, MAIN_GROUP, main_group);
}

#[derive(Clone)]
struct MainState {
    profile: String,
    static_dir: Option<PathBuf>,
}

fn main_group(ctx: &ModuleContext) -> Router {
    let state = Arc::new(MainState {
        profile: ctx.profile.name.clone(),
        static_dir: ctx.static_dir.clone(),
    });
    Router::new()
        .route("/", get(index))
        .route("/favicon.ico", get(favicon))
        .with_state(state)
}

async fn index(State(state): State<Arc<MainState>>) -> String {
    format!("Powered by {SERVER_BANNER}\nProfile: {}\n", state.profile)
}

async fn favicon(State(state): State<Arc<MainState>>) -> Response {
    let Some(dir) = state.static_dir.as_ref() else {
        return StatusCode::NOT_FOUND.into_response();
    };
    match tokio::fs::read(dir.join("favicon.ico")).await {
        Ok(bytes) => (
            [(header::CONTENT_TYPE, "image/vnd.microsoft.icon")],
            bytes,
        )
            .into_response(),
        Err(e) => {
            tracing::debug!(error = %e, "favicon not available");
            StatusCode::NOT_FOUND.into_response()
        }
    }
}
