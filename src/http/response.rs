//! Response decoration.
//!
//! # Responsibilities
//! - Stamp every response with the product banner (`server` header)
//!
//! # Design Decisions
//! - The banner overrides any `server` header set by handlers
//! - Applied as the outermost layer so it also covers error responses
//!   produced by inner layers

use axum::http::{header, HeaderValue};
use tower_http::set_header::SetResponseHeaderLayer;

/// Product/version banner sent in the `server` header.
pub const SERVER_BANNER: &str = concat!("Mio/", env!("CARGO_PKG_VERSION"));

/// Layer that sets `server: Mio/<version>` on every response.
pub fn banner_layer() -> SetResponseHeaderLayer<HeaderValue> {
    SetResponseHeaderLayer::overriding(header::SERVER, HeaderValue::from_static(SERVER_BANNER))
}
