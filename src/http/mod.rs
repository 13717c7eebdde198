//! HTTP surface of a composed service.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (axum::serve, graceful shutdown)
//!     → ServiceHandle::router (banner, request ID, trace, body limit, CORS)
//!     → route groups / static files
//! ```

pub mod response;
pub mod server;

pub use response::{banner_layer, SERVER_BANNER};
pub use server::HttpServer;
