//! Mio application composition engine.
//!
//! Turns a configuration profile, a configuration selector and a deployment
//! manifest into a fully wired HTTP service.
//!
//! ```text
//! profile + selector + root
//!     → compose::Composer
//!         → config (selector, path guard, manifest, profiles)
//!         → extensions (ordered optional subsystems)
//!         → modules (route groups named in the manifest)
//!     → compose::ServiceHandle
//!     → http::HttpServer
//! ```

// Composition
pub mod compose;
pub mod config;
pub mod error;
pub mod extensions;
pub mod modules;

// Serving
pub mod http;
pub mod web;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use compose::{ComposeRequest, ComposeStage, Composer, ServiceHandle};
pub use error::{ComposeError, ComposeFailure};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use modules::ModuleRegistry;
