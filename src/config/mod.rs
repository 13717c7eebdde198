//! Configuration subsystem.
//!
//! # Data Flow
//! ```text
//! selector string ("config.prod")
//!     → selector.rs (grammar check)
//!     → path_guard.rs (resolve under project root, prove containment)
//!     → manifest.rs (config.toml: base settings, asset dirs, route entries)
//!     → profile.rs (profiles.toml or built-in catalog + env overlay)
//!     → ConfigProfile (validated, immutable)
//!     → shared via Arc with every wiring step
//! ```
//!
//! # Design Decisions
//! - Config is read once at startup; changes require a restart
//! - All settings have defaults to allow minimal profiles
//! - Every untrusted path goes through the same `PathGuard`

pub mod env;
pub mod manifest;
pub mod path_guard;
pub mod profile;
pub mod selector;

pub use env::Environment;
pub use manifest::{BaseSettings, Manifest, RouteModuleEntry};
pub use path_guard::{PathGuard, ResolvedPath};
pub use profile::{ConfigProfile, ProfileCatalog, ProfileSettings};
pub use selector::Selector;
