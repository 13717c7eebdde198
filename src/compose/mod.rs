//! Application composition.
//!
//! # Data Flow
//! ```text
//! ComposeRequest (profile, root, selector, tooling flag)
//!     → composer.rs (linear state machine, fail fast)
//!         → config::selector / path_guard / manifest / profile
//!         → extensions::registry (fixed-order wiring)
//!         → modules (route groups from the manifest)
//!     → handle.rs (ServiceHandle, HTTP router)
//! ```
//!
//! # Design Decisions
//! - One composition per call; nothing is shared between handles
//! - The logger is built first so every stage failure is recorded

pub mod composer;
pub mod handle;

pub use composer::{ComposeRequest, ComposeStage, Composer, LOGGER_NAME};
pub use handle::{ServiceHandle, ServiceSummary, STATIC_URL_PATH};
