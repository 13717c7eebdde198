//! Optional subsystems.
//!
//! # Data Flow
//! ```text
//! ConfigProfile + manifest base settings
//!     → registry.rs (nine gated steps, fixed order)
//!     → subsystems.rs (descriptor handles, one slot per kind)
//!     → cors.rs (compiled policy + CORS layer, when enabled)
//! ```

pub mod cors;
pub mod registry;
pub mod subsystems;

pub use cors::CorsPolicy;
pub use registry::{
    DegradedExtension, ExtensionError, ExtensionKind, ExtensionRegistry, FailurePolicy,
    WiringReport,
};
pub use subsystems::Subsystems;
