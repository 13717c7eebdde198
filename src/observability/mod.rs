//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → tracing macros with structured fields
//!     → logging.rs Logger (console and/or JSON file sink)
//!
//! Consumers:
//!     → stdout (human readable)
//!     → <root>/logs/mio.log (JSON lines)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for the file sink
//! - Composition logs go to the sink it returns, so several compositions
//!   can coexist in one process (tests)
//! - The binary installs the sink globally once composition succeeds

pub mod logging;
