//! Lifecycle management.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     compose (synchronous) → install logger → build runtime → bind listener
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger (skipped if the server already ended)
//!
//! Shutdown (shutdown.rs):
//!     broadcast → server stops accepting → drain → exit
//! ```
//!
//! # Design Decisions
//! - Fail fast: any composition error exits before a listener is bound
//! - Listeners start last (traffic only when ready)

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::{shutdown_signal, supervise};
