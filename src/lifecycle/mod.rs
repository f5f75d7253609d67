//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Server::bind (state.rs):
//!     Created → issue certificate (if secure) → bind → Listening
//!
//! Server::run:
//!     Listening → Serving → (shutdown.rs signal | fatal accept error)
//!     → stop accepting → tell connections to stop → Terminated
//! ```
//!
//! # Design Decisions
//! - Shutdown is an explicit value handed to the server, not an OS signal
//!   handler installed by the library
//! - States only move forward; observers use a watch channel

pub mod shutdown;
pub mod state;

pub use shutdown::Shutdown;
pub use state::{ServerState, StateTracker};
