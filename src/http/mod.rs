//! HTTP carrier subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum router, POST at the configured path)
//!     → optional frame unwrap
//!     → rpc processor
//!     → optional frame wrap
//!     → response body
//! ```

pub mod server;

pub use server::{HttpServer, RpcState};
