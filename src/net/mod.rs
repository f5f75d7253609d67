//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, connection limits)
//!     → tls.rs (optional TLS handshake)
//!     → connection.rs (id, live count, stop signal)
//!     → Hand off to rpc::server (raw socket) or http (HTTP carrier)
//!
//! Outgoing connection (rpc::client)
//!     → TcpStream::connect
//!     → tls.rs (optional client handshake)
//!     → transport chain
//! ```
//!
//! # Design Decisions
//! - Bounded accept queue prevents resource exhaustion
//! - Each connection tracked so shutdown can reach it
//! - TLS is optional and handled transparently

pub mod connection;
pub mod listener;
pub mod tls;
