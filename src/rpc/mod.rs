//! RPC endpoint subsystem.
//!
//! # Data Flow
//! ```text
//! Options
//!     → client.rs: resolve protocol + transport chain, connect, (Client, Closer)
//!     → server.rs: resolve, issue certificate, bind, run until shutdown
//!
//! both sides
//!     → transport::MessageChannel (one message at a time)
//!     → processor.rs (server) / reply decoding (client)
//! ```

pub mod client;
pub mod processor;
pub mod server;

pub use client::{connect, Client, ClientBuilder, Closer};
pub use processor::{dispatch, Processor};
pub use server::{serve, Server};
