//! Top-level error type.
//!
//! Each layer keeps its own error enum; `Error` is what the client and server
//! builders return, with one variant per failure category.

use thiserror::Error;

use crate::config::ConfigError;
use crate::pki::CertificateError;
use crate::protocol::{ApplicationException, ProtocolError};
use crate::transport::TransportError;

#[derive(Debug, Error)]
pub enum Error {
    /// Unknown selector or invalid option; reported before any I/O.
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// Certificate issuance failed; fatal for the server start.
    #[error(transparent)]
    Certificate(#[from] CertificateError),

    /// Bind, connect, TLS or HTTP failure.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Malformed message.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The peer answered with an exception, or the reply did not match the
    /// call.
    #[error("application error: {0}")]
    Application(#[from] ApplicationException),

    /// The listening socket failed; terminates the serve loop.
    #[error("listener error: {0}")]
    Listener(#[source] std::io::Error),
}

impl Error {
    /// Whether retrying the same operation could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Transport(e) => e.is_retryable(),
            _ => false,
        }
    }
}
