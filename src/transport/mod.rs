//! Transport subsystem.
//!
//! # Data Flow
//! ```text
//! raw stream (TCP | TLS over TCP)          HTTP(S) connection
//!     → stream.rs (SocketTransport)            → http.rs (HttpClientTransport)
//!     → registry.rs factory chain:
//!         buffered | pass-through
//!         → optional framed.rs (4-byte length prefix)
//!     → channel.rs (MessageChannel: one complete message at a time)
//!     → protocol codecs
//! ```
//!
//! # Design Decisions
//! - `Transport` is a small object-safe trait so factories can wrap any layer
//!   in any other, the same way the chain is composed on both client and server
//! - Reads append into a caller-owned `BytesMut`; returning 0 means the peer
//!   closed the stream at a clean boundary
//! - Writes are only guaranteed to reach the peer after `flush`

pub mod channel;
pub mod framed;
pub mod http;
pub mod registry;
pub mod stream;

use std::fmt;
use std::io;
use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};

pub use channel::MessageChannel;
pub use framed::{FramedTransport, FramedTransportFactory};
pub use http::HttpClientTransport;
pub use registry::TransportRegistry;
pub use stream::{
    BufferedTransport, BufferedTransportFactory, PassThroughTransportFactory, SocketTransport,
};

/// Errors raised by transports.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Failed to open a connection to the remote endpoint.
    #[error("failed to connect to {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: io::Error,
    },

    /// Failed to bind a listening socket.
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },

    /// Opening the connection did not complete in time.
    #[error("connecting to {address} timed out after {timeout:?}")]
    ConnectTimeout { address: String, timeout: Duration },

    /// The TLS handshake failed.
    #[error("tls handshake failed: {source}")]
    Handshake {
        #[source]
        source: io::Error,
    },

    /// The TLS configuration could not be built.
    #[error("tls configuration error: {0}")]
    Tls(#[from] rustls::Error),

    /// The address cannot be used as a TLS server name.
    #[error("invalid tls server name {0:?}")]
    InvalidServerName(String),

    /// Read or write failure on an established stream.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// The peer closed the stream in the middle of a frame or message.
    #[error("connection closed mid-message ({buffered} bytes buffered)")]
    Truncated { buffered: usize },

    /// A frame header announced more bytes than allowed.
    #[error("frame of {size} bytes exceeds limit of {limit}")]
    FrameTooLarge { size: usize, limit: usize },

    /// An unframed message grew past the configured limit.
    #[error("message of at least {size} bytes exceeds limit of {limit}")]
    MessageTooLarge { size: usize, limit: usize },

    /// HTTP-level failure on the HTTP carrier.
    #[error("http error: {0}")]
    Http(#[from] hyper::Error),

    /// The HTTP server answered with a non-success status.
    #[error("http request failed with status {0}")]
    HttpStatus(u16),

    /// An HTTP exchange did not complete in time.
    #[error("http request timed out after {0:?}")]
    RequestTimeout(Duration),

    /// The transport was used after it was closed.
    #[error("transport is closed")]
    Closed,
}

impl TransportError {
    /// Whether a fresh attempt might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TransportError::Connect { .. }
                | TransportError::ConnectTimeout { .. }
                | TransportError::RequestTimeout(_)
        )
    }
}

/// Result type for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

/// Byte stream a [`SocketTransport`] or HTTP transport can run over.
pub trait RawStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> RawStream for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

/// Type-erased raw stream (plain TCP or TLS over TCP).
pub type BoxedStream = Box<dyn RawStream>;

/// A duplex byte transport.
#[async_trait]
pub trait Transport: Send {
    /// Append the next available bytes to `buf`. Returns the number of bytes
    /// appended; 0 means the peer closed the stream.
    async fn read_into(&mut self, buf: &mut BytesMut) -> Result<usize>;

    /// Queue `data` for sending.
    async fn write_all(&mut self, data: &[u8]) -> Result<()>;

    /// Push every queued byte to the peer.
    async fn flush(&mut self) -> Result<()>;

    /// Release the underlying stream.
    async fn close(&mut self) -> Result<()>;
}

/// Wraps a transport with another layer.
pub trait TransportFactory: Send + Sync + fmt::Debug {
    fn get_transport(&self, inner: Box<dyn Transport>) -> Box<dyn Transport>;
}
