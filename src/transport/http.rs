//! HTTP client transport.
//!
//! Buffers everything written between flushes and sends it as the body of one
//! `POST` over a persistent HTTP/1.1 connection. The response body becomes the
//! bytes returned by subsequent reads.

use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use bytes::BytesMut;
use hyper::client::conn::http1::{self, SendRequest};
use hyper::header::{ACCEPT, CONTENT_TYPE, HOST};
use hyper::{Method, Request};
use hyper_util::rt::TokioIo;
use tokio::task::JoinHandle;
use tracing::debug;

use super::{BoxedStream, Result, Transport, TransportError};

/// Content type used for request and response bodies.
pub const THRIFT_CONTENT_TYPE: &str = "application/x-thrift";

pub struct HttpClientTransport {
    sender: Option<SendRequest<Body>>,
    connection: JoinHandle<()>,
    authority: String,
    path: String,
    request_timeout: Duration,
    max_body_size: usize,
    outgoing: BytesMut,
    incoming: BytesMut,
}

impl HttpClientTransport {
    /// Perform the HTTP/1.1 handshake over an already opened stream.
    pub async fn handshake(
        stream: BoxedStream,
        authority: impl Into<String>,
        path: impl Into<String>,
        request_timeout: Duration,
        max_body_size: usize,
    ) -> Result<Self> {
        let (sender, connection) = http1::handshake(TokioIo::new(stream)).await?;
        let connection = tokio::spawn(async move {
            if let Err(e) = connection.await {
                debug!(error = %e, "http client connection ended");
            }
        });

        Ok(Self {
            sender: Some(sender),
            connection,
            authority: authority.into(),
            path: path.into(),
            request_timeout,
            max_body_size,
            outgoing: BytesMut::new(),
            incoming: BytesMut::new(),
        })
    }

    async fn post(&mut self, body: BytesMut) -> Result<()> {
        let sender = self.sender.as_mut().ok_or(TransportError::Closed)?;
        sender.ready().await?;

        let request = Request::builder()
            .method(Method::POST)
            .uri(self.path.as_str())
            .header(HOST, self.authority.as_str())
            .header(CONTENT_TYPE, THRIFT_CONTENT_TYPE)
            .header(ACCEPT, THRIFT_CONTENT_TYPE)
            .body(Body::from(body.freeze()))
            .map_err(|e| {
                TransportError::Io(std::io::Error::new(std::io::ErrorKind::InvalidInput, e))
            })?;

        let response = tokio::time::timeout(self.request_timeout, sender.send_request(request))
            .await
            .map_err(|_| TransportError::RequestTimeout(self.request_timeout))??;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::HttpStatus(status.as_u16()));
        }

        let body = axum::body::to_bytes(Body::new(response.into_body()), self.max_body_size)
            .await
            .map_err(|e| {
                TransportError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
            })?;
        self.incoming.extend_from_slice(&body);
        Ok(())
    }
}

impl std::fmt::Debug for HttpClientTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClientTransport")
            .field("authority", &self.authority)
            .field("path", &self.path)
            .field("open", &self.sender.is_some())
            .finish()
    }
}

#[async_trait]
impl Transport for HttpClientTransport {
    /// Bytes of the last response. Returns 0 when no response is pending.
    async fn read_into(&mut self, buf: &mut BytesMut) -> Result<usize> {
        if self.sender.is_none() {
            return Err(TransportError::Closed);
        }
        let available = self.incoming.split();
        buf.extend_from_slice(&available);
        Ok(available.len())
    }

    async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        if self.sender.is_none() {
            return Err(TransportError::Closed);
        }
        self.outgoing.extend_from_slice(data);
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        if self.outgoing.is_empty() {
            return Ok(());
        }
        let body = self.outgoing.split();
        self.post(body).await
    }

    async fn close(&mut self) -> Result<()> {
        self.sender = None;
        self.outgoing.clear();
        self.incoming.clear();
        self.connection.abort();
        Ok(())
    }
}

impl Drop for HttpClientTransport {
    fn drop(&mut self) {
        self.connection.abort();
    }
}
