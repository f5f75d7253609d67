//! Socket, buffered and pass-through transports.

use async_trait::async_trait;
use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use super::{BoxedStream, Result, Transport, TransportFactory};

/// Default buffer size of [`BufferedTransport`].
pub const DEFAULT_BUFFER_SIZE: usize = 8192;

const READ_CHUNK: usize = 4096;

/// Transport over a raw byte stream.
pub struct SocketTransport {
    stream: Option<BoxedStream>,
}

impl SocketTransport {
    pub fn new(stream: BoxedStream) -> Self {
        Self {
            stream: Some(stream),
        }
    }

    fn stream(&mut self) -> Result<&mut BoxedStream> {
        self.stream.as_mut().ok_or(super::TransportError::Closed)
    }
}

impl std::fmt::Debug for SocketTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketTransport")
            .field("open", &self.stream.is_some())
            .finish()
    }
}

#[async_trait]
impl Transport for SocketTransport {
    async fn read_into(&mut self, buf: &mut BytesMut) -> Result<usize> {
        let stream = self.stream()?;
        buf.reserve(READ_CHUNK);
        Ok(stream.read_buf(buf).await?)
    }

    async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        self.stream()?.write_all(data).await?;
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        self.stream()?.flush().await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut stream) = self.stream.take() {
            // The peer may already be gone; closing is best effort.
            let _ = stream.shutdown().await;
        }
        Ok(())
    }
}

/// Fixed-size read and write buffering over another transport.
pub struct BufferedTransport {
    inner: Box<dyn Transport>,
    capacity: usize,
    read_buf: BytesMut,
    write_buf: BytesMut,
}

impl BufferedTransport {
    pub fn new(inner: Box<dyn Transport>, capacity: usize) -> Self {
        Self {
            inner,
            capacity,
            read_buf: BytesMut::with_capacity(capacity),
            write_buf: BytesMut::with_capacity(capacity),
        }
    }

    async fn drain_writes(&mut self) -> Result<()> {
        if !self.write_buf.is_empty() {
            let pending = self.write_buf.split();
            self.inner.write_all(&pending).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for BufferedTransport {
    async fn read_into(&mut self, buf: &mut BytesMut) -> Result<usize> {
        if self.read_buf.is_empty() {
            self.read_buf.reserve(self.capacity);
            let n = self.inner.read_into(&mut self.read_buf).await?;
            if n == 0 {
                return Ok(0);
            }
        }
        let available = self.read_buf.split();
        buf.extend_from_slice(&available);
        Ok(available.len())
    }

    async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        if self.write_buf.len() + data.len() > self.capacity {
            self.drain_writes().await?;
        }
        if data.len() >= self.capacity {
            return self.inner.write_all(data).await;
        }
        self.write_buf.extend_from_slice(data);
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        self.drain_writes().await?;
        self.inner.flush().await
    }

    async fn close(&mut self) -> Result<()> {
        self.read_buf.clear();
        self.write_buf.clear();
        self.inner.close().await
    }
}

/// Factory producing [`BufferedTransport`]s.
#[derive(Debug, Clone, Copy)]
pub struct BufferedTransportFactory {
    capacity: usize,
}

impl BufferedTransportFactory {
    pub fn new(capacity: usize) -> Self {
        Self { capacity }
    }
}

impl Default for BufferedTransportFactory {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_SIZE)
    }
}

impl TransportFactory for BufferedTransportFactory {
    fn get_transport(&self, inner: Box<dyn Transport>) -> Box<dyn Transport> {
        Box::new(BufferedTransport::new(inner, self.capacity))
    }
}

/// Factory that returns the transport unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThroughTransportFactory;

impl TransportFactory for PassThroughTransportFactory {
    fn get_transport(&self, inner: Box<dyn Transport>) -> Box<dyn Transport> {
        inner
    }
}
