//! Length-prefix framing.
//!
//! Each flush emits one frame: a 4-byte big-endian payload length followed by
//! the payload. Reads hand back whole frame payloads only.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::{Result, Transport, TransportError, TransportFactory};

/// Size of the frame length prefix.
pub const FRAME_HEADER_LEN: usize = 4;

/// Default upper bound on a single frame payload.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Prefix `payload` with its length.
pub fn encode_frame(payload: &[u8], max_frame_size: usize) -> Result<BytesMut> {
    if payload.len() > max_frame_size {
        return Err(TransportError::FrameTooLarge {
            size: payload.len(),
            limit: max_frame_size,
        });
    }
    let mut frame = BytesMut::with_capacity(FRAME_HEADER_LEN + payload.len());
    frame.put_u32(payload.len() as u32);
    frame.put_slice(payload);
    Ok(frame)
}

/// Split the first complete frame off `buf`, returning its payload.
///
/// Returns `Ok(None)` while the frame is incomplete. The length is checked
/// against the limit as soon as the header is available.
pub fn decode_frame(buf: &mut BytesMut, max_frame_size: usize) -> Result<Option<Bytes>> {
    if buf.len() < FRAME_HEADER_LEN {
        return Ok(None);
    }
    let size = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
    if size > max_frame_size {
        return Err(TransportError::FrameTooLarge {
            size,
            limit: max_frame_size,
        });
    }
    if buf.len() < FRAME_HEADER_LEN + size {
        return Ok(None);
    }
    buf.advance(FRAME_HEADER_LEN);
    Ok(Some(buf.split_to(size).freeze()))
}

pub struct FramedTransport {
    inner: Box<dyn Transport>,
    max_frame_size: usize,
    read_buf: BytesMut,
    write_buf: BytesMut,
}

impl FramedTransport {
    pub fn new(inner: Box<dyn Transport>, max_frame_size: usize) -> Self {
        Self {
            inner,
            max_frame_size,
            read_buf: BytesMut::new(),
            write_buf: BytesMut::new(),
        }
    }
}

#[async_trait]
impl Transport for FramedTransport {
    async fn read_into(&mut self, buf: &mut BytesMut) -> Result<usize> {
        loop {
            if let Some(payload) = decode_frame(&mut self.read_buf, self.max_frame_size)? {
                // Empty frames carry nothing; keep looking.
                if payload.is_empty() {
                    continue;
                }
                buf.extend_from_slice(&payload);
                return Ok(payload.len());
            }

            let n = self.inner.read_into(&mut self.read_buf).await?;
            if n == 0 {
                if self.read_buf.is_empty() {
                    return Ok(0);
                }
                return Err(TransportError::Truncated {
                    buffered: self.read_buf.len(),
                });
            }
        }
    }

    async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        if self.write_buf.len() + data.len() > self.max_frame_size {
            return Err(TransportError::FrameTooLarge {
                size: self.write_buf.len() + data.len(),
                limit: self.max_frame_size,
            });
        }
        self.write_buf.extend_from_slice(data);
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        if !self.write_buf.is_empty() {
            let payload = self.write_buf.split();
            let frame = encode_frame(&payload, self.max_frame_size)?;
            self.inner.write_all(&frame).await?;
        }
        self.inner.flush().await
    }

    async fn close(&mut self) -> Result<()> {
        self.read_buf.clear();
        self.write_buf.clear();
        self.inner.close().await
    }
}

/// Composes framing on top of another factory's transports.
#[derive(Debug, Clone)]
pub struct FramedTransportFactory {
    inner: Arc<dyn TransportFactory>,
    max_frame_size: usize,
}

impl FramedTransportFactory {
    pub fn new(inner: Arc<dyn TransportFactory>, max_frame_size: usize) -> Self {
        Self {
            inner,
            max_frame_size,
        }
    }
}

impl TransportFactory for FramedTransportFactory {
    fn get_transport(&self, inner: Box<dyn Transport>) -> Box<dyn Transport> {
        Box::new(FramedTransport::new(
            self.inner.get_transport(inner),
            self.max_frame_size,
        ))
    }
}
