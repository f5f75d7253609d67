//! Message channel: a transport chain bound to one protocol.
//!
//! # Responsibilities
//! - Accumulate transport bytes until the protocol reports a complete message
//! - Enforce the message size limit while accumulating
//! - Write one encoded message per flush
//!
//! # Design Decisions
//! - Boundaries come from a `MessageScanner` that resumes where the previous
//!   read left off, so a message arriving in many reads is examined once

use std::sync::Arc;

use bytes::{Bytes, BytesMut};

use super::{Transport, TransportError};
use crate::error::Error;
use crate::protocol::{MessageScanner, ProtocolFactory};

pub struct MessageChannel {
    transport: Box<dyn Transport>,
    protocol: Arc<dyn ProtocolFactory>,
    scanner: Box<dyn MessageScanner>,
    read_buf: BytesMut,
    max_message_size: usize,
}

impl MessageChannel {
    pub fn new(
        transport: Box<dyn Transport>,
        protocol: Arc<dyn ProtocolFactory>,
        max_message_size: usize,
    ) -> Self {
        Self {
            transport,
            scanner: protocol.scanner(),
            protocol,
            read_buf: BytesMut::new(),
            max_message_size,
        }
    }

    pub fn protocol(&self) -> &Arc<dyn ProtocolFactory> {
        &self.protocol
    }

    /// Next complete message, or `None` when the peer closed the stream
    /// between messages.
    pub async fn read_message(&mut self) -> Result<Option<Bytes>, Error> {
        loop {
            if !self.read_buf.is_empty() {
                if let Some(len) = self.scanner.scan(&self.read_buf)? {
                    self.scanner = self.protocol.scanner();
                    return Ok(Some(self.read_buf.split_to(len).freeze()));
                }
                if self.read_buf.len() > self.max_message_size {
                    return Err(TransportError::MessageTooLarge {
                        size: self.read_buf.len(),
                        limit: self.max_message_size,
                    }
                    .into());
                }
            }

            let n = self.transport.read_into(&mut self.read_buf).await?;
            if n == 0 {
                if self.read_buf.is_empty() {
                    return Ok(None);
                }
                return Err(TransportError::Truncated {
                    buffered: self.read_buf.len(),
                }
                .into());
            }
        }
    }

    /// Send one encoded message and flush the chain.
    pub async fn write_message(&mut self, message: &[u8]) -> Result<(), Error> {
        self.transport.write_all(message).await?;
        self.transport.flush().await?;
        Ok(())
    }

    pub async fn close(&mut self) -> Result<(), Error> {
        self.read_buf.clear();
        self.scanner = self.protocol.scanner();
        self.transport.close().await?;
        Ok(())
    }
}

impl std::fmt::Debug for MessageChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageChannel")
            .field("protocol", &self.protocol.kind())
            .field("buffered_bytes", &self.read_buf.len())
            .finish()
    }
}
