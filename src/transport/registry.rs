//! Transport factory registry.
//!
//! Maps the buffering selector to a factory and composes framing on top when
//! requested. Client and server resolve the same chain from the same options,
//! which is what makes their byte streams compatible.

use std::collections::HashMap;
use std::sync::Arc;

use super::framed::{FramedTransportFactory, DEFAULT_MAX_FRAME_SIZE};
use super::stream::{BufferedTransportFactory, PassThroughTransportFactory, DEFAULT_BUFFER_SIZE};
use super::TransportFactory;
use crate::config::schema::LimitsConfig;

#[derive(Debug, Clone)]
pub struct TransportRegistry {
    by_buffering: HashMap<bool, Arc<dyn TransportFactory>>,
    max_frame_size: usize,
}

impl TransportRegistry {
    pub fn new(buffer_size: usize, max_frame_size: usize) -> Self {
        let mut by_buffering: HashMap<bool, Arc<dyn TransportFactory>> = HashMap::new();
        by_buffering.insert(true, Arc::new(BufferedTransportFactory::new(buffer_size)));
        by_buffering.insert(false, Arc::new(PassThroughTransportFactory));
        Self {
            by_buffering,
            max_frame_size,
        }
    }

    pub fn from_limits(limits: &LimitsConfig) -> Self {
        Self::new(limits.buffer_size, limits.max_frame_size)
    }

    /// Factory for the buffering selector alone.
    pub fn get(&self, buffered: bool) -> Arc<dyn TransportFactory> {
        match self.by_buffering.get(&buffered) {
            Some(factory) => Arc::clone(factory),
            None if buffered => Arc::new(BufferedTransportFactory::default()),
            None => Arc::new(PassThroughTransportFactory),
        }
    }

    /// Full chain: the buffering choice, wrapped in framing when `framed`.
    pub fn chain(&self, buffered: bool, framed: bool) -> Arc<dyn TransportFactory> {
        let base = self.get(buffered);
        if framed {
            Arc::new(FramedTransportFactory::new(base, self.max_frame_size))
        } else {
            base
        }
    }
}

impl Default for TransportRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_SIZE, DEFAULT_MAX_FRAME_SIZE)
    }
}
