//! Protocol registry.
//!
//! Maps a [`ProtocolKind`] selector to the factory that builds its codecs.
//! A registry is an ordinary value: builders take one by reference and tests
//! can construct restricted registries to exercise the unknown-selector path.

use std::collections::HashMap;
use std::sync::Arc;

use super::binary::BinaryProtocolFactory;
use super::compact::CompactProtocolFactory;
use super::json::JsonProtocolFactory;
use super::simple_json::SimpleJsonProtocolFactory;
use super::{ProtocolFactory, ProtocolKind};
use crate::config::ConfigError;

#[derive(Debug, Clone, Default)]
pub struct ProtocolRegistry {
    factories: HashMap<ProtocolKind, Arc<dyn ProtocolFactory>>,
}

impl ProtocolRegistry {
    /// Registry with no encodings.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry with all four standard encodings.
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(BinaryProtocolFactory));
        registry.register(Arc::new(JsonProtocolFactory));
        registry.register(Arc::new(SimpleJsonProtocolFactory));
        registry.register(Arc::new(CompactProtocolFactory));
        registry
    }

    /// Add or replace the factory for its kind.
    pub fn register(&mut self, factory: Arc<dyn ProtocolFactory>) -> &mut Self {
        self.factories.insert(factory.kind(), factory);
        self
    }

    pub fn get(&self, kind: ProtocolKind) -> Option<Arc<dyn ProtocolFactory>> {
        self.factories.get(&kind).cloned()
    }

    /// Like [`get`](Self::get) but reports a missing selector as a
    /// configuration error.
    pub fn resolve(&self, kind: ProtocolKind) -> Result<Arc<dyn ProtocolFactory>, ConfigError> {
        self.get(kind)
            .ok_or_else(|| ConfigError::UnknownProtocol(kind.to_string()))
    }

    pub fn kinds(&self) -> impl Iterator<Item = ProtocolKind> + '_ {
        self.factories.keys().copied()
    }
}
