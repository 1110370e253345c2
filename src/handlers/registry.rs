use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

use super::default::{
    AcceptHandler, LogPostProcessor, NonEmptyHandler, NoopPostProcessor, RejectHandler,
};
use super::traits::{FileHandler, PostProcessor};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("handler not found: {0}")]
    HandlerNotFound(String),
    #[error("post-processor not found: {0}")]
    PostProcessorNotFound(String),
}

/// Registry mapping configured names to handler and post-processor instances
#[derive(Clone)]
pub struct HandlerRegistry {
    handlers: BTreeMap<String, Arc<dyn FileHandler>>,
    post_processors: BTreeMap<String, Arc<dyn PostProcessor>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: BTreeMap::new(),
            post_processors: BTreeMap::new(),
        }
    }

    pub fn register_handler(&mut self, name: impl Into<String>, handler: Arc<dyn FileHandler>) {
        self.handlers.insert(name.into(), handler);
    }

    pub fn register_post_processor(
        &mut self,
        name: impl Into<String>,
        post_processor: Arc<dyn PostProcessor>,
    ) {
        self.post_processors.insert(name.into(), post_processor);
    }

    pub fn handler(&self, name: &str) -> Result<Arc<dyn FileHandler>, RegistryError> {
        self.handlers
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::HandlerNotFound(name.to_string()))
    }

    pub fn post_processor(&self, name: &str) -> Result<Arc<dyn PostProcessor>, RegistryError> {
        self.post_processors
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::PostProcessorNotFound(name.to_string()))
    }

    /// Create default registry with built-in handlers
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();

        registry.register_handler("accept", Arc::new(AcceptHandler));
        registry.register_handler("reject", Arc::new(RejectHandler));
        registry.register_handler("non_empty", Arc::new(NonEmptyHandler));

        registry.register_post_processor("log", Arc::new(LogPostProcessor));
        registry.register_post_processor("noop", Arc::new(NoopPostProcessor));

        registry
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
