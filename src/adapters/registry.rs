//! Priority-ordered adapter registry.

use std::sync::Arc;

use serde::Serialize;

use crate::logger;
use crate::transform::TransformError;

use super::{AdapterContext, ClientAdapter, DefaultAdapter, TransformResult, DEFAULT_PRIORITY};

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum RegistryError {
    #[error("Adapter '{0}' uses the priority reserved for the default adapter")]
    ReservedPriority(String),

    #[error("Adapter '{0}' is already registered")]
    DuplicateName(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct AdapterInfo {
    pub name: String,
    pub version: String,
    pub priority: i32,
}

/// Filled during startup, read-only afterwards.
pub struct AdapterRegistry {
    adapters: Vec<Arc<dyn ClientAdapter>>,
    default: Arc<dyn ClientAdapter>,
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self {
            adapters: Vec::new(),
            default: Arc::new(DefaultAdapter),
        }
    }

    /// Add an adapter and re-sort. Equal priorities keep registration order.
    pub fn register(&mut self, adapter: Arc<dyn ClientAdapter>) -> Result<(), RegistryError> {
        let name = adapter.name();
        if adapter.priority() <= DEFAULT_PRIORITY {
            return Err(RegistryError::ReservedPriority(name.to_string()));
        }
        if name == self.default.name() || self.adapters.iter().any(|a| a.name() == name) {
            return Err(RegistryError::DuplicateName(name.to_string()));
        }

        logger::debug(
            "adapters",
            &format!(
                "Registered adapter: name={}, priority={}, version={}",
                name,
                adapter.priority(),
                adapter.version()
            ),
        );

        self.adapters.push(adapter);
        // Vec::sort_by is stable
        self.adapters
            .sort_by(|a, b| b.priority().cmp(&a.priority()));
        Ok(())
    }

    /// First matching adapter in priority order, else the default.
    pub fn select(&self, ctx: &AdapterContext) -> &dyn ClientAdapter {
        self.adapters
            .iter()
            .find(|a| a.detect(ctx))
            .unwrap_or(&self.default)
            .as_ref()
    }

    pub fn transform(&self, ctx: &AdapterContext) -> Result<TransformResult, TransformError> {
        let adapter = self.select(ctx);
        logger::info(
            "adapters",
            &format!(
                "Selected adapter: name={}, version={}, request_id={}",
                adapter.name(),
                adapter.version(),
                ctx.request_id.as_deref().unwrap_or("-")
            ),
        );
        adapter.transform(ctx)
    }

    /// Precedence order, default last.
    pub fn list(&self) -> Vec<AdapterInfo> {
        self.adapters
            .iter()
            .chain(std::iter::once(&self.default))
            .map(|a| AdapterInfo {
                name: a.name().to_string(),
                version: a.version().to_string(),
                priority: a.priority(),
            })
            .collect()
    }
}
