//! Schema metadata and its deferred binding to engines.
//!
//! Schema code declares its tables before engines exist. A `MetaData` is
//! attached to an engine exactly once, either immediately when the engine is
//! already registered or as soon as it is.

use crate::db::engine::Engine;
use crate::error::{DbError, DbResult};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Engine name metadata binds to when none is given.
pub const DEFAULT_ENGINE_NAME: &str = "default";

/// A named group of DDL statements with a write-once engine binding.
#[derive(Debug)]
pub struct MetaData {
    id: String,
    name: String,
    engine_name: String,
    statements: Vec<String>,
    bind: OnceLock<Arc<Engine>>,
}

impl MetaData {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: format!("md_{}", uuid::Uuid::new_v4().simple()),
            name: name.into(),
            engine_name: DEFAULT_ENGINE_NAME.to_string(),
            statements: Vec::new(),
            bind: OnceLock::new(),
        }
    }

    /// Engine name used by `EngineRegistry::declare`.
    pub fn with_engine_name(mut self, engine_name: impl Into<String>) -> Self {
        self.engine_name = engine_name.into();
        self
    }

    pub fn with_statement(mut self, sql: impl Into<String>) -> Self {
        self.statements.push(sql.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn engine_name(&self) -> &str {
        &self.engine_name
    }

    pub fn statements(&self) -> &[String] {
        &self.statements
    }

    /// The engine this metadata is bound to, if any.
    pub fn bound_engine(&self) -> Option<&Arc<Engine>> {
        self.bind.get()
    }

    pub fn is_bound(&self) -> bool {
        self.bind.get().is_some()
    }

    /// Attach this metadata to `engine`.
    ///
    /// Returns `true` if this call made the binding and `false` if it was
    /// already bound to the same engine. Binding to a different engine fails.
    pub fn bind(&self, engine: &Arc<Engine>) -> DbResult<bool> {
        let mut newly_bound = false;
        let bound = self.bind.get_or_init(|| {
            newly_bound = true;
            Arc::clone(engine)
        });

        if Arc::ptr_eq(bound, engine) {
            if newly_bound {
                debug!(metadata = %self.name, engine = %engine.name(), "Metadata bound");
            }
            Ok(newly_bound)
        } else {
            Err(DbError::metadata_already_bound(&self.name, engine.name()))
        }
    }

    /// Run every DDL statement on the bound engine, in declaration order.
    pub async fn create_all(&self) -> DbResult<()> {
        let engine = self
            .bind
            .get()
            .ok_or_else(|| DbError::unbound_metadata(&self.name))?;

        for sql in &self.statements {
            engine.execute(sql).await?;
        }

        info!(
            metadata = %self.name,
            engine = %engine.name(),
            statements = self.statements.len(),
            "Schema created"
        );
        Ok(())
    }
}

/// Metadata declared per engine name, waiting for (or already given) its engine.
#[derive(Debug, Default)]
pub struct MetadataBindings {
    pending: RwLock<HashMap<String, Vec<Arc<MetaData>>>>,
}

impl MetadataBindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `metadata` under `name`. Returns false if it was already recorded there.
    pub async fn record(&self, name: &str, metadata: &Arc<MetaData>) -> bool {
        let mut pending = self.pending.write().await;
        let entries = pending.entry(name.to_string()).or_default();
        if entries.iter().any(|m| m.id() == metadata.id()) {
            return false;
        }
        entries.push(Arc::clone(metadata));
        true
    }

    /// Metadata declared under `name`.
    pub async fn pending(&self, name: &str) -> Vec<Arc<MetaData>> {
        let pending = self.pending.read().await;
        pending.get(name).cloned().unwrap_or_default()
    }
}
