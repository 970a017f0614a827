//! Engine registry.
//!
//! Maps symbolic names to engines. Engines are created once per name and
//! looked up by name thereafter; metadata declared for a name is bound as soon
//! as the engine for it is registered.

use crate::db::engine::Engine;
use crate::db::metadata::{MetaData, MetadataBindings};
use crate::error::{DbError, DbResult};
use crate::models::EngineConfig;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
pub struct EngineRegistry {
    engines: RwLock<HashMap<String, Arc<Engine>>>,
    bindings: MetadataBindings,
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `engine` under `name` and bind the metadata waiting for it.
    ///
    /// A name can only be registered once. If pending metadata turns out to
    /// be bound elsewhere the engine stays registered and the first binding
    /// error is returned.
    pub async fn register(&self, name: impl Into<String>, engine: Engine) -> DbResult<Arc<Engine>> {
        let name = name.into();
        let engine = Arc::new(engine);

        {
            let mut engines = self.engines.write().await;
            if engines.contains_key(&name) {
                return Err(DbError::duplicate_name(name));
            }
            engines.insert(name.clone(), Arc::clone(&engine));
        }

        info!(
            engine = %name,
            dialect = engine.dialect_name(),
            "Engine registered"
        );

        let mut first_error = None;
        for metadata in self.bindings.pending(&name).await {
            if let Err(e) = metadata.bind(&engine) {
                warn!(engine = %name, metadata = %metadata.name(), error = %e, "Failed to bind metadata");
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(engine),
        }
    }

    /// Connect an engine from `config` and register it under `config.name`.
    pub async fn create_engine(&self, config: EngineConfig) -> DbResult<Arc<Engine>> {
        let name = config.name.clone();

        // Early check so a duplicate never opens a pool
        if self.engines.read().await.contains_key(&name) {
            return Err(DbError::duplicate_name(name));
        }

        let engine = Engine::connect(config).await?;

        // Re-check after the connect await: another task may have won the name
        if self.engines.read().await.contains_key(&name) {
            engine.close().await;
            return Err(DbError::duplicate_name(name));
        }

        self.register(name, engine).await
    }

    /// Like `create_engine`, but the pool opens no connection until a session needs one.
    pub async fn create_engine_lazy(&self, config: EngineConfig) -> DbResult<Arc<Engine>> {
        let name = config.name.clone();
        let engine = Engine::connect_lazy(config)?;
        self.register(name, engine).await
    }

    /// Engine registered under `name`, if any.
    pub async fn lookup(&self, name: &str) -> Option<Arc<Engine>> {
        self.engines.read().await.get(name).cloned()
    }

    /// Arrange for `metadata` to be bound to the engine named `name`.
    ///
    /// Binds right away when the engine exists, otherwise when it gets
    /// registered. Calling this again with the same arguments has no effect.
    pub async fn defer_bind(&self, metadata: &Arc<MetaData>, name: &str) -> DbResult<()> {
        if self.bindings.record(name, metadata).await {
            debug!(metadata = %metadata.name(), engine = %name, "Metadata declared");
        }

        if let Some(engine) = self.lookup(name).await {
            metadata.bind(&engine)?;
        }
        Ok(())
    }

    /// `defer_bind` under the metadata's own engine name.
    pub async fn declare(&self, metadata: &Arc<MetaData>) -> DbResult<()> {
        self.defer_bind(metadata, metadata.engine_name()).await
    }

    /// Metadata declared under `name`, bound or not.
    pub async fn pending_metadata(&self, name: &str) -> Vec<Arc<MetaData>> {
        self.bindings.pending(name).await
    }

    /// Registered engine names, sorted.
    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.engines.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn len(&self) -> usize {
        self.engines.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.engines.read().await.is_empty()
    }

    /// Close every engine and empty the registry.
    pub async fn dispose_all(&self) {
        let engines: Vec<(String, Arc<Engine>)> = self.engines.write().await.drain().collect();
        for (name, engine) in engines {
            info!(engine = %name, "Disposing engine");
            engine.close().await;
        }
        info!("All engines disposed");
    }
}
