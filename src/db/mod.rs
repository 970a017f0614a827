//! Database layer.
//!
//! This module provides:
//! - Engines wrapping database-specific sqlx pools
//! - The engine registry and deferred metadata binding
//! - Dedicated connections lent to sessions
//! - Row decoding into JSON

#[macro_use]
mod macros;

pub(crate) mod connection;
pub mod engine;
pub mod metadata;
pub mod registry;
pub mod row;

pub(crate) use connection::EngineConnection;
pub use engine::{DbPool, Engine};
pub use metadata::{DEFAULT_ENGINE_NAME, MetaData, MetadataBindings};
pub use registry::EngineRegistry;
pub use row::RowToJson;
