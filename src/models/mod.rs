//! Data models for the session manager.
//!
//! This module re-exports all model types used throughout the crate.

pub mod engine;
pub mod query;
pub mod session;

// Re-export commonly used types
pub use engine::{DatabaseType, EngineConfig, EngineConfigError, TWO_PHASE_DIALECTS};
pub use query::{JsonRow, QueryParam, Statement};
pub use session::{SessionInfo, TransactionPhase};
