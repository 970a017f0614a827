//! DB Session Manager Library
//!
//! Named database engines (SQLite, PostgreSQL, MySQL) and request-scoped
//! sessions with single- or two-phase commit, built on sqlx pools.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod session;
pub mod transaction;

pub use config::Config;
pub use db::{Engine, EngineRegistry, MetaData};
pub use error::{DbError, DbResult};
pub use session::{ActiveScope, Session, SessionContext, SessionScope, SessionStore, get_session};
pub use transaction::TransactionManager;
