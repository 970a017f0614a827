//! Sessions and their per-unit-of-work lifecycle.
//!
//! This module provides:
//! - `Session`, the object a unit of work runs its statements through
//! - `SessionStore` and `SessionContext`, the unit-of-work storage
//! - `SessionScope`, scoped acquisition with guaranteed cleanup

mod handle;
pub mod scope;
pub mod store;

pub(crate) use handle::OpenTransaction;
pub use handle::Session;
pub use scope::{ActiveScope, SessionScope, resolve_two_phase};
pub use store::{SessionContext, SessionStore, get_session};
