//! Scoped session acquisition.
//!
//! `SessionScope` is built per use and consumed by `enter`, which resolves
//! the engine, creates a session and publishes it to the unit of work's
//! store. The returned `ActiveScope` is consumed by `exit`, which flushes the
//! session and removes it from the store. `run` wraps both around an async
//! body so cleanup happens on every exit path.
//!
//! Shared scopes only flush on exit. A session a shared scope had to create
//! stays in the store, so later shared scopes on the name find it again.

use crate::db::EngineRegistry;
use crate::error::{DbError, DbResult};
use crate::models::DatabaseType;
use crate::session::{Session, SessionContext, SessionStore};
use crate::transaction::TransactionManager;
use futures_util::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Effective two-phase flag for a session on `db_type`.
///
/// Unspecified means "whatever the dialect supports". Asking for two-phase
/// commit on a dialect without it is a configuration error.
pub fn resolve_two_phase(requested: Option<bool>, db_type: DatabaseType) -> DbResult<bool> {
    match requested {
        None => Ok(db_type.supports_two_phase()),
        Some(true) if !db_type.supports_two_phase() => Err(DbError::configuration(format!(
            "Two-phase commit requested, but the {} dialect does not support it",
            db_type.dialect_name()
        ))),
        Some(two_phase) => Ok(two_phase),
    }
}

/// A session scope that has not been entered yet.
#[derive(Debug)]
pub struct SessionScope {
    name: String,
    registry: Arc<EngineRegistry>,
    store: Arc<SessionStore>,
    manager: Arc<TransactionManager>,
    two_phase: Option<bool>,
    shared: bool,
    /// Session found in the store when a shared scope was built.
    existing: Option<Arc<Session>>,
}

impl SessionScope {
    /// Scope creating a new session for `name` in `context`.
    pub fn new(
        registry: &Arc<EngineRegistry>,
        name: impl Into<String>,
        context: &SessionContext,
    ) -> Self {
        Self {
            name: name.into(),
            registry: Arc::clone(registry),
            store: Arc::clone(context.store()),
            manager: Arc::clone(context.transaction_manager()),
            two_phase: None,
            shared: false,
            existing: None,
        }
    }

    /// Scope reusing the session already active for `name`, if there is one.
    ///
    /// Exiting never removes the session from the store.
    pub fn shared(
        registry: &Arc<EngineRegistry>,
        name: impl Into<String>,
        context: &SessionContext,
    ) -> Self {
        let mut scope = Self::new(registry, name, context);
        scope.existing = scope.store.get(&scope.name);
        scope.shared = true;
        scope
    }

    /// Request (or refuse) two-phase commit instead of following the dialect.
    pub fn two_phase(mut self, two_phase: bool) -> Self {
        self.two_phase = Some(two_phase);
        self
    }

    /// Attach sessions to `manager` instead of the context's manager.
    pub fn with_transaction_manager(mut self, manager: Arc<TransactionManager>) -> Self {
        self.manager = manager;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_shared(&self) -> bool {
        self.shared
    }

    /// Enter the scope and get its session.
    ///
    /// Nothing is published to the store when entry fails.
    pub async fn enter(self) -> DbResult<ActiveScope> {
        let reused = match self.existing.clone() {
            Some(session) => Some(session),
            None if self.shared => self.store.get(&self.name),
            None => None,
        };
        if let Some(session) = reused {
            debug!(name = %self.name, session_id = %session.id(), "Reusing active session");
            return Ok(ActiveScope {
                name: self.name,
                session,
                store: self.store,
                shared: true,
                closed: false,
            });
        }

        let engine = self
            .registry
            .lookup(&self.name)
            .await
            .ok_or_else(|| DbError::engine_not_configured(&self.name))?;
        let two_phase = resolve_two_phase(self.two_phase, engine.db_type())?;

        let manager = &self.manager;
        let Some(session) = self.store.insert_with(&self.name, || {
            Session::new(&self.name, engine, two_phase, manager)
        }) else {
            return Err(DbError::session_already_active(self.name));
        };

        debug!(
            name = %self.name,
            session_id = %session.id(),
            two_phase,
            shared = self.shared,
            "Session scope entered"
        );
        Ok(ActiveScope {
            name: self.name,
            session,
            store: self.store,
            shared: self.shared,
            closed: false,
        })
    }

    /// Enter, run `body` with the session, and always exit.
    ///
    /// When both the body and the exit flush fail, the error carries both.
    /// A panic in the body is resumed once the scope is closed.
    pub async fn run<F, Fut, T>(self, body: F) -> DbResult<T>
    where
        F: FnOnce(Arc<Session>) -> Fut,
        Fut: Future<Output = DbResult<T>>,
    {
        let active = self.enter().await?;
        let session = Arc::clone(active.session());
        let outcome = AssertUnwindSafe(body(session)).catch_unwind().await;
        let name = active.name.clone();
        let exited = active.exit().await;

        match outcome {
            Ok(Ok(value)) => exited.map(|()| value),
            Ok(Err(e)) => match exited {
                Ok(()) => Err(e),
                Err(flush_error) => Err(DbError::scope_exit(e, flush_error)),
            },
            Err(panic) => {
                if let Err(flush_error) = exited {
                    error!(name = %name, error = %flush_error, "Flush on scope exit failed after a panic");
                }
                std::panic::resume_unwind(panic)
            }
        }
    }
}

/// An entered session scope.
///
/// Call `exit` to flush. Dropping it without `exit` still releases the store
/// entry but leaves queued statements unflushed.
#[derive(Debug)]
pub struct ActiveScope {
    name: String,
    session: Arc<Session>,
    store: Arc<SessionStore>,
    /// Shared scopes leave the session in the store.
    shared: bool,
    closed: bool,
}

impl ActiveScope {
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_shared(&self) -> bool {
        self.shared
    }

    /// Flush the session, then release its store entry unless shared.
    ///
    /// The entry is released even if the flush fails; the flush error is
    /// returned afterwards.
    pub async fn exit(mut self) -> DbResult<()> {
        let flushed = self.session.flush().await;
        self.release();
        self.closed = true;

        let flushed = flushed?;
        debug!(
            name = %self.name,
            session_id = %self.session.id(),
            flushed,
            "Session scope exited"
        );
        Ok(())
    }

    fn release(&self) {
        if !self.shared && self.store.remove_if_same(&self.name, &self.session) {
            self.session.close_scope();
        }
    }
}

impl Drop for ActiveScope {
    fn drop(&mut self) {
        if !self.closed {
            warn!(
                name = %self.name,
                session_id = %self.session.id(),
                "Session scope dropped without exit, pending statements not flushed"
            );
            self.release();
        }
    }
}
