//! Session: the unit-of-work object handed out by session scopes.
//!
//! A session queues write statements and lazily holds one dedicated
//! connection with an open transaction. Commit and rollback are driven by
//! the transaction manager the session joined.

use crate::db::{Engine, EngineConnection};
use crate::error::{DbError, DbResult};
use crate::models::{DatabaseType, JsonRow, SessionInfo, Statement, TransactionPhase};
use crate::transaction::{self, TransactionManager};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::Mutex;
use tracing::{debug, warn};

pub struct Session {
    id: String,
    name: String,
    engine: Arc<Engine>,
    two_phase: bool,
    started_at: DateTime<Utc>,
    manager: Weak<TransactionManager>,
    this: Weak<Session>,
    /// Set once the session has left its unit of work's store.
    scope_closed: AtomicBool,
    state: Mutex<SessionState>,
}

#[derive(Debug, Default)]
struct SessionState {
    pending: Vec<Statement>,
    conn: Option<EngineConnection>,
    phase: TransactionPhase,
    /// Two-phase sessions only.
    transaction_id: Option<String>,
    /// A statement failed inside the open transaction.
    failed: bool,
}

/// An open transaction moved from a closed session to a new one on the same engine.
pub(crate) struct OpenTransaction {
    conn: EngineConnection,
    phase: TransactionPhase,
    transaction_id: Option<String>,
}

impl Session {
    pub(crate) fn new(
        name: impl Into<String>,
        engine: Arc<Engine>,
        two_phase: bool,
        manager: &Arc<TransactionManager>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            id: format!("ses_{}", uuid::Uuid::new_v4().simple()),
            name: name.into(),
            engine,
            two_phase,
            started_at: Utc::now(),
            manager: Arc::downgrade(manager),
            this: this.clone(),
            scope_closed: AtomicBool::new(false),
            state: Mutex::new(SessionState::default()),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Engine name this session was opened under.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    pub fn two_phase(&self) -> bool {
        self.two_phase
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    fn db_type(&self) -> DatabaseType {
        self.engine.db_type()
    }

    /// Queue a write statement. It reaches the database on the next flush.
    pub async fn add(&self, statement: impl Into<Statement>) {
        self.state.lock().await.pending.push(statement.into());
        self.join_manager().await;
    }

    pub async fn pending_count(&self) -> usize {
        self.state.lock().await.pending.len()
    }

    pub async fn phase(&self) -> TransactionPhase {
        self.state.lock().await.phase
    }

    /// Send queued statements to the database, in order, without committing.
    ///
    /// Returns how many statements were sent. If one fails, the rest of the
    /// queue is discarded and the error returned.
    pub async fn flush(&self) -> DbResult<usize> {
        let mut state = self.state.lock().await;
        self.flush_locked(&mut state).await
    }

    /// Flush, then run `statement` right away inside the session transaction.
    pub async fn execute(&self, statement: impl Into<Statement>) -> DbResult<u64> {
        let statement = statement.into();
        let mut state = self.state.lock().await;
        self.flush_locked(&mut state).await?;
        let result = self.begin_locked(&mut state).await?.execute(&statement).await;
        state.failed |= result.is_err();
        result
    }

    /// Flush, then run a query inside the session transaction.
    pub async fn fetch_all(&self, statement: impl Into<Statement>) -> DbResult<Vec<JsonRow>> {
        let statement = statement.into();
        let mut state = self.state.lock().await;
        self.flush_locked(&mut state).await?;
        let result = self.begin_locked(&mut state).await?.fetch_all(&statement).await;
        state.failed |= result.is_err();
        result
    }

    pub async fn info(&self) -> SessionInfo {
        let state = self.state.lock().await;
        SessionInfo {
            session_id: self.id.clone(),
            name: self.name.clone(),
            two_phase: self.two_phase,
            phase: state.phase,
            transaction_id: state.transaction_id.clone(),
            pending: state.pending.len(),
            started_at: self.started_at,
        }
    }

    /// Mark the session as no longer reachable through its scope.
    pub(crate) fn close_scope(&self) {
        self.scope_closed.store(true, Ordering::Release);
    }

    pub(crate) fn is_scope_closed(&self) -> bool {
        self.scope_closed.load(Ordering::Acquire)
    }

    /// Give up the open transaction to a newer session on the same engine.
    ///
    /// Only a closed session with nothing queued and no failed statement
    /// hands over. A session busy elsewhere is skipped rather than awaited.
    pub(crate) fn hand_over(&self) -> Option<OpenTransaction> {
        if !self.is_scope_closed() {
            return None;
        }
        let mut state = self.state.try_lock().ok()?;
        if state.failed || !state.pending.is_empty() || state.phase != TransactionPhase::Active {
            return None;
        }
        let conn = state.conn.take()?;
        let phase = std::mem::take(&mut state.phase);
        Some(OpenTransaction {
            conn,
            phase,
            transaction_id: state.transaction_id.take(),
        })
    }

    /// First commit phase: flush, and prepare the transaction if two-phase.
    pub(crate) async fn prepare(&self) -> DbResult<()> {
        let mut state = self.state.lock().await;
        self.flush_locked(&mut state).await?;

        if !self.two_phase || state.phase != TransactionPhase::Active {
            return Ok(());
        }
        let Some(xid) = state.transaction_id.clone() else {
            return Err(DbError::internal("Two-phase session has no transaction id"));
        };

        let statements = transaction::prepare_statements(self.db_type(), &xid)?;
        let conn = state
            .conn
            .as_mut()
            .ok_or_else(|| DbError::internal("Active session has no connection"))?;
        run_control(conn, &statements)
            .await
            .map_err(|e| DbError::transaction(format!("Prepare failed: {}", e), &xid))?;

        state.phase = TransactionPhase::Prepared;
        debug!(session_id = %self.id, transaction_id = %xid, "Transaction prepared");
        Ok(())
    }

    pub(crate) async fn commit(&self) -> DbResult<()> {
        self.finish(true).await
    }

    /// Roll back and drop anything still queued.
    pub(crate) async fn rollback(&self) -> DbResult<()> {
        self.finish(false).await
    }

    async fn finish(&self, commit: bool) -> DbResult<()> {
        let action = if commit { "commit" } else { "rollback" };
        let mut state = self.state.lock().await;
        if !commit {
            state.pending.clear();
        }

        let phase = std::mem::take(&mut state.phase);
        let xid = state.transaction_id.take();
        state.failed = false;
        let Some(mut conn) = state.conn.take() else {
            return Ok(());
        };

        let statements = if commit {
            transaction::commit_statements(self.db_type(), phase, xid.as_deref())
        } else {
            transaction::rollback_statements(self.db_type(), phase, xid.as_deref())
        };
        let result = match statements {
            Ok(statements) => run_control(&mut conn, &statements).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                debug!(
                    session_id = %self.id,
                    transaction_id = ?xid,
                    action,
                    "Transaction finished"
                );
                Ok(())
            }
            Err(e) => {
                warn!(
                    session_id = %self.id,
                    transaction_id = ?xid,
                    action,
                    error = %e,
                    "Transaction end failed, closing connection"
                );
                conn.discard();
                match xid {
                    Some(xid) => Err(DbError::transaction(
                        format!("Failed to {}: {}", action, e),
                        xid,
                    )),
                    None => Err(e),
                }
            }
        }
    }

    async fn flush_locked(&self, state: &mut SessionState) -> DbResult<usize> {
        if state.pending.is_empty() {
            return Ok(0);
        }

        let pending = std::mem::take(&mut state.pending);
        let conn = self.begin_locked(state).await?;
        let mut result = Ok(());
        for statement in &pending {
            if let Err(e) = conn.execute(statement).await {
                result = Err(e);
                break;
            }
        }
        if let Err(e) = result {
            state.failed = true;
            return Err(e);
        }

        debug!(session_id = %self.id, statements = pending.len(), "Session flushed");
        Ok(pending.len())
    }

    /// Connection with an open transaction, begun on first use.
    async fn begin_locked<'a>(
        &self,
        state: &'a mut SessionState,
    ) -> DbResult<&'a mut EngineConnection> {
        if state.conn.is_none() && !self.is_scope_closed() {
            if let Some(manager) = self.manager.upgrade() {
                if let Some(open) = manager.adopt_transaction(self).await {
                    debug!(
                        session_id = %self.id,
                        name = %self.name,
                        transaction_id = ?open.transaction_id,
                        "Transaction taken over from a closed session"
                    );
                    state.conn = Some(open.conn);
                    state.phase = open.phase;
                    state.transaction_id = open.transaction_id;
                    self.join_manager().await;
                }
            }
        }

        if state.conn.is_none() {
            let xid = self.two_phase.then(transaction::generate_transaction_id);
            let statements = transaction::begin_statements(self.db_type(), xid.as_deref())?;

            let mut conn = self.engine.acquire().await?;
            if let Err(e) = run_control(&mut conn, &statements).await {
                conn.discard();
                return Err(e);
            }

            debug!(
                session_id = %self.id,
                name = %self.name,
                transaction_id = ?xid,
                "Transaction begun"
            );
            state.conn = Some(conn);
            state.phase = TransactionPhase::Active;
            state.transaction_id = xid;
            self.join_manager().await;
        }

        state
            .conn
            .as_mut()
            .ok_or_else(|| DbError::internal("Session connection missing after begin"))
    }

    async fn join_manager(&self) {
        if let (Some(manager), Some(this)) = (self.manager.upgrade(), self.this.upgrade()) {
            manager.join(this).await;
        }
    }
}

async fn run_control(conn: &mut EngineConnection, statements: &[String]) -> DbResult<()> {
    for sql in statements {
        conn.execute_control(sql).await?;
    }
    Ok(())
}

impl Drop for Session {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if let Some(conn) = state.conn.take() {
            warn!(
                session_id = %self.id,
                phase = ?state.phase,
                transaction_id = ?state.transaction_id,
                "Session dropped with an open transaction, closing its connection"
            );
            conn.discard();
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("two_phase", &self.two_phase)
            .finish_non_exhaustive()
    }
}
