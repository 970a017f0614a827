//! Transaction manager coordinating the sessions of one unit of work.
//!
//! Sessions join the manager when they first queue or run work. `commit`
//! runs in two phases: every session is flushed and two-phase sessions are
//! prepared, then all of them are committed. A failure in the first phase
//! rolls every session back.

use crate::error::{DbError, DbResult};
use crate::models::{DatabaseType, TransactionPhase};
use crate::session::{OpenTransaction, Session, SessionContext};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

pub struct TransactionManager {
    id: String,
    joined: Mutex<Vec<Arc<Session>>>,
}

impl TransactionManager {
    pub fn new() -> Self {
        Self {
            id: format!("tm_{}", uuid::Uuid::new_v4().simple()),
            joined: Mutex::new(Vec::new()),
        }
    }

    /// Manager of the session context installed on the current task, if any.
    pub fn current() -> Option<Arc<TransactionManager>> {
        SessionContext::current().map(|context| Arc::clone(context.transaction_manager()))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Add `session` to the current transaction. Returns false if it had already joined.
    pub async fn join(&self, session: Arc<Session>) -> bool {
        let mut joined = self.joined.lock().await;
        if joined.iter().any(|s| s.id() == session.id()) {
            return false;
        }
        debug!(
            transaction_manager = %self.id,
            session_id = %session.id(),
            name = %session.name(),
            "Session joined transaction"
        );
        joined.push(session);
        true
    }

    pub async fn joined_count(&self) -> usize {
        self.joined.lock().await.len()
    }

    /// Open transaction of a closed session on the same engine as `session`.
    ///
    /// Lets a name be reopened within one unit of work without a second
    /// pooled connection, which SQLite engines do not have.
    pub(crate) async fn adopt_transaction(&self, session: &Session) -> Option<OpenTransaction> {
        let joined = self.joined.lock().await.clone();
        joined
            .iter()
            .filter(|other| {
                other.id() != session.id()
                    && other.two_phase() == session.two_phase()
                    && Arc::ptr_eq(other.engine(), session.engine())
            })
            .find_map(|other| other.hand_over())
    }

    /// Commit every joined session.
    ///
    /// Committed (or rolled back) sessions leave the joined list whatever the
    /// outcome, so the manager can be used for the next transaction.
    pub async fn commit(&self) -> DbResult<()> {
        let sessions = self.joined.lock().await.clone();
        if sessions.is_empty() {
            debug!(transaction_manager = %self.id, "Nothing to commit");
            return Ok(());
        }

        let result = self.commit_sessions(&sessions).await;
        self.release(&sessions).await;
        result
    }

    async fn commit_sessions(&self, sessions: &[Arc<Session>]) -> DbResult<()> {
        for session in sessions {
            if let Err(e) = session.prepare().await {
                error!(
                    transaction_manager = %self.id,
                    session_id = %session.id(),
                    error = %e,
                    "Prepare failed, aborting transaction"
                );
                // The prepare error is what the caller needs to see
                let _ = rollback_all(sessions).await;
                return Err(e);
            }
        }

        let mut first_error = None;
        for session in sessions {
            if let Err(e) = session.commit().await {
                error!(
                    transaction_manager = %self.id,
                    session_id = %session.id(),
                    error = %e,
                    "Commit failed"
                );
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                info!(
                    transaction_manager = %self.id,
                    sessions = sessions.len(),
                    "Transaction committed"
                );
                Ok(())
            }
        }
    }

    /// Roll back every joined session, discarding their pending statements.
    pub async fn abort(&self) -> DbResult<()> {
        let sessions = self.joined.lock().await.clone();
        if sessions.is_empty() {
            return Ok(());
        }

        let result = rollback_all(&sessions).await;
        self.release(&sessions).await;
        info!(
            transaction_manager = %self.id,
            sessions = sessions.len(),
            "Transaction aborted"
        );
        result
    }

    /// Drop finished sessions from the joined list.
    async fn release(&self, finished: &[Arc<Session>]) {
        self.joined
            .lock()
            .await
            .retain(|s| !finished.iter().any(|done| Arc::ptr_eq(s, done)));
    }
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TransactionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionManager")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

/// Attempt a rollback on every session, returning the first error.
async fn rollback_all(sessions: &[Arc<Session>]) -> DbResult<()> {
    let mut first_error = None;
    for session in sessions {
        if let Err(e) = session.rollback().await {
            warn!(session_id = %session.id(), error = %e, "Rollback failed");
            first_error.get_or_insert(e);
        }
    }
    first_error.map_or(Ok(()), Err)
}

/// Identifier for a two-phase transaction, used as PostgreSQL GID or MySQL XID.
pub(crate) fn generate_transaction_id() -> String {
    format!("tx_{}", uuid::Uuid::new_v4().simple())
}

fn two_phase_unsupported(db_type: DatabaseType) -> DbError {
    DbError::configuration(format!(
        "Two-phase commit is not supported by the {} dialect",
        db_type.dialect_name()
    ))
}

/// Statements opening a transaction. `xid` is set for two-phase sessions.
pub(crate) fn begin_statements(db_type: DatabaseType, xid: Option<&str>) -> DbResult<Vec<String>> {
    match (db_type, xid) {
        (_, None) | (DatabaseType::PostgreSQL, Some(_)) => Ok(vec!["BEGIN".to_string()]),
        (DatabaseType::MySQL, Some(xid)) => Ok(vec![format!("XA START '{}'", xid)]),
        (DatabaseType::SQLite, Some(_)) => Err(two_phase_unsupported(db_type)),
    }
}

/// Statements for the first phase of two-phase commit.
pub(crate) fn prepare_statements(db_type: DatabaseType, xid: &str) -> DbResult<Vec<String>> {
    match db_type {
        DatabaseType::PostgreSQL => Ok(vec![format!("PREPARE TRANSACTION '{}'", xid)]),
        DatabaseType::MySQL => Ok(vec![
            format!("XA END '{}'", xid),
            format!("XA PREPARE '{}'", xid),
        ]),
        DatabaseType::SQLite => Err(two_phase_unsupported(db_type)),
    }
}

/// Statements committing a transaction left in `phase`.
pub(crate) fn commit_statements(
    db_type: DatabaseType,
    phase: TransactionPhase,
    xid: Option<&str>,
) -> DbResult<Vec<String>> {
    match (phase, xid) {
        (TransactionPhase::Idle, _) => Ok(Vec::new()),
        (TransactionPhase::Active, None) => Ok(vec!["COMMIT".to_string()]),
        (TransactionPhase::Active, Some(xid)) => match db_type {
            DatabaseType::PostgreSQL => Ok(vec!["COMMIT".to_string()]),
            DatabaseType::MySQL => Ok(vec![
                format!("XA END '{}'", xid),
                format!("XA COMMIT '{}' ONE PHASE", xid),
            ]),
            DatabaseType::SQLite => Err(two_phase_unsupported(db_type)),
        },
        (TransactionPhase::Prepared, Some(xid)) => match db_type {
            DatabaseType::PostgreSQL => Ok(vec![format!("COMMIT PREPARED '{}'", xid)]),
            DatabaseType::MySQL => Ok(vec![format!("XA COMMIT '{}'", xid)]),
            DatabaseType::SQLite => Err(two_phase_unsupported(db_type)),
        },
        (TransactionPhase::Prepared, None) => {
            Err(DbError::internal("Prepared transaction has no identifier"))
        }
    }
}

/// Statements rolling back a transaction left in `phase`.
pub(crate) fn rollback_statements(
    db_type: DatabaseType,
    phase: TransactionPhase,
    xid: Option<&str>,
) -> DbResult<Vec<String>> {
    match (phase, xid) {
        (TransactionPhase::Idle, _) => Ok(Vec::new()),
        (TransactionPhase::Active, None) => Ok(vec!["ROLLBACK".to_string()]),
        (TransactionPhase::Active, Some(xid)) => match db_type {
            DatabaseType::PostgreSQL => Ok(vec!["ROLLBACK".to_string()]),
            DatabaseType::MySQL => Ok(vec![
                format!("XA END '{}'", xid),
                format!("XA ROLLBACK '{}'", xid),
            ]),
            DatabaseType::SQLite => Err(two_phase_unsupported(db_type)),
        },
        (TransactionPhase::Prepared, Some(xid)) => match db_type {
            DatabaseType::PostgreSQL => Ok(vec![format!("ROLLBACK PREPARED '{}'", xid)]),
            DatabaseType::MySQL => Ok(vec![format!("XA ROLLBACK '{}'", xid)]),
            DatabaseType::SQLite => Err(two_phase_unsupported(db_type)),
        },
        (TransactionPhase::Prepared, None) => {
            Err(DbError::internal("Prepared transaction has no identifier"))
        }
    }
}
