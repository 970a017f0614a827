//! Session-related data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a session's database transaction currently stands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionPhase {
    /// No connection held, nothing begun yet.
    #[default]
    Idle,
    Active,
    /// First phase of two-phase commit done; waiting for the final commit or rollback.
    Prepared,
}

impl TransactionPhase {
    /// Check if a transaction is open on the database.
    pub fn is_open(&self) -> bool {
        !matches!(self, Self::Idle)
    }
}

/// Snapshot of a session, safe to log or serialize.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub session_id: String,
    /// Engine name the session was opened under.
    pub name: String,
    pub two_phase: bool,
    pub phase: TransactionPhase,
    /// Set only for two-phase sessions with an open transaction.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    pub pending: usize,
    pub started_at: DateTime<Utc>,
}
