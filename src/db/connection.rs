//! Dedicated connections lent to sessions.
//!
//! A session holds one pooled connection for the whole life of its database
//! transaction. Transaction control statements are sent as plain SQL so the
//! session can drive two-phase commit, which sqlx's `Transaction` does not
//! expose.

use crate::db::row::RowToJson;
use crate::error::DbResult;
use crate::models::{DatabaseType, JsonRow, Statement};
use sqlx::pool::PoolConnection;
use sqlx::{Executor, MySql, Postgres, Sqlite};

/// Database-specific pooled connection.
pub(crate) enum EngineConnection {
    MySql(PoolConnection<MySql>),
    Postgres(PoolConnection<Postgres>),
    SQLite(PoolConnection<Sqlite>),
}

impl EngineConnection {
    /// Get the database type for this connection.
    pub(crate) fn db_type(&self) -> DatabaseType {
        match self {
            EngineConnection::MySql(_) => DatabaseType::MySQL,
            EngineConnection::Postgres(_) => DatabaseType::PostgreSQL,
            EngineConnection::SQLite(_) => DatabaseType::SQLite,
        }
    }

    /// Run a transaction control statement (no parameters, not prepared).
    pub(crate) async fn execute_control(&mut self, sql: &str) -> DbResult<()> {
        impl_db_dispatch!(EngineConnection, self, conn => {
            (&mut **conn).execute(sql).await?;
        });
        Ok(())
    }

    /// Execute a write statement, returning the affected row count.
    pub(crate) async fn execute(&mut self, statement: &Statement) -> DbResult<u64> {
        let rows_affected = match self {
            EngineConnection::MySql(conn) => bind_statement!(MySql, statement)
                .execute(&mut **conn)
                .await?
                .rows_affected(),
            EngineConnection::Postgres(conn) => bind_statement!(Postgres, statement)
                .execute(&mut **conn)
                .await?
                .rows_affected(),
            EngineConnection::SQLite(conn) => bind_statement!(Sqlite, statement)
                .execute(&mut **conn)
                .await?
                .rows_affected(),
        };
        Ok(rows_affected)
    }

    /// Run a query and decode every row.
    pub(crate) async fn fetch_all(&mut self, statement: &Statement) -> DbResult<Vec<JsonRow>> {
        let rows = match self {
            EngineConnection::MySql(conn) => bind_statement!(MySql, statement)
                .fetch_all(&mut **conn)
                .await?
                .iter()
                .map(RowToJson::to_json_map)
                .collect(),
            EngineConnection::Postgres(conn) => bind_statement!(Postgres, statement)
                .fetch_all(&mut **conn)
                .await?
                .iter()
                .map(RowToJson::to_json_map)
                .collect(),
            EngineConnection::SQLite(conn) => bind_statement!(Sqlite, statement)
                .fetch_all(&mut **conn)
                .await?
                .iter()
                .map(RowToJson::to_json_map)
                .collect(),
        };
        Ok(rows)
    }

    /// Take the connection out of its pool and close it.
    ///
    /// Used when the transaction state of the connection is unknown or still
    /// open: closing makes the server roll the transaction back instead of a
    /// dirty connection going back to the pool.
    pub(crate) fn discard(self) {
        impl_db_dispatch!(EngineConnection, self, conn => drop(conn.detach()))
    }
}

impl std::fmt::Debug for EngineConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("EngineConnection")
            .field(&self.db_type())
            .finish()
    }
}
