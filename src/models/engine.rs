//! Engine-related data models.
//!
//! This module defines database dialects and the validated configuration an
//! engine is built from.

use crate::config::PoolOptions;
use serde::{Deserialize, Serialize};

/// Dialect names whose engines can take part in two-phase commit.
pub const TWO_PHASE_DIALECTS: &[&str] = &["postgre", "postgresql", "mysql"];

/// Supported database types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    PostgreSQL,
    /// Includes MariaDB
    MySQL,
    SQLite,
}

impl DatabaseType {
    /// Parse database type from a connection string.
    pub fn from_connection_string(connection_string: &str) -> Option<Self> {
        let lower = connection_string.to_lowercase();
        if lower.starts_with("postgres://") || lower.starts_with("postgresql://") {
            Some(Self::PostgreSQL)
        } else if lower.starts_with("mysql://") || lower.starts_with("mariadb://") {
            Some(Self::MySQL)
        } else if lower.starts_with("sqlite://") || lower.starts_with("sqlite:") {
            Some(Self::SQLite)
        } else {
            None
        }
    }

    /// Get the display name for this database type.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::PostgreSQL => "PostgreSQL",
            Self::MySQL => "MySQL",
            Self::SQLite => "SQLite",
        }
    }

    /// Dialect tag used for capability lookups.
    pub fn dialect_name(&self) -> &'static str {
        match self {
            Self::PostgreSQL => "postgresql",
            Self::MySQL => "mysql",
            Self::SQLite => "sqlite",
        }
    }

    /// Whether sessions on this dialect can prepare their transaction for two-phase commit.
    pub fn supports_two_phase(&self) -> bool {
        TWO_PHASE_DIALECTS.contains(&self.dialect_name())
    }
}

impl std::fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Configuration an engine is created from.
#[derive(Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Symbolic engine name sessions are opened under.
    pub name: String,
    pub db_type: DatabaseType,
    /// Contains sensitive data - never log
    #[serde(skip_serializing)]
    pub url: String,
    #[serde(default)]
    pub pool_options: PoolOptions,
}

impl EngineConfig {
    /// Create a new engine configuration.
    pub fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        pool_options: PoolOptions,
    ) -> Result<Self, EngineConfigError> {
        let name = name.into();
        let url = url.into();

        if name.is_empty() {
            return Err(EngineConfigError::EmptyName);
        }
        if !name
            .chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '_' || c == '.')
        {
            return Err(EngineConfigError::InvalidName(name));
        }

        let db_type = DatabaseType::from_connection_string(&url)
            .ok_or_else(|| EngineConfigError::UnknownDatabaseType(mask_url(&url)))?;

        pool_options
            .validate()
            .map_err(EngineConfigError::InvalidPoolOptions)?;

        Ok(Self {
            name,
            db_type,
            url,
            pool_options,
        })
    }

    /// Get a display-safe version of the URL (credentials masked).
    pub fn masked_url(&self) -> String {
        mask_url(&self.url)
    }
}

impl std::fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineConfig")
            .field("name", &self.name)
            .field("db_type", &self.db_type)
            .field("url", &self.masked_url())
            .field("pool_options", &self.pool_options)
            .finish()
    }
}

fn mask_url(url: &str) -> String {
    if let Some(at_pos) = url.find('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            // "scheme://user@host" has no password; the colon belongs to the scheme
            if !url[colon_pos..].starts_with("://") {
                return format!("{}****{}", &url[..colon_pos + 1], &url[at_pos..]);
            }
        }
    }
    url.to_string()
}

/// Errors that can occur when creating an engine configuration.
#[derive(Debug, thiserror::Error)]
pub enum EngineConfigError {
    #[error("Engine name cannot be empty")]
    EmptyName,

    #[error("Engine name contains invalid characters: {0}")]
    InvalidName(String),

    #[error("Unknown database type in connection string: {0}")]
    UnknownDatabaseType(String),

    #[error("Invalid pool options: {0}")]
    InvalidPoolOptions(String),
}
