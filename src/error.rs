//! Error types for the session foundation.
//!
//! Every fallible operation in the crate returns [`Result`]. Server-side
//! failures keep their own structured type ([`SqlError`]) so callers can
//! inspect the SQLSTATE code without parsing messages.

use thiserror::Error;

use crate::pg::error::SqlError;

#[derive(Error, Debug)]
pub enum FoundationError {
    /// Duplicate or unknown converter/type at registration time.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Malformed textual representation for a type.
    #[error("Conversion error for type '{type_name}': {reason} (raw value: {raw:?})")]
    Conversion {
        type_name: String,
        raw: String,
        reason: String,
    },

    /// Programmer error: unregistered pooler, lookup on a shut down session...
    #[error("Pool usage error: {0}")]
    PoolUsage(String),

    /// The server rejected a query.
    #[error("{0}")]
    Sql(#[from] SqlError),

    /// The connection collaborator failed outside of a query.
    #[error("Database connection error: {0}")]
    Connection(String),

    /// A LISTEN/NOTIFY notification surfaced as an error.
    #[error("Notification received on channel '{channel}' from pid {pid}: {payload}")]
    Notification {
        channel: String,
        pid: i32,
        payload: String,
    },
}

impl FoundationError {
    /// Build a conversion error for `raw` against `type_name`.
    pub fn conversion(
        type_name: impl Into<String>,
        raw: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        FoundationError::Conversion {
            type_name: type_name.into(),
            raw: raw.into(),
            reason: reason.into(),
        }
    }

    /// The SQLSTATE code when this is a server error.
    pub fn sql_state(&self) -> Option<&str> {
        match self {
            FoundationError::Sql(e) => Some(e.code.as_str()),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, FoundationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversion_message_carries_raw_text() {
        let err = FoundationError::conversion("int4", "pika", "invalid digit found in string");
        let msg = err.to_string();
        assert!(msg.contains("int4"));
        assert!(msg.contains("\"pika\""));
    }

    #[test]
    fn test_sql_state_only_for_server_errors() {
        let err = FoundationError::Sql(SqlError::new("ERROR", "42P01", "relation missing"));
        assert_eq!(err.sql_state(), Some("42P01"));
        assert_eq!(FoundationError::PoolUsage("x".into()).sql_state(), None);
    }
}
