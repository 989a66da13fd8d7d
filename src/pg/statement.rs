//! Prepared statements pooled per session.
//!
//! This module provides:
//! - `PreparedQuery`: a server-side prepared statement, prepared lazily on
//!   its first execution and deallocated when it leaves the pool
//! - `PreparedQueryPooler`: pools prepared queries under the signature of
//!   their SQL, so one SQL text is prepared at most once per session

use std::any::Any;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use serde_json::json;
use tracing::{debug, trace};

use super::connection::ResultSet;
use super::parameters::{order_parameters, parameter_types};
use super::types::PgValue;
use crate::error::{FoundationError, Result};
use crate::pool::Client;
use crate::pooler::{Pooler, PoolerState};
use crate::session::{ClientKind, Session};

// ============================================================================
// Prepared Query
// ============================================================================

/// Server-side life cycle of a prepared statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PreparationStatus {
    #[default]
    NotPrepared,
    InPreparation,
    Prepared,
}

#[derive(Debug)]
pub struct PreparedQuery {
    identifier: String,
    sql: String,
    status: Mutex<PreparationStatus>,
}

impl PreparedQuery {
    pub fn new(sql: impl Into<String>) -> Result<Self> {
        let sql = sql.into();
        if sql.trim().is_empty() {
            return Err(FoundationError::PoolUsage(
                "Can not prepare an empty query.".to_string(),
            ));
        }
        Ok(Self {
            identifier: Self::signature_for(&sql),
            sql,
            status: Mutex::new(PreparationStatus::NotPrepared),
        })
    }

    /// Statement name for `sql`. `$*` placeholders are numbered first, so
    /// `$*` and `$n` spellings of one query share a signature while queries
    /// using the same numbers in another order do not.
    pub fn signature_for(sql: &str) -> String {
        format!("{:x}", md5::compute(order_parameters(sql).as_bytes()))
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn status(&self) -> PreparationStatus {
        *self.status.lock()
    }

    /// Run the statement, preparing it first if needed.
    pub fn execute(&self, session: &Session, values: &[PgValue]) -> Result<ResultSet> {
        let parameters = self.prepare_values(session, values)?;
        session.notify(
            &["query:pre"],
            &json!({
                "sql": self.sql,
                "parameters": parameters,
                "session_stamp": session.stamp(),
            }),
        )?;

        let start = Instant::now();
        self.prepare(session)?;
        trace!(statement = %self.identifier, parameters = parameters.len(), "executing prepared statement");
        let result = session
            .connection()?
            .send_execute_query(&self.identifier, &parameters, &self.sql)?;
        let elapsed = start.elapsed();

        session.notify(
            &["query:post"],
            &json!({
                "result_count": result.row_count(),
                "time_ms": elapsed.as_secs_f64() * 1000.0,
            }),
        )?;
        Ok(result)
    }

    /// Prepare on the server. A statement prepared or being prepared is not
    /// prepared again.
    ///
    /// The connection is held across the status change, so a concurrent
    /// caller finds the statement prepared once it gets the connection.
    fn prepare(&self, session: &Session) -> Result<()> {
        let mut connection = session.connection()?;
        {
            let mut status = self.status.lock();
            match *status {
                PreparationStatus::Prepared | PreparationStatus::InPreparation => return Ok(()),
                PreparationStatus::NotPrepared => *status = PreparationStatus::InPreparation,
            }
        }

        let sql = order_parameters(&self.sql);
        let outcome = connection.send_prepare_query(&self.identifier, &sql);
        drop(connection);

        let mut status = self.status.lock();
        match outcome {
            Ok(()) => {
                *status = PreparationStatus::Prepared;
                debug!(statement = %self.identifier, sql = %sql, "statement prepared");
                Ok(())
            }
            Err(e) => {
                *status = PreparationStatus::NotPrepared;
                Err(e)
            }
        }
    }

    /// Wire text of each value. Hinted parameters go through the converter
    /// of their type; the others are sent in their plain text form.
    fn prepare_values(&self, session: &Session, values: &[PgValue]) -> Result<Vec<Option<String>>> {
        convert_parameters(session, &self.sql, values)
    }
}

/// Wire text of `values` for the placeholders of `sql`.
pub(crate) fn convert_parameters(
    session: &Session,
    sql: &str,
    values: &[PgValue],
) -> Result<Vec<Option<String>>> {
    let types = parameter_types(sql);
    values
        .iter()
        .enumerate()
        .map(|(i, value)| match types.get(i) {
            Some(Some(type_name)) => session
                .converter(type_name)?
                .encode_wire(value, Some(type_name), session),
            _ => value.to_plain_text(),
        })
        .collect()
}

impl Client for PreparedQuery {
    fn client_type(&self) -> &str {
        ClientKind::PreparedQuery.as_str()
    }

    fn client_identifier(&self) -> &str {
        &self.identifier
    }

    /// Deallocate the statement if it ever reached the server.
    fn shutdown(&self, session: &Session) -> Result<()> {
        if self.status() != PreparationStatus::Prepared {
            return Ok(());
        }
        {
            let mut connection = session.connection()?;
            let sql = format!("deallocate {}", connection.escape_identifier(&self.identifier));
            connection.execute_anonymous_query(&sql)?;
        }
        *self.status.lock() = PreparationStatus::NotPrepared;
        debug!(statement = %self.identifier, "statement deallocated");
        Ok(())
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

// ============================================================================
// Prepared Query Pooler
// ============================================================================

#[derive(Debug, Default)]
pub struct PreparedQueryPooler {
    state: PoolerState,
}

impl PreparedQueryPooler {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Pooler for PreparedQueryPooler {
    fn pooler_type(&self) -> &str {
        ClientKind::PreparedQuery.as_str()
    }

    fn state(&self) -> &PoolerState {
        &self.state
    }

    fn pool_identifier(&self, sql: &str) -> String {
        PreparedQuery::signature_for(sql)
    }

    fn create_client(&self, _session: &Session, sql: &str) -> Result<Arc<dyn Client>> {
        Ok(Arc::new(PreparedQuery::new(sql)?))
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{stub_session, Call};

    #[test]
    fn test_signature_ignores_placeholder_spelling() {
        assert_eq!(
            PreparedQuery::signature_for("select $1::int4"),
            PreparedQuery::signature_for("select $*::int4")
        );
        assert_ne!(
            PreparedQuery::signature_for("select $*::int4"),
            PreparedQuery::signature_for("select $*::int8")
        );
        assert_eq!(PreparedQuery::signature_for("select 1").len(), 32);
    }

    #[test]
    fn test_signature_keeps_placeholder_order() {
        assert_ne!(
            PreparedQuery::signature_for("select $1::int4 - $2::int4"),
            PreparedQuery::signature_for("select $2::int4 - $1::int4")
        );
        assert_eq!(
            PreparedQuery::signature_for("select $*::int4 - $*::int4"),
            PreparedQuery::signature_for("select $1::int4 - $2::int4")
        );
    }

    #[test]
    fn test_prepare_is_skipped_while_in_preparation() {
        let (session, handle) = stub_session();
        let query = PreparedQuery::new("select $*::int4").unwrap();

        *query.status.lock() = PreparationStatus::InPreparation;
        query.prepare(&session).unwrap();
        assert_eq!(query.status(), PreparationStatus::InPreparation);
        assert_eq!(handle.count(|c| matches!(c, Call::Prepare(..))), 0);

        *query.status.lock() = PreparationStatus::NotPrepared;
        query.prepare(&session).unwrap();
        query.prepare(&session).unwrap();
        assert_eq!(query.status(), PreparationStatus::Prepared);
        assert_eq!(handle.count(|c| matches!(c, Call::Prepare(..))), 1);
    }

    #[test]
    fn test_empty_query_is_refused() {
        let err = PreparedQuery::new("  ").unwrap_err();
        assert!(err.to_string().contains("Can not prepare an empty query."));
    }

    #[test]
    fn test_new_query_is_not_prepared() {
        let query = PreparedQuery::new("select $*").unwrap();
        assert_eq!(query.status(), PreparationStatus::NotPrepared);
        assert_eq!(query.client_type(), "prepared_query");
        assert_eq!(query.client_identifier(), PreparedQuery::signature_for("select $*"));
    }
}
