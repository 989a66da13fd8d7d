//! Query managers: run SQL with parameters and return converted results.
//!
//! Two managers are available:
//! - `simple`: parameters are bound with a one-shot parameterized query
//! - `prepared`: the query goes through the session's prepared statements
//!
//! Both convert parameters using the `$*::type` hints of the query and
//! send `query:pre` / `query:post` events to the listeners.

use std::any::Any;
use std::sync::Arc;
use std::time::Instant;

use serde_json::json;
use tracing::trace;

use crate::error::{FoundationError, Result};
use crate::pg::parameters::order_parameters;
use crate::pg::statement::convert_parameters;
use crate::pg::types::PgValue;
use crate::pool::Client;
use crate::pooler::{Pooler, PoolerState};
use crate::result::ConvertedResult;
use crate::session::{ClientKind, Session};

pub const SIMPLE: &str = "simple";
pub const PREPARED: &str = "prepared";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryMode {
    Simple,
    Prepared,
}

#[derive(Debug)]
pub struct QueryManager {
    identifier: String,
    mode: QueryMode,
}

impl QueryManager {
    pub fn new(identifier: impl Into<String>, mode: QueryMode) -> Self {
        Self {
            identifier: identifier.into(),
            mode,
        }
    }

    pub fn mode(&self) -> QueryMode {
        self.mode
    }

    /// Run `sql` with `parameters` bound to its placeholders.
    pub fn query<'s>(
        &self,
        session: &'s Session,
        sql: &str,
        parameters: &[PgValue],
    ) -> Result<ConvertedResult<'s>> {
        let result = match self.mode {
            QueryMode::Simple => {
                let values = convert_parameters(session, sql, parameters)?;
                session.notify(
                    &["query:pre"],
                    &json!({
                        "sql": sql,
                        "parameters": values,
                        "session_stamp": session.stamp(),
                    }),
                )?;

                let start = Instant::now();
                let ordered = order_parameters(sql);
                trace!(sql = %ordered, parameters = values.len(), "sending query");
                let result = session
                    .connection()?
                    .send_query_with_parameters(&ordered, &values)?;

                session.notify(
                    &["query:post"],
                    &json!({
                        "result_count": result.row_count(),
                        "time_ms": start.elapsed().as_secs_f64() * 1000.0,
                    }),
                )?;
                result
            }
            // The prepared statement sends the events itself.
            QueryMode::Prepared => session.prepared_query(sql)?.execute(session, parameters)?,
        };
        ConvertedResult::new(session, result)
    }
}

impl Client for QueryManager {
    fn client_type(&self) -> &str {
        ClientKind::QueryManager.as_str()
    }

    fn client_identifier(&self) -> &str {
        &self.identifier
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

#[derive(Debug, Default)]
pub struct QueryManagerPooler {
    state: PoolerState,
}

impl QueryManagerPooler {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Pooler for QueryManagerPooler {
    fn pooler_type(&self) -> &str {
        ClientKind::QueryManager.as_str()
    }

    fn state(&self) -> &PoolerState {
        &self.state
    }

    fn create_client(&self, _session: &Session, identifier: &str) -> Result<Arc<dyn Client>> {
        let mode = match identifier {
            SIMPLE => QueryMode::Simple,
            PREPARED => QueryMode::Prepared,
            other => {
                return Err(FoundationError::Configuration(format!(
                    "Unknown query manager '{}'. Known managers are {{{}, {}}}.",
                    other, SIMPLE, PREPARED
                )))
            }
        };
        Ok(Arc::new(QueryManager::new(identifier, mode)))
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}
