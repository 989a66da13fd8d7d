//! Scripted connection for tests.
//!
//! `StubConnection` records every call in a log shared with a
//! `StubHandle`, serves queued result sets and notifications, and fails any
//! call whose SQL contains a configured fragment.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::builder::SessionBuilder;
use crate::config::SessionConfig;
use crate::error::Result;
use crate::foundation::Connector;
use crate::pg::connection::{Connection, ConnectionStatus, Notification, ResultSet};
use crate::pg::error::SqlError;
use crate::session::Session;

/// A call received by the stub.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Anonymous(String),
    Parameters(String, Vec<Option<String>>),
    Prepare(String, String),
    Execute(String, Vec<Option<String>>),
    Close,
}

#[derive(Default)]
struct StubState {
    calls: Vec<Call>,
    results: VecDeque<ResultSet>,
    notifications: VecDeque<Notification>,
    failures: Vec<String>,
    closed: bool,
}

/// Test side of a stub connection.
#[derive(Clone, Default)]
pub struct StubHandle {
    state: Arc<Mutex<StubState>>,
}

impl StubHandle {
    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Calls matching `predicate`.
    pub fn count(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.state.lock().calls.iter().filter(|c| predicate(c)).count()
    }

    /// Served, in order, by the next parameterized or prepared executions.
    pub fn push_result(&self, result: ResultSet) {
        self.state.lock().results.push_back(result);
    }

    pub fn push_notification(&self, channel: &str, pid: i32, payload: &str) {
        self.state.lock().notifications.push_back(Notification {
            channel: channel.to_string(),
            pid,
            payload: payload.to_string(),
        });
    }

    /// Fail every call whose SQL contains `fragment`.
    pub fn fail_on(&self, fragment: &str) {
        self.state.lock().failures.push(fragment.to_string());
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

pub struct StubConnection {
    handle: StubHandle,
}

impl StubConnection {
    pub fn new() -> (Self, StubHandle) {
        let handle = StubHandle::default();
        (
            Self {
                handle: handle.clone(),
            },
            handle,
        )
    }

    fn record(&self, call: Call, text: &str, parameters: &[Option<String>]) -> Result<()> {
        let mut state = self.handle.state.lock();
        state.calls.push(call);
        if state.failures.iter().any(|f| text.contains(f.as_str())) {
            return Err(SqlError::new("ERROR", "42000", format!("scripted failure for '{}'", text))
                .with_query(text, parameters)
                .into());
        }
        Ok(())
    }

    fn next_result(&self) -> ResultSet {
        self.handle
            .state
            .lock()
            .results
            .pop_front()
            .unwrap_or_else(|| ResultSet::command("SELECT 0"))
    }
}

impl Connection for StubConnection {
    fn execute_anonymous_query(&mut self, sql: &str) -> Result<ResultSet> {
        self.record(Call::Anonymous(sql.to_string()), sql, &[])?;
        Ok(ResultSet::command("SET"))
    }

    fn send_query_with_parameters(&mut self, sql: &str, parameters: &[Option<String>]) -> Result<ResultSet> {
        self.record(Call::Parameters(sql.to_string(), parameters.to_vec()), sql, parameters)?;
        Ok(self.next_result())
    }

    fn send_prepare_query(&mut self, identifier: &str, sql: &str) -> Result<()> {
        self.record(Call::Prepare(identifier.to_string(), sql.to_string()), sql, &[])
    }

    fn send_execute_query(&mut self, identifier: &str, parameters: &[Option<String>], sql: &str) -> Result<ResultSet> {
        self.record(Call::Execute(identifier.to_string(), parameters.to_vec()), sql, parameters)?;
        Ok(self.next_result())
    }

    fn get_notification(&mut self) -> Result<Option<Notification>> {
        Ok(self.handle.state.lock().notifications.pop_front())
    }

    fn status(&self) -> ConnectionStatus {
        if self.handle.is_closed() {
            ConnectionStatus::Closed
        } else {
            ConnectionStatus::Ok
        }
    }

    fn close(&mut self) -> Result<()> {
        let mut state = self.handle.state.lock();
        state.calls.push(Call::Close);
        state.closed = true;
        Ok(())
    }
}

/// A session with the default poolers over a stub connection.
pub fn stub_session() -> (Session, StubHandle) {
    stub_session_with(SessionBuilder::new(SessionConfig::default()))
}

pub fn stub_session_with(builder: SessionBuilder) -> (Session, StubHandle) {
    let (connection, handle) = StubConnection::new();
    let session = builder
        .build_session(Box::new(connection), Some("test"))
        .expect("stub session builds");
    (session, handle)
}

/// A session for converter tests.
pub fn test_session() -> Session {
    stub_session().0
}

/// Handles of the stub connections opened by a `stub_connector`, in order.
pub type StubHandles = Arc<Mutex<Vec<StubHandle>>>;

/// A connector opening a fresh stub connection on every call.
pub fn stub_connector() -> (Connector, StubHandles) {
    let handles: StubHandles = Arc::default();
    let opened = Arc::clone(&handles);
    let connector: Connector = Arc::new(move |_config: &SessionConfig| {
        let (connection, handle) = StubConnection::new();
        opened.lock().push(handle);
        Ok(Box::new(connection) as Box<dyn Connection>)
    });
    (connector, handles)
}
