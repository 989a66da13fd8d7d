//! Session: one connection, its poolers and its pooled clients.
//!
//! Clients are looked up with `session.client(kind, identifier)` or one of
//! the typed accessors (`converter`, `prepared_query`, `listener`...). The
//! pooler registered for the kind returns the pooled client or builds,
//! initializes and pools a new one.
//!
//! Locks are never held while client or pooler code runs, so codecs and
//! hooks can look other clients up through the session they are handed.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard, RwLock};
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use crate::converter::ConverterClient;
use crate::error::{FoundationError, Result};
use crate::inspector::Inspector;
use crate::listener::{Listener, ListenerPooler};
use crate::observer::Observer;
use crate::pg::connection::Connection;
use crate::pg::statement::PreparedQuery;
use crate::pg::types::PgValue;
use crate::pool::{downcast_client, shutdown_clients, Client, ResourcePool};
use crate::pooler::{downcast_pooler, Pooler};
use crate::query_manager::QueryManager;
use crate::result::ConvertedResult;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

// ============================================================================
// Client kinds
// ============================================================================

/// The built-in client kinds and their pool names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientKind {
    Converter,
    PreparedQuery,
    QueryManager,
    Listener,
    Observer,
    Inspector,
}

impl ClientKind {
    pub const ALL: [ClientKind; 6] = [
        ClientKind::Converter,
        ClientKind::PreparedQuery,
        ClientKind::QueryManager,
        ClientKind::Listener,
        ClientKind::Observer,
        ClientKind::Inspector,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ClientKind::Converter => "converter",
            ClientKind::PreparedQuery => "prepared_query",
            ClientKind::QueryManager => "query_manager",
            ClientKind::Listener => "listener",
            ClientKind::Observer => "observer",
            ClientKind::Inspector => "inspector",
        }
    }
}

impl fmt::Display for ClientKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClientKind {
    type Err = FoundationError;

    fn from_str(s: &str) -> Result<Self> {
        ClientKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| FoundationError::PoolUsage(format!("Unknown client type '{}'.", s)))
    }
}

// ============================================================================
// Session
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Live,
    ShuttingDown,
    Shutdown,
}

pub struct Session {
    id: u64,
    stamp: Option<String>,
    connection: Mutex<Box<dyn Connection>>,
    clients: Mutex<ResourcePool>,
    poolers: RwLock<HashMap<String, Arc<dyn Pooler>>>,
    state: Mutex<SessionState>,
}

impl Session {
    /// A bare session with no poolers. See `SessionBuilder` for a session
    /// with the default poolers and converters.
    pub fn new(connection: Box<dyn Connection>, stamp: Option<String>) -> Self {
        let id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
        debug!(session = id, stamp = stamp.as_deref(), "session opened");
        Self {
            id,
            stamp,
            connection: Mutex::new(connection),
            clients: Mutex::new(ResourcePool::new()),
            poolers: RwLock::new(HashMap::new()),
            state: Mutex::new(SessionState::Live),
        }
    }

    /// Process-unique session number.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Free-form label given at build time.
    pub fn stamp(&self) -> Option<&str> {
        self.stamp.as_deref()
    }

    pub fn is_shutdown(&self) -> bool {
        *self.state.lock() == SessionState::Shutdown
    }

    fn ensure_live(&self) -> Result<()> {
        match *self.state.lock() {
            SessionState::Live => Ok(()),
            _ => Err(FoundationError::PoolUsage(format!(
                "Session #{} is shutdown.",
                self.id
            ))),
        }
    }

    /// The connection, locked for the caller.
    ///
    /// Available until the end of `shutdown` so client teardown hooks can
    /// still talk to the server.
    pub fn connection(&self) -> Result<MutexGuard<'_, Box<dyn Connection>>> {
        if self.is_shutdown() {
            return Err(FoundationError::Connection(format!(
                "Session #{} is shutdown, its connection is closed.",
                self.id
            )));
        }
        Ok(self.connection.lock())
    }

    // ------------------------------------------------------------------------
    // Clients
    // ------------------------------------------------------------------------

    /// Initialize `client` and put it in the pool.
    pub fn register_client(&self, client: Arc<dyn Client>) -> Result<()> {
        self.ensure_live()?;
        let kind = client.client_type().to_string();
        let identifier = client.client_identifier().to_string();
        if self.clients.lock().contains(&kind, &identifier) {
            return Err(FoundationError::PoolUsage(format!(
                "A client is already registered for '{}:{}'.",
                kind, identifier
            )));
        }

        client.initialize(self)?;
        let added = self.clients.lock().add(Arc::clone(&client));
        if let Err(e) = added {
            if let Err(hook) = client.shutdown(self) {
                warn!(kind = %kind, identifier = %identifier, error = %hook, "client shutdown failed");
            }
            return Err(e);
        }
        debug!(session = self.id, kind = %kind, identifier = %identifier, "client registered");
        Ok(())
    }

    /// The pooled client for a key, without creating it.
    pub fn pooled_client(&self, kind: &str, identifier: &str) -> Result<Option<Arc<dyn Client>>> {
        if self.is_shutdown() {
            return Err(FoundationError::PoolUsage(format!(
                "Session #{} is shutdown, no client '{}:{}' is available.",
                self.id, kind, identifier
            )));
        }
        Ok(self.clients.lock().get(kind, identifier))
    }

    pub fn has_client(&self, kind: &str, identifier: &str) -> bool {
        self.clients.lock().contains(kind, identifier)
    }

    /// Every pooled client of a kind, in creation order.
    pub fn clients_for_kind(&self, kind: &str) -> Vec<Arc<dyn Client>> {
        self.clients.lock().all_for(kind)
    }

    /// Take a client out of the pool and run its shutdown hook. A later
    /// lookup builds a new instance.
    pub fn remove_client(&self, kind: &str, identifier: &str) -> Result<()> {
        let client = self.clients.lock().take(kind, identifier).ok_or_else(|| {
            FoundationError::PoolUsage(format!(
                "No client '{}' of type '{}' in the pool.",
                identifier, kind
            ))
        })?;
        debug!(session = self.id, kind, identifier, "client removed");
        client.shutdown(self)
    }

    // ------------------------------------------------------------------------
    // Poolers
    // ------------------------------------------------------------------------

    /// Bind `pooler` to this session. A pooler already registered for the
    /// same kind is replaced.
    pub fn register_pooler(&self, pooler: Arc<dyn Pooler>) -> Result<()> {
        self.ensure_live()?;
        let kind = pooler.pooler_type().to_string();
        if kind.is_empty() {
            return Err(FoundationError::PoolUsage(
                "Can not register a pooler with an empty type.".to_string(),
            ));
        }
        pooler.register(self)?;
        if self.poolers.write().insert(kind.clone(), pooler).is_some() {
            debug!(session = self.id, kind = %kind, "pooler replaced");
        } else {
            debug!(session = self.id, kind = %kind, "pooler registered");
        }
        Ok(())
    }

    pub fn has_pooler(&self, kind: &str) -> bool {
        self.poolers.read().contains_key(kind)
    }

    /// Registered pooler kinds, sorted.
    pub fn pooler_kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.poolers.read().keys().cloned().collect();
        kinds.sort();
        kinds
    }

    pub fn pooler_for_kind(&self, kind: &str) -> Result<Arc<dyn Pooler>> {
        let poolers = self.poolers.read();
        if let Some(pooler) = poolers.get(kind) {
            return Ok(Arc::clone(pooler));
        }
        if poolers.is_empty() && *self.state.lock() != SessionState::Live {
            return Err(FoundationError::PoolUsage(
                "There are no poolers in the session because it is shutdown.".to_string(),
            ));
        }
        let mut available: Vec<&str> = poolers.keys().map(String::as_str).collect();
        available.sort_unstable();
        Err(FoundationError::PoolUsage(format!(
            "No pooler registered for type '{}'. Poolers available: {{{}}}.",
            kind,
            available.join(", ")
        )))
    }

    /// Pooled client of `kind` for `identifier`, created on first use.
    pub fn client(&self, kind: &str, identifier: &str) -> Result<Arc<dyn Client>> {
        let pooler = self.pooler_for_kind(kind)?;
        pooler.get_client(self, identifier)
    }

    // ------------------------------------------------------------------------
    // Typed accessors
    // ------------------------------------------------------------------------

    /// Converter for a type name (`int4`, `varchar[]`, `my_schema.my_type`).
    pub fn converter(&self, type_name: &str) -> Result<Arc<ConverterClient>> {
        downcast_client(self.client(ClientKind::Converter.as_str(), type_name)?)
    }

    /// Prepared statement for `sql`, pooled under its signature.
    pub fn prepared_query(&self, sql: &str) -> Result<Arc<PreparedQuery>> {
        downcast_client(self.client(ClientKind::PreparedQuery.as_str(), sql)?)
    }

    /// Query manager by name (`simple` or `prepared`).
    pub fn query_manager(&self, name: &str) -> Result<Arc<QueryManager>> {
        downcast_client(self.client(ClientKind::QueryManager.as_str(), name)?)
    }

    pub fn listener(&self, name: &str) -> Result<Arc<Listener>> {
        downcast_client(self.client(ClientKind::Listener.as_str(), name)?)
    }

    /// Observer listening to `channel`.
    pub fn observer(&self, channel: &str) -> Result<Arc<Observer>> {
        downcast_client(self.client(ClientKind::Observer.as_str(), channel)?)
    }

    pub fn inspector(&self) -> Result<Arc<Inspector>> {
        downcast_client(self.client(ClientKind::Inspector.as_str(), crate::inspector::DEFAULT_INSPECTOR)?)
    }

    // ------------------------------------------------------------------------
    // Conveniences
    // ------------------------------------------------------------------------

    /// Send `data` to the listeners named by `targets`. Does nothing when
    /// no listener pooler is registered.
    pub fn notify(&self, targets: &[&str], data: &JsonValue) -> Result<()> {
        let kind = ClientKind::Listener.as_str();
        if !self.has_pooler(kind) {
            return Ok(());
        }
        let pooler = downcast_pooler::<ListenerPooler>(self.pooler_for_kind(kind)?)?;
        pooler.notify(self, targets, data)
    }

    pub fn decode(&self, type_name: &str, data: Option<&str>) -> Result<PgValue> {
        self.converter(type_name)?.decode(data, Some(type_name), self)
    }

    pub fn encode(&self, type_name: &str, value: &PgValue) -> Result<String> {
        self.converter(type_name)?.encode(value, Some(type_name), self)
    }

    pub fn encode_wire(&self, type_name: &str, value: &PgValue) -> Result<Option<String>> {
        self.converter(type_name)?.encode_wire(value, Some(type_name), self)
    }

    /// Run `sql` through the `simple` query manager.
    pub fn query(&self, sql: &str, parameters: &[PgValue]) -> Result<ConvertedResult<'_>> {
        self.query_manager(crate::query_manager::SIMPLE)?
            .query(self, sql, parameters)
    }

    // ------------------------------------------------------------------------
    // Shutdown
    // ------------------------------------------------------------------------

    /// Tear every client down once, then close the connection.
    ///
    /// Idempotent. Failures do not stop the teardown; they are all returned.
    pub fn shutdown(&self) -> Vec<FoundationError> {
        {
            let mut state = self.state.lock();
            if *state != SessionState::Live {
                return Vec::new();
            }
            *state = SessionState::ShuttingDown;
        }

        self.poolers.write().clear();
        let clients = self.clients.lock().drain();
        let count = clients.len();
        let mut errors = shutdown_clients(clients, self);

        if let Err(e) = self.connection.lock().close() {
            warn!(session = self.id, error = %e, "connection close failed");
            errors.push(e);
        }
        *self.state.lock() = SessionState::Shutdown;
        debug!(session = self.id, clients = count, errors = errors.len(), "session shutdown");
        errors
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        // Errors are already logged one by one.
        let _ = self.shutdown();
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("stamp", &self.stamp)
            .field("state", &*self.state.lock())
            .field("clients", &self.clients.lock().len())
            .finish()
    }
}
