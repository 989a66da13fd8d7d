//! Client poolers.
//!
//! A pooler is the factory for one kind of client. It is registered with a
//! session once, then resolves identifiers to pooled clients, building and
//! registering a client on the first miss.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{FoundationError, Result};
use crate::pool::Client;
use crate::session::Session;

/// Whether a pooler has been bound to a session yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PoolerRegistration {
    #[default]
    Unregistered,
    Registered { session_id: u64 },
}

/// Registration state machine shared by every pooler.
#[derive(Default)]
pub struct PoolerState {
    registration: Mutex<PoolerRegistration>,
}

impl PoolerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registration(&self) -> PoolerRegistration {
        *self.registration.lock()
    }

    /// Bind to `session`. A pooler is registered exactly once.
    pub fn register(&self, kind: &str, session: &Session) -> Result<()> {
        let mut registration = self.registration.lock();
        match *registration {
            PoolerRegistration::Unregistered => {
                *registration = PoolerRegistration::Registered {
                    session_id: session.id(),
                };
                Ok(())
            }
            PoolerRegistration::Registered { session_id } => Err(FoundationError::PoolUsage(
                format!(
                    "Client pooler '{}' is already registered with session #{}.",
                    kind, session_id
                ),
            )),
        }
    }

    /// Fail unless bound to `session`.
    pub fn check(&self, kind: &str, session: &Session) -> Result<()> {
        match self.registration() {
            PoolerRegistration::Registered { session_id } if session_id == session.id() => Ok(()),
            PoolerRegistration::Registered { session_id } => Err(FoundationError::PoolUsage(
                format!(
                    "Client pooler '{}' belongs to session #{}, not session #{}.",
                    kind,
                    session_id,
                    session.id()
                ),
            )),
            PoolerRegistration::Unregistered => Err(FoundationError::PoolUsage(format!(
                "Client pooler '{}' is not initialized, session not set.",
                kind
            ))),
        }
    }
}

impl fmt::Debug for PoolerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PoolerState").field(&self.registration()).finish()
    }
}

/// Factory and lookup for one kind of client.
pub trait Pooler: Send + Sync + 'static {
    /// Kind of the clients this pooler manages.
    fn pooler_type(&self) -> &str;

    fn state(&self) -> &PoolerState;

    /// Build a new client for `identifier`. The client's identifier must be
    /// `self.pool_identifier(identifier)`.
    fn create_client(&self, session: &Session, identifier: &str) -> Result<Arc<dyn Client>>;

    /// Upcast used to recover the concrete pooler type.
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;

    fn register(&self, session: &Session) -> Result<()> {
        self.state().register(self.pooler_type(), session)
    }

    /// Key under which a requested identifier is pooled.
    fn pool_identifier(&self, identifier: &str) -> String {
        identifier.to_string()
    }

    /// Pooled client for `identifier`, created and registered on first use.
    fn get_client(&self, session: &Session, identifier: &str) -> Result<Arc<dyn Client>> {
        self.state().check(self.pooler_type(), session)?;
        let key = self.pool_identifier(identifier);
        if let Some(client) = session.pooled_client(self.pooler_type(), &key)? {
            return Ok(client);
        }

        let client = self.create_client(session, identifier)?;
        if client.client_identifier() != key {
            return Err(FoundationError::PoolUsage(format!(
                "Client pooler '{}' built client '{}' for key '{}'.",
                self.pooler_type(),
                client.client_identifier(),
                key
            )));
        }
        session.register_client(Arc::clone(&client))?;
        Ok(client)
    }
}

/// Recover the concrete type of a registered pooler.
pub fn downcast_pooler<T: Pooler>(pooler: Arc<dyn Pooler>) -> Result<Arc<T>> {
    let kind = pooler.pooler_type().to_string();
    pooler.into_any().downcast::<T>().map_err(|_| {
        FoundationError::PoolUsage(format!(
            "Pooler for type '{}' is not a {}.",
            kind,
            std::any::type_name::<T>()
        ))
    })
}
