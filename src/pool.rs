//! Session resource pool.
//!
//! This module provides:
//! - `Client`: the capability every pooled resource implements
//! - `ResourcePool`: keyed singleton store `(kind, identifier) -> client`
//! - `shutdown_clients`: exhaustive teardown that collects errors
//!
//! The pool holds at most one client per key. It never calls into a client
//! itself; the session takes clients out and runs their hooks so no lock is
//! held while client code executes.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::warn;

use crate::error::{FoundationError, Result};
use crate::session::Session;

// ============================================================================
// Client
// ============================================================================

/// A stateful, session-scoped resource.
pub trait Client: Send + Sync + 'static {
    /// Kind of the client, e.g. `converter` or `prepared_query`.
    fn client_type(&self) -> &str;

    /// Key of this client among the clients of its kind.
    fn client_identifier(&self) -> &str;

    /// Called once, right before the client enters the pool.
    fn initialize(&self, _session: &Session) -> Result<()> {
        Ok(())
    }

    /// Called once, when the client leaves the pool.
    fn shutdown(&self, _session: &Session) -> Result<()> {
        Ok(())
    }

    /// Upcast used to recover the concrete client type.
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

/// Recover the concrete type of a pooled client.
pub fn downcast_client<T: Client>(client: Arc<dyn Client>) -> Result<Arc<T>> {
    let kind = client.client_type().to_string();
    let identifier = client.client_identifier().to_string();
    client.into_any().downcast::<T>().map_err(|_| {
        FoundationError::PoolUsage(format!(
            "Client '{}' of type '{}' is not a {}.",
            identifier,
            kind,
            std::any::type_name::<T>()
        ))
    })
}

/// Pool key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientKey {
    pub kind: String,
    pub identifier: String,
}

impl ClientKey {
    pub fn new(kind: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            identifier: identifier.into(),
        }
    }

    fn of(client: &dyn Client) -> Self {
        Self::new(client.client_type(), client.client_identifier())
    }
}

impl fmt::Display for ClientKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.identifier)
    }
}

// ============================================================================
// Resource Pool
// ============================================================================

/// Keyed singleton store remembering creation order.
#[derive(Default)]
pub struct ResourcePool {
    clients: HashMap<ClientKey, Arc<dyn Client>>,
    order: Vec<ClientKey>,
}

impl ResourcePool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, kind: &str, identifier: &str) -> Option<Arc<dyn Client>> {
        self.clients
            .get(&ClientKey::new(kind, identifier))
            .map(Arc::clone)
    }

    pub fn contains(&self, kind: &str, identifier: &str) -> bool {
        self.clients.contains_key(&ClientKey::new(kind, identifier))
    }

    /// Add a client. A second client under an occupied key is refused so
    /// the pool never holds two live instances for one key.
    pub fn add(&mut self, client: Arc<dyn Client>) -> Result<()> {
        let key = ClientKey::of(client.as_ref());
        if self.clients.contains_key(&key) {
            return Err(FoundationError::PoolUsage(format!(
                "A client is already registered for '{}'.",
                key
            )));
        }
        self.order.push(key.clone());
        self.clients.insert(key, client);
        Ok(())
    }

    /// Remove a client without tearing it down.
    pub fn take(&mut self, kind: &str, identifier: &str) -> Option<Arc<dyn Client>> {
        let key = ClientKey::new(kind, identifier);
        let client = self.clients.remove(&key)?;
        self.order.retain(|k| k != &key);
        Some(client)
    }

    /// Every client of a kind, in creation order.
    pub fn all_for(&self, kind: &str) -> Vec<Arc<dyn Client>> {
        self.order
            .iter()
            .filter(|k| k.kind == kind)
            .filter_map(|k| self.clients.get(k).map(Arc::clone))
            .collect()
    }

    /// Identifiers of the clients of a kind, in creation order.
    pub fn identifiers_for(&self, kind: &str) -> Vec<String> {
        self.order
            .iter()
            .filter(|k| k.kind == kind)
            .map(|k| k.identifier.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Empty the pool, handing back every client in creation order.
    pub fn drain(&mut self) -> Vec<Arc<dyn Client>> {
        let order = std::mem::take(&mut self.order);
        let mut clients = std::mem::take(&mut self.clients);
        order
            .into_iter()
            .filter_map(|key| clients.remove(&key))
            .collect()
    }
}

/// Tear down every client, continuing past failures.
///
/// Each client's shutdown hook runs exactly once. The errors are returned in
/// the order they happened.
pub fn shutdown_clients(clients: Vec<Arc<dyn Client>>, session: &Session) -> Vec<FoundationError> {
    let mut errors = Vec::new();
    for client in clients {
        if let Err(e) = client.shutdown(session) {
            warn!(
                kind = client.client_type(),
                identifier = client.client_identifier(),
                error = %e,
                "client shutdown failed"
            );
            errors.push(e);
        }
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Dummy {
        kind: &'static str,
        id: String,
    }

    impl Client for Dummy {
        fn client_type(&self) -> &str {
            self.kind
        }

        fn client_identifier(&self) -> &str {
            &self.id
        }

        fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
            self
        }
    }

    fn dummy(kind: &'static str, id: &str) -> Arc<dyn Client> {
        Arc::new(Dummy {
            kind,
            id: id.to_string(),
        })
    }

    #[test]
    fn test_get_returns_same_instance() {
        let mut pool = ResourcePool::new();
        let client = dummy("pika", "one");
        pool.add(Arc::clone(&client)).unwrap();

        let first = pool.get("pika", "one").unwrap();
        let second = pool.get("pika", "one").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(Arc::ptr_eq(&first, &client));
        assert!(pool.get("pika", "two").is_none());
        assert!(pool.get("chu", "one").is_none());
    }

    #[test]
    fn test_add_refuses_occupied_key() {
        let mut pool = ResourcePool::new();
        pool.add(dummy("pika", "one")).unwrap();
        let err = pool.add(dummy("pika", "one")).unwrap_err();
        assert!(matches!(err, FoundationError::PoolUsage(_)));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_all_for_keeps_creation_order() {
        let mut pool = ResourcePool::new();
        pool.add(dummy("pika", "b")).unwrap();
        pool.add(dummy("chu", "x")).unwrap();
        pool.add(dummy("pika", "a")).unwrap();

        assert_eq!(pool.identifiers_for("pika"), vec!["b", "a"]);
        assert_eq!(pool.all_for("chu").len(), 1);
        assert!(pool.all_for("nope").is_empty());
    }

    #[test]
    fn test_take_then_drain() {
        let mut pool = ResourcePool::new();
        pool.add(dummy("pika", "one")).unwrap();
        pool.add(dummy("pika", "two")).unwrap();

        assert!(pool.take("pika", "one").is_some());
        assert!(pool.take("pika", "one").is_none());
        assert!(!pool.contains("pika", "one"));

        let drained = pool.drain();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].client_identifier(), "two");
        assert!(pool.is_empty());
    }

    #[test]
    fn test_downcast_client() {
        let client = dummy("pika", "one");
        let concrete = downcast_client::<Dummy>(client).unwrap();
        assert_eq!(concrete.id, "one");
    }
}
