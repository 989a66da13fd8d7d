//! In-process event listeners.
//!
//! A listener is a named list of callbacks. Events are sent through the
//! listener pooler, which routes `name:detail` events to both the `name`
//! and the `name:detail` listeners. Only listeners that already exist are
//! notified; sending an event never creates one.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value as JsonValue;
use tracing::trace;

use crate::error::Result;
use crate::pool::{downcast_client, Client};
use crate::pooler::{Pooler, PoolerState};
use crate::session::{ClientKind, Session};

/// Callback receiving the event name, its payload and the session.
pub type ListenerAction = Arc<dyn Fn(&str, &JsonValue, &Session) -> Result<()> + Send + Sync>;

pub struct Listener {
    name: String,
    actions: Mutex<Vec<ListenerAction>>,
}

impl Listener {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            actions: Mutex::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attach_action<F>(&self, action: F) -> &Self
    where
        F: Fn(&str, &JsonValue, &Session) -> Result<()> + Send + Sync + 'static,
    {
        self.actions.lock().push(Arc::new(action));
        self
    }

    pub fn action_count(&self) -> usize {
        self.actions.lock().len()
    }

    /// Call every action in attachment order. The first failing action stops
    /// the notification.
    pub fn notify(&self, event_name: &str, data: &JsonValue, session: &Session) -> Result<()> {
        let actions: Vec<ListenerAction> = self.actions.lock().clone();
        trace!(listener = %self.name, event = event_name, actions = actions.len(), "notify");
        for action in actions {
            action(event_name, data, session)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("name", &self.name)
            .field("actions", &self.action_count())
            .finish()
    }
}

impl Client for Listener {
    fn client_type(&self) -> &str {
        ClientKind::Listener.as_str()
    }

    fn client_identifier(&self) -> &str {
        &self.name
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

#[derive(Debug, Default)]
pub struct ListenerPooler {
    state: PoolerState,
}

impl ListenerPooler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Send an event to listeners.
    ///
    /// `targets` holds event names; `*` stands for every existing listener.
    pub fn notify(&self, session: &Session, targets: &[&str], data: &JsonValue) -> Result<()> {
        self.state.check(self.pooler_type(), session)?;
        let kind = self.pooler_type();

        let mut events: Vec<String> = Vec::new();
        for target in targets {
            if *target == "*" {
                for client in session.clients_for_kind(kind) {
                    events.push(client.client_identifier().to_string());
                }
            } else {
                events.push(target.to_string());
            }
        }

        for event in &events {
            if let Some((name, _)) = event.split_once(':') {
                self.notify_listener(session, name, event, data)?;
            }
            self.notify_listener(session, event, event, data)?;
        }
        Ok(())
    }

    fn notify_listener(&self, session: &Session, name: &str, event: &str, data: &JsonValue) -> Result<()> {
        if let Some(client) = session.pooled_client(self.pooler_type(), name)? {
            downcast_client::<Listener>(client)?.notify(event, data, session)?;
        }
        Ok(())
    }
}

impl Pooler for ListenerPooler {
    fn pooler_type(&self) -> &str {
        ClientKind::Listener.as_str()
    }

    fn state(&self) -> &PoolerState {
        &self.state
    }

    fn create_client(&self, _session: &Session, name: &str) -> Result<Arc<dyn Client>> {
        Ok(Arc::new(Listener::new(name)))
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}
