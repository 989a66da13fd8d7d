//! LISTEN/NOTIFY observers.
//!
//! An observer is pooled under its channel name. It issues `LISTEN` when it
//! enters the pool and `UNLISTEN` when it leaves it.

use std::any::Any;
use std::sync::Arc;

use tracing::debug;

use crate::error::{FoundationError, Result};
use crate::pg::connection::Notification;
use crate::pool::Client;
use crate::pooler::{Pooler, PoolerState};
use crate::session::{ClientKind, Session};

#[derive(Debug)]
pub struct Observer {
    channel: String,
}

impl Observer {
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Next pending notification, if any. Does not block.
    pub fn get_notification(&self, session: &Session) -> Result<Option<Notification>> {
        session.connection()?.get_notification()
    }

    /// Turn a pending notification into an error.
    pub fn throw_notification(&self, session: &Session) -> Result<&Self> {
        match self.get_notification(session)? {
            Some(notification) => Err(FoundationError::Notification {
                channel: notification.channel,
                pid: notification.pid,
                payload: notification.payload,
            }),
            None => Ok(self),
        }
    }

    /// Send `LISTEN` again, e.g. after the connection was reset.
    pub fn restart_listening(&self, session: &Session) -> Result<()> {
        self.send(session, "listen")
    }

    fn send(&self, session: &Session, command: &str) -> Result<()> {
        let mut connection = session.connection()?;
        let sql = format!("{} {}", command, connection.escape_identifier(&self.channel));
        connection.execute_anonymous_query(&sql)?;
        debug!(channel = %self.channel, command, "observer");
        Ok(())
    }
}

impl Client for Observer {
    fn client_type(&self) -> &str {
        ClientKind::Observer.as_str()
    }

    fn client_identifier(&self) -> &str {
        &self.channel
    }

    fn initialize(&self, session: &Session) -> Result<()> {
        self.restart_listening(session)
    }

    fn shutdown(&self, session: &Session) -> Result<()> {
        self.send(session, "unlisten")
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

#[derive(Debug, Default)]
pub struct ObserverPooler {
    state: PoolerState,
}

impl ObserverPooler {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Pooler for ObserverPooler {
    fn pooler_type(&self) -> &str {
        ClientKind::Observer.as_str()
    }

    fn state(&self) -> &PoolerState {
        &self.state
    }

    fn create_client(&self, _session: &Session, channel: &str) -> Result<Arc<dyn Client>> {
        Ok(Arc::new(Observer::new(channel)))
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}
