//! Named session builders and the sessions they opened.
//!
//! A `Foundation` is the entry point of an application talking to one or
//! more databases. Each database gets a named `SessionBuilder` and a
//! connector that opens connections for it. The first session asked for a
//! name is built, configured and cached; later requests get the same
//! session until it is removed or shut down.
//!
//! ```ignore
//! let mut foundation = Foundation::new();
//! foundation.add_builder("main", SessionBuilder::default(), |config| {
//!     Ok(Box::new(MyDriver::connect(config.connection_config()?)?) as Box<dyn Connection>)
//! });
//! let session = foundation.default_session()?;
//! ```

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::builder::{SessionBuilder, SessionHook};
use crate::config::SessionConfig;
use crate::error::{FoundationError, Result};
use crate::pg::connection::Connection;
use crate::session::Session;

/// Opens a connection for a builder's configuration.
pub type Connector = Arc<dyn Fn(&SessionConfig) -> Result<Box<dyn Connection>> + Send + Sync>;

struct BuilderEntry {
    builder: SessionBuilder,
    connector: Connector,
    /// Run on every session of this builder, after the builder's own hooks.
    post_configurations: Vec<SessionHook>,
}

#[derive(Default)]
pub struct Foundation {
    builders: BTreeMap<String, BuilderEntry>,
    sessions: HashMap<String, Arc<Session>>,
    default: Option<String>,
}

impl Foundation {
    pub fn new() -> Self {
        Self::default()
    }

    /// One builder per configuration, all sharing `connector`. The first
    /// name in iteration order becomes the default.
    pub fn from_configurations<I, F>(configurations: I, connector: F) -> Self
    where
        I: IntoIterator<Item = (String, SessionConfig)>,
        F: Fn(&SessionConfig) -> Result<Box<dyn Connection>> + Send + Sync + 'static,
    {
        let connector: Connector = Arc::new(connector);
        let mut foundation = Self::new();
        for (name, config) in configurations {
            foundation.insert_builder(name, SessionBuilder::new(config), Arc::clone(&connector));
        }
        foundation
    }

    /// Add or replace the builder `name`. Replacing a builder drops its
    /// post configurations. The first builder added becomes the default.
    pub fn add_builder<F>(&mut self, name: impl Into<String>, builder: SessionBuilder, connector: F) -> &mut Self
    where
        F: Fn(&SessionConfig) -> Result<Box<dyn Connection>> + Send + Sync + 'static,
    {
        self.insert_builder(name.into(), builder, Arc::new(connector));
        self
    }

    fn insert_builder(&mut self, name: String, builder: SessionBuilder, connector: Connector) {
        debug!(builder = %name, "session builder added");
        if self.default.is_none() {
            self.default = Some(name.clone());
        }
        self.builders.insert(
            name,
            BuilderEntry {
                builder,
                connector,
                post_configurations: Vec::new(),
            },
        );
    }

    /// Run `hook` on each session built by `name` from now on.
    pub fn add_post_configuration<F>(&mut self, name: &str, hook: F) -> Result<&mut Self>
    where
        F: Fn(&Session) -> Result<()> + Send + Sync + 'static,
    {
        self.entry_mut(name)?.post_configurations.push(Arc::new(hook));
        Ok(self)
    }

    pub fn has_builder(&self, name: &str) -> bool {
        self.builders.contains_key(name)
    }

    pub fn builder(&self, name: &str) -> Result<&SessionBuilder> {
        Ok(&self.entry(name)?.builder)
    }

    /// Builder names, sorted.
    pub fn builder_names(&self) -> Vec<&str> {
        self.builders.keys().map(String::as_str).collect()
    }

    /// Remove the builder `name` and forget its cached session. A removed
    /// default builder leaves no default.
    pub fn remove_builder(&mut self, name: &str) -> Result<&mut Self> {
        self.entry(name)?;
        self.builders.remove(name);
        self.sessions.remove(name);
        if self.default.as_deref() == Some(name) {
            self.default = None;
        }
        debug!(builder = name, "session builder removed");
        Ok(self)
    }

    pub fn set_default_builder(&mut self, name: &str) -> Result<&mut Self> {
        if !self.has_builder(name) {
            return Err(FoundationError::Configuration(format!("No such builder '{}'.", name)));
        }
        self.default = Some(name.to_string());
        Ok(self)
    }

    pub fn is_default_session(&self, name: &str) -> bool {
        self.default.as_deref() == Some(name)
    }

    /// Session of the default builder.
    pub fn default_session(&mut self) -> Result<Arc<Session>> {
        let name = self.default.clone().ok_or_else(|| {
            FoundationError::Configuration("No default session builder set.".to_string())
        })?;
        self.session(&name)
    }

    /// Cached session of `name`, built on first use.
    pub fn session(&mut self, name: &str) -> Result<Arc<Session>> {
        match self.sessions.get(name) {
            Some(session) => Ok(Arc::clone(session)),
            None => self.create_session(name),
        }
    }

    /// Build a new session for `name` and cache it in place of any previous
    /// one. The session stamp is the builder name.
    pub fn create_session(&mut self, name: &str) -> Result<Arc<Session>> {
        let entry = self.entry(name)?;
        let connection = (entry.connector)(entry.builder.config())?;
        let session = entry.builder.build_session(connection, Some(name))?;
        for hook in &entry.post_configurations {
            hook(&session)?;
        }

        let session = Arc::new(session);
        self.sessions.insert(name.to_string(), Arc::clone(&session));
        debug!(builder = name, session = session.id(), "session created");
        Ok(session)
    }

    pub fn has_session(&self, name: &str) -> bool {
        self.sessions.contains_key(name)
    }

    /// Forget the cached session of `name`. The session shuts down when its
    /// last handle is dropped.
    pub fn remove_session(&mut self, name: &str) -> Result<&mut Self> {
        self.entry(name)?;
        self.sessions.remove(name);
        Ok(self)
    }

    /// Shut down and forget the sessions of `names`, or every cached session
    /// when `names` is empty. Every name must be a known builder; builders
    /// without a session are skipped. Teardown errors are returned.
    pub fn shutdown(&mut self, names: &[&str]) -> Result<Vec<FoundationError>> {
        let targets: Vec<String> = if names.is_empty() {
            self.sessions.keys().cloned().collect()
        } else {
            for name in names {
                self.entry(name)?;
            }
            names
                .iter()
                .filter(|name| self.sessions.contains_key(**name))
                .map(|name| name.to_string())
                .collect()
        };

        let mut errors = Vec::new();
        for name in targets {
            if let Some(session) = self.sessions.remove(&name) {
                let failures = session.shutdown();
                if !failures.is_empty() {
                    warn!(builder = %name, errors = failures.len(), "session shutdown reported errors");
                }
                errors.extend(failures);
            }
        }
        Ok(errors)
    }

    fn entry(&self, name: &str) -> Result<&BuilderEntry> {
        self.builders.get(name).ok_or_else(|| self.unknown_builder(name))
    }

    fn entry_mut(&mut self, name: &str) -> Result<&mut BuilderEntry> {
        if !self.builders.contains_key(name) {
            return Err(self.unknown_builder(name));
        }
        self.builders
            .get_mut(name)
            .ok_or_else(|| FoundationError::Configuration(format!("No such builder '{}'.", name)))
    }

    fn unknown_builder(&self, name: &str) -> FoundationError {
        FoundationError::Configuration(format!(
            "No such builder '{}'. Available builders are {{{}}}.",
            name,
            self.builders
                .keys()
                .map(|k| format!("'{}'", k))
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }
}

impl fmt::Debug for Foundation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Foundation")
            .field("builders", &self.builder_names())
            .field("sessions", &self.sessions.keys().collect::<Vec<_>>())
            .field("default", &self.default)
            .finish()
    }
}
