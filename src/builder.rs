//! Session builder.
//!
//! A builder holds the configuration and type registry shared by every
//! session it builds. Each session gets fresh poolers, since a pooler is
//! bound to exactly one session.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::config::SessionConfig;
use crate::converter::{Converter, ConverterPooler, TypeRegistry};
use crate::error::Result;
use crate::inspector::InspectorPooler;
use crate::listener::ListenerPooler;
use crate::observer::ObserverPooler;
use crate::pg::connection::Connection;
use crate::pg::statement::PreparedQueryPooler;
use crate::pooler::Pooler;
use crate::query_manager::QueryManagerPooler;
use crate::session::Session;

/// Builds a custom pooler for each new session.
pub type PoolerFactory = Arc<dyn Fn() -> Arc<dyn Pooler> + Send + Sync>;

/// Runs on every new session once its poolers are registered.
pub type SessionHook = Arc<dyn Fn(&Session) -> Result<()> + Send + Sync>;

pub struct SessionBuilder {
    config: SessionConfig,
    registry: TypeRegistry,
    poolers: Vec<PoolerFactory>,
    hooks: Vec<SessionHook>,
}

impl SessionBuilder {
    /// A builder with the converters for PostgreSQL's built-in types.
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            registry: TypeRegistry::with_defaults(),
            poolers: Vec::new(),
            hooks: Vec::new(),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut TypeRegistry {
        &mut self.registry
    }

    /// Register a converter for `types`. The name must not be taken.
    pub fn with_converter(
        mut self,
        name: &str,
        converter: Arc<dyn Converter>,
        types: &[&str],
    ) -> Result<Self> {
        self.registry.register(name, converter, types, true)?;
        Ok(self)
    }

    /// Register a pooler on every session. A pooler of a built-in kind
    /// replaces the default one.
    pub fn with_pooler<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Arc<dyn Pooler> + Send + Sync + 'static,
    {
        self.poolers.push(Arc::new(factory));
        self
    }

    /// Run `hook` on every session once it is built.
    pub fn post_build<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Session) -> Result<()> + Send + Sync + 'static,
    {
        self.hooks.push(Arc::new(hook));
        self
    }

    /// Open a session over `connection`.
    ///
    /// Sends the configured settings, registers the default poolers, then
    /// the custom poolers, then runs the post build hooks.
    pub fn build_session(&self, connection: Box<dyn Connection>, stamp: Option<&str>) -> Result<Session> {
        let session = Session::new(connection, stamp.map(str::to_string));

        if let Some(sql) = self.config.settings_query() {
            session.connection()?.execute_anonymous_query(&sql)?;
        }

        session.register_pooler(Arc::new(PreparedQueryPooler::new()))?;
        session.register_pooler(Arc::new(QueryManagerPooler::new()))?;
        session.register_pooler(Arc::new(ConverterPooler::new(self.registry.clone())))?;
        session.register_pooler(Arc::new(ObserverPooler::new()))?;
        session.register_pooler(Arc::new(InspectorPooler::new()))?;
        session.register_pooler(Arc::new(ListenerPooler::new()))?;

        for factory in &self.poolers {
            session.register_pooler(factory())?;
        }
        for hook in &self.hooks {
            hook(&session)?;
        }

        debug!(session = session.id(), stamp = stamp, poolers = ?session.pooler_kinds(), "session built");
        Ok(session)
    }
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

impl fmt::Debug for SessionBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionBuilder")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("poolers", &self.poolers.len())
            .field("hooks", &self.hooks.len())
            .finish()
    }
}
