//! pgfoundation - session layer for PostgreSQL clients.
//!
//! A [`Session`] wraps one connection and pools the clients that work with
//! it: type converters, prepared statements, query managers, listeners,
//! observers and an inspector. Clients are built on first use by the
//! pooler registered for their kind, and torn down once when the session
//! shuts down. A [`Foundation`] keeps named session builders and hands out
//! one cached session per name.
//!
//! ```ignore
//! let builder = SessionBuilder::new(SessionConfig::default());
//! let session = builder.build_session(Box::new(connection), Some("app"))?;
//!
//! let ids = session.decode("int4[]", Some("{1,2,NULL,4}"))?;
//! let rows = session.query("select $*::int4 + 1 as n", &[PgValue::Int(41)])?;
//! ```

pub mod builder;
pub mod config;
pub mod converter;
pub mod error;
pub mod foundation;
pub mod inspector;
pub mod listener;
pub mod observer;
pub mod pg;
pub mod pool;
pub mod pooler;
pub mod query_manager;
pub mod result;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use builder::SessionBuilder;
pub use config::{ConnectionConfig, SessionConfig};
pub use converter::{Converter, ConverterClient, TypeRegistry};
pub use error::{FoundationError, Result};
pub use foundation::Foundation;
pub use pg::{Connection, PgValue, ResultSet, SqlError};
pub use pool::Client;
pub use pooler::Pooler;
pub use result::{ConvertedResult, ConvertedRow};
pub use session::{ClientKind, Session};
