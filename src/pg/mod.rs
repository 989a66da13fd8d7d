//! PostgreSQL-facing building blocks.
//!
//! Architecture:
//! - `connection`: the driver boundary and owned text result sets
//! - `types`: values exchanged with the converters
//! - `parameters`: `$*` placeholder numbering and type hints
//! - `statement`: prepared statements pooled per session
//! - `error`: server-reported failures

pub mod connection;
pub mod error;
pub mod parameters;
pub mod statement;
pub mod types;

#[cfg(test)]
mod tests;

pub use connection::{Column, Connection, ConnectionStatus, Notification, ResultSet, SharedColumns};
pub use error::SqlError;
pub use statement::{PreparationStatus, PreparedQuery, PreparedQueryPooler};
pub use types::{Circle, Interval, PgBox, PgValue, Point, Range, RangeBound};
