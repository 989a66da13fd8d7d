//! Connection boundary.
//!
//! The session never talks to a socket itself. A native driver implements
//! [`Connection`] and hands it to the session builder. This module provides:
//! - `Connection`: the calls the foundation needs from a driver
//! - `ResultSet`: an owned, text-format result (freed when dropped)
//! - `Notification`: one pending LISTEN/NOTIFY message
//! - Identifier and literal escaping following libpq's rules

use std::sync::Arc;

use crate::error::Result;

// ============================================================================
// Result Sets
// ============================================================================

/// A result column: its name and the server's name for its type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    /// `None` when the driver could not resolve the type OID to a name.
    pub type_name: Option<String>,
}

impl Column {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: Some(type_name.into()),
        }
    }

    pub fn untyped(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: None,
        }
    }
}

/// Column descriptions shared between a result and the rows decoded from it.
pub type SharedColumns = Arc<Vec<Column>>;

/// Rows of a query in text format. `None` cells are SQL NULLs.
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    pub columns: SharedColumns,
    pub rows: Vec<Vec<Option<String>>>,
    /// Command tag (e.g., "SELECT 5" or "INSERT 0 1")
    pub command_tag: String,
}

impl ResultSet {
    pub fn new(columns: Vec<Column>) -> Self {
        Self {
            columns: Arc::new(columns),
            rows: Vec::new(),
            command_tag: String::new(),
        }
    }

    /// Result of a statement that returns no rows.
    pub fn command(tag: impl Into<String>) -> Self {
        Self {
            command_tag: tag.into(),
            ..Self::default()
        }
    }

    pub fn with_row<I, S>(mut self, row: I) -> Self
    where
        I: IntoIterator<Item = Option<S>>,
        S: Into<String>,
    {
        self.rows.push(row.into_iter().map(|c| c.map(Into::into)).collect());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.command_tag = tag.into();
        self
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column by name.
    pub fn field_position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Rows touched by the command, read from its tag.
    pub fn affected_rows(&self) -> u64 {
        parse_rows_affected(&self.command_tag)
    }
}

fn parse_rows_affected(tag: &str) -> u64 {
    // - "INSERT 0 5" -> 5 rows
    // - "UPDATE 3" / "DELETE 2" / "SELECT 10"
    let parts: Vec<&str> = tag.split_whitespace().collect();
    match parts.as_slice() {
        ["INSERT", _, n] | ["UPDATE", n] | ["DELETE", n] | ["SELECT", n] | ["MERGE", n] => {
            n.parse().unwrap_or(0)
        }
        _ => 0,
    }
}

// ============================================================================
// Notifications
// ============================================================================

/// A NOTIFY received on a channel the connection is listening to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub channel: String,
    /// Backend process that sent it
    pub pid: i32,
    pub payload: String,
}

// ============================================================================
// Connection
// ============================================================================

/// State of the underlying link as reported by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// Not connected yet (drivers may connect lazily).
    Idle,
    Ok,
    Bad,
    Closed,
}

/// What a native PostgreSQL driver must provide.
///
/// All calls are blocking. Results are returned in text format; the
/// session's converters take care of the values.
pub trait Connection: Send {
    /// Run SQL without parameters (may hold several statements).
    fn execute_anonymous_query(&mut self, sql: &str) -> Result<ResultSet>;

    /// Run a single statement with positional `$n` parameters.
    fn send_query_with_parameters(
        &mut self,
        sql: &str,
        parameters: &[Option<String>],
    ) -> Result<ResultSet>;

    /// Prepare `sql` on the server under the name `identifier`.
    fn send_prepare_query(&mut self, identifier: &str, sql: &str) -> Result<()>;

    /// Execute a statement previously prepared under `identifier`.
    /// `sql` is only used for error reporting.
    fn send_execute_query(
        &mut self,
        identifier: &str,
        parameters: &[Option<String>],
        sql: &str,
    ) -> Result<ResultSet>;

    /// Non-blocking poll for a pending notification.
    fn get_notification(&mut self) -> Result<Option<Notification>>;

    fn escape_identifier(&self, identifier: &str) -> String {
        escape_identifier(identifier)
    }

    fn escape_literal(&self, literal: &str) -> String {
        escape_literal(literal)
    }

    fn status(&self) -> ConnectionStatus;

    fn close(&mut self) -> Result<()>;
}

/// Quote an identifier: `my "table"` becomes `"my ""table"""`.
pub fn escape_identifier(identifier: &str) -> String {
    let mut out = String::with_capacity(identifier.len() + 2);
    out.push('"');
    for c in identifier.chars() {
        if c == '"' {
            out.push('"');
        }
        out.push(c);
    }
    out.push('"');
    out
}

/// Quote a string literal. Values containing a backslash get the `E''`
/// form with backslashes doubled, so the result is correct whatever
/// `standard_conforming_strings` is set to.
pub fn escape_literal(literal: &str) -> String {
    let has_backslash = literal.contains('\\');
    let mut out = String::with_capacity(literal.len() + 3);
    if has_backslash {
        out.push('E');
    }
    out.push('\'');
    for c in literal.chars() {
        match c {
            '\'' => out.push_str("''"),
            '\\' => out.push_str("\\\\"),
            _ => out.push(c),
        }
    }
    out.push('\'');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rows_affected() {
        assert_eq!(parse_rows_affected("INSERT 0 5"), 5);
        assert_eq!(parse_rows_affected("UPDATE 3"), 3);
        assert_eq!(parse_rows_affected("DELETE 2"), 2);
        assert_eq!(parse_rows_affected("SELECT 10"), 10);
        assert_eq!(parse_rows_affected("LISTEN"), 0);
    }

    #[test]
    fn test_escape_identifier_doubles_quotes() {
        assert_eq!(escape_identifier("pika"), "\"pika\"");
        assert_eq!(escape_identifier("my \"table\""), "\"my \"\"table\"\"\"");
    }

    #[test]
    fn test_escape_literal() {
        assert_eq!(escape_literal("it's"), "'it''s'");
        assert_eq!(escape_literal("a\\b"), "E'a\\\\b'");
    }

    #[test]
    fn test_result_set_builder() {
        let result = ResultSet::new(vec![Column::new("id", "int4"), Column::untyped("name")])
            .with_row([Some("1"), None])
            .with_tag("SELECT 1");
        assert_eq!(result.row_count(), 1);
        assert_eq!(result.field_position("name"), Some(1));
        assert_eq!(result.affected_rows(), 1);
        assert_eq!(result.rows[0][1], None);
    }
}
