//! Server-reported query failures.

use std::fmt;

/// A query the server rejected.
///
/// Carries the statement and its parameters next to the fields of the
/// server's ErrorResponse so the failing call can be reported as a whole.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlError {
    /// ERROR, FATAL, PANIC...
    pub severity: String,
    /// SQLSTATE code (e.g. "23505")
    pub code: String,
    pub message: String,
    pub detail: Option<String>,
    pub hint: Option<String>,
    /// The SQL that failed, when known
    pub sql: Option<String>,
    /// Parameters sent with the SQL, in wire form
    pub parameters: Vec<Option<String>>,
}

impl SqlError {
    pub fn new(
        severity: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity: severity.into(),
            code: code.into(),
            message: message.into(),
            detail: None,
            hint: None,
            sql: None,
            parameters: Vec::new(),
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Attach the statement that triggered the error.
    pub fn with_query(mut self, sql: impl Into<String>, parameters: &[Option<String>]) -> Self {
        self.sql = Some(sql.into());
        self.parameters = parameters.to_vec();
        self
    }

    /// Class of the SQLSTATE code (first two characters).
    pub fn class(&self) -> &str {
        self.code.get(..2).unwrap_or(&self.code)
    }

    pub fn is_unique_violation(&self) -> bool {
        self.code == "23505"
    }
}

impl fmt::Display for SqlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} ({})", self.severity, self.message, self.code)?;
        if let Some(d) = &self.detail {
            write!(f, "\nDetail: {}", d)?;
        }
        if let Some(h) = &self.hint {
            write!(f, "\nHint: {}", h)?;
        }
        if let Some(sql) = &self.sql {
            write!(f, "\nQuery: {}", sql)?;
            if !self.parameters.is_empty() {
                let params: Vec<&str> = self
                    .parameters
                    .iter()
                    .map(|p| p.as_deref().unwrap_or("NULL"))
                    .collect();
                write!(f, "\nParameters: [{}]", params.join(", "))?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for SqlError {}
