//! Positional parameter placeholders.
//!
//! Queries may use `$*` placeholders that are numbered at execution time,
//! optionally followed by a type hint: `select $*::int4, $*::varchar[]`.
//! Numbered placeholders (`$1::int4`) carry hints the same way.

use once_cell::sync::Lazy;
use regex::{Captures, NoExpand, Regex};

static UNORDERED: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$\*").expect("valid placeholder pattern"));

static ORDERED: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$\d+").expect("valid placeholder pattern"));

static HINTED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\$(\*|\d+)(?:::([\w\."]+(?:\[\])?))?"#).expect("valid hint pattern")
});

/// Number `$*` placeholders `$1`, `$2`... in order of appearance.
pub fn order_parameters(sql: &str) -> String {
    let mut count = 0;
    UNORDERED
        .replace_all(sql, |_: &Captures| {
            count += 1;
            format!("${}", count)
        })
        .into_owned()
}

/// Turn every `$n` placeholder back into `$*`.
pub fn unorder_parameters(sql: &str) -> String {
    ORDERED.replace_all(sql, NoExpand("$*")).into_owned()
}

/// Type hint of each parameter, by position. Unhinted parameters are `None`.
///
/// `$*` placeholders take the next position, `$n` placeholders position
/// `n`. The first hint seen for a position wins.
pub fn parameter_types(sql: &str) -> Vec<Option<String>> {
    let mut types: Vec<Option<String>> = Vec::new();
    let mut next = 0;
    for captures in HINTED.captures_iter(sql) {
        let position = match captures.get(1).map(|m| m.as_str()) {
            Some("*") | None => {
                next += 1;
                next
            }
            Some(n) => match n.parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => continue,
            },
        };
        if types.len() < position {
            types.resize(position, None);
        }
        let slot = &mut types[position - 1];
        if slot.is_none() {
            *slot = captures.get(2).map(|m| m.as_str().replace('"', ""));
        }
    }
    types
}
