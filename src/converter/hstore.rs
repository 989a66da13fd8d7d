//! `hstore` converter.
//!
//! Text grammar: `"k"=>"v", "k2"=>NULL`. Keys and values are either double
//! quoted (with `\` escaping the next character) or bare tokens; a bare
//! `NULL` value is SQL NULL. Output always quotes keys and values.

use crate::error::{FoundationError, Result};
use crate::pg::types::PgValue;
use crate::session::Session;

use super::{null_literal, unexpected_value, Converter};

const DOLLAR_TAG: &str = "$hs$";

pub struct HstoreConverter;

impl HstoreConverter {
    fn pairs<'a>(value: &'a PgValue, type_name: &str) -> Result<Option<&'a [(String, Option<String>)]>> {
        match value {
            PgValue::Null => Ok(None),
            PgValue::Hstore(pairs) => Ok(Some(pairs)),
            other => Err(unexpected_value(type_name, other, "hstore pairs")),
        }
    }
}

impl Converter for HstoreConverter {
    fn decode(&self, data: Option<&str>, type_name: &str, _session: &Session) -> Result<PgValue> {
        let Some(raw) = data else {
            return Ok(PgValue::Null);
        };
        HstoreParser::new(raw)
            .parse()
            .map(PgValue::Hstore)
            .map_err(|reason| FoundationError::conversion(type_name, raw, reason))
    }

    fn encode(&self, value: &PgValue, type_name: &str, session: &Session) -> Result<String> {
        let Some(pairs) = Self::pairs(value, type_name)? else {
            return Ok(null_literal(type_name));
        };
        let text = format_pairs(pairs);
        if text.contains(DOLLAR_TAG) {
            let escaped = session.connection()?.escape_literal(&text);
            return Ok(format!("{}({})", type_name, escaped));
        }
        Ok(format!("{}({}{}{})", type_name, DOLLAR_TAG, text, DOLLAR_TAG))
    }

    fn encode_wire(&self, value: &PgValue, type_name: &str, _session: &Session) -> Result<Option<String>> {
        Ok(Self::pairs(value, type_name)?.map(format_pairs))
    }
}

fn format_pairs(pairs: &[(String, Option<String>)]) -> String {
    let mut out = String::new();
    for (i, (key, value)) in pairs.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        push_quoted(&mut out, key);
        out.push_str("=>");
        match value {
            Some(v) => push_quoted(&mut out, v),
            None => out.push_str("NULL"),
        }
    }
    out
}

fn push_quoted(out: &mut String, text: &str) {
    out.push('"');
    for c in text.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
}

// ============================================================================
// Tokenizer
// ============================================================================

struct Token {
    text: String,
    quoted: bool,
}

struct HstoreParser<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
}

impl<'a> HstoreParser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            chars: input.chars().peekable(),
        }
    }

    fn parse(mut self) -> std::result::Result<Vec<(String, Option<String>)>, String> {
        let mut pairs = Vec::new();
        loop {
            self.skip_whitespace();
            if self.chars.peek().is_none() {
                return Ok(pairs);
            }
            let key = self.token()?.text;
            self.skip_whitespace();
            self.expect_arrow()?;
            self.skip_whitespace();
            let value = self.token()?;
            let value = if !value.quoted && value.text.eq_ignore_ascii_case("NULL") {
                None
            } else {
                Some(value.text)
            };
            pairs.push((key, value));

            self.skip_whitespace();
            match self.chars.next() {
                None => return Ok(pairs),
                Some(',') => continue,
                Some(c) => return Err(format!("expected ',' between pairs, found '{}'", c)),
            }
        }
    }

    fn skip_whitespace(&mut self) {
        while self.chars.peek().is_some_and(|c| c.is_whitespace()) {
            self.chars.next();
        }
    }

    fn expect_arrow(&mut self) -> std::result::Result<(), String> {
        match (self.chars.next(), self.chars.next()) {
            (Some('='), Some('>')) => Ok(()),
            _ => Err("expected '=>' after key".to_string()),
        }
    }

    fn token(&mut self) -> std::result::Result<Token, String> {
        if self.chars.peek() == Some(&'"') {
            self.chars.next();
            let mut text = String::new();
            loop {
                match self.chars.next() {
                    Some('"') => return Ok(Token { text, quoted: true }),
                    Some('\\') => match self.chars.next() {
                        Some(c) => text.push(c),
                        None => return Err("unterminated escape".to_string()),
                    },
                    Some(c) => text.push(c),
                    None => return Err("unterminated quoted token".to_string()),
                }
            }
        }

        let mut text = String::new();
        while let Some(&c) = self.chars.peek() {
            if c.is_whitespace() || c == ',' || c == '=' || c == '"' {
                break;
            }
            self.chars.next();
            if c == '\\' {
                match self.chars.next() {
                    Some(next) => text.push(next),
                    None => return Err("unterminated escape".to_string()),
                }
            } else {
                text.push(c);
            }
        }
        if text.is_empty() {
            return Err("expected a key or value".to_string());
        }
        Ok(Token {
            text,
            quoted: false,
        })
    }
}
