//! Array converter.
//!
//! One converter handles every array type: the element type is read from
//! the array type name (`int4[]` or `_int4` both give `int4`) and each
//! element goes through the session's converter for it.
//!
//! Text grammar: `{a,b,NULL}`. Elements holding a delimiter, brace, quote,
//! backslash or whitespace are double quoted with `"` and `\` backslash
//! escaped. An unquoted `NULL` is a null element; `"NULL"` is the string.
//! Multi-dimensional arrays nest braces: `{{1,2},{3,4}}`.

use crate::error::{FoundationError, Result};
use crate::pg::types::PgValue;
use crate::session::Session;

use super::{null_literal, unexpected_value, Converter};

/// Element type of an array type: strips one trailing `[]` or a leading `_`.
pub fn sub_type(type_name: &str) -> &str {
    if let Some(sub) = type_name.strip_suffix("[]").filter(|s| !s.is_empty()) {
        sub
    } else if let Some(sub) = type_name.strip_prefix('_').filter(|s| !s.is_empty()) {
        sub
    } else {
        type_name
    }
}

/// Scalar type at the bottom of a (possibly multi-dimensional) array type.
fn element_type(type_name: &str) -> &str {
    let mut current = sub_type(type_name);
    while let Some(inner) = current.strip_suffix("[]").filter(|s| !s.is_empty()) {
        current = inner;
    }
    current
}

/// `box` is the one built-in type whose arrays are not comma separated.
fn delimiter_for(element_type: &str) -> char {
    match element_type {
        "box" | "pg_catalog.box" => ';',
        _ => ',',
    }
}

pub struct ArrayConverter;

impl ArrayConverter {
    fn decode_items(
        items: Vec<RawElement>,
        element_type: &str,
        session: &Session,
    ) -> Result<Vec<PgValue>> {
        let converter = session.converter(element_type)?;
        items
            .into_iter()
            .map(|item| match item {
                RawElement::Null => Ok(PgValue::Null),
                RawElement::Value(text) => converter.decode(Some(text.as_str()), Some(element_type), session),
                RawElement::Nested(inner) => {
                    Self::decode_items(inner, element_type, session).map(PgValue::Array)
                }
            })
            .collect()
    }

    fn encode_items(items: &[PgValue], element_type: &str, session: &Session) -> Result<String> {
        let converter = session.converter(element_type)?;
        let parts = items
            .iter()
            .map(|item| match item {
                PgValue::Null => Ok(null_literal(element_type)),
                PgValue::Array(inner) => Ok(format!(
                    "ARRAY[{}]",
                    Self::encode_items(inner, element_type, session)?
                )),
                other => converter.encode(other, Some(element_type), session),
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(parts.join(","))
    }

    fn encode_wire_items(items: &[PgValue], element_type: &str, session: &Session) -> Result<String> {
        let delimiter = delimiter_for(element_type);
        let converter = session.converter(element_type)?;
        let mut out = String::from("{");
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                out.push(delimiter);
            }
            match item {
                PgValue::Null => out.push_str("NULL"),
                PgValue::Array(inner) => {
                    out.push_str(&Self::encode_wire_items(inner, element_type, session)?)
                }
                other => match converter.encode_wire(other, Some(element_type), session)? {
                    None => out.push_str("NULL"),
                    Some(text) => push_element(&mut out, &text, delimiter),
                },
            }
        }
        out.push('}');
        Ok(out)
    }

    /// `::int4[]` for `int4[]` and `_int4` alike.
    fn cast(type_name: &str) -> String {
        if type_name.ends_with("[]") {
            type_name.to_string()
        } else {
            format!("{}[]", sub_type(type_name))
        }
    }
}

impl Converter for ArrayConverter {
    fn decode(&self, data: Option<&str>, type_name: &str, session: &Session) -> Result<PgValue> {
        let raw = match data.map(str::trim) {
            None | Some("NULL") => return Ok(PgValue::Null),
            Some(raw) => raw,
        };
        let element_type = element_type(type_name);
        let items = ArrayParser::new(raw, delimiter_for(element_type))
            .parse()
            .map_err(|reason| FoundationError::conversion(type_name, raw, reason))?;
        Self::decode_items(items, element_type, session).map(PgValue::Array)
    }

    fn encode(&self, value: &PgValue, type_name: &str, session: &Session) -> Result<String> {
        match value {
            PgValue::Null => Ok(null_literal(&Self::cast(type_name))),
            PgValue::Array(items) => Ok(format!(
                "ARRAY[{}]::{}",
                Self::encode_items(items, element_type(type_name), session)?,
                Self::cast(type_name)
            )),
            other => Err(unexpected_value(type_name, other, "an array")),
        }
    }

    fn encode_wire(&self, value: &PgValue, type_name: &str, session: &Session) -> Result<Option<String>> {
        match value {
            PgValue::Null => Ok(None),
            PgValue::Array(items) => {
                Self::encode_wire_items(items, element_type(type_name), session).map(Some)
            }
            other => Err(unexpected_value(type_name, other, "an array")),
        }
    }
}

/// Append one element, quoting it when the server would.
fn push_element(out: &mut String, text: &str, delimiter: char) {
    let needs_quotes = text.is_empty()
        || text.eq_ignore_ascii_case("NULL")
        || text
            .chars()
            .any(|c| matches!(c, '{' | '}' | '"' | '\\') || c == delimiter || c.is_whitespace());
    if !needs_quotes {
        out.push_str(text);
        return;
    }
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
// Parser
// ============================================================================

/// One element of an array literal before element conversion.
#[derive(Debug, PartialEq)]
enum RawElement {
    Null,
    Value(String),
    Nested(Vec<RawElement>),
}

struct ArrayParser<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    delimiter: char,
}

impl<'a> ArrayParser<'a> {
    fn new(input: &'a str, delimiter: char) -> Self {
        Self {
            chars: input.chars().peekable(),
            delimiter,
        }
    }

    fn parse(mut self) -> std::result::Result<Vec<RawElement>, String> {
        self.skip_dimensions()?;
        let items = self.parse_array()?;
        self.skip_whitespace();
        match self.chars.next() {
            None => Ok(items),
            Some(c) => Err(format!("unexpected '{}' after the closing brace", c)),
        }
    }

    /// Skip an optional `[1:3]=` lower-bound decoration.
    fn skip_dimensions(&mut self) -> std::result::Result<(), String> {
        if self.chars.peek() != Some(&'[') {
            return Ok(());
        }
        for c in self.chars.by_ref() {
            if c == '=' {
                return Ok(());
            }
        }
        Err("unterminated dimension decoration".to_string())
    }

    fn skip_whitespace(&mut self) {
        while self.chars.peek().is_some_and(|c| c.is_whitespace()) {
            self.chars.next();
        }
    }

    fn parse_array(&mut self) -> std::result::Result<Vec<RawElement>, String> {
        match self.chars.next() {
            Some('{') => {}
            _ => return Err("array must start with '{'".to_string()),
        }
        let mut items = Vec::new();
        self.skip_whitespace();
        if self.chars.peek() == Some(&'}') {
            self.chars.next();
            return Ok(items);
        }
        loop {
            self.skip_whitespace();
            let item = match self.chars.peek() {
                Some('{') => RawElement::Nested(self.parse_array()?),
                Some('"') => RawElement::Value(self.parse_quoted()?),
                Some(_) => self.parse_unquoted()?,
                None => return Err("unterminated array".to_string()),
            };
            items.push(item);
            self.skip_whitespace();
            match self.chars.next() {
                Some('}') => return Ok(items),
                Some(c) if c == self.delimiter => continue,
                Some(c) => return Err(format!("unexpected '{}' between elements", c)),
                None => return Err("unterminated array".to_string()),
            }
        }
    }

    fn parse_quoted(&mut self) -> std::result::Result<String, String> {
        self.chars.next();
        let mut value = String::new();
        loop {
            match self.chars.next() {
                Some('"') => return Ok(value),
                Some('\\') => match self.chars.next() {
                    Some(c) => value.push(c),
                    None => return Err("unterminated escape".to_string()),
                },
                Some(c) => value.push(c),
                None => return Err("unterminated quoted element".to_string()),
            }
        }
    }

    fn parse_unquoted(&mut self) -> std::result::Result<RawElement, String> {
        let mut value = String::new();
        let mut escaped = false;
        while let Some(&c) = self.chars.peek() {
            if c == self.delimiter || c == '}' {
                break;
            }
            if c == '{' || c == '"' {
                return Err(format!("unexpected '{}' in unquoted element", c));
            }
            self.chars.next();
            if c == '\\' {
                match self.chars.next() {
                    Some(next) => value.push(next),
                    None => return Err("unterminated escape".to_string()),
                }
                escaped = true;
            } else {
                value.push(c);
            }
        }
        let value = value.trim_end().to_string();
        if value.is_empty() {
            return Err("empty unquoted element".to_string());
        }
        if !escaped && value.eq_ignore_ascii_case("NULL") {
            return Ok(RawElement::Null);
        }
        Ok(RawElement::Value(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_session;

    fn ints(values: &[Option<i64>]) -> PgValue {
        PgValue::Array(values.iter().map(|v| v.map_or(PgValue::Null, PgValue::Int)).collect())
    }

    #[test]
    fn test_sub_type() {
        assert_eq!(sub_type("int4[]"), "int4");
        assert_eq!(sub_type("_int4"), "int4");
        assert_eq!(sub_type("int4"), "int4");
        assert_eq!(sub_type("int4[][]"), "int4[]");
        assert_eq!(element_type("int4[][]"), "int4");
    }

    #[test]
    fn test_parser_handles_quotes_and_nulls() {
        let items = ArrayParser::new(r#"{pika,"chu, rechu","NULL",NULL,"a\"b\\c",""}"#, ',')
            .parse()
            .unwrap();
        assert_eq!(
            items,
            vec![
                RawElement::Value("pika".into()),
                RawElement::Value("chu, rechu".into()),
                RawElement::Value("NULL".into()),
                RawElement::Null,
                RawElement::Value("a\"b\\c".into()),
                RawElement::Value(String::new()),
            ]
        );
    }

    #[test]
    fn test_parser_rejects_malformed() {
        for input in ["{1,2", "1,2}", "{1,,2}", "{1,2}x", "{\"a}"] {
            assert!(ArrayParser::new(input, ',').parse().is_err(), "accepted {}", input);
        }
    }

    #[test]
    fn test_decode_int_array() {
        let session = test_session();
        let value = ArrayConverter.decode(Some("{1,2,NULL,4}"), "int4[]", &session).unwrap();
        assert_eq!(value, ints(&[Some(1), Some(2), None, Some(4)]));
        assert_eq!(ArrayConverter.decode(Some("{}"), "_int4", &session).unwrap(), PgValue::Array(vec![]));
        assert_eq!(ArrayConverter.decode(Some("NULL"), "int4[]", &session).unwrap(), PgValue::Null);
        assert_eq!(ArrayConverter.decode(None, "int4[]", &session).unwrap(), PgValue::Null);
    }

    #[test]
    fn test_decode_reports_raw_text() {
        let session = test_session();
        let err = ArrayConverter.decode(Some("{1,pika}"), "int4[]", &session).unwrap_err();
        assert!(matches!(err, FoundationError::Conversion { .. }));
        let err = ArrayConverter.decode(Some("{1,2"), "int4[]", &session).unwrap_err();
        match err {
            FoundationError::Conversion { raw, type_name, .. } => {
                assert_eq!(raw, "{1,2");
                assert_eq!(type_name, "int4[]");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_encode_int_array() {
        let session = test_session();
        let value = ints(&[Some(1), Some(2), None, Some(4)]);
        assert_eq!(
            ArrayConverter.encode(&value, "int4[]", &session).unwrap(),
            "ARRAY[int4 '1',int4 '2',NULL::int4,int4 '4']::int4[]"
        );
        assert_eq!(ArrayConverter.encode(&PgValue::Null, "_int4", &session).unwrap(), "NULL::int4[]");
        assert_eq!(
            ArrayConverter.encode(&PgValue::Array(vec![]), "text[]", &session).unwrap(),
            "ARRAY[]::text[]"
        );
    }

    #[test]
    fn test_encode_wire() {
        let session = test_session();
        let value = PgValue::Array(vec![
            PgValue::from("pika"),
            PgValue::Null,
            PgValue::from(""),
            PgValue::from("chu, \"rechu\""),
            PgValue::from("null"),
        ]);
        assert_eq!(
            ArrayConverter.encode_wire(&value, "text[]", &session).unwrap().as_deref(),
            Some(r#"{pika,NULL,"","chu, \"rechu\"","null"}"#)
        );
        assert_eq!(
            ArrayConverter.encode_wire(&PgValue::Array(vec![]), "int4[]", &session).unwrap().as_deref(),
            Some("{}")
        );
    }

    #[test]
    fn test_round_trips() {
        let session = test_session();
        let cases = vec![
            ("int4[]", PgValue::Array(vec![])),
            ("int4[]", ints(&[None, None])),
            ("int4[]", ints(&[Some(-1), Some(0), Some(7)])),
            (
                "text[]",
                PgValue::Array(vec![
                    PgValue::from("NULL"),
                    PgValue::Null,
                    PgValue::from(" a{b}c\\ "),
                    PgValue::from(""),
                ]),
            ),
            (
                "int4[][]",
                PgValue::Array(vec![ints(&[Some(1), Some(2)]), ints(&[Some(3), None])]),
            ),
        ];
        for (type_name, value) in cases {
            let wire = ArrayConverter.encode_wire(&value, type_name, &session).unwrap();
            let back = ArrayConverter.decode(wire.as_deref(), type_name, &session).unwrap();
            assert_eq!(back, value, "round trip through {:?}", wire);
        }
    }

    #[test]
    fn test_box_arrays_use_semicolons() {
        let session = test_session();
        let value = ArrayConverter
            .decode(Some("{(1,1),(0,0);(3,3),(2,2)}"), "box[]", &session)
            .unwrap();
        assert_eq!(value.as_array().map(|a| a.len()), Some(2));
    }

    #[test]
    fn test_dimension_decoration_is_skipped() {
        let session = test_session();
        let value = ArrayConverter.decode(Some("[0:1]={5,6}"), "int4[]", &session).unwrap();
        assert_eq!(value, ints(&[Some(5), Some(6)]));
    }
}
