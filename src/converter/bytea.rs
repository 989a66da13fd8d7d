//! `bytea` converter.
//!
//! The session asks for `bytea_output = hex`, so the server sends `\x`
//! followed by hex digits. The older escape format (`\ooo` octal and `\\`)
//! is still accepted on input.

use crate::error::{FoundationError, Result};
use crate::pg::types::PgValue;
use crate::session::Session;

use super::{null_literal, unexpected_value, Converter};

pub struct ByteaConverter;

impl ByteaConverter {
    fn bytes<'a>(value: &'a PgValue, type_name: &str) -> Result<Option<&'a [u8]>> {
        match value {
            PgValue::Null => Ok(None),
            PgValue::Bytea(b) => Ok(Some(b)),
            PgValue::Text(s) => Ok(Some(s.as_bytes())),
            other => Err(unexpected_value(type_name, other, "bytes")),
        }
    }
}

impl Converter for ByteaConverter {
    fn decode(&self, data: Option<&str>, type_name: &str, _session: &Session) -> Result<PgValue> {
        let Some(raw) = data else {
            return Ok(PgValue::Null);
        };
        let bytes = match raw.strip_prefix("\\x") {
            Some(digits) => hex::decode(digits)
                .map_err(|e| FoundationError::conversion(type_name, raw, e.to_string()))?,
            None => decode_escape(raw)
                .ok_or_else(|| FoundationError::conversion(type_name, raw, "invalid bytea escape sequence"))?,
        };
        Ok(PgValue::Bytea(bytes))
    }

    fn encode(&self, value: &PgValue, type_name: &str, _session: &Session) -> Result<String> {
        Ok(match Self::bytes(value, type_name)? {
            Some(b) => format!("{} '\\x{}'", type_name, hex::encode(b)),
            None => null_literal(type_name),
        })
    }

    fn encode_wire(&self, value: &PgValue, type_name: &str, _session: &Session) -> Result<Option<String>> {
        Ok(Self::bytes(value, type_name)?.map(|b| format!("\\x{}", hex::encode(b))))
    }
}

/// Decode the escape output format: `\\` is a backslash, `\ooo` an octal
/// byte, anything else is taken as is.
fn decode_escape(input: &str) -> Option<Vec<u8>> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'\\' {
            out.push(bytes[i]);
            i += 1;
            continue;
        }
        match bytes.get(i + 1..i + 4) {
            Some(&[b'\\', ..]) => {
                out.push(b'\\');
                i += 2;
            }
            Some(octal) if octal.iter().all(|b| (b'0'..=b'7').contains(b)) => {
                let value = octal
                    .iter()
                    .fold(0u16, |acc, b| acc * 8 + u16::from(b - b'0'));
                out.push(u8::try_from(value).ok()?);
                i += 4;
            }
            _ if bytes.get(i + 1) == Some(&b'\\') => {
                out.push(b'\\');
                i += 2;
            }
            _ => return None,
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_session;

    #[test]
    fn test_decode_hex() {
        let session = test_session();
        let value = ByteaConverter.decode(Some("\\x001b5c27200d"), "bytea", &session).unwrap();
        assert_eq!(value, PgValue::Bytea(vec![0x00, 0x1b, 0x5c, 0x27, 0x20, 0x0d]));
        assert_eq!(ByteaConverter.decode(None, "bytea", &session).unwrap(), PgValue::Null);
        assert!(ByteaConverter.decode(Some("\\xzz"), "bytea", &session).is_err());
    }

    #[test]
    fn test_decode_escape_format() {
        let session = test_session();
        let value = ByteaConverter.decode(Some("a\\000\\\\b\\377"), "bytea", &session).unwrap();
        assert_eq!(value, PgValue::Bytea(vec![b'a', 0, b'\\', b'b', 0xff]));
        assert!(ByteaConverter.decode(Some("bad\\9"), "bytea", &session).is_err());
    }

    #[test]
    fn test_encode() {
        let session = test_session();
        let value = PgValue::Bytea(vec![0x00, 0x1b, 0x5c, 0x27, 0x20, 0x0d]);
        assert_eq!(ByteaConverter.encode(&value, "bytea", &session).unwrap(), "bytea '\\x001b5c27200d'");
        let wire = ByteaConverter.encode_wire(&value, "bytea", &session).unwrap();
        assert_eq!(wire.as_deref(), Some("\\x001b5c27200d"));
        assert_eq!(ByteaConverter.decode(wire.as_deref(), "bytea", &session).unwrap(), value);
    }
}
