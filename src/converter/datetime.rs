//! Date/time converters.
//!
//! Server output is expected in `datestyle=ISO` and
//! `intervalstyle=iso_8601`, the session defaults.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};

use crate::error::{FoundationError, Result};
use crate::pg::types::{Interval, PgValue};
use crate::session::Session;

use super::{non_blank, null_literal, unexpected_value, Converter};

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S%.f";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";
const TIMESTAMPTZ_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f%#z";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Temporal {
    Date,
    Time,
    Timestamp,
    TimestampTz,
}

impl Temporal {
    fn of(type_name: &str) -> Option<Self> {
        match type_name.strip_prefix("pg_catalog.").unwrap_or(type_name) {
            "date" => Some(Temporal::Date),
            "time" | "time without time zone" => Some(Temporal::Time),
            "timestamp" | "timestamp without time zone" => Some(Temporal::Timestamp),
            "timestamptz" | "timestamp with time zone" => Some(Temporal::TimestampTz),
            _ => None,
        }
    }

    fn parse(self, text: &str) -> Option<PgValue> {
        match self {
            Temporal::Date => NaiveDate::parse_from_str(text, DATE_FORMAT).ok().map(PgValue::Date),
            Temporal::Time => NaiveTime::parse_from_str(text, TIME_FORMAT).ok().map(PgValue::Time),
            Temporal::Timestamp => NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT)
                .ok()
                .map(PgValue::Timestamp),
            Temporal::TimestampTz => DateTime::parse_from_str(text, TIMESTAMPTZ_FORMAT)
                .ok()
                .map(PgValue::TimestampTz),
        }
    }
}

/// `date`, `time`, `timestamp` and `timestamptz`.
///
/// The concrete type picks the format. An unrecognised type name tries the
/// formats from the most to the least precise.
pub struct TimestampConverter;

impl Converter for TimestampConverter {
    fn decode(&self, data: Option<&str>, type_name: &str, _session: &Session) -> Result<PgValue> {
        let Some(raw) = non_blank(data) else {
            return Ok(PgValue::Null);
        };
        if raw.eq_ignore_ascii_case("infinity") || raw.eq_ignore_ascii_case("-infinity") {
            return Err(FoundationError::conversion(
                type_name,
                raw,
                "infinite date/time values are not supported",
            ));
        }
        // ISO 8601 `T` separator as well as the server's space.
        let text = match raw.as_bytes().get(10) {
            Some(b'T') => format!("{} {}", &raw[..10], &raw[11..]),
            _ => raw.to_string(),
        };

        let candidates: &[Temporal] = match Temporal::of(type_name) {
            Some(Temporal::Date) => &[Temporal::Date],
            Some(Temporal::Time) => &[Temporal::Time],
            Some(Temporal::Timestamp) => &[Temporal::Timestamp],
            Some(Temporal::TimestampTz) => &[Temporal::TimestampTz],
            None => &[
                Temporal::TimestampTz,
                Temporal::Timestamp,
                Temporal::Date,
                Temporal::Time,
            ],
        };
        candidates
            .iter()
            .find_map(|t| t.parse(&text))
            .ok_or_else(|| FoundationError::conversion(type_name, raw, "not a valid ISO date/time"))
    }

    fn encode(&self, value: &PgValue, type_name: &str, session: &Session) -> Result<String> {
        Ok(match self.encode_wire(value, type_name, session)? {
            Some(text) => format!("{} '{}'", type_name, text),
            None => null_literal(type_name),
        })
    }

    fn encode_wire(&self, value: &PgValue, type_name: &str, _session: &Session) -> Result<Option<String>> {
        match value {
            PgValue::Null
            | PgValue::Date(_)
            | PgValue::Time(_)
            | PgValue::Timestamp(_)
            | PgValue::TimestampTz(_) => value.to_plain_text(),
            other => Err(unexpected_value(type_name, other, "a date/time")),
        }
    }
}

/// `interval`, read and written in ISO 8601 with designators.
pub struct IntervalConverter;

impl IntervalConverter {
    fn interval(value: &PgValue, type_name: &str) -> Result<Option<Interval>> {
        match value {
            PgValue::Null => Ok(None),
            PgValue::Interval(i) => Ok(Some(*i)),
            other => Err(unexpected_value(type_name, other, "an interval")),
        }
    }
}

impl Converter for IntervalConverter {
    fn decode(&self, data: Option<&str>, type_name: &str, _session: &Session) -> Result<PgValue> {
        let Some(raw) = non_blank(data) else {
            return Ok(PgValue::Null);
        };
        Interval::parse_iso8601(raw)
            .map(PgValue::Interval)
            .ok_or_else(|| {
                FoundationError::conversion(
                    type_name,
                    raw,
                    format!("Data '{}' is not an ISO8601 interval representation.", raw),
                )
            })
    }

    fn encode(&self, value: &PgValue, type_name: &str, _session: &Session) -> Result<String> {
        Ok(match Self::interval(value, type_name)? {
            Some(i) => format!("{} '{}'", type_name, i),
            None => null_literal(type_name),
        })
    }

    fn encode_wire(&self, value: &PgValue, type_name: &str, _session: &Session) -> Result<Option<String>> {
        Ok(Self::interval(value, type_name)?.map(|i| i.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_session;

    fn tz(text: &str) -> PgValue {
        PgValue::TimestampTz(DateTime::parse_from_rfc3339(text).unwrap())
    }

    #[test]
    fn test_decode_by_type() {
        let session = test_session();
        let c = TimestampConverter;
        assert_eq!(
            c.decode(Some("2014-09-27 18:51:35.678406+00"), "timestamptz", &session).unwrap(),
            tz("2014-09-27T18:51:35.678406+00:00")
        );
        assert_eq!(
            c.decode(Some("2014-09-27 18:51:35+05:30"), "pg_catalog.timestamptz", &session).unwrap(),
            tz("2014-09-27T18:51:35+05:30")
        );
        assert_eq!(
            c.decode(Some("2014-09-27 18:51:35.678406"), "timestamp", &session).unwrap(),
            PgValue::Timestamp(
                NaiveDate::from_ymd_opt(2014, 9, 27)
                    .unwrap()
                    .and_hms_micro_opt(18, 51, 35, 678406)
                    .unwrap()
            )
        );
        assert_eq!(
            c.decode(Some("2014-09-27"), "date", &session).unwrap(),
            PgValue::Date(NaiveDate::from_ymd_opt(2014, 9, 27).unwrap())
        );
        assert_eq!(
            c.decode(Some("18:51:35"), "time", &session).unwrap(),
            PgValue::Time(NaiveTime::from_hms_opt(18, 51, 35).unwrap())
        );
        assert_eq!(c.decode(None, "date", &session).unwrap(), PgValue::Null);
    }

    #[test]
    fn test_decode_unknown_type_falls_back() {
        let session = test_session();
        let c = TimestampConverter;
        assert_eq!(
            c.decode(Some("2014-09-27T18:51:35+00"), "my_timestamp", &session).unwrap(),
            tz("2014-09-27T18:51:35+00:00")
        );
        assert_eq!(
            c.decode(Some("2014-09-27"), "my_date", &session).unwrap(),
            PgValue::Date(NaiveDate::from_ymd_opt(2014, 9, 27).unwrap())
        );
    }

    #[test]
    fn test_decode_errors() {
        let session = test_session();
        let c = TimestampConverter;
        assert!(c.decode(Some("infinity"), "timestamp", &session).is_err());
        assert!(c.decode(Some("2014-13-45"), "date", &session).is_err());
        assert!(c.decode(Some("2014-09-27"), "time", &session).is_err());
    }

    #[test]
    fn test_encode() {
        let session = test_session();
        let c = TimestampConverter;
        assert_eq!(
            c.encode(&tz("2014-09-27T18:51:35.678406+00:00"), "timestamptz", &session).unwrap(),
            "timestamptz '2014-09-27 18:51:35.678406+00:00'"
        );
        assert_eq!(
            c.encode(&PgValue::Date(NaiveDate::from_ymd_opt(2014, 9, 27).unwrap()), "date", &session).unwrap(),
            "date '2014-09-27'"
        );
        assert_eq!(c.encode(&PgValue::Null, "timestamp", &session).unwrap(), "NULL::timestamp");
        assert!(c.encode(&PgValue::Int(1), "timestamp", &session).is_err());
    }

    #[test]
    fn test_timestamp_round_trip() {
        let session = test_session();
        let c = TimestampConverter;
        let value = tz("1999-12-31T23:59:59.000001-08:00");
        let wire = c.encode_wire(&value, "timestamptz", &session).unwrap();
        assert_eq!(c.decode(wire.as_deref(), "timestamptz", &session).unwrap(), value);
    }

    #[test]
    fn test_interval() {
        let session = test_session();
        let c = IntervalConverter;
        let value = c.decode(Some("P14D"), "interval", &session).unwrap();
        assert_eq!(value, PgValue::Interval(Interval::new(0, 14, 0)));
        assert_eq!(c.encode(&value, "interval", &session).unwrap(), "interval 'P14D'");

        let value = c.decode(Some("P1Y2M3DT4H5M6.5S"), "interval", &session).unwrap();
        let wire = c.encode_wire(&value, "interval", &session).unwrap();
        assert_eq!(c.decode(wire.as_deref(), "interval", &session).unwrap(), value);

        let err = c.decode(Some("3 days"), "interval", &session).unwrap_err();
        assert!(err.to_string().contains("is not an ISO8601 interval representation"));
    }
}
