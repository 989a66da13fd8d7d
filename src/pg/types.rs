//! PostgreSQL values as seen by the converters.
//!
//! This module provides:
//! - `PgValue`: the host-side representation every converter decodes into
//! - Geometric value types (`Point`, `Circle`, `PgBox`)
//! - `Range` and `RangeBound`, keeping `empty` distinct from unbounded
//! - `Interval` with ISO 8601 parsing and formatting

use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::{FoundationError, Result};

// ============================================================================
// PostgreSQL Values
// ============================================================================

/// A decoded PostgreSQL value.
#[derive(Debug, Clone, PartialEq)]
pub enum PgValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytea(Vec<u8>),
    Uuid(Uuid),
    Json(JsonValue),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<FixedOffset>),
    Interval(Interval),
    Point(Point),
    Circle(Circle),
    Box(PgBox),
    Range(Box<Range>),
    /// Elements may themselves be arrays (multi-dimensional) or nulls.
    Array(Vec<PgValue>),
    /// Ordered field name to value mapping.
    Composite(Vec<(String, PgValue)>),
    /// Key/value pairs in server order; `None` is an SQL NULL value.
    Hstore(Vec<(String, Option<String>)>),
    /// Label of a backed enumeration.
    Enum(String),
}

impl PgValue {
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, PgValue::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PgValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PgValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PgValue::Float(f) => Some(*f),
            PgValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PgValue::Text(s) | PgValue::Enum(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[PgValue]> {
        match self {
            PgValue::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Field of a composite value by name.
    pub fn field(&self, name: &str) -> Option<&PgValue> {
        match self {
            PgValue::Composite(fields) => fields.iter().find(|(n, _)| n == name).map(|(_, v)| v),
            _ => None,
        }
    }

    /// Short variant name used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            PgValue::Null => "null",
            PgValue::Bool(_) => "bool",
            PgValue::Int(_) => "int",
            PgValue::Float(_) => "float",
            PgValue::Text(_) => "text",
            PgValue::Bytea(_) => "bytea",
            PgValue::Uuid(_) => "uuid",
            PgValue::Json(_) => "json",
            PgValue::Date(_) => "date",
            PgValue::Time(_) => "time",
            PgValue::Timestamp(_) => "timestamp",
            PgValue::TimestampTz(_) => "timestamptz",
            PgValue::Interval(_) => "interval",
            PgValue::Point(_) => "point",
            PgValue::Circle(_) => "circle",
            PgValue::Box(_) => "box",
            PgValue::Range(_) => "range",
            PgValue::Array(_) => "array",
            PgValue::Composite(_) => "composite",
            PgValue::Hstore(_) => "hstore",
            PgValue::Enum(_) => "enum",
        }
    }

    /// Text form of a scalar value for parameters sent without a type hint.
    ///
    /// Containers have no unambiguous text form without knowing their type
    /// and are rejected.
    pub fn to_plain_text(&self) -> Result<Option<String>> {
        let text = match self {
            PgValue::Null => return Ok(None),
            PgValue::Bool(b) => (if *b { "t" } else { "f" }).to_string(),
            PgValue::Int(i) => i.to_string(),
            PgValue::Float(f) => format_float(*f),
            PgValue::Text(s) | PgValue::Enum(s) => s.clone(),
            PgValue::Bytea(b) => format!("\\x{}", hex::encode(b)),
            PgValue::Uuid(u) => u.to_string(),
            PgValue::Json(j) => j.to_string(),
            PgValue::Date(d) => d.format("%Y-%m-%d").to_string(),
            PgValue::Time(t) => t.format("%H:%M:%S%.6f").to_string(),
            PgValue::Timestamp(ts) => ts.format("%Y-%m-%d %H:%M:%S%.6f").to_string(),
            PgValue::TimestampTz(ts) => ts.format("%Y-%m-%d %H:%M:%S%.6f%:z").to_string(),
            PgValue::Interval(i) => i.to_string(),
            PgValue::Point(p) => p.to_string(),
            PgValue::Circle(c) => c.to_string(),
            PgValue::Box(b) => b.to_string(),
            other => {
                return Err(FoundationError::conversion(
                    other.kind_name(),
                    format!("{:?}", other),
                    "parameter has no type hint and no plain text form",
                ))
            }
        };
        Ok(Some(text))
    }

    /// JSON rendering used when a non-JSON value is sent to a json column.
    pub fn to_json(&self) -> JsonValue {
        match self {
            PgValue::Null => JsonValue::Null,
            PgValue::Bool(b) => JsonValue::Bool(*b),
            PgValue::Int(i) => JsonValue::from(*i),
            PgValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            PgValue::Json(j) => j.clone(),
            PgValue::Array(items) => JsonValue::Array(items.iter().map(PgValue::to_json).collect()),
            PgValue::Composite(fields) => JsonValue::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            PgValue::Hstore(pairs) => JsonValue::Object(
                pairs
                    .iter()
                    .map(|(k, v)| {
                        let v = v.clone().map(JsonValue::String).unwrap_or(JsonValue::Null);
                        (k.clone(), v)
                    })
                    .collect(),
            ),
            other => match other.to_plain_text() {
                Ok(Some(text)) => JsonValue::String(text),
                _ => JsonValue::Null,
            },
        }
    }
}

/// Float text form PostgreSQL reads back to the same value.
pub fn format_float(f: f64) -> String {
    if f.is_nan() {
        "NaN".to_string()
    } else if f.is_infinite() {
        if f > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else {
        f.to_string()
    }
}

impl From<bool> for PgValue {
    fn from(v: bool) -> Self {
        PgValue::Bool(v)
    }
}

impl From<i32> for PgValue {
    fn from(v: i32) -> Self {
        PgValue::Int(v as i64)
    }
}

impl From<i64> for PgValue {
    fn from(v: i64) -> Self {
        PgValue::Int(v)
    }
}

impl From<f64> for PgValue {
    fn from(v: f64) -> Self {
        PgValue::Float(v)
    }
}

impl From<&str> for PgValue {
    fn from(v: &str) -> Self {
        PgValue::Text(v.to_string())
    }
}

impl From<String> for PgValue {
    fn from(v: String) -> Self {
        PgValue::Text(v)
    }
}

impl From<Vec<u8>> for PgValue {
    fn from(v: Vec<u8>) -> Self {
        PgValue::Bytea(v)
    }
}

impl From<Uuid> for PgValue {
    fn from(v: Uuid) -> Self {
        PgValue::Uuid(v)
    }
}

impl From<JsonValue> for PgValue {
    fn from(v: JsonValue) -> Self {
        PgValue::Json(v)
    }
}

impl From<Point> for PgValue {
    fn from(v: Point) -> Self {
        PgValue::Point(v)
    }
}

impl From<Range> for PgValue {
    fn from(v: Range) -> Self {
        PgValue::Range(Box::new(v))
    }
}

impl From<Interval> for PgValue {
    fn from(v: Interval) -> Self {
        PgValue::Interval(v)
    }
}

impl<T: Into<PgValue>> From<Option<T>> for PgValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(PgValue::Null)
    }
}

impl From<Vec<PgValue>> for PgValue {
    fn from(v: Vec<PgValue>) -> Self {
        PgValue::Array(v)
    }
}

// ============================================================================
// Geometric Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", format_float(self.x), format_float(self.y))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Circle {
    pub center: Point,
    pub radius: f64,
}

impl Circle {
    pub fn new(center: Point, radius: f64) -> Self {
        Self { center, radius }
    }
}

impl fmt::Display for Circle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{},{}>", self.center, format_float(self.radius))
    }
}

/// A box given by two opposite corners, in the order the server wrote them
/// (upper right first once PostgreSQL has normalized it).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PgBox {
    pub top_right: Point,
    pub bottom_left: Point,
}

impl PgBox {
    pub fn new(top_right: Point, bottom_left: Point) -> Self {
        Self {
            top_right,
            bottom_left,
        }
    }
}

impl fmt::Display for PgBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.top_right, self.bottom_left)
    }
}

// ============================================================================
// Ranges
// ============================================================================

/// One end of a range.
#[derive(Debug, Clone, PartialEq)]
pub enum RangeBound {
    /// Blank endpoint, e.g. the upper end of `[1,)`.
    Unbounded,
    NegInfinity,
    Infinity,
    Value(PgValue),
}

impl RangeBound {
    pub fn value(&self) -> Option<&PgValue> {
        match self {
            RangeBound::Value(v) => Some(v),
            _ => None,
        }
    }
}

impl From<PgValue> for RangeBound {
    fn from(v: PgValue) -> Self {
        RangeBound::Value(v)
    }
}

impl From<i32> for RangeBound {
    fn from(v: i32) -> Self {
        RangeBound::Value(PgValue::Int(v as i64))
    }
}

impl From<i64> for RangeBound {
    fn from(v: i64) -> Self {
        RangeBound::Value(PgValue::Int(v))
    }
}

impl From<f64> for RangeBound {
    fn from(v: f64) -> Self {
        RangeBound::Value(PgValue::Float(v))
    }
}

/// A range value. `Empty` is the reserved `empty` literal, which is not the
/// same thing as a range whose bounds are both blank (`(,)`).
#[derive(Debug, Clone, PartialEq)]
pub enum Range {
    Empty,
    Bounds {
        lower: RangeBound,
        upper: RangeBound,
        lower_inclusive: bool,
        upper_inclusive: bool,
    },
}

impl Range {
    /// Range with the usual `[lower,upper)` canonical bracket shape.
    pub fn closed_open(lower: impl Into<RangeBound>, upper: impl Into<RangeBound>) -> Self {
        Self::new(lower, upper, true, false)
    }

    pub fn new(
        lower: impl Into<RangeBound>,
        upper: impl Into<RangeBound>,
        lower_inclusive: bool,
        upper_inclusive: bool,
    ) -> Self {
        Range::Bounds {
            lower: lower.into(),
            upper: upper.into(),
            lower_inclusive,
            upper_inclusive,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Range::Empty)
    }
}

// ============================================================================
// Interval
// ============================================================================

/// A PostgreSQL interval, kept in the three fields the server stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Interval {
    pub months: i32,
    pub days: i32,
    pub microseconds: i64,
}

const MICROS_PER_SECOND: i64 = 1_000_000;
const MICROS_PER_MINUTE: i64 = 60 * MICROS_PER_SECOND;
const MICROS_PER_HOUR: i64 = 60 * MICROS_PER_MINUTE;

impl Interval {
    pub fn new(months: i32, days: i32, microseconds: i64) -> Self {
        Self {
            months,
            days,
            microseconds,
        }
    }

    /// Parse the ISO 8601 "format with designators" the server emits when
    /// `intervalstyle` is `iso_8601`, e.g. `P1Y2M3DT4H5M6.5S` or `P-11D`.
    pub fn parse_iso8601(input: &str) -> Option<Self> {
        let rest = input.trim().strip_prefix('P')?;
        if rest.is_empty() {
            return None;
        }
        let (date_part, time_part) = match rest.find('T') {
            Some(pos) => (&rest[..pos], Some(&rest[pos + 1..])),
            None => (rest, None),
        };

        let mut interval = Interval::default();
        for (number, unit) in designators(date_part)? {
            let n: i64 = number.parse().ok()?;
            match unit {
                'Y' => interval.months = interval.months.checked_add(i32::try_from(n.checked_mul(12)?).ok()?)?,
                'M' => interval.months = interval.months.checked_add(i32::try_from(n).ok()?)?,
                'W' => interval.days = interval.days.checked_add(i32::try_from(n.checked_mul(7)?).ok()?)?,
                'D' => interval.days = interval.days.checked_add(i32::try_from(n).ok()?)?,
                _ => return None,
            }
        }

        if let Some(time_part) = time_part {
            let parts = designators(time_part)?;
            if parts.is_empty() {
                return None;
            }
            for (number, unit) in parts {
                let micros = match unit {
                    'H' => number.parse::<i64>().ok()?.checked_mul(MICROS_PER_HOUR)?,
                    'M' => number.parse::<i64>().ok()?.checked_mul(MICROS_PER_MINUTE)?,
                    'S' => parse_seconds(number)?,
                    _ => return None,
                };
                interval.microseconds = interval.microseconds.checked_add(micros)?;
            }
        }
        Some(interval)
    }
}

/// Split `1Y-2M3D` into `[("1",'Y'), ("-2",'M'), ("3",'D')]`.
fn designators(input: &str) -> Option<Vec<(&str, char)>> {
    let mut out = Vec::new();
    let mut start = 0;
    for (i, c) in input.char_indices() {
        if c.is_ascii_alphabetic() {
            let number = &input[start..i];
            if number.is_empty() || number == "-" || number == "+" {
                return None;
            }
            out.push((number, c));
            start = i + 1;
        } else if !(c.is_ascii_digit() || c == '-' || c == '+' || c == '.') {
            return None;
        }
    }
    if start != input.len() {
        return None;
    }
    Some(out)
}

/// Seconds with an optional fraction, as microseconds.
fn parse_seconds(number: &str) -> Option<i64> {
    let (negative, digits) = match number.strip_prefix('-') {
        Some(d) => (true, d),
        None => (false, number.strip_prefix('+').unwrap_or(number)),
    };
    let (whole, frac) = match digits.find('.') {
        Some(pos) => (&digits[..pos], &digits[pos + 1..]),
        None => (digits, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return None;
    }
    let whole: i64 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let mut frac_micros: i64 = 0;
    for (i, c) in frac.chars().take(6).enumerate() {
        let d = c.to_digit(10)? as i64;
        frac_micros += d * 10_i64.pow(5 - i as u32);
    }
    if !frac.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let micros = whole.checked_mul(MICROS_PER_SECOND)?.checked_add(frac_micros)?;
    Some(if negative { -micros } else { micros })
}

impl fmt::Display for Interval {
    /// ISO 8601 with designators, the format `parse_iso8601` reads.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.months == 0 && self.days == 0 && self.microseconds == 0 {
            return f.write_str("PT0S");
        }
        f.write_str("P")?;
        let years = self.months / 12;
        let months = self.months % 12;
        if years != 0 {
            write!(f, "{}Y", years)?;
        }
        if months != 0 {
            write!(f, "{}M", months)?;
        }
        if self.days != 0 {
            write!(f, "{}D", self.days)?;
        }
        if self.microseconds != 0 {
            f.write_str("T")?;
            let hours = self.microseconds / MICROS_PER_HOUR;
            let rem = self.microseconds % MICROS_PER_HOUR;
            let minutes = rem / MICROS_PER_MINUTE;
            let seconds = rem % MICROS_PER_MINUTE;
            if hours != 0 {
                write!(f, "{}H", hours)?;
            }
            if minutes != 0 {
                write!(f, "{}M", minutes)?;
            }
            if seconds != 0 {
                let sign = if seconds < 0 { "-" } else { "" };
                let seconds = seconds.abs();
                let whole = seconds / MICROS_PER_SECOND;
                let frac = seconds % MICROS_PER_SECOND;
                if frac == 0 {
                    write!(f, "{}{}S", sign, whole)?;
                } else {
                    let frac = format!("{:06}", frac);
                    write!(f, "{}{}.{}S", sign, whole, frac.trim_end_matches('0'))?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_parse_days_and_time() {
        let interval = Interval::parse_iso8601("P14346DT22H47M3.138892S").unwrap();
        assert_eq!(interval.months, 0);
        assert_eq!(interval.days, 14346);
        assert_eq!(
            interval.microseconds,
            22 * MICROS_PER_HOUR + 47 * MICROS_PER_MINUTE + 3_138_892
        );
    }

    #[test]
    fn test_interval_parse_negative_components() {
        let interval = Interval::parse_iso8601("P-1Y-2M3DT-4H").unwrap();
        assert_eq!(interval.months, -14);
        assert_eq!(interval.days, 3);
        assert_eq!(interval.microseconds, -4 * MICROS_PER_HOUR);
        assert_eq!(Interval::parse_iso8601("P-11D").unwrap().days, -11);
    }

    #[test]
    fn test_interval_rejects_garbage() {
        assert!(Interval::parse_iso8601("1 day").is_none());
        assert!(Interval::parse_iso8601("P").is_none());
        assert!(Interval::parse_iso8601("PT").is_none());
        assert!(Interval::parse_iso8601("P1X").is_none());
        assert!(Interval::parse_iso8601("PYD").is_none());
    }

    #[test]
    fn test_interval_display_reads_back() {
        for text in ["P1Y2M3DT4H5M6.5S", "PT0S", "P-1Y-2MT-0.25S", "P14346DT22H47M3.138892S"] {
            let interval = Interval::parse_iso8601(text).unwrap();
            assert_eq!(interval.to_string(), text);
        }
    }

    #[test]
    fn test_plain_text_rejects_containers() {
        assert_eq!(PgValue::Int(-5).to_plain_text().unwrap(), Some("-5".to_string()));
        assert_eq!(PgValue::Null.to_plain_text().unwrap(), None);
        assert!(PgValue::Array(vec![]).to_plain_text().is_err());
    }

    #[test]
    fn test_geometry_display() {
        let circle = Circle::new(Point::new(1.2345, -9.87654), 3.141596);
        assert_eq!(circle.to_string(), "<(1.2345,-9.87654),3.141596>");
        let b = PgBox::new(Point::new(2.0, 3.0), Point::new(0.5, -1.0));
        assert_eq!(b.to_string(), "(2,3),(0.5,-1)");
    }

    #[test]
    fn test_composite_field_lookup() {
        let value = PgValue::Composite(vec![("a".into(), PgValue::Int(3))]);
        assert_eq!(value.field("a"), Some(&PgValue::Int(3)));
        assert_eq!(value.field("b"), None);
    }
}
