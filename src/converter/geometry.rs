//! Geometric converters: `point`, `circle` and `box`.
//!
//! Values are fixed-arity tuples of numbers. Numbers are matched with a
//! locale-independent pattern and written back with the syntax the server
//! expects: `(x,y)`, `<(x,y),r>` and `(x1,y1),(x2,y2)`. `NaN` and
//! `Infinity` coordinates are read, and written as a quoted literal since
//! `point(x,y)` only takes finite numbers.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{FoundationError, Result};
use crate::pg::types::{format_float, Circle, PgBox, PgValue, Point};
use crate::session::Session;

use super::{non_blank, null_literal, typed_literal, unexpected_value, Converter};

const NUMBER: &str = r"([-+]?(?:\d+(?:\.\d*)?|\.\d+)(?:[eE][-+]?\d+)?|[-+]?Infinity|NaN)";

static POINT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"^\(\s*{n}\s*,\s*{n}\s*\)$", n = NUMBER)).expect("valid point pattern")
});

static CIRCLE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"^<\s*\(\s*{n}\s*,\s*{n}\s*\)\s*,\s*{n}\s*>$",
        n = NUMBER
    ))
    .expect("valid circle pattern")
});

static BOX_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"^\(\s*{n}\s*,\s*{n}\s*\)\s*,\s*\(\s*{n}\s*,\s*{n}\s*\)$",
        n = NUMBER
    ))
    .expect("valid box pattern")
});

/// Numbers captured by `re`, or a conversion error naming the shape.
fn numbers<const N: usize>(re: &Regex, raw: &str, type_name: &str, shape: &str) -> Result<[f64; N]> {
    let captures = re.captures(raw).ok_or_else(|| {
        FoundationError::conversion(type_name, raw, format!("expected {}", shape))
    })?;
    let mut out = [0.0; N];
    for (i, slot) in out.iter_mut().enumerate() {
        let text = captures.get(i + 1).map_or("", |m| m.as_str());
        *slot = text
            .parse()
            .map_err(|e: std::num::ParseFloatError| FoundationError::conversion(type_name, raw, e.to_string()))?;
    }
    Ok(out)
}

fn point_call(p: &Point) -> String {
    format!("point({},{})", format_float(p.x), format_float(p.y))
}

/// `call` when every coordinate is finite, `type 'wire'` otherwise.
fn geometric_literal(
    type_name: &str,
    coordinates: &[f64],
    call: impl FnOnce() -> String,
    wire: impl std::fmt::Display,
    session: &Session,
) -> Result<String> {
    if coordinates.iter().all(|c| c.is_finite()) {
        Ok(call())
    } else {
        typed_literal(type_name, &wire.to_string(), session)
    }
}

// ============================================================================
// Point
// ============================================================================

pub struct PointConverter;

impl Converter for PointConverter {
    fn decode(&self, data: Option<&str>, type_name: &str, _session: &Session) -> Result<PgValue> {
        let Some(raw) = non_blank(data) else {
            return Ok(PgValue::Null);
        };
        let [x, y] = numbers::<2>(&POINT_RE, raw, type_name, "(x,y)")?;
        Ok(PgValue::Point(Point::new(x, y)))
    }

    fn encode(&self, value: &PgValue, type_name: &str, session: &Session) -> Result<String> {
        match value {
            PgValue::Null => Ok(null_literal(type_name)),
            PgValue::Point(p) => geometric_literal(type_name, &[p.x, p.y], || point_call(p), p, session),
            other => Err(unexpected_value(type_name, other, "a point")),
        }
    }

    fn encode_wire(&self, value: &PgValue, type_name: &str, _session: &Session) -> Result<Option<String>> {
        match value {
            PgValue::Null => Ok(None),
            PgValue::Point(p) => Ok(Some(p.to_string())),
            other => Err(unexpected_value(type_name, other, "a point")),
        }
    }
}

// ============================================================================
// Circle
// ============================================================================

pub struct CircleConverter;

impl Converter for CircleConverter {
    fn decode(&self, data: Option<&str>, type_name: &str, _session: &Session) -> Result<PgValue> {
        let Some(raw) = non_blank(data) else {
            return Ok(PgValue::Null);
        };
        let [x, y, r] = numbers::<3>(&CIRCLE_RE, raw, type_name, "<(x,y),r>")?;
        Ok(PgValue::Circle(Circle::new(Point::new(x, y), r)))
    }

    fn encode(&self, value: &PgValue, type_name: &str, session: &Session) -> Result<String> {
        match value {
            PgValue::Null => Ok(null_literal(type_name)),
            PgValue::Circle(c) => geometric_literal(
                type_name,
                &[c.center.x, c.center.y, c.radius],
                || format!("circle({},{})", point_call(&c.center), format_float(c.radius)),
                c,
                session,
            ),
            other => Err(unexpected_value(type_name, other, "a circle")),
        }
    }

    fn encode_wire(&self, value: &PgValue, type_name: &str, _session: &Session) -> Result<Option<String>> {
        match value {
            PgValue::Null => Ok(None),
            PgValue::Circle(c) => Ok(Some(c.to_string())),
            other => Err(unexpected_value(type_name, other, "a circle")),
        }
    }
}

// ============================================================================
// Box
// ============================================================================

pub struct BoxConverter;

impl Converter for BoxConverter {
    fn decode(&self, data: Option<&str>, type_name: &str, _session: &Session) -> Result<PgValue> {
        let Some(raw) = non_blank(data) else {
            return Ok(PgValue::Null);
        };
        let [x1, y1, x2, y2] = numbers::<4>(&BOX_RE, raw, type_name, "(x1,y1),(x2,y2)")?;
        Ok(PgValue::Box(PgBox::new(Point::new(x1, y1), Point::new(x2, y2))))
    }

    fn encode(&self, value: &PgValue, type_name: &str, session: &Session) -> Result<String> {
        match value {
            PgValue::Null => Ok(null_literal(type_name)),
            PgValue::Box(b) => geometric_literal(
                type_name,
                &[b.top_right.x, b.top_right.y, b.bottom_left.x, b.bottom_left.y],
                || format!("box({},{})", point_call(&b.top_right), point_call(&b.bottom_left)),
                b,
                session,
            ),
            other => Err(unexpected_value(type_name, other, "a box")),
        }
    }

    fn encode_wire(&self, value: &PgValue, type_name: &str, _session: &Session) -> Result<Option<String>> {
        match value {
            PgValue::Null => Ok(None),
            PgValue::Box(b) => Ok(Some(b.to_string())),
            other => Err(unexpected_value(type_name, other, "a box")),
        }
    }
}
