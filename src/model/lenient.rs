//! Forgiving deserializers for persisted style and geometry values.
//!
//! Proposals round-trip through an API and a browser cache that both store
//! whatever the editor last typed. A `fontSize` may arrive as `16`, `"16"`,
//! `"16px"` or `"large"`. The first three parse; anything else becomes
//! absent so style resolution falls back to the element kind's default.

use std::str::FromStr;

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Parse a CSS-ish number: `12`, `12.5`, `" 12px "`. Non-finite results are rejected.
pub fn parse_css_number(s: &str) -> Option<f64> {
    let t = s.trim();
    let t = t.strip_suffix("px").unwrap_or(t).trim_end();
    t.parse::<f64>().ok().filter(|v| v.is_finite())
}

pub(crate) fn number_from_value(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()),
        Value::String(s) => parse_css_number(s),
        _ => None,
    }
}

pub(crate) fn bool_from_value(v: &Value) -> Option<bool> {
    match v {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0),
        Value::String(s) => match s.trim() {
            "true" | "1" => Some(true),
            "false" | "0" | "" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

pub(crate) fn string_from_value(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub(crate) fn opt_f64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    let v = Option::<Value>::deserialize(d)?;
    Ok(v.as_ref().and_then(number_from_value))
}

pub(crate) fn f64_or_zero<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    Ok(opt_f64(d)?.unwrap_or(0.0))
}

pub(crate) fn usize_or_zero<'de, D: Deserializer<'de>>(d: D) -> Result<usize, D::Error> {
    Ok(opt_f64(d)?
        .filter(|v| *v >= 0.0)
        .map(|v| v.round() as usize)
        .unwrap_or(0))
}

pub(crate) fn opt_bool<'de, D: Deserializer<'de>>(d: D) -> Result<Option<bool>, D::Error> {
    let v = Option::<Value>::deserialize(d)?;
    Ok(v.as_ref().and_then(bool_from_value))
}

pub(crate) fn bool_or_false<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
    Ok(opt_bool(d)?.unwrap_or(false))
}

pub(crate) fn opt_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    let v = Option::<Value>::deserialize(d)?;
    Ok(v.as_ref().and_then(string_from_value))
}

/// Any string-valued enum with a `FromStr`; unknown spellings become absent.
pub(crate) fn opt_parse<'de, D, T>(d: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
{
    let v = Option::<Value>::deserialize(d)?;
    Ok(v.as_ref()
        .and_then(Value::as_str)
        .and_then(|s| s.trim().parse().ok()))
}

/// Ids arrive as strings from the API and occasionally as numbers from
/// older rows.
pub(crate) fn id_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    let v = Option::<Value>::deserialize(d)?;
    Ok(match v {
        Some(Value::String(s)) => s,
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    })
}
