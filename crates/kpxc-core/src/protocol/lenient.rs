// ============================================
// File: crates/kpxc-core/src/protocol/lenient.rs
// ============================================
//! Tolerant field decoders.
//!
//! KeePassXC and the browser extensions disagree on JSON types for a few
//! fields (`success` is `"true"` or `true`, `errorCode` is `"1"` or `1`,
//! counts and lists may be `null`). These helpers accept every variant seen
//! in the wild and normalize it.

use serde::de::{self, Deserialize, Deserializer};
use serde_json::Value;

/// String, bool or number, normalized to a string. `null` becomes `None`.
pub fn string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Bool(b)) => Ok(Some(b.to_string())),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(de::Error::custom(format!(
            "expected string, bool or number, got {other}"
        ))),
    }
}

/// Bool or `"true"`/`"false"` string.
pub fn boolean<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(b)),
        Some(Value::String(s)) => Ok(Some(s.eq_ignore_ascii_case("true"))),
        Some(Value::Number(n)) => Ok(Some(n.as_i64().unwrap_or(0) != 0)),
        Some(other) => Err(de::Error::custom(format!("expected bool, got {other}"))),
    }
}

/// Non-negative count given as number or numeric string.
pub fn count<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_u64()
            .map(Some)
            .ok_or_else(|| de::Error::custom(format!("invalid count {n}"))),
        Some(Value::String(s)) if s.is_empty() => Ok(None),
        Some(Value::String(s)) => s
            .parse()
            .map(Some)
            .map_err(|_| de::Error::custom(format!("invalid count {s:?}"))),
        Some(other) => Err(de::Error::custom(format!("expected count, got {other}"))),
    }
}

/// Treats an explicit `null` like a missing field.
pub fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}
