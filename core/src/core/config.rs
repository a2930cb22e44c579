//! Integer-literal parsing for configuration values.
//!
//! Config documents may give integer fields as JSON numbers or as strings
//! in `"0x…"`, `"0o…"`, `"0b…"` or decimal form. Device configs use the
//! serde helpers here so every address, size and vector field accepts all
//! of them.

use serde::Deserialize;
use serde::de::{self, Deserializer, Unexpected};
use serde_json::Value;

use crate::core::error::ConfigError;

/// Parse an integer literal with an optional radix prefix.
pub fn parse_int(text: &str) -> Result<u64, ConfigError> {
    let text = text.trim();
    let parsed = if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16)
    } else if let Some(oct) = text.strip_prefix("0o").or_else(|| text.strip_prefix("0O")) {
        u64::from_str_radix(oct, 8)
    } else if let Some(bin) = text.strip_prefix("0b").or_else(|| text.strip_prefix("0B")) {
        u64::from_str_radix(bin, 2)
    } else {
        text.parse()
    };
    parsed.map_err(|_| ConfigError::BadInt(text.to_string()))
}

fn value_to_u64<E: de::Error>(value: &Value) -> Result<u64, E> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| E::invalid_value(Unexpected::Other("number"), &"unsigned integer")),
        Value::String(s) => parse_int(s)
            .map_err(|_| E::invalid_value(Unexpected::Str(s), &"integer literal")),
        other => Err(E::invalid_type(
            Unexpected::Other(&format!("{other}")),
            &"integer or integer string",
        )),
    }
}

/// Deserialize a `u16` from a number or prefixed string literal.
pub fn de_u16<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u16, D::Error> {
    let value = Value::deserialize(deserializer)?;
    let n = value_to_u64::<D::Error>(&value)?;
    u16::try_from(n).map_err(|_| {
        de::Error::invalid_value(Unexpected::Unsigned(n), &"value in 0..=0xFFFF")
    })
}

/// Deserialize an optional `u16` (same literal forms as [`de_u16`]).
pub fn de_opt_u16<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u16>, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(v) => {
            let n = value_to_u64::<D::Error>(&v)?;
            u16::try_from(n)
                .map(Some)
                .map_err(|_| de::Error::invalid_value(Unexpected::Unsigned(n), &"value in 0..=0xFFFF"))
        }
    }
}

/// Deserialize a `usize` from a number or prefixed string literal.
pub fn de_usize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<usize, D::Error> {
    let value = Value::deserialize(deserializer)?;
    let n = value_to_u64::<D::Error>(&value)?;
    usize::try_from(n)
        .map_err(|_| de::Error::invalid_value(Unexpected::Unsigned(n), &"usize value"))
}

/// Deserialize a list of `u16`s, each given as a number or prefixed
/// string literal.
pub fn de_u16_vec<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u16>, D::Error> {
    let values = Vec::<Value>::deserialize(deserializer)?;
    values
        .iter()
        .map(|v| {
            let n = value_to_u64::<D::Error>(v)?;
            u16::try_from(n).map_err(|_| {
                de::Error::invalid_value(Unexpected::Unsigned(n), &"value in 0..=0xFFFF")
            })
        })
        .collect()
}

/// Deserialize a `u32` from a number or prefixed string literal.
pub fn de_u32<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    let value = Value::deserialize(deserializer)?;
    let n = value_to_u64::<D::Error>(&value)?;
    u32::try_from(n)
        .map_err(|_| de::Error::invalid_value(Unexpected::Unsigned(n), &"u32 value"))
}
