//! Parsing command-line text into stored values.

use anyhow::{bail, Context, Result};
use clap::ValueEnum;
use shelf_store::Value;

/// Value kinds accepted by `shelf put`
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ValueKind {
    Int,
    Float,
    Str,
    /// Hex-encoded, optional `0x` prefix
    Bytes,
}

pub fn parse_value(kind: ValueKind, raw: &str) -> Result<Value> {
    let value = match kind {
        ValueKind::Int => Value::Integer(
            raw.trim()
                .parse()
                .with_context(|| format!("not an integer: {:?}", raw))?,
        ),
        ValueKind::Float => {
            let v: f64 = raw
                .trim()
                .parse()
                .with_context(|| format!("not a float: {:?}", raw))?;
            if !v.is_finite() {
                bail!("float must be finite: {:?}", raw);
            }
            Value::Float(v)
        }
        ValueKind::Str => Value::String(raw.to_string()),
        ValueKind::Bytes => {
            let digits = raw.strip_prefix("0x").unwrap_or(raw);
            Value::Bytes(hex::decode(digits).with_context(|| format!("not hex: {:?}", raw))?)
        }
    };
    Ok(value)
}
