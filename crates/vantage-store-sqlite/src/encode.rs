//! Conversion from SQLite values to JSON row values.

use rusqlite::types::ValueRef;
use serde_json::{Number, Value};

/// REAL values that JSON cannot carry (NaN, infinities) become `null`.
/// Blobs are hex-encoded.
pub fn value_to_json(value: ValueRef<'_>) -> Value {
  match value {
    ValueRef::Null => Value::Null,
    ValueRef::Integer(i) => Value::Number(i.into()),
    ValueRef::Real(f) => Number::from_f64(f).map_or(Value::Null, Value::Number),
    ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
    ValueRef::Blob(b) => Value::String(hex::encode(b)),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn non_finite_reals_are_null() {
    assert_eq!(value_to_json(ValueRef::Real(f64::NAN)), Value::Null);
    assert_eq!(value_to_json(ValueRef::Real(1.5)), serde_json::json!(1.5));
    assert_eq!(value_to_json(ValueRef::Blob(&[0xab, 0x01])), serde_json::json!("ab01"));
  }
}
