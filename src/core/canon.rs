//! Canonical encoder for structured keys and versions.
//!
//! Canonical rules:
//! - object fields emitted in key order (byte-wise), recursively
//! - arrays preserve element order
//! - no insignificant whitespace
//! - numbers with zero fraction in the safe-integer range print without a
//!   fractional part, matching JSON source notation
//! - non-finite floats are rejected
//!
//! Structurally equal inputs always produce identical output, and distinct
//! inputs never collide, so the output is usable as a map key.

use super::error::CanonError;
use super::value::Value;

/// Largest integer exactly representable in an f64.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;

/// Serialize a value to its canonical string form.
pub fn to_canon_string(value: &Value) -> Result<String, CanonError> {
    let mut out = String::new();
    write_value(&mut out, value)?;
    Ok(out)
}

fn write_value(out: &mut String, value: &Value) -> Result<(), CanonError> {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(true) => out.push_str("true"),
        Value::Bool(false) => out.push_str("false"),
        Value::Num(n) => write_number(out, *n)?,
        Value::Str(s) => write_string(out, s),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(out, item)?;
            }
            out.push(']');
        }
        Value::Object(fields) => {
            // BTreeMap iteration is already in key order.
            out.push('{');
            for (i, (name, field)) in fields.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(out, name);
                out.push(':');
                write_value(out, field)?;
            }
            out.push('}');
        }
    }
    Ok(())
}

fn write_number(out: &mut String, n: f64) -> Result<(), CanonError> {
    if !n.is_finite() {
        return Err(CanonError::UnsupportedType {
            reason: "non-finite number".to_string(),
        });
    }
    if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
        out.push_str(&format!("{}", n as i64));
    } else {
        out.push_str(&ryu_format(n));
    }
    Ok(())
}

// serde_json's float notation, reused so canonical output matches what a
// plain serde_json encode of the same number would produce.
fn ryu_format(n: f64) -> String {
    serde_json::Number::from_f64(n)
        .map(|num| num.to_string())
        .unwrap_or_else(|| "0".to_string())
}

/// Escape and quote a string the way JSON does.
pub(crate) fn write_string(out: &mut String, s: &str) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{0008}' => out.push_str("\\b"),
            '\u{000C}' => out.push_str("\\f"),
            c if (c as u32) < 0x20 => {
                out.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push('"');
}
