//! Canonical JSON Encoding
//!
//! Deterministic text form of a JSON value used as hashing input. Object keys
//! are sorted at every depth, items are separated by `", "` and keys by
//! `": "`, and strings are escaped down to printable ASCII. The output is
//! byte-compatible with documents written by earlier deployments of the
//! sentinel service, so their stored digests keep verifying.

use serde_json::{Map, Number, Value};
use std::fmt::Write;

/// Encode `value` in canonical form.
pub fn to_canonical_string(value: &Value) -> String {
    let mut out = String::new();
    write_value(&mut out, value);
    out
}

/// Canonical form as bytes, ready for hashing.
pub fn canonical_bytes(value: &Value) -> Vec<u8> {
    to_canonical_string(value).into_bytes()
}

fn write_value(out: &mut String, value: &Value) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(true) => out.push_str("true"),
        Value::Bool(false) => out.push_str("false"),
        Value::Number(n) => write_number(out, n),
        Value::String(s) => write_string(out, s),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_value(out, item);
            }
            out.push(']');
        }
        Value::Object(map) => write_object(out, map),
    }
}

fn write_object(out: &mut String, map: &Map<String, Value>) {
    // Map ordering depends on serde_json features, so sort explicitly
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort();

    out.push('{');
    for (i, key) in keys.into_iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        write_string(out, key);
        out.push_str(": ");
        write_value(out, &map[key.as_str()]);
    }
    out.push('}');
}

fn write_string(out: &mut String, s: &str) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0c}' => out.push_str("\\f"),
            ' '..='~' => out.push(c),
            _ => {
                let mut units = [0u16; 2];
                for unit in c.encode_utf16(&mut units) {
                    let _ = write!(out, "\\u{:04x}", unit);
                }
            }
        }
    }
    out.push('"');
}

/// Integers are written digit for digit at any magnitude; everything else
/// goes through the float layout.
fn write_number(out: &mut String, n: &Number) {
    let text = n.to_string();
    if is_integer_literal(&text) {
        out.push_str(if text == "-0" { "0" } else { &text });
    } else if let Some(f) = n.as_f64() {
        write_float(out, f);
    } else {
        out.push_str(&text);
    }
}

fn is_integer_literal(text: &str) -> bool {
    let digits = text.strip_prefix('-').unwrap_or(text);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

/// Shortest round-trip float text, positional for decimal exponents in
/// `-4..16` and scientific (`1.5e+16`, `1e-05`) outside it.
fn write_float(out: &mut String, f: f64) {
    let sci = format!("{:e}", f);
    let (mantissa, exponent) = match sci.split_once('e') {
        Some(parts) => parts,
        None => {
            out.push_str(&sci);
            return;
        }
    };
    let exponent: i32 = exponent.parse().unwrap_or(0);
    let negative = mantissa.starts_with('-');
    let digits: String = mantissa.chars().filter(|c| c.is_ascii_digit()).collect();

    if negative {
        out.push('-');
    }

    if (-4..16).contains(&exponent) {
        if exponent >= 0 {
            let int_len = exponent as usize + 1;
            if digits.len() <= int_len {
                out.push_str(&digits);
                out.extend(std::iter::repeat('0').take(int_len - digits.len()));
                out.push_str(".0");
            } else {
                out.push_str(&digits[..int_len]);
                out.push('.');
                out.push_str(&digits[int_len..]);
            }
        } else {
            out.push_str("0.");
            out.extend(std::iter::repeat('0').take((-exponent - 1) as usize));
            out.push_str(&digits);
        }
    } else {
        out.push_str(&digits[..1]);
        if digits.len() > 1 {
            out.push('.');
            out.push_str(&digits[1..]);
        }
        let sign = if exponent < 0 { '-' } else { '+' };
        let _ = write!(out, "e{}{:02}", sign, exponent.abs());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_keys_sorted_at_every_depth() {
        let value = json!({"type": "x", "details": {"zeta": 1, "alpha": [{"b": 2, "a": 1}]}});
        assert_eq!(
            to_canonical_string(&value),
            r#"{"details": {"alpha": [{"a": 1, "b": 2}], "zeta": 1}, "type": "x"}"#
        );
    }

    #[test]
    fn test_key_order_does_not_change_encoding() {
        let a: Value = serde_json::from_str(r#"{"a":1,"b":{"d":4,"c":3}}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{ "b" : { "c":3, "d":4 }, "a" : 1 }"#).unwrap();
        assert_eq!(canonical_bytes(&a), canonical_bytes(&b));
    }

    #[test]
    fn test_scalars() {
        assert_eq!(to_canonical_string(&json!(null)), "null");
        assert_eq!(to_canonical_string(&json!(true)), "true");
        assert_eq!(to_canonical_string(&json!(-42)), "-42");
        assert_eq!(to_canonical_string(&json!([])), "[]");
        assert_eq!(to_canonical_string(&json!({})), "{}");
    }

    #[test]
    fn test_string_escaping() {
        assert_eq!(to_canonical_string(&json!("a\"b\\c")), r#""a\"b\\c""#);
        assert_eq!(to_canonical_string(&json!("line\nbreak\t")), r#""line\nbreak\t""#);
        assert_eq!(to_canonical_string(&json!("\u{1}")), r#""\u0001""#);
        assert_eq!(to_canonical_string(&json!("caf\u{e9}")), r#""caf\u00e9""#);
        assert_eq!(to_canonical_string(&json!("\u{1F600}")), r#""\ud83d\ude00""#);
        assert_eq!(to_canonical_string(&json!("\u{7f}")), r#""\u007f""#);
    }

    #[test]
    fn test_integers_beyond_64_bits_stay_exact() {
        let value: Value =
            serde_json::from_str(r#"{"big": 18446744073709551616, "neg": -99999999999999999999999}"#).unwrap();
        assert_eq!(
            to_canonical_string(&value),
            r#"{"big": 18446744073709551616, "neg": -99999999999999999999999}"#
        );

        let zero: Value = serde_json::from_str("-0").unwrap();
        assert_eq!(to_canonical_string(&zero), "0");
    }

    #[test]
    fn test_float_text_is_normalized() {
        let value: Value = serde_json::from_str("[1e16, 1.50, 2E-5]").unwrap();
        assert_eq!(to_canonical_string(&value), "[1e+16, 1.5, 2e-05]");
    }

    #[test]
    fn test_float_formatting() {
        assert_eq!(to_canonical_string(&json!(1.0)), "1.0");
        assert_eq!(to_canonical_string(&json!(100.0)), "100.0");
        assert_eq!(to_canonical_string(&json!(0.5)), "0.5");
        assert_eq!(to_canonical_string(&json!(-2.25)), "-2.25");
        assert_eq!(to_canonical_string(&json!(0.0001)), "0.0001");
        assert_eq!(to_canonical_string(&json!(0.00001)), "1e-05");
        assert_eq!(to_canonical_string(&json!(1e16)), "1e+16");
        assert_eq!(to_canonical_string(&json!(1.5e16)), "1.5e+16");
        assert_eq!(to_canonical_string(&json!(1234567890123456.0)), "1234567890123456.0");
    }
}
