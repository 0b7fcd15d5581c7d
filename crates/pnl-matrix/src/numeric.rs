//! Tolerant numeric coercion for source values
//!
//! Warehouse rows arrive as JSON with numbers encoded as strings, and some
//! source columns hold Brazilian-formatted text (`"1.234,56"`). Anything that
//! does not parse is treated as missing and aggregates as zero.

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::HashMap;

/// One result row keyed by column name
pub type Row = HashMap<String, Value>;

/// Parse a textual amount, accepting dot or comma decimals
pub fn parse_amount(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let parsed = trimmed.parse::<f64>().ok().or_else(|| {
        if trimmed.contains(',') {
            trimmed.replace('.', "").replace(',', ".").parse::<f64>().ok()
        } else {
            None
        }
    })?;

    parsed.is_finite().then_some(parsed)
}

/// Coerce a JSON value to a finite number
pub fn coerce_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        Value::String(s) => parse_amount(s),
        _ => None,
    }
}

/// Extract a number from a row, zero when missing or malformed
pub fn get_f64(row: &Row, key: &str) -> f64 {
    row.get(key).and_then(coerce_f64).unwrap_or(0.0)
}

/// Extract a count from a row, zero when missing or malformed
pub fn get_count(row: &Row, key: &str) -> u64 {
    row.get(key).and_then(coerce_f64).map(safe_f64_to_u64).unwrap_or(0)
}

/// Extract a string from a row, empty when null
pub fn get_string(row: &Row, key: &str) -> String {
    get_string_opt(row, key).unwrap_or_default()
}

/// Extract an optional string from a row; numbers are rendered as text
pub fn get_string_opt(row: &Row, key: &str) -> Option<String> {
    match row.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Safely convert f64 to u64 with bounds checking
/// Returns 0 for negative values, u64::MAX for values that would overflow
fn safe_f64_to_u64(f: f64) -> u64 {
    // Largest f64 below u64::MAX
    const MAX_SAFE: f64 = 18446744073709549568.0;
    if f.is_nan() || f < 0.0 {
        0
    } else if f >= MAX_SAFE {
        u64::MAX
    } else {
        f.round() as u64
    }
}

/// Serde helper for fields that may hold numbers, numeric text or garbage
pub fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(coerce_f64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_amount_formats() {
        assert_eq!(parse_amount("12.5"), Some(12.5));
        assert_eq!(parse_amount(" -3 "), Some(-3.0));
        assert_eq!(parse_amount("1.234,56"), Some(1234.56));
        assert_eq!(parse_amount("7,5"), Some(7.5));
        assert_eq!(parse_amount("n/a"), None);
        assert_eq!(parse_amount(""), None);
        assert_eq!(parse_amount("NaN"), None);
        assert_eq!(parse_amount("inf"), None);
    }

    #[test]
    fn test_row_getters_default_to_zero() {
        let row: Row = [
            ("amount".to_string(), json!("42.5")),
            ("count".to_string(), json!("3")),
            ("broken".to_string(), json!("abc")),
            ("label".to_string(), json!(null)),
        ]
        .into_iter()
        .collect();

        assert_eq!(get_f64(&row, "amount"), 42.5);
        assert_eq!(get_f64(&row, "broken"), 0.0);
        assert_eq!(get_f64(&row, "missing"), 0.0);
        assert_eq!(get_count(&row, "count"), 3);
        assert_eq!(get_string(&row, "label"), "");
        assert_eq!(get_string_opt(&row, "amount").as_deref(), Some("42.5"));
    }

    #[test]
    fn test_safe_f64_to_u64_bounds() {
        assert_eq!(safe_f64_to_u64(-1.0), 0);
        assert_eq!(safe_f64_to_u64(f64::NAN), 0);
        assert_eq!(safe_f64_to_u64(2.6), 3);
        assert_eq!(safe_f64_to_u64(1e30), u64::MAX);
    }

    #[test]
    fn test_lenient_field() {
        #[derive(Deserialize)]
        struct Line {
            #[serde(default, deserialize_with = "lenient_f64")]
            value: Option<f64>,
        }

        let parsed: Line = serde_json::from_value(json!({ "value": "10,5" })).unwrap();
        assert_eq!(parsed.value, Some(10.5));
        let parsed: Line = serde_json::from_value(json!({ "value": "oops" })).unwrap();
        assert_eq!(parsed.value, None);
        let parsed: Line = serde_json::from_value(json!({})).unwrap();
        assert_eq!(parsed.value, None);
    }
}
