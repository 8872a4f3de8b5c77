//! Scalar kind codecs
//!
//! One parse/format/validate triple per [`ScalarKind`], looked up through
//! [`codec_for`]. Adding a kind means implementing [`ScalarCodec`] and adding
//! an arm to the lookup table; nothing else in the engine changes.
//!
//! Parse turns raw cell text into a typed [`Value`] and fails with a reason
//! string (the codec layer wraps it with row/column coordinates). Format is
//! total for values that parse produced. Validate checks a typed value
//! against the kind and the attribute's constraints, returning every
//! violation it finds.

use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

use chrono::NaiveDate;
use regex::Regex;

use crate::schema::{Constraints, ScalarKind};
use crate::value::Value;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Parse, format, and validate behavior for one scalar kind
pub trait ScalarCodec: Sync {
    fn parse(&self, kind: &ScalarKind, raw: &str) -> Result<Value, String>;

    fn format(&self, kind: &ScalarKind, value: &Value) -> String;

    /// Type conformance and constraint checks; empty means valid
    fn validate(&self, kind: &ScalarKind, value: &Value, constraints: &Constraints) -> Vec<String>;
}

/// Look up the codec for a scalar kind
pub fn codec_for(kind: &ScalarKind) -> &'static dyn ScalarCodec {
    match kind {
        ScalarKind::String => &StringCodec,
        ScalarKind::Integer => &IntegerCodec,
        ScalarKind::Float => &FloatCodec,
        ScalarKind::Boolean => &BooleanCodec,
        ScalarKind::Date => &DateCodec,
        ScalarKind::Enumerated { .. } => &EnumeratedCodec,
        ScalarKind::Pattern { .. } => &PatternCodec,
        ScalarKind::Expression => &ExpressionCodec,
    }
}

fn numeric_range_errors(value: &Value, constraints: &Constraints) -> Vec<String> {
    let mut errors = Vec::new();
    if let Some(x) = value.as_f64() {
        if let Some(min) = constraints.min {
            if x < min {
                errors.push(format!("value {} is below the minimum {}", x, min));
            }
        }
        if let Some(max) = constraints.max {
            if x > max {
                errors.push(format!("value {} is above the maximum {}", x, max));
            }
        }
    }
    errors
}

fn type_error(expected: &str, value: &Value) -> Vec<String> {
    vec![format!("expected a {} value, found {}", expected, value.type_name())]
}

struct StringCodec;

impl ScalarCodec for StringCodec {
    fn parse(&self, _kind: &ScalarKind, raw: &str) -> Result<Value, String> {
        Ok(Value::Str(raw.to_string()))
    }

    fn format(&self, _kind: &ScalarKind, value: &Value) -> String {
        value.to_string()
    }

    fn validate(&self, _kind: &ScalarKind, value: &Value, _c: &Constraints) -> Vec<String> {
        match value {
            Value::Str(_) => Vec::new(),
            other => type_error("string", other),
        }
    }
}

struct IntegerCodec;

impl ScalarCodec for IntegerCodec {
    fn parse(&self, _kind: &ScalarKind, raw: &str) -> Result<Value, String> {
        raw.trim()
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| "not an integer".to_string())
    }

    fn format(&self, _kind: &ScalarKind, value: &Value) -> String {
        value.to_string()
    }

    fn validate(&self, _kind: &ScalarKind, value: &Value, constraints: &Constraints) -> Vec<String> {
        match value {
            Value::Int(_) => numeric_range_errors(value, constraints),
            other => type_error("integer", other),
        }
    }
}

struct FloatCodec;

impl ScalarCodec for FloatCodec {
    fn parse(&self, _kind: &ScalarKind, raw: &str) -> Result<Value, String> {
        raw.trim()
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| "not a number".to_string())
    }

    fn format(&self, _kind: &ScalarKind, value: &Value) -> String {
        value.to_string()
    }

    fn validate(&self, _kind: &ScalarKind, value: &Value, constraints: &Constraints) -> Vec<String> {
        match value {
            Value::Float(_) | Value::Int(_) => numeric_range_errors(value, constraints),
            other => type_error("float", other),
        }
    }
}

struct BooleanCodec;

impl ScalarCodec for BooleanCodec {
    fn parse(&self, _kind: &ScalarKind, raw: &str) -> Result<Value, String> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Ok(Value::Bool(true)),
            "false" | "0" => Ok(Value::Bool(false)),
            _ => Err("not a boolean (expected true/false/1/0)".to_string()),
        }
    }

    fn format(&self, _kind: &ScalarKind, value: &Value) -> String {
        value.to_string()
    }

    fn validate(&self, _kind: &ScalarKind, value: &Value, _c: &Constraints) -> Vec<String> {
        match value {
            Value::Bool(_) => Vec::new(),
            other => type_error("boolean", other),
        }
    }
}

struct DateCodec;

impl ScalarCodec for DateCodec {
    fn parse(&self, _kind: &ScalarKind, raw: &str) -> Result<Value, String> {
        NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT)
            .map(Value::Date)
            .map_err(|_| "not a date (expected YYYY-MM-DD)".to_string())
    }

    fn format(&self, _kind: &ScalarKind, value: &Value) -> String {
        value.to_string()
    }

    fn validate(&self, _kind: &ScalarKind, value: &Value, _c: &Constraints) -> Vec<String> {
        match value {
            Value::Date(_) => Vec::new(),
            other => type_error("date", other),
        }
    }
}

struct EnumeratedCodec;

impl ScalarCodec for EnumeratedCodec {
    fn parse(&self, kind: &ScalarKind, raw: &str) -> Result<Value, String> {
        let ScalarKind::Enumerated { variants } = kind else {
            return Err("enumerated codec used with a non-enumerated kind".to_string());
        };
        let text = raw.trim();
        if variants.iter().any(|v| v == text) {
            Ok(Value::Str(text.to_string()))
        } else {
            Err(format!("not one of [{}]", variants.join(", ")))
        }
    }

    fn format(&self, _kind: &ScalarKind, value: &Value) -> String {
        value.to_string()
    }

    fn validate(&self, kind: &ScalarKind, value: &Value, _c: &Constraints) -> Vec<String> {
        let ScalarKind::Enumerated { variants } = kind else {
            return vec!["enumerated codec used with a non-enumerated kind".to_string()];
        };
        match value {
            Value::Str(s) if variants.iter().any(|v| v == s) => Vec::new(),
            Value::Str(s) => vec![format!("'{}' is not one of [{}]", s, variants.join(", "))],
            other => type_error("string", other),
        }
    }
}

struct PatternCodec;

/// Process-wide cache of compiled patterns. The registry rejects invalid
/// patterns at build time, so compilation here only fails for kinds built
/// outside a registry.
fn compiled_pattern(pattern: &str) -> Option<Regex> {
    static CACHE: OnceLock<Mutex<HashMap<String, Regex>>> = OnceLock::new();
    let cache = CACHE.get_or_init(|| Mutex::new(HashMap::new()));
    let mut cache = cache.lock().ok()?;
    if let Some(re) = cache.get(pattern) {
        return Some(re.clone());
    }
    let re = Regex::new(pattern).ok()?;
    cache.insert(pattern.to_string(), re.clone());
    Some(re)
}

impl ScalarCodec for PatternCodec {
    fn parse(&self, _kind: &ScalarKind, raw: &str) -> Result<Value, String> {
        Ok(Value::Str(raw.to_string()))
    }

    fn format(&self, _kind: &ScalarKind, value: &Value) -> String {
        value.to_string()
    }

    fn validate(&self, kind: &ScalarKind, value: &Value, _c: &Constraints) -> Vec<String> {
        let ScalarKind::Pattern { regex } = kind else {
            return vec!["pattern codec used with a non-pattern kind".to_string()];
        };
        match value {
            Value::Str(s) => match compiled_pattern(regex) {
                Some(re) if re.is_match(s) => Vec::new(),
                Some(_) => vec![format!("'{}' does not match the pattern '{}'", s, regex)],
                None => vec![format!("invalid pattern '{}'", regex)],
            },
            other => type_error("string", other),
        }
    }
}

struct ExpressionCodec;

impl ScalarCodec for ExpressionCodec {
    fn parse(&self, _kind: &ScalarKind, raw: &str) -> Result<Value, String> {
        Ok(Value::Str(raw.to_string()))
    }

    fn format(&self, _kind: &ScalarKind, value: &Value) -> String {
        value.to_string()
    }

    fn validate(&self, _kind: &ScalarKind, value: &Value, _c: &Constraints) -> Vec<String> {
        match value {
            Value::Str(_) => Vec::new(),
            other => type_error("expression", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_parse_and_range() {
        let kind = ScalarKind::Integer;
        let codec = codec_for(&kind);
        assert_eq!(codec.parse(&kind, " 42 ").unwrap(), Value::Int(42));
        assert!(codec.parse(&kind, "4.2").is_err());

        let constraints = Constraints {
            min: Some(0.0),
            max: Some(10.0),
            ..Default::default()
        };
        assert!(codec.validate(&kind, &Value::Int(5), &constraints).is_empty());
        assert_eq!(codec.validate(&kind, &Value::Int(-1), &constraints).len(), 1);
    }

    #[test]
    fn test_boolean_parse_variants() {
        let kind = ScalarKind::Boolean;
        let codec = codec_for(&kind);
        assert_eq!(codec.parse(&kind, "TRUE").unwrap(), Value::Bool(true));
        assert_eq!(codec.parse(&kind, "0").unwrap(), Value::Bool(false));
        assert!(codec.parse(&kind, "maybe").is_err());
    }

    #[test]
    fn test_date_round_trip() {
        let kind = ScalarKind::Date;
        let codec = codec_for(&kind);
        let parsed = codec.parse(&kind, "2021-03-14").unwrap();
        assert_eq!(codec.format(&kind, &parsed), "2021-03-14");
    }

    #[test]
    fn test_enumerated_rejects_unknown_variant() {
        let kind = ScalarKind::Enumerated {
            variants: vec!["red".to_string(), "green".to_string()],
        };
        let codec = codec_for(&kind);
        assert_eq!(codec.parse(&kind, "red").unwrap(), Value::Str("red".to_string()));
        assert!(codec.parse(&kind, "blue").is_err());
    }

    #[test]
    fn test_pattern_validation() {
        let kind = ScalarKind::Pattern {
            regex: r"^[a-z]+\d$".to_string(),
        };
        let codec = codec_for(&kind);
        let ok = codec.parse(&kind, "abc1").unwrap();
        assert!(codec.validate(&kind, &ok, &Constraints::default()).is_empty());
        let bad = codec.parse(&kind, "ABC").unwrap();
        assert_eq!(codec.validate(&kind, &bad, &Constraints::default()).len(), 1);
    }
}
