//! Runtime attribute values and their canonical ordering
//!
//! Every cell in a loaded dataset becomes a [`Value`]. The engine needs a
//! strict total order over values (normalization sorts relationship
//! collections by primary-key value), so ordering lives here rather than on
//! an ad-hoc comparator: numbers compare numerically across `Int`/`Float`,
//! strings lexicographically, and `Null` sorts before everything.

use std::cmp::Ordering;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A typed attribute value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Date(NaiveDate),
    List(Vec<Value>),
}

impl Value {
    /// Name of the value's type, for report messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Date(_) => "date",
            Value::List(_) => "list",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric view of the value, if it has one
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Rank of the value's type in the canonical order
    fn type_rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Int(_) | Value::Float(_) => 2,
            Value::Str(_) => 3,
            Value::Date(_) => 4,
            Value::List(_) => 5,
        }
    }

    /// Strict total order over values
    ///
    /// `Int` and `Float` compare numerically against each other (`Float` via
    /// `total_cmp`, so NaN is ordered rather than poisoning the sort).
    /// Values of different types order by type rank, which keeps the order
    /// total even for graphs that have not been validated yet.
    pub fn canonical_cmp(&self, other: &Value) -> Ordering {
        use Value::*;
        match (self, other) {
            (Null, Null) => Ordering::Equal,
            (Bool(a), Bool(b)) => a.cmp(b),
            (Int(a), Int(b)) => a.cmp(b),
            (Float(a), Float(b)) => a.total_cmp(b),
            (Int(a), Float(b)) => (*a as f64).total_cmp(b),
            (Float(a), Int(b)) => a.total_cmp(&(*b as f64)),
            (Str(a), Str(b)) => a.cmp(b),
            (Date(a), Date(b)) => a.cmp(b),
            (List(a), List(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    let ord = x.canonical_cmp(y);
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                a.len().cmp(&b.len())
            }
            _ => self.type_rank().cmp(&other.type_rank()),
        }
    }

    /// Semantic equality used by the differ and graph equality
    pub fn value_equal(&self, other: &Value) -> bool {
        self.canonical_cmp(other) == Ordering::Equal
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Str(s) => write!(f, "{}", s),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Value::List(items) => {
                let parts: Vec<String> = items.iter().map(|v| v.to_string()).collect();
                write!(f, "{}", parts.join(", "))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_cross_comparison() {
        assert_eq!(Value::Int(2).canonical_cmp(&Value::Float(2.5)), Ordering::Less);
        assert_eq!(Value::Float(3.0).canonical_cmp(&Value::Int(3)), Ordering::Equal);
        assert!(Value::Int(3).value_equal(&Value::Float(3.0)));
    }

    #[test]
    fn test_null_sorts_first() {
        assert_eq!(Value::Null.canonical_cmp(&Value::Int(-100)), Ordering::Less);
        assert_eq!(Value::Null.canonical_cmp(&Value::Str(String::new())), Ordering::Less);
    }

    #[test]
    fn test_nan_is_ordered() {
        let nan = Value::Float(f64::NAN);
        // total_cmp puts NaN after all finite values; the point is that the
        // comparison is still total and deterministic
        assert_eq!(nan.canonical_cmp(&nan), Ordering::Equal);
        assert_ne!(nan.canonical_cmp(&Value::Float(0.0)), Ordering::Equal);
    }

    #[test]
    fn test_list_ordering_is_elementwise() {
        let a = Value::List(vec![Value::Int(1), Value::Int(2)]);
        let b = Value::List(vec![Value::Int(1), Value::Int(3)]);
        let c = Value::List(vec![Value::Int(1)]);
        assert_eq!(a.canonical_cmp(&b), Ordering::Less);
        assert_eq!(c.canonical_cmp(&a), Ordering::Less);
    }

    #[test]
    fn test_display_round_trips_dates() {
        let d = Value::Date(NaiveDate::from_ymd_opt(2021, 3, 14).unwrap());
        assert_eq!(d.to_string(), "2021-03-14");
    }
}
