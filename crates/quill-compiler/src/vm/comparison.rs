//! Equality and ordering used by `EQ`, `NEQ` and the relational opcodes.

use std::cmp::Ordering;

use super::value::Value;

/// Equality with number coercion.
///
/// Numbers compare with numeric strings, booleans compare as 0 and 1, and
/// everything else falls back to [`Value`]'s own equality.
pub fn loose_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(n), Value::String(s)) | (Value::String(s), Value::Number(n)) => {
            s.trim().parse::<f64>().is_ok_and(|parsed| parsed == *n)
        }
        (Value::Boolean(flag), other @ (Value::Number(_) | Value::String(_)))
        | (other @ (Value::Number(_) | Value::String(_)), Value::Boolean(flag)) => {
            loose_equals(&Value::Number(f64::from(u8::from(*flag))), other)
        }
        _ => a == b,
    }
}

/// Ordering of two numbers or two strings. Other pairs are unordered.
pub fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loose_equals_same_type() {
        assert!(loose_equals(&Value::Null, &Value::Null));
        assert!(loose_equals(&Value::Boolean(true), &Value::Boolean(true)));
        assert!(!loose_equals(&Value::Boolean(true), &Value::Boolean(false)));
        assert!(loose_equals(&Value::Number(42.0), &Value::Number(42.0)));
        assert!(loose_equals(&Value::from("foo"), &Value::from("foo")));
        assert!(!loose_equals(&Value::Null, &Value::Number(0.0)));
    }

    #[test]
    fn test_loose_equals_number_string() {
        assert!(loose_equals(&Value::Number(42.0), &Value::from("42")));
        assert!(loose_equals(&Value::from("42"), &Value::Number(42.0)));
        assert!(!loose_equals(&Value::Number(42.0), &Value::from("43")));
    }

    #[test]
    fn test_loose_equals_boolean_coercion() {
        assert!(loose_equals(&Value::Boolean(true), &Value::Number(1.0)));
        assert!(loose_equals(&Value::Number(0.0), &Value::Boolean(false)));
        assert!(!loose_equals(&Value::Boolean(true), &Value::Number(2.0)));
    }

    #[test]
    fn test_loose_equals_nan() {
        assert!(!loose_equals(&Value::Number(f64::NAN), &Value::Number(f64::NAN)));
    }

    #[test]
    fn test_compare() {
        assert_eq!(compare(&Value::Number(1.0), &Value::Number(2.0)), Some(Ordering::Less));
        assert_eq!(compare(&Value::from("b"), &Value::from("a")), Some(Ordering::Greater));
        assert_eq!(compare(&Value::Number(1.0), &Value::from("a")), None);
    }
}
