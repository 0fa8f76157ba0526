// ── Typed value coercion ──
//
// The coercion layer owns value validity: a write is checked against the
// descriptor's declared type before anything goes on the wire. Gen1's
// historical "on"/"off" boolean spelling is rejected here -- the wire
// format is the literal strings `true` / `false`.

use serde_json::Value;

use crate::catalog::{ParamType, ParameterDescriptor};

/// A value that cannot be coerced to the declared type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoerceError {
    pub expected: &'static str,
    pub got: String,
}

impl std::fmt::Display for CoerceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "expected {}, got {}", self.expected, self.got)
    }
}

impl std::error::Error for CoerceError {}

fn mismatch(expected: &'static str, got: &Value) -> CoerceError {
    CoerceError {
        expected,
        got: match got {
            Value::String(s) => format!("string \"{s}\""),
            other => other.to_string(),
        },
    }
}

/// Coerce `value` to the descriptor's declared type, normalizing string
/// spellings the CLI produces (`"true"`, `"42"`). Numeric bounds are
/// checked against `min`/`max`; enum values against `enum_values`.
pub fn coerce(value: &Value, descriptor: &ParameterDescriptor) -> Result<Value, CoerceError> {
    let coerced = coerce_type(value, descriptor.param_type)?;

    if let Some(number) = coerced.as_f64() {
        if descriptor.min.is_some_and(|min| number < min)
            || descriptor.max.is_some_and(|max| number > max)
        {
            return Err(CoerceError {
                expected: "value within declared bounds",
                got: number.to_string(),
            });
        }
    }

    if descriptor.param_type == ParamType::Enum {
        if let Some(allowed) = &descriptor.enum_values {
            let candidate = coerced.as_str().unwrap_or_default();
            if !allowed.iter().any(|v| v == candidate) {
                return Err(CoerceError {
                    expected: "one of the declared enum values",
                    got: candidate.to_string(),
                });
            }
        }
    }

    Ok(coerced)
}

fn coerce_type(value: &Value, ty: ParamType) -> Result<Value, CoerceError> {
    match ty {
        ParamType::Boolean => match value {
            Value::Bool(_) => Ok(value.clone()),
            // "on"/"off" (and everything else) is rejected: only the
            // literal spellings are valid boolean input.
            Value::String(s) if s.eq_ignore_ascii_case("true") => Ok(Value::Bool(true)),
            Value::String(s) if s.eq_ignore_ascii_case("false") => Ok(Value::Bool(false)),
            other => Err(mismatch("boolean (true/false)", other)),
        },
        ParamType::Integer => match value {
            Value::Number(n) if n.is_i64() || n.is_u64() => Ok(value.clone()),
            Value::Number(n) => {
                let f = n.as_f64().unwrap_or(f64::NAN);
                if f.fract() == 0.0 {
                    Ok(Value::from(f as i64))
                } else {
                    Err(mismatch("integer", value))
                }
            }
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| mismatch("integer", value)),
            other => Err(mismatch("integer", other)),
        },
        ParamType::Float => match value {
            Value::Number(_) => Ok(value.clone()),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .map(Value::from)
                .map_err(|_| mismatch("float", value)),
            other => Err(mismatch("float", other)),
        },
        ParamType::String | ParamType::Enum => match value {
            Value::String(_) => Ok(value.clone()),
            Value::Number(n) => Ok(Value::String(n.to_string())),
            Value::Bool(b) => Ok(Value::String(b.to_string())),
            other => Err(mismatch("string", other)),
        },
        ParamType::Object => match value {
            Value::Object(_) => Ok(value.clone()),
            other => Err(mismatch("object", other)),
        },
        ParamType::Array => match value {
            Value::Array(_) => Ok(value.clone()),
            other => Err(mismatch("array", other)),
        },
        // Observed as literal null: nullable. Accept an explicit clear or
        // a compatible scalar literal.
        ParamType::Null => match value {
            Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => Ok(value.clone()),
            other => Err(mismatch("null or scalar", other)),
        },
    }
}

/// Coerce a value *read* from a device to the declared type. A literal
/// `null` leaf with a nullable descriptor yields `null`; otherwise the
/// observed value must match the declaration.
pub fn coerce_read(value: &Value, descriptor: &ParameterDescriptor) -> Result<Value, CoerceError> {
    if value.is_null() && descriptor.param_type == ParamType::Null {
        return Ok(Value::Null);
    }
    coerce_type(value, descriptor.param_type)
}

/// Serialize a coerced value for a Gen1 query string.
///
/// Booleans become the literal lowercase strings `true` / `false` (never
/// `on`/`off`); `null` becomes the literal string `null`, used to clear
/// static-IP style fields.
pub fn encode_gen1(value: &Value) -> String {
    match value {
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn descriptor(ty: ParamType) -> ParameterDescriptor {
        ParameterDescriptor::new(ty, "settings", "x")
    }

    #[test]
    fn boolean_accepts_literals_only() {
        let d = descriptor(ParamType::Boolean);
        assert_eq!(coerce(&json!(true), &d).unwrap(), json!(true));
        assert_eq!(coerce(&json!("true"), &d).unwrap(), json!(true));
        assert_eq!(coerce(&json!("False"), &d).unwrap(), json!(false));
        // The load-bearing rejection: Gen1's "on"/"off" spelling never
        // reaches the wire.
        assert!(coerce(&json!("on"), &d).is_err());
        assert!(coerce(&json!("off"), &d).is_err());
        assert!(coerce(&json!(1), &d).is_err());
    }

    #[test]
    fn integer_coercion() {
        let d = descriptor(ParamType::Integer);
        assert_eq!(coerce(&json!(42), &d).unwrap(), json!(42));
        assert_eq!(coerce(&json!("42"), &d).unwrap(), json!(42));
        assert_eq!(coerce(&json!(42.0), &d).unwrap(), json!(42));
        assert!(coerce(&json!(42.5), &d).is_err());
        assert!(coerce(&json!("forty-two"), &d).is_err());
    }

    #[test]
    fn bounds_are_enforced() {
        let mut d = descriptor(ParamType::Integer);
        d.min = Some(0.0);
        d.max = Some(100.0);
        assert!(coerce(&json!(50), &d).is_ok());
        assert!(coerce(&json!(101), &d).is_err());
        assert!(coerce(&json!(-1), &d).is_err());
    }

    #[test]
    fn enum_values_are_enforced() {
        let mut d = descriptor(ParamType::Enum);
        d.enum_values = Some(vec!["follow".into(), "flip".into()]);
        assert_eq!(coerce(&json!("follow"), &d).unwrap(), json!("follow"));
        assert!(coerce(&json!("sideways"), &d).is_err());
    }

    #[test]
    fn nullable_accepts_clear_and_literal() {
        let d = descriptor(ParamType::Null);
        assert_eq!(coerce(&json!(null), &d).unwrap(), json!(null));
        assert_eq!(coerce(&json!("10.0.0.1"), &d).unwrap(), json!("10.0.0.1"));
    }

    #[test]
    fn read_of_null_with_nullable_descriptor() {
        let d = descriptor(ParamType::Null);
        assert_eq!(coerce_read(&json!(null), &d).unwrap(), json!(null));

        let d = descriptor(ParamType::Boolean);
        assert!(coerce_read(&json!(null), &d).is_err());
    }

    #[test]
    fn gen1_encoding() {
        assert_eq!(encode_gen1(&json!(true)), "true");
        assert_eq!(encode_gen1(&json!(false)), "false");
        assert_eq!(encode_gen1(&json!(2500)), "2500");
        assert_eq!(encode_gen1(&json!(12.5)), "12.5");
        assert_eq!(encode_gen1(&json!("kitchen")), "kitchen");
        assert_eq!(encode_gen1(&json!(null)), "null");
    }
}
