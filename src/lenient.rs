//! Forgiving deserializers for LLM-supplied tool arguments.
//!
//! Tool arguments are never rejected at parse time. Each helper accepts any
//! JSON value and coerces it to the field's type, falling back to the type's
//! zero value when the shape doesn't match. Range and presence checks happen
//! later, in one place, when the request runs against the scene model.
//!
//! Use on fields as `#[serde(default, deserialize_with = "lenient::opt_f64")]`.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Coerce a JSON value to a number. Numeric strings are parsed; anything else is 0.
pub fn number(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

/// Coerce a JSON value to a list of numbers. A JSON-encoded array inside a
/// string is unwrapped; non-numeric elements become 0.
pub fn numbers(value: &Value) -> Vec<f64> {
    match value {
        Value::Array(items) => items.iter().map(number).collect(),
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(Value::Array(items)) => items.iter().map(number).collect(),
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

/// Parse a whole argument bag into `T`, or `T::default()` if it isn't an object.
pub fn from_args<T: DeserializeOwned + Default>(args: &Value) -> T {
    if args.is_object() {
        serde_json::from_value(args.clone()).unwrap_or_default()
    } else {
        T::default()
    }
}

pub fn string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    })
}

pub fn opt_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => Some(String::new()),
    })
}

pub fn opt_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Null => None,
        other => Some(number(&other)),
    })
}

pub fn opt_vector<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<Vec<f64>>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Null => None,
        other => Some(numbers(&other)),
    })
}

pub fn opt_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<bool>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Null => None,
        Value::Bool(b) => Some(b),
        Value::String(s) => Some(s.trim().eq_ignore_ascii_case("true")),
        Value::Number(n) => Some(n.as_f64().is_some_and(|v| v != 0.0)),
        _ => Some(false),
    })
}

/// A list of objects. A lone object is treated as a one-element list.
pub fn list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Array(items) => items.iter().map(from_args).collect(),
        Value::Object(_) => vec![from_args(&value)],
        _ => Vec::new(),
    })
}

/// A nested object. Present-but-mismatched values become `Some(T::default())`
/// so validation can report what is missing.
pub fn opt_object<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Null => None,
        other => Some(from_args(&other)),
    })
}

pub fn object<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(from_args(&value))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Default, Deserialize)]
    struct Sample {
        #[serde(default, deserialize_with = "string")]
        id: String,
        #[serde(default, deserialize_with = "opt_f64")]
        radius: Option<f64>,
        #[serde(default, deserialize_with = "opt_vector")]
        center: Option<Vec<f64>>,
        #[serde(default, deserialize_with = "opt_bool")]
        capped: Option<bool>,
        #[serde(default, deserialize_with = "list")]
        children: Vec<Child>,
    }

    #[derive(Debug, Default, Deserialize)]
    struct Child {
        #[serde(default, deserialize_with = "string")]
        name: String,
    }

    #[test]
    fn mismatched_fields_fall_back_to_zero_values() {
        let p: Sample = from_args(&json!({
            "id": 7,
            "radius": "not a number",
            "center": [1, "x", 3],
            "capped": "TRUE",
            "children": { "name": "solo" }
        }));
        assert_eq!(p.id, "7");
        assert_eq!(p.radius, Some(0.0));
        assert_eq!(p.center, Some(vec![1.0, 0.0, 3.0]));
        assert_eq!(p.capped, Some(true));
        assert_eq!(p.children.len(), 1);
        assert_eq!(p.children[0].name, "solo");
    }

    #[test]
    fn missing_fields_stay_absent() {
        let p: Sample = from_args(&json!({}));
        assert!(p.id.is_empty());
        assert!(p.radius.is_none());
        assert!(p.center.is_none());
        assert!(p.children.is_empty());
    }

    #[test]
    fn non_object_arguments_become_defaults() {
        let p: Sample = from_args(&json!("sphere please"));
        assert!(p.id.is_empty());
        let p: Sample = from_args(&Value::Null);
        assert!(p.center.is_none());
    }

    #[test]
    fn stringified_vectors_are_unwrapped() {
        assert_eq!(numbers(&json!("[0, 1.5, -2]")), vec![0.0, 1.5, -2.0]);
        assert!(numbers(&json!("up")).is_empty());
        assert_eq!(number(&json!(" 2.5 ")), 2.5);
    }
}
