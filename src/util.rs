use serde::Serialize;

/// Get the serde-serialized name of a unit enum variant.
/// Uses serde's own rules (rename_all, rename, etc.) as the single source of truth.
/// Returns `None` for data-carrying variants.
pub fn serde_variant_name<T: Serialize>(val: &T) -> Option<String> {
    match serde_json::to_value(val) {
        Ok(serde_json::Value::String(s)) => Some(s),
        _ => None,
    }
}

/// Get serde-serialized names for all variants of an enum.
pub fn serde_variant_names<T: Serialize>(variants: &[T]) -> Vec<String> {
    variants.iter().filter_map(serde_variant_name).collect()
}

/// Deserialize a string into an enum variant using serde's own rules.
/// Surrounding whitespace is ignored and matching is case-insensitive.
pub fn from_serde_str<T: for<'de> serde::Deserialize<'de>>(s: &str) -> Option<T> {
    let normalized = s.trim().to_ascii_lowercase();
    serde_json::from_value(serde_json::Value::String(normalized)).ok()
}

/// Serde adapter that writes byte buffers as standard base64 strings.
pub mod base64_bytes {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        base64::engine::general_purpose::STANDARD
            .decode(s.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

/// Serde adapter for an optional byte buffer, written as base64 when present.
pub mod base64_opt {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error> {
        match bytes {
            Some(b) => serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(b)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error> {
        let s = Option::<String>::deserialize(deserializer)?;
        s.map(|s| {
            base64::engine::general_purpose::STANDARD
                .decode(s.as_bytes())
                .map_err(serde::de::Error::custom)
        })
        .transpose()
    }
}

/// JSON schema for a string restricted to the given values.
pub fn string_enum_schema(values: Vec<String>) -> schemars::schema::Schema {
    use schemars::schema::{InstanceType, Schema, SchemaObject};
    Schema::Object(SchemaObject {
        instance_type: Some(InstanceType::String.into()),
        enum_values: Some(values.into_iter().map(serde_json::Value::String).collect()),
        ..Default::default()
    })
}

/// Nanoseconds since the Unix epoch, used to build correlation ids.
pub fn timestamp_nanos() -> u128 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::scene::ShapeType;

    #[test]
    fn variant_names_follow_serde_renames() {
        let names = serde_variant_names(ShapeType::ALL);
        assert_eq!(names, vec!["sphere", "box", "quad", "disc", "cylinder", "cone"]);
    }

    #[test]
    fn from_serde_str_is_forgiving_about_case() {
        assert_eq!(from_serde_str::<ShapeType>(" Sphere "), Some(ShapeType::Sphere));
        assert_eq!(from_serde_str::<ShapeType>("torus"), None);
    }
}
