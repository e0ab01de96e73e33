//! Serde helpers for the token endpoint wire format.

use serde::{Deserialize, Deserializer, Serializer};

/// Treat an explicit `null` like a missing field.
pub fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Optional integer that arrives as a JSON number or a JSON string and is
/// written back as a string.
pub mod string_or_number {
    use super::*;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(i64),
        Float(f64),
        Text(String),
    }

    pub fn serialize<S>(value: &Option<i64>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(v) => serializer.serialize_str(&v.to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<Raw>::deserialize(deserializer)? {
            None => Ok(None),
            Some(Raw::Number(n)) => Ok(Some(n)),
            Some(Raw::Float(f)) => Ok(Some(f as i64)),
            Some(Raw::Text(s)) if s.trim().is_empty() => Ok(None),
            Some(Raw::Text(s)) => s
                .trim()
                .parse::<i64>()
                .map(Some)
                .map_err(|_| serde::de::Error::custom(format!("invalid integer string '{}'", s))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Sample {
        #[serde(default, with = "string_or_number", skip_serializing_if = "Option::is_none")]
        value: Option<i64>,
        #[serde(default, deserialize_with = "null_as_default")]
        items: Vec<u8>,
    }

    #[test]
    fn test_string_or_number() {
        let a: Sample = serde_json::from_str(r#"{"value":"3600"}"#).unwrap();
        let b: Sample = serde_json::from_str(r#"{"value":3600}"#).unwrap();
        assert_eq!(a, b);
        assert_eq!(serde_json::to_string(&a).unwrap(), r#"{"value":"3600","items":[]}"#);
        assert!(serde_json::from_str::<Sample>(r#"{"value":"soon"}"#).is_err());
    }

    #[test]
    fn test_null_as_default() {
        let s: Sample = serde_json::from_str(r#"{"items":null}"#).unwrap();
        assert!(s.items.is_empty());
        assert_eq!(s.value, None);
    }
}
