//! Key-casing normalization and tolerant deserialization of API payloads.
//!
//! The API speaks camelCase on the wire. Every successful body is rewritten to snake_case
//! with [`normalize_keys`] before it is mapped onto the record types in [`crate::types`].
//!
//! When the `tracing` feature is enabled, this module also logs warnings for any
//! unknown fields encountered during deserialization, helping detect API changes.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// Converts a single wire-format key into snake_case.
///
/// Splits acronym-to-word boundaries (`HTTPStatus` → `http_status`), lowercase-or-digit to
/// uppercase boundaries (`sourceId` → `source_id`) and letter-to-digit boundaries
/// (`volume24h` → `volume_24h`), then lowercases the result. Keys without case transitions
/// are returned unchanged, so the conversion is idempotent.
#[must_use]
pub fn to_snake_case(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    let mut out = String::with_capacity(key.len() + 4);

    for (i, &ch) in chars.iter().enumerate() {
        if i > 0 {
            let prev = chars[i - 1];
            let next = chars.get(i + 1).copied();

            let acronym_end = prev.is_uppercase()
                && ch.is_uppercase()
                && next.is_some_and(char::is_lowercase);
            let word_start = (prev.is_lowercase() || prev.is_ascii_digit()) && ch.is_uppercase();
            let digit_start = prev.is_lowercase() && ch.is_ascii_digit();

            if acronym_end || word_start || digit_start {
                out.push('_');
            }
        }
        out.extend(ch.to_lowercase());
    }

    out
}

/// Recursively rewrites every object key in `value` with [`to_snake_case`].
///
/// Arrays are traversed element by element; scalars pass through unchanged.
#[must_use]
pub fn normalize_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (to_snake_case(&k), normalize_keys(v)))
                .collect::<Map<String, Value>>(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(normalize_keys).collect()),
        other => other,
    }
}

/// A `serde_as` type that deserializes strings or numbers as `String`.
///
/// Identifiers coming from different market platforms are sometimes numeric. Use with
/// `#[serde_as(as = "StringFromAny")]` for `String` fields.
pub struct StringFromAny;

impl<'de> serde_with::DeserializeAs<'de, String> for StringFromAny {
    fn deserialize_as<D>(deserializer: D) -> std::result::Result<String, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use std::fmt;

        use serde::de::{self, Visitor};

        struct StringOrNumberVisitor;

        impl Visitor<'_> for StringOrNumberVisitor {
            type Value = String;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("string or number")
            }

            fn visit_str<E>(self, v: &str) -> std::result::Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(v.to_owned())
            }

            fn visit_string<E>(self, v: String) -> std::result::Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(v)
            }

            fn visit_i64<E>(self, v: i64) -> std::result::Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(v.to_string())
            }

            fn visit_u64<E>(self, v: u64) -> std::result::Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(v.to_string())
            }

            fn visit_f64<E>(self, v: f64) -> std::result::Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(v.to_string())
            }

            fn visit_unit<E>(self) -> std::result::Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(String::new())
            }
        }

        deserializer.deserialize_any(StringOrNumberVisitor)
    }
}

impl serde_with::SerializeAs<String> for StringFromAny {
    fn serialize_as<S>(source: &String, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(source)
    }
}

/// Deserialize JSON with unknown field warnings.
///
/// Unknown fields trigger warnings but do not cause deserialization to fail.
#[cfg(feature = "tracing")]
pub fn deserialize_with_warnings<T: DeserializeOwned>(value: Value) -> crate::Result<T> {
    use std::any::type_name;

    tracing::trace!(
        type_name = %type_name::<T>(),
        json = %value,
        "deserializing JSON"
    );

    let original = value.clone();
    let mut unknown_paths: Vec<String> = Vec::new();

    let result: T = serde_ignored::deserialize(value, |path| {
        unknown_paths.push(path.to_string());
    })
    .inspect_err(|_| {
        // Re-run with serde_path_to_error to find where it broke
        let json_str = original.to_string();
        let jd = &mut serde_json::Deserializer::from_str(&json_str);
        let path_result: Result<T, _> = serde_path_to_error::deserialize(jd);
        if let Err(path_err) = path_result {
            let path = path_err.path().to_string();
            let value_display = format_value(lookup_value(&original, &path));

            tracing::error!(
                type_name = %type_name::<T>(),
                path = %path,
                value = %value_display,
                error = %path_err.inner(),
                "deserialization failed"
            );
        }
    })?;

    if !unknown_paths.is_empty() {
        let type_name = type_name::<T>();
        for path in unknown_paths {
            let value_display = format_value(lookup_value(&original, &path));

            tracing::warn!(
                type_name = %type_name,
                field = %path,
                value = %value_display,
                "unknown field in API response"
            );
        }
    }

    Ok(result)
}

/// Pass-through deserialization when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub fn deserialize_with_warnings<T: DeserializeOwned>(value: Value) -> crate::Result<T> {
    Ok(serde_json::from_value(value)?)
}

/// Look up a value by a `serde_ignored` / `serde_path_to_error` path such as
/// `data[3].outcomes.0.name`. `?` segments (Option wrappers) are skipped.
#[cfg(feature = "tracing")]
fn lookup_value<'value>(value: &'value Value, path: &str) -> Option<&'value Value> {
    let mut current = value;

    for segment in path_segments(path) {
        if segment.is_empty() || segment == "?" {
            continue;
        }

        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(arr) => arr.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(current)
}

#[cfg(feature = "tracing")]
fn path_segments(path: &str) -> impl Iterator<Item = &str> {
    path.split(['.', '[', ']'])
}

#[cfg(feature = "tracing")]
fn format_value(value: Option<&Value>) -> String {
    value.map_or_else(|| "<unable to retrieve>".to_owned(), ToString::to_string)
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use serde_json::json;
    use serde_with::serde_as;

    use super::*;

    #[test]
    fn splits_lower_to_upper() {
        assert_eq!(to_snake_case("sourceId"), "source_id");
        assert_eq!(to_snake_case("yesPrice"), "yes_price");
        assert_eq!(to_snake_case("potentialReturn"), "potential_return");
    }

    #[test]
    fn splits_letter_to_digit() {
        assert_eq!(to_snake_case("volume24h"), "volume_24h");
        assert_eq!(to_snake_case("change7dPct"), "change_7d_pct");
    }

    #[test]
    fn splits_acronyms() {
        assert_eq!(to_snake_case("imageURL"), "image_url");
        assert_eq!(to_snake_case("HTTPStatus"), "http_status");
        assert_eq!(to_snake_case("usdcValue"), "usdc_value");
    }

    #[test]
    fn lowercases_non_ascii_letters() {
        assert_eq!(to_snake_case("ÉtatCivil"), "état_civil");
        assert_eq!(to_snake_case("prixÉlevé"), "prix_élevé");
        assert_eq!(to_snake_case("état_civil"), "état_civil");
    }

    #[test]
    fn already_normalized_keys_are_fixed_points() {
        for key in ["id", "source_id", "volume_24h", "market_std_dev", "", "_"] {
            assert_eq!(to_snake_case(key), key, "key {key:?} changed");
            assert_eq!(to_snake_case(&to_snake_case(key)), to_snake_case(key));
        }
    }

    #[test]
    fn normalize_keys_recurses_through_objects_and_arrays() {
        let raw = json!({
            "data": [
                {
                    "sourceId": "abc",
                    "outcomes": [{ "name": "Yes", "volume24h": 10 }],
                    "imageUrl": null
                }
            ],
            "meta": { "total": 1, "limit": 50, "offset": 0 },
            "camelString": "valueStaysCamel"
        });

        let normalized = normalize_keys(raw);

        assert_eq!(
            normalized,
            json!({
                "data": [
                    {
                        "source_id": "abc",
                        "outcomes": [{ "name": "Yes", "volume_24h": 10 }],
                        "image_url": null
                    }
                ],
                "meta": { "total": 1, "limit": 50, "offset": 0 },
                "camel_string": "valueStaysCamel"
            })
        );
    }

    #[test]
    fn normalize_keys_passes_scalars_through() {
        assert_eq!(normalize_keys(json!(42)), json!(42));
        assert_eq!(normalize_keys(json!("sourceId")), json!("sourceId"));
        assert_eq!(normalize_keys(Value::Null), Value::Null);
    }

    #[serde_as]
    #[derive(Debug, Deserialize)]
    struct Ident {
        #[serde_as(as = "StringFromAny")]
        id: String,
    }

    #[test]
    fn string_from_any_accepts_numbers() {
        let from_str: Ident = serde_json::from_value(json!({"id": "a1"})).expect("string id");
        let from_int: Ident = serde_json::from_value(json!({"id": 17})).expect("integer id");

        assert_eq!(from_str.id, "a1");
        assert_eq!(from_int.id, "17");
    }

    #[test]
    fn deserialize_with_warnings_ignores_unknown_fields() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct Known {
            known_field: String,
        }

        let value = json!({"known_field": "value", "extra": [1, 2]});
        let known: Known = deserialize_with_warnings(value).expect("deserialization failed");

        assert_eq!(known.known_field, "value");
    }

    #[cfg(feature = "tracing")]
    #[test]
    fn lookup_value_follows_mixed_paths() {
        let value = json!({"data": [{"name": "a"}, {"name": "b"}]});

        assert_eq!(lookup_value(&value, "data[1].name"), Some(&json!("b")));
        assert_eq!(lookup_value(&value, "data.0.name"), Some(&json!("a")));
        assert_eq!(lookup_value(&value, "data.5"), None);
        assert_eq!(format_value(None), "<unable to retrieve>");
    }
}
