//! Serde adapter for ordered key/value pairs.
//!
//! Headers, query parameters and multipart fields are kept as
//! `Vec<(String, String)>` so iteration follows insertion order. On the wire
//! they are plain JSON objects; scalar values (numbers, booleans) are
//! stringified on the way in.

use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserializer, Serializer};
use serde_json::Value;
use std::fmt;

#[allow(clippy::ptr_arg)] // serde's `serialize_with` passes `&Vec<_>`
pub(crate) fn serialize<S>(pairs: &Vec<(String, String)>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let mut map = serializer.serialize_map(Some(pairs.len()))?;
    for (key, value) in pairs {
        map.serialize_entry(key, value)?;
    }
    map.end()
}

pub(crate) fn deserialize<'de, D>(deserializer: D) -> Result<Vec<(String, String)>, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_map(PairsVisitor)
}

struct PairsVisitor;

impl<'de> Visitor<'de> for PairsVisitor {
    type Value = Vec<(String, String)>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an object of scalar values")
    }

    fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        let mut pairs = Vec::with_capacity(access.size_hint().unwrap_or(0));
        while let Some((key, value)) = access.next_entry::<String, Value>()? {
            let value = match value {
                Value::String(text) => text,
                Value::Number(number) => number.to_string(),
                Value::Bool(flag) => flag.to_string(),
                other => {
                    return Err(de::Error::custom(format!(
                        "value for `{key}` must be a string, number or boolean, got {other}"
                    )));
                }
            };
            pairs.push((key, value));
        }
        Ok(pairs)
    }
}
