//! Bridge type for the `JSONB` columns (`config`, `metadata`, `payload`,
//! `result`, `enabled_tools`, `roles`, `arg_schema`, `handler_config`).
//!
//! Reads are tolerant: `NULL`, `{}`, a JSON scalar, or malformed content all
//! come back as an empty map rather than an error. Writes are always a
//! valid JSON object — there is no way to construct a `JsonMap` that fails
//! to serialize.

use std::collections::HashMap;
use std::ops::{Deref, DerefMut};

use serde_json::Value;
use sqlx::Database;
use sqlx::postgres::{PgHasArrayType, PgTypeInfo};

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct JsonMap(pub HashMap<String, Value>);

impl JsonMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tolerant parse: anything that isn't a JSON object collapses to empty.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self(map.into_iter().collect()),
            _ => Self::default(),
        }
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0.into_iter().collect())
    }
}

impl Deref for JsonMap {
    type Target = HashMap<String, Value>;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for JsonMap {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl sqlx::Type<sqlx::Postgres> for JsonMap {
    fn type_info() -> PgTypeInfo {
        <Value as sqlx::Type<sqlx::Postgres>>::type_info()
    }
}

impl PgHasArrayType for JsonMap {
    fn array_type_info() -> PgTypeInfo {
        <Value as PgHasArrayType>::array_type_info()
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Postgres> for JsonMap {
    fn encode_by_ref(
        &self,
        buf: &mut <sqlx::Postgres as Database>::ArgumentBuffer<'q>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        let value = Value::Object(self.0.clone().into_iter().collect());
        <Value as sqlx::Encode<'q, sqlx::Postgres>>::encode_by_ref(&value, buf)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Postgres> for JsonMap {
    fn decode(
        value: <sqlx::Postgres as Database>::ValueRef<'r>,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let raw = <Value as sqlx::Decode<'r, sqlx::Postgres>>::decode(value)?;
        Ok(Self::from_value(raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_becomes_empty() {
        assert_eq!(JsonMap::from_value(Value::Null), JsonMap::default());
    }

    #[test]
    fn scalar_becomes_empty() {
        assert_eq!(JsonMap::from_value(Value::Bool(true)), JsonMap::default());
        assert_eq!(JsonMap::from_value(Value::String("oops".into())), JsonMap::default());
    }

    #[test]
    fn object_round_trips() {
        let mut map = JsonMap::new();
        map.insert("a".to_string(), Value::from(1));
        let value = map.clone().into_value();
        assert_eq!(JsonMap::from_value(value), map);
    }

    #[test]
    fn empty_object_is_empty() {
        let map = JsonMap::from_value(serde_json::json!({}));
        assert!(map.is_empty());
    }
}
