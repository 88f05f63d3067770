//! Request body model of a health export.

use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

/// One data record: field name to untyped JSON value.
pub type DataRecord = Map<String, Value>;

// Exports may carry `null` wherever a value is missing; it is treated like an
// absent key, and `null` list elements are dropped.

#[derive(Debug, Deserialize, Default)]
pub struct Payload {
    #[serde(default, deserialize_with = "null_as_default")]
    pub data: PayloadData,
}

#[derive(Debug, Deserialize, Default)]
pub struct PayloadData {
    // Not transcoded yet, only counted
    #[serde(default, deserialize_with = "non_null_elements")]
    pub workouts: Vec<Value>,
    #[serde(default, deserialize_with = "non_null_elements")]
    pub metrics: Vec<Metric>,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct Metric {
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub units: String,
    #[serde(default, deserialize_with = "non_null_elements")]
    pub data: Vec<DataRecord>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn non_null_elements<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    let items: Option<Vec<Option<T>>> = Option::deserialize(deserializer)?;
    Ok(items.unwrap_or_default().into_iter().flatten().collect())
}
