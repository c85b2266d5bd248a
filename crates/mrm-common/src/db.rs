//! Serde helpers for decibel values that may be `-inf`.
//!
//! A link without any path has no signal, which is `-inf` dB. JSON has no
//! infinities, so such values are written as `null` and read back as
//! `-inf`. Use with `#[serde(with = "mrm_common::db")]`, or
//! `mrm_common::db::seq` for a `Vec<f64>`.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

fn to_option(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}

fn from_option(value: Option<f64>) -> f64 {
    value.unwrap_or(f64::NEG_INFINITY)
}

pub fn serialize<S>(value: &f64, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    to_option(*value).serialize(serializer)
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<f64>::deserialize(deserializer).map(from_option)
}

pub mod seq {
    use super::{from_option, to_option};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(values: &[f64], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_seq(values.iter().map(|v| to_option(*v)))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<f64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let values: Vec<Option<f64>> = Vec::deserialize(deserializer)?;
        Ok(values.into_iter().map(from_option).collect())
    }
}
