//! Serde helpers representing a `Duration` as fractional milliseconds.
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

pub(crate) fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_f64(duration.as_nanos() as f64 / 1_000_000.0)
}

pub(crate) fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let millis = f64::deserialize(deserializer)?;
    if !millis.is_finite() || millis < 0.0 {
        return Err(D::Error::custom(format!(
            "expected a non-negative number of milliseconds, got {millis}"
        )));
    }
    Ok(Duration::from_nanos((millis * 1_000_000.0).round() as u64))
}
