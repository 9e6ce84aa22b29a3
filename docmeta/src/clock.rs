//! Upload timestamps.

use chrono::{DateTime, NaiveDateTime, Utc};
use std::sync::atomic::{AtomicI64, Ordering};

/// Wall clock that never goes backwards within the process.
///
/// If the system clock steps back, timestamps hold at the latest value handed out until real
/// time catches up again.
#[derive(Debug, Default)]
pub struct UploadClock {
    last_micros: AtomicI64,
}

impl UploadClock {
    pub fn now(&self) -> NaiveDateTime {
        self.observe(Utc::now().timestamp_micros())
    }

    fn observe(&self, micros: i64) -> NaiveDateTime {
        let previous = self.last_micros.fetch_max(micros, Ordering::AcqRel);
        let micros = previous.max(micros);
        DateTime::from_timestamp_micros(micros)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
            .naive_utc()
    }
}

/// Serde format for upload timestamps: ISO-8601, UTC without offset, microsecond precision
/// (`2024-01-15T10:30:00.123456`).
pub mod iso_micros {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

    pub fn serialize<S: Serializer>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&value.format(FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&raw, FORMAT).map_err(serde::de::Error::custom)
    }
}
