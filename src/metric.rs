//! Metric data as it travels to the backend.
//!
//! Field names serialize in the backend's PascalCase (`MetricName`,
//! `Dimensions`, `Unit`, ...) and `Timestamp` as fractional epoch seconds,
//! which is how the backend's JSON protocol encodes time. Build a datum with [`MetricDatum::new`] and
//! chain dimensions onto it:
//!
//! ```rust
//! use latencywatch::metric::{MetricDatum, Unit};
//!
//! let datum = MetricDatum::new("CacheHits", 3.0, Unit::Count)
//!     .with_dimension("Route", "/users/{id}");
//! assert_eq!(datum.dimensions.len(), 1);
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A labeled key/value attached to a datum.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Dimension {
    pub name: String,
    pub value: String,
}

impl Dimension {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self { name: name.into(), value: value.into() }
    }
}

/// One named, timestamped, unit-labeled observation.
///
/// Dimension order is kept for the wire, but two data compare equal
/// regardless of the order their dimensions were added in.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MetricDatum {
    pub metric_name: String,
    pub dimensions: Vec<Dimension>,
    #[serde(with = "epoch_seconds")]
    pub timestamp: DateTime<Utc>,
    pub unit: Unit,
    pub value: f64,
}

impl MetricDatum {
    /// A datum stamped with the current time and no dimensions.
    pub fn new(name: impl Into<String>, value: f64, unit: Unit) -> Self {
        Self {
            metric_name: name.into(),
            dimensions: Vec::new(),
            timestamp: Utc::now(),
            unit,
            value,
        }
    }

    pub fn with_dimension(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.dimensions.push(Dimension::new(name, value));
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Looks up a dimension value by name.
    pub fn dimension(&self, name: &str) -> Option<&str> {
        self.dimensions.iter()
            .find(|d| d.name == name)
            .map(|d| d.value.as_str())
    }
}

impl PartialEq for MetricDatum {
    fn eq(&self, other: &Self) -> bool {
        self.metric_name == other.metric_name
            && self.timestamp == other.timestamp
            && self.unit == other.unit
            && self.value == other.value
            && self.dimensions.len() == other.dimensions.len()
            && self.dimensions.iter().all(|d| other.dimensions.contains(d))
    }
}

mod epoch_seconds {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer, de};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        let secs = ts.timestamp() as f64 + f64::from(ts.timestamp_subsec_nanos()) / 1e9;
        serializer.serialize_f64(secs)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        if !secs.is_finite() {
            return Err(de::Error::custom("timestamp is not a finite number"));
        }
        let whole = secs.floor();
        let nanos = (((secs - whole) * 1e9).round() as u32).min(999_999_999);
        DateTime::from_timestamp(whole as i64, nanos)
            .ok_or_else(|| de::Error::custom(format!("timestamp {secs} out of range")))
    }
}

/// The backend's standard units.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Unit {
    // Time ─────────────────────────────────────────────────────────────────────
    Seconds,
    Microseconds,
    Milliseconds,
    // Size ─────────────────────────────────────────────────────────────────────
    Bytes,
    Kilobytes,
    Megabytes,
    Gigabytes,
    Terabytes,
    Bits,
    Kilobits,
    Megabits,
    Gigabits,
    Terabits,
    Percent,
    Count,
    // Rates ────────────────────────────────────────────────────────────────────
    #[serde(rename = "Bytes/Second")]
    BytesPerSecond,
    #[serde(rename = "Kilobytes/Second")]
    KilobytesPerSecond,
    #[serde(rename = "Megabytes/Second")]
    MegabytesPerSecond,
    #[serde(rename = "Gigabytes/Second")]
    GigabytesPerSecond,
    #[serde(rename = "Terabytes/Second")]
    TerabytesPerSecond,
    #[serde(rename = "Bits/Second")]
    BitsPerSecond,
    #[serde(rename = "Kilobits/Second")]
    KilobitsPerSecond,
    #[serde(rename = "Megabits/Second")]
    MegabitsPerSecond,
    #[serde(rename = "Gigabits/Second")]
    GigabitsPerSecond,
    #[serde(rename = "Terabits/Second")]
    TerabitsPerSecond,
    #[serde(rename = "Count/Second")]
    CountPerSecond,
    None,
}

impl Unit {
    /// Returns the backend's spelling (e.g. `"Count/Second"`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Seconds            => "Seconds",
            Self::Microseconds       => "Microseconds",
            Self::Milliseconds       => "Milliseconds",
            Self::Bytes              => "Bytes",
            Self::Kilobytes          => "Kilobytes",
            Self::Megabytes          => "Megabytes",
            Self::Gigabytes          => "Gigabytes",
            Self::Terabytes          => "Terabytes",
            Self::Bits               => "Bits",
            Self::Kilobits           => "Kilobits",
            Self::Megabits           => "Megabits",
            Self::Gigabits           => "Gigabits",
            Self::Terabits           => "Terabits",
            Self::Percent            => "Percent",
            Self::Count              => "Count",
            Self::BytesPerSecond     => "Bytes/Second",
            Self::KilobytesPerSecond => "Kilobytes/Second",
            Self::MegabytesPerSecond => "Megabytes/Second",
            Self::GigabytesPerSecond => "Gigabytes/Second",
            Self::TerabytesPerSecond => "Terabytes/Second",
            Self::BitsPerSecond      => "Bits/Second",
            Self::KilobitsPerSecond  => "Kilobits/Second",
            Self::MegabitsPerSecond  => "Megabits/Second",
            Self::GigabitsPerSecond  => "Gigabits/Second",
            Self::TerabitsPerSecond  => "Terabits/Second",
            Self::CountPerSecond     => "Count/Second",
            Self::None               => "None",
        }
    }
}

impl std::fmt::Display for Unit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
