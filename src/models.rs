use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Placeholder substituted for missing categorical values.
pub const UNKNOWN: &str = "Unknown";

/// An untyped row as delivered by the store or by CSV ingestion.
pub type RawRow = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignalRecord {
    pub id: Option<i64>,
    pub device_id: String,
    pub device_name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub speed: f64,
    pub battery: i64,
    pub signal: i64,
    pub sim_operator: String,
    pub network_type: String,
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterSpec {
    #[serde(default)]
    pub sim_operators: Option<Vec<String>>,
    #[serde(default)]
    pub network_types: Option<Vec<String>>,
    #[serde(default)]
    pub device_names: Option<Vec<String>>,
    #[serde(default)]
    pub from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub to: Option<DateTime<Utc>>,
    #[serde(default)]
    pub battery_min: Option<i64>,
    #[serde(default)]
    pub signal_min: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Interval {
    #[default]
    Hour,
    Day,
}

impl Interval {
    /// Only the exact text `day` buckets by day; anything else is hourly.
    pub fn parse(value: &str) -> Self {
        match value {
            "day" => Interval::Day,
            _ => Interval::Hour,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Interval::Hour => "hour",
            Interval::Day => "day",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statistics {
    pub total_signals: usize,
    pub average_battery: f64,
    pub min_battery: Option<i64>,
    pub max_battery: Option<i64>,
    pub average_signal: f64,
    pub average_altitude: f64,
}

pub type CategoricalCounts = BTreeMap<String, usize>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
    pub network_type: String,
    pub sim_operator: String,
    pub battery: i64,
    pub device_name: String,
    pub signal: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeBucket {
    pub timestamp: String,
    pub count: usize,
    pub avg_battery: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeatmapBucket {
    pub lat: f64,
    pub lng: f64,
    pub signal: f64,
    pub speed: f64,
    pub count: usize,
    pub operator: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct District {
    pub district_id: String,
    pub coordinates: Coordinates,
    pub total_signals: usize,
    pub avg_signal: f64,
    pub avg_speed: f64,
    pub operators: BTreeMap<String, usize>,
    pub network_types: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistrictSummary {
    pub districts: Vec<District>,
    pub total_districts: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FilterOptions {
    pub sim_operators: Vec<String>,
    pub network_types: Vec<String>,
    pub device_names: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Overview {
    pub total_signals: usize,
    pub average_battery: f64,
    pub signals_by_company: CategoricalCounts,
    pub signals_by_type: CategoricalCounts,
    pub signals_by_device: CategoricalCounts,
    pub statistics: Statistics,
}
