//! Scalar, categorical and temporal reducers.
//!
//! Every reducer is total: an empty slice yields zeroed statistics or empty
//! collections, never an error.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, SecondsFormat, Timelike, Utc};

use crate::models::{
    CategoricalCounts, FilterOptions, GeoPoint, Interval, SignalRecord, Statistics, TimeBucket,
    UNKNOWN,
};
use crate::normalize::parse_timestamp;

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub(crate) fn mean(total: f64, count: usize) -> f64 {
    if count == 0 {
        0.0
    } else {
        round2(total / count as f64)
    }
}

pub fn statistics(records: &[SignalRecord]) -> Statistics {
    let total = records.len();
    // Integer readings are summed as floats so extreme values cannot overflow.
    let battery_sum: f64 = records.iter().map(|r| r.battery as f64).sum();
    let signal_sum: f64 = records.iter().map(|r| r.signal as f64).sum();
    let altitude_sum: f64 = records.iter().map(|r| r.altitude).sum();

    Statistics {
        total_signals: total,
        average_battery: mean(battery_sum, total),
        min_battery: records.iter().map(|r| r.battery).min(),
        max_battery: records.iter().map(|r| r.battery).max(),
        average_signal: mean(signal_sum, total),
        average_altitude: mean(altitude_sum, total),
    }
}

/// Categories that are dropped from breakdowns instead of being tallied.
pub fn is_placeholder(value: &str) -> bool {
    value.is_empty() || value == UNKNOWN
}

/// Count records per category. Placeholder categories are left out, so the
/// counts sum to less than the record count whenever one is present.
pub fn count_by<F>(records: &[SignalRecord], key: F) -> CategoricalCounts
where
    F: Fn(&SignalRecord) -> &str,
{
    let mut counts = CategoricalCounts::new();

    for record in records {
        let category = key(record);
        if is_placeholder(category) {
            continue;
        }
        *counts.entry(category.to_string()).or_default() += 1;
    }

    counts
}

pub fn by_operator(records: &[SignalRecord]) -> CategoricalCounts {
    count_by(records, |r| r.sim_operator.as_str())
}

pub fn by_network_type(records: &[SignalRecord]) -> CategoricalCounts {
    count_by(records, |r| r.network_type.as_str())
}

pub fn by_device(records: &[SignalRecord]) -> CategoricalCounts {
    count_by(records, |r| r.device_name.as_str())
}

/// The first `limit` records projected for map rendering.
pub fn geo_points(records: &[SignalRecord], limit: usize) -> Vec<GeoPoint> {
    records
        .iter()
        .take(limit)
        .map(|r| GeoPoint {
            lat: r.latitude,
            lng: r.longitude,
            network_type: r.network_type.clone(),
            sim_operator: r.sim_operator.clone(),
            battery: r.battery,
            device_name: r.device_name.clone(),
            signal: r.signal,
        })
        .collect()
}

pub fn truncate_to(instant: DateTime<Utc>, interval: Interval) -> Option<DateTime<Utc>> {
    let hour = match interval {
        Interval::Hour => instant.hour(),
        Interval::Day => 0,
    };

    instant
        .date_naive()
        .and_hms_opt(hour, 0, 0)
        .map(|bucket| bucket.and_utc())
}

/// Count and average battery per time bucket, oldest bucket first. Records
/// whose timestamp does not parse are skipped.
pub fn time_series(records: &[SignalRecord], interval: Interval) -> Vec<TimeBucket> {
    let mut buckets: BTreeMap<DateTime<Utc>, (usize, f64)> = BTreeMap::new();

    for record in records {
        let Some(bucket) = record
            .timestamp
            .as_deref()
            .and_then(parse_timestamp)
            .and_then(|instant| truncate_to(instant, interval))
        else {
            continue;
        };

        let entry = buckets.entry(bucket).or_insert((0, 0.0));
        entry.0 += 1;
        entry.1 += record.battery as f64;
    }

    buckets
        .into_iter()
        .map(|(bucket, (count, battery_total))| TimeBucket {
            timestamp: bucket.to_rfc3339_opts(SecondsFormat::Secs, true),
            count,
            avg_battery: mean(battery_total, count),
        })
        .collect()
}

/// Distinct category values available for filtering, sorted.
pub fn filter_options(records: &[SignalRecord]) -> FilterOptions {
    fn distinct<'a>(values: impl Iterator<Item = &'a str>) -> Vec<String> {
        values
            .filter(|value| !is_placeholder(value))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    FilterOptions {
        sim_operators: distinct(records.iter().map(|r| r.sim_operator.as_str())),
        network_types: distinct(records.iter().map(|r| r.network_type.as_str())),
        device_names: distinct(records.iter().map(|r| r.device_name.as_str())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record(operator: &str, battery: i64, timestamp: Option<&str>) -> SignalRecord {
        SignalRecord {
            id: None,
            device_id: "dev-1".to_string(),
            device_name: "Galaxy A54".to_string(),
            latitude: -17.7833,
            longitude: -63.1821,
            altitude: 410.0,
            speed: 1.5,
            battery,
            signal: -85,
            sim_operator: operator.to_string(),
            network_type: "4G".to_string(),
            timestamp: timestamp.map(str::to_string),
        }
    }

    #[test]
    fn statistics_of_empty_batch_are_zero() {
        let stats = statistics(&[]);
        assert_eq!(stats.total_signals, 0);
        assert_eq!(stats.average_battery, 0.0);
        assert_eq!(stats.min_battery, None);
        assert_eq!(stats.max_battery, None);
        assert_eq!(stats.average_signal, 0.0);
        assert_eq!(stats.average_altitude, 0.0);
    }

    #[test]
    fn statistics_round_to_two_decimals() {
        let mut records = vec![
            sample_record("ENTEL", 80, None),
            sample_record("ENTEL", 81, None),
            sample_record("TIGO", 81, None),
        ];
        records[2].altitude = 411.0;

        let stats = statistics(&records);
        assert_eq!(stats.total_signals, 3);
        assert_eq!(stats.average_battery, 80.67);
        assert_eq!(stats.min_battery, Some(80));
        assert_eq!(stats.max_battery, Some(81));
        assert_eq!(stats.average_signal, -85.0);
        assert_eq!(stats.average_altitude, 410.33);
    }

    #[test]
    fn extreme_readings_do_not_overflow() {
        let mut records = vec![
            sample_record("ENTEL", 9_000_000_000_000_000_000, Some("2024-05-01T08:00:00Z")),
            sample_record("ENTEL", 9_000_000_000_000_000_000, Some("2024-05-01T08:30:00Z")),
        ];
        records[0].signal = i64::MAX;
        records[1].signal = i64::MAX;

        let stats = statistics(&records);
        assert_eq!(stats.average_battery, 9e18);
        assert!(stats.average_signal > 9e18);

        let series = time_series(&records, Interval::Hour);
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].avg_battery, 9e18);
    }

    #[test]
    fn counts_by_operator() {
        let records = vec![
            sample_record("ENTEL", 50, None),
            sample_record("ENTEL", 60, None),
            sample_record("TIGO", 70, None),
        ];

        let counts = by_operator(&records);
        assert_eq!(counts.len(), 2);
        assert_eq!(counts["ENTEL"], 2);
        assert_eq!(counts["TIGO"], 1);
    }

    #[test]
    fn unknown_categories_are_not_counted() {
        let records = vec![
            sample_record("ENTEL", 50, None),
            sample_record(UNKNOWN, 60, None),
        ];

        let counts = by_operator(&records);
        assert_eq!(counts.get(UNKNOWN), None);
        assert!(counts.values().sum::<usize>() < records.len());
    }

    #[test]
    fn geo_points_keep_input_order_and_values() {
        let mut records = vec![
            sample_record("ENTEL", 50, None),
            sample_record("TIGO", 60, None),
            sample_record("VIVA", 70, None),
        ];
        records[1].latitude = -17.123456789;

        let points = geo_points(&records, 2);
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].sim_operator, "ENTEL");
        assert_eq!(points[1].lat, -17.123456789);
        assert_eq!(points[1].battery, 60);
        assert_eq!(points[1].signal, -85);
        assert!(geo_points(&[], 10).is_empty());
    }

    #[test]
    fn daily_series_merges_same_day() {
        let records = vec![
            sample_record("ENTEL", 50, Some("2024-05-01T08:10:00Z")),
            sample_record("TIGO", 71, Some("2024-05-01T17:45:00Z")),
        ];

        let series = time_series(&records, Interval::Day);
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].count, 2);
        assert_eq!(series[0].avg_battery, 60.5);
        assert_eq!(series[0].timestamp, "2024-05-01T00:00:00Z");
    }

    #[test]
    fn hourly_series_is_sorted_and_skips_bad_timestamps() {
        let records = vec![
            sample_record("ENTEL", 50, Some("2024-05-01T17:45:00Z")),
            sample_record("TIGO", 70, Some("2024-05-01T08:10:00Z")),
            sample_record("VIVA", 90, Some("unknown")),
            sample_record("VIVA", 90, None),
        ];

        let series = time_series(&records, Interval::parse("fortnight"));
        let stamps: Vec<&str> = series.iter().map(|b| b.timestamp.as_str()).collect();
        assert_eq!(stamps, vec!["2024-05-01T08:00:00Z", "2024-05-01T17:00:00Z"]);
        assert_eq!(series.iter().map(|b| b.count).sum::<usize>(), 2);
    }

    #[test]
    fn only_exact_day_selects_daily_buckets() {
        let records = vec![
            sample_record("ENTEL", 50, Some("2024-05-01T08:10:00Z")),
            sample_record("TIGO", 70, Some("2024-05-01T17:45:00Z")),
        ];

        assert_eq!(Interval::parse("day"), Interval::Day);
        for interval in ["DAY", " day ", "Day", "week", ""] {
            assert_eq!(Interval::parse(interval), Interval::Hour);
            assert_eq!(time_series(&records, Interval::parse(interval)).len(), 2);
        }
    }

    #[test]
    fn filter_options_are_sorted_and_exclude_unknown() {
        let records = vec![
            sample_record("VIVA", 50, None),
            sample_record("ENTEL", 50, None),
            sample_record(UNKNOWN, 50, None),
            sample_record("ENTEL", 50, None),
        ];

        let options = filter_options(&records);
        assert_eq!(options.sim_operators, vec!["ENTEL", "VIVA"]);
        assert_eq!(options.network_types, vec!["4G"]);
        assert_eq!(options.device_names, vec!["Galaxy A54"]);
    }
}
