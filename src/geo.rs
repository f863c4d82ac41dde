//! Spatial bucketing: heatmap cells (3 decimals, ~100 m) and virtual
//! districts (2 decimals, ~1 km).

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::aggregate::mean;
use crate::models::{Coordinates, District, DistrictSummary, HeatmapBucket, SignalRecord};

pub const HEATMAP_PRECISION: u32 = 3;
pub const DISTRICT_PRECISION: u32 = 2;
pub const DEFAULT_TOP_DISTRICTS: usize = 50;

/// Closed label sets tallied per district. Labels outside these sets are
/// not counted anywhere in the per-district breakdowns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistrictCatalog {
    pub operators: Vec<String>,
    pub network_types: Vec<String>,
}

impl Default for DistrictCatalog {
    fn default() -> Self {
        Self {
            operators: ["ENTEL", "TIGO", "VIVA"].map(String::from).to_vec(),
            network_types: ["WiFi", "4G", "3G"].map(String::from).to_vec(),
        }
    }
}

impl DistrictCatalog {
    fn empty_tally(labels: &[String]) -> BTreeMap<String, usize> {
        labels.iter().map(|label| (label.clone(), 0)).collect()
    }
}

/// A coordinate rounded to `precision` decimals. Values too large to scale
/// are already coarser than the grid and pass through unchanged.
fn round_to(value: f64, precision: u32) -> f64 {
    let scale = 10f64.powi(precision as i32);
    let rounded = (value * scale).round() / scale;
    // `+ 0.0` folds -0.0 into 0.0 so both land in one bucket.
    if rounded.is_finite() {
        rounded + 0.0
    } else {
        value + 0.0
    }
}

/// Hashable identity of a rounded coordinate pair.
fn cell_key(lat: f64, lng: f64) -> (u64, u64) {
    (lat.to_bits(), lng.to_bits())
}

/// Renders a coordinate the way the district ids have always looked
/// (`-17.0` rather than `-17`).
fn coordinate_label(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.1}")
    } else {
        format!("{value}")
    }
}

struct HeatmapAccumulator {
    lat: f64,
    lng: f64,
    count: usize,
    signal_total: f64,
    speed_total: f64,
    operator: String,
}

/// One bucket per rounded coordinate pair, in first-seen order.
pub fn heatmap(records: &[SignalRecord]) -> Vec<HeatmapBucket> {
    let mut index: HashMap<(u64, u64), usize> = HashMap::new();
    let mut cells: Vec<HeatmapAccumulator> = Vec::new();

    for record in records {
        let lat = round_to(record.latitude, HEATMAP_PRECISION);
        let lng = round_to(record.longitude, HEATMAP_PRECISION);
        let slot = *index.entry(cell_key(lat, lng)).or_insert_with(|| {
            cells.push(HeatmapAccumulator {
                lat,
                lng,
                count: 0,
                signal_total: 0.0,
                speed_total: 0.0,
                operator: record.sim_operator.clone(),
            });
            cells.len() - 1
        });

        let bucket = &mut cells[slot];
        bucket.count += 1;
        bucket.signal_total += record.signal as f64;
        bucket.speed_total += record.speed;
    }

    cells
        .into_iter()
        .map(|acc| HeatmapBucket {
            lat: acc.lat,
            lng: acc.lng,
            signal: mean(acc.signal_total, acc.count),
            speed: mean(acc.speed_total, acc.count),
            count: acc.count,
            operator: acc.operator,
        })
        .collect()
}

struct DistrictAccumulator {
    district_id: String,
    coordinates: Coordinates,
    count: usize,
    signal_total: f64,
    speed_total: f64,
    operators: BTreeMap<String, usize>,
    network_types: BTreeMap<String, usize>,
}

/// Cluster records into virtual districts and rank them by volume.
///
/// Ties keep first-seen order. `total_districts` counts every district found,
/// not only the `top` returned.
pub fn virtual_districts(
    records: &[SignalRecord],
    catalog: &DistrictCatalog,
    top: usize,
) -> DistrictSummary {
    let mut index: HashMap<(u64, u64), usize> = HashMap::new();
    let mut districts: Vec<DistrictAccumulator> = Vec::new();

    for record in records {
        let lat = round_to(record.latitude, DISTRICT_PRECISION);
        let lng = round_to(record.longitude, DISTRICT_PRECISION);
        let slot = *index.entry(cell_key(lat, lng)).or_insert_with(|| {
            districts.push(DistrictAccumulator {
                district_id: format!("{}_{}", coordinate_label(lat), coordinate_label(lng)),
                coordinates: Coordinates {
                    lat: record.latitude,
                    lng: record.longitude,
                },
                count: 0,
                signal_total: 0.0,
                speed_total: 0.0,
                operators: DistrictCatalog::empty_tally(&catalog.operators),
                network_types: DistrictCatalog::empty_tally(&catalog.network_types),
            });
            districts.len() - 1
        });

        let district = &mut districts[slot];
        district.count += 1;
        district.signal_total += record.signal as f64;
        district.speed_total += record.speed;
        if let Some(tally) = district.operators.get_mut(&record.sim_operator) {
            *tally += 1;
        }
        if let Some(tally) = district.network_types.get_mut(&record.network_type) {
            *tally += 1;
        }
    }

    let total_districts = districts.len();
    districts.sort_by(|a, b| b.count.cmp(&a.count));
    districts.truncate(top);

    DistrictSummary {
        districts: districts
            .into_iter()
            .map(|d| District {
                district_id: d.district_id,
                coordinates: d.coordinates,
                total_signals: d.count,
                avg_signal: mean(d.signal_total, d.count),
                avg_speed: mean(d.speed_total, d.count),
                operators: d.operators,
                network_types: d.network_types,
            })
            .collect(),
        total_districts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn located(lat: f64, lng: f64, operator: &str, network: &str) -> SignalRecord {
        SignalRecord {
            id: None,
            device_id: "dev-1".to_string(),
            device_name: "Moto G".to_string(),
            latitude: lat,
            longitude: lng,
            altitude: 0.0,
            speed: 2.0,
            battery: 70,
            signal: -80,
            sim_operator: operator.to_string(),
            network_type: network.to_string(),
            timestamp: None,
        }
    }

    #[test]
    fn heatmap_merges_nearby_points() {
        let mut records = vec![
            located(-17.7833001, -63.1821401, "ENTEL", "4G"),
            located(-17.7833004, -63.1821403, "TIGO", "4G"),
        ];
        records[1].signal = -90;
        records[1].speed = 3.0;

        let buckets = heatmap(&records);
        assert_eq!(buckets.len(), 1);
        let bucket = &buckets[0];
        assert_eq!(bucket.count, 2);
        assert_eq!(bucket.lat, -17.783);
        assert_eq!(bucket.lng, -63.182);
        assert_eq!(bucket.signal, -85.0);
        assert_eq!(bucket.speed, 2.5);
        assert_eq!(bucket.operator, "ENTEL");
    }

    #[test]
    fn heatmap_counts_identical_cells() {
        let records: Vec<SignalRecord> = (0..5)
            .map(|_| located(-17.8, -63.15, "VIVA", "3G"))
            .chain(std::iter::once(located(-17.9, -63.15, "VIVA", "3G")))
            .collect();

        let buckets = heatmap(&records);
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].count, 5);
        assert_eq!(buckets[1].count, 1);
        assert!(heatmap(&[]).is_empty());
    }

    #[test]
    fn far_apart_large_coordinates_stay_separate() {
        let records = vec![
            located(1e20, 0.0, "ENTEL", "4G"),
            located(5e20, 0.0, "ENTEL", "4G"),
            located(1e308, -1e308, "TIGO", "3G"),
        ];

        let buckets = heatmap(&records);
        assert_eq!(buckets.len(), 3);
        assert!((buckets[0].lat - 1e20).abs() <= 1e20 * 1e-12);
        assert!((buckets[1].lat - 5e20).abs() <= 5e20 * 1e-12);
        assert_eq!(buckets[2].lat, 1e308);
        assert_eq!(buckets[2].lng, -1e308);

        let summary = virtual_districts(&records, &DistrictCatalog::default(), 50);
        assert_eq!(summary.total_districts, 3);
    }

    #[test]
    fn signed_zero_shares_a_bucket() {
        let records = vec![
            located(0.0001, -0.0001, "ENTEL", "4G"),
            located(-0.0001, 0.0001, "ENTEL", "4G"),
        ];

        let buckets = heatmap(&records);
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].count, 2);
        assert_eq!(buckets[0].lat.to_bits(), 0.0f64.to_bits());

        let summary = virtual_districts(&records, &DistrictCatalog::default(), 50);
        assert_eq!(summary.districts[0].district_id, "0.0_0.0");
    }

    #[test]
    fn extreme_signals_do_not_overflow() {
        let mut records = vec![
            located(-17.78, -63.18, "ENTEL", "4G"),
            located(-17.78, -63.18, "ENTEL", "4G"),
        ];
        for record in &mut records {
            record.signal = 9_000_000_000_000_000_000;
        }

        let buckets = heatmap(&records);
        assert_eq!(buckets[0].signal, 9e18);

        let summary = virtual_districts(&records, &DistrictCatalog::default(), 50);
        assert_eq!(summary.districts[0].avg_signal, 9e18);
    }

    #[test]
    fn districts_tally_only_catalog_labels() {
        let records = vec![
            located(-17.781, -63.181, "ENTEL", "4G"),
            located(-17.782, -63.182, "TIGO", "WiFi"),
            located(-17.783, -63.183, "NuevaTel", "5G"),
        ];

        let summary = virtual_districts(&records, &DistrictCatalog::default(), 50);
        assert_eq!(summary.total_districts, 1);
        let district = &summary.districts[0];
        assert_eq!(district.district_id, "-17.78_-63.18");
        assert_eq!(district.total_signals, 3);
        assert_eq!(district.coordinates.lat, -17.781);
        assert_eq!(district.operators["ENTEL"], 1);
        assert_eq!(district.operators["TIGO"], 1);
        assert_eq!(district.operators["VIVA"], 0);
        assert_eq!(district.operators.values().sum::<usize>(), 2);
        assert_eq!(district.network_types["4G"], 1);
        assert_eq!(district.network_types["WiFi"], 1);
        assert_eq!(district.network_types["3G"], 0);
        assert!(!district.network_types.contains_key("5G"));
    }

    #[test]
    fn districts_are_ranked_and_capped() {
        let mut records = Vec::new();
        for i in 0..60 {
            let lat = -17.0 - i as f64 * 0.1;
            for _ in 0..(i % 4 + 1) {
                records.push(located(lat, -63.0, "ENTEL", "4G"));
            }
        }

        let summary = virtual_districts(&records, &DistrictCatalog::default(), DEFAULT_TOP_DISTRICTS);
        assert_eq!(summary.total_districts, 60);
        assert_eq!(summary.districts.len(), 50);
        assert!(summary.total_districts >= summary.districts.len());
        assert!(summary
            .districts
            .windows(2)
            .all(|pair| pair[0].total_signals >= pair[1].total_signals));
        assert_eq!(summary.districts[0].total_signals, 4);
        assert_eq!(summary.districts[0].district_id, "-17.3_-63.0");
    }

    #[test]
    fn custom_catalog_changes_tallies() {
        let catalog = DistrictCatalog {
            operators: vec!["NuevaTel".to_string()],
            network_types: vec!["5G".to_string()],
        };
        let records = vec![located(-17.78, -63.18, "NuevaTel", "5G")];

        let summary = virtual_districts(&records, &catalog, 10);
        let district = &summary.districts[0];
        assert_eq!(district.operators.len(), 1);
        assert_eq!(district.operators["NuevaTel"], 1);
        assert_eq!(district.network_types["5G"], 1);
    }

    #[test]
    fn empty_batch_has_no_districts() {
        let summary = virtual_districts(&[], &DistrictCatalog::default(), 50);
        assert!(summary.districts.is_empty());
        assert_eq!(summary.total_districts, 0);
    }
}
