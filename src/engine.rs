//! The aggregation service handed to request handlers.
//!
//! `AggregationEngine` owns only its reducer parameters. Every call derives
//! its answer from the batch passed in, so one instance can be shared by
//! reference for the life of the process.

use tracing::debug;

use crate::aggregate;
use crate::config::EngineConfig;
use crate::filter;
use crate::geo::{self, DistrictCatalog};
use crate::models::{
    CategoricalCounts, DistrictSummary, FilterOptions, FilterSpec, GeoPoint, HeatmapBucket,
    Interval, Overview, RawRow, SignalRecord, Statistics, TimeBucket,
};

/// Category a breakdown groups by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimension {
    Operator,
    NetworkType,
    Device,
}

#[derive(Debug, Clone)]
pub struct AggregationEngine {
    catalog: DistrictCatalog,
    top_districts: usize,
    point_limit: usize,
}

impl Default for AggregationEngine {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

impl AggregationEngine {
    pub fn new(catalog: DistrictCatalog, top_districts: usize, point_limit: usize) -> Self {
        Self {
            catalog,
            top_districts,
            point_limit,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.catalog(), config.top_districts, config.point_limit)
    }

    /// Normalize a fetched batch and narrow it with `spec`, if any.
    pub fn prepare(&self, rows: &[RawRow], spec: Option<&FilterSpec>) -> Vec<SignalRecord> {
        let records = crate::normalize::normalize(rows);
        debug!(raw = rows.len(), valid = records.len(), "normalized batch");

        match spec {
            Some(spec) if !spec.is_empty() => {
                let kept = filter::apply(&records, spec);
                debug!(before = records.len(), after = kept.len(), "applied filter");
                kept
            }
            _ => records,
        }
    }

    pub fn statistics(&self, records: &[SignalRecord]) -> Statistics {
        aggregate::statistics(records)
    }

    pub fn breakdown(&self, records: &[SignalRecord], dimension: Dimension) -> CategoricalCounts {
        match dimension {
            Dimension::Operator => aggregate::by_operator(records),
            Dimension::NetworkType => aggregate::by_network_type(records),
            Dimension::Device => aggregate::by_device(records),
        }
    }

    /// Map points, capped at `limit` or the configured default.
    pub fn points(&self, records: &[SignalRecord], limit: Option<usize>) -> Vec<GeoPoint> {
        aggregate::geo_points(records, limit.unwrap_or(self.point_limit))
    }

    pub fn time_series(&self, records: &[SignalRecord], interval: Interval) -> Vec<TimeBucket> {
        let series = aggregate::time_series(records, interval);
        debug!(
            interval = interval.as_str(),
            buckets = series.len(),
            "built time series"
        );
        series
    }

    pub fn heatmap(&self, records: &[SignalRecord]) -> Vec<HeatmapBucket> {
        geo::heatmap(records)
    }

    pub fn districts(&self, records: &[SignalRecord], top: Option<usize>) -> DistrictSummary {
        let summary =
            geo::virtual_districts(records, &self.catalog, top.unwrap_or(self.top_districts));
        debug!(
            total = summary.total_districts,
            returned = summary.districts.len(),
            "ranked virtual districts"
        );
        summary
    }

    pub fn filter_options(&self, records: &[SignalRecord]) -> FilterOptions {
        aggregate::filter_options(records)
    }

    /// Statistics plus the three categorical breakdowns.
    pub fn overview(&self, records: &[SignalRecord]) -> Overview {
        let statistics = self.statistics(records);

        Overview {
            total_signals: statistics.total_signals,
            average_battery: statistics.average_battery,
            signals_by_company: self.breakdown(records, Dimension::Operator),
            signals_by_type: self.breakdown(records, Dimension::NetworkType),
            signals_by_device: self.breakdown(records, Dimension::Device),
            statistics,
        }
    }
}
