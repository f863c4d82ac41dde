//! Aggregation engine for geotagged mobile-signal telemetry.
//!
//! Raw rows are normalized into [`models::SignalRecord`]s, optionally
//! narrowed by a [`models::FilterSpec`], and reduced into statistics,
//! categorical breakdowns, map points, time series, heatmap buckets and
//! virtual-district rankings. The engine holds no state between calls.

pub mod aggregate;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod filter;
pub mod geo;
pub mod ingest;
pub mod models;
pub mod normalize;
pub mod report;

pub use engine::{AggregationEngine, Dimension};
pub use models::{FilterSpec, RawRow, SignalRecord};
