use anyhow::Context;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use tracing::{debug, info};

use crate::models::{FilterSpec, RawRow, SignalRecord};
use crate::normalize::parse_timestamp;

// Stays well under the 65535 bind-parameter ceiling at 11 columns per row.
const INSERT_CHUNK: usize = 1_000;

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<usize> {
    let demo = [
        ("demo-01", "Pixel 7", (-17.783300, -63.182140, 415.5), 0.0, (85, -91), ("ENTEL", "4G"), "2024-05-01T10:15:00Z"),
        ("demo-02", "Galaxy A54", (-17.814600, -63.156100, 420.0), 12.4, (92, -78), ("TIGO", "4G"), "2024-05-01T11:02:00Z"),
        ("demo-03", "Redmi Note 12", (-17.800000, -63.170000, 410.0), 3.1, (67, -104), ("VIVA", "3G"), "2024-05-01T11:47:00Z"),
        ("demo-01", "Pixel 7", (-17.783500, -63.182300, 416.0), 1.2, (83, -88), ("ENTEL", "WiFi"), "2024-05-01T12:30:00Z"),
        ("demo-04", "Moto G84", (-17.761200, -63.197800, 412.3), 0.0, (54, -97), ("TIGO", "3G"), "2024-05-02T08:05:00Z"),
    ];

    let mut records = Vec::with_capacity(demo.len());
    for (device_id, device_name, position, speed, readings, carrier, timestamp) in demo {
        let (latitude, longitude, altitude) = position;
        let (battery, signal) = readings;
        let (sim_operator, network_type) = carrier;

        records.push(SignalRecord {
            id: None,
            device_id: device_id.to_string(),
            device_name: device_name.to_string(),
            latitude,
            longitude,
            altitude,
            speed,
            battery,
            signal,
            sim_operator: sim_operator.to_string(),
            network_type: network_type.to_string(),
            timestamp: Some(timestamp.to_string()),
        });
    }

    import_records(pool, &records).await
}

/// Fetch up to `limit` rows as JSON objects, newest ids last.
///
/// Constraints in `filter` are pushed into the query; callers still run the
/// engine-side filter, which is a no-op on rows that already satisfy it.
pub async fn fetch_raw_rows(
    pool: &PgPool,
    limit: i64,
    filter: &FilterSpec,
) -> anyhow::Result<Vec<RawRow>> {
    let mut query: QueryBuilder<Postgres> = QueryBuilder::new(
        "SELECT to_jsonb(l) AS row FROM signal_analytics.locations l WHERE TRUE",
    );

    if let Some(values) = filter.sim_operators.as_ref().filter(|v| !v.is_empty()) {
        query.push(" AND l.sim_operator = ANY(").push_bind(values.clone()).push(")");
    }
    if let Some(values) = filter.network_types.as_ref().filter(|v| !v.is_empty()) {
        query.push(" AND l.network_type = ANY(").push_bind(values.clone()).push(")");
    }
    if let Some(values) = filter.device_names.as_ref().filter(|v| !v.is_empty()) {
        query.push(" AND l.device_name = ANY(").push_bind(values.clone()).push(")");
    }
    if let Some(from) = filter.from {
        query.push(" AND l.\"timestamp\" >= ").push_bind(from);
    }
    if let Some(to) = filter.to {
        query.push(" AND l.\"timestamp\" <= ").push_bind(to);
    }
    if let Some(min) = filter.battery_min {
        query.push(" AND l.battery >= ").push_bind(min);
    }
    if let Some(min) = filter.signal_min {
        query.push(" AND l.signal >= ").push_bind(min);
    }

    query.push(" ORDER BY l.id LIMIT ").push_bind(limit);

    let rows = query
        .build()
        .fetch_all(pool)
        .await
        .context("failed to fetch signal rows")?;

    let mut raw = Vec::with_capacity(rows.len());
    for row in rows {
        let value: Value = row.try_get("row")?;
        if let Value::Object(map) = value {
            raw.push(map);
        }
    }

    debug!(rows = raw.len(), limit, "fetched raw rows");
    Ok(raw)
}

pub async fn import_records(pool: &PgPool, records: &[SignalRecord]) -> anyhow::Result<usize> {
    let mut inserted = 0usize;

    for chunk in records.chunks(INSERT_CHUNK) {
        let mut query: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO signal_analytics.locations \
             (device_id, device_name, latitude, longitude, altitude, speed, battery, signal, \
              sim_operator, network_type, \"timestamp\") ",
        );

        query.push_values(chunk, |mut row, record| {
            let timestamp: Option<DateTime<Utc>> =
                record.timestamp.as_deref().and_then(parse_timestamp);
            row.push_bind(record.device_id.clone())
                .push_bind(record.device_name.clone())
                .push_bind(record.latitude)
                .push_bind(record.longitude)
                .push_bind(record.altitude)
                .push_bind(record.speed)
                .push_bind(record.battery)
                .push_bind(record.signal)
                .push_bind(record.sim_operator.clone())
                .push_bind(record.network_type.clone())
                .push_bind(timestamp);
        });

        let result = query
            .build()
            .execute(pool)
            .await
            .context("failed to insert signal rows")?;
        inserted += result.rows_affected() as usize;
    }

    info!(inserted, "imported signal records");
    Ok(inserted)
}
