use std::fmt::Write;

use crate::models::{CategoricalCounts, DistrictSummary, Interval, Overview, TimeBucket};

const REPORTED_DISTRICTS: usize = 10;

/// Categories ordered by count, largest first; ties alphabetical.
pub fn ranked(counts: &CategoricalCounts) -> Vec<(&str, usize)> {
    let mut entries: Vec<(&str, usize)> = counts
        .iter()
        .map(|(category, count)| (category.as_str(), *count))
        .collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    entries
}

fn share(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 * 100.0 / total as f64
    }
}

fn write_mix(output: &mut String, heading: &str, counts: &CategoricalCounts, total: usize) {
    let _ = writeln!(output);
    let _ = writeln!(output, "## {heading}");

    if counts.is_empty() {
        let _ = writeln!(output, "No labelled signals in this window.");
        return;
    }

    for (category, count) in ranked(counts) {
        let _ = writeln!(
            output,
            "- {}: {} signals ({:.1}%)",
            category,
            count,
            share(count, total)
        );
    }
}

pub fn build_report(
    scope: Option<&str>,
    overview: &Overview,
    interval: Interval,
    series: &[TimeBucket],
    districts: &DistrictSummary,
) -> String {
    let mut output = String::new();
    let scope_label = scope.unwrap_or("all signals");
    let stats = &overview.statistics;

    let _ = writeln!(output, "# Signal Coverage Report");
    let _ = writeln!(output, "Generated for {scope_label}");
    let _ = writeln!(output);
    let _ = writeln!(output, "## Summary");

    if stats.total_signals == 0 {
        let _ = writeln!(output, "No signals recorded for this window.");
        return output;
    }

    let _ = writeln!(output, "- Signals: {}", stats.total_signals);
    let _ = writeln!(
        output,
        "- Battery: avg {:.2} (min {}, max {})",
        stats.average_battery,
        stats.min_battery.unwrap_or_default(),
        stats.max_battery.unwrap_or_default()
    );
    let _ = writeln!(output, "- Signal strength: avg {:.2}", stats.average_signal);
    let _ = writeln!(output, "- Altitude: avg {:.2} m", stats.average_altitude);

    write_mix(
        &mut output,
        "Operator Mix",
        &overview.signals_by_company,
        stats.total_signals,
    );
    write_mix(
        &mut output,
        "Network Mix",
        &overview.signals_by_type,
        stats.total_signals,
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Activity by {}", interval.as_str());

    if series.is_empty() {
        let _ = writeln!(output, "No timestamped signals in this window.");
    } else {
        for bucket in series {
            let _ = writeln!(
                output,
                "- {}: {} signals (avg battery {:.1})",
                bucket.timestamp, bucket.count, bucket.avg_battery
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(
        output,
        "## Busiest Districts ({} found)",
        districts.total_districts
    );

    for district in districts.districts.iter().take(REPORTED_DISTRICTS) {
        let operators = district
            .operators
            .iter()
            .map(|(operator, count)| format!("{operator} {count}"))
            .collect::<Vec<_>>()
            .join(", ");
        let _ = writeln!(
            output,
            "- {}: {} signals, avg signal {:.2}, avg speed {:.2} ({})",
            district.district_id,
            district.total_signals,
            district.avg_signal,
            district.avg_speed,
            operators
        );
    }

    output
}
