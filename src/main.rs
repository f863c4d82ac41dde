use std::path::PathBuf;

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use serde_json::json;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use signal_analytics::config::{Config, DEFAULT_CONFIG_FILE};
use signal_analytics::models::{Interval, RawRow};
use signal_analytics::{db, ingest, normalize, report};
use signal_analytics::{AggregationEngine, Dimension, FilterSpec, SignalRecord};

#[derive(Parser)]
#[command(name = "signal-analytics")]
#[command(about = "Aggregate geotagged mobile signal measurements", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalArgs,

    #[command(flatten)]
    filter: FilterArgs,
}

#[derive(Args, Debug)]
struct GlobalArgs {
    /// Configuration file (defaults to ./signal-analytics.toml when present)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Read signals from a CSV export instead of the database
    #[arg(long, global = true, value_name = "FILE")]
    csv: Option<PathBuf>,

    #[arg(long, global = true, env = "DATABASE_URL", hide_env_values = true)]
    database_url: Option<String>,

    /// Maximum rows fetched from the database
    #[arg(long, global = true)]
    fetch_limit: Option<i64>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Args, Debug, Default)]
struct FilterArgs {
    /// Keep only these SIM operators (repeatable)
    #[arg(long = "operator", global = true)]
    operators: Vec<String>,

    /// Keep only these network types (repeatable)
    #[arg(long = "network-type", global = true)]
    network_types: Vec<String>,

    /// Keep only these device names (repeatable)
    #[arg(long = "device", global = true)]
    devices: Vec<String>,

    /// Earliest timestamp, RFC 3339
    #[arg(long, global = true)]
    from: Option<DateTime<Utc>>,

    /// Latest timestamp, RFC 3339
    #[arg(long, global = true)]
    to: Option<DateTime<Utc>>,

    #[arg(long, global = true)]
    battery_min: Option<i64>,

    #[arg(long, global = true, allow_hyphen_values = true)]
    signal_min: Option<i64>,

    /// JSON filter document; flags given alongside it take precedence
    #[arg(long, global = true, value_name = "FILE")]
    filter_file: Option<PathBuf>,
}

impl FilterArgs {
    fn into_spec(self) -> anyhow::Result<FilterSpec> {
        let mut spec = match &self.filter_file {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read filter file {}", path.display()))?;
                serde_json::from_str(&content)
                    .with_context(|| format!("invalid filter file {}", path.display()))?
            }
            None => FilterSpec::default(),
        };

        let non_empty = |values: Vec<String>| (!values.is_empty()).then_some(values);
        if let Some(values) = non_empty(self.operators) {
            spec.sim_operators = Some(values);
        }
        if let Some(values) = non_empty(self.network_types) {
            spec.network_types = Some(values);
        }
        if let Some(values) = non_empty(self.devices) {
            spec.device_names = Some(values);
        }
        spec.from = self.from.or(spec.from);
        spec.to = self.to.or(spec.to);
        spec.battery_min = self.battery_min.or(spec.battery_min);
        spec.signal_min = self.signal_min.or(spec.signal_min);

        spec.validate()?;
        Ok(spec)
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum BreakdownBy {
    Operator,
    Network,
    Device,
}

impl From<BreakdownBy> for Dimension {
    fn from(value: BreakdownBy) -> Self {
        match value {
            BreakdownBy::Operator => Dimension::Operator,
            BreakdownBy::Network => Dimension::NetworkType,
            BreakdownBy::Device => Dimension::Device,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    InitConfig,
    /// Create or upgrade the database schema
    InitDb,
    /// Load demonstration signals
    Seed,
    /// Import signals from a CSV file into the database
    Import { file: PathBuf },
    #[command(flatten)]
    Analysis(AnalysisCommand),
}

#[derive(Subcommand)]
enum AnalysisCommand {
    /// Summary statistics plus operator, network and device counts
    Overview,
    /// Count signals per category
    Breakdown {
        #[arg(long, value_enum, default_value_t = BreakdownBy::Operator)]
        by: BreakdownBy,
    },
    /// Points for map rendering
    Points {
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Signal counts and battery per hour or day
    Timeseries {
        #[arg(long, default_value = "hour")]
        interval: String,
    },
    /// Signal and speed heatmap buckets (~100 m)
    Heatmap,
    /// Rank virtual districts (~1 km) by signal volume
    Districts {
        #[arg(long)]
        top: Option<usize>,
    },
    /// Distinct operators, network types and devices
    FilterOptions,
    /// Generate a markdown report
    Report {
        #[arg(long, default_value = "day")]
        interval: String,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

#[derive(Serialize)]
struct Envelope<T: Serialize> {
    success: bool,
    data: T,
}

fn emit<T: Serialize>(data: T) -> anyhow::Result<()> {
    let body = serde_json::to_string_pretty(&Envelope {
        success: true,
        data,
    })?;
    println!("{body}");
    Ok(())
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.global.verbose);

    if let Err(err) = run(cli).await {
        error!("{err:#}");
        println!(
            "{}",
            json!({ "success": false, "error": format!("{err:#}") })
        );
        std::process::exit(1);
    }

    Ok(())
}

fn load_config(global: &GlobalArgs) -> anyhow::Result<Config> {
    let mut config = match &global.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?.unwrap_or_default(),
    };

    if let Some(url) = &global.database_url {
        config.store.database_url = Some(url.clone());
    }
    if let Some(limit) = global.fetch_limit {
        config.store.fetch_limit = limit;
    }

    Ok(config)
}

async fn connect(config: &Config) -> anyhow::Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(config.store.max_connections)
        .connect(config.database_url()?)
        .await
        .context("failed to connect to Postgres")
}

async fn fetch_rows(
    csv: Option<&PathBuf>,
    config: &Config,
    filter: &FilterSpec,
) -> anyhow::Result<Vec<RawRow>> {
    match csv {
        Some(path) => {
            let rows = ingest::read_csv_file(path)?;
            info!(rows = rows.len(), path = %path.display(), "loaded CSV");
            Ok(rows)
        }
        None => {
            let pool = connect(config).await?;
            db::fetch_raw_rows(&pool, config.store.fetch_limit, filter).await
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::InitConfig => init_config(cli.global.config),
        Commands::InitDb => {
            let config = load_config(&cli.global)?;
            let pool = connect(&config).await?;
            db::init_db(&pool).await?;
            emit(json!({ "schema": "ready" }))
        }
        Commands::Seed => {
            let config = load_config(&cli.global)?;
            let pool = connect(&config).await?;
            let inserted = db::seed(&pool).await?;
            emit(json!({ "inserted": inserted }))
        }
        Commands::Import { file } => {
            let config = load_config(&cli.global)?;
            let rows = ingest::read_csv_file(&file)?;
            let records = normalize::normalize(&rows);
            info!(
                rows = rows.len(),
                valid = records.len(),
                "importing {}",
                file.display()
            );
            let pool = connect(&config).await?;
            let inserted = db::import_records(&pool, &records).await?;
            emit(json!({ "inserted": inserted, "skipped": rows.len() - records.len() }))
        }
        Commands::Analysis(command) => {
            let config = load_config(&cli.global)?;
            let engine = AggregationEngine::from_config(&config.engine);
            let scope = describe_scope(&cli.filter);
            let filter = cli.filter.into_spec()?;
            let rows = fetch_rows(cli.global.csv.as_ref(), &config, &filter).await?;
            let records = engine.prepare(&rows, Some(&filter));

            analyze(&engine, command, &records, scope.as_deref())
        }
    }
}

fn init_config(path: Option<PathBuf>) -> anyhow::Result<()> {
    let path = path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
    if path.exists() {
        anyhow::bail!("{} already exists", path.display());
    }

    std::fs::write(&path, Config::default_toml()?)
        .with_context(|| format!("failed to write {}", path.display()))?;
    info!("wrote {}", path.display());
    emit(json!({ "config": path.display().to_string() }))
}

fn analyze(
    engine: &AggregationEngine,
    command: AnalysisCommand,
    records: &[SignalRecord],
    scope: Option<&str>,
) -> anyhow::Result<()> {
    match command {
        AnalysisCommand::Overview => emit(engine.overview(records)),
        AnalysisCommand::Breakdown { by } => emit(engine.breakdown(records, by.into())),
        AnalysisCommand::Points { limit } => {
            let points = engine.points(records, limit);
            emit(json!({ "count": points.len(), "points": points }))
        }
        AnalysisCommand::Timeseries { interval } => {
            let interval = Interval::parse(&interval);
            emit(json!({
                "interval": interval.as_str(),
                "data": engine.time_series(records, interval),
            }))
        }
        AnalysisCommand::Heatmap => emit(engine.heatmap(records)),
        AnalysisCommand::Districts { top } => emit(engine.districts(records, top)),
        AnalysisCommand::FilterOptions => emit(engine.filter_options(records)),
        AnalysisCommand::Report { interval, out } => {
            let interval = Interval::parse(&interval);
            let report = report::build_report(
                scope,
                &engine.overview(records),
                interval,
                &engine.time_series(records, interval),
                &engine.districts(records, None),
            );
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            info!("report written to {}", out.display());
            emit(json!({ "report": out.display().to_string() }))
        }
    }
}

fn describe_scope(filter: &FilterArgs) -> Option<String> {
    let labels: Vec<String> = filter
        .operators
        .iter()
        .chain(filter.network_types.iter())
        .chain(filter.devices.iter())
        .cloned()
        .collect();

    (!labels.is_empty()).then(|| labels.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn init_config_writes_a_file_that_does_not_exist_yet() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fresh.toml");
        let cli = Cli::try_parse_from([
            "signal-analytics",
            "init-config",
            "--config",
            path.to_str().unwrap(),
        ])
        .unwrap();

        run(cli).await.unwrap();

        let written = Config::load(&path).unwrap();
        assert_eq!(written.engine.top_districts, 50);
    }

    #[tokio::test]
    async fn init_config_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("existing.toml");
        std::fs::write(&path, "not toml at all [").unwrap();
        let cli = Cli::try_parse_from([
            "signal-analytics",
            "--config",
            path.to_str().unwrap(),
            "init-config",
        ])
        .unwrap();

        let err = run(cli).await.unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }
}
