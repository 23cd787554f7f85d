mod http;

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use dotenvy::dotenv;
use ke_common::config::{load_facility_master, load_geocode_table, load_source_catalog};
use ke_common::geo::{FacilityMaster, Geocoder, InMemoryFacilityMaster, NullGeocoder};
use ke_common::logging::{init_tracing_subscriber, install_tracing_panic_hook, LoggingSettings};
use ke_common::{Collector, CollectorError, CollectorSettings, ConfigError, SourceConfig};
use ke_metrics::{init_metrics, MetricsObserver};
use serde_json::json;
use tracing::{error, info, warn};

use crate::http::HttpFetcher;

const APP_NAME: &str = "ke-collector";
const DEFAULT_METRICS_PORT: u16 = 9464;

#[derive(Debug, Parser)]
#[command(name = APP_NAME, version, about = "自治体の子育てイベントを収集して JSON で出力する")]
struct Cli {
    /// 自治体カタログ（SourceConfig の JSON 配列）
    #[arg(long, env = "KE_SOURCE_CATALOG")]
    catalog: PathBuf,

    /// 施設名 → 住所のマスタ
    #[arg(long, env = "KE_FACILITY_MASTER")]
    facilities: Option<PathBuf>,

    /// 住所 → 座標の静的テーブル
    #[arg(long, env = "KE_GEOCODE_TABLE")]
    geocode_table: Option<PathBuf>,

    /// 対象の source key（複数可、省略時は全件）
    #[arg(long = "source")]
    sources: Vec<String>,

    /// 何日先まで出力するか（KE_MAX_DAYS より優先）
    #[arg(long)]
    max_days: Option<i64>,

    /// PDF を Markdown に変換するエンドポイント
    #[arg(long, env = "KE_PDF_CONVERTER_URL")]
    pdf_converter: Option<String>,

    /// 出力先（省略時は stdout）
    #[arg(long, short)]
    output: Option<PathBuf>,

    #[arg(long, env = "KE_METRICS_ENABLED", default_value_t = false)]
    metrics: bool,
}

#[derive(Debug, thiserror::Error)]
enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("unknown source key `{0}`")]
    UnknownSource(String),
    #[error("failed to build http client: {0}")]
    Http(#[from] reqwest::Error),
    #[error("failed to write output: {0}")]
    Output(#[from] std::io::Error),
    #[error("{failed} of {total} sources could not be collected")]
    Collection { failed: usize, total: usize },
}

fn select_sources(catalog: Vec<SourceConfig>, keys: &[String]) -> Result<Vec<SourceConfig>, RunError> {
    if keys.is_empty() {
        return Ok(catalog);
    }
    if let Some(missing) = keys.iter().find(|key| !catalog.iter().any(|s| &s.key == *key)) {
        return Err(RunError::UnknownSource(missing.clone()));
    }
    Ok(catalog
        .into_iter()
        .filter(|source| keys.contains(&source.key))
        .collect())
}

async fn run(cli: Cli) -> Result<(), RunError> {
    let settings = CollectorSettings::from_env();
    let max_days = cli.max_days.unwrap_or(settings.max_days);
    let sources = select_sources(load_source_catalog(&cli.catalog)?, &cli.sources)?;

    let facilities: Arc<dyn FacilityMaster> = match &cli.facilities {
        Some(path) => Arc::new(load_facility_master(path)?),
        None => Arc::new(InMemoryFacilityMaster::default()),
    };
    let geocoder: Arc<dyn Geocoder> = match &cli.geocode_table {
        Some(path) => Arc::new(load_geocode_table(path)?),
        None => {
            warn!("no geocode table configured; events fall back to source centers");
            Arc::new(NullGeocoder)
        }
    };

    let mut collector = Collector::new(
        Arc::new(HttpFetcher::new(cli.pdf_converter.clone())?),
        geocoder,
        facilities,
        settings,
    );
    if cli.metrics && init_metrics("KE_METRICS_PORT", DEFAULT_METRICS_PORT).is_some() {
        collector = collector.with_observer(Arc::new(MetricsObserver));
    }

    info!(sources = sources.len(), max_days, "starting collection");
    let results = collector.run_all(&sources, max_days).await;

    let total = results.len();
    let mut failed = 0;
    let mut runs = Vec::with_capacity(total);
    for (key, result) in results {
        match result {
            Ok(report) => runs.push(json!({
                "source": key,
                "summary": report.summary,
                "events": report.events,
            })),
            Err(err) => {
                failed += 1;
                log_collector_error(&key, &err);
                runs.push(json!({ "source": key, "error": err.to_string() }));
            }
        }
    }

    let body = serde_json::to_string_pretty(&json!({ "runs": runs }))
        .map_err(|err| RunError::Output(err.into()))?;
    match &cli.output {
        Some(path) => std::fs::write(path, body)?,
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(body.as_bytes())?;
            stdout.write_all(b"\n")?;
        }
    }

    if failed > 0 {
        return Err(RunError::Collection { failed, total });
    }
    Ok(())
}

fn log_collector_error(key: &str, err: &CollectorError) {
    error!(source = %key, error = %err, "collection aborted");
}

#[tokio::main]
async fn main() {
    dotenv().ok();
    let logging = LoggingSettings::from_env();
    install_tracing_panic_hook(APP_NAME, &logging);
    init_tracing_subscriber(APP_NAME, &logging);

    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        error!(error = %err, "ke-collector failed");
        std::process::exit(1);
    }
}
