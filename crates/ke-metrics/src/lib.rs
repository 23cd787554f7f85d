use std::env;
use std::sync::OnceLock;

use ke_common::collector::fetch::FetchError;
use ke_common::collector::{Observer, RunSummary};
use ke_common::event::{CanonicalEvent, RawEventCandidate};
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::{info, warn};

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub const FETCH_FAILURES: &str = "ke_fetch_failures_total";
pub const DETAILS_PARSED: &str = "ke_details_parsed_total";
pub const DATES_EXTRACTED: &str = "ke_dates_extracted";
pub const EVENTS_EMITTED: &str = "ke_events_emitted_total";
pub const RUNS_FINISHED: &str = "ke_runs_finished_total";
pub const LAST_RUN_EMITTED: &str = "ke_last_run_emitted_events";
pub const LAST_RUN_DUPLICATES: &str = "ke_last_run_duplicates";
pub const LAST_RUN_OUT_OF_RANGE: &str = "ke_last_run_out_of_range";

/// `0.0.0.0:<port>` で Prometheus エクスポーターを起動する
///
/// ポートは `port_env` の環境変数、なければ `default_port`。起動できればハンドルを返す。
pub fn init_metrics(port_env: &str, default_port: u16) -> Option<&'static PrometheusHandle> {
    let port = env::var(port_env)
        .ok()
        .and_then(|raw| raw.parse::<u16>().ok())
        .unwrap_or(default_port);

    if let Some(existing) = PROMETHEUS_HANDLE.get() {
        return Some(existing);
    }

    match PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install_recorder()
    {
        Ok(handle) => {
            let _ = PROMETHEUS_HANDLE.set(handle);
            info!(metrics_port = port, "started prometheus exporter");
            PROMETHEUS_HANDLE.get()
        }
        Err(err) => {
            warn!(error = %err, metrics_port = port, "failed to start prometheus exporter");
            PROMETHEUS_HANDLE.get()
        }
    }
}

fn fetch_failure_reason(error: &FetchError) -> &'static str {
    match error {
        FetchError::Timeout(_) => "timeout",
        FetchError::Status { .. } => "status",
        FetchError::Transport(_) => "transport",
        FetchError::Unsupported(_) => "unsupported",
    }
}

/// 収集の進捗を `metrics` のグローバルレコーダーに流す Observer
///
/// レコーダー未設定（`init_metrics` を呼んでいない）の場合は何もしない。
#[derive(Debug, Default, Clone, Copy)]
pub struct MetricsObserver;

impl Observer for MetricsObserver {
    fn on_fetch_failure(&self, source: &str, _url: &str, error: &FetchError) {
        counter!(
            FETCH_FAILURES,
            "source" => source.to_string(),
            "reason" => fetch_failure_reason(error)
        )
        .increment(1);
    }

    fn on_detail_parsed(&self, source: &str, _candidate: &RawEventCandidate, dates: usize) {
        counter!(DETAILS_PARSED, "source" => source.to_string()).increment(1);
        histogram!(DATES_EXTRACTED, "source" => source.to_string()).record(dates as f64);
    }

    fn on_event(&self, source: &str, _event: &CanonicalEvent) {
        counter!(EVENTS_EMITTED, "source" => source.to_string()).increment(1);
    }

    fn on_run_finished(&self, summary: &RunSummary) {
        let source = summary.source.clone();
        counter!(RUNS_FINISHED, "source" => source.clone()).increment(1);
        gauge!(LAST_RUN_EMITTED, "source" => source.clone()).set(summary.emitted as f64);
        gauge!(LAST_RUN_DUPLICATES, "source" => source.clone()).set(summary.duplicates as f64);
        gauge!(LAST_RUN_OUT_OF_RANGE, "source" => source).set(summary.out_of_range as f64);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn failure_reasons_are_low_cardinality() {
        assert_eq!(fetch_failure_reason(&FetchError::Timeout(Duration::from_secs(5))), "timeout");
        assert_eq!(fetch_failure_reason(&FetchError::Status { status: 404 }), "status");
        assert_eq!(
            fetch_failure_reason(&FetchError::Transport("connection reset".into())),
            "transport"
        );
    }

    #[test]
    fn observer_is_a_no_op_without_recorder() {
        let observer = MetricsObserver;
        let summary = RunSummary {
            run_id: "01J0000000000000000000000".into(),
            source: "sample-city".into(),
            ..RunSummary::default()
        };
        observer.on_run_finished(&summary);
        observer.on_fetch_failure("sample-city", "https://example.jp/", &FetchError::Status { status: 500 });
    }
}
