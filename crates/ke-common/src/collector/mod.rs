//! 自治体 1 件ぶんの収集
//!
//! リンク洗い出し → バッチ取得 → 詳細解析 → レコード化 → 重複除去済みの一覧。
//! 1 ページの失敗は記録して飛ばし、収集全体は止めない。止めるのは設定の不備だけ。

pub mod detail;
pub mod discover;
pub mod fetch;
pub mod observer;

use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{info, info_span, Instrument};

use crate::config::CollectorSettings;
use crate::date::MAX_HORIZON_DAYS;
use crate::event::{CanonicalEvent, MaterializeOutcome, Materializer};
use crate::geo::{FacilityMaster, Geocoder};
use crate::run_id;
use crate::source::{SourceConfig, SourceConfigError};
use crate::text::Document;
use crate::timezone::today_jst;

pub use detail::{parse_detail, parse_detail_in, parse_pdf_text, title_before_first_date, ParsedDetail};
pub use discover::{calendar_months, discover, fill_template, DetailTarget, Discovered};
pub use fetch::{fetch_in_batches, fetch_with_timeout, FetchError, FetchKind, FetchOptions, PageFetcher};
pub use observer::{Observer, TracingObserver};

#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error("source `{key}` is misconfigured: {error}")]
    Misconfigured {
        key: String,
        #[source]
        error: SourceConfigError,
    },
    #[error("invalid collector settings: {0}")]
    InvalidSettings(String),
}

/// 1 回の収集の集計
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub source: String,
    pub discovered: usize,
    pub fetched: usize,
    pub fetch_failures: usize,
    pub candidates: usize,
    pub emitted: usize,
    pub duplicates: usize,
    pub out_of_range: usize,
}

/// 収集結果（重複除去済みイベント + 集計）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionReport {
    pub summary: RunSummary,
    pub events: Vec<CanonicalEvent>,
}

/// カタログの 1 行を実行する汎用の収集器
pub struct Collector {
    fetcher: Arc<dyn PageFetcher>,
    geocoder: Arc<dyn Geocoder>,
    facilities: Arc<dyn FacilityMaster>,
    observers: Vec<Arc<dyn Observer>>,
    settings: CollectorSettings,
}

impl Collector {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        geocoder: Arc<dyn Geocoder>,
        facilities: Arc<dyn FacilityMaster>,
        settings: CollectorSettings,
    ) -> Self {
        Self {
            fetcher,
            geocoder,
            facilities,
            observers: vec![Arc::new(TracingObserver)],
            settings,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn settings(&self) -> &CollectorSettings {
        &self.settings
    }

    fn notify(&self, f: impl Fn(&dyn Observer)) {
        for observer in &self.observers {
            f(observer.as_ref());
        }
    }

    /// JST の今日を基準に収集する
    pub async fn run(&self, source: &SourceConfig, max_days: i64) -> Result<CollectionReport, CollectorError> {
        self.run_on(source, today_jst(), max_days).await
    }

    /// 全自治体を順に収集する。設定不備の自治体はエラーとして返し、他は続行
    pub async fn run_all(
        &self,
        sources: &[SourceConfig],
        max_days: i64,
    ) -> Vec<(String, Result<CollectionReport, CollectorError>)> {
        let mut results = Vec::with_capacity(sources.len());
        for source in sources {
            results.push((source.key.clone(), self.run(source, max_days).await));
        }
        results
    }

    /// 基準日を指定して収集する
    pub async fn run_on(
        &self,
        source: &SourceConfig,
        today: NaiveDate,
        max_days: i64,
    ) -> Result<CollectionReport, CollectorError> {
        if self.settings.batch_size == 0 {
            return Err(CollectorError::InvalidSettings("batch size must be positive".into()));
        }
        let pattern = source.validate().map_err(|error| CollectorError::Misconfigured {
            key: source.key.clone(),
            error,
        })?;

        let run_id = run_id::generate();
        let span = info_span!(
            "collect",
            run_id = %run_id,
            process = %run_id::process(),
            source = %source.key,
            discovery = source.discovery.kind()
        );
        let max_days = max_days.clamp(0, MAX_HORIZON_DAYS);

        self.collect(source, pattern, run_id, today, max_days)
            .instrument(span)
            .await
    }

    async fn collect(
        &self,
        source: &SourceConfig,
        pattern: Option<regex::Regex>,
        run_id: String,
        today: NaiveDate,
        max_days: i64,
    ) -> Result<CollectionReport, CollectorError> {
        let mut summary = RunSummary {
            run_id,
            source: source.key.clone(),
            ..RunSummary::default()
        };

        let mut settings = self.settings.clone();
        settings.max_days = max_days;
        let discovered = discover(source, pattern.as_ref(), self.fetcher.as_ref(), &settings, today).await;
        for (url, error) in &discovered.failures {
            summary.fetch_failures += 1;
            self.notify(|o| o.on_fetch_failure(&source.key, url, error));
        }
        summary.discovered = discovered.targets.len();
        info!(
            targets = discovered.targets.len(),
            listings = discovered.listings_fetched,
            "detail pages discovered"
        );

        let mut materializer = Materializer::new(
            source.clone(),
            self.geocoder.clone(),
            self.facilities.clone(),
            today,
            max_days,
        );

        // ページと PDF はタイムアウトが違うので種類ごとにバッチを組む
        let mut settled = Vec::with_capacity(discovered.targets.len());
        for (kind, timeout) in [
            (FetchKind::Page, self.settings.page_timeout),
            (FetchKind::Pdf, self.settings.pdf_timeout),
        ] {
            let urls: Vec<String> = discovered
                .targets
                .iter()
                .filter(|target| target.kind == kind)
                .map(|target| target.url.clone())
                .collect();
            let results =
                fetch_in_batches(self.fetcher.as_ref(), &urls, kind, self.settings.batch_size, timeout).await;
            settled.extend(results.into_iter().map(|(url, result)| (url, kind, result)));
        }

        for (url, kind, result) in settled {
            let body = match result {
                Ok(body) => body,
                Err(error) => {
                    summary.fetch_failures += 1;
                    self.notify(|o| o.on_fetch_failure(&source.key, &url, &error));
                    continue;
                }
            };
            summary.fetched += 1;

            let parsed = match kind {
                FetchKind::Page => {
                    let doc = Document::from_html(&url, &body);
                    parse_detail(&doc, today, max_days).into_iter().collect::<Vec<_>>()
                }
                FetchKind::Pdf => parse_pdf_text(&url, &body, today, max_days),
            };

            for detail in parsed {
                let candidate = detail.candidate;
                let dates = candidate.resolved_dates();
                summary.candidates += 1;
                self.notify(|o| o.on_detail_parsed(&source.key, &candidate, dates.len()));

                for date in dates {
                    match materializer.materialize(&candidate, date).await {
                        MaterializeOutcome::Inserted { .. } => {
                            summary.emitted += 1;
                            if let Some(event) = materializer.events().last() {
                                self.notify(|o| o.on_event(&source.key, event));
                            }
                        }
                        MaterializeOutcome::Duplicate { .. } => summary.duplicates += 1,
                        MaterializeOutcome::OutOfRange => summary.out_of_range += 1,
                    }
                }
            }
        }

        self.notify(|o| o.on_run_finished(&summary));
        Ok(CollectionReport {
            summary,
            events: materializer.into_events(),
        })
    }
}
