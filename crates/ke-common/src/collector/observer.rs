use tracing::{debug, info, warn};

use super::fetch::FetchError;
use super::RunSummary;
use crate::event::{CanonicalEvent, RawEventCandidate};

/// 収集中の出来事の通知先（ログ・メトリクス）
///
/// パース処理自体は純粋関数のままにし、副作用はここに集める。
pub trait Observer: Send + Sync {
    fn on_fetch_failure(&self, _source: &str, _url: &str, _error: &FetchError) {}

    fn on_detail_parsed(&self, _source: &str, _candidate: &RawEventCandidate, _dates: usize) {}

    fn on_event(&self, _source: &str, _event: &CanonicalEvent) {}

    fn on_run_finished(&self, _summary: &RunSummary) {}
}

/// tracing に流すだけの既定実装
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn on_fetch_failure(&self, source: &str, url: &str, error: &FetchError) {
        warn!(source = %source, url = %url, error = %error, "fetch failed; skipping");
    }

    fn on_detail_parsed(&self, source: &str, candidate: &RawEventCandidate, dates: usize) {
        debug!(
            source = %source,
            url = %candidate.source_url,
            title = %candidate.title,
            dates,
            venue = candidate.venue_text.as_deref().unwrap_or(""),
            "detail parsed"
        );
    }

    fn on_event(&self, source: &str, event: &CanonicalEvent) {
        debug!(source = %source, id = %event.id, starts_at = %event.starts_at, "event emitted");
    }

    fn on_run_finished(&self, summary: &RunSummary) {
        info!(
            run_id = %summary.run_id,
            source = %summary.source,
            discovered = summary.discovered,
            fetched = summary.fetched,
            fetch_failures = summary.fetch_failures,
            candidates = summary.candidates,
            emitted = summary.emitted,
            duplicates = summary.duplicates,
            out_of_range = summary.out_of_range,
            "collection run finished"
        );
    }
}
