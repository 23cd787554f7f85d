//! 取得クライアントとの境界
//!
//! 実装（HTTP クライアント・PDF 変換）は外から差し込む。ここではタイムアウトを
//! 必ず掛け、失敗はすべて `FetchError` の値として返す。

use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;

use crate::config::{MAX_BATCH_SIZE, MIN_BATCH_SIZE};

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("http status {status}")]
    Status { status: u16 },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("unsupported content: {0}")]
    Unsupported(String),
}

/// 1 回の取得の設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOptions {
    pub timeout: Duration,
}

impl FetchOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// HTML などのテキストを取得する。2xx 以外は `FetchError::Status`
    async fn fetch_text(&self, url: &str, options: &FetchOptions) -> Result<String, FetchError>;

    /// PDF を取得してテキスト（Markdown）に変換する
    async fn fetch_pdf_as_markdown(&self, url: &str, options: &FetchOptions) -> Result<String, FetchError>;
}

/// 取得対象の種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchKind {
    Page,
    Pdf,
}

/// タイムアウト付きで取得する。実装側がタイムアウトを守らなくてもここで打ち切る
pub async fn fetch_with_timeout(
    fetcher: &dyn PageFetcher,
    url: &str,
    kind: FetchKind,
    timeout: Duration,
) -> Result<String, FetchError> {
    let options = FetchOptions::with_timeout(timeout);
    let fetch = async {
        match kind {
            FetchKind::Page => fetcher.fetch_text(url, &options).await,
            FetchKind::Pdf => fetcher.fetch_pdf_as_markdown(url, &options).await,
        }
    };
    tokio::time::timeout(timeout, fetch)
        .await
        .unwrap_or(Err(FetchError::Timeout(timeout)))
}

/// `batch_size` 件ずつ同時に取得する。前のバッチがすべて終わってから次へ進む
///
/// `batch_size` は 5〜10 に丸める。結果は `urls` と同じ順。
pub async fn fetch_in_batches(
    fetcher: &dyn PageFetcher,
    urls: &[String],
    kind: FetchKind,
    batch_size: usize,
    timeout: Duration,
) -> Vec<(String, Result<String, FetchError>)> {
    let mut settled = Vec::with_capacity(urls.len());
    for batch in urls.chunks(batch_size.clamp(MIN_BATCH_SIZE, MAX_BATCH_SIZE)) {
        let results = join_all(batch.iter().map(|url| async move {
            let result = fetch_with_timeout(fetcher, url, kind, timeout).await;
            (url.clone(), result)
        }))
        .await;
        settled.extend(results);
    }
    settled
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct SlowFetcher;

    #[async_trait]
    impl PageFetcher for SlowFetcher {
        async fn fetch_text(&self, _url: &str, _options: &FetchOptions) -> Result<String, FetchError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok("late".into())
        }

        async fn fetch_pdf_as_markdown(&self, _url: &str, _options: &FetchOptions) -> Result<String, FetchError> {
            Err(FetchError::Unsupported("pdf".into()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn slow_fetch_times_out() {
        let result = fetch_with_timeout(&SlowFetcher, "https://x.example/", FetchKind::Page, Duration::from_secs(8)).await;
        assert_eq!(result, Err(FetchError::Timeout(Duration::from_secs(8))));
    }

    #[tokio::test]
    async fn pdf_kind_uses_pdf_path() {
        let result = fetch_with_timeout(&SlowFetcher, "https://x.example/a.pdf", FetchKind::Pdf, Duration::from_secs(1)).await;
        assert_eq!(result, Err(FetchError::Unsupported("pdf".into())));
    }

    #[derive(Default)]
    struct InFlightFetcher {
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl PageFetcher for InFlightFetcher {
        async fn fetch_text(&self, url: &str, _options: &FetchOptions) -> Result<String, FetchError> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(100)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            Ok(url.to_string())
        }

        async fn fetch_pdf_as_markdown(&self, _url: &str, _options: &FetchOptions) -> Result<String, FetchError> {
            Err(FetchError::Unsupported("pdf".into()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn batch_size_is_clamped_and_order_kept() {
        let urls: Vec<String> = (0..12).map(|i| format!("https://x.example/{i}")).collect();

        let fetcher = InFlightFetcher::default();
        let settled = fetch_in_batches(&fetcher, &urls, FetchKind::Page, 1, Duration::from_secs(8)).await;
        assert_eq!(fetcher.peak.load(Ordering::SeqCst), MIN_BATCH_SIZE);
        let order: Vec<_> = settled.iter().map(|(url, _)| url.clone()).collect();
        assert_eq!(order, urls);

        let fetcher = InFlightFetcher::default();
        fetch_in_batches(&fetcher, &urls, FetchKind::Page, 64, Duration::from_secs(8)).await;
        assert_eq!(fetcher.peak.load(Ordering::SeqCst), MAX_BATCH_SIZE);
    }
}
