use std::time::Duration;

use async_trait::async_trait;
use ke_common::collector::fetch::{FetchError, FetchOptions, PageFetcher};
use reqwest::{Client, Response};
use tracing::debug;

const USER_AGENT: &str = concat!("ke-collector/", env!("CARGO_PKG_VERSION"));

/// reqwest による取得クライアント
///
/// PDF は `pdf_converter` に本体を POST し、返ってきたテキストを Markdown として扱う。
/// 変換先がなければ PDF は `Unsupported`。
pub struct HttpFetcher {
    client: Client,
    pdf_converter: Option<String>,
}

impl HttpFetcher {
    pub fn new(pdf_converter: Option<String>) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self {
            client,
            pdf_converter: pdf_converter.filter(|url| !url.trim().is_empty()),
        })
    }

    async fn get(&self, url: &str, options: &FetchOptions) -> Result<Response, FetchError> {
        let response = self
            .client
            .get(url)
            .timeout(options.timeout)
            .send()
            .await
            .map_err(|err| map_error(err, options.timeout))?;
        ensure_success(response)
    }
}

fn map_error(err: reqwest::Error, timeout: Duration) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout(timeout)
    } else if let Some(status) = err.status() {
        FetchError::Status {
            status: status.as_u16(),
        }
    } else {
        FetchError::Transport(err.to_string())
    }
}

fn ensure_success(response: Response) -> Result<Response, FetchError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(FetchError::Status {
            status: status.as_u16(),
        })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch_text(&self, url: &str, options: &FetchOptions) -> Result<String, FetchError> {
        let response = self.get(url, options).await?;
        let text = response
            .text()
            .await
            .map_err(|err| map_error(err, options.timeout))?;
        debug!(url = %url, bytes = text.len(), "fetched page");
        Ok(text)
    }

    async fn fetch_pdf_as_markdown(&self, url: &str, options: &FetchOptions) -> Result<String, FetchError> {
        let converter = self
            .pdf_converter
            .as_deref()
            .ok_or_else(|| FetchError::Unsupported(format!("no pdf converter configured for {url}")))?;

        let pdf = self
            .get(url, options)
            .await?
            .bytes()
            .await
            .map_err(|err| map_error(err, options.timeout))?;

        let response = self
            .client
            .post(converter)
            .timeout(options.timeout)
            .header(reqwest::header::CONTENT_TYPE, "application/pdf")
            .body(pdf)
            .send()
            .await
            .map_err(|err| map_error(err, options.timeout))?;
        let markdown = ensure_success(response)?
            .text()
            .await
            .map_err(|err| map_error(err, options.timeout))?;
        debug!(url = %url, chars = markdown.chars().count(), "converted pdf");
        Ok(markdown)
    }
}
