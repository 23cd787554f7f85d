//! 詳細ページ URL の洗い出し

use std::collections::HashSet;

use chrono::{Datelike, Duration, NaiveDate};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::debug;
use url::Url;

use super::fetch::{fetch_in_batches, FetchError, FetchKind, PageFetcher};
use crate::config::CollectorSettings;
use crate::source::{Discovery, SourceConfig};
use crate::text::html::extract_links;

lazy_static! {
    static ref PDF_LINK_RE: Regex = Regex::new(r"(?i)\.pdf(?:$|[?#])").unwrap();
}

/// 取得する詳細ページ
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DetailTarget {
    pub url: String,
    pub kind: FetchKind,
}

/// 洗い出しの結果
#[derive(Debug, Default)]
pub struct Discovered {
    pub targets: Vec<DetailTarget>,
    /// 取得できた一覧ページの数
    pub listings_fetched: usize,
    pub failures: Vec<(String, FetchError)>,
}

fn host_of(url: &str) -> Option<String> {
    Url::parse(url).ok()?.host_str().map(|h| h.to_ascii_lowercase())
}

/// 同一ホストか（パースできない URL は別ホスト扱い）
pub fn same_host(a: &str, b: &str) -> bool {
    match (host_of(a), host_of(b)) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

/// 今日から horizon_days 日後までにかかる (年, 月)
pub fn calendar_months(today: NaiveDate, horizon_days: i64) -> Vec<(i32, u32)> {
    let last = today + Duration::days(horizon_days.max(0));
    let (mut year, mut month) = (today.year(), today.month());
    let mut months = Vec::new();
    while (year, month) <= (last.year(), last.month()) {
        months.push((year, month));
        if month == 12 {
            year += 1;
            month = 1;
        } else {
            month += 1;
        }
    }
    months
}

/// `{year}` `{month}` `{month2}`（0 埋め）`{category}` を埋める
pub fn fill_template(template: &str, year: i32, month: u32, category: &str) -> String {
    template
        .replace("{year}", &year.to_string())
        .replace("{month2}", &format!("{month:02}"))
        .replace("{month}", &month.to_string())
        .replace("{category}", category)
}

/// 一覧ページのリンクから条件に合うものを順序を保って選ぶ
pub fn select_links(html: &str, listing_url: &str, pattern: &Regex, same_host_only: bool) -> Vec<String> {
    extract_links(html, listing_url)
        .into_iter()
        .map(|link| link.href)
        .filter(|href| pattern.is_match(href))
        .filter(|href| !same_host_only || same_host(href, listing_url))
        .collect()
}

fn push_unique(targets: &mut Vec<DetailTarget>, seen: &mut HashSet<String>, url: String, kind: FetchKind) {
    if seen.insert(url.clone()) {
        targets.push(DetailTarget { url, kind });
    }
}

async fn links_from_listings(
    fetcher: &dyn PageFetcher,
    listing_urls: &[String],
    pattern: &Regex,
    same_host_only: bool,
    settings: &CollectorSettings,
    out: &mut Discovered,
) -> Vec<String> {
    let mut links = Vec::new();
    let fetched = fetch_in_batches(
        fetcher,
        listing_urls,
        FetchKind::Page,
        settings.batch_size,
        settings.page_timeout,
    )
    .await;

    for (url, result) in fetched {
        match result {
            Ok(html) => {
                out.listings_fetched += 1;
                let selected = select_links(&html, &url, pattern, same_host_only);
                debug!(listing = %url, links = selected.len(), "listing scanned");
                links.extend(selected);
            }
            Err(error) => out.failures.push((url, error)),
        }
    }
    links
}

/// 設定に従って詳細ページを洗い出す（重複除去・上限つき）
///
/// `pattern` は `SourceConfig::validate` でコンパイル済みのもの。
pub async fn discover(
    source: &SourceConfig,
    pattern: Option<&Regex>,
    fetcher: &dyn PageFetcher,
    settings: &CollectorSettings,
    today: NaiveDate,
) -> Discovered {
    let mut out = Discovered::default();
    let mut seen = HashSet::new();
    let mut targets = Vec::new();

    match &source.discovery {
        Discovery::CategoryPage { listing_urls, .. } => {
            if let Some(pattern) = pattern {
                for url in links_from_listings(fetcher, listing_urls, pattern, true, settings, &mut out).await {
                    push_unique(&mut targets, &mut seen, url, FetchKind::Page);
                }
            }
        }
        Discovery::KnownUrls { urls } => {
            for url in urls {
                push_unique(&mut targets, &mut seen, url.trim().to_string(), FetchKind::Page);
            }
        }
        Discovery::CalendarWidget {
            url_template,
            categories,
            ..
        } => {
            let categories: Vec<&str> = if categories.is_empty() {
                vec![""]
            } else {
                categories.iter().map(String::as_str).collect()
            };
            let listing_urls: Vec<String> = calendar_months(today, settings.max_days)
                .into_iter()
                .flat_map(|(year, month)| {
                    categories
                        .iter()
                        .map(move |category| fill_template(url_template, year, month, category))
                })
                .collect();
            if let Some(pattern) = pattern {
                for url in links_from_listings(fetcher, &listing_urls, pattern, true, settings, &mut out).await {
                    push_unique(&mut targets, &mut seen, url, FetchKind::Page);
                }
            }
        }
        Discovery::PdfNewsletter {
            pdf_urls,
            listing_urls,
            ..
        } => {
            for url in pdf_urls {
                push_unique(&mut targets, &mut seen, url.trim().to_string(), FetchKind::Pdf);
            }
            if !listing_urls.is_empty() {
                let pattern = pattern.unwrap_or(&*PDF_LINK_RE);
                for url in links_from_listings(fetcher, listing_urls, pattern, false, settings, &mut out).await {
                    push_unique(&mut targets, &mut seen, url, FetchKind::Pdf);
                }
            }
        }
    }

    let cap = source.max_links.unwrap_or(settings.max_links);
    targets.truncate(cap);
    out.targets = targets;
    out
}
