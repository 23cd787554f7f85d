//! 自治体ごとの収集設定（カタログの 1 行）
//!
//! 自治体ごとの違いは「詳細ページの URL をどう見つけるか」だけなので、
//! それを `Discovery` の 4 種で表し、汎用の `Collector` が実行する。

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::geo::{GeoContext, LatLng};

/// 詳細ページの見つけ方
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Discovery {
    /// 一覧ページから正規表現に合うリンクを拾う（同一ホストのみ）
    CategoryPage {
        listing_urls: Vec<String>,
        link_pattern: String,
    },
    /// 既知の日程ページを直接読む
    KnownUrls { urls: Vec<String> },
    /// 月ごとのカレンダーページ（`{year}` `{month}` `{category}` を埋める）からリンクを拾う
    CalendarWidget {
        url_template: String,
        link_pattern: String,
        #[serde(default)]
        categories: Vec<String>,
    },
    /// 広報紙などの PDF。固定 URL か一覧ページのリンクから
    PdfNewsletter {
        #[serde(default)]
        pdf_urls: Vec<String>,
        #[serde(default)]
        listing_urls: Vec<String>,
        #[serde(default)]
        link_pattern: Option<String>,
    },
}

impl Discovery {
    pub fn kind(&self) -> &'static str {
        match self {
            Discovery::CategoryPage { .. } => "category_page",
            Discovery::KnownUrls { .. } => "known_urls",
            Discovery::CalendarWidget { .. } => "calendar_widget",
            Discovery::PdfNewsletter { .. } => "pdf_newsletter",
        }
    }

    /// 詳細が PDF（テキスト変換して読む）か
    pub fn is_pdf(&self) -> bool {
        matches!(self, Discovery::PdfNewsletter { .. })
    }
}

/// 収集対象の自治体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub key: String,
    pub label: String,
    pub prefecture: String,
    pub city: String,
    /// ジオコーディングが全滅した場合の座標
    pub center: LatLng,
    pub discovery: Discovery,
    #[serde(default)]
    pub max_links: Option<usize>,
}

/// 設定の不備
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum SourceConfigError {
    #[error("source key is empty")]
    MissingKey,
    #[error("invalid center coordinate")]
    InvalidCenter,
    #[error("invalid link pattern `{pattern}`: {message}")]
    InvalidLinkPattern { pattern: String, message: String },
    #[error("no urls configured")]
    EmptyUrlList,
    #[error("url template must contain {{year}} and {{month}}: {0}")]
    InvalidTemplate(String),
    #[error("max_links must be positive")]
    ZeroMaxLinks,
}

fn compile_pattern(pattern: &str) -> Result<Regex, SourceConfigError> {
    Regex::new(pattern).map_err(|e| SourceConfigError::InvalidLinkPattern {
        pattern: pattern.to_string(),
        message: e.to_string(),
    })
}

impl SourceConfig {
    pub fn geo_context(&self) -> GeoContext {
        GeoContext {
            source_key: self.key.clone(),
            prefecture: self.prefecture.clone(),
            city: self.city.clone(),
        }
    }

    /// 実行前の検査。リンク用の正規表現があればコンパイル済みで返す
    pub fn validate(&self) -> Result<Option<Regex>, SourceConfigError> {
        if self.key.trim().is_empty() {
            return Err(SourceConfigError::MissingKey);
        }
        if !self.center.is_valid() {
            return Err(SourceConfigError::InvalidCenter);
        }
        if self.max_links == Some(0) {
            return Err(SourceConfigError::ZeroMaxLinks);
        }

        match &self.discovery {
            Discovery::CategoryPage {
                listing_urls,
                link_pattern,
            } => {
                if listing_urls.is_empty() {
                    return Err(SourceConfigError::EmptyUrlList);
                }
                compile_pattern(link_pattern).map(Some)
            }
            Discovery::KnownUrls { urls } => {
                if urls.is_empty() {
                    return Err(SourceConfigError::EmptyUrlList);
                }
                Ok(None)
            }
            Discovery::CalendarWidget {
                url_template,
                link_pattern,
                ..
            } => {
                if !url_template.contains("{year}") || !url_template.contains("{month}") {
                    return Err(SourceConfigError::InvalidTemplate(url_template.clone()));
                }
                compile_pattern(link_pattern).map(Some)
            }
            Discovery::PdfNewsletter {
                pdf_urls,
                listing_urls,
                link_pattern,
            } => {
                if pdf_urls.is_empty() && listing_urls.is_empty() {
                    return Err(SourceConfigError::EmptyUrlList);
                }
                match link_pattern {
                    Some(pattern) => compile_pattern(pattern).map(Some),
                    None => Ok(None),
                }
            }
        }
    }
}
