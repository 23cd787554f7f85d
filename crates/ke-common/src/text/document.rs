use super::html::{
    definition_pairs, extract_links, extract_tables, heading_blocks, page_title, strip_tags,
    HeadingBlock, Link,
};
use super::normalize::normalize_width;

/// 1 ページ分のパース結果
///
/// 抽出戦略はすべてこの構造体を読むだけで、HTML を再パースしない。
/// テキスト類はすべて NFKC 済み。
#[derive(Debug, Clone, Default)]
pub struct Document {
    pub url: String,
    pub title: Option<String>,
    /// ブロックごとに改行で区切ったプレーンテキスト
    pub text: String,
    pub tables: Vec<Vec<Vec<String>>>,
    pub definitions: Vec<(String, String)>,
    pub headings: Vec<HeadingBlock>,
    pub links: Vec<Link>,
}

impl Document {
    pub fn from_html(url: &str, html: &str) -> Self {
        Self {
            url: url.to_string(),
            title: page_title(html).map(|t| normalize_width(&t)),
            text: normalize_width(&strip_tags(html)),
            tables: extract_tables(html),
            definitions: definition_pairs(html),
            headings: heading_blocks(html),
            links: extract_links(html, url),
        }
    }

    /// PDF→テキスト変換後など、マークアップを持たない本文から作る
    pub fn from_text(url: &str, text: &str) -> Self {
        let normalized = normalize_width(text);
        let lines: Vec<&str> = normalized
            .lines()
            .map(|line| line.trim_start_matches('#').trim())
            .filter(|line| !line.is_empty())
            .collect();

        Self {
            url: url.to_string(),
            title: lines.first().map(|line| line.to_string()),
            text: lines.join("\n"),
            ..Self::default()
        }
    }

    /// 文書順のセグメント（行・表の行）
    pub fn segments(&self) -> Vec<&str> {
        self.text.lines().filter(|line| !line.trim().is_empty()).collect()
    }
}
