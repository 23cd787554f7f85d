//! 正規表現ベースの HTML ヘルパー
//!
//! 自治体 CMS の HTML は整形式とは限らないので DOM は組まない。
//! 抽出側が使う形（ブロック単位のテキスト、リンク、表のセル、`<dl>` の組、
//! 見出しと直後のブロック）だけを取り出す。

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use url::Url;

use super::normalize::{collapse_whitespace, normalize_width};

lazy_static! {
    static ref COMMENT_RE: Regex = Regex::new(r"(?s)<!--.*?-->").unwrap();
    static ref SCRIPT_RE: Regex =
        Regex::new(r"(?is)<(?:script|style|noscript)\b.*?</(?:script|style|noscript)\s*>").unwrap();
    static ref HEAD_RE: Regex = Regex::new(r"(?is)<head\b.*?</head\s*>").unwrap();
    static ref CELL_END_RE: Regex = Regex::new(r"(?i)</t[hd]\s*>").unwrap();
    static ref BLOCK_BREAK_RE: Regex = Regex::new(
        r"(?i)<br\s*/?>|</(?:p|div|li|tr|h[1-6]|dd|dt|table|ul|ol|dl|section|article|header|footer|nav)\s*>"
    )
    .unwrap();
    static ref TAG_RE: Regex = Regex::new(r"(?s)<[^>]*>").unwrap();
    static ref ENTITY_RE: Regex = Regex::new(r"&(#[xX][0-9a-fA-F]+|#\d+|[a-zA-Z]+);").unwrap();
    static ref ANCHOR_RE: Regex =
        Regex::new(r#"(?is)<a\b[^>]*?\bhref\s*=\s*["']([^"']+)["'][^>]*>(.*?)</a\s*>"#).unwrap();
    static ref TABLE_RE: Regex = Regex::new(r"(?is)<table\b[^>]*>(.*?)</table\s*>").unwrap();
    static ref ROW_RE: Regex = Regex::new(r"(?is)<tr\b[^>]*>(.*?)</tr\s*>").unwrap();
    static ref CELL_RE: Regex = Regex::new(r"(?is)<t[hd]\b[^>]*>(.*?)</t[hd]\s*>").unwrap();
    static ref DL_PAIR_RE: Regex =
        Regex::new(r"(?is)<dt\b[^>]*>(.*?)</dt\s*>\s*<dd\b[^>]*>(.*?)</dd\s*>").unwrap();
    static ref HEADING_BLOCK_RE: Regex = Regex::new(
        r"(?is)<h[2-6]\b[^>]*>(.*?)</h[2-6]\s*>\s*(?:<div\b[^>]*>\s*)?<(p|ul|ol|dl|table)\b[^>]*>(.*?)</(?:p|ul|ol|dl|table)\s*>"
    )
    .unwrap();
    static ref H1_RE: Regex = Regex::new(r"(?is)<h1\b[^>]*>(.*?)</h1\s*>").unwrap();
    static ref TITLE_RE: Regex = Regex::new(r"(?is)<title\b[^>]*>(.*?)</title\s*>").unwrap();
}

/// ページ内リンク（絶対 URL 化済み）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub href: String,
    pub text: String,
}

/// 見出しと直後のブロック
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadingBlock {
    pub heading: String,
    pub body: String,
}

/// `&amp;` などの文字参照を戻す
pub fn decode_entities(text: &str) -> String {
    ENTITY_RE
        .replace_all(text, |caps: &Captures| {
            let raw = &caps[1];
            let decoded = if let Some(hex) = raw.strip_prefix("#x").or_else(|| raw.strip_prefix("#X")) {
                u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
            } else if let Some(dec) = raw.strip_prefix('#') {
                dec.parse::<u32>().ok().and_then(char::from_u32)
            } else {
                match raw {
                    "nbsp" | "ensp" | "emsp" | "thinsp" => Some(' '),
                    "amp" => Some('&'),
                    "lt" => Some('<'),
                    "gt" => Some('>'),
                    "quot" => Some('"'),
                    "apos" => Some('\''),
                    "yen" => Some('¥'),
                    "times" => Some('×'),
                    "middot" => Some('・'),
                    _ => None,
                }
            };
            decoded.map(String::from).unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// HTML をブロック単位の行に分けたプレーンテキストにする
///
/// 表のセルは空白区切りで 1 行（= 1 行分のセグメント）に収まる。
pub fn strip_tags(html: &str) -> String {
    let without_comments = COMMENT_RE.replace_all(html, "");
    let without_head = HEAD_RE.replace_all(&without_comments, "");
    let without_scripts = SCRIPT_RE.replace_all(&without_head, "");
    let cells_spaced = CELL_END_RE.replace_all(&without_scripts, " ");
    let broken = BLOCK_BREAK_RE.replace_all(&cells_spaced, "\n");
    let bare = TAG_RE.replace_all(&broken, "");
    let decoded = decode_entities(&bare);

    decoded
        .lines()
        .map(collapse_whitespace)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// 断片を 1 行のテキストにする（セル・dd 用）
pub fn inline_text(fragment: &str) -> String {
    collapse_whitespace(&strip_tags(fragment).replace('\n', " "))
}

/// 相対 URL を解決する。`javascript:` / `mailto:` / `tel:` とページ内アンカーは捨てる
pub fn resolve_url(base: &str, href: &str) -> Option<String> {
    let href = decode_entities(href.trim());
    let lower = href.to_ascii_lowercase();
    if href.is_empty()
        || href.starts_with('#')
        || lower.starts_with("javascript:")
        || lower.starts_with("mailto:")
        || lower.starts_with("tel:")
    {
        return None;
    }

    let mut joined = match Url::parse(base) {
        Ok(base) => base.join(&href).ok()?,
        Err(_) => Url::parse(&href).ok()?,
    };
    joined.set_fragment(None);

    match joined.scheme() {
        "http" | "https" => Some(joined.to_string()),
        _ => None,
    }
}

/// `<a href>` を絶対 URL で列挙（同一 URL は最初の 1 件のみ）
pub fn extract_links(html: &str, base: &str) -> Vec<Link> {
    let mut seen = std::collections::HashSet::new();
    ANCHOR_RE
        .captures_iter(html)
        .filter_map(|caps| {
            let href = resolve_url(base, &caps[1])?;
            let text = normalize_width(&inline_text(&caps[2]));
            Some(Link { href, text })
        })
        .filter(|link| seen.insert(link.href.clone()))
        .collect()
}

/// `<table>` ごとの行×セル（幅正規化済み）
pub fn extract_tables(html: &str) -> Vec<Vec<Vec<String>>> {
    TABLE_RE
        .captures_iter(html)
        .map(|table| {
            ROW_RE
                .captures_iter(&table[1])
                .map(|row| {
                    CELL_RE
                        .captures_iter(&row[1])
                        .map(|cell| normalize_width(&inline_text(&cell[1])))
                        .collect::<Vec<_>>()
                })
                .filter(|cells| !cells.is_empty())
                .collect::<Vec<_>>()
        })
        .filter(|rows| !rows.is_empty())
        .collect()
}

/// `<dt>`/`<dd>` の組
pub fn definition_pairs(html: &str) -> Vec<(String, String)> {
    DL_PAIR_RE
        .captures_iter(html)
        .map(|caps| {
            (
                normalize_width(&inline_text(&caps[1])),
                normalize_width(&inline_text(&caps[2])),
            )
        })
        .collect()
}

/// h2〜h6 と直後のブロック
pub fn heading_blocks(html: &str) -> Vec<HeadingBlock> {
    HEADING_BLOCK_RE
        .captures_iter(html)
        .map(|caps| HeadingBlock {
            heading: normalize_width(&inline_text(&caps[1])),
            body: normalize_width(&inline_text(&caps[3])),
        })
        .filter(|block| !block.heading.is_empty())
        .collect()
}

/// `<h1>` があればそれ、なければ `<title>`
pub fn page_title(html: &str) -> Option<String> {
    let from_h1 = H1_RE
        .captures(html)
        .map(|caps| inline_text(&caps[1]))
        .filter(|text| !text.is_empty());
    if from_h1.is_some() {
        return from_h1;
    }

    TITLE_RE
        .captures(html)
        .map(|caps| super::normalize::strip_site_suffix(&inline_text(&caps[1])))
        .filter(|text| !text.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_tags_keeps_block_structure() {
        let html = r#"<div><p>親子ひろば&nbsp;開催</p><script>var x = "<p>";</script>
            <table><tr><th>日時</th><td>4月10日</td></tr></table><!-- note --></div>"#;
        assert_eq!(strip_tags(html), "親子ひろば 開催\n日時 4月10日");
    }

    #[test]
    fn entities_are_decoded() {
        assert_eq!(decode_entities("A&amp;B &#12354; &#x3042; &unknown;"), "A&B あ あ &unknown;");
    }

    #[test]
    fn links_are_resolved_and_deduplicated() {
        let html = r##"<a href="/kosodate/event1.html">教室</a>
            <a href="event2.html#top">ひろば</a>
            <a href="/kosodate/event1.html">重複</a>
            <a href="mailto:info@example.jp">mail</a>
            <a href="#main">skip</a>"##;
        let links = extract_links(html, "https://www.city.example.jp/kosodate/index.html");
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].href, "https://www.city.example.jp/kosodate/event1.html");
        assert_eq!(links[0].text, "教室");
        assert_eq!(links[1].href, "https://www.city.example.jp/kosodate/event2.html");
    }

    #[test]
    fn tables_are_split_into_cells() {
        let html = "<table><tr><th>会場</th><td>中央公民館<br>（本町1-2-3）</td></tr>\
                    <tr><td>定員</td><td>１０組</td></tr></table>";
        let tables = extract_tables(html);
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0][0], vec!["会場", "中央公民館 (本町1-2-3)"]);
        assert_eq!(tables[0][1], vec!["定員", "10組"]);
    }

    #[test]
    fn definition_pairs_and_heading_blocks() {
        let html = "<dl><dt>場所</dt><dd>子育て支援センター</dd></dl>\
                    <h3>会場</h3><p>市民会館 大ホール</p>";
        assert_eq!(
            definition_pairs(html),
            vec![("場所".to_string(), "子育て支援センター".to_string())]
        );
        let blocks = heading_blocks(html);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].heading, "会場");
        assert_eq!(blocks[0].body, "市民会館 大ホール");
    }

    #[test]
    fn page_title_prefers_h1() {
        assert_eq!(
            page_title("<title>離乳食教室 | 〇〇市</title><h1>離乳食教室（前期）</h1>"),
            Some("離乳食教室（前期）".to_string())
        );
        assert_eq!(
            page_title("<title>離乳食教室 | 〇〇市</title>"),
            Some("離乳食教室".to_string())
        );
        assert_eq!(page_title("<p>no title</p>"), None);
    }
}
