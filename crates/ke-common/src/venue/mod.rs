//! 会場・住所の抽出
//!
//! 自治体ページのマークアップはまちまちなので、名前付きの戦略を順に試し
//! 最初に取れたものを採用する。
//!
//! 1. `<dl>` の dt/dd（キーが会場・場所など）
//! 2. 2 列の表（th/td）
//! 3. キーと一致する見出しの直後のブロック
//! 4. 本文中の「会場：〇〇」（停止語で打ち切り）
//! 5. 施設名らしい語尾（センター・児童館・ひろば…）の部分文字列
//!
//! パンくず・サイトマップなどの定型句は捨てて次の戦略へ進む。

pub mod address;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::text::{collapse_whitespace, Document};

pub use address::{looks_like_address, split_parenthetical_address};

/// 会場を表すキー
pub const VENUE_KEYS: &[&str] = &["開催場所", "実施場所", "会場", "場所", "ところ"];

/// 住所を表すキー
pub const ADDRESS_KEYS: &[&str] = &["所在地", "住所"];

/// 本文中の「会場：」の値をここで打ち切る
const STOP_WORDS: &[&str] = &[
    "対象", "内容", "申込", "申し込み", "問い合わせ", "問合せ", "日時", "日程", "定員", "費用",
    "参加費", "持ち物", "持ちもの", "講師", "締切", "備考", "住所", "所在地", "電話", "料金",
    "。",
];

/// 施設名として取れる最大文字数
const MAX_VENUE_CHARS: usize = 60;

lazy_static! {
    static ref KEY_DECORATION_RE: Regex =
        Regex::new(r"^[\s■□●○◆◇▼▽・◎★☆\[【]+|[\s\]】:：]+$").unwrap();
    static ref INLINE_VENUE_RE: Regex = inline_label_regex(VENUE_KEYS);
    static ref INLINE_ADDRESS_RE: Regex = inline_label_regex(ADDRESS_KEYS);
    static ref FACILITY_RE: Regex = Regex::new(
        r"[^\s、。,:;「」『』()\[\]【】]{1,30}(?:子育て支援センター|支援センター|地区センター|センター|児童館|こども館|子ども館|ひろば|広場|プラザ|会館|公民館|図書館|体育館|支援拠点|集会所|ホール|コミュニティハウス|保健所)"
    )
    .unwrap();
    static ref LEAD_IN_RE: Regex =
        Regex::new(r"^(?:開催場所|実施場所|会場|場所|ところ)(?:は|:)?").unwrap();
    static ref JUNK_RE: Vec<Regex> = [
        r"ホーム\s*>",
        r">\s*\S+\s*>",
        r"トップページ",
        r"サイトマップ",
        r"現在位置",
        r"パンくず",
        r"ページの先頭",
        r"このページ",
        r"(?i)copyright",
        r"(?i)https?://",
        r"^(?:未定|調整中|決定次第|-+)$",
        r"^各\S{0,4}$",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).unwrap())
    .collect();
}

fn inline_label_regex(keys: &[&str]) -> Regex {
    let alternation = keys.join("|");
    Regex::new(&format!(
        r"(?:^|[\s■□●○◆◇▼▽・◎★☆\[【])(?:{alternation})\s*[\]】]?\s*:\s*(.+)$"
    ))
    .unwrap()
}

/// どの戦略で取れたか
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VenueStrategy {
    DefinitionList,
    TablePair,
    Heading,
    InlineLabel,
    FacilitySuffix,
}

impl VenueStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            VenueStrategy::DefinitionList => "definition_list",
            VenueStrategy::TablePair => "table_pair",
            VenueStrategy::Heading => "heading",
            VenueStrategy::InlineLabel => "inline_label",
            VenueStrategy::FacilitySuffix => "facility_suffix",
        }
    }
}

/// 会場の抽出結果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VenueMatch {
    /// 表示用の会場名（住所の括弧書きは除去済み）
    pub venue_name: String,
    /// 会場名の括弧書きから取り出した住所
    pub address: Option<String>,
    pub strategy: VenueStrategy,
}

/// 住所欄の抽出結果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressMatch {
    pub address: String,
    pub strategy: VenueStrategy,
}

/// 1 ページ分の会場・住所
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VenueResolution {
    pub venue: Option<VenueMatch>,
    pub explicit_address: Option<AddressMatch>,
}

impl VenueResolution {
    pub fn venue_name(&self) -> Option<&str> {
        self.venue.as_ref().map(|v| v.venue_name.as_str())
    }

    pub fn parenthetical_address(&self) -> Option<&str> {
        self.venue.as_ref().and_then(|v| v.address.as_deref())
    }

    pub fn explicit_address(&self) -> Option<&str> {
        self.explicit_address.as_ref().map(|a| a.address.as_str())
    }
}

/// 「【会場】」「■ 会 場：」→「会場」
fn normalize_key(raw: &str) -> String {
    let stripped = KEY_DECORATION_RE.replace_all(raw, "");
    stripped.chars().filter(|c| !c.is_whitespace()).collect()
}

fn key_matches(raw: &str, keys: &[&str]) -> bool {
    let key = normalize_key(raw);
    keys.iter().any(|k| *k == key)
}

/// 停止語の手前で切る
fn truncate_at_stop_words(value: &str) -> &str {
    let cut = STOP_WORDS
        .iter()
        .filter_map(|word| value.find(word))
        .filter(|&pos| pos > 0)
        .min()
        .unwrap_or(value.len());
    &value[..cut]
}

fn is_junk(value: &str) -> bool {
    JUNK_RE.iter().any(|re| re.is_match(value))
}

/// 値を整えて採用可否を判定する
fn accept_value(raw: &str) -> Option<String> {
    let value = collapse_whitespace(raw);
    let value = value.trim_matches(|c: char| c.is_whitespace() || c == ':' || c == '、');
    if value.is_empty() || value.chars().count() > MAX_VENUE_CHARS * 2 || is_junk(value) {
        return None;
    }
    if value.chars().all(|c| c.is_ascii_punctuation() || c.is_ascii_digit()) {
        return None;
    }
    Some(value.to_string())
}

fn from_definitions(doc: &Document, keys: &[&str]) -> Option<String> {
    doc.definitions
        .iter()
        .filter(|(key, _)| key_matches(key, keys))
        .find_map(|(_, value)| accept_value(value))
}

fn from_table_pairs(doc: &Document, keys: &[&str]) -> Option<String> {
    doc.tables
        .iter()
        .flatten()
        .filter(|row| row.len() == 2 && key_matches(&row[0], keys))
        .find_map(|row| accept_value(&row[1]))
}

fn from_headings(doc: &Document, keys: &[&str]) -> Option<String> {
    doc.headings
        .iter()
        .filter(|block| key_matches(&block.heading, keys))
        .find_map(|block| accept_value(&block.body))
}

fn from_inline(doc: &Document, pattern: &Regex) -> Option<String> {
    doc.text.lines().find_map(|line| {
        let caps = pattern.captures(line)?;
        accept_value(truncate_at_stop_words(caps.get(1)?.as_str()))
    })
}

fn from_facility_suffix(doc: &Document) -> Option<String> {
    doc.text.lines().find_map(|line| {
        FACILITY_RE.find_iter(line).find_map(|m| {
            let name = LEAD_IN_RE.replace(m.as_str(), "");
            accept_value(&name)
        })
    })
}

fn venue_match(raw: String, strategy: VenueStrategy) -> Option<VenueMatch> {
    let (venue_name, address) = split_parenthetical_address(&raw);
    let venue_name: String = venue_name.chars().take(MAX_VENUE_CHARS).collect();
    if venue_name.is_empty() {
        return None;
    }
    Some(VenueMatch {
        venue_name,
        address,
        strategy,
    })
}

/// 会場を戦略順に探す
pub fn resolve_venue(doc: &Document) -> Option<VenueMatch> {
    let chain: [(VenueStrategy, fn(&Document) -> Option<String>); 5] = [
        (VenueStrategy::DefinitionList, |d| from_definitions(d, VENUE_KEYS)),
        (VenueStrategy::TablePair, |d| from_table_pairs(d, VENUE_KEYS)),
        (VenueStrategy::Heading, |d| from_headings(d, VENUE_KEYS)),
        (VenueStrategy::InlineLabel, |d| from_inline(d, &INLINE_VENUE_RE)),
        (VenueStrategy::FacilitySuffix, from_facility_suffix),
    ];

    chain
        .iter()
        .find_map(|(strategy, run)| run(doc).and_then(|raw| venue_match(raw, *strategy)))
}

/// 住所欄（住所・所在地）を探す。見出しと施設名推定は使わない
pub fn resolve_address(doc: &Document) -> Option<AddressMatch> {
    let found = from_definitions(doc, ADDRESS_KEYS)
        .map(|a| (a, VenueStrategy::DefinitionList))
        .or_else(|| from_table_pairs(doc, ADDRESS_KEYS).map(|a| (a, VenueStrategy::TablePair)))
        .or_else(|| from_inline(doc, &INLINE_ADDRESS_RE).map(|a| (a, VenueStrategy::InlineLabel)))?;

    Some(AddressMatch {
        address: found.0,
        strategy: found.1,
    })
}

pub fn resolve(doc: &Document) -> VenueResolution {
    VenueResolution {
        venue: resolve_venue(doc),
        explicit_address: resolve_address(doc),
    }
}
