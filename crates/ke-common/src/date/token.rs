//! 自由文からの日付トークン抽出
//!
//! 優先順位:
//! 1. 西暦 `2025年5月14日`
//! 2. 和暦 `令和7年5月14日`（平成も可、「元年」対応）
//! 3. 短縮和暦 `R7.5.14` / `R7年5月14日`: 直後に曜日注記がある場合のみ
//! 4. 裸の `5月14日`: 年は年度文脈で補完
//!
//! 年付きの表記と重なる裸の月日は捨てる（年付きが優先）。

use std::collections::HashSet;

use chrono::NaiveDate;
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use super::era::era_to_western;
use super::fiscal::{find_year_markers, FiscalYearContext};
use crate::text::normalize_width;

lazy_static! {
    static ref WESTERN_DATE_RE: Regex =
        Regex::new(r"(\d{4})\s*年\s*(\d{1,2})\s*月\s*(\d{1,2})\s*日").unwrap();
    static ref ERA_DATE_RE: Regex =
        Regex::new(r"(令和|平成)\s*(\d{1,2}|元)\s*年\s*(\d{1,2})\s*月\s*(\d{1,2})\s*日").unwrap();
    static ref SHORT_ERA_RE: Regex = Regex::new(
        r"R\s*(\d{1,2})\s*(?:\.\s*(\d{1,2})\s*\.\s*(\d{1,2})|年\s*(\d{1,2})\s*月\s*(\d{1,2})\s*日)"
    )
    .unwrap();
    static ref WEEKDAY_NOTE_RE: Regex =
        Regex::new(r"^\s*\(\s*[月火水木金土日](?:曜日?)?\s*(?:[・,]\s*(?:祝|休)日?)?\s*\)").unwrap();
    static ref BARE_DATE_RE: Regex = Regex::new(r"(\d{1,2})\s*月\s*(\d{1,2})\s*日").unwrap();
    static ref DAY_CONTINUATION_RE: Regex =
        Regex::new(r"^\s*(?:\([^)]{1,8}\))?\s*[、,・]\s*(\d{1,2})\s*日").unwrap();
    static ref BIRTH_MARK_RE: Regex = Regex::new(r"[\d日月年]\s*生").unwrap();
}

/// 年度・対象・生年月日を表す文の目印
const TARGET_KEYWORDS: &[&str] = &["生まれ", "対象"];

/// 日付トークン。月日は常に暦上有効、年は未解決なら None
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DateToken {
    pub year: Option<i32>,
    pub month: u32,
    pub day: u32,
}

impl DateToken {
    /// 年なしの場合は 2/29 を許容、年ありの場合は実在する日付のみ
    pub fn new(year: Option<i32>, month: u32, day: u32) -> Option<Self> {
        if !(1..=12).contains(&month) || day == 0 {
            return None;
        }
        match year {
            Some(y) => {
                NaiveDate::from_ymd_opt(y, month, day)?;
            }
            None => {
                if day > max_day_in_any_year(month) {
                    return None;
                }
            }
        }
        Some(Self { year, month, day })
    }

    pub fn to_date(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year?, self.month, self.day)
    }

    pub fn is_resolved(&self) -> bool {
        self.year.is_some()
    }
}

impl From<NaiveDate> for DateToken {
    fn from(date: NaiveDate) -> Self {
        use chrono::Datelike;
        Self {
            year: Some(date.year()),
            month: date.month(),
            day: date.day(),
        }
    }
}

fn max_day_in_any_year(month: u32) -> u32 {
    match month {
        2 => 29,
        4 | 6 | 9 | 11 => 30,
        _ => 31,
    }
}

/// どの表記から取れたか
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenNotation {
    Western,
    Era,
    ShortEra,
    Bare,
    /// 「4月10日、23日」の「23日」
    Continuation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocatedToken {
    pub token: DateToken,
    pub start: usize,
    pub end: usize,
    pub notation: TokenNotation,
}

/// `start..end` を含む文（「。」区切り）
pub(crate) fn sentence_around(text: &str, start: usize, end: usize) -> &str {
    let from = text[..start]
        .rfind('。')
        .map(|i| i + '。'.len_utf8())
        .unwrap_or(0);
    let to = text[end..].find('。').map(|i| end + i).unwrap_or(text.len());
    &text[from..to]
}

/// 対象年齢・生年月日の文か
pub(crate) fn mentions_birth_or_target(sentence: &str) -> bool {
    TARGET_KEYWORDS.iter().any(|k| sentence.contains(k)) || BIRTH_MARK_RE.is_match(sentence)
}

/// 裸の月日を捨てるべき文か（年度への言及も含む）
fn excludes_bare_dates(sentence: &str) -> bool {
    sentence.contains("年度") || mentions_birth_or_target(sentence)
}

fn overlaps(spans: &[(usize, usize)], start: usize, end: usize) -> bool {
    spans.iter().any(|&(s, e)| start < e && s < end)
}

fn number(caps: &Captures, idx: usize) -> Option<u32> {
    caps.get(idx)?.as_str().parse().ok()
}

/// 「、23日」「・24日」の続きを拾う
fn push_continuations(
    text: &str,
    mut cursor: usize,
    year: Option<i32>,
    month: u32,
    out: &mut Vec<LocatedToken>,
) {
    while let Some(caps) = DAY_CONTINUATION_RE.captures(&text[cursor..]) {
        let (Some(whole), Some(day_match)) = (caps.get(0), caps.get(1)) else {
            break;
        };
        let start = cursor + day_match.start();
        let end = cursor + whole.end();
        // 「3日間」は期間であって日付ではない
        if text[end..].trim_start().starts_with('間') {
            break;
        }
        if let Some(token) = day_match
            .as_str()
            .parse()
            .ok()
            .and_then(|day| DateToken::new(year, month, day))
        {
            out.push(LocatedToken {
                token,
                start,
                end,
                notation: TokenNotation::Continuation,
            });
        }
        cursor = end;
    }
}

/// 幅正規化済みの 1 セグメントから位置付きトークンを抽出する
pub fn scan_segment(text: &str) -> Vec<LocatedToken> {
    let mut claimed: Vec<(usize, usize)> = Vec::new();
    let mut found: Vec<LocatedToken> = Vec::new();

    for caps in WESTERN_DATE_RE.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        claimed.push((whole.start(), whole.end()));
        let year = caps[1].parse::<i32>().ok();
        let (Some(month), Some(day)) = (number(&caps, 2), number(&caps, 3)) else {
            continue;
        };
        if let Some(token) = year.and_then(|y| DateToken::new(Some(y), month, day)) {
            found.push(LocatedToken {
                token,
                start: whole.start(),
                end: whole.end(),
                notation: TokenNotation::Western,
            });
            push_continuations(text, whole.end(), token.year, month, &mut found);
        }
    }

    for caps in ERA_DATE_RE.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        claimed.push((whole.start(), whole.end()));
        let year = era_to_western(&caps[1], &caps[2]);
        let (Some(month), Some(day)) = (number(&caps, 3), number(&caps, 4)) else {
            continue;
        };
        if let Some(token) = year.and_then(|y| DateToken::new(Some(y), month, day)) {
            found.push(LocatedToken {
                token,
                start: whole.start(),
                end: whole.end(),
                notation: TokenNotation::Era,
            });
            push_continuations(text, whole.end(), token.year, month, &mut found);
        }
    }

    // 曜日注記のない短縮和暦は生年月日の範囲表記と区別できないので捨てる。
    // 範囲は claimed に入れて、中の「5月14日」が裸の月日として拾われないようにする
    for caps in SHORT_ERA_RE.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        claimed.push((whole.start(), whole.end()));
        if !WEEKDAY_NOTE_RE.is_match(&text[whole.end()..]) {
            continue;
        }
        let year = era_to_western("R", &caps[1]);
        let month = number(&caps, 2).or_else(|| number(&caps, 4));
        let day = number(&caps, 3).or_else(|| number(&caps, 5));
        if let (Some(y), Some(month), Some(day)) = (year, month, day) {
            if let Some(token) = DateToken::new(Some(y), month, day) {
                found.push(LocatedToken {
                    token,
                    start: whole.start(),
                    end: whole.end(),
                    notation: TokenNotation::ShortEra,
                });
            }
        }
    }

    for caps in BARE_DATE_RE.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        if overlaps(&claimed, whole.start(), whole.end()) {
            continue;
        }
        if excludes_bare_dates(sentence_around(text, whole.start(), whole.end())) {
            continue;
        }
        let (Some(month), Some(day)) = (number(&caps, 1), number(&caps, 2)) else {
            continue;
        };
        if let Some(token) = DateToken::new(None, month, day) {
            found.push(LocatedToken {
                token,
                start: whole.start(),
                end: whole.end(),
                notation: TokenNotation::Bare,
            });
            push_continuations(text, whole.end(), None, month, &mut found);
        }
    }

    found.sort_by_key(|located| located.start);
    found
}

/// テキストから日付トークンを抽出する（裸の月日は year = None のまま）
///
/// (年,月,日) で重複除去し、年付きトークンと同じ月日の裸トークンは落とす。
pub fn extract(text: &str) -> Vec<DateToken> {
    let normalized = normalize_width(text);
    let located = scan_segment(&normalized);

    let dated: HashSet<(u32, u32)> = located
        .iter()
        .filter(|l| l.token.is_resolved())
        .map(|l| (l.token.month, l.token.day))
        .collect();

    let mut seen = HashSet::new();
    located
        .into_iter()
        .map(|l| l.token)
        .filter(|t| t.is_resolved() || !dated.contains(&(t.month, t.day)))
        .filter(|t| seen.insert(*t))
        .collect()
}

/// セグメント列を文書順に走査し、年度文脈を引き継ぎながら全トークンの年を確定する
///
/// 返り値は (確定済みトークン, 走査後の文脈)。
pub fn extract_segments<S: AsRef<str>>(
    segments: &[S],
    context: FiscalYearContext,
) -> (Vec<DateToken>, FiscalYearContext) {
    let mut ctx = context;
    let mut seen = HashSet::new();
    let mut resolved = Vec::new();

    for segment in segments {
        let text = normalize_width(segment.as_ref());
        let markers = find_year_markers(&text);
        let mut next_marker = 0;

        for located in scan_segment(&text) {
            while next_marker < markers.len() && markers[next_marker].position <= located.start {
                ctx = ctx.with_fiscal_year(markers[next_marker].fiscal_year);
                next_marker += 1;
            }

            let token = match located.token.year {
                Some(_) => Some(located.token),
                None => ctx.resolve(located.token.month, located.token.day),
            };
            if let Some(token) = token {
                if seen.insert(token) {
                    resolved.push(token);
                }
            }
        }

        if let Some(last) = markers.get(next_marker..).and_then(|rest| rest.last()) {
            ctx = ctx.with_fiscal_year(last.fiscal_year);
        }
    }

    (resolved, ctx)
}
