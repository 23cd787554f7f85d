//! 詳細ページ 1 枚 → イベント候補
//!
//! 日付は (a) 本文セグメントのトークン (b) 繰り返し指定 (c) 日程表 の和集合。
//! 「日時」「開催日」などの見出し付きセグメントに日付があればそちらを優先し、
//! 申込期間・受付期間の日付は開催日として扱わない。

use std::collections::BTreeSet;

use chrono::NaiveDate;
use lazy_static::lazy_static;
use regex::Regex;

use crate::date::{
    expand, extract_segments, parse_recurrence, parse_time_range, resolve_table, scan_segment, DateToken,
    FiscalYearContext, RecurrenceSpec, TimeRange, YearDeclaration,
};
use crate::event::RawEventCandidate;
use crate::text::{clean_title, collapse_whitespace, Document};
use crate::venue::{self, VenueResolution};

/// 開催日を表す見出し
const SCHEDULE_LABELS: &[&str] = &["日時", "開催日時", "開催日", "日程", "期日", "とき", "開催期間", "会期"];

/// 開催日ではない日付の見出し
const EXCLUDED_LABELS: &[&str] = &["申込", "申し込み", "受付", "締切", "締め切り", "募集期間", "応募"];

lazy_static! {
    static ref LABEL_RE: Regex =
        Regex::new(r"^[\s■□●○◆◇▼▽・◎★☆\[【]*([^\s:\]】]{1,8})\s*[\]】]?\s*(?::|\s|$)").unwrap();
    static ref TITLE_TRAILER_RE: Regex = Regex::new(r"[\s:、,。は]+$").unwrap();
    static ref MARKDOWN_HEADING_RE: Regex = Regex::new(r"(?m)^#{1,6}\s+\S").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SegmentRole {
    Schedule,
    Excluded,
    Plain,
}

fn label_role(segment: &str) -> Option<SegmentRole> {
    let caps = LABEL_RE.captures(segment)?;
    let label = caps.get(1)?.as_str();
    if SCHEDULE_LABELS.contains(&label) {
        Some(SegmentRole::Schedule)
    } else if EXCLUDED_LABELS.iter().any(|l| label.starts_with(l)) {
        Some(SegmentRole::Excluded)
    } else {
        None
    }
}

/// 見出しだけの行（dt や th が単独行になったもの）は次の行に役割を引き継ぐ
fn segment_roles(segments: &[&str]) -> Vec<SegmentRole> {
    let mut roles = Vec::with_capacity(segments.len());
    let mut carried: Option<SegmentRole> = None;

    for segment in segments {
        let own = label_role(segment);
        let role = own.or(carried.take()).unwrap_or(SegmentRole::Plain);
        roles.push(role);

        let bare_label = own.is_some()
            && LABEL_RE
                .find(segment)
                .map(|m| segment[m.end()..].trim().is_empty())
                .unwrap_or(false);
        if bare_label {
            carried = own;
        }
    }

    roles
}

/// 表の先頭行に当たるセグメントの位置（`from` 以降）
///
/// 表の行は `strip_tags` でセルを空白区切りにした 1 行になっている。
fn table_position(table: &[Vec<String>], segments: &[&str], from: usize) -> Option<usize> {
    let first_row = table.first()?;
    let cells: Vec<&str> = first_row.iter().map(|c| c.trim()).filter(|c| !c.is_empty()).collect();
    let key = cells.join(" ");
    let head = *cells.first()?;
    let rest = segments.get(from..)?;

    rest.iter()
        .position(|segment| segment.trim() == key)
        .or_else(|| rest.iter().position(|segment| segment.trim_start().starts_with(head)))
        .map(|offset| from + offset)
}

/// 詳細ページの解析結果
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedDetail {
    pub candidate: RawEventCandidate,
    pub venue: VenueResolution,
    pub recurrences: Vec<RecurrenceSpec>,
    pub context: FiscalYearContext,
}

/// 最初の日付の直前の文字列（タイトルが取れない場合の代用）
pub fn title_before_first_date(segments: &[&str]) -> Option<String> {
    for (index, segment) in segments.iter().enumerate() {
        let Some(first) = scan_segment(segment).into_iter().next() else {
            continue;
        };
        let before = TITLE_TRAILER_RE.replace(segment[..first.start].trim(), "");
        let before = before.trim();
        if !before.is_empty() {
            return Some(collapse_whitespace(before));
        }
        return index
            .checked_sub(1)
            .map(|prev| collapse_whitespace(segments[prev]))
            .filter(|t| !t.is_empty());
    }
    None
}

/// 1 ページを解析する。タイトルが取れなければ None
pub fn parse_detail(doc: &Document, today: NaiveDate, horizon_days: i64) -> Option<ParsedDetail> {
    parse_detail_in(doc, None, today, horizon_days)
}

/// ページ自身に年度表記がなければ `inherited` の年度を使う（PDF の各記事など）
pub fn parse_detail_in(
    doc: &Document,
    inherited: Option<FiscalYearContext>,
    today: NaiveDate,
    horizon_days: i64,
) -> Option<ParsedDetail> {
    let own = FiscalYearContext::for_page(&doc.text, today);
    let page_context = match inherited {
        Some(base) if own.declared == YearDeclaration::Inferred => base,
        _ => own,
    };
    let segments = doc.segments();
    let roles = segment_roles(&segments);

    // entering[i]: セグメント i の直前の年度文脈、advanced[i]: i の年表記を反映した後
    let mut entering = Vec::with_capacity(segments.len());
    let mut advanced = Vec::with_capacity(segments.len());
    let mut context = page_context;
    let mut scheduled: Vec<DateToken> = Vec::new();
    let mut plain: Vec<DateToken> = Vec::new();
    for (segment, role) in segments.iter().zip(&roles) {
        entering.push(context);
        let (tokens, next) = extract_segments(&[*segment], context);
        context = next;
        advanced.push(context);
        match role {
            SegmentRole::Schedule => scheduled.extend(tokens),
            SegmentRole::Plain => plain.extend(tokens),
            SegmentRole::Excluded => {}
        }
    }

    let recurrences_for = |wanted: SegmentRole| -> Vec<RecurrenceSpec> {
        segments
            .iter()
            .zip(&roles)
            .zip(&advanced)
            .filter(|((_, role), _)| **role == wanted)
            .flat_map(|((segment, _), ctx)| parse_recurrence(segment, ctx))
            .collect()
    };

    // 「日時」欄が日付を持たない（「下記のとおり」など）ときは本文全体に戻る
    let schedule_recurrences = recurrences_for(SegmentRole::Schedule);
    let use_schedule = !scheduled.is_empty() || !schedule_recurrences.is_empty();
    let (preferred_role, recurrences, tokens) = if use_schedule {
        (SegmentRole::Schedule, schedule_recurrences, scheduled)
    } else {
        (SegmentRole::Plain, recurrences_for(SegmentRole::Plain), plain)
    };
    let preferred: Vec<&str> = segments
        .iter()
        .zip(&roles)
        .filter(|(_, role)| **role == preferred_role)
        .map(|(segment, _)| *segment)
        .collect();

    let mut dates: BTreeSet<DateToken> = tokens.into_iter().collect();
    for spec in &recurrences {
        dates.extend(expand(spec, today, horizon_days).into_iter().map(DateToken::from));
    }
    let mut cursor = 0;
    for table in &doc.tables {
        let table_context = match table_position(table, &segments, cursor) {
            Some(index) => {
                cursor = index + 1;
                entering[index]
            }
            None => page_context,
        };
        dates.extend(resolve_table(table, &table_context));
    }

    let time_range: Option<TimeRange> = preferred
        .iter()
        .chain(segments.iter().zip(&roles).filter(|(_, r)| **r == SegmentRole::Plain).map(|(s, _)| s))
        .find_map(|segment| parse_time_range(segment));

    let title = doc
        .title
        .as_deref()
        .map(clean_title)
        .filter(|t| !t.is_empty())
        .or_else(|| title_before_first_date(&segments))?;

    let venue = venue::resolve(doc);
    let candidate = RawEventCandidate {
        title,
        source_url: doc.url.clone(),
        venue_text: venue.venue_name().map(str::to_string),
        parenthetical_address: venue.parenthetical_address().map(str::to_string),
        address_text: venue.explicit_address().map(str::to_string),
        date_tokens: dates.into_iter().collect(),
        time_range,
    };

    Some(ParsedDetail {
        candidate,
        venue,
        recurrences,
        context: page_context,
    })
}

/// PDF のテキストを見出し（`#`）ごとに区切って解析する
///
/// 見出しがなければ全体を 1 件として扱う。
pub fn parse_pdf_text(url: &str, markdown: &str, today: NaiveDate, horizon_days: i64) -> Vec<ParsedDetail> {
    let starts: Vec<usize> = MARKDOWN_HEADING_RE.find_iter(markdown).map(|m| m.start()).collect();
    let sections: Vec<&str> = if starts.is_empty() {
        vec![markdown]
    } else {
        let mut bounds = starts;
        bounds.push(markdown.len());
        bounds.windows(2).map(|w| &markdown[w[0]..w[1]]).collect()
    };

    // 冒頭の「令和7年度 子育てだより」などの年度表記は各記事に引き継ぐ
    let page_context = FiscalYearContext::for_page(markdown, today);

    sections
        .into_iter()
        .filter_map(|section| {
            let doc = Document::from_text(url, section);
            parse_detail_in(&doc, Some(page_context), today, horizon_days)
        })
        .filter(|parsed| !parsed.candidate.date_tokens.is_empty())
        .collect()
}
