//! 繰り返し指定の展開
//!
//! - 毎週X曜日 → 期間内の該当曜日すべて
//! - 毎月第N X曜日（複数の N 可） → 各月の該当日
//! - M月D日〜M月D日（の毎週X曜日） → 範囲内の日（曜日で絞り込み）
//!
//! 期間は JST の今日から `horizon_days` 日（上限 365）。解釈できない指定は
//! エラーにせず空リストを返す。

use std::collections::BTreeSet;

use chrono::{Datelike, NaiveDate, Weekday};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::fiscal::FiscalYearContext;
use super::token::DateToken;
use crate::text::normalize_width;
use crate::timezone::horizon_end;

pub const DEFAULT_HORIZON_DAYS: i64 = 30;
pub const MAX_HORIZON_DAYS: i64 = 365;

lazy_static! {
    static ref WEEKDAY_ITEM_RE: Regex = Regex::new(r"([月火水木金土日])(?:曜日?)?").unwrap();
    static ref WEEKLY_RE: Regex = Regex::new(
        r"毎週\s*([月火水木金土日](?:曜日?)?(?:\s*[・、,と]\s*[月火水木金土日](?:曜日?)?)*)"
    )
    .unwrap();
    static ref NTH_WEEKDAY_RE: Regex = Regex::new(
        r"第\s*([1-5一二三四五](?:\s*[・、,と]\s*第?\s*[1-5一二三四五])*)\s*([月火水木金土日])曜日?"
    )
    .unwrap();
    static ref NTH_ITEM_RE: Regex = Regex::new(r"[1-5一二三四五]").unwrap();
    static ref RANGE_RE: Regex = Regex::new(
        r"(?:(\d{4})\s*年\s*)?(\d{1,2})\s*月\s*(\d{1,2})\s*日(?:\s*\([^)]{1,8}\))?\s*(?:~|〜|ー|-|–|から)\s*(?:(\d{4})\s*年\s*)?(?:(\d{1,2})\s*月\s*)?(\d{1,2})\s*日(?:\s*\([^)]{1,8}\))?(?:\s*まで)?(?:\s*の)?(?:\s*毎週\s*([月火水木金土日])曜日?)?"
    )
    .unwrap();
}

/// 繰り返し指定
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecurrenceSpec {
    Weekly {
        weekdays: Vec<Weekday>,
    },
    NthWeekday {
        nths: Vec<u32>,
        weekday: Weekday,
    },
    Range {
        start: NaiveDate,
        end: NaiveDate,
        weekday: Option<Weekday>,
    },
}

/// 漢字 1 文字の曜日
pub fn weekday_from_kanji(c: char) -> Option<Weekday> {
    match c {
        '月' => Some(Weekday::Mon),
        '火' => Some(Weekday::Tue),
        '水' => Some(Weekday::Wed),
        '木' => Some(Weekday::Thu),
        '金' => Some(Weekday::Fri),
        '土' => Some(Weekday::Sat),
        '日' => Some(Weekday::Sun),
        _ => None,
    }
}

fn nth_from_char(c: char) -> Option<u32> {
    match c {
        '1' | '一' => Some(1),
        '2' | '二' => Some(2),
        '3' | '三' => Some(3),
        '4' | '四' => Some(4),
        '5' | '五' => Some(5),
        _ => None,
    }
}

fn first_char_weekday(s: &str) -> Option<Weekday> {
    s.chars().next().and_then(weekday_from_kanji)
}

/// その月の第 nth weekday。月をはみ出す場合は None
pub fn expand_nth_weekday(nth: u32, weekday: Weekday, year: i32, month: u32) -> Option<NaiveDate> {
    if !(1..=5).contains(&nth) {
        return None;
    }
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let offset = (weekday.num_days_from_monday() + 7 - first.weekday().num_days_from_monday()) % 7;
    let day = 1 + offset + (nth - 1) * 7;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// end が start より前なら翌年の同じ日付とみなす
fn normalized_end(start: NaiveDate, end: NaiveDate) -> Option<NaiveDate> {
    if end < start {
        end.with_year(end.year() + 1).filter(|shifted| *shifted >= start)
    } else {
        Some(end)
    }
}

fn days_between(from: NaiveDate, to: NaiveDate, weekday: Option<Weekday>) -> Vec<NaiveDate> {
    from.iter_days()
        .take_while(|day| *day <= to)
        .filter(|day| weekday.map_or(true, |wd| day.weekday() == wd))
        .collect()
}

/// start〜end を 1 日ずつ（両端含む）。end が start より前なら end を翌年に送る
pub fn expand_range(start: NaiveDate, end: NaiveDate, weekday: Option<Weekday>) -> Vec<NaiveDate> {
    match normalized_end(start, end) {
        Some(end) => days_between(start, end, weekday),
        None => Vec::new(),
    }
}

fn expand_weekly(weekdays: &[Weekday], from: NaiveDate, to: NaiveDate) -> Vec<NaiveDate> {
    if weekdays.is_empty() {
        return Vec::new();
    }
    from.iter_days()
        .take_while(|day| *day <= to)
        .filter(|day| weekdays.contains(&day.weekday()))
        .collect()
}

fn expand_nth_in_window(nths: &[u32], weekday: Weekday, from: NaiveDate, to: NaiveDate) -> Vec<NaiveDate> {
    let mut dates = BTreeSet::new();
    let (mut year, mut month) = (from.year(), from.month());

    while (year, month) <= (to.year(), to.month()) {
        for &nth in nths {
            if let Some(date) = expand_nth_weekday(nth, weekday, year, month) {
                if date >= from && date <= to {
                    dates.insert(date);
                }
            }
        }
        if month == 12 {
            year += 1;
            month = 1;
        } else {
            month += 1;
        }
    }

    dates.into_iter().collect()
}

/// 指定を `[today, today + horizon_days]` の日付列に展開する（昇順・重複なし）
pub fn expand(spec: &RecurrenceSpec, today: NaiveDate, horizon_days: i64) -> Vec<NaiveDate> {
    let to = horizon_end(today, horizon_days);

    match spec {
        RecurrenceSpec::Weekly { weekdays } => expand_weekly(weekdays, today, to),
        RecurrenceSpec::NthWeekday { nths, weekday } => {
            expand_nth_in_window(nths, *weekday, today, to)
        }
        RecurrenceSpec::Range { start, end, weekday } => match normalized_end(*start, *end) {
            // 範囲は窓 [today, to] で切ってから展開する
            Some(end) => days_between((*start).max(today), end.min(to), *weekday),
            None => Vec::new(),
        },
    }
}

fn range_endpoint(year: Option<i32>, month: u32, day: u32, context: &FiscalYearContext) -> Option<NaiveDate> {
    match year {
        Some(y) => DateToken::new(Some(y), month, day)?.to_date(),
        None => context.resolve(month, day)?.to_date(),
    }
}

/// テキスト中の繰り返し指定をすべて拾う
///
/// 曜日指定のない範囲は「開催期間」「会期」を含む文のみ対象（申込期間を
/// 毎日の開催と誤認しないため）。
pub fn parse_recurrence(text: &str, context: &FiscalYearContext) -> Vec<RecurrenceSpec> {
    let text = normalize_width(text);
    let mut specs = Vec::new();
    let mut range_spans: Vec<(usize, usize)> = Vec::new();

    for caps in RANGE_RE.captures_iter(&text) {
        let Some(whole) = caps.get(0) else { continue };
        let weekday = caps.get(7).and_then(|m| first_char_weekday(m.as_str()));
        let period_context = text.contains("開催期間") || text.contains("会期");
        if weekday.is_none() && !period_context {
            continue;
        }

        let parse = |idx: usize| caps.get(idx).and_then(|m| m.as_str().parse::<u32>().ok());
        let (Some(start_month), Some(start_day), Some(end_day)) = (parse(2), parse(3), parse(6)) else {
            continue;
        };
        let start_year = caps.get(1).and_then(|m| m.as_str().parse::<i32>().ok());
        let end_year = caps.get(4).and_then(|m| m.as_str().parse::<i32>().ok());
        let end_month = parse(5).unwrap_or(start_month);

        let Some(start) = range_endpoint(start_year, start_month, start_day, context) else {
            continue;
        };
        // 終了側の年は明記がなければ開始と同じ年。年をまたぐ場合は翌年
        let end = match end_year {
            Some(y) => DateToken::new(Some(y), end_month, end_day).and_then(|t| t.to_date()),
            None => DateToken::new(Some(start.year()), end_month, end_day).and_then(|t| t.to_date()),
        };
        let Some(mut end) = end else { continue };
        if end < start {
            match end.with_year(end.year() + 1) {
                Some(shifted) => end = shifted,
                None => continue,
            }
        }

        range_spans.push((whole.start(), whole.end()));
        specs.push(RecurrenceSpec::Range { start, end, weekday });
    }

    for caps in WEEKLY_RE.captures_iter(&text) {
        let Some(whole) = caps.get(0) else { continue };
        if range_spans.iter().any(|&(s, e)| whole.start() < e && s < whole.end()) {
            continue;
        }
        let mut weekdays: Vec<Weekday> = Vec::new();
        for item in WEEKDAY_ITEM_RE.captures_iter(&caps[1]) {
            if let Some(wd) = first_char_weekday(&item[1]) {
                if !weekdays.contains(&wd) {
                    weekdays.push(wd);
                }
            }
        }
        if !weekdays.is_empty() {
            specs.push(RecurrenceSpec::Weekly { weekdays });
        }
    }

    for caps in NTH_WEEKDAY_RE.captures_iter(&text) {
        let mut nths: Vec<u32> = NTH_ITEM_RE
            .find_iter(&caps[1])
            .filter_map(|m| m.as_str().chars().next().and_then(nth_from_char))
            .collect();
        nths.sort_unstable();
        nths.dedup();
        let Some(weekday) = first_char_weekday(&caps[2]) else { continue };
        if !nths.is_empty() {
            specs.push(RecurrenceSpec::NthWeekday { nths, weekday });
        }
    }

    specs
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn nth_weekday_uses_first_of_month_offset() {
        // 2026年3月1日は日曜
        assert_eq!(expand_nth_weekday(2, Weekday::Fri, 2026, 3), Some(ymd(2026, 3, 13)));
        assert_eq!(expand_nth_weekday(1, Weekday::Sun, 2026, 3), Some(ymd(2026, 3, 1)));
        assert_eq!(expand_nth_weekday(5, Weekday::Tue, 2026, 3), Some(ymd(2026, 3, 31)));
    }

    #[test]
    fn nth_weekday_rejects_days_beyond_month_end() {
        assert_eq!(expand_nth_weekday(5, Weekday::Fri, 2026, 2), None);
        assert_eq!(expand_nth_weekday(0, Weekday::Fri, 2026, 2), None);
        assert_eq!(expand_nth_weekday(6, Weekday::Fri, 2026, 2), None);
    }

    #[test]
    fn range_with_weekday_filter() {
        assert_eq!(
            expand_range(ymd(2026, 2, 7), ymd(2026, 2, 28), Some(Weekday::Sat)),
            vec![ymd(2026, 2, 7), ymd(2026, 2, 14), ymd(2026, 2, 21), ymd(2026, 2, 28)]
        );
    }

    #[test]
    fn range_end_before_start_wraps_into_next_year() {
        let days = expand_range(ymd(2025, 12, 30), ymd(2025, 1, 2), None);
        assert_eq!(
            days,
            vec![ymd(2025, 12, 30), ymd(2025, 12, 31), ymd(2026, 1, 1), ymd(2026, 1, 2)]
        );
    }

    #[test]
    fn multi_year_range_is_clipped_to_the_window() {
        let ctx = FiscalYearContext::explicit(2025);
        let specs = parse_recurrence("2025年4月1日〜2027年3月31日の毎週土曜日", &ctx);
        assert_eq!(
            specs,
            vec![RecurrenceSpec::Range {
                start: ymd(2025, 4, 1),
                end: ymd(2027, 3, 31),
                weekday: Some(Weekday::Sat),
            }]
        );
        assert_eq!(
            expand(&specs[0], ymd(2026, 10, 19), 30),
            vec![ymd(2026, 10, 24), ymd(2026, 10, 31), ymd(2026, 11, 7), ymd(2026, 11, 14)]
        );
        assert_eq!(expand_range(ymd(2025, 4, 1), ymd(2027, 3, 31), Some(Weekday::Sat)).len(), 104);
    }

    #[test]
    fn weekly_expansion_walks_the_horizon() {
        let today = ymd(2026, 3, 1);
        let spec = RecurrenceSpec::Weekly {
            weekdays: vec![Weekday::Wed],
        };
        assert_eq!(
            expand(&spec, today, 14),
            vec![ymd(2026, 3, 4), ymd(2026, 3, 11)]
        );
    }

    #[test]
    fn nth_expansion_spans_months_within_horizon() {
        let today = ymd(2026, 3, 14);
        let spec = RecurrenceSpec::NthWeekday {
            nths: vec![2, 4],
            weekday: Weekday::Fri,
        };
        assert_eq!(
            expand(&spec, today, 30),
            vec![ymd(2026, 3, 27), ymd(2026, 4, 10)]
        );
    }

    #[test]
    fn horizon_is_capped() {
        let today = ymd(2026, 1, 1);
        let spec = RecurrenceSpec::Weekly {
            weekdays: vec![Weekday::Mon],
        };
        let days = expand(&spec, today, 10_000);
        assert!(days.last().unwrap() <= &(today + Duration::days(MAX_HORIZON_DAYS)));
        assert_eq!(days.len(), 52);
    }

    #[test]
    fn malformed_specs_expand_to_nothing() {
        let today = ymd(2026, 1, 1);
        assert!(expand(&RecurrenceSpec::Weekly { weekdays: vec![] }, today, 30).is_empty());
        assert!(expand(
            &RecurrenceSpec::NthWeekday {
                nths: vec![9],
                weekday: Weekday::Mon
            },
            today,
            30
        )
        .is_empty());
    }

    #[test]
    fn parses_japanese_recurrence_phrases() {
        let ctx = FiscalYearContext::explicit(2025);
        assert_eq!(
            parse_recurrence("毎週水曜日・金曜日 10時から", &ctx),
            vec![RecurrenceSpec::Weekly {
                weekdays: vec![Weekday::Wed, Weekday::Fri]
            }]
        );
        assert_eq!(
            parse_recurrence("毎月第２・第４金曜日", &ctx),
            vec![RecurrenceSpec::NthWeekday {
                nths: vec![2, 4],
                weekday: Weekday::Fri
            }]
        );
        assert_eq!(
            parse_recurrence("第1・3火曜日", &ctx),
            vec![RecurrenceSpec::NthWeekday {
                nths: vec![1, 3],
                weekday: Weekday::Tue
            }]
        );
    }

    #[test]
    fn parses_ranges_with_weekday_filter() {
        let ctx = FiscalYearContext::explicit(2025);
        assert_eq!(
            parse_recurrence("2月7日(土)〜2月28日(土)の毎週土曜日", &ctx),
            vec![RecurrenceSpec::Range {
                start: ymd(2026, 2, 7),
                end: ymd(2026, 2, 28),
                weekday: Some(Weekday::Sat)
            }]
        );
    }

    #[test]
    fn plain_ranges_need_a_period_label() {
        let ctx = FiscalYearContext::explicit(2025);
        assert!(parse_recurrence("申込期間 4月1日〜4月20日", &ctx).is_empty());
        assert_eq!(
            parse_recurrence("開催期間 12月26日〜1月7日", &ctx),
            vec![RecurrenceSpec::Range {
                start: ymd(2025, 12, 26),
                end: ymd(2026, 1, 7),
                weekday: None
            }]
        );
    }

    #[test]
    fn unrecognized_text_yields_no_specs() {
        let ctx = FiscalYearContext::explicit(2025);
        assert!(parse_recurrence("詳しくはお問い合わせください", &ctx).is_empty());
    }
}
