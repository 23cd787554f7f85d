//! 年度（4月〜翌3月）を基準にした年の補完
//!
//! 自治体ページの「4月10日」「1月15日」には年がない。年度の表記
//! （令和7年度 / 2025年度）、直前の年表記（2026年1月…）、最後に JST の現在年度、
//! の順で年度を決め、4〜12月は年度の年、1〜3月は翌年として解決する。

use chrono::NaiveDate;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::era::era_to_western;
use super::token::{mentions_birth_or_target, sentence_around, DateToken};
use crate::timezone::{fiscal_year_of, today_jst};

lazy_static! {
    static ref YEAR_MARKER_RE: Regex = Regex::new(
        r"(?:(令和|平成)\s*(\d{1,2}|元)|(\d{4}))\s*年\s*(度)?(?:\s*(\d{1,2})\s*月)?"
    )
    .unwrap();
    static ref FIRST_MONTH_RE: Regex = Regex::new(r"(\d{1,2})\s*月").unwrap();
}

/// 年度がどこから来たか
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum YearDeclaration {
    /// ページ上の年度・年表記から
    Explicit,
    /// 表記がなく JST の現在年度を採用
    Inferred,
}

/// 走査中の年度文脈
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FiscalYearContext {
    pub fiscal_year: i32,
    pub declared: YearDeclaration,
}

/// ページ上の年表記
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum YearMarker {
    /// 「令和7年度」「2025年度」
    Fiscal(i32),
    /// 「2026年」「令和8年1月」
    Calendar { year: i32, month: Option<u32> },
}

/// セグメント内の位置付き年表記
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocatedMarker {
    pub position: usize,
    pub marker: YearMarker,
    /// 後続の裸の月日に適用する年度
    pub fiscal_year: i32,
}

impl FiscalYearContext {
    pub fn explicit(fiscal_year: i32) -> Self {
        Self {
            fiscal_year,
            declared: YearDeclaration::Explicit,
        }
    }

    /// 基準日の属する年度
    pub fn inferred(today: NaiveDate) -> Self {
        Self {
            fiscal_year: fiscal_year_of(today),
            declared: YearDeclaration::Inferred,
        }
    }

    /// JST の現在年度
    pub fn current() -> Self {
        Self::inferred(today_jst())
    }

    /// ページ全体の既定値: 最初の「◯年度」表記、なければ基準日の年度
    pub fn for_page(text: &str, today: NaiveDate) -> Self {
        find_year_markers(text)
            .into_iter()
            .find_map(|located| match located.marker {
                YearMarker::Fiscal(fy) => Some(Self::explicit(fy)),
                YearMarker::Calendar { .. } => None,
            })
            .unwrap_or_else(|| Self::inferred(today))
    }

    pub fn with_fiscal_year(self, fiscal_year: i32) -> Self {
        Self::explicit(fiscal_year)
    }

    /// セグメント内の年表記をすべて反映した文脈を返す
    pub fn advance(self, segment: &str) -> Self {
        find_year_markers(segment)
            .last()
            .map(|located| self.with_fiscal_year(located.fiscal_year))
            .unwrap_or(self)
    }

    pub fn resolve(&self, month: u32, day: u32) -> Option<DateToken> {
        resolve(month, day, self)
    }

    /// 年度内の暦年（4〜12月 → 年度、1〜3月 → 年度+1）
    pub fn calendar_year_for(&self, month: u32) -> i32 {
        if month >= 4 {
            self.fiscal_year
        } else {
            self.fiscal_year + 1
        }
    }
}

/// 裸の月日に年を与える。存在しない日付（平年の 2/29 など）は None
pub fn resolve(month: u32, day: u32, context: &FiscalYearContext) -> Option<DateToken> {
    if !(1..=12).contains(&month) {
        return None;
    }
    DateToken::new(Some(context.calendar_year_for(month)), month, day)
}

fn marker_fiscal_year(marker: YearMarker, month_after: Option<u32>) -> i32 {
    match marker {
        YearMarker::Fiscal(fy) => fy,
        YearMarker::Calendar { year, month } => match month.or(month_after) {
            Some(m) if m < 4 => year - 1,
            _ => year,
        },
    }
}

/// セグメント内の年表記を文書順に列挙する
///
/// 生年月日・対象年齢の文（「〜生まれ」「対象」）の中の表記は年度文脈に使わない。
pub fn find_year_markers(segment: &str) -> Vec<LocatedMarker> {
    YEAR_MARKER_RE
        .captures_iter(segment)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            if mentions_birth_or_target(sentence_around(segment, whole.start(), whole.end())) {
                return None;
            }

            let year = match (caps.get(1), caps.get(2), caps.get(3)) {
                (Some(era), Some(n), _) => era_to_western(era.as_str(), n.as_str())?,
                (_, _, Some(western)) => western.as_str().parse().ok()?,
                _ => return None,
            };
            let month = caps
                .get(5)
                .and_then(|m| m.as_str().parse::<u32>().ok())
                .filter(|m| (1..=12).contains(m));

            let marker = if caps.get(4).is_some() {
                YearMarker::Fiscal(year)
            } else {
                YearMarker::Calendar { year, month }
            };

            let month_after = match marker {
                YearMarker::Calendar { month: None, .. } => FIRST_MONTH_RE
                    .captures(&segment[whole.end()..])
                    .and_then(|c| c[1].parse::<u32>().ok())
                    .filter(|m| (1..=12).contains(m)),
                _ => None,
            };

            Some(LocatedMarker {
                position: whole.start(),
                marker,
                fiscal_year: marker_fiscal_year(marker, month_after),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn april_to_december_stay_in_fiscal_year() {
        let ctx = FiscalYearContext::explicit(2025);
        for month in 4..=12 {
            assert_eq!(resolve(month, 1, &ctx).unwrap().year, Some(2025), "month {month}");
        }
    }

    #[test]
    fn january_to_march_roll_into_next_year() {
        let ctx = FiscalYearContext::explicit(2025);
        for month in 1..=3 {
            assert_eq!(resolve(month, 1, &ctx).unwrap().year, Some(2026), "month {month}");
        }
        assert_eq!(
            resolve(1, 15, &ctx),
            DateToken::new(Some(2026), 1, 15)
        );
    }

    #[test]
    fn invalid_days_do_not_resolve() {
        let ctx = FiscalYearContext::explicit(2026);
        // 2027-02-29 は存在しない
        assert_eq!(resolve(2, 29, &ctx), None);
        assert_eq!(resolve(13, 1, &ctx), None);
        let leap = FiscalYearContext::explicit(2027);
        assert!(resolve(2, 29, &leap).is_some());
    }

    #[test]
    fn page_context_prefers_explicit_fiscal_year() {
        let today = ymd(2026, 10, 19);
        let ctx = FiscalYearContext::for_page("令和7年度 親子教室のご案内", today);
        assert_eq!(ctx, FiscalYearContext::explicit(2025));

        let ctx = FiscalYearContext::for_page("2024年度の日程", today);
        assert_eq!(ctx.fiscal_year, 2024);

        let ctx = FiscalYearContext::for_page("親子教室のご案内", today);
        assert_eq!(ctx, FiscalYearContext::inferred(today));
        assert_eq!(ctx.fiscal_year, 2026);
        assert_eq!(ctx.declared, YearDeclaration::Inferred);
    }

    #[test]
    fn calendar_markers_map_to_the_fiscal_year_of_their_month() {
        let markers = find_year_markers("2026年1月の予定");
        assert_eq!(markers.len(), 1);
        assert_eq!(markers[0].fiscal_year, 2025);

        let markers = find_year_markers("令和8年 2月10日、3月3日");
        assert_eq!(markers[0].fiscal_year, 2025);

        let markers = find_year_markers("2026年の予定 5月");
        assert_eq!(markers[0].fiscal_year, 2026);

        let markers = find_year_markers("2026年");
        assert_eq!(markers[0].marker, YearMarker::Calendar { year: 2026, month: None });
        assert_eq!(markers[0].fiscal_year, 2026);
    }

    #[test]
    fn advance_keeps_running_context_until_next_marker() {
        let ctx = FiscalYearContext::explicit(2025);
        let ctx = ctx.advance("4月10日 ひろば");
        assert_eq!(ctx.fiscal_year, 2025);
        let ctx = ctx.advance("令和8年度");
        assert_eq!(ctx.fiscal_year, 2026);
        assert_eq!(ctx.declared, YearDeclaration::Explicit);
    }

    #[test]
    fn birth_date_sentences_do_not_move_the_context() {
        assert!(find_year_markers("令和5年4月2日以降生まれのお子さん").is_empty());
        assert!(find_year_markers("対象:2023年4月生まれ").is_empty());
    }
}
