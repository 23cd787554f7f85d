//! 年・月・日が表の行と列に分かれている日程表の解決
//!
//! 2 つの形を扱う:
//! - 縦並び: 年度の行 → 月の行 → 日の行（同じ列どうしを組み合わせる）
//! - 月見出し: 見出し行に「2025年5月」「6月」…、以降の行に日だけ
//!
//! 行ごとにセル数が違う表でも、列番号が範囲外のセルは黙って読み飛ばす。

use std::collections::BTreeSet;

use lazy_static::lazy_static;
use regex::Regex;

use super::era::era_to_western;
use super::fiscal::FiscalYearContext;
use super::token::DateToken;
use crate::text::normalize_width;

lazy_static! {
    static ref YEAR_CELL_RE: Regex =
        Regex::new(r"^(?:(\d{4})|(令和|平成)\s*(\d{1,2}|元))\s*年\s*(度)?$").unwrap();
    static ref MONTH_CELL_RE: Regex = Regex::new(r"^(\d{1,2})\s*月$").unwrap();
    static ref MONTH_HEADER_RE: Regex = Regex::new(
        r"^(?:(?:(\d{4})|(令和|平成)\s*(\d{1,2}|元))\s*年\s*)?(\d{1,2})\s*月(?:\s*分)?$"
    )
    .unwrap();
    static ref DAY_CELL_RE: Regex = Regex::new(
        r"^(\d{1,2})\s*(?:日)?\s*(?:\(\s*[月火水木金土日](?:曜日?)?\s*(?:・\s*祝)?\s*\))?$"
    )
    .unwrap();
    static ref DAY_SPLIT_RE: Regex = Regex::new(r"[・、,\s]+").unwrap();
}

/// 表の 1 列ぶんの年指定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum YearCell {
    Fiscal(i32),
    Calendar(i32),
}

impl YearCell {
    /// この列の月を含む年度
    fn fiscal_year_for(self, month: u32) -> i32 {
        match self {
            YearCell::Fiscal(fy) => fy,
            YearCell::Calendar(year) if month < 4 => year - 1,
            YearCell::Calendar(year) => year,
        }
    }
}

fn cell(row: &[String], index: usize) -> Option<String> {
    row.get(index).map(|c| normalize_width(c.trim()))
}

fn parse_year_cell(text: &str) -> Option<YearCell> {
    let caps = YEAR_CELL_RE.captures(text.trim())?;
    let year = match (caps.get(1), caps.get(2), caps.get(3)) {
        (Some(western), _, _) => western.as_str().parse().ok()?,
        (None, Some(era), Some(n)) => era_to_western(era.as_str(), n.as_str())?,
        _ => return None,
    };
    Some(if caps.get(4).is_some() {
        YearCell::Fiscal(year)
    } else {
        YearCell::Calendar(year)
    })
}

fn parse_month_cell(text: &str) -> Option<u32> {
    MONTH_CELL_RE
        .captures(text.trim())
        .and_then(|caps| caps[1].parse::<u32>().ok())
        .filter(|m| (1..=12).contains(m))
}

/// 「10日」「10日(土)」「10日・24日」→ 日の一覧
fn parse_day_cell(text: &str) -> Vec<u32> {
    let text = text.trim();
    if let Some(day) = parse_single_day(text) {
        return vec![day];
    }
    // 単独の日として読めないセルだけ区切り文字で分ける（「3日(月・祝)」を割らない）
    DAY_SPLIT_RE
        .split(text)
        .filter(|part| !part.is_empty())
        .map(parse_single_day)
        .collect::<Option<Vec<_>>>()
        .unwrap_or_default()
}

fn parse_single_day(text: &str) -> Option<u32> {
    DAY_CELL_RE
        .captures(text)
        .and_then(|caps| caps[1].parse::<u32>().ok())
        .filter(|d| (1..=31).contains(d))
}

fn row_cells<F, T>(row: &[String], parse: F) -> Vec<Option<T>>
where
    F: Fn(&str) -> Option<T>,
{
    (0..row.len())
        .map(|i| cell(row, i).and_then(|c| parse(&c)))
        .collect()
}

fn count_some<T>(cells: &[Option<T>]) -> usize {
    cells.iter().filter(|c| c.is_some()).count()
}

fn is_year_row(row: &[String]) -> bool {
    count_some(&row_cells(row, parse_year_cell)) >= 1
}

/// 空欄の年は最寄りの列（左優先）の年度を借りる
fn neighbor_fiscal_year(fiscal_years: &[Option<i32>], index: usize) -> Option<i32> {
    (1..fiscal_years.len()).find_map(|distance| {
        let left = index
            .checked_sub(distance)
            .and_then(|i| fiscal_years.get(i).copied().flatten());
        left.or_else(|| fiscal_years.get(index + distance).copied().flatten())
    })
}

/// 縦並びの表（年度行 → 月行 → 日行）
///
/// 年度行は省略可。年度の欄が空なら隣の列、それもなければ文脈の年度を使う。
pub fn resolve_cross_axis(rows: &[Vec<String>], context: &FiscalYearContext) -> Vec<DateToken> {
    let mut tokens = Vec::new();

    for (index, window) in rows.windows(2).enumerate() {
        let (month_row, day_row) = (&window[0], &window[1]);
        let months = row_cells(month_row, parse_month_cell);
        if count_some(&months) < 2 {
            continue;
        }
        let days: Vec<Vec<u32>> = (0..day_row.len())
            .map(|i| cell(day_row, i).map(|c| parse_day_cell(&c)).unwrap_or_default())
            .collect();
        if days.iter().all(Vec::is_empty) {
            continue;
        }

        let year_cells: Vec<Option<YearCell>> = match index.checked_sub(1).map(|i| &rows[i]) {
            Some(year_row) if is_year_row(year_row) => row_cells(year_row, parse_year_cell),
            _ => Vec::new(),
        };
        let fiscal_years: Vec<Option<i32>> = (0..months.len())
            .map(|col| {
                let year = year_cells.get(col).copied().flatten()?;
                let month = months.get(col).copied().flatten()?;
                Some(year.fiscal_year_for(month))
            })
            .collect();

        for (col, month) in months.iter().enumerate() {
            let Some(month) = *month else { continue };
            let Some(col_days) = days.get(col) else { continue };
            let fiscal_year = fiscal_years
                .get(col)
                .copied()
                .flatten()
                .or_else(|| neighbor_fiscal_year(&fiscal_years, col))
                .unwrap_or(context.fiscal_year);
            let column_context = context.with_fiscal_year(fiscal_year);
            tokens.extend(col_days.iter().filter_map(|&day| column_context.resolve(month, day)));
        }
    }

    tokens
}

#[derive(Debug, Clone, Copy)]
struct MonthHeader {
    year: Option<i32>,
    month: u32,
}

fn parse_month_header(text: &str) -> Option<MonthHeader> {
    let caps = MONTH_HEADER_RE.captures(text.trim())?;
    let year = match (caps.get(1), caps.get(2), caps.get(3)) {
        (Some(western), _, _) => Some(western.as_str().parse().ok()?),
        (None, Some(era), Some(n)) => Some(era_to_western(era.as_str(), n.as_str())?),
        _ => None,
    };
    let month = caps[4].parse::<u32>().ok().filter(|m| (1..=12).contains(m))?;
    Some(MonthHeader { year, month })
}

/// 月見出しの表（見出し行に月、以降の行に日）
///
/// 見出しの直前が年度行の場合は縦並びの表として扱うのでここでは読まない。
pub fn resolve_header_months(rows: &[Vec<String>], context: &FiscalYearContext) -> Vec<DateToken> {
    let mut tokens = Vec::new();
    let mut headers: Option<Vec<Option<MonthHeader>>> = None;

    for (index, row) in rows.iter().enumerate() {
        let parsed = row_cells(row, parse_month_header);
        if count_some(&parsed) >= 2 {
            let after_year_row = index
                .checked_sub(1)
                .map(|i| is_year_row(&rows[i]))
                .unwrap_or(false);
            headers = if after_year_row { None } else { Some(parsed) };
            continue;
        }

        let Some(current) = headers.as_ref() else { continue };
        for (col, header) in current.iter().enumerate() {
            let Some(header) = header else { continue };
            let Some(text) = cell(row, col) else { continue };
            for day in parse_day_cell(&text) {
                let token = match header.year {
                    Some(year) => DateToken::new(Some(year), header.month, day),
                    None => context.resolve(header.month, day),
                };
                tokens.extend(token);
            }
        }
    }

    tokens
}

/// 両方の形で読み、重複を除いて日付順に返す
pub fn resolve_table(rows: &[Vec<String>], context: &FiscalYearContext) -> Vec<DateToken> {
    let unique: BTreeSet<DateToken> = resolve_cross_axis(rows, context)
        .into_iter()
        .chain(resolve_header_months(rows, context))
        .collect();
    unique.into_iter().collect()
}
