//! 日付まわり: トークン抽出・年度補完・時刻・繰り返し・日程表

pub mod era;
pub mod fiscal;
pub mod pivot;
pub mod recurrence;
pub mod time_range;
pub mod token;

pub use era::{era_to_western, Era};
pub use fiscal::{find_year_markers, resolve, FiscalYearContext, YearDeclaration, YearMarker};
pub use pivot::{resolve_cross_axis, resolve_header_months, resolve_table};
pub use recurrence::{
    expand, expand_nth_weekday, expand_range, parse_recurrence, weekday_from_kanji,
    RecurrenceSpec, DEFAULT_HORIZON_DAYS, MAX_HORIZON_DAYS,
};
pub use time_range::{parse_time_range, TimeRange};
pub use token::{extract, extract_segments, scan_segment, DateToken, LocatedToken, TokenNotation};
