use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, Utc};
use once_cell::sync::Lazy;

use crate::date::MAX_HORIZON_DAYS;

/// 「今日」・年度の既定値・範囲判定の基準タイムゾーン
pub const EVENT_TIMEZONE: &str = "Asia/Tokyo";

/// JST は夏時間がないため固定オフセットで十分
pub const JST_OFFSET_SECONDS: i32 = 9 * 3600;

pub static JST: Lazy<FixedOffset> = Lazy::new(|| FixedOffset::east_opt(JST_OFFSET_SECONDS).unwrap());

/// 現在時刻（JST）
pub fn now_jst() -> DateTime<FixedOffset> {
    Utc::now().with_timezone(&*JST)
}

/// 今日の日付（JST）
pub fn today_jst() -> NaiveDate {
    now_jst().date_naive()
}

/// 4月始まりの年度
pub fn fiscal_year_of(date: NaiveDate) -> i32 {
    if date.month() >= 4 {
        date.year()
    } else {
        date.year() - 1
    }
}

/// 出力範囲の最終日。`max_days` は 0〜365 に丸める
pub fn horizon_end(today: NaiveDate, max_days: i64) -> NaiveDate {
    today
        .checked_add_signed(Duration::days(max_days.clamp(0, MAX_HORIZON_DAYS)))
        .unwrap_or(NaiveDate::MAX)
}

/// `[today, today + max_days]` に収まるか（両端含む）
pub fn in_range_from(today: NaiveDate, date: NaiveDate, max_days: i64) -> bool {
    date >= today && date <= horizon_end(today, max_days)
}

/// 年月日が JST の今日から max_days 以内か。存在しない日付は false
pub fn in_range_jst(year: i32, month: u32, day: u32, max_days: i64) -> bool {
    NaiveDate::from_ymd_opt(year, month, day)
        .map(|date| in_range_from(today_jst(), date, max_days))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn fiscal_year_starts_in_april() {
        assert_eq!(fiscal_year_of(ymd(2025, 4, 1)), 2025);
        assert_eq!(fiscal_year_of(ymd(2025, 12, 31)), 2025);
        assert_eq!(fiscal_year_of(ymd(2026, 3, 31)), 2025);
        assert_eq!(fiscal_year_of(ymd(2026, 1, 1)), 2025);
    }

    #[test]
    fn range_is_inclusive_on_both_ends() {
        let today = ymd(2026, 2, 1);
        assert!(in_range_from(today, today, 30));
        assert!(in_range_from(today, ymd(2026, 3, 3), 30));
        assert!(!in_range_from(today, ymd(2026, 3, 4), 30));
        assert!(!in_range_from(today, ymd(2026, 1, 31), 30));
    }

    #[test]
    fn oversized_horizons_are_capped_at_a_year() {
        let today = ymd(2026, 11, 1);
        assert_eq!(horizon_end(today, i64::MAX), ymd(2027, 11, 1));
        assert_eq!(horizon_end(today, -5), today);
        assert!(in_range_from(today, ymd(2027, 11, 1), i64::MAX));
        assert!(!in_range_from(today, ymd(2027, 11, 2), i64::MAX));
    }

    #[test]
    fn invalid_calendar_dates_are_never_in_range() {
        assert!(!in_range_jst(2026, 2, 30, 365));
        assert!(!in_range_jst(2026, 13, 1, 365));
    }

    #[test]
    fn today_is_in_range_with_zero_days() {
        let today = today_jst();
        assert!(in_range_jst(today.year(), today.month(), today.day(), 0));
    }
}
