//! イベントの候補と確定レコード

pub mod materialize;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::date::{DateToken, TimeRange};
use crate::timezone::{JST, JST_OFFSET_SECONDS};

pub use materialize::{MaterializeOutcome, Materializer};

/// 詳細ページ 1 枚から取れたイベント候補（実行中のみ存在）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawEventCandidate {
    pub title: String,
    pub source_url: String,
    /// 表示用の会場名（住所の括弧書きは除去済み）
    pub venue_text: Option<String>,
    /// 会場名の括弧書きにあった住所
    pub parenthetical_address: Option<String>,
    /// 住所・所在地欄
    pub address_text: Option<String>,
    pub date_tokens: Vec<DateToken>,
    pub time_range: Option<TimeRange>,
}

impl RawEventCandidate {
    /// 年まで確定した日付（重複なし・昇順）
    pub fn resolved_dates(&self) -> Vec<NaiveDate> {
        let mut dates: Vec<NaiveDate> = self.date_tokens.iter().filter_map(DateToken::to_date).collect();
        dates.sort_unstable();
        dates.dedup();
        dates
    }
}

/// 出力レコード
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalEvent {
    pub id: String,
    pub source: String,
    pub source_label: String,
    pub title: String,
    pub starts_at: DateTime<FixedOffset>,
    pub ends_at: Option<DateTime<FixedOffset>>,
    pub venue_name: String,
    pub address: String,
    pub url: String,
    pub lat: f64,
    pub lng: f64,
}

/// `source:url:title:YYYYMMDD`
pub fn event_id(source_key: &str, url: &str, title: &str, date: NaiveDate) -> String {
    format!("{}:{}:{}:{}", source_key, url, title, date.format("%Y%m%d"))
}

fn jst_local(date: NaiveDate, time: NaiveTime) -> DateTime<FixedOffset> {
    let utc = date.and_time(time) - Duration::seconds(i64::from(JST_OFFSET_SECONDS));
    DateTime::from_naive_utc_and_offset(utc, *JST)
}

fn jst_at(date: NaiveDate, hour: u32, minute: u32) -> Option<DateTime<FixedOffset>> {
    NaiveTime::from_hms_opt(hour, minute, 0).map(|time| jst_local(date, time))
}

/// 日付と時刻帯から JST の開始・終了時刻を作る
///
/// 時刻帯がなければ開始は 0:00、終了は None。
pub fn build_timestamps(
    date: NaiveDate,
    time_range: Option<&TimeRange>,
) -> (DateTime<FixedOffset>, Option<DateTime<FixedOffset>>) {
    let midnight = jst_local(date, NaiveTime::MIN);

    let Some(range) = time_range else {
        return (midnight, None);
    };
    let Some(starts_at) = jst_at(date, range.start_hour, range.start_minute) else {
        return (midnight, None);
    };
    let ends_at = match (range.end_hour, range.end_minute) {
        (Some(hour), minute) => jst_at(date, hour, minute.unwrap_or(0)).filter(|end| *end >= starts_at),
        _ => None,
    };
    (starts_at, ends_at)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn id_joins_parts_with_colons() {
        assert_eq!(
            event_id("yokohama", "https://x.example/e/1", "親子体操", ymd(2025, 5, 14)),
            "yokohama:https://x.example/e/1:親子体操:20250514"
        );
    }

    #[test]
    fn timestamps_without_time_range_start_at_midnight() {
        let (start, end) = build_timestamps(ymd(2025, 5, 14), None);
        assert_eq!(start.to_rfc3339(), "2025-05-14T00:00:00+09:00");
        assert_eq!(end, None);
    }

    #[test]
    fn timestamps_with_time_range() {
        let range = TimeRange {
            start_hour: 15,
            start_minute: 0,
            end_hour: Some(15),
            end_minute: Some(50),
        };
        let (start, end) = build_timestamps(ymd(2025, 5, 14), Some(&range));
        assert_eq!(start.to_rfc3339(), "2025-05-14T15:00:00+09:00");
        assert_eq!(end.map(|e| e.to_rfc3339()), Some("2025-05-14T15:50:00+09:00".to_string()));
    }

    #[test]
    fn serializes_with_snake_case_fields() {
        let (starts_at, _) = build_timestamps(ymd(2025, 5, 14), None);
        let event = CanonicalEvent {
            id: "k:u:t:20250514".into(),
            source: "k".into(),
            source_label: "K市".into(),
            title: "t".into(),
            starts_at,
            ends_at: None,
            venue_name: "こども館".into(),
            address: "神奈川県K市".into(),
            url: "u".into(),
            lat: 35.0,
            lng: 139.0,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["starts_at"], "2025-05-14T00:00:00+09:00");
        assert!(value["ends_at"].is_null());
        assert_eq!(value["source_label"], "K市");
    }

    #[test]
    fn resolved_dates_skip_unresolved_tokens() {
        let candidate = RawEventCandidate {
            date_tokens: vec![
                DateToken::new(Some(2025), 6, 1).unwrap(),
                DateToken::new(None, 6, 2).unwrap(),
                DateToken::new(Some(2025), 5, 1).unwrap(),
                DateToken::new(Some(2025), 6, 1).unwrap(),
            ],
            ..RawEventCandidate::default()
        };
        assert_eq!(candidate.resolved_dates(), vec![ymd(2025, 5, 1), ymd(2025, 6, 1)]);
    }
}
