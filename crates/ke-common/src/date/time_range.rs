use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use crate::text::normalize_width;

lazy_static! {
    // 午後3時から3時50分 / 10時30分〜11時半 / 午前10時
    static ref KANJI_TIME_RE: Regex = Regex::new(
        r"(?:(午前|午後)\s*)?(\d{1,2})\s*時\s*(?:(\d{1,2})\s*分|(半))?(?:\s*(?:から|より|~|〜|ー|-|–)\s*(?:(午前|午後)\s*)?(\d{1,2})\s*時\s*(?:(\d{1,2})\s*分|(半))?)?"
    )
    .unwrap();
    // 10:00〜11:30 / 13:30から
    static ref COLON_TIME_RE: Regex = Regex::new(
        r"(\d{1,2}):(\d{2})(?:\s*(?:から|より|~|〜|ー|-|–)\s*(\d{1,2}):(\d{2}))?"
    )
    .unwrap();
}

/// 開始・終了時刻（終了は省略可）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start_hour: u32,
    pub start_minute: u32,
    pub end_hour: Option<u32>,
    pub end_minute: Option<u32>,
}

impl TimeRange {
    pub fn has_end(&self) -> bool {
        self.end_hour.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Meridiem {
    Am,
    Pm,
}

fn meridiem(caps: &Captures, idx: usize) -> Option<Meridiem> {
    match caps.get(idx)?.as_str() {
        "午前" => Some(Meridiem::Am),
        "午後" => Some(Meridiem::Pm),
        _ => None,
    }
}

fn to_24h(hour: u32, meridiem: Option<Meridiem>) -> u32 {
    match meridiem {
        Some(Meridiem::Pm) if hour < 12 => hour + 12,
        Some(Meridiem::Am) if hour == 12 => 0,
        _ => hour,
    }
}

fn minute(caps: &Captures, minute_idx: usize, half_idx: usize) -> Option<u32> {
    if caps.get(half_idx).is_some() {
        return Some(30);
    }
    match caps.get(minute_idx) {
        Some(m) => m.as_str().parse().ok(),
        None => Some(0),
    }
}

fn valid(hour: u32, minute: u32) -> bool {
    hour <= 23 && minute <= 59
}

fn build(start: (u32, u32), end: Option<(u32, u32)>) -> Option<TimeRange> {
    if !valid(start.0, start.1) {
        return None;
    }
    let end = end.filter(|&(h, m)| valid(h, m) && (h, m) >= start);
    Some(TimeRange {
        start_hour: start.0,
        start_minute: start.1,
        end_hour: end.map(|(h, _)| h),
        end_minute: end.map(|(_, m)| m),
    })
}

fn from_kanji(caps: &Captures) -> Option<TimeRange> {
    let start_meridiem = meridiem(caps, 1);
    let start_hour = to_24h(caps[2].parse().ok()?, start_meridiem);
    let start_minute = minute(caps, 3, 4)?;

    let end = match caps.get(6) {
        Some(hour) => {
            let raw: u32 = hour.as_str().parse().ok()?;
            let hour = match meridiem(caps, 5) {
                Some(explicit) => to_24h(raw, Some(explicit)),
                // 終了側に午前/午後がなければ開始側に合わせる（午後3時から3時50分）
                None if start_meridiem == Some(Meridiem::Pm) && raw < 12 => raw + 12,
                None if raw < start_hour && raw + 12 <= 23 => raw + 12,
                None => raw,
            };
            Some((hour, minute(caps, 7, 8)?))
        }
        None => None,
    };

    build((start_hour, start_minute), end)
}

fn from_colon(caps: &Captures) -> Option<TimeRange> {
    let start = (caps[1].parse().ok()?, caps[2].parse().ok()?);
    let end = match (caps.get(3), caps.get(4)) {
        (Some(h), Some(m)) => Some((h.as_str().parse().ok()?, m.as_str().parse().ok()?)),
        _ => None,
    };
    build(start, end)
}

/// テキスト中で最初に現れる時刻表記を TimeRange にする
///
/// 「正午」は 12:00 として扱う。時刻が範囲外なら None。
pub fn parse_time_range(text: &str) -> Option<TimeRange> {
    let normalized = normalize_width(text).replace("正午", "午後0時");

    let kanji = KANJI_TIME_RE.captures(&normalized);
    let colon = COLON_TIME_RE.captures(&normalized);

    let kanji_start = kanji.as_ref().and_then(|c| c.get(0)).map(|m| m.start());
    let colon_start = colon.as_ref().and_then(|c| c.get(0)).map(|m| m.start());

    match (kanji_start, colon_start) {
        (Some(k), Some(c)) if c < k => colon.as_ref().and_then(from_colon),
        (Some(_), _) => kanji.as_ref().and_then(from_kanji),
        (None, Some(_)) => colon.as_ref().and_then(from_colon),
        (None, None) => None,
    }
}
