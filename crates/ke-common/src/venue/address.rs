//! 会場名に埋め込まれた住所の切り出し
//!
//! 「こども館（中区本町1-2-3）」→ 会場名「こども館」、住所「中区本町1-2-3」

use lazy_static::lazy_static;
use regex::Regex;

use crate::text::{collapse_whitespace, normalize_width};

lazy_static! {
    static ref PAREN_RE: Regex = Regex::new(r"\(([^()]{2,80})\)").unwrap();
    static ref ADDRESS_SHAPE_RE: Regex =
        Regex::new(r"\d+\s*[-‐−ー]\s*\d+|\d+\s*番地|[\d一二三四五六七八九十]+\s*丁目").unwrap();
}

/// 番地・丁目・「1-2」形式を含むか
pub fn looks_like_address(text: &str) -> bool {
    ADDRESS_SHAPE_RE.is_match(&normalize_width(text))
}

/// 会場名から住所らしい括弧書きを取り出す
///
/// 戻り値は（表示用の会場名, 住所）。住所らしい括弧がなければ会場名はそのまま。
pub fn split_parenthetical_address(venue: &str) -> (String, Option<String>) {
    let normalized = normalize_width(venue);
    let found = PAREN_RE
        .captures_iter(&normalized)
        .find(|caps| ADDRESS_SHAPE_RE.is_match(&caps[1]));

    match found {
        Some(caps) => {
            let (Some(whole), Some(inner)) = (caps.get(0), caps.get(1)) else {
                return (collapse_whitespace(&normalized), None);
            };
            let mut display = String::with_capacity(normalized.len());
            display.push_str(&normalized[..whole.start()]);
            display.push_str(&normalized[whole.end()..]);
            let display = collapse_whitespace(&display);
            let address = collapse_whitespace(inner.as_str());
            if display.is_empty() {
                (address.clone(), Some(address))
            } else {
                (display, Some(address))
            }
        }
        None => (collapse_whitespace(&normalized), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn promotes_street_address_in_parentheses() {
        assert_eq!(
            split_parenthetical_address("こども館（中区本町1-2-3）"),
            ("こども館".to_string(), Some("中区本町1-2-3".to_string()))
        );
        assert_eq!(
            split_parenthetical_address("地区センター (緑町3丁目5) 2階"),
            ("地区センター 2階".to_string(), Some("緑町3丁目5".to_string()))
        );
        assert_eq!(
            split_parenthetical_address("公民館(本町12番地)"),
            ("公民館".to_string(), Some("本町12番地".to_string()))
        );
    }

    #[test]
    fn keeps_non_address_parentheses() {
        assert_eq!(
            split_parenthetical_address("中央図書館（2階 おはなしのへや）"),
            ("中央図書館(2階 おはなしのへや)".to_string(), None)
        );
    }

    #[test]
    fn address_shape_detection() {
        assert!(looks_like_address("本町１－２"));
        assert!(looks_like_address("三丁目"));
        assert!(!looks_like_address("こども館"));
    }
}
