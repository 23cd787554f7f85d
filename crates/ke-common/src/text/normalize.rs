use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

static RE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

static RE_LEADING_TAGS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:[【\[〔〈《<][^】\]〕〉》>]*[】\]〕〉》>]\s*)+").unwrap()
});

static RE_SITE_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*[|｜]\s*[^|｜]*$").unwrap());

/// 全角英数・記号を半角に寄せる（NFKC）
///
/// 全角数字 `１２月` や全角括弧 `（水）`、全角コロン `：` が ASCII になるので、
/// 以降の正規表現は半角だけを相手にすればよい。
pub fn normalize_width(text: &str) -> String {
    text.nfkc().collect()
}

/// 連続空白（全角スペース含む）を 1 つにまとめて trim
pub fn collapse_whitespace(text: &str) -> String {
    RE_WS.replace_all(text.trim(), " ").into_owned()
}

/// イベント名の正規化
///
/// 空文字を返さない契約:
/// 1. 幅を揃えて空白を畳む
/// 2. 先頭の【要予約】などのタグを剥がす
/// 3. 剥がした結果が空なら畳んだだけの文字列を返す
pub fn clean_title(raw: &str) -> String {
    let collapsed = collapse_whitespace(&normalize_width(raw));
    if collapsed.is_empty() {
        return collapsed;
    }

    let stripped = RE_LEADING_TAGS.replace(&collapsed, "");
    let stripped = stripped.trim();
    if stripped.is_empty() {
        collapsed
    } else {
        stripped.to_string()
    }
}

/// `<title>` の「ページ名 | 市役所名」からサイト名部分を落とす
pub fn strip_site_suffix(title: &str) -> String {
    let stripped = RE_SITE_SUFFIX.replace(title, "");
    let stripped = stripped.trim();
    if stripped.is_empty() {
        title.trim().to_string()
    } else {
        stripped.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn width_normalization_converts_fullwidth_digits_and_brackets() {
        assert_eq!(normalize_width("１２月３日（水）"), "12月3日(水)");
        assert_eq!(normalize_width("１０：３０"), "10:30");
    }

    #[test]
    fn clean_title_strips_leading_tags() {
        assert_eq!(clean_title("【要予約】親子ひろば"), "親子ひろば");
        assert_eq!(clean_title("【終了】【要予約】 離乳食教室"), "離乳食教室");
        assert_eq!(clean_title("  ベビー　マッサージ  "), "ベビー マッサージ");
    }

    #[test]
    fn clean_title_never_returns_empty_for_tag_only_titles() {
        assert_eq!(clean_title("【お知らせ】"), "【お知らせ】");
        assert_eq!(clean_title("   "), "");
    }

    #[test]
    fn site_suffix_is_removed() {
        assert_eq!(strip_site_suffix("親子体操 | 〇〇市ホームページ"), "親子体操");
        assert_eq!(strip_site_suffix("親子体操｜〇〇市"), "親子体操");
        assert_eq!(strip_site_suffix("親子体操"), "親子体操");
    }
}
