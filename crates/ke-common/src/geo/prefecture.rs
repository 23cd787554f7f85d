use lazy_static::lazy_static;

/// 都道府県の正式名称（JIS 順）
pub const PREFECTURES: [&str; 47] = [
    "北海道", "青森県", "岩手県", "宮城県", "秋田県", "山形県", "福島県",
    "茨城県", "栃木県", "群馬県", "埼玉県", "千葉県", "東京都", "神奈川県",
    "新潟県", "富山県", "石川県", "福井県", "山梨県", "長野県", "岐阜県",
    "静岡県", "愛知県", "三重県", "滋賀県", "京都府", "大阪府", "兵庫県",
    "奈良県", "和歌山県", "鳥取県", "島根県", "岡山県", "広島県", "山口県",
    "徳島県", "香川県", "愛媛県", "高知県", "福岡県", "佐賀県", "長崎県",
    "熊本県", "大分県", "宮崎県", "鹿児島県", "沖縄県",
];

lazy_static! {
    /// 「都・道・府・県」を除いた短縮形 → 正式名称
    static ref SHORT_NAMES: Vec<(&'static str, &'static str)> = PREFECTURES
        .iter()
        .map(|&full| {
            let short = full
                .strip_suffix('県')
                .or_else(|| full.strip_suffix('府'))
                .or_else(|| full.strip_suffix('都'))
                .unwrap_or(full);
            (short, full)
        })
        .collect();
}

/// 住所の先頭にある都道府県（正式名称）
pub fn find_prefecture(address: &str) -> Option<&'static str> {
    let trimmed = address.trim();
    PREFECTURES
        .iter()
        .copied()
        .find(|pref| trimmed.starts_with(pref))
}

/// 都道府県補正: 「東京」「神奈川」などの短縮形を正式名称に
pub fn correct_prefecture(input: &str) -> Option<&'static str> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Some(full) = find_prefecture(trimmed) {
        return Some(full);
    }
    SHORT_NAMES
        .iter()
        .find(|(short, _)| trimmed == *short)
        .map(|(_, full)| *full)
}
