/// 和暦の元号（西暦 = offset + 年数）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Era {
    Reiwa,
    Heisei,
}

impl Era {
    /// 「令和」「平成」および短縮形 `R` / `H`
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim() {
            "令和" | "R" | "r" => Some(Era::Reiwa),
            "平成" | "H" | "h" => Some(Era::Heisei),
            _ => None,
        }
    }

    pub fn offset(self) -> i32 {
        match self {
            Era::Reiwa => 2018,
            Era::Heisei => 1988,
        }
    }

    pub fn to_western(self, era_year: i32) -> i32 {
        self.offset() + era_year
    }
}

/// 元号ラベルと年数（「元」を含む）から西暦年を求める
pub fn era_to_western(label: &str, number: &str) -> Option<i32> {
    let era = Era::from_label(label)?;
    let n = match number.trim() {
        "元" => 1,
        raw => raw.parse::<i32>().ok()?,
    };
    (n >= 1).then(|| era.to_western(n))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_reiwa_and_heisei() {
        assert_eq!(era_to_western("令和", "7"), Some(2025));
        assert_eq!(era_to_western("令和", "元"), Some(2019));
        assert_eq!(era_to_western("R", "8"), Some(2026));
        assert_eq!(era_to_western("平成", "31"), Some(2019));
    }

    #[test]
    fn rejects_unknown_labels_and_zero_years() {
        assert_eq!(era_to_western("昭和", "60"), None);
        assert_eq!(era_to_western("令和", "0"), None);
        assert_eq!(era_to_western("令和", "x"), None);
    }
}
