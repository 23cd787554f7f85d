//! 実行設定とカタログ類の読み込み

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::date::{DEFAULT_HORIZON_DAYS, MAX_HORIZON_DAYS};
use crate::geo::{InMemoryFacilityMaster, StaticGeocoder};
use crate::source::{SourceConfig, SourceConfigError};

pub const DEFAULT_BATCH_SIZE: usize = 6;
pub const MIN_BATCH_SIZE: usize = 5;
pub const MAX_BATCH_SIZE: usize = 10;
pub const DEFAULT_PAGE_TIMEOUT_SECONDS: u64 = 8;
pub const DEFAULT_PDF_TIMEOUT_SECONDS: u64 = 45;
pub const DEFAULT_MAX_LINKS: usize = 60;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("source `{key}` is misconfigured: {error}")]
    InvalidSource {
        key: String,
        error: SourceConfigError,
    },
    #[error("duplicate source key `{0}`")]
    DuplicateSource(String),
}

/// 1 回の収集の設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectorSettings {
    /// 同時に投げる取得数（5〜10）
    pub batch_size: usize,
    pub page_timeout: Duration,
    pub pdf_timeout: Duration,
    /// 今日から何日先までを出力するか（上限 365）
    pub max_days: i64,
    /// 1 自治体あたりの詳細ページ数の既定上限
    pub max_links: usize,
}

impl Default for CollectorSettings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            page_timeout: Duration::from_secs(DEFAULT_PAGE_TIMEOUT_SECONDS),
            pdf_timeout: Duration::from_secs(DEFAULT_PDF_TIMEOUT_SECONDS),
            max_days: DEFAULT_HORIZON_DAYS,
            max_links: DEFAULT_MAX_LINKS,
        }
    }
}

impl CollectorSettings {
    /// 環境変数から設定を読み込み
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let parse_u64 = |name: &str| lookup(name).and_then(|s| s.trim().parse::<u64>().ok());

        Self {
            batch_size: parse_u64("KE_BATCH_SIZE")
                .map(|n| n as usize)
                .unwrap_or(DEFAULT_BATCH_SIZE),
            page_timeout: Duration::from_secs(
                parse_u64("KE_PAGE_TIMEOUT_SECONDS")
                    .filter(|n| *n > 0)
                    .unwrap_or(DEFAULT_PAGE_TIMEOUT_SECONDS),
            ),
            pdf_timeout: Duration::from_secs(
                parse_u64("KE_PDF_TIMEOUT_SECONDS")
                    .filter(|n| *n > 0)
                    .unwrap_or(DEFAULT_PDF_TIMEOUT_SECONDS),
            ),
            max_days: parse_u64("KE_MAX_DAYS")
                .map(|n| n.min(MAX_HORIZON_DAYS as u64) as i64)
                .unwrap_or(DEFAULT_HORIZON_DAYS),
            max_links: parse_u64("KE_MAX_LINKS")
                .filter(|n| *n > 0)
                .map(|n| n as usize)
                .unwrap_or(DEFAULT_MAX_LINKS),
        }
        .clamped()
    }

    /// バッチサイズと日数を許容範囲に収める
    pub fn clamped(mut self) -> Self {
        self.batch_size = self.batch_size.clamp(MIN_BATCH_SIZE, MAX_BATCH_SIZE);
        self.max_days = self.max_days.clamp(0, MAX_HORIZON_DAYS);
        self
    }

    pub fn with_max_days(mut self, max_days: i64) -> Self {
        self.max_days = max_days.clamp(0, MAX_HORIZON_DAYS);
        self
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// カタログ（`SourceConfig` の配列）を検査する
pub fn validate_catalog(sources: &[SourceConfig]) -> Result<(), ConfigError> {
    let mut seen = std::collections::HashSet::new();
    for source in sources {
        if !seen.insert(source.key.as_str()) {
            return Err(ConfigError::DuplicateSource(source.key.clone()));
        }
        source.validate().map_err(|error| ConfigError::InvalidSource {
            key: source.key.clone(),
            error,
        })?;
    }
    Ok(())
}

pub fn load_source_catalog(path: impl AsRef<Path>) -> Result<Vec<SourceConfig>, ConfigError> {
    let sources: Vec<SourceConfig> = read_json(path.as_ref())?;
    validate_catalog(&sources)?;
    Ok(sources)
}

/// `{"<source_key>": {"<施設名>": "<住所>"}}`
pub fn load_facility_master(path: impl AsRef<Path>) -> Result<InMemoryFacilityMaster, ConfigError> {
    read_json(path.as_ref())
}

/// `{"<住所>": {"lat": .., "lng": ..}}`
pub fn load_geocode_table(path: impl AsRef<Path>) -> Result<StaticGeocoder, ConfigError> {
    read_json(path.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings_from(pairs: &[(&str, &str)]) -> CollectorSettings {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        CollectorSettings::from_lookup(|name| env.get(name).cloned())
    }

    #[test]
    fn defaults_without_env() {
        assert_eq!(settings_from(&[]), CollectorSettings::default());
    }

    #[test]
    fn batch_size_is_clamped() {
        assert_eq!(settings_from(&[("KE_BATCH_SIZE", "0")]).batch_size, 5);
        assert_eq!(settings_from(&[("KE_BATCH_SIZE", "64")]).batch_size, 10);
        assert_eq!(settings_from(&[("KE_BATCH_SIZE", "7")]).batch_size, 7);
        assert_eq!(settings_from(&[("KE_BATCH_SIZE", "many")]).batch_size, 6);
    }

    #[test]
    fn max_days_is_capped() {
        assert_eq!(settings_from(&[("KE_MAX_DAYS", "1000")]).max_days, 365);
        assert_eq!(settings_from(&[("KE_MAX_DAYS", "14")]).max_days, 14);
        assert_eq!(CollectorSettings::default().with_max_days(-3).max_days, 0);
    }

    #[test]
    fn timeouts_reject_zero() {
        let settings = settings_from(&[("KE_PAGE_TIMEOUT_SECONDS", "0"), ("KE_PDF_TIMEOUT_SECONDS", "90")]);
        assert_eq!(settings.page_timeout, Duration::from_secs(8));
        assert_eq!(settings.pdf_timeout, Duration::from_secs(90));
    }

    #[test]
    fn loads_catalog_and_facility_master_from_disk() {
        let dir = std::env::temp_dir().join(format!("ke-config-{}", crate::run_id::generate()));
        std::fs::create_dir_all(&dir).unwrap();

        let catalog = dir.join("sources.json");
        std::fs::write(
            &catalog,
            r#"[{"key":"yokohama","label":"横浜市","prefecture":"神奈川県","city":"横浜市",
                "center":{"lat":35.44,"lng":139.63},
                "discovery":{"type":"known_urls","urls":["https://www.city.example.jp/a.html"]}}]"#,
        )
        .unwrap();
        let sources = load_source_catalog(&catalog).unwrap();
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].max_links, None);

        let facilities = dir.join("facilities.json");
        std::fs::write(&facilities, r#"{"yokohama":{"こども館":"神奈川県横浜市中区1-1"}}"#).unwrap();
        let master = load_facility_master(&facilities).unwrap();
        assert_eq!(master.len(), 1);

        let missing = load_source_catalog(dir.join("missing.json"));
        assert!(matches!(missing, Err(ConfigError::Io { .. })));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn duplicate_keys_are_rejected() {
        let json = r#"[
            {"key":"a","label":"A","prefecture":"p","city":"c","center":{"lat":1.0,"lng":1.0},
             "discovery":{"type":"known_urls","urls":["https://a.example/"]}},
            {"key":"a","label":"A","prefecture":"p","city":"c","center":{"lat":1.0,"lng":1.0},
             "discovery":{"type":"known_urls","urls":["https://a.example/"]}}
        ]"#;
        let sources: Vec<SourceConfig> = serde_json::from_str(json).unwrap();
        assert!(matches!(validate_catalog(&sources), Err(ConfigError::DuplicateSource(k)) if k == "a"));
    }
}
