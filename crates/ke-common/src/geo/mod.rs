//! 位置解決: 住所候補の組み立て、ジオコーダ・施設マスタとの境界

pub mod prefecture;

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use prefecture::{correct_prefecture, find_prefecture, PREFECTURES};

/// 緯度経度
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// 有限値かつ緯度経度の範囲内
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

/// ジオコーダに渡す自治体情報
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoContext {
    pub source_key: String,
    pub prefecture: String,
    pub city: String,
}

impl GeoContext {
    /// 「神奈川県横浜市」
    pub fn locality(&self) -> String {
        format!("{}{}", self.prefecture, self.city)
    }
}

/// 住所候補を順に試し、最初に当たった座標を返す
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn geocode(&self, candidates: &[String], context: &GeoContext) -> Option<LatLng>;
}

/// 施設名 → 住所の対応表
pub trait FacilityMaster: Send + Sync {
    fn lookup_facility_address(&self, source_key: &str, venue_name: &str) -> Option<String>;
}

/// 常に外れるジオコーダ（座標は自治体の中心になる）
#[derive(Debug, Default, Clone, Copy)]
pub struct NullGeocoder;

#[async_trait]
impl Geocoder for NullGeocoder {
    async fn geocode(&self, _candidates: &[String], _context: &GeoContext) -> Option<LatLng> {
        None
    }
}

/// 住所文字列の完全一致で引く静的テーブル
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StaticGeocoder {
    entries: HashMap<String, LatLng>,
}

impl StaticGeocoder {
    pub fn new(entries: HashMap<String, LatLng>) -> Self {
        Self { entries }
    }

    pub fn insert(&mut self, query: impl Into<String>, coords: LatLng) {
        self.entries.insert(query.into(), coords);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl Geocoder for StaticGeocoder {
    async fn geocode(&self, candidates: &[String], _context: &GeoContext) -> Option<LatLng> {
        candidates
            .iter()
            .find_map(|query| self.entries.get(query.trim()).copied())
            .filter(LatLng::is_valid)
    }
}

/// (source_key, 施設名) → 住所
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InMemoryFacilityMaster {
    by_source: HashMap<String, HashMap<String, String>>,
}

impl InMemoryFacilityMaster {
    pub fn insert(
        &mut self,
        source_key: impl Into<String>,
        venue_name: impl Into<String>,
        address: impl Into<String>,
    ) {
        self.by_source
            .entry(source_key.into())
            .or_default()
            .insert(venue_name.into(), address.into());
    }

    pub fn len(&self) -> usize {
        self.by_source.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FacilityMaster for InMemoryFacilityMaster {
    fn lookup_facility_address(&self, source_key: &str, venue_name: &str) -> Option<String> {
        self.by_source
            .get(source_key)?
            .get(venue_name.trim())
            .filter(|address| !address.trim().is_empty())
            .cloned()
    }
}

/// 都道府県・市区町村が抜けている住所に補う
///
/// 「中区1-1」→「神奈川県横浜市中区1-1」、「横浜市中区1-1」→「神奈川県横浜市中区1-1」。
/// 別の都道府県で始まる住所はそのまま。
pub fn prefix_address(address: &str, context: &GeoContext) -> String {
    let address = address.trim();
    if find_prefecture(address).is_some() {
        return address.to_string();
    }
    if !context.city.is_empty() && address.starts_with(&context.city) {
        return format!("{}{}", context.prefecture, address);
    }
    format!("{}{}", context.locality(), address)
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

/// ジオコーダに試す順の住所候補
///
/// 1. 施設マスタの住所
/// 2. 会場名の括弧書きから取り出した住所
/// 3. 明示の住所欄（都道府県・市区町村を補う）
/// 4. 「<都道府県><市区町村> <会場名>」
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct GeoCandidateList {
    pub facility_address: Option<String>,
    pub parenthetical_address: Option<String>,
    pub explicit_address: Option<String>,
    pub venue_query: Option<String>,
}

impl GeoCandidateList {
    pub fn build(
        context: &GeoContext,
        venue_name: Option<&str>,
        facility_address: Option<String>,
        parenthetical_address: Option<&str>,
        explicit_address: Option<&str>,
    ) -> Self {
        Self {
            facility_address: facility_address.filter(|s| !s.trim().is_empty()),
            parenthetical_address: non_empty(parenthetical_address).map(|s| prefix_address(s, context)),
            explicit_address: non_empty(explicit_address).map(|s| prefix_address(s, context)),
            venue_query: non_empty(venue_name).map(|venue| format!("{} {}", context.locality(), venue)),
        }
    }

    /// 重複を除いた問い合わせ順
    pub fn queries(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for query in [
            &self.facility_address,
            &self.parenthetical_address,
            &self.explicit_address,
            &self.venue_query,
        ]
        .into_iter()
        .flatten()
        {
            if !out.contains(query) {
                out.push(query.clone());
            }
        }
        out
    }

    /// レコードに書く住所: 施設マスタ → 括弧書き → 住所欄 → 「<都道府県><市区町村>」
    pub fn display_address(&self, context: &GeoContext) -> String {
        self.facility_address
            .as_ref()
            .or(self.parenthetical_address.as_ref())
            .or(self.explicit_address.as_ref())
            .cloned()
            .unwrap_or_else(|| context.locality())
    }
}
