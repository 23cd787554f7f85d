//! 候補 → 確定レコード
//!
//! - 今日から `max_days` 日より外の日付は落とす
//! - 同じ id は 1 回だけ（2 回目は何もしない。ジオコーディングもしない）
//! - 座標は 施設マスタ → 括弧書きの住所 → 住所欄 → 「自治体 会場名」の順に試し、
//!   全部外れたら自治体の中心座標

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::NaiveDate;
use tracing::debug;

use super::{build_timestamps, event_id, CanonicalEvent, RawEventCandidate};
use crate::date::MAX_HORIZON_DAYS;
use crate::geo::{FacilityMaster, GeoCandidateList, GeoContext, Geocoder, LatLng};
use crate::source::SourceConfig;
use crate::text::clean_title;
use crate::timezone::in_range_from;

/// 1 件の投入結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MaterializeOutcome {
    Inserted { id: String },
    Duplicate { id: String },
    OutOfRange,
}

impl MaterializeOutcome {
    pub fn is_inserted(&self) -> bool {
        matches!(self, MaterializeOutcome::Inserted { .. })
    }
}

/// 1 回の収集に閉じた重複排除マップとジオコードキャッシュ
pub struct Materializer {
    source: SourceConfig,
    geo: GeoContext,
    geocoder: Arc<dyn Geocoder>,
    facilities: Arc<dyn FacilityMaster>,
    today: NaiveDate,
    max_days: i64,
    seen: HashSet<String>,
    events: Vec<CanonicalEvent>,
    geocode_cache: HashMap<GeoCandidateList, Option<LatLng>>,
    geocoder_calls: usize,
}

impl Materializer {
    pub fn new(
        source: SourceConfig,
        geocoder: Arc<dyn Geocoder>,
        facilities: Arc<dyn FacilityMaster>,
        today: NaiveDate,
        max_days: i64,
    ) -> Self {
        let geo = source.geo_context();
        Self {
            source,
            geo,
            geocoder,
            facilities,
            today,
            max_days: max_days.clamp(0, MAX_HORIZON_DAYS),
            seen: HashSet::new(),
            events: Vec::new(),
            geocode_cache: HashMap::new(),
            geocoder_calls: 0,
        }
    }

    pub async fn materialize(&mut self, candidate: &RawEventCandidate, date: NaiveDate) -> MaterializeOutcome {
        if !in_range_from(self.today, date, self.max_days) {
            return MaterializeOutcome::OutOfRange;
        }

        let title = clean_title(&candidate.title);
        let id = event_id(&self.source.key, &candidate.source_url, &title, date);
        if self.seen.contains(&id) {
            return MaterializeOutcome::Duplicate { id };
        }

        let venue_name = candidate
            .venue_text
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty());
        let facility_address =
            venue_name.and_then(|venue| self.facilities.lookup_facility_address(&self.source.key, venue));
        let candidates = GeoCandidateList::build(
            &self.geo,
            venue_name,
            facility_address,
            candidate.parenthetical_address.as_deref(),
            candidate.address_text.as_deref(),
        );

        let coords = self.locate(&candidates).await.unwrap_or(self.source.center);
        let (starts_at, ends_at) = build_timestamps(date, candidate.time_range.as_ref());

        let event = CanonicalEvent {
            id: id.clone(),
            source: self.source.key.clone(),
            source_label: self.source.label.clone(),
            title,
            starts_at,
            ends_at,
            venue_name: venue_name.unwrap_or_default().to_string(),
            address: candidates.display_address(&self.geo),
            url: candidate.source_url.clone(),
            lat: coords.lat,
            lng: coords.lng,
        };

        self.seen.insert(id.clone());
        self.events.push(event);
        MaterializeOutcome::Inserted { id }
    }

    async fn locate(&mut self, candidates: &GeoCandidateList) -> Option<LatLng> {
        if let Some(cached) = self.geocode_cache.get(candidates) {
            return *cached;
        }

        let queries = candidates.queries();
        let hit = if queries.is_empty() {
            None
        } else {
            self.geocoder_calls += 1;
            self.geocoder
                .geocode(&queries, &self.geo)
                .await
                .filter(LatLng::is_valid)
        };
        if hit.is_none() {
            debug!(source = %self.source.key, queries = ?queries, "geocode miss; using city center");
        }

        self.geocode_cache.insert(candidates.clone(), hit);
        hit
    }

    pub fn events(&self) -> &[CanonicalEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// ジオコーダを実際に呼んだ回数（キャッシュ命中は数えない）
    pub fn geocoder_calls(&self) -> usize {
        self.geocoder_calls
    }

    pub fn into_events(self) -> Vec<CanonicalEvent> {
        self.events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use crate::date::{DateToken, TimeRange};
    use crate::geo::{InMemoryFacilityMaster, NullGeocoder, StaticGeocoder};
    use crate::source::Discovery;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn source() -> SourceConfig {
        SourceConfig {
            key: "yokohama".into(),
            label: "横浜市".into(),
            prefecture: "神奈川県".into(),
            city: "横浜市".into(),
            center: LatLng::new(35.4437, 139.638),
            discovery: Discovery::KnownUrls {
                urls: vec!["https://www.city.example.jp/a.html".into()],
            },
            max_links: None,
        }
    }

    fn candidate() -> RawEventCandidate {
        RawEventCandidate {
            title: "【要予約】親子体操".into(),
            source_url: "https://www.city.example.jp/event/1.html".into(),
            venue_text: Some("こども館".into()),
            parenthetical_address: None,
            address_text: None,
            date_tokens: vec![DateToken::new(Some(2025), 5, 14).unwrap()],
            time_range: Some(TimeRange {
                start_hour: 10,
                start_minute: 0,
                end_hour: Some(11),
                end_minute: Some(30),
            }),
        }
    }

    struct CountingGeocoder {
        calls: AtomicUsize,
        inner: StaticGeocoder,
    }

    #[async_trait]
    impl Geocoder for CountingGeocoder {
        async fn geocode(&self, candidates: &[String], context: &GeoContext) -> Option<LatLng> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.geocode(candidates, context).await
        }
    }

    fn materializer(geocoder: Arc<dyn Geocoder>, facilities: InMemoryFacilityMaster) -> Materializer {
        Materializer::new(source(), geocoder, Arc::new(facilities), ymd(2025, 5, 1), 30)
    }

    #[tokio::test]
    async fn same_candidate_and_date_is_inserted_once() {
        let geocoder = Arc::new(CountingGeocoder {
            calls: AtomicUsize::new(0),
            inner: StaticGeocoder::default(),
        });
        let mut m = materializer(geocoder.clone(), InMemoryFacilityMaster::default());

        let first = m.materialize(&candidate(), ymd(2025, 5, 14)).await;
        let second = m.materialize(&candidate(), ymd(2025, 5, 14)).await;

        assert!(first.is_inserted());
        assert!(matches!(second, MaterializeOutcome::Duplicate { .. }));
        assert_eq!(m.len(), 1);
        assert_eq!(geocoder.calls.load(Ordering::SeqCst), 1);

        let event = &m.events()[0];
        assert_eq!(event.id, "yokohama:https://www.city.example.jp/event/1.html:親子体操:20250514");
        assert_eq!(event.starts_at.to_rfc3339(), "2025-05-14T10:00:00+09:00");
        assert_eq!(
            event.ends_at.map(|e| e.to_rfc3339()),
            Some("2025-05-14T11:30:00+09:00".to_string())
        );
    }

    #[tokio::test]
    async fn dates_outside_window_are_dropped() {
        let mut m = materializer(Arc::new(NullGeocoder), InMemoryFacilityMaster::default());
        assert_eq!(
            m.materialize(&candidate(), ymd(2025, 4, 30)).await,
            MaterializeOutcome::OutOfRange
        );
        assert_eq!(
            m.materialize(&candidate(), ymd(2025, 6, 1)).await,
            MaterializeOutcome::OutOfRange
        );
        assert!(m.materialize(&candidate(), ymd(2025, 5, 31)).await.is_inserted());
        assert!(m.materialize(&candidate(), ymd(2025, 5, 1)).await.is_inserted());
    }

    #[tokio::test]
    async fn oversized_horizon_is_capped_at_a_year() {
        let mut m = Materializer::new(
            source(),
            Arc::new(NullGeocoder),
            Arc::new(InMemoryFacilityMaster::default()),
            ymd(2025, 5, 1),
            i64::MAX,
        );
        assert!(m.materialize(&candidate(), ymd(2026, 5, 1)).await.is_inserted());
        assert_eq!(
            m.materialize(&candidate(), ymd(2026, 5, 2)).await,
            MaterializeOutcome::OutOfRange
        );
    }

    #[tokio::test]
    async fn total_geocode_miss_uses_city_center() {
        let mut m = materializer(Arc::new(NullGeocoder), InMemoryFacilityMaster::default());
        m.materialize(&candidate(), ymd(2025, 5, 14)).await;
        let event = &m.events()[0];
        assert_eq!((event.lat, event.lng), (35.4437, 139.638));
        assert_eq!(event.address, "神奈川県横浜市");
        assert_eq!(event.venue_name, "こども館");
    }

    #[tokio::test]
    async fn facility_master_address_is_tried_first() {
        let mut facilities = InMemoryFacilityMaster::default();
        facilities.insert("yokohama", "こども館", "神奈川県横浜市西区3-3");
        let mut geocoder = StaticGeocoder::default();
        geocoder.insert("神奈川県横浜市西区3-3", LatLng::new(35.46, 139.62));
        geocoder.insert("神奈川県横浜市 こども館", LatLng::new(1.0, 1.0));

        let mut m = materializer(Arc::new(geocoder), facilities);
        m.materialize(&candidate(), ymd(2025, 5, 14)).await;
        let event = &m.events()[0];
        assert_eq!((event.lat, event.lng), (35.46, 139.62));
        assert_eq!(event.address, "神奈川県横浜市西区3-3");
    }

    #[tokio::test]
    async fn geocode_results_are_cached_per_candidate_list() {
        let geocoder = Arc::new(CountingGeocoder {
            calls: AtomicUsize::new(0),
            inner: StaticGeocoder::default(),
        });
        let mut m = materializer(geocoder.clone(), InMemoryFacilityMaster::default());
        m.materialize(&candidate(), ymd(2025, 5, 14)).await;
        m.materialize(&candidate(), ymd(2025, 5, 21)).await;
        assert_eq!(m.len(), 2);
        assert_eq!(geocoder.calls.load(Ordering::SeqCst), 1);
        assert_eq!(m.geocoder_calls(), 1);
    }

    #[tokio::test]
    async fn parenthetical_address_is_written_and_prefixed() {
        let mut m = materializer(Arc::new(NullGeocoder), InMemoryFacilityMaster::default());
        let mut c = candidate();
        c.parenthetical_address = Some("中区本町1-2".into());
        c.time_range = None;
        m.materialize(&c, ymd(2025, 5, 14)).await;
        let event = &m.events()[0];
        assert_eq!(event.address, "神奈川県横浜市中区本町1-2");
        assert_eq!(event.ends_at, None);
    }
}
