pub mod collector;
pub mod config;
pub mod date;
pub mod event;
pub mod geo;
pub mod logging;
pub mod run_id;
pub mod source;
pub mod text;
pub mod timezone;
pub mod venue;

pub use collector::{CollectionReport, Collector, CollectorError, Observer, PageFetcher, RunSummary};
pub use config::{CollectorSettings, ConfigError};
pub use date::{DateToken, FiscalYearContext, RecurrenceSpec, TimeRange};
pub use event::{CanonicalEvent, RawEventCandidate};
pub use geo::{FacilityMaster, Geocoder, LatLng};
pub use source::{Discovery, SourceConfig};
