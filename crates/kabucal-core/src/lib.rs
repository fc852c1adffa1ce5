//! Shared domain types and configuration for the earnings datetime resolver.
//!
//! Everything that crosses a crate boundary lives here: company codes,
//! confidence tiers, the per-company observation and output records, the
//! injectable clock, trading-session bounds, and the environment-driven
//! configuration loader.

pub mod app_config;
pub mod clock;
pub mod code;
pub mod config;
pub mod error;
pub mod provider;
pub mod session;
pub mod sources;
pub mod types;

pub use app_config::{AppConfig, LlmSettings};
pub use clock::{Clock, ManualClock, SystemClock};
pub use code::CompanyCode;
pub use config::{load_app_config, load_app_config_from_env};
pub use error::{ConfigError, InvalidCode, ResolveError};
pub use provider::{CompanyDataProvider, NoProvider};
pub use session::TradingSessions;
pub use sources::{load_sources, HealthCheckConfig, SourceConfig, SourcesFile};
pub use types::{
    parse_target_date, CacheEntry, CandidateRecord, CompanyObservation, Confidence,
    DiscoveredVia, EarningsInfo, InferenceConfidence, InferenceResult, IrPageInfo, PageType,
    ParseConfidence, SourceDatetime, SourceFailure, SourceHealth, Timestamp,
};
