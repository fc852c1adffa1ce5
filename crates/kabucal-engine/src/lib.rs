//! Earnings datetime resolution: source adapters, the parallel executor,
//! historical inference, the outer merge, candidate ranking and the
//! resolver that ties them together.

pub mod error;
pub mod inference;
pub mod merge;
pub mod parallel;
pub mod provider;
pub mod ranker;
pub mod resolver;
pub mod sources;

pub use error::SourceError;
pub use inference::infer;
pub use merge::{outer_merge, MergedCompany};
pub use parallel::{ParallelExecutor, TaskOutcome};
pub use provider::HttpJsonProvider;
pub use ranker::{build_record, RankingRules, Signals};
pub use resolver::{ResolveReport, Resolver, ResolverOptions};
pub use sources::{
    next_weekday, parse_source_datetime, probe_source, HttpJsonSource, RawObservation,
    SourceAdapter,
};
