//! Company IR page discovery, datetime parsing and the discovery cache.

pub mod cache;
pub mod discovery;
pub mod error;
pub mod fetch;
pub mod html;
pub mod llm;
pub mod parser;
pub mod pipeline;
pub mod urls;

pub use cache::DiscoveryCache;
pub use discovery::{DiscoveryRun, DiscoveryState, IrDiscovery};
pub use error::{CacheError, FetchError, LlmError};
pub use fetch::PageFetcher;
pub use llm::{llm_from_settings, LlmCapability, OpenAiCompatibleLlm, RateLimitedLlm};
pub use parser::{extract_rule_based, IrParser, RuleOutcome};
pub use pipeline::{IrDatetime, IrLookup};
