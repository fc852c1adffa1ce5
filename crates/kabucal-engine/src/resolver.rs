//! The aggregator: fetch every source, merge by company, gather inference
//! and IR signals per company, and rank.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use kabucal_core::{
    load_sources, parse_target_date, AppConfig, CandidateRecord, Clock, CompanyCode,
    CompanyDataProvider, CompanyObservation, ConfigError, InferenceResult, NoProvider,
    ResolveError, SourceFailure, SourceHealth, Timestamp,
};
use kabucal_ir::{
    llm_from_settings, DiscoveryCache, IrDiscovery, IrLookup, IrParser, LlmCapability,
    PageFetcher,
};
use serde::Serialize;

use crate::inference::infer;
use crate::merge::{outer_merge, MergedCompany};
use crate::parallel::{ParallelExecutor, TaskOutcome};
use crate::provider::HttpJsonProvider;
use crate::ranker::{build_record, RankingRules};
use crate::sources::{HttpJsonSource, SourceAdapter};

/// Knobs for one resolver instance.
#[derive(Debug, Clone)]
pub struct ResolverOptions {
    pub max_workers: usize,
    pub source_timeout: Duration,
    pub ir_timeout: Duration,
    pub request_timeout_secs: u64,
    pub user_agent: String,
    pub history_limit: usize,
    pub rules: RankingRules,
}

impl ResolverOptions {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            max_workers: config.max_workers,
            source_timeout: config.source_timeout(),
            ir_timeout: config.ir_timeout(),
            request_timeout_secs: config.request_timeout_secs,
            user_agent: config.user_agent.clone(),
            history_limit: config.history_limit,
            rules: RankingRules {
                sessions: config.sessions(),
                match_tolerance_minutes: config.match_tolerance_minutes,
            },
        }
    }
}

/// Records plus the sources that could not contribute to them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolveReport {
    pub records: Vec<CandidateRecord>,
    pub degraded_sources: Vec<SourceFailure>,
}

/// Signals gathered for one company by its per-company unit.
struct CompanySignals {
    inference: InferenceResult,
    ir: Option<Timestamp>,
}

impl CompanySignals {
    fn none() -> Self {
        Self {
            inference: InferenceResult::empty(),
            ir: None,
        }
    }
}

pub struct Resolver {
    options: ResolverOptions,
    sources: Vec<Arc<dyn SourceAdapter>>,
    provider: Arc<dyn CompanyDataProvider>,
    ir: Option<Arc<IrLookup>>,
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("options", &self.options)
            .field(
                "sources",
                &self.sources.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .field("ir", &self.ir.is_some())
            .finish_non_exhaustive()
    }
}

impl Resolver {
    /// `sources` is the registry, in registry order. Without `ir` every
    /// company resolves with no IR signal.
    #[must_use]
    pub fn new(
        options: ResolverOptions,
        sources: Vec<Arc<dyn SourceAdapter>>,
        provider: Arc<dyn CompanyDataProvider>,
        ir: Option<IrLookup>,
    ) -> Self {
        Self {
            options,
            sources,
            provider,
            ir: ir.map(Arc::new),
        }
    }

    /// Wires the production stack from configuration: the YAML source
    /// registry, the HTTP provider (if configured), the optional LLM
    /// capability, and the on-disk discovery cache.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::Config`] if the source registry cannot be
    /// loaded or a component cannot be constructed.
    pub fn from_app_config(config: &AppConfig, clock: Arc<dyn Clock>) -> Result<Self, ResolveError> {
        let registry = load_sources(&config.sources_path)?;

        let mut sources: Vec<Arc<dyn SourceAdapter>> = Vec::with_capacity(registry.sources.len());
        for source in registry.sources {
            let name = source.name.clone();
            let adapter = HttpJsonSource::new(
                source,
                config.request_timeout_secs,
                &config.user_agent,
                Arc::clone(&clock),
            )
            .map_err(|e| ConfigError::Validation(format!("source '{name}': {e}")))?;
            sources.push(Arc::new(adapter));
        }

        let provider: Arc<dyn CompanyDataProvider> = match &config.provider_url {
            Some(url) => Arc::new(
                HttpJsonProvider::new(url, config.request_timeout_secs, &config.user_agent)
                    .map_err(|e| ConfigError::Validation(format!("company provider: {e}")))?,
            ),
            None => {
                tracing::info!("no company data provider configured; inference and IR discovery have no input");
                Arc::new(NoProvider)
            }
        };

        let llm: Option<Arc<dyn LlmCapability>> = match &config.llm {
            Some(settings) => {
                let llm = llm_from_settings(settings, config.request_timeout_secs)
                    .map_err(|e| ConfigError::Validation(format!("LLM client: {e}")))?;
                tracing::info!(model = %settings.model, rpm = settings.requests_per_minute, "LLM fallback enabled");
                Some(Arc::new(llm))
            }
            None => None,
        };

        let cache = Arc::new(DiscoveryCache::open(
            config.cache_path.clone(),
            config.cache_ttl_days,
            clock,
        ));
        let ir = IrLookup::new(
            Some(Arc::clone(&cache)),
            IrDiscovery::new(Some(cache), Arc::clone(&provider), llm.clone()),
            IrParser::new(llm, config.date_only_time),
        );

        Ok(Self::new(
            ResolverOptions::from_app_config(config),
            sources,
            provider,
            Some(ir),
        ))
    }

    /// Names of the registered sources, in registry order.
    #[must_use]
    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    /// Resolves every company announcing on `date`.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::InvalidDate`] or [`ResolveError::UnknownSource`]
    /// for malformed input. Nothing else aborts a run.
    pub async fn resolve(
        &self,
        date: &str,
        sources: &[String],
        use_inference: bool,
        use_ir: bool,
        ir_bypass_cache: bool,
    ) -> Result<Vec<CandidateRecord>, ResolveError> {
        self.resolve_report(date, sources, use_inference, use_ir, ir_bypass_cache)
            .await
            .map(|report| report.records)
    }

    /// [`resolve`](Self::resolve), also reporting which sources degraded.
    ///
    /// # Errors
    ///
    /// Same as [`resolve`](Self::resolve).
    pub async fn resolve_report(
        &self,
        date: &str,
        sources: &[String],
        use_inference: bool,
        use_ir: bool,
        ir_bypass_cache: bool,
    ) -> Result<ResolveReport, ResolveError> {
        let target = parse_target_date(date)?;
        let selected = self.select_sources(sources)?;

        tracing::info!(
            date = %target,
            sources = selected.len(),
            use_inference,
            use_ir,
            ir_bypass_cache,
            "resolving earnings datetimes"
        );

        let (per_source, degraded_sources) = self.fetch_sources(&selected, target).await;
        let merged = outer_merge(&per_source);

        let signals = if use_inference || (use_ir && self.ir.is_some()) {
            self.gather_signals(&merged, target, use_inference, use_ir, ir_bypass_cache)
                .await
        } else {
            merged.iter().map(|_| CompanySignals::none()).collect()
        };

        if use_ir {
            let found = signals.iter().filter(|s| s.ir.is_some()).count();
            tracing::info!("found {found}/{} IR datetimes", merged.len());
        }

        let records: Vec<CandidateRecord> = merged
            .into_iter()
            .zip(signals)
            .map(|(company, signals)| {
                build_record(company, signals.inference, signals.ir, &self.options.rules)
            })
            .collect();

        tracing::info!(
            records = records.len(),
            degraded = degraded_sources.len(),
            "resolution complete"
        );

        Ok(ResolveReport {
            records,
            degraded_sources,
        })
    }

    /// Health-checks every registered source concurrently. Results are in
    /// registry order.
    pub async fn check_sources(&self) -> Vec<SourceHealth> {
        let executor = ParallelExecutor::new(self.options.max_workers, self.options.source_timeout);
        let outcomes = executor
            .run(
                self.sources.clone(),
                |_| (),
                |_, adapter: Arc<dyn SourceAdapter>| async move { adapter.health_check().await },
            )
            .await;

        outcomes
            .into_iter()
            .zip(&self.sources)
            .map(|(outcome, adapter)| match outcome {
                TaskOutcome::Completed(health) => health,
                TaskOutcome::Failed(reason) => unhealthy(adapter.name(), reason),
                TaskOutcome::TimedOut => unhealthy(
                    adapter.name(),
                    format!("timed out after {}s", self.options.source_timeout.as_secs()),
                ),
            })
            .collect()
    }

    /// An empty request selects every registered source. Repeated names are
    /// kept once, at their first position.
    fn select_sources(&self, requested: &[String]) -> Result<Vec<Arc<dyn SourceAdapter>>, ResolveError> {
        if requested.is_empty() {
            return Ok(self.sources.clone());
        }

        let mut seen = HashSet::new();
        let mut selected = Vec::with_capacity(requested.len());
        for name in requested {
            let name = name.trim();
            if !seen.insert(name.to_string()) {
                continue;
            }
            let adapter = self
                .sources
                .iter()
                .find(|s| s.name() == name)
                .ok_or_else(|| ResolveError::UnknownSource(name.to_string()))?;
            selected.push(Arc::clone(adapter));
        }
        Ok(selected)
    }

    async fn fetch_sources(
        &self,
        selected: &[Arc<dyn SourceAdapter>],
        target: NaiveDate,
    ) -> (Vec<(String, Vec<CompanyObservation>)>, Vec<SourceFailure>) {
        let executor = ParallelExecutor::new(self.options.max_workers, self.options.source_timeout);
        let outcomes = executor
            .run(
                selected.to_vec(),
                |_| (),
                move |_, adapter: Arc<dyn SourceAdapter>| async move {
                    adapter
                        .fetch_validated(target)
                        .await
                        .map_err(|e| e.to_string())
                },
            )
            .await;

        let mut per_source = Vec::with_capacity(selected.len());
        let mut failures = Vec::new();

        for (adapter, outcome) in selected.iter().zip(outcomes) {
            let name = adapter.name().to_string();
            let rows = match outcome {
                TaskOutcome::Completed(Ok(rows)) => rows,
                TaskOutcome::Completed(Err(reason)) | TaskOutcome::Failed(reason) => {
                    tracing::warn!(source = %name, error = %reason, "source unavailable");
                    failures.push(SourceFailure {
                        source: name.clone(),
                        reason,
                    });
                    Vec::new()
                }
                TaskOutcome::TimedOut => {
                    let reason = format!("timed out after {}s", self.options.source_timeout.as_secs());
                    tracing::warn!(source = %name, "source fetch timed out");
                    failures.push(SourceFailure {
                        source: name.clone(),
                        reason,
                    });
                    Vec::new()
                }
            };
            per_source.push((name, rows));
        }

        (per_source, failures)
    }

    /// Runs inference and the IR lookup for every company, one unit per
    /// company. A unit that fails or exceeds the IR timeout contributes no
    /// signal.
    async fn gather_signals(
        &self,
        merged: &[MergedCompany],
        target: NaiveDate,
        use_inference: bool,
        use_ir: bool,
        bypass_cache: bool,
    ) -> Vec<CompanySignals> {
        let ir = if use_ir { self.ir.clone() } else { None };
        let provider = Arc::clone(&self.provider);
        let history_limit = self.options.history_limit;
        let request_timeout_secs = self.options.request_timeout_secs;
        let user_agent = self.options.user_agent.clone();
        let wants_fetcher = ir.is_some();

        let make_context = |worker: usize| -> Option<PageFetcher> {
            if !wants_fetcher {
                return None;
            }
            match PageFetcher::new(request_timeout_secs, &user_agent) {
                Ok(fetcher) => Some(fetcher),
                Err(e) => {
                    tracing::warn!(worker, error = %e, "failed to build IR fetcher; worker skips IR lookups");
                    None
                }
            }
        };

        let unit = move |fetcher: Arc<Option<PageFetcher>>, code: CompanyCode| {
            let provider = Arc::clone(&provider);
            let ir = ir.clone();
            async move {
                let inference = async {
                    if use_inference {
                        let past = provider.past_announcements(&code, history_limit).await;
                        infer(&past, target)
                    } else {
                        InferenceResult::empty()
                    }
                };
                let ir_datetime = async {
                    match (ir, Option::as_ref(&*fetcher)) {
                        (Some(lookup), Some(fetcher)) => lookup
                            .lookup(fetcher, &code, target, bypass_cache)
                            .await
                            .map(|hit| hit.datetime),
                        _ => None,
                    }
                };
                let (inference, ir_datetime) = tokio::join!(inference, ir_datetime);

                CompanySignals {
                    inference,
                    ir: ir_datetime,
                }
            }
        };

        let executor = ParallelExecutor::new(self.options.max_workers, self.options.ir_timeout);
        let codes: Vec<CompanyCode> = merged.iter().map(|m| m.code.clone()).collect();
        let outcomes = executor.run(codes, make_context, unit).await;

        outcomes
            .into_iter()
            .zip(merged)
            .map(|(outcome, company)| match outcome {
                TaskOutcome::Completed(signals) => signals,
                TaskOutcome::Failed(reason) => {
                    tracing::warn!(code = %company.code, error = %reason, "company unit failed");
                    CompanySignals::none()
                }
                TaskOutcome::TimedOut => {
                    tracing::warn!(code = %company.code, "company unit timed out");
                    CompanySignals::none()
                }
            })
            .collect()
    }
}

fn unhealthy(name: &str, reason: String) -> SourceHealth {
    SourceHealth {
        name: name.to_string(),
        ok: false,
        row_count: 0,
        error: Some(reason),
    }
}

#[cfg(test)]
#[path = "resolver_test.rs"]
mod tests;
