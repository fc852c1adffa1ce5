use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{NaiveDateTime, NaiveTime};
use kabucal_core::{CacheEntry, Confidence, DiscoveredVia, ManualClock, PageType};

use super::*;
use crate::error::SourceError;
use crate::sources::{probe_source, RawObservation};

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

struct FakeSource {
    name: &'static str,
    rows: Vec<RawObservation>,
    delay: Duration,
    fail: bool,
}

impl FakeSource {
    fn new(name: &'static str, rows: Vec<RawObservation>) -> Self {
        Self {
            name,
            rows,
            delay: Duration::ZERO,
            fail: false,
        }
    }

    fn slow(name: &'static str, rows: Vec<RawObservation>, delay: Duration) -> Self {
        Self {
            delay,
            ..Self::new(name, rows)
        }
    }

    fn failing(name: &'static str) -> Self {
        Self {
            fail: true,
            ..Self::new(name, Vec::new())
        }
    }
}

#[async_trait]
impl SourceAdapter for FakeSource {
    fn name(&self) -> &str {
        self.name
    }

    async fn fetch(&self, _date: NaiveDate) -> Result<Vec<RawObservation>, SourceError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail {
            return Err(SourceError::UnexpectedStatus {
                status: 503,
                url: format!("https://{}.example.jp/api", self.name),
            });
        }
        Ok(self.rows.clone())
    }

    async fn health_check(&self) -> SourceHealth {
        probe_source(self, target(), 1).await
    }
}

#[derive(Default)]
struct HistoryProvider {
    past: HashMap<&'static str, Vec<Timestamp>>,
    delay: Duration,
}

#[async_trait]
impl CompanyDataProvider for HistoryProvider {
    async fn website(&self, _code: &CompanyCode) -> Option<String> {
        None
    }

    async fn past_announcements(&self, code: &CompanyCode, limit: usize) -> Vec<Timestamp> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let mut past = self.past.get(code.as_str()).cloned().unwrap_or_default();
        past.truncate(limit);
        past
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn target() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 2, 10).unwrap()
}

fn ts(raw: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M").unwrap()
}

fn at(h: u32, m: u32) -> Timestamp {
    target().and_hms_opt(h, m, 0).unwrap()
}

fn row(code: &str, name: &str, datetime: Option<Timestamp>) -> RawObservation {
    RawObservation {
        code: code.to_string(),
        name: name.to_string(),
        datetime,
    }
}

fn options() -> ResolverOptions {
    ResolverOptions {
        max_workers: 4,
        source_timeout: Duration::from_secs(5),
        ir_timeout: Duration::from_secs(5),
        request_timeout_secs: 5,
        user_agent: "kabucal-test/0.1".to_string(),
        history_limit: 8,
        rules: RankingRules::default(),
    }
}

fn resolver(sources: Vec<FakeSource>) -> Resolver {
    resolver_with(options(), sources, Arc::new(HistoryProvider::default()), None)
}

fn resolver_with(
    options: ResolverOptions,
    sources: Vec<FakeSource>,
    provider: Arc<dyn CompanyDataProvider>,
    ir: Option<IrLookup>,
) -> Resolver {
    let sources: Vec<Arc<dyn SourceAdapter>> = sources
        .into_iter()
        .map(|s| Arc::new(s) as Arc<dyn SourceAdapter>)
        .collect();
    Resolver::new(options, sources, provider, ir)
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| (*s).to_string()).collect()
}

/// An IR lookup whose cache already knows `code` announces at `datetime`.
/// No network is touched for that code.
fn warm_ir(dir: &tempfile::TempDir, code: &str, datetime: Timestamp) -> IrLookup {
    let clock = Arc::new(ManualClock::new(ts("2026-02-01 09:00")));
    let cache = Arc::new(DiscoveryCache::open(dir.path().join("ir_cache.json"), 30, clock));
    cache
        .set(
            &CompanyCode::parse(code).unwrap(),
            CacheEntry {
                ir_url: "https://www.sony.com/ja/SonyInfo/IR/calendar/".to_string(),
                ir_type: PageType::Calendar,
                last_known_datetime: Some(datetime),
                discovered_via: DiscoveredVia::Manual,
                last_updated: ts("2026-02-01 09:00"),
                success_count: 1,
            },
        )
        .unwrap();

    let provider: Arc<dyn CompanyDataProvider> = Arc::new(NoProvider);
    IrLookup::new(
        Some(Arc::clone(&cache)),
        IrDiscovery::new(Some(cache), provider, None),
        IrParser::new(None, NaiveTime::from_hms_opt(15, 30, 0).unwrap()),
    )
}

fn assert_record_invariants(records: &[CandidateRecord]) {
    for r in records {
        assert_eq!(
            r.confidence == Confidence::Highest,
            r.ir_datetime.is_some(),
            "highest iff IR for {}",
            r.code
        );
        assert_eq!(r.candidate_datetimes.first().copied(), r.datetime, "head for {}", r.code);
        let mut unique = r.candidate_datetimes.clone();
        unique.sort_unstable();
        unique.dedup();
        assert_eq!(unique.len(), r.candidate_datetimes.len(), "duplicates for {}", r.code);
    }
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn two_agreeing_sources_are_high() {
    let resolver = resolver(vec![
        FakeSource::new("sbi", vec![row("7203", "トヨタ自動車", Some(at(15, 30)))]),
        FakeSource::new("matsui", vec![row("7203", "トヨタ自動車", Some(at(15, 30)))]),
        FakeSource::new("tradersweb", vec![row("7203", "トヨタ", None)]),
    ]);

    let records = resolver
        .resolve("2026-02-10", &names(&["sbi", "matsui", "tradersweb"]), false, false, false)
        .await
        .unwrap();

    assert_eq!(records.len(), 1);
    let toyota = &records[0];
    assert_eq!(toyota.confidence, Confidence::High);
    assert_eq!(toyota.datetime, Some(at(15, 30)));
    assert_eq!(toyota.candidate_datetimes, vec![at(15, 30)]);
    assert!(!toyota.during_trading_hours);
    assert_eq!(toyota.source_datetime("tradersweb"), None);
    assert_record_invariants(&records);
}

#[tokio::test]
async fn lone_source_is_low() {
    let resolver = resolver(vec![
        FakeSource::new("sbi", vec![row("9984", "ソフトバンクグループ", Some(at(11, 0)))]),
        FakeSource::new("matsui", vec![row("9984", "", None)]),
    ]);

    let records = resolver
        .resolve("2026-02-10", &[], true, false, false)
        .await
        .unwrap();

    let sbg = &records[0];
    assert_eq!(sbg.confidence, Confidence::Low);
    assert_eq!(sbg.datetime, Some(at(11, 0)));
    assert!(sbg.during_trading_hours);
    assert_eq!(sbg.inferred_datetime, None);
}

#[tokio::test]
async fn ir_datetime_is_highest_and_leads_candidates() {
    let dir = tempfile::tempdir().unwrap();
    let resolver = resolver_with(
        options(),
        vec![FakeSource::new("sbi", vec![row("6758", "ソニーグループ", Some(at(13, 30)))])],
        Arc::new(HistoryProvider::default()),
        Some(warm_ir(&dir, "6758", at(13, 0))),
    );

    let records = resolver
        .resolve("2026-02-10", &names(&["sbi"]), false, true, false)
        .await
        .unwrap();

    let sony = &records[0];
    assert_eq!(sony.confidence, Confidence::Highest);
    assert_eq!(sony.datetime, Some(at(13, 0)));
    assert_eq!(sony.ir_datetime, Some(at(13, 0)));
    assert_eq!(sony.candidate_datetimes, vec![at(13, 0), at(13, 30)]);
    assert_record_invariants(&records);
}

#[tokio::test]
async fn name_only_row_has_no_signal() {
    let resolver = resolver(vec![FakeSource::new("sbi", vec![row("9432", "日本電信電話", None)])]);

    let records = resolver
        .resolve("2026-02-10", &names(&["sbi"]), true, true, false)
        .await
        .unwrap();

    let ntt = &records[0];
    assert_eq!(ntt.name, "日本電信電話");
    assert_eq!(ntt.confidence, Confidence::None);
    assert_eq!(ntt.datetime, None);
    assert!(ntt.candidate_datetimes.is_empty());
    assert!(!ntt.during_trading_hours);
}

#[tokio::test]
async fn inference_matching_a_source_is_high() {
    let provider = HistoryProvider {
        past: HashMap::from([(
            "8306",
            vec![ts("2025-11-14 15:00"), ts("2025-08-01 15:00"), ts("2025-05-15 15:00")],
        )]),
        delay: Duration::ZERO,
    };
    let resolver = resolver_with(
        options(),
        vec![
            FakeSource::new("sbi", vec![row("8306", "三菱UFJ", Some(at(13, 0)))]),
            FakeSource::new("matsui", vec![row("8306", "三菱UFJ", Some(at(15, 0)))]),
        ],
        Arc::new(provider),
        None,
    );

    let records = resolver.resolve("2026-02-10", &[], true, false, false).await.unwrap();

    let mufg = &records[0];
    assert_eq!(mufg.inferred_datetime, Some(at(15, 0)));
    assert_eq!(mufg.confidence, Confidence::High);
    assert_eq!(mufg.datetime, Some(at(15, 0)));
    assert_eq!(mufg.candidate_datetimes, vec![at(15, 0), at(13, 0)]);
    assert_eq!(mufg.past_datetimes.len(), 3);
}

#[tokio::test(start_paused = true)]
async fn timed_out_source_contributes_nothing() {
    let rows = || vec![row("9984", "ソフトバンクグループ", Some(at(11, 0)))];
    let mut opts = options();
    opts.source_timeout = Duration::from_secs(1);

    let baseline = resolver_with(
        opts.clone(),
        vec![FakeSource::new("sbi", rows())],
        Arc::new(HistoryProvider::default()),
        None,
    )
    .resolve_report("2026-02-10", &[], false, false, false)
    .await
    .unwrap();

    let with_slow = resolver_with(
        opts,
        vec![
            FakeSource::new("sbi", rows()),
            FakeSource::slow("matsui", vec![row("9984", "", Some(at(11, 0)))], Duration::from_secs(120)),
        ],
        Arc::new(HistoryProvider::default()),
        None,
    )
    .resolve_report("2026-02-10", &[], false, false, false)
    .await
    .unwrap();

    assert_eq!(with_slow.records[0].confidence, baseline.records[0].confidence);
    assert_eq!(with_slow.records[0].confidence, Confidence::Low);
    assert_eq!(with_slow.records[0].source_datetime("matsui"), None);
    assert_eq!(with_slow.degraded_sources.len(), 1);
    assert_eq!(with_slow.degraded_sources[0].source, "matsui");
    assert!(with_slow.degraded_sources[0].reason.contains("timed out"));
}

#[tokio::test]
async fn failing_source_is_reported_as_degraded() {
    let resolver = resolver(vec![
        FakeSource::failing("kabutan"),
        FakeSource::new("sbi", vec![row("7203", "トヨタ自動車", Some(at(13, 25)))]),
    ]);

    let report = resolver
        .resolve_report("2026-02-10", &[], false, false, false)
        .await
        .unwrap();

    assert_eq!(report.records.len(), 1);
    assert_eq!(report.degraded_sources[0].source, "kabutan");
    assert!(report.degraded_sources[0].reason.contains("503"));
    assert_eq!(report.records[0].source_datetimes[0].source, "kabutan");
    assert_eq!(report.records[0].source_datetimes[0].datetime, None);
}

#[tokio::test(start_paused = true)]
async fn slow_company_unit_yields_no_signal() {
    let provider = HistoryProvider {
        past: HashMap::from([("7203", vec![ts("2025-11-05 13:25")])]),
        delay: Duration::from_secs(300),
    };
    let mut opts = options();
    opts.ir_timeout = Duration::from_secs(30);
    let resolver = resolver_with(
        opts,
        vec![FakeSource::new("sbi", vec![row("7203", "トヨタ自動車", Some(at(13, 25)))])],
        Arc::new(provider),
        None,
    );

    let records = resolver.resolve("2026-02-10", &[], true, false, false).await.unwrap();
    assert_eq!(records[0].inferred_datetime, None);
    assert_eq!(records[0].confidence, Confidence::Low);
}

/// Delays `website` so a cold IR lookup spends `website_delay` in discovery
/// before giving up.
struct SlowWebsiteProvider {
    history: HistoryProvider,
    website_delay: Duration,
}

#[async_trait]
impl CompanyDataProvider for SlowWebsiteProvider {
    async fn website(&self, _code: &CompanyCode) -> Option<String> {
        tokio::time::sleep(self.website_delay).await;
        None
    }

    async fn past_announcements(&self, code: &CompanyCode, limit: usize) -> Vec<Timestamp> {
        self.history.past_announcements(code, limit).await
    }
}

#[tokio::test(start_paused = true)]
async fn inference_and_ir_lookup_run_side_by_side_within_unit_budget() {
    let provider: Arc<dyn CompanyDataProvider> = Arc::new(SlowWebsiteProvider {
        history: HistoryProvider {
            past: HashMap::from([("7203", vec![ts("2025-11-05 13:25"), ts("2025-08-01 13:25")])]),
            delay: Duration::from_secs(4),
        },
        website_delay: Duration::from_secs(4),
    });
    let ir = IrLookup::new(
        None,
        IrDiscovery::new(None, Arc::clone(&provider), None),
        IrParser::new(None, NaiveTime::from_hms_opt(15, 30, 0).unwrap()),
    );
    let mut opts = options();
    opts.ir_timeout = Duration::from_secs(5);
    let resolver = resolver_with(
        opts,
        vec![FakeSource::new("sbi", vec![row("7203", "トヨタ自動車", Some(at(13, 25)))])],
        provider,
        Some(ir),
    );

    let records = resolver.resolve("2026-02-10", &[], true, true, false).await.unwrap();
    assert_eq!(records[0].inferred_datetime, Some(at(13, 25)));
    assert_eq!(records[0].ir_datetime, None);
    assert_eq!(records[0].confidence, Confidence::High);
}

// ---------------------------------------------------------------------------
// Input validation and source selection
// ---------------------------------------------------------------------------

#[tokio::test]
async fn malformed_date_is_rejected() {
    let resolver = resolver(vec![FakeSource::new("sbi", Vec::new())]);
    let err = resolver.resolve("2026/02/10", &[], false, false, false).await.unwrap_err();
    assert!(matches!(err, ResolveError::InvalidDate { .. }), "got {err:?}");
}

#[tokio::test]
async fn unknown_source_is_rejected_before_fetching() {
    let resolver = resolver(vec![FakeSource::new("sbi", Vec::new())]);
    let err = resolver
        .resolve("2026-02-10", &names(&["sbi", "nikkei"]), false, false, false)
        .await
        .unwrap_err();
    assert!(matches!(err, ResolveError::UnknownSource(ref name) if name == "nikkei"), "got {err:?}");
}

#[tokio::test]
async fn requested_order_sets_column_order_and_duplicates_collapse() {
    let resolver = resolver(vec![
        FakeSource::new("sbi", vec![row("7203", "", Some(at(13, 25)))]),
        FakeSource::new("matsui", vec![row("7203", "トヨタ自動車", Some(at(13, 30)))]),
    ]);

    let records = resolver
        .resolve("2026-02-10", &names(&["matsui", "sbi", "matsui"]), false, false, false)
        .await
        .unwrap();

    let columns: Vec<&str> = records[0].source_datetimes.iter().map(|s| s.source.as_str()).collect();
    assert_eq!(columns, vec!["matsui", "sbi"]);
    assert_eq!(records[0].candidate_datetimes, vec![at(13, 30), at(13, 25)]);
    assert_eq!(records[0].confidence, Confidence::Medium);
}

#[tokio::test]
async fn empty_request_uses_every_registered_source() {
    let resolver = resolver(vec![
        FakeSource::new("sbi", vec![row("7203", "", None)]),
        FakeSource::new("matsui", vec![row("6758", "", None)]),
        FakeSource::new("tradersweb", vec![row("9984", "", None), row("bad!", "", None)]),
    ]);
    assert_eq!(resolver.source_names(), vec!["sbi", "matsui", "tradersweb"]);

    let records = resolver.resolve("2026-02-10", &[], false, false, false).await.unwrap();
    let codes: Vec<&str> = records.iter().map(|r| r.code.as_str()).collect();
    assert_eq!(codes, vec!["6758", "7203", "9984"]);
    assert!(records.iter().all(|r| r.source_datetimes.len() == 3));
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

#[tokio::test]
async fn repeated_runs_with_warm_cache_are_identical() {
    let dir = tempfile::tempdir().unwrap();
    let provider = HistoryProvider {
        past: HashMap::from([("6758", vec![ts("2025-11-11 15:30"), ts("2025-08-07 15:30")])]),
        delay: Duration::ZERO,
    };
    let resolver = resolver_with(
        options(),
        vec![
            FakeSource::new(
                "sbi",
                vec![
                    row("6758", "ソニーグループ", Some(at(13, 30))),
                    row("7203", "トヨタ自動車", Some(at(13, 25))),
                    row("9984", "ソフトバンクグループ", None),
                ],
            ),
            FakeSource::new(
                "matsui",
                vec![row("7203", "トヨタ自動車", Some(at(13, 25))), row("4063", "信越化学", Some(at(12, 0)))],
            ),
        ],
        Arc::new(provider),
        Some(warm_ir(&dir, "6758", at(13, 0))),
    );

    let first = resolver.resolve("2026-02-10", &[], true, true, false).await.unwrap();
    let second = resolver.resolve("2026-02-10", &[], true, true, false).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first.len(), 4);
    assert_record_invariants(&first);
}

#[tokio::test]
async fn check_sources_reports_in_registry_order() {
    let resolver = resolver(vec![
        FakeSource::new("sbi", vec![row("7203", "", None)]),
        FakeSource::failing("kabutan"),
        FakeSource::new("matsui", Vec::new()),
    ]);

    let health = resolver.check_sources().await;
    let summary: Vec<(&str, bool, usize)> = health
        .iter()
        .map(|h| (h.name.as_str(), h.ok, h.row_count))
        .collect();
    assert_eq!(
        summary,
        vec![("sbi", true, 1), ("kabutan", false, 0), ("matsui", false, 0)]
    );
    assert!(health[1].error.as_deref().unwrap().contains("503"));
}

#[tokio::test(start_paused = true)]
async fn check_sources_marks_hung_source_unhealthy() {
    let mut opts = options();
    opts.source_timeout = Duration::from_secs(2);
    let resolver = resolver_with(
        opts,
        vec![FakeSource::slow("sbi", Vec::new(), Duration::from_secs(600))],
        Arc::new(HistoryProvider::default()),
        None,
    );

    let health = resolver.check_sources().await;
    assert!(!health[0].ok);
    assert_eq!(health[0].error.as_deref(), Some("timed out after 2s"));
}
