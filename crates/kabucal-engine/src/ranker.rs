//! Candidate list construction and confidence tiering.

use chrono::{Duration, DurationRound};
use kabucal_core::{
    CandidateRecord, Confidence, InferenceResult, SourceDatetime, Timestamp, TradingSessions,
};

use crate::merge::MergedCompany;

/// Rules shared by every record of one run.
#[derive(Debug, Clone, Copy)]
pub struct RankingRules {
    pub sessions: TradingSessions,
    /// Allowed skew, in minutes, for two datetimes to count as agreeing.
    /// Zero means identical to the minute.
    pub match_tolerance_minutes: u32,
}

impl Default for RankingRules {
    fn default() -> Self {
        Self {
            sessions: TradingSessions::default(),
            match_tolerance_minutes: 0,
        }
    }
}

impl RankingRules {
    #[must_use]
    pub fn agree(&self, a: Timestamp, b: Timestamp) -> bool {
        let a = truncate_to_minute(a);
        let b = truncate_to_minute(b);
        (a - b).num_minutes().abs() <= i64::from(self.match_tolerance_minutes)
    }
}

fn truncate_to_minute(dt: Timestamp) -> Timestamp {
    dt.duration_trunc(Duration::minutes(1)).unwrap_or(dt)
}

/// Signals available for one company, in priority order.
#[derive(Debug, Clone, Copy)]
pub struct Signals<'a> {
    pub ir: Option<Timestamp>,
    pub inferred: Option<Timestamp>,
    pub sources: &'a [SourceDatetime],
}

impl Signals<'_> {
    fn source_values(&self) -> impl Iterator<Item = Timestamp> + '_ {
        self.sources.iter().filter_map(|s| s.datetime)
    }

    /// IR, then inference, then each source in priority order. A matching
    /// inference and a standalone inference hold the same slot, so the
    /// order never depends on agreement. Exact duplicates are dropped.
    #[must_use]
    pub fn candidates(&self) -> Vec<Timestamp> {
        let mut out: Vec<Timestamp> = Vec::new();
        for dt in self.ir.into_iter().chain(self.inferred).chain(self.source_values()) {
            if !out.contains(&dt) {
                out.push(dt);
            }
        }
        out
    }

    #[must_use]
    pub fn confidence(&self, rules: &RankingRules) -> Confidence {
        if self.ir.is_some() {
            return Confidence::Highest;
        }

        let sources: Vec<Timestamp> = self.source_values().collect();

        let inferred_agrees = self
            .inferred
            .is_some_and(|inf| sources.iter().any(|&s| rules.agree(inf, s)));
        let sources_agree = sources
            .iter()
            .enumerate()
            .any(|(i, &a)| sources[i + 1..].iter().any(|&b| rules.agree(a, b)));
        if inferred_agrees || sources_agree {
            return Confidence::High;
        }

        match sources.len() + usize::from(self.inferred.is_some()) {
            0 => Confidence::None,
            1 => Confidence::Low,
            _ => Confidence::Medium,
        }
    }
}

/// Folds every signal for one company into its final record.
#[must_use]
pub fn build_record(
    merged: MergedCompany,
    inference: InferenceResult,
    ir_datetime: Option<Timestamp>,
    rules: &RankingRules,
) -> CandidateRecord {
    let signals = Signals {
        ir: ir_datetime,
        inferred: inference.inferred,
        sources: &merged.source_datetimes,
    };
    let candidate_datetimes = signals.candidates();
    let confidence = signals.confidence(rules);
    let datetime = candidate_datetimes.first().copied();

    CandidateRecord {
        code: merged.code,
        name: merged.name,
        datetime,
        confidence,
        during_trading_hours: datetime.is_some_and(|dt| rules.sessions.contains(dt)),
        candidate_datetimes,
        source_datetimes: merged.source_datetimes,
        ir_datetime,
        inferred_datetime: inference.inferred,
        past_datetimes: inference.past,
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use kabucal_core::{CompanyCode, InferenceConfidence};

    use super::*;

    fn at(h: u32, m: u32) -> Timestamp {
        NaiveDate::from_ymd_opt(2026, 2, 10)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn columns(values: &[Option<Timestamp>]) -> Vec<SourceDatetime> {
        values
            .iter()
            .enumerate()
            .map(|(i, dt)| SourceDatetime {
                source: format!("s{i}"),
                datetime: *dt,
            })
            .collect()
    }

    fn confidence_of(ir: Option<Timestamp>, inferred: Option<Timestamp>, sources: &[Option<Timestamp>]) -> Confidence {
        let sources = columns(sources);
        Signals { ir, inferred, sources: &sources }.confidence(&RankingRules::default())
    }

    #[test]
    fn ir_always_wins_highest() {
        assert_eq!(confidence_of(Some(at(13, 0)), None, &[]), Confidence::Highest);
        assert_eq!(
            confidence_of(Some(at(13, 0)), Some(at(15, 0)), &[Some(at(15, 0)), Some(at(15, 0))]),
            Confidence::Highest
        );
    }

    #[test]
    fn agreement_between_sources_or_with_inference_is_high() {
        assert_eq!(
            confidence_of(None, None, &[Some(at(15, 30)), Some(at(15, 30)), None]),
            Confidence::High
        );
        assert_eq!(
            confidence_of(None, Some(at(15, 0)), &[Some(at(13, 0)), Some(at(15, 0))]),
            Confidence::High
        );
    }

    #[test]
    fn disagreeing_signals_are_medium() {
        assert_eq!(
            confidence_of(None, Some(at(15, 0)), &[Some(at(13, 0))]),
            Confidence::Medium
        );
        assert_eq!(
            confidence_of(None, None, &[Some(at(13, 0)), Some(at(14, 0))]),
            Confidence::Medium
        );
    }

    #[test]
    fn single_or_no_signal() {
        assert_eq!(confidence_of(None, None, &[None, Some(at(11, 0))]), Confidence::Low);
        assert_eq!(confidence_of(None, Some(at(11, 0)), &[None]), Confidence::Low);
        assert_eq!(confidence_of(None, None, &[None, None]), Confidence::None);
    }

    #[test]
    fn agreement_ignores_seconds() {
        let a = at(15, 0) + Duration::seconds(20);
        assert_eq!(confidence_of(None, None, &[Some(a), Some(at(15, 0))]), Confidence::High);
    }

    #[test]
    fn tolerance_widens_agreement() {
        let sources = columns(&[Some(at(15, 0)), Some(at(15, 1))]);
        let signals = Signals { ir: None, inferred: None, sources: &sources };
        assert_eq!(signals.confidence(&RankingRules::default()), Confidence::Medium);
        let loose = RankingRules {
            match_tolerance_minutes: 1,
            ..RankingRules::default()
        };
        assert_eq!(signals.confidence(&loose), Confidence::High);
    }

    #[test]
    fn candidates_follow_priority_and_dedupe() {
        let sources = columns(&[Some(at(13, 30)), None, Some(at(13, 0)), Some(at(14, 0))]);
        let signals = Signals {
            ir: Some(at(13, 0)),
            inferred: Some(at(14, 0)),
            sources: &sources,
        };
        assert_eq!(signals.candidates(), vec![at(13, 0), at(14, 0), at(13, 30)]);
    }

    #[test]
    fn record_head_matches_datetime_and_trading_hours() {
        let merged = MergedCompany {
            code: CompanyCode::parse("6758").unwrap(),
            name: "ソニーグループ".to_string(),
            source_datetimes: columns(&[Some(at(13, 30))]),
        };
        let inference = InferenceResult {
            inferred: None,
            confidence: InferenceConfidence::None,
            past: Vec::new(),
        };
        let record = build_record(merged, inference, Some(at(13, 0)), &RankingRules::default());

        assert_eq!(record.datetime, Some(at(13, 0)));
        assert_eq!(record.candidate_datetimes, vec![at(13, 0), at(13, 30)]);
        assert_eq!(record.confidence, Confidence::Highest);
        assert!(record.during_trading_hours);
    }

    #[test]
    fn after_close_is_outside_trading_hours() {
        let merged = MergedCompany {
            code: CompanyCode::parse("7203").unwrap(),
            name: String::new(),
            source_datetimes: columns(&[Some(at(15, 30))]),
        };
        let record = build_record(merged, InferenceResult::empty(), None, &RankingRules::default());
        assert!(!record.during_trading_hours);
        assert_eq!(record.confidence, Confidence::Low);
    }

    #[test]
    fn empty_record_has_no_datetime() {
        let merged = MergedCompany {
            code: CompanyCode::parse("9432").unwrap(),
            name: "日本電信電話".to_string(),
            source_datetimes: columns(&[None]),
        };
        let record = build_record(merged, InferenceResult::empty(), None, &RankingRules::default());
        assert_eq!(record.datetime, None);
        assert!(record.candidate_datetimes.is_empty());
        assert_eq!(record.confidence, Confidence::None);
        assert!(!record.during_trading_hours);
    }
}
