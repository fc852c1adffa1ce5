//! Historical inference: predict an announcement time from the times a
//! company used before.

use std::collections::HashMap;

use chrono::{NaiveDate, NaiveTime, Timelike};
use kabucal_core::{InferenceConfidence, InferenceResult, Timestamp};

/// Samples needed before a single outlier still counts as a consistent
/// pattern.
const OUTLIER_TOLERANT_SAMPLES: usize = 4;

/// Predicts the announcement datetime on `target` from `past`
/// announcements.
///
/// Times are compared at minute resolution. The dominant time is the most
/// frequent one; ties go to whichever occurred most recently.
#[must_use]
pub fn infer(past: &[Timestamp], target: NaiveDate) -> InferenceResult {
    let mut past = past.to_vec();
    past.sort_unstable_by(|a, b| b.cmp(a));

    if past.is_empty() {
        return InferenceResult::empty();
    }

    let times: Vec<NaiveTime> = past.iter().map(|dt| minute_of(dt.time())).collect();

    let mut counts: HashMap<NaiveTime, usize> = HashMap::new();
    for t in &times {
        *counts.entry(*t).or_default() += 1;
    }

    let max_count = counts.values().copied().max().unwrap_or(0);
    // `times` is most recent first, so the first time reaching the maximum
    // wins a tie.
    let Some(dominant) = times.iter().copied().find(|t| counts[t] == max_count) else {
        return InferenceResult::empty();
    };
    let leaders = counts.values().filter(|&&c| c == max_count).count();

    let n = times.len();
    let confidence = if max_count == n || (n >= OUTLIER_TOLERANT_SAMPLES && max_count == n - 1) {
        InferenceConfidence::High
    } else if leaders == 1 && max_count >= 2 {
        InferenceConfidence::Medium
    } else {
        InferenceConfidence::Low
    };

    tracing::debug!(
        samples = n,
        dominant = %dominant,
        ?confidence,
        "inferred announcement time"
    );

    InferenceResult {
        inferred: Some(target.and_time(dominant)),
        confidence,
        past,
    }
}

fn minute_of(t: NaiveTime) -> NaiveTime {
    NaiveTime::from_hms_opt(t.hour(), t.minute(), 0).unwrap_or(t)
}
