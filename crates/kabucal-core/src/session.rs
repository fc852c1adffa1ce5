//! Zaraba (continuous trading) session bounds.

use chrono::NaiveTime;

use crate::types::Timestamp;

/// Morning and afternoon continuous-trading windows, each half-open.
///
/// The afternoon upper bound is configurable: the exchange moved its close
/// from 15:00 to 15:30 and historical material uses both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TradingSessions {
    pub morning_open: NaiveTime,
    pub morning_close: NaiveTime,
    pub afternoon_open: NaiveTime,
    pub afternoon_close: NaiveTime,
}

impl TradingSessions {
    #[must_use]
    pub fn with_close(afternoon_close: NaiveTime) -> Self {
        Self {
            afternoon_close,
            ..Self::default()
        }
    }

    /// `true` iff `at` falls in `[morning_open, morning_close)` or
    /// `[afternoon_open, afternoon_close)`.
    #[must_use]
    pub fn contains(&self, at: Timestamp) -> bool {
        let t = at.time();
        (self.morning_open <= t && t < self.morning_close)
            || (self.afternoon_open <= t && t < self.afternoon_close)
    }
}

impl Default for TradingSessions {
    fn default() -> Self {
        let hm = |h, m| NaiveTime::from_hms_opt(h, m, 0).unwrap_or(NaiveTime::MIN);
        Self {
            morning_open: hm(9, 0),
            morning_close: hm(11, 30),
            afternoon_open: hm(12, 30),
            afternoon_close: hm(15, 30),
        }
    }
}
