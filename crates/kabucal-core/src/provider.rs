//! Boundary to the external historical-data provider.

use async_trait::async_trait;

use crate::code::CompanyCode;
use crate::types::Timestamp;

/// Company profile and announcement history, supplied by an external
/// service. Implementations swallow their own failures: a lookup that
/// cannot be answered yields `None` or an empty list.
#[async_trait]
pub trait CompanyDataProvider: Send + Sync {
    /// Root URL of the company's corporate website.
    async fn website(&self, code: &CompanyCode) -> Option<String>;

    /// Up to `limit` past earnings announcement datetimes, most recent first.
    async fn past_announcements(&self, code: &CompanyCode, limit: usize) -> Vec<Timestamp>;
}

/// Provider used when none is configured: no website, no history.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProvider;

#[async_trait]
impl CompanyDataProvider for NoProvider {
    async fn website(&self, _code: &CompanyCode) -> Option<String> {
        None
    }

    async fn past_announcements(&self, _code: &CompanyCode, _limit: usize) -> Vec<Timestamp> {
        Vec::new()
    }
}
