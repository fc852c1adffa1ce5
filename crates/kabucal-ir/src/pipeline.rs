//! Cache-first IR lookup: discover the page, parse it for the target date
//! and record the success.

use std::sync::Arc;

use chrono::NaiveDate;
use kabucal_core::{CompanyCode, IrPageInfo, PageType, ParseConfidence, Timestamp};

use crate::cache::DiscoveryCache;
use crate::discovery::IrDiscovery;
use crate::fetch::PageFetcher;
use crate::parser::IrParser;
use crate::urls::classify_page_type;

/// IR signal for one company on one target date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrDatetime {
    pub datetime: Timestamp,
    pub page: IrPageInfo,
    /// `None` when the datetime was reused from the cache without fetching.
    pub parse_confidence: Option<ParseConfidence>,
}

/// Cache-first discovery followed by parsing. A successful parse is
/// written back to the cache.
#[derive(Clone)]
pub struct IrLookup {
    cache: Option<Arc<DiscoveryCache>>,
    discovery: IrDiscovery,
    parser: IrParser,
}

impl IrLookup {
    #[must_use]
    pub fn new(cache: Option<Arc<DiscoveryCache>>, discovery: IrDiscovery, parser: IrParser) -> Self {
        Self {
            cache,
            discovery,
            parser,
        }
    }

    pub async fn lookup(
        &self,
        fetcher: &PageFetcher,
        code: &CompanyCode,
        target: NaiveDate,
        bypass_cache: bool,
    ) -> Option<IrDatetime> {
        if let Some(hit) = self.cached_datetime(code, target, bypass_cache) {
            tracing::debug!(code = %code, datetime = %hit.datetime, "reusing cached IR datetime");
            return Some(hit);
        }

        let mut page = self.discovery.discover(fetcher, code, bypass_cache).await?;
        let html = match fetcher.fetch_text(&page.url).await {
            Ok(html) => html,
            Err(e) => {
                tracing::debug!(code = %code, url = %page.url, error = %e, "IR page fetch failed");
                return None;
            }
        };
        if page.page_type == PageType::Unknown {
            page.page_type = classify_page_type(&page.url, Some(&html));
        }

        let info = self.parser.parse_html(&html, code, Some(target)).await?;
        let datetime = info.datetime?;
        if datetime.date() < target {
            tracing::debug!(code = %code, datetime = %datetime, "IR datetime predates target, ignoring");
            return None;
        }

        if let Some(cache) = &self.cache {
            if let Err(e) = cache.record_success(code, &page, Some(datetime)) {
                tracing::warn!(code = %code, error = %e, "failed to persist IR cache entry");
            }
        }

        Some(IrDatetime {
            datetime,
            page,
            parse_confidence: Some(info.confidence),
        })
    }

    fn cached_datetime(
        &self,
        code: &CompanyCode,
        target: NaiveDate,
        bypass_cache: bool,
    ) -> Option<IrDatetime> {
        if bypass_cache {
            return None;
        }
        let entry = self.cache.as_ref()?.get(code)?;
        let datetime = entry.last_known_datetime.filter(|dt| dt.date() == target)?;
        Some(IrDatetime {
            datetime,
            page: IrPageInfo {
                url: entry.ir_url,
                page_type: entry.ir_type,
                discovered_via: entry.discovered_via,
            },
            parse_confidence: None,
        })
    }
}
