//! IR page discovery cascade.
//!
//! Modeled as an explicit state machine so each transition can be driven
//! and tested on its own:
//!
//! ```text
//! CacheCheck -> PatternMatch -> HomepageSearch -> LlmFallback -> NotFound
//!      \              \                \                \
//!       `--------------`----------------`----------------`--> Found
//! ```
//!
//! Every stage failure is non-fatal and advances to the next stage.

use std::sync::Arc;

use kabucal_core::{CacheEntry, CompanyCode, CompanyDataProvider, DiscoveredVia, IrPageInfo};

use crate::cache::DiscoveryCache;
use crate::fetch::PageFetcher;
use crate::html::{extract_anchors, Anchor};
use crate::llm::LlmCapability;
use crate::urls::{candidate_urls, classify_page_type, normalize_base_url, resolve_url};

const IR_LINK_KEYWORDS: [&str; 16] = [
    "investor relations",
    "investors",
    "ir information",
    "ir情報",
    "ir・投資家情報",
    "投資家情報",
    "投資家の皆様",
    "株主・投資家",
    "株主・投資家の皆様",
    "決算情報",
    "決算発表",
    "決算短信",
    "決算カレンダー",
    "irカレンダー",
    "irライブラリ",
    "financial results",
];

const IR_HREF_TOKENS: [&str; 4] = ["/ir/", "/investor", "/ir.html", "/ir_"];

const LLM_LINK_DESCRIPTION: &str =
    "investor relations (IR) page or earnings announcement calendar (IR情報 / 決算発表)";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryState {
    CacheCheck,
    PatternMatch,
    HomepageSearch,
    LlmFallback,
    Found(IrPageInfo),
    NotFound,
}

impl DiscoveryState {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, DiscoveryState::Found(_) | DiscoveryState::NotFound)
    }
}

/// Per-invocation scratch state carried between cascade stages.
#[derive(Debug, Clone)]
pub struct DiscoveryRun {
    pub code: CompanyCode,
    pub bypass_cache: bool,
    /// Cached entry that was skipped (bypass) or expired. Its URL is
    /// probed first during pattern matching.
    stale: Option<CacheEntry>,
    website: Option<String>,
    website_looked_up: bool,
    homepage_html: Option<String>,
}

impl DiscoveryRun {
    #[must_use]
    pub fn new(code: CompanyCode, bypass_cache: bool) -> Self {
        Self {
            code,
            bypass_cache,
            stale: None,
            website: None,
            website_looked_up: false,
            homepage_html: None,
        }
    }
}

/// Cheapest-first search for a company's IR page.
#[derive(Clone)]
pub struct IrDiscovery {
    cache: Option<Arc<DiscoveryCache>>,
    provider: Arc<dyn CompanyDataProvider>,
    llm: Option<Arc<dyn LlmCapability>>,
}

impl IrDiscovery {
    #[must_use]
    pub fn new(
        cache: Option<Arc<DiscoveryCache>>,
        provider: Arc<dyn CompanyDataProvider>,
        llm: Option<Arc<dyn LlmCapability>>,
    ) -> Self {
        Self {
            cache,
            provider,
            llm,
        }
    }

    /// Runs the cascade to completion for `code`.
    pub async fn discover(
        &self,
        fetcher: &PageFetcher,
        code: &CompanyCode,
        bypass_cache: bool,
    ) -> Option<IrPageInfo> {
        let mut run = DiscoveryRun::new(code.clone(), bypass_cache);
        let mut state = DiscoveryState::CacheCheck;
        while !state.is_terminal() {
            state = self.step(fetcher, &mut run, state).await;
        }

        match state {
            DiscoveryState::Found(page) => {
                tracing::debug!(
                    code = %code,
                    url = %page.url,
                    via = %page.discovered_via,
                    page_type = %page.page_type,
                    "IR page discovered"
                );
                Some(page)
            }
            _ => {
                tracing::debug!(code = %code, "IR page not found");
                None
            }
        }
    }

    /// Performs one transition from `state`. Terminal states map to
    /// themselves.
    pub async fn step(
        &self,
        fetcher: &PageFetcher,
        run: &mut DiscoveryRun,
        state: DiscoveryState,
    ) -> DiscoveryState {
        match state {
            DiscoveryState::CacheCheck => self.check_cache(run),
            DiscoveryState::PatternMatch => self.match_patterns(fetcher, run).await,
            DiscoveryState::HomepageSearch => self.search_homepage(fetcher, run).await,
            DiscoveryState::LlmFallback => self.ask_llm(fetcher, run).await,
            terminal @ (DiscoveryState::Found(_) | DiscoveryState::NotFound) => terminal,
        }
    }

    fn check_cache(&self, run: &mut DiscoveryRun) -> DiscoveryState {
        let Some(cache) = &self.cache else {
            return DiscoveryState::PatternMatch;
        };

        if !run.bypass_cache {
            if let Some(entry) = cache.get(&run.code) {
                return DiscoveryState::Found(page_from_entry(&entry));
            }
        }

        run.stale = cache.get_with(&run.code, true);
        DiscoveryState::PatternMatch
    }

    async fn match_patterns(&self, fetcher: &PageFetcher, run: &mut DiscoveryRun) -> DiscoveryState {
        let website = self.website(run).await;
        let stale_url = run.stale.as_ref().map(|e| e.ir_url.clone());

        let candidates = match (&website, &stale_url) {
            (Some(site), stale) => candidate_urls(site, stale.as_deref()),
            (None, Some(stale)) => vec![stale.clone()],
            (None, None) => Vec::new(),
        };

        for candidate in candidates {
            let Some(final_url) = fetcher.probe(&candidate).await else {
                continue;
            };

            if let Some(stale) = run.stale.as_ref().filter(|e| e.ir_url == candidate) {
                return DiscoveryState::Found(IrPageInfo {
                    url: final_url,
                    page_type: stale.ir_type,
                    discovered_via: stale.discovered_via,
                });
            }

            return DiscoveryState::Found(IrPageInfo {
                page_type: classify_page_type(&final_url, None),
                url: final_url,
                discovered_via: DiscoveredVia::Pattern,
            });
        }

        DiscoveryState::HomepageSearch
    }

    async fn search_homepage(&self, fetcher: &PageFetcher, run: &mut DiscoveryRun) -> DiscoveryState {
        let Some(website) = self.website(run).await else {
            return DiscoveryState::LlmFallback;
        };
        if normalize_base_url(&website).is_none() {
            return DiscoveryState::LlmFallback;
        }

        let homepage = if website.starts_with("http://") || website.starts_with("https://") {
            website.clone()
        } else {
            format!("https://{website}")
        };

        let html = match fetcher.fetch_text(&homepage).await {
            Ok(html) => html,
            Err(e) => {
                tracing::debug!(code = %run.code, url = %homepage, error = %e, "homepage fetch failed");
                return DiscoveryState::LlmFallback;
            }
        };

        let anchors = extract_anchors(&html, &homepage);
        run.homepage_html = Some(html);

        for link in ir_link_candidates(&anchors) {
            if let Some(final_url) = fetcher.probe(&link).await {
                return DiscoveryState::Found(IrPageInfo {
                    page_type: classify_page_type(&final_url, None),
                    url: final_url,
                    discovered_via: DiscoveredVia::HomepageSearch,
                });
            }
        }

        DiscoveryState::LlmFallback
    }

    async fn ask_llm(&self, fetcher: &PageFetcher, run: &mut DiscoveryRun) -> DiscoveryState {
        let Some(llm) = &self.llm else {
            return DiscoveryState::NotFound;
        };
        let Some(website) = self.website(run).await else {
            return DiscoveryState::NotFound;
        };
        let Some(base) = normalize_base_url(&website) else {
            return DiscoveryState::NotFound;
        };

        if run.homepage_html.is_none() {
            match fetcher.fetch_text(&base).await {
                Ok(html) => run.homepage_html = Some(html),
                Err(e) => {
                    tracing::debug!(code = %run.code, url = %base, error = %e, "homepage fetch failed");
                    return DiscoveryState::NotFound;
                }
            }
        }
        let Some(html) = run.homepage_html.as_deref() else {
            return DiscoveryState::NotFound;
        };

        let Some(raw) = llm.find_link(html, LLM_LINK_DESCRIPTION).await else {
            return DiscoveryState::NotFound;
        };
        let Some(url) = resolve_url(&raw, &base) else {
            tracing::debug!(code = %run.code, answer = %raw, "LLM link could not be resolved");
            return DiscoveryState::NotFound;
        };

        DiscoveryState::Found(IrPageInfo {
            page_type: classify_page_type(&url, None),
            url,
            discovered_via: DiscoveredVia::Llm,
        })
    }

    /// Website root from the provider, looked up at most once per run.
    async fn website(&self, run: &mut DiscoveryRun) -> Option<String> {
        if !run.website_looked_up {
            run.website = self
                .provider
                .website(&run.code)
                .await
                .filter(|s| !s.trim().is_empty());
            run.website_looked_up = true;
        }
        run.website.clone()
    }
}

fn page_from_entry(entry: &CacheEntry) -> IrPageInfo {
    IrPageInfo {
        url: entry.ir_url.clone(),
        page_type: entry.ir_type,
        discovered_via: entry.discovered_via,
    }
}

/// Links whose text names an IR section, then links whose URL looks like
/// one. Order follows the page.
fn ir_link_candidates(anchors: &[Anchor]) -> Vec<String> {
    let mut links: Vec<String> = Vec::new();

    let by_text = anchors.iter().filter(|a| {
        let text = a.text.to_lowercase();
        IR_LINK_KEYWORDS.iter().any(|kw| text.contains(kw))
    });
    let by_href = anchors.iter().filter(|a| {
        let url = a.url.to_lowercase();
        IR_HREF_TOKENS.iter().any(|t| url.contains(t))
    });

    for anchor in by_text.chain(by_href) {
        if !links.contains(&anchor.url) {
            links.push(anchor.url.clone());
        }
    }
    links
}
