//! `cache` subcommand handlers. These operate on the discovery cache
//! document directly and never touch the network.

use std::sync::Arc;

use clap::Subcommand;
use kabucal_core::{AppConfig, CacheEntry, CompanyCode, SystemClock};
use kabucal_ir::DiscoveryCache;
use serde::Serialize;

#[derive(Debug, Subcommand)]
pub enum CacheCommands {
    /// Print every cached entry with its expiry state
    List,
    /// Remove one company's entry
    Delete {
        /// 4-character company code
        code: String,
    },
    /// Remove every entry
    Clear,
}

#[derive(Debug, Serialize)]
struct ListedEntry {
    code: CompanyCode,
    expired: bool,
    #[serde(flatten)]
    entry: CacheEntry,
}

pub(crate) fn run(config: &AppConfig, command: &CacheCommands) -> anyhow::Result<()> {
    let cache = DiscoveryCache::open(
        config.cache_path.clone(),
        config.cache_ttl_days,
        Arc::new(SystemClock),
    );

    match command {
        CacheCommands::List => {
            let listed: Vec<ListedEntry> = cache
                .list_all()
                .into_iter()
                .map(|(code, entry)| ListedEntry {
                    expired: cache.is_expired(&entry),
                    code,
                    entry,
                })
                .collect();
            super::print_json(&listed)?;
        }
        CacheCommands::Delete { code } => {
            let code = CompanyCode::parse(code)?;
            if cache.delete(&code)? {
                tracing::info!(code = %code, "cache entry deleted");
            } else {
                tracing::info!(code = %code, "no cache entry to delete");
            }
        }
        CacheCommands::Clear => {
            let count = cache.list_all().len();
            cache.clear()?;
            tracing::info!(count, path = %cache.path().display(), "cache cleared");
        }
    }

    Ok(())
}
