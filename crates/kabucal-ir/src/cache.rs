//! Persistent TTL cache of IR discovery results.
//!
//! The backing store is one pretty-printed JSON object keyed by company
//! code. Operators may edit it by hand between runs, so loading is
//! forgiving: a malformed document loads as empty and a malformed entry is
//! skipped on its own.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use kabucal_core::{CacheEntry, Clock, CompanyCode, IrPageInfo, Timestamp};
use serde_json::Value;

use crate::error::CacheError;

/// Thread-safe handle to the discovery cache document.
///
/// Reads share the lock; every mutation takes it exclusively and rewrites
/// the document before releasing it.
pub struct DiscoveryCache {
    path: PathBuf,
    ttl_days: u32,
    clock: Arc<dyn Clock>,
    entries: RwLock<BTreeMap<CompanyCode, CacheEntry>>,
}

impl std::fmt::Debug for DiscoveryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscoveryCache")
            .field("path", &self.path)
            .field("ttl_days", &self.ttl_days)
            .finish_non_exhaustive()
    }
}

impl DiscoveryCache {
    /// Opens the cache at `path`. A missing, unreadable or corrupt document
    /// yields an empty cache; the next successful write repairs it.
    pub fn open(path: impl Into<PathBuf>, ttl_days: u32, clock: Arc<dyn Clock>) -> Self {
        let path = path.into();
        let entries = load_document(&path);
        tracing::debug!(path = %path.display(), entries = entries.len(), "discovery cache opened");
        Self {
            path,
            ttl_days,
            clock,
            entries: RwLock::new(entries),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn ttl_days(&self) -> u32 {
        self.ttl_days
    }

    /// Non-expired entry for `code`.
    #[must_use]
    pub fn get(&self, code: &CompanyCode) -> Option<CacheEntry> {
        self.get_with(code, false)
    }

    /// Entry for `code`; expired entries are returned only when
    /// `ignore_expiry` is set.
    #[must_use]
    pub fn get_with(&self, code: &CompanyCode, ignore_expiry: bool) -> Option<CacheEntry> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let entry = entries.get(code)?;
        if !ignore_expiry && self.is_expired(entry) {
            return None;
        }
        Some(entry.clone())
    }

    #[must_use]
    pub fn is_expired(&self, entry: &CacheEntry) -> bool {
        entry.is_expired(self.clock.now(), self.ttl_days)
    }

    /// Stores `entry` under `code` and persists the document.
    ///
    /// `last_updated` never moves backwards: an entry older than the one it
    /// replaces inherits the newer timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the document cannot be written. The
    /// in-memory entry is kept regardless.
    pub fn set(&self, code: &CompanyCode, mut entry: CacheEntry) -> Result<(), CacheError> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = entries.get(code) {
            entry.last_updated = entry.last_updated.max(previous.last_updated);
        }
        entries.insert(code.clone(), entry);
        write_document(&self.path, &entries)
    }

    /// Builds and stores the entry for a successful discovery and parse.
    /// The success count grows while the URL stays the same and restarts
    /// at 1 when it changes.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the document cannot be written.
    pub fn record_success(
        &self,
        code: &CompanyCode,
        page: &IrPageInfo,
        datetime: Option<Timestamp>,
    ) -> Result<CacheEntry, CacheError> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let now = self.clock.now();

        let entry = match entries.get(code) {
            Some(previous) if previous.ir_url == page.url => CacheEntry {
                ir_url: page.url.clone(),
                ir_type: page.page_type,
                last_known_datetime: datetime.or(previous.last_known_datetime),
                discovered_via: page.discovered_via,
                last_updated: now.max(previous.last_updated),
                success_count: previous.success_count.saturating_add(1),
            },
            previous => CacheEntry {
                ir_url: page.url.clone(),
                ir_type: page.page_type,
                last_known_datetime: datetime,
                discovered_via: page.discovered_via,
                last_updated: previous.map_or(now, |p| now.max(p.last_updated)),
                success_count: 1,
            },
        };

        entries.insert(code.clone(), entry.clone());
        write_document(&self.path, &entries)?;
        Ok(entry)
    }

    /// Removes the entry for `code`. Returns whether one existed.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the document cannot be written.
    pub fn delete(&self, code: &CompanyCode) -> Result<bool, CacheError> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if entries.remove(code).is_none() {
            return Ok(false);
        }
        write_document(&self.path, &entries)?;
        Ok(true)
    }

    /// # Errors
    ///
    /// Returns [`CacheError`] if the document cannot be written.
    pub fn clear(&self) -> Result<(), CacheError> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.clear();
        write_document(&self.path, &entries)
    }

    /// Every entry, expired or not, ordered by code.
    #[must_use]
    pub fn list_all(&self) -> Vec<(CompanyCode, CacheEntry)> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(code, entry)| (code.clone(), entry.clone()))
            .collect()
    }
}

fn load_document(path: &Path) -> BTreeMap<CompanyCode, CacheEntry> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return BTreeMap::new(),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "cache document unreadable, starting empty");
            return BTreeMap::new();
        }
    };

    if raw.trim().is_empty() {
        return BTreeMap::new();
    }

    let document: serde_json::Map<String, Value> = match serde_json::from_str(&raw) {
        Ok(document) => document,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "cache document corrupt, starting empty");
            return BTreeMap::new();
        }
    };

    let mut entries = BTreeMap::new();
    for (key, value) in document {
        let Ok(code) = CompanyCode::parse(&key) else {
            tracing::warn!(code = %key, "skipping cache entry with invalid code");
            continue;
        };
        match serde_json::from_value::<CacheEntry>(value) {
            Ok(entry) => {
                entries.insert(code, entry);
            }
            Err(e) => {
                tracing::warn!(code = %key, error = %e, "skipping malformed cache entry");
            }
        }
    }
    entries
}

/// Writes to a sibling temp file and renames it over the document so a
/// crash never leaves a half-written cache.
fn write_document(
    path: &Path,
    entries: &BTreeMap<CompanyCode, CacheEntry>,
) -> Result<(), CacheError> {
    let io_err = |source: std::io::Error| CacheError::Io {
        path: path.display().to_string(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }

    let mut body = serde_json::to_string_pretty(entries)?;
    body.push('\n');

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    std::fs::write(&tmp, body).map_err(io_err)?;
    std::fs::rename(&tmp, path).map_err(io_err)?;
    Ok(())
}

#[cfg(test)]
#[path = "cache_test.rs"]
mod tests;
