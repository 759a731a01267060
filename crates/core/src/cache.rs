//! Per-publisher selector cache.
//!
//! The cache maps a normalized publisher domain to the selector set that has
//! worked for it, either taught by an operator or learned by the parser after
//! a validated discovery. It is an explicit object: construct one per process
//! (or per test) and share it with parsers through an `Arc`.
//!
//! Every domain has its own lock, so updates to one publisher never wait on
//! another; the outer map lock is only taken for writing when a domain is seen
//! for the first time. Callers always receive copies, never references into
//! the cache.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::field::FieldKind;
use crate::{GleanerError, Result};

/// Consecutive failures after which a cached selector is evicted.
pub const DEFAULT_INVALIDATE_AFTER: u32 = 3;

/// One winning selector per field kind, possibly partial.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SelectorSet {
    selectors: BTreeMap<FieldKind, String>,
}

impl SelectorSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, kind: FieldKind, selector: impl Into<String>) -> Self {
        self.insert(kind, selector);
        self
    }

    pub fn insert(&mut self, kind: FieldKind, selector: impl Into<String>) {
        self.selectors.insert(kind, selector.into());
    }

    pub fn get(&self, kind: FieldKind) -> Option<&str> {
        self.selectors.get(&kind).map(String::as_str)
    }

    pub fn remove(&mut self, kind: FieldKind) -> Option<String> {
        self.selectors.remove(&kind)
    }

    pub fn contains(&self, kind: FieldKind) -> bool {
        self.selectors.contains_key(&kind)
    }

    pub fn len(&self) -> usize {
        self.selectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selectors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (FieldKind, &str)> {
        self.selectors.iter().map(|(k, v)| (*k, v.as_str()))
    }

    /// Overlays `other` onto this set; kinds in `other` win.
    pub fn merge(&mut self, other: &SelectorSet) {
        for (kind, selector) in other.iter() {
            self.insert(kind, selector);
        }
    }
}

impl FromIterator<(FieldKind, String)> for SelectorSet {
    fn from_iter<I: IntoIterator<Item = (FieldKind, String)>>(iter: I) -> Self {
        Self { selectors: iter.into_iter().collect() }
    }
}

/// How a cached selector got into the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectorOrigin {
    /// Installed by an operator; discovery never overrides it.
    Taught,
    /// Written back by the parser after a validated discovery.
    Learned,
}

#[derive(Debug, Clone)]
struct CachedSelector {
    selector: String,
    origin: SelectorOrigin,
    failures: u32,
}

#[derive(Debug, Default)]
struct DomainEntry {
    selectors: BTreeMap<FieldKind, CachedSelector>,
}

impl DomainEntry {
    fn put(&mut self, set: &SelectorSet, origin: SelectorOrigin) {
        for (kind, selector) in set.iter() {
            let taught = self.selectors.get(&kind).is_some_and(|c| c.origin == SelectorOrigin::Taught);
            if origin == SelectorOrigin::Learned && taught {
                continue;
            }
            self.selectors.insert(kind, CachedSelector { selector: selector.to_string(), origin, failures: 0 });
        }
    }

    fn snapshot(&self) -> CacheEntry {
        CacheEntry {
            selectors: self.selectors.iter().map(|(k, c)| (*k, c.selector.clone())).collect(),
            origins: self.selectors.iter().map(|(k, c)| (*k, c.origin)).collect(),
        }
    }
}

/// A copy of one domain's cached selectors with their origins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheEntry {
    pub selectors: SelectorSet,
    origins: BTreeMap<FieldKind, SelectorOrigin>,
}

impl CacheEntry {
    pub fn origin(&self, kind: FieldKind) -> Option<SelectorOrigin> {
        self.origins.get(&kind).copied()
    }
}

/// Normalizes a URL or host into a cache key: lowercased host, no leading `www.`.
///
/// # Example
///
/// ```rust
/// use gleaner_core::cache::normalize_domain;
///
/// assert_eq!(normalize_domain("https://WWW.Example.com/news/1"), Some("example.com".to_string()));
/// assert_eq!(normalize_domain("www.example.org"), Some("example.org".to_string()));
/// ```
pub fn normalize_domain(input: &str) -> Option<String> {
    let input = input.trim();
    let host = if input.contains("://") {
        Url::parse(input).ok()?.host_str()?.to_string()
    } else {
        input.split(['/', ':']).next()?.to_string()
    };

    let host = host.to_ascii_lowercase();
    let host = host.trim_end_matches('.');
    let host = host.strip_prefix("www.").unwrap_or(host);

    if host.is_empty() { None } else { Some(host.to_string()) }
}

/// Extracts the cache key from a source URL.
pub fn domain_of(url: &str) -> Result<String> {
    let parsed = Url::parse(url).map_err(|e| GleanerError::InvalidUrl(format!("{}: {}", url, e)))?;
    parsed
        .host_str()
        .and_then(normalize_domain)
        .ok_or_else(|| GleanerError::InvalidUrl(format!("{}: no host", url)))
}

/// Process-wide map from publisher domain to selector set.
#[derive(Debug)]
pub struct SelectorCache {
    entries: RwLock<HashMap<String, Arc<Mutex<DomainEntry>>>>,
    invalidate_after: u32,
}

impl Default for SelectorCache {
    fn default() -> Self {
        Self::new()
    }
}

impl SelectorCache {
    pub fn new() -> Self {
        Self::with_invalidate_after(DEFAULT_INVALIDATE_AFTER)
    }

    /// Creates a cache that evicts a selector after `failures` consecutive failures.
    ///
    /// `0` disables eviction.
    pub fn with_invalidate_after(failures: u32) -> Self {
        Self { entries: RwLock::new(HashMap::new()), invalidate_after: failures }
    }

    fn existing(&self, domain: &str) -> Option<Arc<Mutex<DomainEntry>>> {
        let key = normalize_domain(domain)?;
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(&key).cloned()
    }

    fn slot(&self, domain: &str) -> Option<Arc<Mutex<DomainEntry>>> {
        if let Some(slot) = self.existing(domain) {
            return Some(slot);
        }
        let key = normalize_domain(domain)?;
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        Some(entries.entry(key).or_default().clone())
    }

    /// Copy of the selectors cached for `domain`.
    pub fn get(&self, domain: &str) -> Option<SelectorSet> {
        self.entry(domain).map(|e| e.selectors)
    }

    /// Copy of the selectors and their origins cached for `domain`.
    pub fn entry(&self, domain: &str) -> Option<CacheEntry> {
        let slot = self.existing(domain)?;
        let entry = slot.lock().unwrap_or_else(PoisonError::into_inner);
        Some(entry.snapshot())
    }

    /// Overlays `partial` onto the domain's set, leaving other kinds untouched.
    ///
    /// Learned selectors never overwrite taught ones.
    pub fn merge(&self, domain: &str, partial: &SelectorSet, origin: SelectorOrigin) {
        if partial.is_empty() {
            return;
        }
        let Some(slot) = self.slot(domain) else {
            return;
        };
        let mut entry = slot.lock().unwrap_or_else(PoisonError::into_inner);
        entry.put(partial, origin);
        tracing::debug!(domain, kinds = partial.len(), ?origin, "Merged selectors into cache");
    }

    /// Replaces the domain's whole set.
    pub fn replace(&self, domain: &str, full: &SelectorSet, origin: SelectorOrigin) {
        let Some(slot) = self.slot(domain) else {
            return;
        };
        let mut entry = slot.lock().unwrap_or_else(PoisonError::into_inner);
        entry.selectors.clear();
        entry.put(full, origin);
        tracing::debug!(domain, kinds = full.len(), ?origin, "Replaced cached selectors");
    }

    /// Installs operator-curated selectors for a domain, replacing what was cached.
    pub fn teach(&self, domain: &str, set: &SelectorSet) {
        self.replace(domain, set, SelectorOrigin::Taught);
    }

    /// Resets the failure count of a cached selector that produced a valid value.
    pub fn record_success(&self, domain: &str, kind: FieldKind) {
        let Some(slot) = self.existing(domain) else {
            return;
        };
        let mut entry = slot.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(cached) = entry.selectors.get_mut(&kind) {
            cached.failures = 0;
        }
    }

    /// Counts a missing or invalid value from a cached selector.
    ///
    /// Returns `true` when the selector reached the failure limit and was
    /// evicted, so the next parse rediscovers the kind.
    pub fn record_failure(&self, domain: &str, kind: FieldKind, selector: &str) -> bool {
        let Some(slot) = self.existing(domain) else {
            return false;
        };
        let mut entry = slot.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(cached) = entry.selectors.get_mut(&kind) else {
            return false;
        };
        if cached.selector != selector {
            return false;
        }

        cached.failures += 1;
        if self.invalidate_after > 0 && cached.failures >= self.invalidate_after {
            entry.selectors.remove(&kind);
            tracing::warn!(domain, field = %kind, selector, "Evicted failing selector from cache");
            return true;
        }
        false
    }

    /// Drops everything cached for a domain.
    pub fn remove(&self, domain: &str) -> Option<SelectorSet> {
        let key = normalize_domain(domain)?;
        let removed = self.entries.write().unwrap_or_else(PoisonError::into_inner).remove(&key)?;
        let entry = removed.lock().unwrap_or_else(PoisonError::into_inner);
        Some(entry.snapshot().selectors)
    }

    /// Drops every entry.
    pub fn clear(&self) {
        self.entries.write().unwrap_or_else(PoisonError::into_inner).clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copies of every non-empty entry, sorted by domain.
    pub fn snapshot(&self) -> Vec<(String, SelectorSet)> {
        let slots: Vec<(String, Arc<Mutex<DomainEntry>>)> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let mut out: Vec<(String, SelectorSet)> = slots
            .into_iter()
            .map(|(domain, slot)| {
                let set = slot.lock().unwrap_or_else(PoisonError::into_inner).snapshot().selectors;
                (domain, set)
            })
            .filter(|(_, set)| !set.is_empty())
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }
}
