//! The adaptive parser.
//!
//! [`AdaptiveParser`] turns an HTML document into a record of the requested
//! [`TargetShape`]. For every field the shape reads it resolves a selector,
//! in order:
//!
//! 1. the publisher's cached selector (taught by an operator or learned earlier),
//! 2. candidates from [`SelectorDiscovery`], strongest first,
//! 3. built-in generic selectors.
//!
//! Each extracted value is scored by the [`ContentValidator`]. When every
//! required field is valid the record is assembled and tagged
//! [`Provenance::Structural`]. Otherwise [`AdaptiveParser::parse_with_fallback`]
//! asks the configured [`FallbackExtractor`] for each missing field
//! concurrently and tags the record [`Provenance::Fallback`].
//!
//! Selectors that were discovered and validated during a call are merged into
//! the cache only once the call completes, so a cancelled fallback call leaves
//! the cache untouched.
//!
//! # Example
//!
//! ```rust
//! use gleaner_core::{AdaptiveParser, ArticleRecord, Provenance};
//!
//! let html = r#"<html><body><article>
//!     <h1>Harbor reopens after storm repairs</h1>
//!     <p>The harbor reopened on Monday after three weeks of repairs to the breakwater.
//!     Fishing crews returned to their moorings before dawn, and the ferry resumed its
//!     regular schedule by noon.</p>
//! </article></body></html>"#;
//!
//! let parser = AdaptiveParser::new();
//! let outcome = parser.parse::<ArticleRecord>(html, "https://coastnews.example/harbor");
//! assert_eq!(outcome.provenance(), Some(Provenance::Structural));
//! ```

use std::fmt;
use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use url::Url;

use crate::cache::{SelectorCache, SelectorOrigin, SelectorSet, domain_of};
use crate::discovery::{DiscoveryConfig, SelectorCandidate, SelectorDiscovery, default_selectors};
use crate::error::BoxError;
use crate::fallback::FallbackExtractor;
use crate::fetch::HtmlSource;
use crate::field::FieldKind;
use crate::parse::Document;
use crate::shape::{FieldValues, TargetShape, ensure_supported, read_field};
use crate::validator::{ContentValidator, ValidationVerdict, ValidatorConfig};
use crate::{GleanerError, Result};

/// Configuration for the adaptive parser.
///
/// # Example
///
/// ```rust
/// use gleaner_core::ParserConfig;
///
/// let config = ParserConfig::builder()
///     .max_candidates(5)
///     .escalate_optional(true)
///     .invalidate_after(2)
///     .build();
/// assert_eq!(config.max_candidates, 5);
/// ```
#[derive(Debug, Clone)]
pub struct ParserConfig {
    /// Discovery candidates tried per field before moving on (default: 3).
    pub max_candidates: usize,

    /// Whether missing optional fields go to the fallback even when every required
    /// field was found structurally (default: false). When a required field is
    /// missing, missing optional fields are always requested.
    pub escalate_optional: bool,

    /// Consecutive failures after which a cached selector is evicted (default: 3, 0 disables).
    pub invalidate_after: u32,

    /// Whether the built-in generic selectors are tried last (default: true).
    pub use_defaults: bool,

    pub discovery: DiscoveryConfig,

    pub validator: ValidatorConfig,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            max_candidates: 3,
            escalate_optional: false,
            invalidate_after: crate::cache::DEFAULT_INVALIDATE_AFTER,
            use_defaults: true,
            discovery: DiscoveryConfig::default(),
            validator: ValidatorConfig::default(),
        }
    }
}

impl ParserConfig {
    pub fn builder() -> ParserConfigBuilder {
        ParserConfigBuilder::new()
    }
}

/// Builder for ParserConfig.
pub struct ParserConfigBuilder {
    config: ParserConfig,
}

impl ParserConfigBuilder {
    pub fn new() -> Self {
        Self { config: ParserConfig::default() }
    }

    /// Sets the number of discovery candidates tried per field.
    pub fn max_candidates(mut self, value: usize) -> Self {
        self.config.max_candidates = value;
        self
    }

    /// Sets whether missing optional fields go to the fallback.
    pub fn escalate_optional(mut self, value: bool) -> Self {
        self.config.escalate_optional = value;
        self
    }

    /// Sets the failure count that evicts a cached selector.
    pub fn invalidate_after(mut self, value: u32) -> Self {
        self.config.invalidate_after = value;
        self
    }

    /// Sets whether built-in generic selectors are used.
    pub fn use_defaults(mut self, value: bool) -> Self {
        self.config.use_defaults = value;
        self
    }

    pub fn discovery(mut self, value: DiscoveryConfig) -> Self {
        self.config.discovery = value;
        self
    }

    pub fn validator(mut self, value: ValidatorConfig) -> Self {
        self.config.validator = value;
        self
    }

    pub fn build(self) -> ParserConfig {
        self.config
    }
}

impl Default for ParserConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Which path produced a successful record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    /// Every value came from selectors.
    Structural,
    /// At least one value came from the fallback extractor.
    Fallback,
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provenance::Structural => f.write_str("structural"),
            Provenance::Fallback => f.write_str("fallback"),
        }
    }
}

/// Result of one parse call.
#[derive(Debug)]
pub enum ExtractionOutcome<T> {
    Success { value: T, source: Provenance },
    Failure(GleanerError),
}

impl<T> ExtractionOutcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, ExtractionOutcome::Success { .. })
    }

    pub fn provenance(&self) -> Option<Provenance> {
        match self {
            ExtractionOutcome::Success { source, .. } => Some(*source),
            ExtractionOutcome::Failure(_) => None,
        }
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            ExtractionOutcome::Success { value, .. } => Some(value),
            ExtractionOutcome::Failure(_) => None,
        }
    }

    pub fn error(&self) -> Option<&GleanerError> {
        match self {
            ExtractionOutcome::Success { .. } => None,
            ExtractionOutcome::Failure(err) => Some(err),
        }
    }

    pub fn into_result(self) -> Result<(T, Provenance)> {
        match self {
            ExtractionOutcome::Success { value, source } => Ok((value, source)),
            ExtractionOutcome::Failure(err) => Err(err),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ExtractionOutcome<U> {
        match self {
            ExtractionOutcome::Success { value, source } => ExtractionOutcome::Success { value: f(value), source },
            ExtractionOutcome::Failure(err) => ExtractionOutcome::Failure(err),
        }
    }
}

/// State gathered by the structural pass. Owns no DOM, so it can live across awaits.
#[derive(Debug, Default)]
struct StructuralPass {
    domain: Option<String>,
    base_url: Option<Url>,
    /// Valid values only.
    values: FieldValues,
    /// Kinds without a valid value, in declaration order.
    missing: Vec<FieldKind>,
    /// Discovered selectors that validated in this call.
    learned: SelectorSet,
    /// Cached selectors that produced valid values.
    hits: Vec<FieldKind>,
    /// Cached selectors that produced nothing usable.
    misses: Vec<(FieldKind, String)>,
}

impl StructuralPass {
    fn first_missing_required<T: TargetShape>(&self) -> Option<FieldKind> {
        T::required_fields().iter().copied().find(|kind| !self.values.contains(*kind))
    }
}

/// Orchestrates selector resolution, validation, fallback and learning.
#[derive(Clone)]
pub struct AdaptiveParser {
    cache: Arc<SelectorCache>,
    discovery: SelectorDiscovery,
    validator: ContentValidator,
    fallback: Option<Arc<dyn FallbackExtractor>>,
    config: ParserConfig,
}

impl fmt::Debug for AdaptiveParser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdaptiveParser")
            .field("cache", &self.cache)
            .field("config", &self.config)
            .field("fallback", &self.fallback.is_some())
            .finish_non_exhaustive()
    }
}

impl Default for AdaptiveParser {
    fn default() -> Self {
        Self::new()
    }
}

impl AdaptiveParser {
    /// Creates a parser with default settings, its own cache and no fallback.
    pub fn new() -> Self {
        Self::with_config(ParserConfig::default())
    }

    /// Creates a parser with the given configuration and its own cache.
    pub fn with_config(config: ParserConfig) -> Self {
        Self {
            cache: Arc::new(SelectorCache::with_invalidate_after(config.invalidate_after)),
            discovery: SelectorDiscovery::with_config(config.discovery.clone()),
            validator: ContentValidator::with_config(config.validator.clone()),
            fallback: None,
            config,
        }
    }

    /// Shares an existing cache; its own eviction limit applies.
    pub fn with_cache(mut self, cache: Arc<SelectorCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Sets the extractor used by [`parse_with_fallback`](Self::parse_with_fallback).
    pub fn with_fallback(mut self, extractor: Arc<dyn FallbackExtractor>) -> Self {
        self.fallback = Some(extractor);
        self
    }

    pub fn cache(&self) -> &Arc<SelectorCache> {
        &self.cache
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    /// Installs operator selectors for a domain. Discovery never overrides
    /// the kinds `set` covers until they are evicted for failing.
    pub fn teach(&self, domain: &str, set: &SelectorSet) {
        tracing::info!(domain, kinds = set.len(), "Teaching selectors");
        self.cache.teach(domain, set);
    }

    /// Proposes selectors for `kind` in `doc`, strongest first.
    pub fn discover(&self, doc: &Document, kind: FieldKind) -> Vec<SelectorCandidate> {
        self.discovery.discover(doc, kind)
    }

    /// Scores `text` as a value for `kind`.
    pub fn validate(&self, text: &str, kind: FieldKind) -> ValidationVerdict {
        self.validator.validate(text, kind)
    }

    /// Structural extraction only; never contacts the fallback.
    pub fn parse<T: TargetShape>(&self, html: &str, source_url: &str) -> ExtractionOutcome<T> {
        let mut pass = match self.structural_pass::<T>(html, source_url) {
            Ok(pass) => pass,
            Err(err) => return self.finish(source_url, ExtractionOutcome::Failure(err)),
        };

        let outcome = match pass.first_missing_required::<T>() {
            Some(kind) => ExtractionOutcome::Failure(GleanerError::MissingRequiredField(kind)),
            None => match assemble_lenient::<T>(&mut pass.values) {
                Ok(value) => ExtractionOutcome::Success { value, source: Provenance::Structural },
                Err(err) => ExtractionOutcome::Failure(err),
            },
        };

        self.commit(&pass);
        self.finish(source_url, outcome)
    }

    /// Structural extraction, then one fallback request per missing field.
    ///
    /// Fallback values are not re-validated, and a valid structural value is
    /// never replaced. A failed fallback request leaves its field missing.
    pub async fn parse_with_fallback<T: TargetShape>(&self, html: &str, source_url: &str) -> ExtractionOutcome<T> {
        let mut pass = match self.structural_pass::<T>(html, source_url) {
            Ok(pass) => pass,
            Err(err) => return self.finish(source_url, ExtractionOutcome::Failure(err)),
        };

        // Once a required kind forces the fallback, every missing kind rides along.
        let needs_fallback = pass.first_missing_required::<T>().is_some() || self.config.escalate_optional;
        let mut wanted: Vec<FieldKind> = if needs_fallback { pass.missing.clone() } else { Vec::new() };

        if wanted.is_empty() {
            match assemble_lenient::<T>(&mut pass.values) {
                Ok(value) => {
                    self.commit(&pass);
                    return self.finish(source_url, ExtractionOutcome::Success { value, source: Provenance::Structural });
                }
                Err(GleanerError::InvalidFieldValue { kind, reason }) => {
                    tracing::debug!(field = %kind, reason = %reason, "Structural value rejected by assembly");
                    pass.values.remove(kind);
                    wanted.push(kind);
                    wanted.extend(pass.missing.iter().copied().filter(|k| *k != kind));
                }
                Err(err) => {
                    self.commit(&pass);
                    return self.finish(source_url, ExtractionOutcome::Failure(err));
                }
            }
        }

        let filled = self.run_fallback(html, pass.base_url.as_ref(), &wanted).await;
        let used_fallback = !filled.is_empty();
        for (kind, value) in filled {
            pass.values.insert(kind, value);
        }

        self.commit(&pass);

        let source = if used_fallback { Provenance::Fallback } else { Provenance::Structural };
        let outcome = match pass.first_missing_required::<T>() {
            Some(kind) => ExtractionOutcome::Failure(GleanerError::MissingRequiredField(kind)),
            None => match assemble_lenient::<T>(&mut pass.values) {
                Ok(value) => ExtractionOutcome::Success { value, source },
                Err(err) => ExtractionOutcome::Failure(err),
            },
        };
        self.finish(source_url, outcome)
    }

    /// Fetches `url` from `source` and runs [`parse_with_fallback`](Self::parse_with_fallback).
    pub async fn fetch_and_parse_with_fallback<T: TargetShape>(
        &self, source: &dyn HtmlSource, url: &str,
    ) -> ExtractionOutcome<T> {
        match source.fetch(url).await {
            Ok(html) => self.parse_with_fallback(&html, url).await,
            Err(err) => self.finish(url, ExtractionOutcome::Failure(fetch_error(url, err))),
        }
    }

    fn structural_pass<T: TargetShape>(&self, html: &str, source_url: &str) -> Result<StructuralPass> {
        ensure_supported::<T>()?;

        let base_url = Url::parse(source_url).ok();
        let doc = Document::parse_with_url(html, base_url.clone())?;

        let domain = match domain_of(source_url) {
            Ok(domain) => Some(domain),
            Err(err) => {
                tracing::debug!(error = %err, "No cache domain for source URL");
                None
            }
        };
        let cached = domain.as_deref().and_then(|d| self.cache.entry(d)).unwrap_or_default();

        let mut pass = StructuralPass { domain, base_url, ..StructuralPass::default() };

        // Title first so main content can be compared against it.
        let mut kinds = T::all_fields();
        if let Some(pos) = kinds.iter().position(|k| *k == FieldKind::Title) {
            let title = kinds.remove(pos);
            kinds.insert(0, title);
        }

        for kind in kinds {
            let title = pass.values.optional(FieldKind::Title);
            let cached_selector = cached
                .selectors
                .get(kind)
                .map(|selector| (selector.to_string(), cached.origin(kind).unwrap_or(SelectorOrigin::Learned)));

            match self.resolve_field(&doc, kind, cached_selector, title.as_deref(), &mut pass) {
                Some(value) => pass.values.insert(kind, value),
                None => pass.missing.push(kind),
            }
        }

        // Restore declaration order for the fallback requests.
        let order = T::all_fields();
        pass.missing.sort_by_key(|kind| order.iter().position(|k| k == kind));

        Ok(pass)
    }

    fn resolve_field(
        &self, doc: &Document, kind: FieldKind, cached: Option<(String, SelectorOrigin)>, title: Option<&str>,
        pass: &mut StructuralPass,
    ) -> Option<String> {
        let mut rejected: Option<String> = None;

        if let Some((selector, origin)) = cached {
            if let Some(value) = self.try_selector(doc, &selector, kind, title) {
                tracing::debug!(field = %kind, selector = %selector, ?origin, "Cached selector hit");
                pass.hits.push(kind);
                return Some(value);
            }
            tracing::debug!(field = %kind, selector = %selector, ?origin, "Cached selector missed");
            pass.misses.push((kind, selector.clone()));
            if origin == SelectorOrigin::Taught {
                return None;
            }
            rejected = Some(selector);
        }

        let candidates = self.discovery.discover(doc, kind);
        for candidate in candidates.iter().take(self.config.max_candidates) {
            if rejected.as_deref() == Some(candidate.selector.as_str()) {
                continue;
            }
            if let Some(value) = self.try_selector(doc, &candidate.selector, kind, title) {
                tracing::debug!(
                    field = %kind,
                    selector = %candidate.selector,
                    confidence = candidate.confidence,
                    "Discovered selector validated"
                );
                if pass.domain.is_some() {
                    pass.learned.insert(kind, candidate.selector.clone());
                }
                return Some(value);
            }
        }

        if self.config.use_defaults {
            for selector in default_selectors(kind) {
                if let Some(value) = self.try_selector(doc, selector, kind, title) {
                    tracing::debug!(field = %kind, selector = %selector, "Built-in selector validated");
                    return Some(value);
                }
            }
        }

        tracing::debug!(field = %kind, "No valid structural value");
        None
    }

    fn try_selector(&self, doc: &Document, selector: &str, kind: FieldKind, title: Option<&str>) -> Option<String> {
        let value = read_field(doc, selector, kind)?;
        let verdict = self.validator.validate_with_title(&value, kind, title);
        if verdict.is_valid {
            Some(value)
        } else {
            tracing::trace!(field = %kind, selector, score = verdict.score, reasons = ?verdict.reasons, "Value rejected");
            None
        }
    }

    async fn run_fallback(&self, html: &str, base_url: Option<&Url>, kinds: &[FieldKind]) -> Vec<(FieldKind, String)> {
        if kinds.is_empty() {
            return Vec::new();
        }
        let Some(extractor) = self.fallback.as_deref() else {
            tracing::debug!(fields = kinds.len(), "No fallback extractor configured");
            return Vec::new();
        };

        let requests = kinds.iter().map(|&kind| async move { (kind, extractor.extract(html, kind.description()).await) });
        let results = join_all(requests).await;

        results
            .into_iter()
            .filter_map(|(kind, result)| match result {
                Ok(value) => {
                    let value = value.trim();
                    if value.is_empty() {
                        tracing::warn!(field = %kind, "Fallback returned an empty value");
                        return None;
                    }
                    let value = match base_url {
                        Some(base) if kind.is_url_valued() => resolve_link(base, value),
                        _ => value.to_string(),
                    };
                    tracing::debug!(field = %kind, "Fallback filled field");
                    Some((kind, value))
                }
                Err(source) => {
                    let err = GleanerError::FallbackExtractionFailed { kind, source };
                    tracing::warn!(error = %err, "Fallback extraction failed");
                    None
                }
            })
            .collect()
    }

    /// Applies the call's cache bookkeeping: failure counts, then resets, then learned selectors.
    fn commit(&self, pass: &StructuralPass) {
        let Some(domain) = pass.domain.as_deref() else {
            return;
        };
        for (kind, selector) in &pass.misses {
            self.cache.record_failure(domain, *kind, selector);
        }
        for kind in &pass.hits {
            self.cache.record_success(domain, *kind);
        }
        if !pass.learned.is_empty() {
            tracing::debug!(domain, kinds = pass.learned.len(), "Learning discovered selectors");
            self.cache.merge(domain, &pass.learned, SelectorOrigin::Learned);
        }
    }

    fn finish<T>(&self, source_url: &str, outcome: ExtractionOutcome<T>) -> ExtractionOutcome<T> {
        match &outcome {
            ExtractionOutcome::Success { source, .. } => {
                tracing::info!(url = source_url, provenance = %source, "Extraction succeeded")
            }
            ExtractionOutcome::Failure(err) => tracing::info!(url = source_url, error = %err, "Extraction failed"),
        }
        outcome
    }
}

/// Assembles `T`, dropping optional values the record rejects.
fn assemble_lenient<T: TargetShape>(values: &mut FieldValues) -> Result<T> {
    loop {
        match T::assemble(values) {
            Err(GleanerError::InvalidFieldValue { kind, reason })
                if !T::required_fields().contains(&kind) && values.contains(kind) =>
            {
                tracing::debug!(field = %kind, reason = %reason, "Dropping unusable optional value");
                values.remove(kind);
            }
            other => return other,
        }
    }
}

/// Resolves a relative link against `base`. Absolute URLs and prose pass
/// through unchanged so the record decides whether they are usable.
fn resolve_link(base: &Url, value: &str) -> String {
    if Url::parse(value).is_ok() {
        return value.to_string();
    }
    let relative = ["/", "./", "../"].iter().any(|prefix| value.starts_with(prefix))
        || !value.contains(char::is_whitespace);
    match base.join(value) {
        Ok(url) if relative => url.to_string(),
        _ => value.to_string(),
    }
}

fn fetch_error(url: &str, err: BoxError) -> GleanerError {
    match err.downcast::<GleanerError>() {
        Ok(err) => *err,
        Err(source) => GleanerError::FetchFailed { url: url.to_string(), source },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{ArticleRecord, StoryRecord, VideoRecord};
    use async_trait::async_trait;
    use std::sync::Mutex;

    const BODY: &str = "The harbor reopened on Monday after three weeks of repairs to the breakwater. \
        Fishing crews returned to their moorings before dawn, and the ferry resumed its regular schedule by noon.";

    fn landmark_page(title: &str) -> String {
        format!(
            r#"<html><head><title>Coast News</title></head><body>
            <article><h1>{}</h1><p>{}</p></article>
            </body></html>"#,
            title, BODY
        )
    }

    /// Answers from a fixed table and records what it was asked for.
    struct TableExtractor {
        answers: Vec<(FieldKind, String)>,
        asked: Mutex<Vec<String>>,
    }

    impl TableExtractor {
        fn new(answers: &[(FieldKind, &str)]) -> Self {
            Self { answers: answers.iter().map(|(k, v)| (*k, v.to_string())).collect(), asked: Mutex::new(Vec::new()) }
        }

        fn asked(&self) -> Vec<String> {
            self.asked.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl FallbackExtractor for TableExtractor {
        async fn extract(&self, _html: &str, field_description: &str) -> std::result::Result<String, BoxError> {
            self.asked.lock().unwrap().push(field_description.to_string());
            self.answers
                .iter()
                .find(|(kind, _)| kind.description() == field_description)
                .map(|(_, v)| v.clone())
                .ok_or_else(|| "no answer".into())
        }
    }

    #[test]
    fn test_config_builder() {
        let config = ParserConfig::builder().max_candidates(1).use_defaults(false).invalidate_after(0).build();
        assert_eq!(config.max_candidates, 1);
        assert!(!config.use_defaults);
        assert_eq!(config.invalidate_after, 0);
        assert!(!config.escalate_optional);
    }

    #[test]
    fn test_outcome_helpers() {
        let ok: ExtractionOutcome<u8> = ExtractionOutcome::Success { value: 1, source: Provenance::Fallback };
        assert!(ok.is_success());
        assert_eq!(ok.value(), Some(&1));
        assert_eq!(ok.map(|v| v + 1).into_result().unwrap(), (2, Provenance::Fallback));

        let err: ExtractionOutcome<u8> = ExtractionOutcome::Failure(GleanerError::InvalidHtml("x".into()));
        assert!(err.provenance().is_none());
        assert!(matches!(err.error(), Some(GleanerError::InvalidHtml(_))));
    }

    #[test]
    fn test_landmark_page_parses_structurally_and_learns() {
        let parser = AdaptiveParser::new();
        let outcome = parser.parse::<ArticleRecord>(&landmark_page("Harbor reopens"), "https://coast.example/a");

        let (article, source) = outcome.into_result().unwrap();
        assert_eq!(source, Provenance::Structural);
        assert_eq!(article.title, "Harbor reopens");
        assert!(article.main_content.contains("breakwater"));

        let entry = parser.cache().entry("coast.example").unwrap();
        assert_eq!(entry.selectors.get(FieldKind::Title), Some("article h1"));
        assert_eq!(entry.selectors.get(FieldKind::MainContent), Some("article"));
        assert_eq!(entry.origin(FieldKind::Title), Some(SelectorOrigin::Learned));
    }

    #[test]
    fn test_invalid_html_short_circuits() {
        let parser = AdaptiveParser::new();
        let outcome = parser.parse::<ArticleRecord>("", "https://coast.example/a");
        assert!(matches!(outcome, ExtractionOutcome::Failure(GleanerError::InvalidHtml(_))));
        assert!(parser.cache().is_empty());
    }

    #[test]
    fn test_missing_required_names_first_in_order() {
        let parser = AdaptiveParser::new();
        let html = "<html><body><h1>Harbor reopens</h1></body></html>";
        let outcome = parser.parse::<StoryRecord>(html, "https://coast.example/a");
        assert!(matches!(outcome, ExtractionOutcome::Failure(GleanerError::MissingRequiredField(FieldKind::Author))));
    }

    #[test]
    fn test_taught_selector_wins_over_discovery() {
        let parser = AdaptiveParser::new();
        parser.teach("coast.example", &SelectorSet::new().with(FieldKind::Title, "title"));

        let outcome = parser.parse::<ArticleRecord>(&landmark_page("Harbor reopens"), "https://www.coast.example/a");
        assert_eq!(outcome.value().unwrap().title, "Coast News");
        assert_eq!(
            parser.cache().entry("coast.example").unwrap().origin(FieldKind::Title),
            Some(SelectorOrigin::Taught)
        );
    }

    #[test]
    fn test_failing_taught_selector_evicted_then_rediscovered() {
        let parser = AdaptiveParser::with_config(ParserConfig::builder().invalidate_after(2).build());
        parser.teach("coast.example", &SelectorSet::new().with(FieldKind::Title, "h2.gone"));
        let page = landmark_page("Harbor reopens");

        for _ in 0..2 {
            let outcome = parser.parse::<ArticleRecord>(&page, "https://coast.example/a");
            assert!(matches!(outcome, ExtractionOutcome::Failure(GleanerError::MissingRequiredField(FieldKind::Title))));
        }
        assert!(!parser.cache().get("coast.example").unwrap().contains(FieldKind::Title));

        let outcome = parser.parse::<ArticleRecord>(&page, "https://coast.example/a");
        assert_eq!(outcome.provenance(), Some(Provenance::Structural));
        assert_eq!(
            parser.cache().entry("coast.example").unwrap().origin(FieldKind::Title),
            Some(SelectorOrigin::Learned)
        );
    }

    #[test]
    fn test_stale_learned_selector_replaced_in_same_call() {
        let parser = AdaptiveParser::new();
        parser.cache().merge(
            "coast.example",
            &SelectorSet::new().with(FieldKind::Title, "h1.old-headline"),
            SelectorOrigin::Learned,
        );

        let outcome = parser.parse::<ArticleRecord>(&landmark_page("Harbor reopens"), "https://coast.example/a");
        assert_eq!(outcome.provenance(), Some(Provenance::Structural));
        assert_eq!(parser.cache().get("coast.example").unwrap().get(FieldKind::Title), Some("article h1"));
    }

    #[tokio::test]
    async fn test_fallback_fills_only_missing_kinds() {
        let extractor = Arc::new(TableExtractor::new(&[
            (FieldKind::Title, "Should not be used"),
            (FieldKind::MainContent, BODY),
        ]));
        let parser = AdaptiveParser::new().with_fallback(extractor.clone());
        let html = "<html><body><h1>Harbor reopens</h1><p>Short note.</p></body></html>";

        let outcome = parser.parse_with_fallback::<ArticleRecord>(html, "https://coast.example/a").await;
        let (article, source) = outcome.into_result().unwrap();

        assert_eq!(source, Provenance::Fallback);
        assert_eq!(article.title, "Harbor reopens");
        assert_eq!(article.main_content, BODY);

        let asked = extractor.asked();
        assert_eq!(asked[0], FieldKind::MainContent.description());
        assert!(!asked.iter().any(|d| d == FieldKind::Title.description()));
        assert_eq!(asked.len(), 5);
    }

    #[tokio::test]
    async fn test_missing_required_also_requests_missing_optional() {
        let extractor =
            Arc::new(TableExtractor::new(&[(FieldKind::MainContent, BODY), (FieldKind::Author, "Dana Whitfield")]));
        let parser = AdaptiveParser::new().with_fallback(extractor.clone());
        let html = "<html><body><h1>Harbor reopens</h1></body></html>";

        let outcome = parser.parse_with_fallback::<ArticleRecord>(html, "https://coast.example/a").await;
        let (article, source) = outcome.into_result().unwrap();

        assert_eq!(source, Provenance::Fallback);
        assert_eq!(article.main_content, BODY);
        assert_eq!(article.author.as_deref(), Some("Dana Whitfield"));
        assert!(extractor.asked().iter().any(|d| d == FieldKind::Author.description()));
    }

    #[tokio::test]
    async fn test_prose_fallback_image_rejected_by_record() {
        let extractor = Arc::new(TableExtractor::new(&[(FieldKind::Image, "no thumbnail available")]));
        let parser = AdaptiveParser::new().with_fallback(extractor);
        let html = "<html><body><h1>Night launch from the coast</h1></body></html>";

        let outcome = parser.parse_with_fallback::<VideoRecord>(html, "https://coast.example/v").await;
        assert!(matches!(
            outcome,
            ExtractionOutcome::Failure(GleanerError::InvalidFieldValue { kind: FieldKind::Image, .. })
        ));
    }

    #[test]
    fn test_resolve_link() {
        let base = Url::parse("https://coast.example/news/a").unwrap();
        assert_eq!(resolve_link(&base, "/media/a.jpg"), "https://coast.example/media/a.jpg");
        assert_eq!(resolve_link(&base, "../b.jpg"), "https://coast.example/b.jpg");
        assert_eq!(resolve_link(&base, "//cdn.example/c.jpg"), "https://cdn.example/c.jpg");
        assert_eq!(resolve_link(&base, "thumb.jpg"), "https://coast.example/news/thumb.jpg");
        assert_eq!(resolve_link(&base, "https://cdn.example/d.jpg"), "https://cdn.example/d.jpg");
        assert_eq!(resolve_link(&base, "no thumbnail available"), "no thumbnail available");
    }

    /// Teaches a title selector while its fallback request is in flight.
    struct TeachingExtractor {
        cache: Arc<SelectorCache>,
    }

    #[async_trait]
    impl FallbackExtractor for TeachingExtractor {
        async fn extract(&self, _html: &str, field_description: &str) -> std::result::Result<String, BoxError> {
            if field_description == FieldKind::MainContent.description() {
                self.cache.teach("coast.example", &SelectorSet::new().with(FieldKind::Title, "title"));
                return Ok(BODY.to_string());
            }
            Err("no answer".into())
        }
    }

    #[tokio::test]
    async fn test_teach_during_fallback_survives_commit() {
        let cache = Arc::new(SelectorCache::new());
        let parser = AdaptiveParser::new()
            .with_cache(cache.clone())
            .with_fallback(Arc::new(TeachingExtractor { cache: cache.clone() }));
        let html = "<html><body><h1>Harbor reopens</h1></body></html>";

        let outcome = parser.parse_with_fallback::<ArticleRecord>(html, "https://coast.example/a").await;
        assert_eq!(outcome.value().unwrap().title, "Harbor reopens");

        let entry = cache.entry("coast.example").unwrap();
        assert_eq!(entry.selectors.get(FieldKind::Title), Some("title"));
        assert_eq!(entry.origin(FieldKind::Title), Some(SelectorOrigin::Taught));
    }

    #[tokio::test]
    async fn test_fallback_failure_reports_missing_field() {
        let extractor = Arc::new(TableExtractor::new(&[]));
        let parser = AdaptiveParser::new().with_fallback(extractor.clone());
        let html = "<html><body><p>Short note.</p></body></html>";

        let outcome = parser.parse_with_fallback::<ArticleRecord>(html, "https://coast.example/a").await;
        assert!(matches!(outcome, ExtractionOutcome::Failure(GleanerError::MissingRequiredField(FieldKind::Title))));
        assert_eq!(extractor.asked().len(), FieldKind::ALL.len());
    }

    #[tokio::test]
    async fn test_structural_success_skips_fallback() {
        let extractor = Arc::new(TableExtractor::new(&[]));
        let parser = AdaptiveParser::new().with_fallback(extractor.clone());

        let outcome =
            parser.parse_with_fallback::<ArticleRecord>(&landmark_page("Harbor reopens"), "https://coast.example/a").await;
        assert_eq!(outcome.provenance(), Some(Provenance::Structural));
        assert!(extractor.asked().is_empty());
    }

    #[tokio::test]
    async fn test_escalate_optional_requests_optional_kinds() {
        let extractor = Arc::new(TableExtractor::new(&[(FieldKind::Author, "Dana Whitfield")]));
        let parser = AdaptiveParser::with_config(ParserConfig::builder().escalate_optional(true).build())
            .with_fallback(extractor.clone());

        let outcome =
            parser.parse_with_fallback::<ArticleRecord>(&landmark_page("Harbor reopens"), "https://coast.example/a").await;
        let (article, source) = outcome.into_result().unwrap();
        assert_eq!(source, Provenance::Fallback);
        assert_eq!(article.author.as_deref(), Some("Dana Whitfield"));
        assert_eq!(extractor.asked().len(), 4);
    }

    #[tokio::test]
    async fn test_relative_fallback_image_resolved() {
        let extractor = Arc::new(TableExtractor::new(&[(FieldKind::Image, "/media/harbor.jpg")]));
        let parser = AdaptiveParser::with_config(ParserConfig::builder().escalate_optional(true).build())
            .with_fallback(extractor);

        let outcome =
            parser.parse_with_fallback::<ArticleRecord>(&landmark_page("Harbor reopens"), "https://coast.example/a").await;
        let article = outcome.value().unwrap();
        assert_eq!(article.image.as_ref().map(Url::as_str), Some("https://coast.example/media/harbor.jpg"));
    }

    #[test]
    fn test_fetch_error_keeps_gleaner_errors() {
        let err = fetch_error("https://x.example", Box::new(GleanerError::Timeout { timeout: 5 }));
        assert!(matches!(err, GleanerError::Timeout { timeout: 5 }));

        let err = fetch_error("https://x.example", "connection reset".into());
        assert!(matches!(err, GleanerError::FetchFailed { .. }));
    }
}
