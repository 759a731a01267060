//! Selector discovery.
//!
//! Given a parsed document and a [`FieldKind`], proposes CSS selectors that
//! probably identify that field, each with a heuristic confidence. Heuristics
//! run in tiers, from publisher-declared metadata down to guesses based on
//! class names:
//!
//! | Tier        | Base score | Examples                                  |
//! |-------------|------------|-------------------------------------------|
//! | Metadata    | 1.00       | `meta[property="og:title"]`               |
//! | Microdata   | 0.85       | `[itemprop="headline"]`, `[rel="author"]` |
//! | Landmark    | 0.65       | `article h1`, `time[datetime]`            |
//! | Class name  | 0.45       | `h1.headline`, `span.byline`              |
//!
//! The base score is scaled by how uniquely the selector identifies a single
//! element: `base / sqrt(matches)`.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::field::FieldKind;
use crate::parse::{Document, Element};
use crate::shape::read_field;

static CSS_IDENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^-?[_a-zA-Z][_a-zA-Z0-9-]*$").expect("static regex"));

/// Tags never proposed by the class-name heuristic.
const SKIPPED_TAGS: &[&str] = &["html", "head", "body", "script", "style", "meta", "link", "noscript", "svg"];

/// A proposed selector for one field kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectorCandidate {
    pub selector: String,
    pub field: FieldKind,
    /// Heuristic confidence in `0.0..=1.0`.
    pub confidence: f64,
    /// Which heuristic proposed the selector.
    pub rationale: String,
}

/// Heuristic tiers, strongest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeuristicTier {
    Metadata,
    Microdata,
    Landmark,
    ClassName,
}

impl HeuristicTier {
    pub fn base_score(&self) -> f64 {
        match self {
            HeuristicTier::Metadata => 1.0,
            HeuristicTier::Microdata => 0.85,
            HeuristicTier::Landmark => 0.65,
            HeuristicTier::ClassName => 0.45,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            HeuristicTier::Metadata => "metadata tag",
            HeuristicTier::Microdata => "structured-data attribute",
            HeuristicTier::Landmark => "semantic landmark",
            HeuristicTier::ClassName => "class name",
        }
    }
}

struct Probe {
    tier: HeuristicTier,
    selector: &'static str,
}

const fn probe(tier: HeuristicTier, selector: &'static str) -> Probe {
    Probe { tier, selector }
}

use HeuristicTier::{Landmark, Metadata, Microdata};

const TITLE_PROBES: &[Probe] = &[
    probe(Metadata, r#"meta[property="og:title"]"#),
    probe(Metadata, r#"meta[name="twitter:title"]"#),
    probe(Metadata, r#"meta[name="title"]"#),
    probe(Microdata, r#"[itemprop="headline"]"#),
    probe(Landmark, "article h1"),
    probe(Landmark, "h1"),
];

const CONTENT_PROBES: &[Probe] = &[
    probe(Microdata, r#"[itemprop="articleBody"]"#),
    probe(Landmark, "article"),
    probe(Landmark, "main"),
    probe(Landmark, r#"[role="main"]"#),
];

const AUTHOR_PROBES: &[Probe] = &[
    probe(Metadata, r#"meta[name="author"]"#),
    probe(Metadata, r#"meta[property="article:author"]"#),
    probe(Microdata, r#"[itemprop="author"]"#),
    probe(Microdata, r#"[rel="author"]"#),
    probe(Landmark, "article address"),
];

const DATE_PROBES: &[Probe] = &[
    probe(Metadata, r#"meta[property="article:published_time"]"#),
    probe(Metadata, r#"meta[name="pubdate"]"#),
    probe(Metadata, r#"meta[name="date"]"#),
    probe(Microdata, r#"[itemprop="datePublished"]"#),
    probe(Landmark, "article time[datetime]"),
    probe(Landmark, "time[datetime]"),
];

const IMAGE_PROBES: &[Probe] = &[
    probe(Metadata, r#"meta[property="og:image"]"#),
    probe(Metadata, r#"meta[name="twitter:image"]"#),
    probe(Microdata, r#"[itemprop="image"]"#),
    probe(Landmark, "article figure img"),
    probe(Landmark, "figure img"),
];

const CATEGORY_PROBES: &[Probe] = &[
    probe(Metadata, r#"meta[property="article:section"]"#),
    probe(Microdata, r#"[itemprop="articleSection"]"#),
    probe(Landmark, r#"a[rel="tag"]"#),
];

fn probes(kind: FieldKind) -> &'static [Probe] {
    match kind {
        FieldKind::Title => TITLE_PROBES,
        FieldKind::MainContent => CONTENT_PROBES,
        FieldKind::Author => AUTHOR_PROBES,
        FieldKind::PublishDate => DATE_PROBES,
        FieldKind::Image => IMAGE_PROBES,
        FieldKind::Category => CATEGORY_PROBES,
    }
}

/// Class-name substrings that hint at a field kind.
fn class_tokens(kind: FieldKind) -> &'static [&'static str] {
    match kind {
        FieldKind::Title => &["headline", "title"],
        FieldKind::MainContent => &["article-body", "story-body", "content", "entry", "body"],
        FieldKind::Author => &["byline", "author", "writer"],
        FieldKind::PublishDate => &["published", "timestamp", "date"],
        FieldKind::Image => &["lead-image", "hero", "featured", "image"],
        FieldKind::Category => &["category", "kicker", "section"],
    }
}

/// Built-in generic selectors, the last tier before giving up on structure.
///
/// These carry no domain-specific learning and are never written to the cache.
pub fn default_selectors(kind: FieldKind) -> &'static [&'static str] {
    match kind {
        FieldKind::Title => &["h1", "title"],
        FieldKind::MainContent => &["article", "main", "#content", ".content"],
        FieldKind::Author => &[".author", ".byline"],
        FieldKind::PublishDate => &["time", ".date"],
        FieldKind::Image => &["article img", "main img"],
        FieldKind::Category => &[".category", ".section"],
    }
}

/// Configuration for selector discovery.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Maximum candidates contributed by the class-name heuristic per field.
    pub max_class_candidates: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self { max_class_candidates: 8 }
    }
}

/// Proposes selectors for field kinds.
#[derive(Debug, Clone, Default)]
pub struct SelectorDiscovery {
    config: DiscoveryConfig,
}

/// A candidate plus the document position of its first match, for tie-breaking.
struct Ranked {
    candidate: SelectorCandidate,
    position: usize,
}

impl SelectorDiscovery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: DiscoveryConfig) -> Self {
        Self { config }
    }

    /// Proposes selectors for `kind`, highest confidence first.
    ///
    /// Never fails; an empty list means no heuristic matched. A selector is
    /// only proposed if its first match actually yields a value. Duplicate
    /// selectors keep their highest score, and equal scores are ordered by the
    /// document position of the first matched element.
    pub fn discover(&self, doc: &Document, kind: FieldKind) -> Vec<SelectorCandidate> {
        let order = doc.elements();
        let mut ranked: Vec<Ranked> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();

        let mut offer = |selector: String, tier: HeuristicTier, rationale: String| {
            let Some(ranked_candidate) = self.rank(doc, &order, selector, kind, tier, rationale) else {
                return;
            };
            match index.get(&ranked_candidate.candidate.selector) {
                Some(&i) if ranked[i].candidate.confidence >= ranked_candidate.candidate.confidence => {}
                Some(&i) => ranked[i] = ranked_candidate,
                None => {
                    index.insert(ranked_candidate.candidate.selector.clone(), ranked.len());
                    ranked.push(ranked_candidate);
                }
            }
        };

        for p in probes(kind) {
            offer(p.selector.to_string(), p.tier, format!("{} `{}`", p.tier.label(), p.selector));
        }

        for (selector, token) in self.class_selectors(&order, kind) {
            offer(
                selector,
                HeuristicTier::ClassName,
                format!("{} contains \"{}\"", HeuristicTier::ClassName.label(), token),
            );
        }

        ranked.sort_by(|a, b| {
            b.candidate
                .confidence
                .total_cmp(&a.candidate.confidence)
                .then(a.position.cmp(&b.position))
        });

        let candidates: Vec<SelectorCandidate> = ranked.into_iter().map(|r| r.candidate).collect();
        tracing::trace!(field = %kind, count = candidates.len(), "Discovered selector candidates");
        candidates
    }

    fn rank(
        &self, doc: &Document, order: &[Element<'_>], selector: String, kind: FieldKind, tier: HeuristicTier,
        rationale: String,
    ) -> Option<Ranked> {
        let matches = doc.count(&selector);
        if matches == 0 {
            return None;
        }
        read_field(doc, &selector, kind)?;

        let first = doc.select_first(&selector)?;
        let position = order.iter().position(|el| *el == first).unwrap_or(usize::MAX);
        let confidence = (tier.base_score() / (matches as f64).sqrt()).clamp(0.0, 1.0);

        Some(Ranked { candidate: SelectorCandidate { selector, field: kind, confidence, rationale }, position })
    }

    /// Builds `tag.class` selectors for elements whose class names contain a hint token.
    fn class_selectors(&self, order: &[Element<'_>], kind: FieldKind) -> Vec<(String, &'static str)> {
        let mut found: Vec<(String, &'static str)> = Vec::new();

        for el in order {
            if found.len() >= self.config.max_class_candidates {
                break;
            }
            let tag = el.tag_name();
            if SKIPPED_TAGS.contains(&tag.as_str()) {
                continue;
            }

            for class in el.classes() {
                if !CSS_IDENT.is_match(class) {
                    continue;
                }
                let lowered = class.to_ascii_lowercase();
                let Some(token) = class_tokens(kind).iter().find(|t| lowered.contains(*t)) else {
                    continue;
                };

                let selector = if kind == FieldKind::Image && tag != "img" {
                    format!("{}.{} img", tag, class)
                } else {
                    format!("{}.{}", tag, class)
                };

                if !found.iter().any(|(s, _)| *s == selector) {
                    found.push((selector, token));
                }
                break;
            }
        }

        found
    }
}

/// Convenience wrapper around [`SelectorDiscovery::discover`] with default settings.
pub fn discover(doc: &Document, kind: FieldKind) -> Vec<SelectorCandidate> {
    SelectorDiscovery::new().discover(doc, kind)
}
