//! Field kinds: the semantic slots the pipeline extracts from a page.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{GleanerError, Result};

/// One semantic slot to extract from a news page.
///
/// The declaration order is the canonical order used when iterating over
/// every kind, e.g. when printing discovery candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldKind {
    Title,
    MainContent,
    Author,
    PublishDate,
    Image,
    Category,
}

impl FieldKind {
    /// All field kinds in canonical order.
    pub const ALL: [FieldKind; 6] = [
        FieldKind::Title,
        FieldKind::MainContent,
        FieldKind::Author,
        FieldKind::PublishDate,
        FieldKind::Image,
        FieldKind::Category,
    ];

    /// Stable identifier, matching the serialized form.
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::Title => "title",
            FieldKind::MainContent => "mainContent",
            FieldKind::Author => "author",
            FieldKind::PublishDate => "publishDate",
            FieldKind::Image => "image",
            FieldKind::Category => "category",
        }
    }

    /// Natural-language description handed to the fallback extractor.
    pub fn description(&self) -> &'static str {
        match self {
            FieldKind::Title => "the headline or title of the article",
            FieldKind::MainContent => "the full main body text of the article, without navigation, ads or comments",
            FieldKind::Author => "the name of the author or authors (byline)",
            FieldKind::PublishDate => "the publication date of the article",
            FieldKind::Image => "the absolute URL of the lead image",
            FieldKind::Category => "the section or category the article is filed under",
        }
    }

    /// Whether values of this kind are URLs that should be resolved against the page URL.
    pub fn is_url_valued(&self) -> bool {
        matches!(self, FieldKind::Image)
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldKind {
    type Err = GleanerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().replace(['_', '-'], "").as_str() {
            "title" | "headline" => Ok(FieldKind::Title),
            "maincontent" | "content" | "body" => Ok(FieldKind::MainContent),
            "author" | "byline" => Ok(FieldKind::Author),
            "publishdate" | "date" => Ok(FieldKind::PublishDate),
            "image" => Ok(FieldKind::Image),
            "category" | "section" => Ok(FieldKind::Category),
            _ => Err(GleanerError::RulesError(format!("Unknown field kind: {}", s))),
        }
    }
}
