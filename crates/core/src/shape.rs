//! The target shape parsing contract.
//!
//! Every record type the pipeline can produce implements [`TargetShape`]: it
//! declares which [`FieldKind`]s it requires, which it can optionally use, and
//! how to assemble itself from the strings extracted for those kinds. The
//! parser is generic over the shape, so there is no runtime type switch.
//!
//! # Example
//!
//! ```rust
//! use gleaner_core::{FieldKind, FieldValues, Result, TargetShape};
//!
//! struct Headline {
//!     title: String,
//! }
//!
//! impl TargetShape for Headline {
//!     const NAME: &'static str = "headline";
//!
//!     fn required_fields() -> &'static [FieldKind] {
//!         &[FieldKind::Title]
//!     }
//!
//!     fn assemble(fields: &FieldValues) -> Result<Self> {
//!         Ok(Self { title: fields.require(FieldKind::Title)?.to_string() })
//!     }
//! }
//! ```

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use crate::field::FieldKind;
use crate::parse::{Document, normalize_whitespace};
use crate::{GleanerError, Result};

static BYLINE_PREFIX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^by\s+").expect("static regex"));

/// A record type that can be assembled from extracted field strings.
pub trait TargetShape: Sized {
    /// Shape name used in logs and errors.
    const NAME: &'static str;

    /// Required kinds, in declaration order.
    fn required_fields() -> &'static [FieldKind];

    /// Optional kinds, in declaration order.
    fn optional_fields() -> &'static [FieldKind] {
        &[]
    }

    /// Builds the record.
    ///
    /// Must fail with [`GleanerError::MissingRequiredField`] naming the first
    /// absent required kind, and may fail with
    /// [`GleanerError::InvalidFieldValue`] when a present value is unusable.
    fn assemble(fields: &FieldValues) -> Result<Self>;

    /// Required then optional kinds, without duplicates.
    fn all_fields() -> Vec<FieldKind> {
        let mut kinds: Vec<FieldKind> = Vec::new();
        for kind in Self::required_fields().iter().chain(Self::optional_fields()) {
            if !kinds.contains(kind) {
                kinds.push(*kind);
            }
        }
        kinds
    }
}

/// Rejects shapes that declare no fields at all.
pub fn ensure_supported<T: TargetShape>() -> Result<()> {
    if T::required_fields().is_empty() && T::optional_fields().is_empty() {
        return Err(GleanerError::UnsupportedTargetShape(format!(
            "{} declares no fields",
            T::NAME
        )));
    }
    Ok(())
}

/// Extracted strings keyed by field kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldValues {
    values: BTreeMap<FieldKind, String>,
}

impl FieldValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, kind: FieldKind, value: impl Into<String>) {
        self.values.insert(kind, value.into());
    }

    pub fn get(&self, kind: FieldKind) -> Option<&str> {
        self.values.get(&kind).map(String::as_str)
    }

    pub fn remove(&mut self, kind: FieldKind) -> Option<String> {
        self.values.remove(&kind)
    }

    pub fn contains(&self, kind: FieldKind) -> bool {
        self.values.contains_key(&kind)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (FieldKind, &str)> {
        self.values.iter().map(|(k, v)| (*k, v.as_str()))
    }

    /// Gets a value or fails with [`GleanerError::MissingRequiredField`].
    pub fn require(&self, kind: FieldKind) -> Result<&str> {
        self.get(kind).ok_or(GleanerError::MissingRequiredField(kind))
    }

    /// Fails naming the first kind in `required` that has no value.
    pub fn ensure_required(&self, required: &[FieldKind]) -> Result<()> {
        match required.iter().find(|kind| !self.contains(**kind)) {
            Some(kind) => Err(GleanerError::MissingRequiredField(*kind)),
            None => Ok(()),
        }
    }

    /// Owned copy of an optional value.
    pub fn optional(&self, kind: FieldKind) -> Option<String> {
        self.get(kind).map(str::to_string)
    }

    /// Parses a required value as an absolute URL.
    pub fn require_url(&self, kind: FieldKind) -> Result<Url> {
        parse_url(kind, self.require(kind)?)
    }

    /// Parses an optional value as an absolute URL; a present but malformed value is an error.
    pub fn optional_url(&self, kind: FieldKind) -> Result<Option<Url>> {
        self.get(kind).map(|value| parse_url(kind, value)).transpose()
    }
}

impl FromIterator<(FieldKind, String)> for FieldValues {
    fn from_iter<I: IntoIterator<Item = (FieldKind, String)>>(iter: I) -> Self {
        Self { values: iter.into_iter().collect() }
    }
}

fn parse_url(kind: FieldKind, value: &str) -> Result<Url> {
    Url::parse(value.trim()).map_err(|e| GleanerError::InvalidFieldValue { kind, reason: e.to_string() })
}

/// Reads the value of `kind` from the first element matching `selector`.
///
/// The element type decides where the value lives: `<meta>` and microdata
/// elements carry it in `content`, `<time>` in `datetime`, images in `src`,
/// links in `href`, everything else in its text. Image links are resolved
/// against the document URL, and a leading "By" is dropped from bylines.
///
/// Returns `None` (never fails) when nothing usable matches.
pub fn read_field(doc: &Document, selector: &str, kind: FieldKind) -> Option<String> {
    let el = doc.select_first(selector)?;
    let tag = el.tag_name();

    let raw = if let Some(content) = el.attr("content") {
        content.to_string()
    } else if tag == "meta" {
        return None;
    } else if tag == "time" && kind == FieldKind::PublishDate {
        el.attr("datetime").map(str::to_string).unwrap_or_else(|| el.text())
    } else if kind == FieldKind::Image {
        let src = match tag.as_str() {
            "img" => el.attr("src").or_else(|| el.attr("data-src")).map(str::to_string),
            "link" | "a" => el.attr("href").map(str::to_string),
            _ => el
                .select("img")
                .ok()
                .and_then(|imgs| imgs.first().and_then(|img| img.attr("src").map(str::to_string))),
        };
        src?
    } else if tag == "link" {
        el.attr("href")?.to_string()
    } else {
        el.text()
    };

    let mut value = normalize_whitespace(&raw);
    if kind == FieldKind::Author {
        value = BYLINE_PREFIX.replace(&value, "").into_owned();
    }
    if kind.is_url_valued() && !value.is_empty() {
        value = doc.resolve_url(&value);
    }

    if value.is_empty() { None } else { Some(value) }
}
