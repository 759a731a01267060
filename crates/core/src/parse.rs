//! HTML parsing and DOM querying.
//!
//! This module provides the [`Document`] and [`Element`] types for parsing
//! HTML and navigating the DOM tree using CSS selectors. It also hosts the
//! two extraction helpers every target shape relies on:
//! [`Document::extract_text`] and [`Document::extract_attr`]. Both return
//! `None` instead of failing when nothing matches, so callers can treat an
//! absent element and an unusable selector the same way.
//!
//! # Example
//!
//! ```rust
//! use gleaner_core::parse::Document;
//!
//! let html = r#"
//!     <html>
//!         <body>
//!             <h1>Title</h1>
//!             <p class="content">Paragraph</p>
//!         </body>
//!     </html>
//! "#;
//!
//! let doc = Document::parse(html).unwrap();
//! assert_eq!(doc.extract_text("h1"), Some("Title".to_string()));
//! assert_eq!(doc.extract_text("p.missing"), None);
//! ```

use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};
use url::Url;

use crate::{GleanerError, Result};

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("static regex"));
static TAG_OPEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[A-Za-z!/]").expect("static regex"));
static HTML_OPEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<html[\s>]").expect("static regex"));
static HTML_CLOSE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)</html\s*>").expect("static regex"));

/// Collapses runs of whitespace into single spaces and trims the result.
pub fn normalize_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text, " ").trim().to_string()
}

/// Checks that the input is recognisably a complete HTML document or fragment.
///
/// The HTML5 parser itself never fails, so well-formedness is judged up front:
/// the input must contain markup, must not end inside an unterminated tag, and
/// an opened `<html>` element must be closed.
fn check_well_formed(html: &str) -> Result<()> {
    if html.trim().is_empty() {
        return Err(GleanerError::InvalidHtml("empty document".to_string()));
    }

    let Some(last_open) = TAG_OPEN.find_iter(html).last() else {
        return Err(GleanerError::InvalidHtml("no HTML markup found".to_string()));
    };

    if !html[last_open.start()..].contains('>') {
        return Err(GleanerError::InvalidHtml(format!(
            "unterminated tag at byte {}",
            last_open.start()
        )));
    }

    if HTML_OPEN.is_match(html) && !HTML_CLOSE.is_match(html) {
        return Err(GleanerError::InvalidHtml("<html> element is never closed".to_string()));
    }

    Ok(())
}

fn compile_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| GleanerError::InvalidSelector(format!("{}: {}", selector, e)))
}

/// Represents a parsed HTML document.
///
/// A Document wraps an HTML page together with the URL it was served from,
/// which is used to resolve relative image links.
///
/// # Example
///
/// ```rust
/// use gleaner_core::parse::Document;
///
/// let html = "<html><head><title>Test</title></head><body><p>Hello</p></body></html>";
/// let doc = Document::parse(html).unwrap();
/// assert_eq!(doc.title(), Some("Test".to_string()));
/// ```
pub struct Document {
    html: Html,
    base_url: Option<Url>,
}

impl Document {
    /// Parses HTML from a string.
    ///
    /// # Errors
    ///
    /// Returns [`GleanerError::InvalidHtml`] for empty input, input without any
    /// markup, or markup that is cut off mid-document.
    pub fn parse(html: &str) -> Result<Self> {
        Self::parse_with_url(html, None)
    }

    /// Parses HTML with a known base URL (for relative link resolution).
    pub fn parse_with_url(html: &str, base_url: Option<Url>) -> Result<Self> {
        check_well_formed(html)?;
        let html = Html::parse_document(html);
        Ok(Self { html, base_url })
    }

    /// Gets the base URL the document was parsed with.
    pub fn base_url(&self) -> Option<&Url> {
        self.base_url.as_ref()
    }

    /// Gets the raw HTML representation.
    pub fn html(&self) -> &Html {
        &self.html
    }

    /// Selects elements using a CSS selector.
    ///
    /// # Errors
    ///
    /// Returns [`GleanerError::InvalidSelector`] if the selector is invalid.
    ///
    /// # Example
    ///
    /// ```rust
    /// use gleaner_core::parse::Document;
    ///
    /// let html = r#"<p class="content">First</p><p class="content">Second</p>"#;
    /// let doc = Document::parse(html).unwrap();
    /// let elements = doc.select("p.content").unwrap();
    /// assert_eq!(elements.len(), 2);
    /// ```
    pub fn select(&'_ self, selector: &str) -> Result<Vec<Element<'_>>> {
        let sel = compile_selector(selector)?;
        Ok(self.html.select(&sel).map(|el| Element { element: el }).collect())
    }

    /// Selects the first element matching a CSS selector.
    ///
    /// Invalid selectors and empty matches both yield `None`.
    pub fn select_first(&'_ self, selector: &str) -> Option<Element<'_>> {
        let sel = compile_selector(selector).ok()?;
        self.html.select(&sel).next().map(|el| Element { element: el })
    }

    /// Counts the elements matching a CSS selector (0 for invalid selectors).
    pub fn count(&self, selector: &str) -> usize {
        compile_selector(selector)
            .map(|sel| self.html.select(&sel).count())
            .unwrap_or(0)
    }

    /// Every element of the document in document order.
    pub fn elements(&'_ self) -> Vec<Element<'_>> {
        self.html
            .root_element()
            .descendants()
            .filter_map(scraper::ElementRef::wrap)
            .map(|el| Element { element: el })
            .collect()
    }

    /// Gets the content of the `<title>` element if present.
    pub fn title(&self) -> Option<String> {
        self.extract_text("title")
    }

    /// Gets all text content from the document.
    pub fn text_content(&self) -> String {
        self.html.root_element().text().collect()
    }

    /// Extracts the whitespace-normalized text of the first element matching `selector`.
    ///
    /// Returns `None` when the selector is invalid, matches nothing, or the
    /// matched element has no text.
    pub fn extract_text(&self, selector: &str) -> Option<String> {
        let text = normalize_whitespace(&self.select_first(selector)?.text());
        if text.is_empty() { None } else { Some(text) }
    }

    /// Extracts an attribute value from the first element matching `selector`.
    ///
    /// Returns `None` when the selector is invalid, matches nothing, or the
    /// attribute is absent or blank.
    pub fn extract_attr(&self, selector: &str, attr: &str) -> Option<String> {
        let el = self.select_first(selector)?;
        let value = el.attr(attr)?.trim();
        if value.is_empty() { None } else { Some(value.to_string()) }
    }

    /// Resolves a possibly relative link against the document's base URL.
    ///
    /// Links that cannot be resolved are returned unchanged.
    pub fn resolve_url(&self, link: &str) -> String {
        match &self.base_url {
            Some(base) => base.join(link).map(|u| u.to_string()).unwrap_or_else(|_| link.to_string()),
            None => link.to_string(),
        }
    }
}

/// A wrapper around scraper's ElementRef.
///
/// # Example
///
/// ```rust
/// use gleaner_core::parse::Document;
///
/// let html = r#"<a href="https://example.com">Link text</a>"#;
/// let doc = Document::parse(html).unwrap();
/// let link = &doc.select("a").unwrap()[0];
///
/// assert_eq!(link.text(), "Link text");
/// assert_eq!(link.attr("href"), Some("https://example.com"));
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Element<'a> {
    element: scraper::ElementRef<'a>,
}

impl<'a> Element<'a> {
    /// Gets the outer HTML of this element.
    pub fn outer_html(&self) -> String {
        self.element.html()
    }

    /// Gets the concatenation of all text nodes within this element.
    pub fn text(&self) -> String {
        self.element.text().collect()
    }

    /// Gets the value of an attribute.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.element.value().attr(name)
    }

    /// Gets the lowercase tag name of this element.
    pub fn tag_name(&self) -> String {
        self.element.value().name().to_lowercase()
    }

    /// Iterates the element's class names.
    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.element.value().classes()
    }

    /// Selects child elements using a CSS selector.
    pub fn select(&'_ self, selector: &str) -> Result<Vec<Element<'_>>> {
        let sel = compile_selector(selector)?;
        Ok(self.element.select(&sel).map(|el| Element { element: el }).collect())
    }
}
