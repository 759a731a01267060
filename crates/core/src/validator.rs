//! Content validation for extracted field values.
//!
//! The validator judges whether a string plausibly fills a [`FieldKind`]. Each
//! kind has a small battery of weighted checks; the verdict score is the sum of
//! the weights of the checks that passed, so it always lies in `0.0..=1.0`.
//! A value is valid only when its score reaches the kind's threshold.
//!
//! | Kind        | Checks (weight)                                                      | Threshold |
//! |-------------|----------------------------------------------------------------------|-----------|
//! | title       | not blank (35), max length (25), mostly letters (30), min length (10) | 0.8       |
//! | author      | not blank (35), max length (25), name or URL shape (30), few words (10) | 0.8     |
//! | category    | not blank (35), max length (25), mostly letters (30), few words (10)  | 0.8       |
//! | mainContent | min characters (50), differs from title (30), prose letters (10), sentence punctuation (10) | 0.8 |
//! | publishDate | not blank (10), parses as a date (70), short (20)                     | 0.8       |
//! | image       | not blank (20), absolute http(s) URL (60), image-like path (20)       | 0.8       |
//!
//! Validation is pure: no I/O and no clock reads.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::Serialize;
use url::Url;

use crate::field::FieldKind;

/// Judgment of one extracted value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationVerdict {
    pub is_valid: bool,
    /// Weighted check score in `0.0..=1.0`.
    pub score: f64,
    /// Failed checks, in evaluation order.
    pub reasons: Vec<String>,
}

/// Thresholds for the content validator.
#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    /// Maximum title length in characters.
    pub max_title_len: usize,
    /// Maximum author length in characters.
    pub max_author_len: usize,
    /// Maximum category length in characters.
    pub max_category_len: usize,
    /// Minimum main-content length in characters.
    pub min_content_chars: usize,
    /// Minimum score for a value to count as valid.
    pub threshold: f64,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self { max_title_len: 300, max_author_len: 120, max_category_len: 80, min_content_chars: 120, threshold: 0.8 }
    }
}

/// Date formats accepted for `publishDate` beyond RFC 3339 and RFC 2822.
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M"];
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%B %d, %Y", "%b %d, %Y", "%d %B %Y", "%m/%d/%Y"];

const IMAGE_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".gif", ".webp", ".avif", ".svg"];

/// Tries every accepted date format.
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.date_naive());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(text) {
        return Some(dt.date_naive());
    }
    if let Ok(dt) = DateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%z") {
        return Some(dt.date_naive());
    }
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Some(dt.date());
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return Some(date);
        }
    }

    None
}

/// Accumulates weighted checks in integer points (out of 100).
struct Scorecard {
    points: u32,
    reasons: Vec<String>,
}

impl Scorecard {
    fn new() -> Self {
        Self { points: 0, reasons: Vec::new() }
    }

    fn check(&mut self, passed: bool, weight: u32, reason: impl FnOnce() -> String) {
        if passed {
            self.points += weight;
        } else {
            self.reasons.push(reason());
        }
    }

    fn verdict(self, threshold: f64) -> ValidationVerdict {
        let score = (f64::from(self.points) / 100.0).clamp(0.0, 1.0);
        ValidationVerdict { is_valid: score >= threshold, score, reasons: self.reasons }
    }
}

fn letter_ratio(text: &str) -> f64 {
    let visible: Vec<char> = text.chars().filter(|c| !c.is_whitespace()).collect();
    if visible.is_empty() {
        return 0.0;
    }
    visible.iter().filter(|c| c.is_alphabetic()).count() as f64 / visible.len() as f64
}

fn looks_like_url(text: &str) -> bool {
    let lower = text.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://") || lower.starts_with("//")
}

fn is_web_url(text: &str) -> bool {
    Url::parse(text.trim())
        .map(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
        .unwrap_or(false)
}

/// Scores extracted strings per field kind.
#[derive(Debug, Clone, Default)]
pub struct ContentValidator {
    config: ValidatorConfig,
}

impl ContentValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ValidatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Validates `text` as a value for `kind`.
    pub fn validate(&self, text: &str, kind: FieldKind) -> ValidationVerdict {
        self.validate_with_title(text, kind, None)
    }

    /// Validates `text`, comparing main content against an already extracted title.
    ///
    /// Main content equal to the title is the typical symptom of a content
    /// selector that landed on the headline.
    pub fn validate_with_title(&self, text: &str, kind: FieldKind, title: Option<&str>) -> ValidationVerdict {
        let trimmed = text.trim();
        let chars = trimmed.chars().count();
        let words = trimmed.split_whitespace().count();
        let mut card = Scorecard::new();

        match kind {
            FieldKind::Title => {
                card.check(!trimmed.is_empty(), 35, || "title is blank".to_string());
                card.check(chars <= self.config.max_title_len, 25, || {
                    format!("title longer than {} characters", self.config.max_title_len)
                });
                card.check(letter_ratio(trimmed) >= 0.5, 30, || "title is mostly non-letters".to_string());
                card.check(chars >= 3, 10, || "title shorter than 3 characters".to_string());
            }
            FieldKind::Author => {
                card.check(!trimmed.is_empty(), 35, || "author is blank".to_string());
                card.check(chars <= self.config.max_author_len, 25, || {
                    format!("author longer than {} characters", self.config.max_author_len)
                });
                if looks_like_url(trimmed) {
                    card.check(is_web_url(trimmed), 30, || "author URL is malformed".to_string());
                } else {
                    card.check(letter_ratio(trimmed) >= 0.6, 30, || "author is mostly non-letters".to_string());
                }
                card.check(words <= 12, 10, || "author has too many words".to_string());
            }
            FieldKind::Category => {
                card.check(!trimmed.is_empty(), 35, || "category is blank".to_string());
                card.check(chars <= self.config.max_category_len, 25, || {
                    format!("category longer than {} characters", self.config.max_category_len)
                });
                card.check(letter_ratio(trimmed) >= 0.5, 30, || "category is mostly non-letters".to_string());
                card.check(words <= 6, 10, || "category has too many words".to_string());
            }
            FieldKind::MainContent => {
                card.check(chars >= self.config.min_content_chars, 50, || {
                    format!("content shorter than {} characters", self.config.min_content_chars)
                });
                let same_as_title = title.is_some_and(|t| !t.trim().is_empty() && t.trim() == trimmed);
                card.check(!same_as_title, 30, || "content equals the title".to_string());
                card.check(letter_ratio(trimmed) >= 0.6, 10, || "content is mostly non-letters".to_string());
                card.check(trimmed.contains(['.', '!', '?']), 10, || {
                    "content has no sentence punctuation".to_string()
                });
            }
            FieldKind::PublishDate => {
                card.check(!trimmed.is_empty(), 10, || "date is blank".to_string());
                card.check(parse_date(trimmed).is_some(), 70, || {
                    "date does not match any accepted format".to_string()
                });
                card.check(chars <= 64, 20, || "date longer than 64 characters".to_string());
            }
            FieldKind::Image => {
                card.check(!trimmed.is_empty(), 20, || "image URL is blank".to_string());
                card.check(is_web_url(trimmed), 60, || "image is not an absolute http(s) URL".to_string());
                let path = Url::parse(trimmed).map(|u| u.path().to_ascii_lowercase()).unwrap_or_default();
                let image_like = IMAGE_EXTENSIONS.iter().any(|ext| path.ends_with(ext)) || !path.contains('.');
                card.check(image_like, 20, || "image URL does not look like an image".to_string());
            }
        }

        card.verdict(self.config.threshold)
    }
}

/// Convenience wrapper around [`ContentValidator::validate`] with default thresholds.
pub fn validate(text: &str, kind: FieldKind) -> ValidationVerdict {
    ContentValidator::new().validate(text, kind)
}
