//! Error types for Gleaner operations.
//!
//! This module defines the main error type [`GleanerError`] which represents
//! every failure the extraction pipeline can report, from unparseable input
//! to a required field that no tier could fill.
//!
//! # Example
//!
//! ```rust
//! use gleaner_core::{FieldKind, GleanerError, Result};
//!
//! fn require_title(title: Option<&str>) -> Result<String> {
//!     title
//!         .map(str::to_string)
//!         .ok_or(GleanerError::MissingRequiredField(FieldKind::Title))
//! }
//! ```

use std::path::PathBuf;
use thiserror::Error;

use crate::field::FieldKind;

/// Boxed error returned by external collaborators (fetchers, fallback extractors).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Main error type for extraction operations.
///
/// All variants are recoverable and surface to callers through
/// [`ExtractionOutcome::Failure`](crate::ExtractionOutcome) or a [`Result`].
#[derive(Error, Debug)]
pub enum GleanerError {
    /// The input could not be parsed as an HTML document at all.
    ///
    /// Detected before any selector or network work.
    #[error("Invalid HTML: {0}")]
    InvalidHtml(String),

    /// A required field could not be filled after every tier was exhausted.
    #[error("Missing required field: {0}")]
    MissingRequiredField(FieldKind),

    /// The requested target shape has no usable parsing contract.
    #[error("Unsupported target shape: {0}")]
    UnsupportedTargetShape(String),

    /// The fallback extractor failed for one field.
    ///
    /// Non-fatal: the parser records the field as still missing.
    #[error("Fallback extraction failed for {kind}: {source}")]
    FallbackExtractionFailed {
        kind: FieldKind,
        #[source]
        source: BoxError,
    },

    /// A record rejected an extracted value during assembly.
    #[error("Invalid value for {kind}: {reason}")]
    InvalidFieldValue { kind: FieldKind, reason: String },

    /// A CSS selector could not be compiled.
    #[error("Invalid selector: {0}")]
    InvalidSelector(String),

    /// Invalid URL provided.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// HTTP request errors from reqwest.
    #[cfg(feature = "reqwest")]
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// The HTML source failed to deliver a page.
    #[error("Fetching {url} failed: {source}")]
    FetchFailed {
        url: String,
        #[source]
        source: BoxError,
    },

    /// Request timeout.
    #[error("Request timed out after {timeout} seconds")]
    Timeout { timeout: u64 },

    /// File not found.
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// Wraps standard I/O errors for file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A collaborator is misconfigured (missing API key, bad endpoint).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Operator rule files are missing or invalid.
    #[error("Rules error: {0}")]
    RulesError(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for GleanerError.
pub type Result<T> = std::result::Result<T, GleanerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_field_display() {
        let err = GleanerError::MissingRequiredField(FieldKind::PublishDate);
        assert_eq!(err.to_string(), "Missing required field: publishDate");
    }

    #[test]
    fn test_fallback_error_keeps_source() {
        let err = GleanerError::FallbackExtractionFailed { kind: FieldKind::Author, source: "model offline".into() };
        assert!(err.to_string().contains("author"));
        assert!(err.to_string().contains("model offline"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_timeout_error() {
        let err = GleanerError::Timeout { timeout: 30 };
        assert!(err.to_string().contains("30"));
    }
}
