//! Concrete record types the pipeline can produce.
//!
//! Each record implements [`TargetShape`], so it can be requested directly
//! with `parser.parse::<ArticleRecord>(...)`. [`ShapeKind`] maps a shape name
//! to one of these types for callers that pick the shape at runtime, such as
//! the command line.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use url::Url;

use crate::field::FieldKind;
use crate::shape::{FieldValues, TargetShape};
use crate::{GleanerError, Result};

/// A written news article.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleRecord {
    pub title: String,
    pub main_content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publish_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<Url>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl TargetShape for ArticleRecord {
    const NAME: &'static str = "article";

    fn required_fields() -> &'static [FieldKind] {
        &[FieldKind::Title, FieldKind::MainContent]
    }

    fn optional_fields() -> &'static [FieldKind] {
        &[FieldKind::Author, FieldKind::PublishDate, FieldKind::Image, FieldKind::Category]
    }

    fn assemble(fields: &FieldValues) -> Result<Self> {
        fields.ensure_required(Self::required_fields())?;
        Ok(Self {
            title: fields.require(FieldKind::Title)?.to_string(),
            main_content: fields.require(FieldKind::MainContent)?.to_string(),
            author: fields.optional(FieldKind::Author),
            publish_date: fields.optional(FieldKind::PublishDate),
            image: fields.optional_url(FieldKind::Image)?,
            category: fields.optional(FieldKind::Category),
        })
    }
}

/// A short attributed story where byline and date are mandatory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryRecord {
    pub title: String,
    pub author: String,
    pub publish_date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub main_content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<Url>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl TargetShape for StoryRecord {
    const NAME: &'static str = "story";

    fn required_fields() -> &'static [FieldKind] {
        &[FieldKind::Title, FieldKind::Author, FieldKind::PublishDate]
    }

    fn optional_fields() -> &'static [FieldKind] {
        &[FieldKind::MainContent, FieldKind::Image, FieldKind::Category]
    }

    fn assemble(fields: &FieldValues) -> Result<Self> {
        fields.ensure_required(Self::required_fields())?;
        Ok(Self {
            title: fields.require(FieldKind::Title)?.to_string(),
            author: fields.require(FieldKind::Author)?.to_string(),
            publish_date: fields.require(FieldKind::PublishDate)?.to_string(),
            main_content: fields.optional(FieldKind::MainContent),
            image: fields.optional_url(FieldKind::Image)?,
            category: fields.optional(FieldKind::Category),
        })
    }
}

/// A video page; the lead image is its thumbnail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoRecord {
    pub title: String,
    pub thumbnail: Url,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publish_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl TargetShape for VideoRecord {
    const NAME: &'static str = "video";

    fn required_fields() -> &'static [FieldKind] {
        &[FieldKind::Title, FieldKind::Image]
    }

    fn optional_fields() -> &'static [FieldKind] {
        &[FieldKind::Author, FieldKind::PublishDate, FieldKind::Category, FieldKind::MainContent]
    }

    fn assemble(fields: &FieldValues) -> Result<Self> {
        fields.ensure_required(Self::required_fields())?;
        Ok(Self {
            title: fields.require(FieldKind::Title)?.to_string(),
            thumbnail: fields.require_url(FieldKind::Image)?,
            author: fields.optional(FieldKind::Author),
            publish_date: fields.optional(FieldKind::PublishDate),
            category: fields.optional(FieldKind::Category),
            description: fields.optional(FieldKind::MainContent),
        })
    }
}

/// A podcast or audio episode page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioRecord {
    pub title: String,
    pub show_notes: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publish_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<Url>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl TargetShape for AudioRecord {
    const NAME: &'static str = "audio";

    fn required_fields() -> &'static [FieldKind] {
        &[FieldKind::Title, FieldKind::MainContent]
    }

    fn optional_fields() -> &'static [FieldKind] {
        &[FieldKind::Author, FieldKind::PublishDate, FieldKind::Image, FieldKind::Category]
    }

    fn assemble(fields: &FieldValues) -> Result<Self> {
        fields.ensure_required(Self::required_fields())?;
        Ok(Self {
            title: fields.require(FieldKind::Title)?.to_string(),
            show_notes: fields.require(FieldKind::MainContent)?.to_string(),
            author: fields.optional(FieldKind::Author),
            publish_date: fields.optional(FieldKind::PublishDate),
            image: fields.optional_url(FieldKind::Image)?,
            category: fields.optional(FieldKind::Category),
        })
    }
}

/// Runtime name for one of the built-in record types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeKind {
    Article,
    Story,
    Video,
    Audio,
}

impl ShapeKind {
    pub const ALL: [ShapeKind; 4] = [ShapeKind::Article, ShapeKind::Story, ShapeKind::Video, ShapeKind::Audio];

    pub fn name(&self) -> &'static str {
        match self {
            ShapeKind::Article => ArticleRecord::NAME,
            ShapeKind::Story => StoryRecord::NAME,
            ShapeKind::Video => VideoRecord::NAME,
            ShapeKind::Audio => AudioRecord::NAME,
        }
    }

    /// Every kind the shape reads, required first.
    pub fn fields(&self) -> Vec<FieldKind> {
        match self {
            ShapeKind::Article => ArticleRecord::all_fields(),
            ShapeKind::Story => StoryRecord::all_fields(),
            ShapeKind::Video => VideoRecord::all_fields(),
            ShapeKind::Audio => AudioRecord::all_fields(),
        }
    }
}

impl fmt::Display for ShapeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ShapeKind {
    type Err = GleanerError;

    fn from_str(s: &str) -> Result<Self> {
        ShapeKind::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| GleanerError::UnsupportedTargetShape(s.to_string()))
    }
}
