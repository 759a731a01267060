pub mod cache;
pub mod discovery;
pub mod error;
pub mod fallback;
pub mod fetch;
pub mod field;
pub mod parse;
pub mod parser;
pub mod records;
pub mod rules;
pub mod shape;
pub mod validator;

pub use cache::{CacheEntry, SelectorCache, SelectorOrigin, SelectorSet, domain_of, normalize_domain};
pub use discovery::{DiscoveryConfig, HeuristicTier, SelectorCandidate, SelectorDiscovery, default_selectors, discover};
pub use error::{BoxError, GleanerError, Result};
#[cfg(feature = "llm")]
pub use fallback::{ChatCompletionExtractor, ChatExtractorConfig};
pub use fallback::FallbackExtractor;
pub use fetch::{FetchConfig, HtmlSource, fetch_file, fetch_stdin};
#[cfg(feature = "fetch")]
pub use fetch::{HttpSource, fetch_url};
pub use field::FieldKind;
pub use parse::{Document, Element};
pub use parser::{AdaptiveParser, ExtractionOutcome, ParserConfig, ParserConfigBuilder, Provenance};
pub use records::{ArticleRecord, AudioRecord, ShapeKind, StoryRecord, VideoRecord};
pub use rules::{RuleLoader, RuleLoaderBuilder};
pub use shape::{FieldValues, TargetShape, ensure_supported, read_field};
pub use validator::{ContentValidator, ValidationVerdict, ValidatorConfig, parse_date, validate};
