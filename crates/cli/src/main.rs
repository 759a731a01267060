mod echo;

use std::fs;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::Parser;
use gleaner_core::{
    AdaptiveParser, ArticleRecord, AudioRecord, ChatCompletionExtractor, ChatExtractorConfig, Document, FetchConfig,
    HttpSource, ParserConfig, Provenance, RuleLoader, RuleLoaderBuilder, ShapeKind, StoryRecord, TargetShape,
    VideoRecord, fetch_file, fetch_stdin,
};
use owo_colors::OwoColorize;
use serde_json::{Value, json};
use tracing_subscriber::EnvFilter;
use url::Url;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Output format for extraction results
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Json,
    Text,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "text" | "txt" => Ok(Self::Text),
            _ => Err(format!("Invalid format: {}. Valid options: json, text", s)),
        }
    }
}

/// Extract structured records from news pages with learned per-publisher selectors
#[derive(Parser, Debug)]
#[command(name = "gleaner")]
#[command(version)]
#[command(about = "Extract structured records from news pages", long_about = None)]
struct Args {
    /// URL to fetch, local HTML file, or "-" for stdin
    #[arg(value_name = "INPUT")]
    input: String,

    /// Source URL of file or stdin input (selects the publisher's rules)
    #[arg(long, value_name = "URL")]
    url: Option<String>,

    /// Record shape to extract (article, story, video, audio)
    #[arg(short, long, default_value = "article", value_name = "SHAPE")]
    shape: String,

    /// Directory of per-domain rule files to teach before parsing
    #[arg(long, value_name = "DIR")]
    rules_dir: Option<PathBuf>,

    /// Write the selector cache to this directory after parsing
    #[arg(long, value_name = "DIR")]
    save_rules: Option<PathBuf>,

    /// Print discovery candidates for every field instead of extracting
    #[arg(long)]
    candidates: bool,

    /// Ask a chat-completions model for fields structure cannot fill (needs OPENAI_API_KEY)
    #[arg(long)]
    fallback: bool,

    /// Model used by --fallback
    #[arg(long, value_name = "MODEL")]
    model: Option<String>,

    /// OpenAI-compatible API base URL used by --fallback
    #[arg(long, value_name = "URL")]
    endpoint: Option<String>,

    /// Output format (json, text)
    #[arg(short, long, default_value = "json", value_name = "FORMAT")]
    format: OutputFormat,

    /// Output file (default: stdout)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// HTTP timeout in seconds
    #[arg(long, default_value = "30", value_name = "SECS")]
    timeout: u64,

    /// Custom User-Agent for HTTP requests
    #[arg(long, value_name = "UA")]
    user_agent: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let fallback = if verbose { "warn,gleaner_core=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn is_remote(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Runs one shape through the parser and serializes the record.
async fn extract<T: TargetShape + serde::Serialize>(
    parser: &AdaptiveParser, html: &str, source_url: &str, fallback: bool,
) -> anyhow::Result<(Value, Provenance)> {
    let outcome = if fallback {
        parser.parse_with_fallback::<T>(html, source_url).await
    } else {
        parser.parse::<T>(html, source_url)
    };

    let (record, provenance) = outcome.into_result().with_context(|| format!("Failed to extract {}", T::NAME))?;
    let value = serde_json::to_value(&record).context("Failed to serialize record")?;
    Ok((value, provenance))
}

fn render_record(format: OutputFormat, shape: ShapeKind, provenance: Provenance, record: &Value) -> anyhow::Result<String> {
    match format {
        OutputFormat::Json => {
            let document = json!({ "shape": shape.name(), "provenance": provenance, "record": record });
            Ok(format!("{}\n", serde_json::to_string_pretty(&document)?))
        }
        OutputFormat::Text => {
            let mut out = format!("shape: {}\nprovenance: {}\n", shape, provenance);
            if let Some(fields) = record.as_object() {
                for (name, value) in fields {
                    match value.as_str() {
                        Some(text) => out.push_str(&format!("{}: {}\n", name, text)),
                        None => out.push_str(&format!("{}: {}\n", name, value)),
                    }
                }
            }
            Ok(out)
        }
    }
}

fn render_candidates(format: OutputFormat, shape: ShapeKind, parser: &AdaptiveParser, doc: &Document) -> anyhow::Result<String> {
    let fields = shape.fields();
    match format {
        OutputFormat::Json => {
            let mut map = serde_json::Map::new();
            for kind in fields {
                map.insert(kind.to_string(), serde_json::to_value(parser.discover(doc, kind))?);
            }
            Ok(format!("{}\n", serde_json::to_string_pretty(&Value::Object(map))?))
        }
        OutputFormat::Text => {
            let mut out = String::new();
            for kind in fields {
                out.push_str(&format!("{}\n", kind));
                for candidate in parser.discover(doc, kind) {
                    out.push_str(&format!(
                        "  {:.2}  {}  ({})\n",
                        candidate.confidence, candidate.selector, candidate.rationale
                    ));
                }
            }
            Ok(out)
        }
    }
}

fn build_parser(args: &Args) -> anyhow::Result<AdaptiveParser> {
    let mut parser = AdaptiveParser::with_config(ParserConfig::default());

    if args.fallback {
        let mut config = ChatExtractorConfig::from_env().context("Fallback extraction needs OPENAI_API_KEY")?;
        if let Some(model) = &args.model {
            config = config.with_model(model);
        }
        if let Some(endpoint) = &args.endpoint {
            config = config.with_endpoint(endpoint);
        }
        let extractor = ChatCompletionExtractor::new(config).context("Failed to build fallback extractor")?;
        parser = parser.with_fallback(Arc::new(extractor));
    }

    let mut loader = match &args.rules_dir {
        Some(dir) => RuleLoaderBuilder::new().custom_dir(dir).build(),
        None => RuleLoader::default(),
    };
    let taught = loader.teach_all(parser.cache()).context("Failed to load rule files")?;
    tracing::debug!(domains = taught, "rules taught");
    if args.verbose && taught > 0 {
        echo::print_info(&format!("Taught rules for {} domain(s)", taught));
    }

    Ok(parser)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let started = Instant::now();
    let mut timings: Vec<(String, Duration)> = Vec::new();

    if args.verbose {
        echo::print_banner();
    }

    let shape = ShapeKind::from_str(&args.shape)?;
    let parser = build_parser(&args)?;

    let step = Instant::now();
    let html = if args.input == "-" {
        if args.verbose {
            echo::print_step(1, 3, "Reading from stdin");
        }
        fetch_stdin().context("Failed to read from stdin")?
    } else if is_remote(&args.input) {
        if args.verbose {
            echo::print_step(1, 3, &format!("Fetching from {}", args.input.bright_white().underline()));
        }
        let mut config = FetchConfig { timeout: args.timeout, ..Default::default() };
        if let Some(user_agent) = &args.user_agent {
            config.user_agent = user_agent.clone();
        }
        let source = HttpSource::new(config).context("Failed to build HTTP client")?;
        source.get(&args.input).await.context("Failed to fetch URL")?
    } else {
        if args.verbose {
            echo::print_step(1, 3, &format!("Reading from file {}", args.input.bright_white()));
        }
        fetch_file(&args.input).with_context(|| format!("Failed to read file: {}", args.input))?
    };
    timings.push(("Read".to_string(), step.elapsed()));

    let source_url = match (&args.url, is_remote(&args.input)) {
        (Some(url), _) => url.clone(),
        (None, true) => args.input.clone(),
        (None, false) => String::new(),
    };
    if args.verbose {
        eprintln!("  {} {}", "Size:".dimmed(), echo::format_size(html.len()).bright_white());
        if source_url.is_empty() {
            echo::print_warning("No source URL; publisher rules and learning are disabled");
        }
        eprintln!();
    }

    let step = Instant::now();
    let output = if args.candidates {
        if args.verbose {
            echo::print_step(2, 3, "Discovering selector candidates");
        }
        let doc = Document::parse_with_url(&html, Url::parse(&source_url).ok()).context("Failed to parse HTML")?;
        render_candidates(args.format, shape, &parser, &doc)?
    } else {
        if args.verbose {
            echo::print_step(2, 3, &format!("Extracting {} record", shape));
        }
        let result = match shape {
            ShapeKind::Article => extract::<ArticleRecord>(&parser, &html, &source_url, args.fallback).await,
            ShapeKind::Story => extract::<StoryRecord>(&parser, &html, &source_url, args.fallback).await,
            ShapeKind::Video => extract::<VideoRecord>(&parser, &html, &source_url, args.fallback).await,
            ShapeKind::Audio => extract::<AudioRecord>(&parser, &html, &source_url, args.fallback).await,
        };

        if let Some(dir) = &args.save_rules {
            let written = RuleLoader::save_snapshot(parser.cache(), dir)
                .with_context(|| format!("Failed to save rules to {}", dir.display()))?;
            if args.verbose {
                echo::print_info(&format!("Saved {} rule file(s) to {}", written.len(), dir.display()));
            }
        }

        let (record, provenance) = match result {
            Ok(ok) => ok,
            Err(err) => {
                if args.verbose {
                    echo::print_error(&format!("{:#}", err));
                }
                return Err(err);
            }
        };

        if args.verbose {
            let fields = record.as_object().map(|o| o.len()).unwrap_or_default();
            echo::print_extraction_details(shape.name(), provenance, fields, parser.cache().len());
        }
        render_record(args.format, shape, provenance, &record)?
    };
    timings.push(("Extract".to_string(), step.elapsed()));

    if args.verbose {
        echo::print_step(3, 3, "Writing output");
        eprintln!("  {} {}", "Format:".dimmed(), format!("{:?}", args.format).bright_white());
        eprintln!();
    }

    match &args.output {
        Some(path) => {
            fs::write(path, output).with_context(|| format!("Failed to write to file: {}", path.display()))?;
            echo::print_success(&format!("Output written to {}", path.display().bright_white()));
        }
        None => {
            print!("{}", output);
        }
    }

    if args.verbose {
        echo::print_timing_summary(started.elapsed(), &timings);
    }

    Ok(())
}
